// SPDX-License-Identifier: GPL-3.0-only

//! Scene-graph collaborator: spatial transform per data object

use crate::data::DataObjectId;
use glam::Affine3A;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Supplies the world transform of a data object
pub trait SceneGraph: Send + Sync {
    fn transform_for(&self, id: DataObjectId) -> Affine3A;
}

/// Every object sits at the origin
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentitySceneGraph;

impl SceneGraph for IdentitySceneGraph {
    fn transform_for(&self, _id: DataObjectId) -> Affine3A {
        Affine3A::IDENTITY
    }
}

/// Scene graph with explicitly assigned transforms; unknown objects get identity
#[derive(Debug, Default)]
pub struct TransformTable {
    transforms: RwLock<HashMap<DataObjectId, Affine3A>>,
}

impl TransformTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transform(&self, id: DataObjectId, transform: Affine3A) {
        self.transforms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, transform);
    }
}

impl SceneGraph for TransformTable {
    fn transform_for(&self, id: DataObjectId) -> Affine3A {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or(Affine3A::IDENTITY)
    }
}
