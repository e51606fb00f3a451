// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use medview::{Config, DataType, PlaneType, SliceSelection};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "medview")]
#[command(about = "GPU slice rendering of volume data")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the GPU adapter that would be used
    Info,

    /// Render a slice of a synthetic volume to a PNG
    Slice {
        /// Volume size, either N or WxHxD
        #[arg(short, long, default_value = "64", value_parser = cli::parse_size)]
        size: glam::UVec3,

        /// Voxel type of the synthetic volume
        #[arg(short = 't', long = "type", value_enum, default_value_t = VoxelType::Uint8)]
        voxel_type: VoxelType,

        /// Axis perpendicular to the slice (overrides the config file)
        #[arg(short, long, value_enum)]
        plane: Option<Plane>,

        /// Slice index; the middle slice when omitted
        #[arg(long, allow_negative_numbers = true)]
        index: Option<i64>,

        /// Intensity window
        #[arg(long)]
        window: Option<f32>,

        /// Intensity level
        #[arg(long, allow_negative_numbers = true)]
        level: Option<f32>,

        /// Write the slice texture itself instead of the rendered quad
        #[arg(long)]
        raw: bool,

        /// Use the CPU reference device (implies --raw)
        #[arg(long)]
        cpu: bool,

        /// Output file path
        #[arg(short, long, default_value = "slice.png")]
        output: PathBuf,
    },

    /// Build the bounding-box mesh of a volume and allocate its vertex buffer
    Mesh {
        /// Volume size, either N or WxHxD
        #[arg(short, long, default_value = "64", value_parser = cli::parse_size)]
        size: glam::UVec3,

        /// Use the CPU reference device
        #[arg(long)]
        cpu: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VoxelType {
    Float,
    Uint8,
    Int8,
    Uint16,
    Int16,
}

impl From<VoxelType> for DataType {
    fn from(value: VoxelType) -> Self {
        match value {
            VoxelType::Float => DataType::Float,
            VoxelType::Uint8 => DataType::Uint8,
            VoxelType::Int8 => DataType::Int8,
            VoxelType::Uint16 => DataType::Uint16,
            VoxelType::Int16 => DataType::Int16,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Plane {
    X,
    Y,
    Z,
}

impl From<Plane> for PlaneType {
    fn from(value: Plane) -> Self {
        match value {
            Plane::X => PlaneType::X,
            Plane::Y => PlaneType::Y,
            Plane::Z => PlaneType::Z,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=medview=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Info => cli::print_device_info(&config),
        Commands::Slice {
            size,
            voxel_type,
            plane,
            index,
            window,
            level,
            raw,
            cpu,
            output,
        } => {
            if let Some(plane) = plane {
                config.slice.plane = plane.into();
            }
            if let Some(index) = index {
                config.slice.slice = SliceSelection::Index(index);
            }
            if window.is_some() {
                config.slice.window = window;
            }
            if level.is_some() {
                config.slice.level = level;
            }
            config.validate()?;

            cli::render_slice(&cli::SliceOptions {
                size,
                data_type: voxel_type.into(),
                raw: raw || cpu,
                cpu,
                output,
                config,
            })
        }
        Commands::Mesh { size, cpu } => cli::build_mesh(size, cpu, &config),
    }
}
