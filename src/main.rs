use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dicom_mpr::{
    AddressMode, FilterMode, Interpolation, Orientation, Processor, SamplerConfig, SortBy,
    VolumeLoader,
};

/// Extracts one orthogonal slice from a directory of DICOM files.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory containing the .dcm files of one series
    #[arg(short, long, default_value = "dicom")]
    input: PathBuf,

    #[arg(long, value_enum, default_value_t = OrientationArg::Coronal)]
    orientation: OrientationArg,

    /// Slice index along the orientation's normal axis [default: center]
    #[arg(long)]
    index: Option<usize>,

    #[arg(long, value_enum, default_value_t = SortArg::InstanceNumber)]
    sort_by: SortArg,

    #[arg(long, value_enum, default_value_t = InterpolationArg::Linear)]
    interpolation: InterpolationArg,

    #[arg(long, value_enum, default_value_t = ProcessorArg::Cpu)]
    processor: ProcessorArg,

    #[arg(long, value_enum, default_value_t = FilterArg::Linear)]
    filter: FilterArg,

    #[arg(long, value_enum, default_value_t = AddressArg::ClampToEdge)]
    address_mode: AddressArg,

    #[arg(short, long, default_value = "result.png")]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrientationArg {
    Axial,
    Coronal,
    Sagittal,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InterpolationArg {
    None,
    Linear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProcessorArg {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterArg {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AddressArg {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl Args {
    fn orientation(&self) -> Orientation {
        match self.orientation {
            OrientationArg::Axial => Orientation::Axial,
            OrientationArg::Coronal => Orientation::Coronal,
            OrientationArg::Sagittal => Orientation::Sagittal,
        }
    }

    fn sort_by(&self) -> SortBy {
        match self.sort_by {
            SortArg::ImagePositionPatient => SortBy::ImagePositionPatient,
            SortArg::TablePosition => SortBy::TablePosition,
            SortArg::InstanceNumber => SortBy::InstanceNumber,
            SortArg::None => SortBy::None,
        }
    }

    fn interpolation(&self) -> Interpolation {
        let processor = match self.processor {
            ProcessorArg::Cpu => Processor::CPU,
            ProcessorArg::Gpu => Processor::GPU,
        };
        match self.interpolation {
            InterpolationArg::None => Interpolation::None,
            InterpolationArg::Linear => Interpolation::Linear(processor),
        }
    }

    fn sampler(&self) -> SamplerConfig {
        SamplerConfig {
            filter: match self.filter {
                FilterArg::Nearest => FilterMode::Nearest,
                FilterArg::Linear => FilterMode::Linear,
            },
            address_mode: match self.address_mode {
                AddressArg::ClampToEdge => AddressMode::ClampToEdge,
                AddressArg::Repeat => AddressMode::Repeat,
                AddressArg::MirrorRepeat => AddressMode::MirrorRepeat,
            },
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut volume = VolumeLoader::load_from_directory(&args.input, args.sort_by())
        .with_context(|| format!("failed to load volume from {}", args.input.display()))?;
    volume.set_sampler_config(args.sampler());

    let orientation = args.orientation();
    let (depth, height, width) = volume.dim();
    let index = args.index.unwrap_or(match orientation {
        Orientation::Axial => depth / 2,
        Orientation::Coronal => height / 2,
        Orientation::Sagittal => width / 2,
    });

    let image = volume
        .get_image_from_axis(index, orientation, args.interpolation())
        .await
        .with_context(|| format!("failed to extract {orientation:?} slice {index}"))?;
    image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    tracing::info!(output = %args.output.display(), ?orientation, index, "saved slice");
    Ok(())
}
