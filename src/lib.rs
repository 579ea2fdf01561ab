//! # DICOM-MPR library
//!
//! Multiplanar reconstruction (MPR) for volumes assembled from multiple
//! DICOM files.
//!
//! This library is part of the dicom-rs ecosystem and leverages its component
//! to provide a volume representation of multiple DICOM files.
//! Volumes can either be loaded from multiple [`FileDicomObject<InMemDicomObject>`] or from a
//! specified folder where each ".dcm" file is read from. The volume can be
//! sliced in the three different medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! Coronal and Sagittal slices can be resampled to preserve the physical
//! aspect ratio of the voxels. Resampling runs a slice kernel that maps each
//! output pixel to a normalized coordinate in the volume, samples the volume
//! stored as a two-channel (low byte, high byte) 3D texture and quantizes the
//! reconstructed 16-bit intensity to 8 bits. The same kernel runs either as a
//! WGPU compute shader or on the CPU with rayon, emulating the 8x8 workgroup
//! grid.
//!
//! DICOM files are assumed to have the following attributes:
//!   - Axial data set (Only Coronal and Sagittal axes are interpolated)
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series (Series Instance UID) and acquisition
//!     (Acquisition Number)
//!
//! # Examples
//!
//! ## Reading multiple DICOM files into a volume
//!
//! To read all DICOM files from the dicom/ directory, sort them by
//! InstanceNumber. Then get the image at the center of the volume in the
//! Sagittal axis.
//!
//! ```no_run
//! # use dicom_mpr::{VolumeLoader, Orientation, Interpolation, Processor, SortBy};
//! # use std::path::PathBuf;
//! let directory = PathBuf::from("dicom");
//! let mut volume = VolumeLoader::load_from_directory(&directory, SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let index = volume.dim().2 / 2;
//! let image = futures::executor::block_on(volume.get_image_from_axis(
//!     index,
//!     Orientation::Sagittal,
//!     Interpolation::Linear(Processor::CPU),
//! ))
//! .expect("should have returned image at center of volume");
//! image.save("result.png").expect("should have written the image");
//! ```
//!
//! [`FileDicomObject<InMemDicomObject>`]:
//!     https://docs.rs/dicom-object/latest/dicom_object/struct.FileDicomObject.html

pub mod cpu_interpolator;
pub mod enums;
pub mod gpu_interpolator;
mod interpolator;
pub mod slice_kernel;
pub mod texture;
pub mod volume;
pub mod volume_loader;

pub use cpu_interpolator::CpuInterpolator;
pub use enums::{Interpolation, Orientation, Processor, SortBy};
pub use gpu_interpolator::{GpuError, GpuInterpolator, WGPU};
pub use texture::{AddressMode, FilterMode, SamplerConfig, VolumeTexture};
pub use volume::{Volume, VolumeError};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
