use crate::cpu_interpolator::CpuInterpolator;
use crate::enums::Interpolation;
use crate::enums::Orientation;
use crate::enums::Processor;
use crate::gpu_interpolator::{GpuError, GpuInterpolator, WGPU};
use crate::interpolator::Interpolator;
use crate::texture::{SamplerConfig, VolumeTexture};

use image::GrayImage;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Slice index {index} is out of range for {orientation:?} (max {max})")]
    IndexOutOfRange {
        index: usize,
        orientation: Orientation,
        max: usize,
    },

    #[error("Output image would be empty ({width}x{height})")]
    EmptyOutput { width: u32, height: u32 },

    #[error("Pixel data does not match the image dimensions")]
    ImageBuffer,

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

#[derive(Default)]
pub struct Volume {
    data: Array3<u16>,
    pub spacing: (f32, f32, f32),
    pub interpolated_dim: (u32, u32, u32),
    sampler: SamplerConfig,
    cpu_interpolator: Option<CpuInterpolator>,
    gpu_interpolator: Option<GpuInterpolator>,
}

impl Volume {
    pub fn new(data: Array3<u16>, spacing: (f32, f32, f32)) -> Self {
        let original_dim = data.dim();
        Self {
            data,
            spacing,
            interpolated_dim: Interpolator::get_isotropic_dimensions(spacing, original_dim),
            sampler: SamplerConfig::default(),
            cpu_interpolator: None,
            gpu_interpolator: None,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    /// Get a mutable reference to the underlying data.
    ///
    /// Uploaded textures no longer match afterwards and are dropped.
    pub fn data_mut(&mut self) -> &mut Array3<u16> {
        self.cpu_interpolator = None;
        self.gpu_interpolator = None;
        &mut self.data
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        self.sampler
    }

    /// Changes the filtering and addressing used for interpolated slices.
    pub fn set_sampler_config(&mut self, sampler: SamplerConfig) {
        if sampler != self.sampler {
            self.sampler = sampler;
            self.cpu_interpolator = None;
            self.gpu_interpolator = None;
        }
    }

    /// Uploads the volume to the given device for [`Processor::GPU`]
    /// interpolation.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot hold the volume as a 3D texture.
    pub async fn attach_gpu(&mut self, wgpu: WGPU) -> Result<(), VolumeError> {
        let texture = VolumeTexture::from_array(&self.data);
        let interpolator = GpuInterpolator::new(&texture, self.sampler, wgpu).await?;
        self.gpu_interpolator = Some(interpolator);
        Ok(())
    }

    #[inline]
    fn normalize_to_u8(value: u16) -> u8 {
        ((value as f32 / 65535.0) * 255.0).clamp(0.0, 255.0) as u8
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Result<ArrayView2<'_, u16>, VolumeError> {
        self.check_index(index, orientation)?;
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Ok(slice)
    }

    /// Output `(width, height)` of an interpolated slice.
    pub fn output_dimensions(&self, orientation: Orientation) -> (u32, u32) {
        let (depth, height, width) = self.interpolated_dim;
        match orientation {
            // Looking down Z-axis: X is width, Y is height
            Orientation::Axial => (width, height),
            // Looking down Y-axis: X is width, Z is height
            Orientation::Coronal => (width, depth),
            // Looking down X-axis: Y is width, Z is height
            Orientation::Sagittal => (height, depth),
        }
    }

    fn slice_to_image(slice: &ArrayView2<'_, u16>) -> Result<GrayImage, VolumeError> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v))
            .collect();
        let (width, height) = (width as u32, height as u32);
        GrayImage::from_raw(width, height, pixel_data).ok_or(VolumeError::ImageBuffer)
    }

    /// Returns the slice at `index` along `orientation` as an 8-bit image.
    ///
    /// With [`Interpolation::Linear`], Coronal and Sagittal slices are
    /// resampled to [`Volume::output_dimensions`]; Axial slices are already
    /// isotropic in-plane and are returned as stored.
    pub async fn get_image_from_axis(
        &mut self,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
    ) -> Result<GrayImage, VolumeError> {
        let start = web_time::Instant::now();
        let slice = self.get_slice_from_axis(index, orientation)?;

        let processor = match interpolation {
            Interpolation::None => return Self::slice_to_image(&slice),
            Interpolation::Linear(_) if orientation == Orientation::Axial => {
                return Self::slice_to_image(&slice);
            }
            Interpolation::Linear(processor) => processor,
        };

        let (width, height) = self.output_dimensions(orientation);
        if width == 0 || height == 0 {
            return Err(VolumeError::EmptyOutput { width, height });
        }

        let slice_index = Self::slice_index(index, orientation)?;
        let pixel_data = match processor {
            Processor::CPU => {
                let interpolator = self.cpu_interpolator();
                interpolator
                    .extract_slice(slice_index, orientation, width, height)
            }
            Processor::GPU => {
                let interpolator = self.gpu_interpolator().await?;
                interpolator
                    .extract_slice(slice_index, orientation, width, height)
                    .await?
            }
        };
        let elapsed = start.elapsed();
        tracing::debug!(?elapsed, ?orientation, index, width, height, "interpolated slice");

        GrayImage::from_raw(width, height, pixel_data).ok_or(VolumeError::ImageBuffer)
    }

    fn cpu_interpolator(&mut self) -> &CpuInterpolator {
        let sampler = self.sampler;
        let data = &self.data;
        self.cpu_interpolator
            .get_or_insert_with(|| CpuInterpolator::new(data, sampler))
    }

    async fn gpu_interpolator(&mut self) -> Result<&GpuInterpolator, GpuError> {
        let interpolator = match self.gpu_interpolator.take() {
            Some(interpolator) => interpolator,
            None => {
                let wgpu = WGPU::request().await?;
                let texture = VolumeTexture::from_array(&self.data);
                GpuInterpolator::new(&texture, self.sampler, wgpu).await?
            }
        };
        Ok(&*self.gpu_interpolator.insert(interpolator))
    }

    /// Narrows `index` to the 32-bit slice index the kernels take.
    fn slice_index(index: usize, orientation: Orientation) -> Result<u32, VolumeError> {
        u32::try_from(index).map_err(|_| VolumeError::IndexOutOfRange {
            index,
            orientation,
            max: u32::MAX as usize,
        })
    }

    fn check_index(&self, index: usize, orientation: Orientation) -> Result<(), VolumeError> {
        let (depth, height, width) = self.data.dim();
        let max = match orientation {
            Orientation::Axial => depth,
            Orientation::Coronal => height,
            Orientation::Sagittal => width,
        };
        if index < max {
            Ok(())
        } else {
            Err(VolumeError::IndexOutOfRange {
                index,
                orientation,
                max,
            })
        }
    }
}
