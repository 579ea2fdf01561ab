use std::borrow::Cow;
use thiserror::Error;
use wgpu::{PollType, util::DeviceExt};

use crate::enums::Orientation;
use crate::slice_kernel::{SliceUniforms, workgroup_count};
use crate::texture::{AddressMode, FilterMode, SamplerConfig, VolumeTexture};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No compatible GPU adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    #[error("Failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("Failed to poll device: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("Failed to map staging buffer: {0}")]
    BufferAsync(#[from] wgpu::BufferAsyncError),

    #[error("Staging buffer mapping was dropped before completing")]
    MapCanceled(#[from] futures::channel::oneshot::Canceled),

    #[error("Volume {width}x{height}x{depth} exceeds the 3D texture limit of {max}")]
    TextureTooLarge {
        width: u32,
        height: u32,
        depth: u32,
        max: u32,
    },

    #[error("WGPU validation failed: {0}")]
    Validation(String),
}

pub struct WGPU {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WGPU {
    /// Acquires the default adapter and a device with the adapter's full
    /// limits, so volumes up to the hardware 3D texture size fit.
    pub async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Volume Slice Device"),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await?;
        Ok(Self { device, queue })
    }
}

/// Fails if a volume of `dimensions` `(depth, height, width)` does not fit
/// into a 3D texture under `limits`.
pub fn check_texture_limits(
    dimensions: (u32, u32, u32),
    limits: &wgpu::Limits,
) -> Result<(), GpuError> {
    let (depth, height, width) = dimensions;
    let max = limits.max_texture_dimension_3d;
    if width > max || height > max || depth > max {
        return Err(GpuError::TextureTooLarge {
            width,
            height,
            depth,
            max,
        });
    }
    Ok(())
}

fn push_validation_scope(device: &wgpu::Device) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
}

/// Turns the first validation error raised since the matching
/// [`push_validation_scope`] into a [`GpuError`].
async fn pop_validation_scope(device: &wgpu::Device) -> Result<(), GpuError> {
    match device.pop_error_scope().await {
        Some(error) => Err(GpuError::Validation(error.to_string())),
        None => Ok(()),
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Runs `shaders/volume_slice.wgsl` against a volume uploaded as an
/// `Rg8Unorm` 3D texture.
pub struct GpuInterpolator {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    _volume_texture: wgpu::Texture,
    volume_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    dimensions: (u32, u32, u32), // (depth, height, width)
}

impl GpuInterpolator {
    /// Uploads `texture` and builds the slice pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::TextureTooLarge`] if any axis exceeds the device's
    /// 3D texture limit and [`GpuError::Validation`] for any other rejected
    /// resource.
    pub async fn new(
        texture: &VolumeTexture,
        sampler_config: SamplerConfig,
        wgpu: WGPU,
    ) -> Result<Self, GpuError> {
        let start = web_time::Instant::now();
        let (depth, height, width) = texture.dimensions();
        let WGPU { device, queue } = wgpu;
        check_texture_limits(texture.dimensions(), &device.limits())?;
        push_validation_scope(&device);

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };

        let volume_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::Rg8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &volume_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texture.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(2 * width),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        let volume_view = volume_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: address_mode(sampler_config.address_mode),
            address_mode_v: address_mode(sampler_config.address_mode),
            address_mode_w: address_mode(sampler_config.address_mode),
            mag_filter: filter_mode(sampler_config.filter),
            min_filter: filter_mode(sampler_config.filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Volume Slice Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "shaders/volume_slice.wgsl"
            ))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume Slice Bind Group Layout"),
            entries: &[
                // 3D texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Output buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<SliceUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Slice Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Volume Slice Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        pop_validation_scope(&device).await?;
        let elapsed = start.elapsed();
        tracing::debug!(?elapsed, width, height, depth, "uploaded volume texture");

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            _volume_texture: volume_texture,
            volume_view,
            sampler,
            dimensions: (depth, height, width),
        })
    }

    /// Extracts a `target_width x target_height` slice as 8-bit intensities.
    ///
    /// Both target dimensions must be non-zero.
    pub async fn extract_slice(
        &self,
        slice_index: u32,
        orientation: Orientation,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<u8>, GpuError> {
        let start = web_time::Instant::now();
        let uniforms = SliceUniforms::new(
            slice_index,
            orientation,
            target_width,
            target_height,
            self.dimensions,
        );
        push_validation_scope(&self.device);
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Uniform Buffer"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let output_bytes = (uniforms.output_len() * std::mem::size_of::<u32>()) as u64;
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: output_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: output_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Slice Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.volume_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Volume Slice Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Volume Slice Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            let (groups_x, groups_y, groups_z) = workgroup_count(target_width, target_height);
            compute_pass.dispatch_workgroups(groups_x, groups_y, groups_z);
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_bytes);
        self.queue.submit(Some(encoder.finish()));
        pop_validation_scope(&self.device).await?;

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        receiver.await??;

        let data = buffer_slice.get_mapped_range();
        let slots: &[u32] = bytemuck::cast_slice(&data);
        let result: Vec<u8> = slots.iter().map(|&v| v as u8).collect();
        drop(data);
        staging_buffer.unmap();

        let elapsed = start.elapsed();
        tracing::debug!(?elapsed, ?orientation, slice_index, "extracted slice on gpu");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downlevel_limits_reject_512_axes() {
        let limits = wgpu::Limits::downlevel_defaults();
        assert!(check_texture_limits((4, 256, 256), &limits).is_ok());
        assert!(matches!(
            check_texture_limits((4, 512, 512), &limits),
            Err(GpuError::TextureTooLarge { width: 512, max: 256, .. })
        ));
    }

    #[test]
    fn default_limits_accept_512_axes() {
        let limits = wgpu::Limits::default();
        assert!(check_texture_limits((4, 512, 512), &limits).is_ok());
        assert!(check_texture_limits((512, 512, 512), &limits).is_ok());
    }
}
