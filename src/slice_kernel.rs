//! The slice sampling kernel.
//!
//! This is the host-side twin of `shaders/volume_slice.wgsl`: every function
//! here performs the same arithmetic, in the same order, as its WGSL
//! counterpart so the CPU and GPU dispatchers produce the same image.

use crate::enums::Orientation;

/// Threads per workgroup along x and y. The z extent is always 1.
pub const WORKGROUP_SIZE: u32 = 8;

/// Per-dispatch parameters, laid out exactly like the WGSL uniform block.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SliceUniforms {
    pub slice_index: u32,
    /// Raw orientation code, see [`Orientation::from_code`].
    pub orientation: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub volume_width: u32,
    pub volume_height: u32,
    pub volume_depth: u32,
    pub _padding: u32,
}

const _: () = assert!(core::mem::size_of::<SliceUniforms>() == 32);

impl SliceUniforms {
    /// `volume_dim` is `(depth, height, width)`, the axis order of the voxel
    /// array.
    pub fn new(
        slice_index: u32,
        orientation: Orientation,
        output_width: u32,
        output_height: u32,
        volume_dim: (u32, u32, u32),
    ) -> Self {
        let (volume_depth, volume_height, volume_width) = volume_dim;
        Self {
            slice_index,
            orientation: orientation.code(),
            output_width,
            output_height,
            volume_width,
            volume_height,
            volume_depth,
            _padding: 0,
        }
    }

    /// Number of output slots the kernel may write.
    #[inline]
    pub fn output_len(&self) -> usize {
        self.output_width as usize * self.output_height as usize
    }
}

/// Workgroup grid covering an output image: `ceil(w / 8) x ceil(h / 8) x 1`.
#[inline]
pub fn workgroup_count(output_width: u32, output_height: u32) -> (u32, u32, u32) {
    (
        output_width.div_ceil(WORKGROUP_SIZE),
        output_height.div_ceil(WORKGROUP_SIZE),
        1,
    )
}

/// Anything that can be sampled like the two-channel volume texture.
///
/// Returns the first two channels, normalized to `[0, 1]`, at the base mip
/// level.
pub trait VolumeSampler {
    fn sample_level(&self, coord: [f32; 3]) -> [f32; 2];
}

/// Maps an output pixel to a normalized `(u, v, w)` sample coordinate.
///
/// Coordinates are not clamped; a slice index past the end of the volume
/// yields values outside `[0, 1]` and the sampler's address mode decides.
#[inline]
pub fn map_coordinate(x: u32, y: u32, uniforms: &SliceUniforms) -> [f32; 3] {
    let fx = (x as f32 + 0.5) / uniforms.output_width as f32;
    let fy = (y as f32 + 0.5) / uniforms.output_height as f32;
    let slice_norm = uniforms.slice_index as f32 + 0.5;

    match Orientation::from_code(uniforms.orientation) {
        Orientation::Axial => [fx, fy, slice_norm / uniforms.volume_depth as f32],
        Orientation::Coronal => [fx, slice_norm / uniforms.volume_height as f32, fy],
        Orientation::Sagittal => [slice_norm / uniforms.volume_width as f32, fx, fy],
    }
}

/// Rebuilds the normalized 16-bit intensity from the low (`r`) and high
/// (`g`) channels.
///
/// The low term is scaled by 255 and the high term by 255 * 256; this must
/// stay paired with the texel encoding in [`crate::texture`].
#[inline]
pub fn decode_intensity(r: f32, g: f32) -> f32 {
    let low_byte = r * 255.0;
    let high_byte = g * 255.0;
    (low_byte + high_byte * 256.0) / 65535.0
}

/// Scales a normalized intensity to `[0, 255]`, truncating toward zero.
#[inline]
pub fn quantize(intensity: f32) -> u32 {
    (intensity * 255.0).clamp(0.0, 255.0) as u32
}

#[inline]
pub fn flat_index(x: u32, y: u32, output_width: u32) -> usize {
    y as usize * output_width as usize + x as usize
}

/// A single output write produced by one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceWrite {
    pub index: usize,
    pub value: u32,
}

/// One dispatch worth of kernel state: the uniforms and the bound sampler.
pub struct SliceKernel<'a, S: VolumeSampler> {
    uniforms: SliceUniforms,
    sampler: &'a S,
}

impl<'a, S: VolumeSampler> SliceKernel<'a, S> {
    pub fn new(uniforms: SliceUniforms, sampler: &'a S) -> Self {
        Self { uniforms, sampler }
    }

    pub fn uniforms(&self) -> &SliceUniforms {
        &self.uniforms
    }

    /// Normalized intensity at a sample coordinate.
    #[inline]
    pub fn intensity(&self, coord: [f32; 3]) -> f32 {
        let [r, g] = self.sampler.sample_level(coord);
        decode_intensity(r, g)
    }

    /// Runs the kernel for one global invocation id.
    ///
    /// Returns `None` for threads outside the output image, otherwise the
    /// write the thread performs.
    #[inline]
    pub fn invoke(&self, global_id: [u32; 3]) -> Option<SliceWrite> {
        let [x, y, _] = global_id;
        if x >= self.uniforms.output_width || y >= self.uniforms.output_height {
            return None;
        }

        let coord = map_coordinate(x, y, &self.uniforms);
        let intensity = self.intensity(coord);
        Some(SliceWrite {
            index: flat_index(x, y, self.uniforms.output_width),
            value: quantize(intensity),
        })
    }
}
