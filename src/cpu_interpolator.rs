use ndarray::Array3;
use rayon::prelude::*;

use crate::enums::Orientation;
use crate::slice_kernel::{
    SliceKernel, SliceUniforms, VolumeSampler, WORKGROUP_SIZE, workgroup_count,
};
use crate::texture::{SamplerConfig, VolumeTexture};

/// Runs the slice kernel on the CPU, emulating the 8x8 workgroup grid of the
/// compute shader with rayon.
pub struct CpuInterpolator {
    texture: VolumeTexture,
    sampler: SamplerConfig,
}

impl CpuInterpolator {
    pub fn new(volume_data: &Array3<u16>, sampler: SamplerConfig) -> Self {
        let start = web_time::Instant::now();
        let texture = VolumeTexture::from_array(volume_data);
        tracing::debug!(elapsed = ?start.elapsed(), "encoded volume texture");
        Self { texture, sampler }
    }

    /// Extracts a `target_width x target_height` slice as 8-bit intensities.
    pub fn extract_slice(
        &self,
        slice_index: u32,
        orientation: Orientation,
        target_width: u32,
        target_height: u32,
    ) -> Vec<u8> {
        let uniforms = SliceUniforms::new(
            slice_index,
            orientation,
            target_width,
            target_height,
            self.texture.dimensions(),
        );
        let sampler = self.texture.sampler(self.sampler);
        let kernel = SliceKernel::new(uniforms, &sampler);

        let mut output = vec![0u32; uniforms.output_len()];
        dispatch(&kernel, &mut output);
        output.into_iter().map(|v| v as u8).collect()
    }
}

/// Dispatches `kernel` over its full workgroup grid into `output`.
///
/// Each rayon task owns one row of workgroups, i.e. a band of
/// `WORKGROUP_SIZE` output rows, and runs every thread of every group in it.
pub fn dispatch<S: VolumeSampler + Sync>(kernel: &SliceKernel<'_, S>, output: &mut [u32]) {
    let uniforms = kernel.uniforms();
    let band_len = (WORKGROUP_SIZE * uniforms.output_width) as usize;
    if band_len == 0 || output.is_empty() {
        return;
    }
    let (groups_x, _, _) = workgroup_count(uniforms.output_width, uniforms.output_height);

    output
        .par_chunks_mut(band_len)
        .enumerate()
        .for_each(|(group_y, band)| {
            let band_start = group_y * band_len;
            for group_x in 0..groups_x {
                for local_y in 0..WORKGROUP_SIZE {
                    for local_x in 0..WORKGROUP_SIZE {
                        let global_id = [
                            group_x * WORKGROUP_SIZE + local_x,
                            group_y as u32 * WORKGROUP_SIZE + local_y,
                            0,
                        ];
                        if let Some(write) = kernel.invoke(global_id) {
                            band[write.index - band_start] = write.value;
                        }
                    }
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Marks every sample it is asked for as full intensity.
    struct FullSampler;

    impl VolumeSampler for FullSampler {
        fn sample_level(&self, _coord: [f32; 3]) -> [f32; 2] {
            [1.0, 1.0]
        }
    }

    #[test]
    fn dispatch_writes_every_pixel_of_unaligned_images() {
        let uniforms = SliceUniforms::new(0, Orientation::Axial, 10, 10, (1, 1, 1));
        let kernel = SliceKernel::new(uniforms, &FullSampler);
        let mut output = vec![0u32; uniforms.output_len()];
        dispatch(&kernel, &mut output);
        assert_eq!(output.len(), 100);
        assert!(output.iter().all(|&v| v == 255));
    }

    #[test]
    fn dispatch_skips_zero_width_images() {
        let uniforms = SliceUniforms::new(0, Orientation::Axial, 0, 10, (1, 1, 1));
        let kernel = SliceKernel::new(uniforms, &FullSampler);
        let mut output = Vec::<u32>::new();
        dispatch(&kernel, &mut output);
        assert!(output.is_empty());
    }

    // Values below stay exact under quantization: v / 65535 * 255 = v / 257.
    fn level(i: usize) -> u16 {
        (i as u16 + 1) * 257 * 10
    }

    #[test]
    fn axial_slice_reads_one_depth_plane() {
        let data = Array3::from_shape_fn((4, 3, 5), |(z, _, _)| level(z));
        let interpolator = CpuInterpolator::new(&data, SamplerConfig::nearest());
        let image = interpolator.extract_slice(2, Orientation::Axial, 5, 3);
        assert_eq!(image.len(), 15);
        assert!(image.iter().all(|&v| v == 30 || v == 29), "{image:?}");
    }

    #[test]
    fn coronal_slice_reads_one_row_plane() {
        let mut data = Array3::<u16>::zeros((4, 3, 5));
        for ((z, y, x), v) in data.indexed_iter_mut() {
            if y == 1 {
                *v = level(x) + z as u16;
            }
        }
        let interpolator = CpuInterpolator::new(&data, SamplerConfig::nearest());
        let image = interpolator.extract_slice(1, Orientation::Coronal, 5, 4);
        assert_eq!(image.len(), 20);
        for row in image.chunks(5) {
            for (x, &v) in row.iter().enumerate() {
                let expected = (level(x) / 257) as u8;
                assert!(v.abs_diff(expected) <= 1, "x={x}: {v} vs {expected}");
            }
        }
    }

    #[test]
    fn sagittal_slice_reads_one_column_plane() {
        let mut data = Array3::from_elem((4, 3, 5), u16::MAX);
        for ((z, y, x), v) in data.indexed_iter_mut() {
            if x == 3 {
                *v = level(z * 3 + y);
            }
        }
        let interpolator = CpuInterpolator::new(&data, SamplerConfig::nearest());
        let image = interpolator.extract_slice(3, Orientation::Sagittal, 3, 4);
        assert_eq!(image.len(), 12);
        for (z, row) in image.chunks(3).enumerate() {
            for (y, &v) in row.iter().enumerate() {
                let expected = (level(z * 3 + y) / 257) as u8;
                assert!(v.abs_diff(expected) <= 1, "y={y} z={z}: {v} vs {expected}");
            }
        }
    }

    #[test]
    fn linear_filter_matches_nearest_on_texel_centers() {
        let data = Array3::from_shape_fn((3, 4, 4), |(z, y, x)| level(z + y + x));
        let nearest = CpuInterpolator::new(&data, SamplerConfig::nearest());
        let linear = CpuInterpolator::new(&data, SamplerConfig::default());
        let a = nearest.extract_slice(1, Orientation::Coronal, 4, 3);
        let b = linear.extract_slice(1, Orientation::Coronal, 4, 3);
        for (x, y) in a.iter().zip(&b) {
            assert!(x.abs_diff(*y) <= 1);
        }
    }
}
