use dicom_mpr::slice_kernel::{
    SliceKernel, SliceUniforms, VolumeSampler, decode_intensity, quantize,
};
use dicom_mpr::{
    CpuInterpolator, GpuError, GpuInterpolator, Interpolation, Orientation, Processor,
    SamplerConfig, Volume, VolumeError, VolumeTexture, WGPU,
};
use ndarray::Array3;

fn phantom() -> Array3<u16> {
    // A bright cube centered in a dark 16x12x10 volume.
    Array3::from_shape_fn((10, 12, 16), |(z, y, x)| {
        let inside = (3..7).contains(&z) && (4..8).contains(&y) && (5..11).contains(&x);
        if inside { 60_000 } else { 1_000 }
    })
}

#[test]
fn cpu_slices_cut_through_the_cube() {
    let data = phantom();
    let interpolator = CpuInterpolator::new(&data, SamplerConfig::nearest());

    let axial = interpolator.extract_slice(5, Orientation::Axial, 16, 12);
    let coronal = interpolator.extract_slice(5, Orientation::Coronal, 16, 10);
    let sagittal = interpolator.extract_slice(7, Orientation::Sagittal, 12, 10);

    let bright = (60_000.0f32 / 65535.0 * 255.0) as u8;
    let dark = (1_000.0f32 / 65535.0 * 255.0) as u8;
    let at = |image: &[u8], width: usize, x: usize, y: usize| image[y * width + x];

    assert!(at(&axial, 16, 7, 5).abs_diff(bright) <= 1);
    assert!(at(&axial, 16, 0, 0).abs_diff(dark) <= 1);
    assert!(at(&coronal, 16, 7, 4).abs_diff(bright) <= 1);
    assert!(at(&coronal, 16, 7, 8).abs_diff(dark) <= 1);
    assert!(at(&sagittal, 12, 5, 3).abs_diff(bright) <= 1);
    assert!(at(&sagittal, 12, 11, 3).abs_diff(dark) <= 1);
}

#[test]
fn unknown_orientation_codes_render_sagittal() {
    let data = phantom();
    let texture = VolumeTexture::from_array(&data);
    let sampler = texture.sampler(SamplerConfig::default());

    let sagittal = SliceUniforms::new(7, Orientation::Sagittal, 12, 10, texture.dimensions());
    let unknown = SliceUniforms {
        orientation: 7,
        ..sagittal
    };
    let a = SliceKernel::new(sagittal, &sampler);
    let b = SliceKernel::new(unknown, &sampler);
    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(a.invoke([x, y, 0]), b.invoke([x, y, 0]));
        }
    }
}

#[test]
fn out_of_range_slice_defers_to_address_mode() {
    let data = phantom();
    let texture = VolumeTexture::from_array(&data);
    let sampler = texture.sampler(SamplerConfig::nearest());
    let uniforms = SliceUniforms::new(40, Orientation::Axial, 16, 12, texture.dimensions());
    let kernel = SliceKernel::new(uniforms, &sampler);

    // Clamp to edge reads the last stored slice.
    let [r, g] = sampler.sample_level([0.0, 0.0, 1.0]);
    let write = kernel.invoke([0, 0, 0]).expect("in bounds");
    assert_eq!(write.index, 0);
    assert_eq!(write.value, quantize(decode_intensity(r, g)));
}

#[tokio::test]
async fn volume_rejects_slices_outside_the_volume() {
    let mut volume = Volume::new(phantom(), (1.0, 1.0, 1.0));
    let result = volume
        .get_image_from_axis(
            12,
            Orientation::Coronal,
            Interpolation::Linear(Processor::CPU),
        )
        .await;
    assert!(matches!(
        result,
        Err(VolumeError::IndexOutOfRange { index: 12, max: 12, .. })
    ));
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn gpu_matches_cpu() {
    let data = phantom();
    let wgpu = WGPU::request().await.expect("gpu adapter");
    let texture = VolumeTexture::from_array(&data);
    let gpu = GpuInterpolator::new(&texture, SamplerConfig::nearest(), wgpu)
        .await
        .expect("gpu interpolator");
    let cpu = CpuInterpolator::new(&data, SamplerConfig::nearest());

    for (orientation, index, width, height) in [
        (Orientation::Axial, 5, 16, 12),
        (Orientation::Coronal, 5, 13, 9),
        (Orientation::Sagittal, 7, 12, 10),
    ] {
        let expected = cpu.extract_slice(index, orientation, width, height);
        let actual = gpu
            .extract_slice(index, orientation, width, height)
            .await
            .expect("gpu slice");
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            assert!(a.abs_diff(*e) <= 1, "{orientation:?}: {a} vs {e}");
        }
    }
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn gpu_uploads_512_wide_volumes() {
    // Wider than the 256 texels allowed by downlevel limits.
    let data = Array3::from_elem((4, 512, 512), 30_000u16);
    let wgpu = WGPU::request().await.expect("gpu adapter");
    let texture = VolumeTexture::from_array(&data);
    let gpu = match GpuInterpolator::new(&texture, SamplerConfig::default(), wgpu).await {
        Ok(gpu) => gpu,
        // Adapters below 512 texels must fail with an error, not a panic.
        Err(GpuError::TextureTooLarge { max, .. }) => {
            assert!(max < 512);
            return;
        }
        Err(error) => panic!("unexpected error: {error}"),
    };

    let image = gpu
        .extract_slice(200, Orientation::Coronal, 512, 8)
        .await
        .expect("coronal slice");
    assert_eq!(image.len(), 512 * 8);
    // 30000 / 65535 * 255 = 116.7
    assert!(image.iter().all(|&v| v.abs_diff(116) <= 1));
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn volume_renders_512_wide_volumes_on_gpu() {
    let data = Array3::from_elem((4, 512, 512), 30_000u16);
    let mut volume = Volume::new(data, (1.0, 1.0, 2.0));
    let image = volume
        .get_image_from_axis(
            100,
            Orientation::Sagittal,
            Interpolation::Linear(Processor::GPU),
        )
        .await
        .expect("sagittal slice");
    let expected = volume.output_dimensions(Orientation::Sagittal);
    assert_eq!(image.dimensions(), expected);
    assert!(image.pixels().all(|p| p[0].abs_diff(116) <= 1));
}
