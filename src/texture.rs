use ndarray::Array3;

use crate::slice_kernel::VolumeSampler;

/// Encodes a voxel into its two texture channels: `[low, high]`.
#[inline]
pub fn encode_texel(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// A u16 volume packed into two 8-bit channels per texel, the layout of an
/// `Rg8Unorm` 3D texture.
pub struct VolumeTexture {
    width: u32,
    height: u32,
    depth: u32,
    texels: Vec<[u8; 2]>,
}

impl VolumeTexture {
    /// `data` is indexed `(depth, height, width)`.
    pub fn from_array(data: &Array3<u16>) -> Self {
        let (depth, height, width) = data.dim();
        // Logical iteration order, so non-contiguous arrays encode correctly.
        let texels = data.iter().map(|&v| encode_texel(v)).collect();
        Self {
            width: width as u32,
            height: height as u32,
            depth: depth as u32,
            texels,
        }
    }

    /// `(depth, height, width)`, the same order as the source array.
    pub fn dimensions(&self) -> (u32, u32, u32) {
        (self.depth, self.height, self.width)
    }

    /// Raw texel bytes, ready for a texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    #[inline]
    pub fn texel(&self, x: usize, y: usize, z: usize) -> [u8; 2] {
        let (width, height) = (self.width as usize, self.height as usize);
        self.texels[(z * height + y) * width + x]
    }

    /// Binds the texture to a sampler configuration.
    pub fn sampler(&self, config: SamplerConfig) -> TextureSampler<'_> {
        TextureSampler {
            texture: self,
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl AddressMode {
    /// Resolves a possibly out-of-range texel index into `[0, len)`.
    /// `len` must be non-zero.
    #[inline]
    pub fn map_index(self, i: i64, len: usize) -> usize {
        let len = len as i64;
        let mapped = match self {
            AddressMode::ClampToEdge => i.clamp(0, len - 1),
            AddressMode::Repeat => i.rem_euclid(len),
            AddressMode::MirrorRepeat => {
                let r = i.rem_euclid(2 * len);
                if r < len { r } else { 2 * len - 1 - r }
            }
        };
        mapped as usize
    }
}

/// Filtering and addressing used when the slice kernel samples the volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerConfig {
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

impl SamplerConfig {
    pub fn nearest() -> Self {
        Self {
            filter: FilterMode::Nearest,
            ..Default::default()
        }
    }
}

/// CPU sampling of a [`VolumeTexture`] with normalized coordinates.
pub struct TextureSampler<'a> {
    texture: &'a VolumeTexture,
    config: SamplerConfig,
}

impl TextureSampler<'_> {
    #[inline]
    fn fetch(&self, x: i64, y: i64, z: i64) -> [f32; 2] {
        let mode = self.config.address_mode;
        let t = self.texture;
        let [low, high] = t.texel(
            mode.map_index(x, t.width as usize),
            mode.map_index(y, t.height as usize),
            mode.map_index(z, t.depth as usize),
        );
        [low as f32 / 255.0, high as f32 / 255.0]
    }

    fn sample_nearest(&self, coord: [f32; 3]) -> [f32; 2] {
        let t = self.texture;
        let x = (coord[0] * t.width as f32).floor() as i64;
        let y = (coord[1] * t.height as f32).floor() as i64;
        let z = (coord[2] * t.depth as f32).floor() as i64;
        self.fetch(x, y, z)
    }

    fn sample_linear(&self, coord: [f32; 3]) -> [f32; 2] {
        let t = self.texture;
        let sx = coord[0] * t.width as f32 - 0.5;
        let sy = coord[1] * t.height as f32 - 0.5;
        let sz = coord[2] * t.depth as f32 - 0.5;

        let (x0, y0, z0) = (sx.floor(), sy.floor(), sz.floor());
        let (dx, dy, dz) = (sx - x0, sy - y0, sz - z0);
        let (x0, y0, z0) = (x0 as i64, y0 as i64, z0 as i64);

        let lerp = |a: [f32; 2], b: [f32; 2], w: f32| {
            [
                a[0].mul_add(1.0 - w, b[0] * w),
                a[1].mul_add(1.0 - w, b[1] * w),
            ]
        };
        let plane = |z: i64| {
            let top = lerp(self.fetch(x0, y0, z), self.fetch(x0 + 1, y0, z), dx);
            let bottom = lerp(self.fetch(x0, y0 + 1, z), self.fetch(x0 + 1, y0 + 1, z), dx);
            lerp(top, bottom, dy)
        };

        lerp(plane(z0), plane(z0 + 1), dz)
    }
}

impl VolumeSampler for TextureSampler<'_> {
    fn sample_level(&self, coord: [f32; 3]) -> [f32; 2] {
        match self.config.filter {
            FilterMode::Nearest => self.sample_nearest(coord),
            FilterMode::Linear => self.sample_linear(coord),
        }
    }
}
