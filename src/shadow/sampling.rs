//! CPU reference for depth-texture sampling
//!
//! Reproduces what a comparison sampler does with a depth texture: address-mode
//! resolution (edge, border, repeat), nearest and bilinear filtering, and the
//! depth comparison itself. The headless backend samples through this module, and
//! tests use it to check the edge/border policy without a GPU.

use crate::backend::{AddressMode, FilterMode, SamplerDescriptor};

/// Square-or-not grid of depth texels, row 0 at `v = 0`
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<f32>,
}

impl DepthImage {
    /// Image filled with `value`
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            texels: vec![value; width as usize * height as usize],
        }
    }

    /// Build from row-major texels; `None` if the length does not match.
    pub fn from_texels(width: u32, height: u32, texels: Vec<f32>) -> Option<Self> {
        (texels.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            texels,
        })
    }

    pub fn texel(&self, x: u32, y: u32) -> f32 {
        self.texels[(y * self.width + x) as usize]
    }

    pub fn set_texel(&mut self, x: u32, y: u32, depth: f32) {
        let index = (y * self.width + x) as usize;
        self.texels[index] = depth;
    }

    pub fn fill(&mut self, depth: f32) {
        self.texels.iter_mut().for_each(|t| *t = depth);
    }

    /// Texel at integer coordinates after address-mode resolution
    fn fetch(&self, x: i64, y: i64, sampler: &SamplerDescriptor) -> f32 {
        let border = sampler
            .border_color
            .map(|c| c.depth_value())
            .unwrap_or(0.0);
        match (
            resolve(x, self.width, sampler.address_mode_u),
            resolve(y, self.height, sampler.address_mode_v),
        ) {
            (Some(x), Some(y)) => self.texel(x, y),
            _ => border,
        }
    }
}

/// Map an integer texel coordinate into `0..size`, or `None` for a border read.
fn resolve(coord: i64, size: u32, mode: AddressMode) -> Option<u32> {
    let n = size as i64;
    let index = match mode {
        AddressMode::ClampToEdge => coord.clamp(0, n - 1),
        AddressMode::ClampToBorder => {
            if coord < 0 || coord >= n {
                return None;
            }
            coord
        }
        AddressMode::Repeat => coord.rem_euclid(n),
        AddressMode::MirrorRepeat => {
            let period = coord.rem_euclid(2 * n);
            if period < n {
                period
            } else {
                2 * n - 1 - period
            }
        }
    };
    Some(index as u32)
}

/// Nearest texel containing `(u, v)`
fn nearest(u: f32, v: f32, image: &DepthImage) -> (i64, i64) {
    (
        (u * image.width as f32).floor() as i64,
        (v * image.height as f32).floor() as i64,
    )
}

/// Raw depth read at `(u, v)` with nearest filtering.
///
/// Coordinates outside `[0, 1)` go through the sampler's address modes: edge
/// clamping repeats the outermost texel, border clamping returns the border
/// color's depth.
pub fn sample_depth(image: &DepthImage, sampler: &SamplerDescriptor, u: f32, v: f32) -> f32 {
    let (x, y) = nearest(u, v, image);
    image.fetch(x, y, sampler)
}

/// Shadow comparison at `(u, v)` against `reference` depth.
///
/// Returns the lit fraction in `[0, 1]`. With linear filtering the four
/// neighbouring comparison results are blended bilinearly (hardware PCF);
/// otherwise a single texel decides. Without a compare function the raw
/// depth is returned.
pub fn compare_depth(
    image: &DepthImage,
    sampler: &SamplerDescriptor,
    u: f32,
    v: f32,
    reference: f32,
) -> f32 {
    let Some(compare) = sampler.compare else {
        return sample_depth(image, sampler, u, v);
    };
    let test = |x: i64, y: i64| -> f32 {
        if compare.passes(reference, image.fetch(x, y, sampler)) {
            1.0
        } else {
            0.0
        }
    };

    match sampler.mag_filter {
        FilterMode::Nearest => {
            let (x, y) = nearest(u, v, image);
            test(x, y)
        }
        FilterMode::Linear => {
            let fx = u * image.width as f32 - 0.5;
            let fy = v * image.height as f32 - 0.5;
            let x0 = fx.floor();
            let y0 = fy.floor();
            let tx = fx - x0;
            let ty = fy - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);

            let top = test(x0, y0) * (1.0 - tx) + test(x0 + 1, y0) * tx;
            let bottom = test(x0, y0 + 1) * (1.0 - tx) + test(x0 + 1, y0 + 1) * tx;
            top * (1.0 - ty) + bottom * ty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BorderColor, CompareFunction};

    fn gradient() -> DepthImage {
        // 2x2: left column 0.2, right column 0.8
        DepthImage::from_texels(2, 2, vec![0.2, 0.8, 0.2, 0.8]).unwrap()
    }

    fn sampler(mode: AddressMode, border: Option<BorderColor>) -> SamplerDescriptor {
        SamplerDescriptor {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode_u: mode,
            address_mode_v: mode,
            border_color: border,
            ..Default::default()
        }
    }

    #[test]
    fn edge_repeats_outermost_texel() {
        let s = sampler(AddressMode::ClampToEdge, None);
        let image = gradient();
        assert_eq!(sample_depth(&image, &s, -0.5, 0.5), 0.2);
        assert_eq!(sample_depth(&image, &s, 1.5, 0.5), 0.8);
        assert_eq!(sample_depth(&image, &s, 1.0, 0.5), 0.8);
    }

    #[test]
    fn border_returns_border_depth() {
        let image = gradient();
        let lit = sampler(AddressMode::ClampToBorder, Some(BorderColor::OpaqueWhite));
        let shadowed = sampler(AddressMode::ClampToBorder, Some(BorderColor::OpaqueBlack));
        assert_eq!(sample_depth(&image, &lit, -0.1, 0.5), 1.0);
        assert_eq!(sample_depth(&image, &shadowed, 0.5, 1.2), 0.0);
        // inside the image the border never shows
        assert_eq!(sample_depth(&image, &lit, 0.25, 0.25), 0.2);
    }

    #[test]
    fn repeat_wraps() {
        let s = sampler(AddressMode::Repeat, None);
        assert_eq!(sample_depth(&gradient(), &s, 1.25, 0.0), 0.2);
        let m = sampler(AddressMode::MirrorRepeat, None);
        assert_eq!(sample_depth(&gradient(), &m, 1.25, 0.0), 0.8);
    }

    #[test]
    fn nearest_comparison_is_binary() {
        let mut s = sampler(AddressMode::ClampToEdge, None);
        s.compare = Some(CompareFunction::LessEqual);
        let image = gradient();
        assert_eq!(compare_depth(&image, &s, 0.25, 0.5, 0.5), 0.0);
        assert_eq!(compare_depth(&image, &s, 0.75, 0.5, 0.5), 1.0);
    }

    #[test]
    fn linear_comparison_blends_neighbours() {
        let mut s = sampler(AddressMode::ClampToEdge, None);
        s.compare = Some(CompareFunction::LessEqual);
        s.mag_filter = FilterMode::Linear;
        s.min_filter = FilterMode::Linear;
        // exactly between the two columns
        let lit = compare_depth(&gradient(), &s, 0.5, 0.5, 0.5);
        assert!((lit - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mismatched_texel_count_is_rejected() {
        assert!(DepthImage::from_texels(2, 2, vec![0.0; 3]).is_none());
    }
}
