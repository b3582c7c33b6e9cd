//! Animated lighting for the blob field.
//!
//! A hemisphere fill, two directional lights and one point light, each moving
//! on its own sinusoidal orbit with its own intensity curve. Everything is a
//! pure function of elapsed time: the same `t` always lights the scene the
//! same way, but the mismatched periods keep it from visibly repeating.

use bytemuck::{Pod, Zeroable};

/// Convert a `0xRRGGBB` sRGB color to linear RGB.
pub fn hex_to_linear(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [channel(16), channel(8), channel(0)]
}

const GOLD: u32 = 0xf0b90b;
const WARM_YELLOW: u32 = 0xffd700;
const WHITE: u32 = 0xffffff;

/// A directional light: position (light points toward the origin), color, intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
    /// Distance at which the light fades out completely.
    pub range: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky: [f32; 3],
    pub ground: [f32; 3],
    pub intensity: f32,
}

/// The light set for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub hemisphere: HemisphereLight,
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
    pub point: PointLight,
    /// Material self-illumination color and strength.
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
}

impl LightRig {
    /// Light positions and intensities at `t` seconds.
    pub fn at(t: f32) -> Self {
        Self {
            hemisphere: HemisphereLight {
                sky: hex_to_linear(WHITE),
                ground: hex_to_linear(GOLD),
                intensity: 0.6,
            },
            key: DirectionalLight {
                position: [(t * 0.5).sin() * 300.0, (t * 0.3).cos() * 200.0 + 300.0, 400.0],
                color: hex_to_linear(WARM_YELLOW),
                intensity: 0.6 + (t * 0.7).sin() * 0.2,
            },
            fill: DirectionalLight {
                position: [(t * 0.4).cos() * 300.0, (t * 0.5).sin() * 200.0 + 300.0, 400.0],
                color: hex_to_linear(GOLD),
                intensity: 0.5 + (t * 0.6).cos() * 0.2,
            },
            point: PointLight {
                position: [(t * 0.8).sin() * 250.0, (t * 0.8).cos() * 250.0, 200.0],
                color: hex_to_linear(WHITE),
                intensity: 1.2 + (t * 1.2).sin() * 0.5,
                range: 800.0,
            },
            emissive: hex_to_linear(GOLD),
            emissive_intensity: 0.4,
        }
    }

    pub fn to_uniforms(&self) -> LightingUniforms {
        let rgba = |c: [f32; 3], a: f32| [c[0], c[1], c[2], a];
        LightingUniforms {
            sky_color: rgba(self.hemisphere.sky, self.hemisphere.intensity),
            ground_color: rgba(self.hemisphere.ground, 0.0),
            key_position: rgba(self.key.position, self.key.intensity),
            key_color: rgba(self.key.color, 0.0),
            fill_position: rgba(self.fill.position, self.fill.intensity),
            fill_color: rgba(self.fill.color, 0.0),
            point_position: rgba(self.point.position, self.point.intensity),
            point_color: rgba(self.point.color, self.point.range),
            emissive: rgba(self.emissive, self.emissive_intensity),
        }
    }
}

// ============================================================================
// GPU Uniforms
// ============================================================================

/// GPU-ready lighting uniforms. Matches `Lighting` in shader.wgsl.
///
/// Scalars ride in the `w` lane of the vec4 they belong to.
/// Total size: 144 bytes (16-byte aligned).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    /// Hemisphere sky color (rgb), a = hemisphere intensity.
    pub sky_color: [f32; 4],
    /// Hemisphere ground color (rgb).
    pub ground_color: [f32; 4],
    /// Key light position (xyz), w = intensity.
    pub key_position: [f32; 4],
    pub key_color: [f32; 4],
    /// Fill light position (xyz), w = intensity.
    pub fill_position: [f32; 4],
    pub fill_color: [f32; 4],
    /// Point light position (xyz), w = intensity.
    pub point_position: [f32; 4],
    /// Point light color (rgb), w = range.
    pub point_color: [f32; 4],
    /// Emissive color (rgb), a = emissive intensity.
    pub emissive: [f32; 4],
}
