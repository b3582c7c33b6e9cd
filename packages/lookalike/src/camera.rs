//! Perspective camera for the blob field.
//!
//! The camera sits off-center and looks straight down -Z; it is never aimed
//! at the origin, so the blob field appears shifted to the left.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Vertical field of view in degrees.
pub const DEFAULT_FOV: f32 = 100.0;
pub const DEFAULT_NEAR: f32 = 0.1;
pub const DEFAULT_FAR: f32 = 10_000.0;
pub const DEFAULT_POSITION: Vec3 = Vec3::new(120.0, 0.0, 300.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    /// View direction (normalized on use).
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            position: DEFAULT_POSITION,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: DEFAULT_FOV,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            aspect: 1.0,
        }
    }
}

impl PerspectiveCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self::default();
        camera.set_viewport(width, height);
        camera
    }

    /// Update the aspect ratio from viewport dimensions.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.set_aspect(width.max(1) as f32 / height.max(1) as f32);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction.normalize(), self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn to_uniforms(&self) -> CameraUniforms {
        CameraUniforms {
            view_proj: self.view_projection().to_cols_array_2d(),
            position: self.position.extend(1.0).to_array(),
        }
    }
}

/// GPU-ready camera uniforms. Matches `Camera` in shader.wgsl.
/// Total size: 80 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// World-space eye position (w = 1).
    pub position: [f32; 4],
}
