//! Animated blob field.
//!
//! A handful of spheres float at fixed offsets. Every frame each sphere's
//! vertices are pushed in or out along their radius by a 3D noise field that
//! drifts with time, and the pointer's vertical position controls how far.
//! The scene owns all of its state; nothing here touches the GPU.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use rand::Rng;

use crate::camera::PerspectiveCamera;
use crate::gpu::mesh::{compute_vertex_normals, create_sphere_geometry, Vertex};
use crate::lighting::LightRig;
use crate::noise::Noise3;
use crate::pointer::PointerState;

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundConfig {
    pub blob_count: usize,
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
    pub min_distance: f32,           // Minimum distance between blob centers
    pub spawn_extents: Vec3,         // Full box size, centered on origin
    pub max_placement_attempts: u32, // Per blob; the last candidate wins when exhausted
    pub noise_frequency: f32,
    pub time_scale: Vec3, // Noise drift per elapsed millisecond
    pub index_phase: Vec3, // Noise offset per blob index
    pub amplitude: f32,
    pub pointer_bias: f32,
    pub base_scale: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            blob_count: 5,
            radius: 120.0,
            width_segments: 128,
            height_segments: 128,
            min_distance: 300.0,
            spawn_extents: Vec3::new(1000.0, 700.0, 600.0),
            max_placement_attempts: 100,
            noise_frequency: 0.006,
            time_scale: Vec3::new(0.0002, 0.0003, 0.0),
            index_phase: Vec3::new(0.5, 0.3, 0.2),
            amplitude: 0.4,
            pointer_bias: 0.1,
            base_scale: 0.8,
        }
    }
}

/// Radial scale for one vertex given its noise sample and the smoothed pointer height.
pub fn displacement_ratio(noise: f32, pointer_y: f32, config: &BackgroundConfig) -> f32 {
    noise * config.amplitude * (pointer_y + config.pointer_bias) + config.base_scale
}

// ============================================================================
// Placement
// ============================================================================

/// Result of blob placement. `capped[i]` is true when blob `i` ran out of
/// attempts and kept its last candidate, which may sit too close to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub offsets: Vec<Vec3>,
    pub capped: Vec<bool>,
}

impl Placement {
    pub fn capped_count(&self) -> usize {
        self.capped.iter().filter(|c| **c).count()
    }
}

fn random_point<R: Rng + ?Sized>(rng: &mut R, extents: Vec3) -> Vec3 {
    Vec3::new(
        (rng.gen::<f32>() - 0.5) * extents.x,
        (rng.gen::<f32>() - 0.5) * extents.y,
        (rng.gen::<f32>() - 0.5) * extents.z,
    )
}

/// Rejection-sample blob centers so that no two are closer than
/// `min_distance`, giving up per blob after `max_placement_attempts`.
pub fn place_blobs<R: Rng + ?Sized>(rng: &mut R, config: &BackgroundConfig) -> Placement {
    let mut offsets: Vec<Vec3> = Vec::with_capacity(config.blob_count);
    let mut capped = Vec::with_capacity(config.blob_count);

    for i in 0..config.blob_count {
        let mut attempts = 0;
        let (offset, clear) = loop {
            let candidate = random_point(rng, config.spawn_extents);
            attempts += 1;
            let clear = offsets.iter().all(|o| o.distance(candidate) >= config.min_distance);
            if clear || attempts >= config.max_placement_attempts {
                break (candidate, clear);
            }
        };
        if !clear {
            log::debug!("Blob {} placed after {} attempts without clearance", i, attempts);
        }
        offsets.push(offset);
        capped.push(!clear);
    }

    Placement { offsets, capped }
}

// ============================================================================
// Blob
// ============================================================================

/// One sphere: immutable rest positions plus the displaced copy that gets drawn.
#[derive(Debug, Clone)]
pub struct Blob {
    pub index: usize,
    pub offset: Vec3,
    originals: Arc<[[f32; 3]]>,
    live: Vec<Vertex>,
    indices: Arc<[u32]>,
}

impl Blob {
    pub fn originals(&self) -> &[[f32; 3]] {
        &self.originals
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.live
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.offset)
    }

    fn displace(&mut self, noise: &Noise3, config: &BackgroundConfig, time: Vec3, pointer_y: f32) {
        let phase = config.index_phase * self.index as f32;
        for (vertex, base) in self.live.iter_mut().zip(self.originals.iter()) {
            let base = Vec3::from_array(*base);
            let p = base * config.noise_frequency + time + phase;
            let ratio = displacement_ratio(noise.sample(p.x, p.y, p.z), pointer_y, config);
            vertex.position = (base * ratio).to_array();
        }
        compute_vertex_normals(&mut self.live, &self.indices);
    }
}

// ============================================================================
// Scene
// ============================================================================

pub struct BackgroundScene {
    config: BackgroundConfig,
    noise: Noise3,
    placement: Placement,
    blobs: Vec<Blob>,
    camera: PerspectiveCamera,
    lights: LightRig,
    elapsed_ms: f64,
}

impl BackgroundScene {
    /// Build the scene. `rng` seeds both the noise field and the placement.
    pub fn new<R: Rng + ?Sized>(config: BackgroundConfig, rng: &mut R) -> Self {
        let noise = Noise3::new(rng);
        let placement = place_blobs(rng, &config);

        let (vertices, indices) =
            create_sphere_geometry(config.radius, config.width_segments, config.height_segments);
        let originals: Arc<[[f32; 3]]> = vertices.iter().map(|v| v.position).collect();
        let indices: Arc<[u32]> = indices.into();

        let blobs = placement
            .offsets
            .iter()
            .enumerate()
            .map(|(index, offset)| Blob {
                index,
                offset: *offset,
                originals: Arc::clone(&originals),
                live: vertices.clone(),
                indices: Arc::clone(&indices),
            })
            .collect();

        log::info!(
            "Background scene: {} blobs, {} vertices each, {} capped placements",
            config.blob_count,
            vertices.len(),
            placement.capped_count()
        );

        Self {
            config,
            noise,
            placement,
            blobs,
            camera: PerspectiveCamera::default(),
            lights: LightRig::at(0.0),
            elapsed_ms: 0.0,
        }
    }

    /// Advance to `elapsed_ms` since mount: displace every blob, recompute its
    /// normals and move the lights.
    pub fn update(&mut self, elapsed_ms: f64, pointer: &PointerState) {
        self.elapsed_ms = elapsed_ms;
        let ts = self.config.time_scale;
        let time = Vec3::new(
            (elapsed_ms * ts.x as f64) as f32,
            (elapsed_ms * ts.y as f64) as f32,
            (elapsed_ms * ts.z as f64) as f32,
        );
        let pointer_y = pointer.smoothed().y;

        let noise = &self.noise;
        let config = &self.config;
        for blob in self.blobs.iter_mut() {
            blob.displace(noise, config, time, pointer_y);
        }

        self.lights = LightRig::at((elapsed_ms * 0.001) as f32);
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn lights(&self) -> &LightRig {
        &self.lights
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }
}
