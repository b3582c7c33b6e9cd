//! Offscreen GPU renderer for the blob field.
//!
//! Draws every blob of a `BackgroundScene` into an RGBA texture with a depth
//! buffer, and can read the frame back for export.

use std::iter;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::background::BackgroundScene;
use crate::camera::CameraUniforms;
use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::lifecycle::RenderSurface;
use crate::lighting::LightingUniforms;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

/// Per-frame uniforms. Matches `Frame` in shader.wgsl.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FrameUniforms {
    pub camera: CameraUniforms,
    pub lighting: LightingUniforms,
}

/// Per-blob uniforms, one dynamic-offset slot each.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct BlobUniforms {
    model: [[f32; 4]; 4],
    // Padding to reach 256-byte alignment (64 bytes of data + 192 bytes padding)
    _padding: [f32; 48],
}

struct BlobBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

struct Targets {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl Targets {
    fn new(device: &wgpu::Device, size: wgpu::Extent3d) -> Self {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Blob Color Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Blob Depth Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let padded_bytes_per_row = padded_bytes_per_row(size.width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blob Readback Buffer"),
            size: (padded_bytes_per_row * size.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            depth,
            readback,
            padded_bytes_per_row,
        }
    }

    fn destroy(&self) {
        self.color.destroy();
        self.depth.destroy();
        self.readback.destroy();
    }
}

/// Row pitch for texture-to-buffer copies, padded to wgpu's 256-byte rule.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = std::mem::size_of::<u32>() as u32 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded + (align - unpadded % align) % align
}

pub struct BlobRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: wgpu::Extent3d,

    pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    blob_uniform_buffer: wgpu::Buffer,
    blob_bind_group: wgpu::BindGroup,

    blobs: Vec<BlobBuffers>,
    targets: Targets,
    disposed: bool,
}

impl BlobRenderer {
    /// Allocate buffers sized for `scene`'s blobs and targets of `width` x `height`.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32, scene: &BackgroundScene) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        let frame_uniforms = FrameUniforms {
            camera: scene.camera().to_uniforms(),
            lighting: scene.lights().to_uniforms(),
        };
        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniform Buffer"),
            contents: bytemuck::cast_slice(&[frame_uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let frame_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<FrameUniforms>() as u64),
                },
                count: None,
            }],
            label: Some("frame_bind_group_layout"),
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &frame_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
            label: Some("frame_bind_group"),
        });

        // One slot per blob in a single dynamic uniform buffer
        let blob_count = scene.blobs().len().max(1);
        let blob_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blob Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * blob_count) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let blob_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<BlobUniforms>() as u64),
                },
                count: None,
            }],
            label: Some("blob_bind_group_layout"),
        });
        let blob_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &blob_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &blob_uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<BlobUniforms>() as u64),
                }),
            }],
            label: Some("blob_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blob Pipeline Layout"),
            bind_group_layouts: &[&frame_bind_group_layout, &blob_bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = pipeline::create_blob_pipeline(&device, &pipeline_layout, COLOR_FORMAT);

        let blobs = scene
            .blobs()
            .iter()
            .map(|blob| BlobBuffers {
                vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Blob Vertex Buffer"),
                    contents: bytemuck::cast_slice(blob.vertices()),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                }),
                index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Blob Index Buffer"),
                    contents: bytemuck::cast_slice(blob.indices()),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                num_indices: blob.indices().len() as u32,
            })
            .collect();

        let targets = Targets::new(&device, size);

        Self {
            device,
            queue,
            size,
            pipeline,
            frame_buffer,
            frame_bind_group,
            blob_uniform_buffer,
            blob_bind_group,
            blobs,
            targets,
            disposed: false,
        }
    }

    /// Request a headless adapter and device, then build the renderer.
    pub async fn headless(width: u32, height: u32, scene: &BackgroundScene) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;
        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await?;

        Ok(Self::new(device, queue, width, height, scene))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Upload the scene's current vertices and uniforms and draw one frame.
    pub fn render(&mut self, scene: &BackgroundScene) {
        if self.disposed {
            return;
        }

        let frame_uniforms = FrameUniforms {
            camera: scene.camera().to_uniforms(),
            lighting: scene.lights().to_uniforms(),
        };
        self.queue.write_buffer(&self.frame_buffer, 0, bytemuck::cast_slice(&[frame_uniforms]));

        // All writes happen before the pass; queue.write_buffer is not recorded in the command stream
        for (i, (blob, buffers)) in scene.blobs().iter().zip(&self.blobs).enumerate() {
            let uniforms = BlobUniforms {
                model: blob.model_matrix().to_cols_array_2d(),
                _padding: [0.0; 48],
            };
            self.queue.write_buffer(
                &self.blob_uniform_buffer,
                (i * UNIFORM_ALIGNMENT) as u64,
                bytemuck::cast_slice(&[uniforms]),
            );
            self.queue.write_buffer(&buffers.vertex_buffer, 0, bytemuck::cast_slice(blob.vertices()));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blob Render Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blob Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        // Transparent so the page shows through
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
            for (i, buffers) in self.blobs.iter().enumerate().take(scene.blobs().len()) {
                let dynamic_offset = (i * UNIFORM_ALIGNMENT) as u32;
                render_pass.set_bind_group(1, &self.blob_bind_group, &[dynamic_offset]);
                render_pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
                render_pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..buffers.num_indices, 0, 0..1);
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
    }

    /// Copy the last rendered frame to tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> anyhow::Result<Vec<u8>> {
        if self.disposed {
            anyhow::bail!("Renderer has been disposed");
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blob Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.targets.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.targets.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.targets.padded_bytes_per_row),
                    rows_per_image: Some(self.size.height),
                },
            },
            self.size,
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.targets.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let row_bytes = (self.size.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.size.height as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in 0..self.size.height {
                let start = (row * self.targets.padded_bytes_per_row) as usize;
                pixels.extend_from_slice(&data[start..start + row_bytes]);
            }
        }
        self.targets.readback.unmap();

        Ok(pixels)
    }

    /// Recreate the color, depth and readback targets. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.disposed || width == 0 || height == 0 {
            return;
        }
        if width == self.size.width && height == self.size.height {
            return;
        }
        self.size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        self.targets.destroy();
        self.targets = Targets::new(&self.device, self.size);
    }

    /// Destroy every GPU buffer and texture this renderer created.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for blob in &self.blobs {
            blob.vertex_buffer.destroy();
            blob.index_buffer.destroy();
        }
        self.blobs.clear();
        self.frame_buffer.destroy();
        self.blob_uniform_buffer.destroy();
        self.targets.destroy();
        self.disposed = true;
        log::debug!("Blob renderer disposed");
    }
}

impl RenderSurface for BlobRenderer {
    fn resize(&mut self, width: u32, height: u32) {
        BlobRenderer::resize(self, width, height);
    }

    fn draw(&mut self, scene: &BackgroundScene) {
        self.render(scene);
    }

    fn dispose(&mut self) {
        BlobRenderer::dispose(self);
    }
}
