//! The draw-call layer behind the frame loop.
//!
//! The viewer decides *what* to draw each frame (which nodes, in which
//! passes, in which order) and hands the plan to a [`DrawBackend`].
//! [`GpuRenderer`] is the wgpu implementation; tests substitute a recording
//! backend.

use anyhow::Result;
use cgmath::{Matrix4, Point3, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::{
    context::Context,
    data_structures::{
        asset::{Asset, MaterialDescriptor},
        texture::{Texture, create_default_sampler, sampler_from_descriptor},
    },
    pipelines::scene::{camera_layout, material_layout, mk_blend_pipeline, mk_opaque_pipeline},
};

/// One pass of a frame plan: node indices plus whether they composite with
/// alpha blending. Blended passes arrive pre-sorted back-to-front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawPass {
    pub nodes: Vec<usize>,
    pub blended: bool,
}

/// The camera state resolved for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameCamera {
    pub view_proj: Matrix4<f32>,
    pub eye: Point3<f32>,
}

/// Issues the draw calls for a frame plan. The backend owns all GPU state
/// derived from the current asset and rebuilds it when the asset generation
/// changes.
pub trait DrawBackend {
    /// Release all resources derived from the outgoing asset. Called while
    /// rendering is gated off, before the next asset becomes visible.
    fn retire(&mut self);

    fn resize(&mut self, width: u32, height: u32);

    fn render(
        &mut self,
        asset: &Asset,
        passes: &[DrawPass],
        camera: &FrameCamera,
        scale: f32,
    ) -> Result<()>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NodeTransformRaw {
    model: [[f32; 4]; 4],
}

impl NodeTransformRaw {
    const ATTRIBS: [wgpu::VertexAttribute; 4] =
        wgpu::vertex_attr_array![5 => Float32x4, 6 => Float32x4, 7 => Float32x4, 8 => Float32x4];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<NodeTransformRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MaterialUniform {
    base_color_factor: [f32; 4],
}

struct PrimitiveGpu {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_elements: u32,
    material: Option<usize>,
}

struct NodeGpu {
    transform_buffer: wgpu::Buffer,
    primitives: Vec<PrimitiveGpu>,
}

struct MaterialGpu {
    #[allow(unused)]
    texture: Texture,
    bind_group: wgpu::BindGroup,
}

/// GPU resources derived from one published asset.
struct AssetGpu {
    generation: u64,
    nodes: Vec<Option<NodeGpu>>,
    materials: Vec<MaterialGpu>,
    default_material: MaterialGpu,
}

/// The wgpu draw backend: two scene pipelines plus per-asset buffers, bind
/// groups and textures.
pub struct GpuRenderer {
    pub ctx: Context,
    opaque_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
    material_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    asset_gpu: Option<AssetGpu>,
}

impl GpuRenderer {
    pub fn new(ctx: Context) -> Self {
        let device = &ctx.device;
        let material_layout = material_layout(device);
        let camera_layout = camera_layout(device);

        let camera_uniform = CameraUniform {
            view_proj: Matrix4::identity().into(),
        };
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let opaque_pipeline =
            mk_opaque_pipeline(device, &ctx.config, &material_layout, &camera_layout);
        let blend_pipeline =
            mk_blend_pipeline(device, &ctx.config, &material_layout, &camera_layout);

        Self {
            ctx,
            opaque_pipeline,
            blend_pipeline,
            material_layout,
            camera_buffer,
            camera_bind_group,
            asset_gpu: None,
        }
    }

    fn upload(&mut self, asset: &Asset) {
        let device = &self.ctx.device;

        let materials = asset
            .materials
            .iter()
            .map(|material| self.mk_material(asset, material))
            .collect();
        let default_material = self.mk_material(asset, &MaterialDescriptor::default());

        let nodes = asset
            .nodes
            .iter()
            .map(|node| {
                let mesh = node.mesh.and_then(|m| asset.meshes.get(m))?;
                let raw = NodeTransformRaw {
                    model: node.world.into(),
                };
                let transform_buffer =
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Node Transform Buffer"),
                        contents: bytemuck::cast_slice(&[raw]),
                        usage: wgpu::BufferUsages::VERTEX,
                    });
                let primitives = mesh
                    .primitives
                    .iter()
                    .filter(|primitive| !primitive.vertices.is_empty())
                    .map(|primitive| PrimitiveGpu {
                        vertex_buffer: device.create_buffer_init(
                            &wgpu::util::BufferInitDescriptor {
                                label: Some("Primitive Vertex Buffer"),
                                contents: bytemuck::cast_slice(&primitive.vertices),
                                usage: wgpu::BufferUsages::VERTEX,
                            },
                        ),
                        index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Primitive Index Buffer"),
                            contents: bytemuck::cast_slice(&primitive.indices),
                            usage: wgpu::BufferUsages::INDEX,
                        }),
                        num_elements: primitive.indices.len() as u32,
                        material: primitive.material,
                    })
                    .collect();
                Some(NodeGpu {
                    transform_buffer,
                    primitives,
                })
            })
            .collect();

        self.asset_gpu = Some(AssetGpu {
            generation: asset.generation,
            nodes,
            materials,
            default_material,
        });
    }

    fn mk_material(&self, asset: &Asset, material: &MaterialDescriptor) -> MaterialGpu {
        let device = &self.ctx.device;
        let queue = &self.ctx.queue;

        // Resolve the base color image through the texture table; anything
        // missing or unloaded falls back to the placeholder upload.
        let texture_descriptor = material
            .base_color_texture
            .and_then(|index| asset.textures.get(index));
        let pixels = texture_descriptor
            .and_then(|t| t.images.first())
            .and_then(|&index| asset.images.get(index))
            .and_then(|image| image.pixels());
        let sampler = texture_descriptor
            .and_then(|t| t.sampler)
            .and_then(|index| asset.samplers.get(index));

        let texture = match pixels {
            Some(pixels) => {
                Texture::from_pixels(device, queue, pixels, sampler, material.name.as_deref())
            }
            None => Texture::from_pixels(
                device,
                queue,
                &crate::data_structures::image::Pixels::Placeholder,
                None,
                Some("untextured material"),
            ),
        };

        let factor_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Factor Buffer"),
            contents: bytemuck::cast_slice(&[MaterialUniform {
                base_color_factor: material.base_color_factor,
            }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let sampler = match sampler {
            Some(descriptor) => sampler_from_descriptor(device, descriptor),
            None => create_default_sampler(device),
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: factor_buffer.as_entire_binding(),
                },
            ],
            label: material.name.as_deref(),
        });

        MaterialGpu {
            texture,
            bind_group,
        }
    }
}

impl DrawBackend for GpuRenderer {
    fn retire(&mut self) {
        // Dropping the per-asset GPU data releases its buffers and textures
        // before the next asset's loads begin.
        self.asset_gpu = None;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }

    fn render(
        &mut self,
        asset: &Asset,
        passes: &[DrawPass],
        camera: &FrameCamera,
        scale: f32,
    ) -> Result<()> {
        if self
            .asset_gpu
            .as_ref()
            .is_none_or(|gpu| gpu.generation != asset.generation)
        {
            self.upload(asset);
        }

        let view_proj = camera.view_proj * Matrix4::from_scale(scale);
        self.ctx.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[CameraUniform {
                view_proj: view_proj.into(),
            }]),
        );

        let output = match self.ctx.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = (self.ctx.config.width, self.ctx.config.height);
                self.ctx.resize(width, height);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            let Some(gpu) = self.asset_gpu.as_ref() else {
                return Ok(());
            };
            for pass in passes {
                render_pass.set_pipeline(if pass.blended {
                    &self.blend_pipeline
                } else {
                    &self.opaque_pipeline
                });
                for &node_index in &pass.nodes {
                    let Some(Some(node)) = gpu.nodes.get(node_index) else {
                        continue;
                    };
                    render_pass.set_vertex_buffer(1, node.transform_buffer.slice(..));
                    for primitive in &node.primitives {
                        let material = primitive
                            .material
                            .and_then(|index| gpu.materials.get(index))
                            .unwrap_or(&gpu.default_material);
                        render_pass.set_bind_group(0, &material.bind_group, &[]);
                        render_pass.set_bind_group(1, &self.camera_bind_group, &[]);
                        render_pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
                        render_pass.set_index_buffer(
                            primitive.index_buffer.slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        render_pass.draw_indexed(0..primitive.num_elements, 0, 0..1);
                    }
                }
            }
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
