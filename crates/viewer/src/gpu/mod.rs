//! wgpu backend: surface ownership, the model pipeline, and atlas textures.
//!
//! [`GpuRenderer`] is the concrete [`RenderTarget`]. It renders either
//! straight to the window surface or, when wrapped by [`Composer`], into an
//! offscreen color target that a post-processing pass resolves to the
//! surface.

mod composer;
mod context;
mod mesh;

use std::borrow::Cow;

use anyhow::{Context as AnyhowContext, Result};
use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::backend::{RenderTarget, ScenePacket};
use crate::model::{cuboid_spec, PartId};
use crate::viewer::ViewerOptions;
use context::GpuContext;
use mesh::{build_cuboid, Vertex};

pub(crate) use composer::Composer;

const MODEL_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec3 position;
layout(location = 1) in vec2 uv;
layout(location = 0) out vec2 v_uv;

layout(std140, set = 0, binding = 0) uniform Globals {
    mat4 view_projection;
} globals;

layout(std140, set = 1, binding = 0) uniform Part {
    mat4 model;
} part;

void main() {
    v_uv = uv;
    gl_Position = globals.view_projection * part.model * vec4(position, 1.0);
}
";

const MODEL_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(set = 2, binding = 0) uniform texture2D atlasTexture;
layout(set = 2, binding = 1) uniform sampler atlasSampler;

void main() {
    vec4 color = texture(sampler2D(atlasTexture, atlasSampler), v_uv);
    if (color.a < 0.004) {
        discard;
    }
    outColor = color;
}
";

fn compile_glsl(
    device: &wgpu::Device,
    label: &str,
    source: Cow<'static, str>,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: source,
            stage,
            defines: &[],
        },
    })
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniforms {
    view_projection: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PartUniforms {
    model: [[f32; 4]; 4],
}

struct AtlasTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct PartResources {
    id: PartId,
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Surface-backed renderer for the player model.
pub(crate) struct GpuRenderer {
    context: GpuContext,
    pipeline: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    skin: AtlasTexture,
    cape: AtlasTexture,
    parts: Vec<PartResources>,
    depth_view: wgpu::TextureView,
    slim: bool,
    transparent: bool,
    physical_width: u32,
    physical_height: u32,
    disposed: bool,
}

fn physical_extent(width: u32, height: u32, pixel_ratio: f32) -> (u32, u32) {
    let scale = |dimension: u32| ((dimension as f32 * pixel_ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

impl GpuRenderer {
    pub(crate) fn new<T>(target: &T, options: &ViewerOptions) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let (physical_width, physical_height) =
            physical_extent(options.width, options.height, options.pixel_ratio);
        let context = GpuContext::new(target, physical_width, physical_height, options.transparent)
            .context("failed to initialise the GPU context")?;
        let device = &context.device;

        let vertex_module = compile_glsl(
            device,
            "model vertex",
            Cow::Borrowed(MODEL_VERTEX_GLSL),
            ShaderStage::Vertex,
        );
        let fragment_module = compile_glsl(
            device,
            "model fragment",
            Cow::Borrowed(MODEL_FRAGMENT_GLSL),
            ShaderStage::Fragment,
        );

        let globals_layout = uniform_layout(device, "globals layout");
        let part_layout = uniform_layout(device, "part layout");
        let atlas_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("atlas layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("model pipeline layout"),
            bind_group_layouts: &[&globals_layout, &part_layout, &atlas_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("model pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[Vertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Overlay layers and the cape are rendered double-sided.
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: context.surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        // Pixel-art atlases must never be interpolated.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals buffer"),
            size: std::mem::size_of::<GlobalUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals bind group"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let skin = create_atlas(
            device,
            &atlas_layout,
            &sampler,
            skinpix::SKIN_WIDTH,
            skinpix::SKIN_HEIGHT,
            "skin atlas",
        );
        let cape = create_atlas(
            device,
            &atlas_layout,
            &sampler,
            skinpix::CAPE_WIDTH,
            skinpix::CAPE_HEIGHT,
            "cape atlas",
        );

        let parts = PartId::ALL
            .iter()
            .map(|&id| create_part(device, &part_layout, id, false))
            .collect();

        let depth_view = create_depth_view(device, physical_width, physical_height);

        Ok(Self {
            context,
            pipeline,
            globals_buffer,
            globals_bind_group,
            skin,
            cape,
            parts,
            depth_view,
            slim: false,
            transparent: options.transparent,
            physical_width,
            physical_height,
            disposed: false,
        })
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }

    pub(crate) fn surface_format(&self) -> wgpu::TextureFormat {
        self.context.surface_format
    }

    pub(crate) fn physical_size(&self) -> (u32, u32) {
        (self.physical_width, self.physical_height)
    }

    /// Acquires the next surface frame, recovering from a lost or outdated
    /// surface by reconfiguring and skipping the frame.
    pub(crate) fn acquire_frame(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated, reconfiguring");
                self.context.reconfigure();
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("timed out waiting for a surface frame");
                Ok(None)
            }
            Err(err) => Err(err).context("failed to acquire surface frame"),
        }
    }

    /// Encodes the model pass into an arbitrary color target. The composed
    /// pipeline points this at its offscreen texture.
    pub(crate) fn encode_scene(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        scene: &ScenePacket,
    ) {
        let globals = GlobalUniforms {
            view_projection: scene.view_projection.to_cols_array_2d(),
        };
        self.context
            .queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        for instance in scene.parts.iter().filter(|instance| instance.visible) {
            if let Some(part) = self.parts.iter().find(|part| part.id == instance.id) {
                let uniforms = PartUniforms {
                    model: instance.matrix.to_cols_array_2d(),
                };
                self.context.queue.write_buffer(
                    &part.uniform_buffer,
                    0,
                    bytemuck::bytes_of(&uniforms),
                );
            }
        }

        let clear_color = if self.transparent {
            wgpu::Color::TRANSPARENT
        } else {
            wgpu::Color::BLACK
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("model pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
        for instance in scene.parts.iter().filter(|instance| instance.visible) {
            let Some(part) = self.parts.iter().find(|part| part.id == instance.id) else {
                continue;
            };
            let atlas = match instance.id {
                PartId::Cape => &self.cape,
                _ => &self.skin,
            };
            render_pass.set_bind_group(1, &part.bind_group, &[]);
            render_pass.set_bind_group(2, &atlas.bind_group, &[]);
            render_pass.set_vertex_buffer(0, part.vertex_buffer.slice(..));
            render_pass.draw(0..part.vertex_count, 0..1);
        }
    }

    fn write_atlas(&self, atlas: &AtlasTexture, surface: &RgbaImage) {
        debug_assert_eq!(surface.dimensions(), (atlas.width, atlas.height));
        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &atlas.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            surface.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * atlas.width),
                rows_per_image: Some(atlas.height),
            },
            wgpu::Extent3d {
                width: atlas.width,
                height: atlas.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl RenderTarget for GpuRenderer {
    fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        let (physical_width, physical_height) = physical_extent(width, height, pixel_ratio);
        if (physical_width, physical_height) == (self.physical_width, self.physical_height) {
            return;
        }
        self.physical_width = physical_width;
        self.physical_height = physical_height;
        self.context.resize(physical_width, physical_height);
        self.depth_view = create_depth_view(&self.context.device, physical_width, physical_height);
    }

    fn upload_skin(&mut self, surface: &RgbaImage, slim: bool) {
        self.write_atlas(&self.skin, surface);
        if slim != self.slim {
            self.slim = slim;
            for part in &mut self.parts {
                if matches!(part.id, PartId::RightArm | PartId::LeftArm) {
                    let vertices = build_cuboid(&cuboid_spec(part.id, slim));
                    part.vertex_buffer = create_vertex_buffer(&self.context.device, &vertices);
                    part.vertex_count = vertices.len() as u32;
                }
            }
        }
    }

    fn upload_cape(&mut self, surface: &RgbaImage) {
        self.write_atlas(&self.cape, surface);
    }

    fn submit(&mut self, scene: &ScenePacket) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let Some(frame) = self.acquire_frame()? else {
            return Ok(());
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        self.encode_scene(&mut encoder, &view, scene);
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn create_vertex_buffer(device: &wgpu::Device, vertices: &[Vertex]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("part vertices"),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

fn create_part(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    id: PartId,
    slim: bool,
) -> PartResources {
    let vertices = build_cuboid(&cuboid_spec(id, slim));
    let vertex_buffer = create_vertex_buffer(device, &vertices);
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("part uniforms"),
        size: std::mem::size_of::<PartUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("part bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }],
    });
    PartResources {
        id,
        vertex_buffer,
        vertex_count: vertices.len() as u32,
        uniform_buffer,
        bind_group,
    }
}

fn create_atlas(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
    label: &str,
) -> AtlasTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    AtlasTexture {
        texture,
        bind_group,
        width,
        height,
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth buffer"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
