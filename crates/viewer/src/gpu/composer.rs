//! Post-processing composition over the scene renderer.
//!
//! The composer redirects the model pass into an offscreen color target,
//! then resolves it to the surface through a full-screen FXAA pass. It
//! stands in for the plain renderer behind the same [`RenderTarget`]
//! trait, so the viewer never knows which of the two it drives.

use std::borrow::Cow;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use wgpu::naga::ShaderStage;

use crate::backend::{RenderTarget, ScenePacket};
use crate::fxaa::{self, FxaaOptions};
use crate::viewer::ViewerOptions;

use super::{compile_glsl, GpuRenderer};

const FULLSCREEN_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[gl_VertexIndex];
    v_uv = vec2(pos.x * 0.5 + 0.5, 1.0 - (pos.y * 0.5 + 0.5));
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FxaaParams {
    resolution: [f32; 2],
    _padding: [f32; 2],
}

pub(crate) struct Composer {
    inner: GpuRenderer,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    offscreen_view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    disposed: bool,
}

impl Composer {
    pub(crate) fn new(
        inner: GpuRenderer,
        fxaa_options: FxaaOptions,
        options: &ViewerOptions,
    ) -> Result<Self> {
        let device = inner.device();

        let vertex_module = compile_glsl(
            device,
            "fullscreen vertex",
            Cow::Borrowed(FULLSCREEN_VERTEX_GLSL),
            ShaderStage::Vertex,
        );
        let fragment_module = compile_glsl(
            device,
            "fxaa fragment",
            fxaa::fragment_source(fxaa_options.quality_preset),
            ShaderStage::Fragment,
        );

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fxaa layout"),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fxaa pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("fxaa pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: inner.surface_format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        // Edge search samples between texels, so this pass filters linearly.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fxaa sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fxaa params"),
            size: std::mem::size_of::<FxaaParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (physical_width, physical_height) = inner.physical_size();
        let offscreen_view =
            create_offscreen_view(device, inner.surface_format(), physical_width, physical_height);
        let bind_group = create_bind_group(
            device,
            &layout,
            &offscreen_view,
            &sampler,
            &params_buffer,
        );

        let composer = Self {
            inner,
            pipeline,
            layout,
            sampler,
            params_buffer,
            offscreen_view,
            bind_group,
            disposed: false,
        };
        composer.write_params(options.width, options.height, options.pixel_ratio);
        Ok(composer)
    }

    fn write_params(&self, width: u32, height: u32, pixel_ratio: f32) {
        let params = FxaaParams {
            resolution: fxaa::texel_resolution(width, height, pixel_ratio),
            _padding: [0.0; 2],
        };
        self.inner
            .queue()
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }
}

impl RenderTarget for Composer {
    fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.inner.set_size(width, height, pixel_ratio);
        let (physical_width, physical_height) = self.inner.physical_size();
        self.offscreen_view = create_offscreen_view(
            self.inner.device(),
            self.inner.surface_format(),
            physical_width,
            physical_height,
        );
        self.bind_group = create_bind_group(
            self.inner.device(),
            &self.layout,
            &self.offscreen_view,
            &self.sampler,
            &self.params_buffer,
        );
        self.write_params(width, height, pixel_ratio);
    }

    fn upload_skin(&mut self, surface: &RgbaImage, slim: bool) {
        self.inner.upload_skin(surface, slim);
    }

    fn upload_cape(&mut self, surface: &RgbaImage) {
        self.inner.upload_cape(surface);
    }

    fn submit(&mut self, scene: &ScenePacket) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let Some(frame) = self.inner.acquire_frame()? else {
            return Ok(());
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.inner
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("composed frame encoder"),
                });

        self.inner
            .encode_scene(&mut encoder, &self.offscreen_view, scene);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fxaa pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.inner.queue().submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.inner.dispose();
    }
}

fn create_offscreen_view(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen color"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    offscreen_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    params_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("fxaa bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(offscreen_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buffer.as_entire_binding(),
            },
        ],
    })
}
