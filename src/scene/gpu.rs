//! wgpu implementation of [`SceneSink`].

use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::shapes::ShapeKind;
use super::{ParticleSystem, SceneFrame, SceneSink};
use crate::error::{BackdropError, Result};
use crate::theme::ColorParameters;

const FOG_NEAR: f32 = 8.0;
const FOG_FAR: f32 = 35.0;
const MAX_SHAPE_INSTANCES: usize = 32;
/// Fraction of the ambient term that reaches the wireframes; emission adds on top.
const AMBIENT_SHARE: f32 = 0.5;

// ======================================
// === SHADER DATA STRUCTURES ===
// ======================================

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct Uniforms {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    field_model: [[f32; 4]; 4],
    fog_color: [f32; 4],
    // particle_opacity, unused, fog_near, fog_far
    params: [f32; 4],
}

// Instance data for the wireframe shapes
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct InstanceData {
    model_matrix: [[f32; 4]; 4],
    color: [f32; 4],    // rgb + shape opacity
    material: [f32; 4], // light factor, padding
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ParticleInstance {
    position: [f32; 3],
    size: f32,
    color: [f32; 3],
    _padding: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

impl InstanceData {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        const VEC4: wgpu::BufferAddress = std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress;
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // Model matrix - 4 columns
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: VEC4,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: VEC4 * 2,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: VEC4 * 3,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: VEC4 * 4,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: VEC4 * 5,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

impl ParticleInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

// Billboard corners, drawn as a triangle strip.
const QUAD: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

fn quad_desc() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x2,
        }],
    }
}

const SHADER: &str = r#"
struct Uniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    field_model: mat4x4<f32>,
    fog_color: vec4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

fn fogged(color: vec3<f32>, view_depth: f32) -> vec3<f32> {
    return mix(color, u.fog_color.rgb, smoothstep(u.params.z, u.params.w, view_depth));
}

struct ParticleInput {
    @location(0) corner: vec2<f32>,
    @location(1) position: vec3<f32>,
    @location(2) size: f32,
    @location(3) color: vec3<f32>,
};

struct ParticleOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) corner: vec2<f32>,
    @location(1) color: vec3<f32>,
    @location(2) depth: f32,
};

@vertex
fn vs_particle(in: ParticleInput) -> ParticleOutput {
    let view_position = u.view * u.field_model * vec4<f32>(in.position, 1.0);
    var out: ParticleOutput;
    out.clip_position = u.proj * (view_position + vec4<f32>(in.corner * in.size, 0.0, 0.0));
    out.corner = in.corner;
    out.color = in.color;
    out.depth = -view_position.z;
    return out;
}

@fragment
fn fs_particle(in: ParticleOutput) -> @location(0) vec4<f32> {
    let r = length(in.corner);
    if (r > 1.0) {
        discard;
    }
    let alpha = u.params.x * (1.0 - smoothstep(0.5, 1.0, r));
    return vec4<f32>(fogged(in.color, in.depth) * alpha, alpha);
}

struct ShapeInput {
    @location(0) position: vec3<f32>,
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
    @location(7) color: vec4<f32>,
    @location(8) material: vec4<f32>,
};

struct ShapeOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) depth: f32,
};

@vertex
fn vs_shape(in: ShapeInput) -> ShapeOutput {
    let model = mat4x4<f32>(in.model_0, in.model_1, in.model_2, in.model_3);
    let view_position = u.view * model * vec4<f32>(in.position, 1.0);
    let light = in.material.x;
    var out: ShapeOutput;
    out.clip_position = u.proj * view_position;
    out.color = vec4<f32>(in.color.rgb * light, in.color.a);
    out.depth = -view_position.z;
    return out;
}

@fragment
fn fs_shape(in: ShapeOutput) -> @location(0) vec4<f32> {
    let alpha = in.color.a;
    return vec4<f32>(fogged(in.color.rgb, in.depth) * alpha, alpha);
}
"#;

fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

/// Brightness applied to shape colours: a share of the ambient light plus the
/// theme's emissive strength.
fn shape_light(colors: &ColorParameters) -> f32 {
    (colors.ambient_intensity * AMBIENT_SHARE + colors.shape_emissive).clamp(0.0, 1.0)
}

fn linear(color: Vec3) -> [f32; 3] {
    [
        srgb_to_linear(color.x),
        srgb_to_linear(color.y),
        srgb_to_linear(color.z),
    ]
}

#[derive(Debug, Clone)]
struct MeshRange {
    indices: Range<u32>,
    base_vertex: i32,
}

pub struct GpuSink {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    particle_pipeline: wgpu::RenderPipeline,
    quad_buffer: wgpu::Buffer,
    particle_buffer: Option<wgpu::Buffer>,
    particle_count: u32,
    shape_pipeline: wgpu::RenderPipeline,
    shape_vertex_buffer: wgpu::Buffer,
    shape_index_buffer: wgpu::Buffer,
    mesh_ranges: Vec<MeshRange>,
    instance_buffer: wgpu::Buffer,
    instances: Vec<InstanceData>,
}

impl GpuSink {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::BROWSER_WEBGPU,
                    ..Default::default()
                });
                let limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let instance = wgpu::Instance::default();
                let limits = wgpu::Limits::default();
            }
        }
        let size = window.inner_size();

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackdropError::Surface(format!("create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .map_err(|e| BackdropError::Surface(format!("request adapter: {e}")))?;

        let adapter_info = adapter.get_info();
        log::info!("Selected GPU: {} ({:?})", adapter_info.name, adapter_info.device_type);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| BackdropError::Surface(format!("request device: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = *caps
            .formats
            .first()
            .ok_or_else(|| BackdropError::Surface("surface reports no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![surface_format.add_srgb_suffix()],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("bind_group"),
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let target_format = surface_format.add_srgb_suffix();
        let particle_pipeline = Self::create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            "Particle Pipeline",
            ("vs_particle", "fs_particle"),
            &[quad_desc(), ParticleInstance::desc()],
            wgpu::PrimitiveTopology::TriangleStrip,
            target_format,
        );
        let shape_pipeline = Self::create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            "Shape Pipeline",
            ("vs_shape", "fs_shape"),
            &[Vertex::desc(), InstanceData::desc()],
            wgpu::PrimitiveTopology::LineList,
            target_format,
        );

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Buffer"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // All shape meshes share one vertex and one index buffer.
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u16> = Vec::new();
        let mut mesh_ranges = Vec::with_capacity(ShapeKind::ALL.len());
        for kind in ShapeKind::ALL {
            let mesh = kind.mesh();
            let first_index = indices.len() as u32;
            mesh_ranges.push(MeshRange {
                indices: first_index..first_index + mesh.indices.len() as u32,
                base_vertex: vertices.len() as i32,
            });
            vertices.extend(mesh.vertices.iter().map(|&position| Vertex { position }));
            indices.extend_from_slice(&mesh.indices);
        }
        let shape_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shape Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let shape_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shape Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (std::mem::size_of::<InstanceData>() * MAX_SHAPE_INSTANCES) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!(
            "GPU sink ready: {:?} {}x{}",
            surface_format,
            config.width,
            config.height
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            uniform_buffer,
            bind_group,
            particle_pipeline,
            quad_buffer,
            particle_buffer: None,
            particle_count: 0,
            shape_pipeline,
            shape_vertex_buffer,
            shape_index_buffer,
            mesh_ranges,
            instance_buffer,
            instances: Vec::with_capacity(MAX_SHAPE_INSTANCES),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
        label: &str,
        (vs_entry, fs_entry): (&str, &str),
        buffers: &[wgpu::VertexBufferLayout<'_>],
        topology: wgpu::PrimitiveTopology,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some(vs_entry),
                buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some(fs_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        })
    }

    fn write_frame_data(&mut self, frame: &SceneFrame<'_>) {
        let colors = &frame.colors;
        let fog = linear(colors.fog);
        let uniforms = Uniforms {
            view: frame.view.to_cols_array_2d(),
            proj: frame.projection.to_cols_array_2d(),
            field_model: frame.field_model.to_cols_array_2d(),
            fog_color: [fog[0], fog[1], fog[2], 1.0],
            params: [colors.particle_opacity, 0.0, FOG_NEAR, FOG_FAR],
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let light = shape_light(colors);
        self.instances.clear();
        for (shape, transform) in frame
            .shapes
            .iter()
            .zip(frame.transforms)
            .take(MAX_SHAPE_INSTANCES)
        {
            let [r, g, b] = linear(shape.color);
            self.instances.push(InstanceData {
                model_matrix: transform.model(shape).to_cols_array_2d(),
                color: [r, g, b, colors.shape_opacity * shape.depth_weight()],
                material: [light, 0.0, 0.0, 0.0],
            });
        }
        self.queue
            .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&self.instances));
    }
}

impl SceneSink for GpuSink {
    fn upload_particles(&mut self, particles: &ParticleSystem) {
        let data: Vec<ParticleInstance> = particles
            .positions()
            .iter()
            .zip(particles.colors())
            .zip(particles.sizes())
            .map(|((&position, &color), &size)| ParticleInstance {
                position,
                size,
                color: linear(Vec3::from_array(color)),
                _padding: 0.0,
            })
            .collect();

        match &self.particle_buffer {
            Some(buffer) if self.particle_count as usize == data.len() => {
                self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&data));
            }
            _ => {
                self.particle_buffer = Some(self.device.create_buffer_init(
                    &wgpu::util::BufferInitDescriptor {
                        label: Some("Particle Buffer"),
                        contents: bytemuck::cast_slice(&data),
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    },
                ));
                self.particle_count = data.len() as u32;
            }
        }
    }

    fn draw(&mut self, frame: &SceneFrame<'_>) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(e) => return Err(BackdropError::Surface(e.to_string())),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.config.format.add_srgb_suffix()),
            ..Default::default()
        });

        self.write_frame_data(frame);

        let background = linear(frame.colors.background);
        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: background[0] as f64,
                            g: background[1] as f64,
                            b: background[2] as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_bind_group(0, &self.bind_group, &[]);

            if let Some(particles) = &self.particle_buffer {
                render_pass.set_pipeline(&self.particle_pipeline);
                render_pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
                render_pass.set_vertex_buffer(1, particles.slice(..));
                render_pass.draw(0..QUAD.len() as u32, 0..self.particle_count);
            }

            render_pass.set_pipeline(&self.shape_pipeline);
            render_pass.set_vertex_buffer(0, self.shape_vertex_buffer.slice(..));
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            render_pass.set_index_buffer(self.shape_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            for (i, shape) in frame.shapes.iter().take(self.instances.len()).enumerate() {
                let range = &self.mesh_ranges[shape.kind.index()];
                let instance = i as u32;
                render_pass.draw_indexed(range.indices.clone(), range.base_vertex, instance..instance + 1);
            }
        }

        self.queue.submit([encoder.finish()]);
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }
}
