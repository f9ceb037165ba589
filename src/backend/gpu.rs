// gpu.rs — wgpu backend (fullscreen-triangle ray casting)

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::{BackendKind, GpuPreset, PowerPreference, RenderBackend, SurfaceSize};
use crate::camera::Camera;
use crate::error::{RenderError, RenderResult};
use crate::panorama::Panorama;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    inv_view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    fn from_camera(camera: &Camera) -> Self {
        Self {
            inv_view_proj: camera.view_projection().inverse().to_cols_array_2d(),
        }
    }
}

struct GpuState {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    render_pipeline: wgpu::RenderPipeline,

    // panorama texture, absent until one is uploaded
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
    texture: Option<wgpu::Texture>,
    sampler: wgpu::Sampler,

    camera_buffer: wgpu::Buffer,
}

/// GPU backend rendering into one surface. The sphere is ray cast per
/// fragment instead of rasterized, so there is no mesh to manage.
pub struct GpuBackend {
    state: Option<GpuState>,
    size: SurfaceSize,
    pixel_ratio: f32,
    adapter_info: wgpu::AdapterInfo,
    max_texture_dimension: u32,
}

impl GpuBackend {
    /// Build a backend on `surface` with one configuration preset.
    pub async fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface,
        preset: &GpuPreset,
        size: SurfaceSize,
    ) -> RenderResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: map_power_preference(preset.power_preference),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::GpuInit("no suitable adapter".to_string()))?;

        let adapter_info = adapter.get_info();
        if preset.fail_if_major_performance_caveat == Some(true)
            && adapter_info.device_type == wgpu::DeviceType::Cpu
        {
            return Err(RenderError::GpuInit(format!(
                "adapter {} is a software rasterizer",
                adapter_info.name
            )));
        }

        let limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults()
        } else {
            wgpu::Limits::default()
        }
        .using_resolution(adapter.limits());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits,
                    label: Some("panorama_device"),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::GpuInit(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e| log::error!("wgpu error: {e}")));
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::GpuInit("surface reports no formats".to_string()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let filter = if preset.antialias.unwrap_or(true) {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("panorama_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat, // longitude wraps
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera_buffer"),
            contents: bytemuck::cast_slice(&[CameraUniform::from_camera(&Camera::new(
                90.0,
                0.0,
                75.0,
                size.aspect(),
            ))]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("panorama_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::include_wgsl!("shader_panorama.wgsl"));
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("panorama_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("panorama_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[], // vertices come from vertex_index
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
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
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        if let Some(e) = device.pop_error_scope().await {
            return Err(RenderError::GpuInit(e.to_string()));
        }

        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        log::info!(
            "GPU backend ready on {} ({:?}, {:?}), preserve_drawing_buffer={:?}",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend,
            preset.preserve_drawing_buffer,
        );

        Ok(Self {
            state: Some(GpuState {
                surface,
                device,
                queue,
                config,
                render_pipeline,
                bind_group_layout,
                bind_group: None,
                texture: None,
                sampler,
                camera_buffer,
            }),
            size,
            pixel_ratio: 1.0,
            adapter_info,
            max_texture_dimension,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// The adapter is real hardware rather than a software rasterizer.
    pub fn is_accelerated(&self) -> bool {
        self.adapter_info.device_type != wgpu::DeviceType::Cpu
    }

    fn reconfigure(&mut self) {
        let physical = self.size.scaled(self.pixel_ratio);
        if let Some(state) = self.state.as_mut() {
            state.config.width = physical.width;
            state.config.height = physical.height;
            state.surface.configure(&state.device, &state.config);
        }
    }
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
        self.reconfigure();
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(0.5);
        self.reconfigure();
    }

    fn set_panorama(&mut self, panorama: Arc<Panorama>) -> RenderResult<()> {
        let max = self.max_texture_dimension;
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        let (width, height) = (panorama.width(), panorama.height());
        if width > max || height > max {
            return Err(RenderError::Resource(format!(
                "panorama {width}x{height} exceeds texture limit {max}"
            )));
        }

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = state.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("panorama_texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        state.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            panorama.pixels().as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        state.bind_group = Some(state.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("panorama_bind_group"),
            layout: &state.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: state.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&state.sampler),
                },
            ],
        }));
        if let Some(old) = state.texture.replace(texture) {
            old.destroy();
        }
        Ok(())
    }

    fn render_frame(&mut self, camera: &Camera) -> RenderResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        state.queue.write_buffer(
            &state.camera_buffer,
            0,
            bytemuck::cast_slice(&[CameraUniform::from_camera(camera)]),
        );

        let output = match state.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                state.surface.configure(&state.device, &state.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::ContextLost),
            Err(e) => return Err(RenderError::Frame(e.to_string())),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("panorama_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("panorama_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            if let Some(bind_group) = state.bind_group.as_ref() {
                render_pass.set_pipeline(&state.render_pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
        }

        state.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            if let Some(texture) = state.texture {
                texture.destroy();
            }
            state.camera_buffer.destroy();
            log::debug!("GPU backend released ({})", self.adapter_info.name);
        }
    }
}

fn map_power_preference(preference: Option<PowerPreference>) -> wgpu::PowerPreference {
    match preference {
        Some(PowerPreference::HighPerformance) => wgpu::PowerPreference::HighPerformance,
        Some(PowerPreference::LowPower) => wgpu::PowerPreference::LowPower,
        None => wgpu::PowerPreference::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_is_a_single_mat4() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 64);
    }

    #[test]
    fn uniform_carries_inverse_view_projection() {
        let cam = Camera::new(10.0, 20.0, 60.0, 1.5);
        let u = CameraUniform::from_camera(&cam);
        let m = glam::Mat4::from_cols_array_2d(&u.inv_view_proj);
        let ray = Camera::unproject(&m, 0.0, 0.0);
        assert!(ray.abs_diff_eq(cam.basis().forward, 1e-4));
    }

    #[test]
    fn missing_power_preference_uses_library_default() {
        assert_eq!(map_power_preference(None), wgpu::PowerPreference::default());
        assert_eq!(
            map_power_preference(Some(PowerPreference::HighPerformance)),
            wgpu::PowerPreference::HighPerformance
        );
    }
}
