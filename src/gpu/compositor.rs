// ============================================================================
// COMPOSITOR: wgpu implementation of the render backend
// ============================================================================
//
// Per frame:
//
//   1. Composite pass: the image quad with the current program. The fragment
//      stage grades the source globally, then mixes in each mask's local
//      grade by the weight sampled from the mask weight array.
//   2. Outline pass: one SDF quad per visible outline, alpha-blended.
//   3. Handle pass: one quad per drawn handle, alpha-blended.
//
// Mask weights are rasterized separately (`rasterize_masks`) into an
// image-resolution Rgba8Unorm array, four masks per layer. Each channel has
// its own pipeline whose colour write mask selects it.
// ============================================================================

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::error::{EngineError, Result};
use crate::mask::Mask;
use crate::ops::adjustments::EFFECT_SLOTS;
use crate::transform::{Mat4, image_projection};

use super::backend::{FrameDesc, MAX_MASKS, ProgramId, Readback, RenderBackend, RowOrder, TargetKind};
use super::composer::{ProgramSource, validate_wgsl};
use super::context::GpuContext;
use super::shaders;
use super::texture::{COLOR_FORMAT, RenderTarget, SourceTexture, WeightTexture};

// ============================================================================
// UNIFORM AND VERTEX TYPES
// ============================================================================

/// Composite program uniforms. Matches `Frame` in the WGSL preamble.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub proj: Mat4,
    pub image_size: [f32; 2],
    pub mask_count: u32,
    pub _pad: u32,
    pub global: [f32; EFFECT_SLOTS],
    pub local: [[f32; EFFECT_SLOTS]; MAX_MASKS],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct MaskUniforms {
    pub proj: Mat4,
    pub center: [f32; 2],
    pub radii: [f32; 2],
    pub rotation: f32,
    pub feather: f32,
    pub extent: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct OutlineUniforms {
    pub proj: Mat4,
    pub center: [f32; 2],
    pub radii: [f32; 2],
    pub rotation: f32,
    pub half_width: f32,
    pub feather: f32,
    pub extent: f32,
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct HandleUniforms {
    pub proj: Mat4,
    pub center: [f32; 2],
    pub radius: f32,
    pub inner_radius: f32,
    pub feather: f32,
    pub shadow: f32,
    pub shadow_alpha: f32,
    pub with_inner: f32,
}

/// Size of one overlay uniform slot; fits every overlay uniform type.
const OVERLAY_SLOT_BYTES: u64 = 112;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ImageVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

pub const IMAGE_QUAD_INDICES: [u16; 6] = [3, 2, 0, 0, 1, 2];

/// World-space quad covering the image. Texture row 0 (image top) sits at
/// world y = height.
pub fn image_quad(width: f32, height: f32) -> [ImageVertex; 4] {
    [
        ImageVertex { pos: [0.0, height], uv: [0.0, 0.0] },
        ImageVertex { pos: [width, height], uv: [1.0, 0.0] },
        ImageVertex { pos: [width, 0.0], uv: [1.0, 1.0] },
        ImageVertex { pos: [0.0, 0.0], uv: [0.0, 1.0] },
    ]
}

fn mask_uniforms(proj: Mat4, mask: &Mask) -> MaskUniforms {
    MaskUniforms {
        proj,
        center: [mask.center.x, mask.center.y],
        radii: [mask.rx, mask.ry],
        rotation: mask.rotation,
        feather: mask.feather,
        extent: mask.bounding_radius() + 1.0,
        _pad: 0.0,
    }
}

/// Per-image resources, rebuilt on every upload.
struct ImageResources {
    source: SourceTexture,
    weights: WeightTexture,
    composite_bg: wgpu::BindGroup,
    vertex_buf: wgpu::Buffer,
    index_buf: wgpu::Buffer,
    /// Masks currently rasterized into `weights`.
    weight_count: usize,
}

// ============================================================================
// WGPU BACKEND
// ============================================================================

pub struct WgpuBackend {
    ctx: GpuContext,

    /// Group 0 for every pipeline: one uniform buffer.
    uniform_bgl: wgpu::BindGroupLayout,
    /// Group 1 of the composite program: source, sampler, weight array.
    composite_tex_bgl: wgpu::BindGroupLayout,
    composite_layout: wgpu::PipelineLayout,

    programs: HashMap<ProgramId, wgpu::RenderPipeline>,
    next_program: ProgramId,

    /// One per weight channel (R, G, B, A).
    mask_pipelines: Vec<wgpu::RenderPipeline>,
    outline_pipeline: wgpu::RenderPipeline,
    handle_pipeline: wgpu::RenderPipeline,

    sampler_linear: wgpu::Sampler,

    image: Option<ImageResources>,
    preview: Option<RenderTarget>,
    export: Option<RenderTarget>,

    frame_slot: (wgpu::Buffer, wgpu::BindGroup),
    /// Cached overlay uniform buffers and bind groups. Grows to the largest
    /// draw count seen; reused across frames via `queue.write_buffer()`.
    cached_overlay_slots: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
    cached_staging: Option<(wgpu::Buffer, u64)>,
}

impl WgpuBackend {
    /// Open a device and build the fixed pipelines.
    pub fn new(preferred_gpu: &str) -> Result<Self> {
        Self::with_context(GpuContext::new(preferred_gpu)?)
    }

    pub fn with_context(ctx: GpuContext) -> Result<Self> {
        let device = &ctx.device;

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform_bgl"),
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
        });

        let float_texture = |dim| wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: dim,
            multisampled: false,
        };
        let composite_tex_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite_tex_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: float_texture(wgpu::TextureViewDimension::D2),
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
                    ty: float_texture(wgpu::TextureViewDimension::D2Array),
                    count: None,
                },
            ],
        });

        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite_pipeline_layout"),
            bind_group_layouts: &[&uniform_bgl, &composite_tex_bgl],
            push_constant_ranges: &[],
        });
        let overlay_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay_pipeline_layout"),
            bind_group_layouts: &[&uniform_bgl],
            push_constant_ranges: &[],
        });

        let mask_module = compile_module(device, "mask_weight_shader", &shaders::mask_weight_shader())?;
        let outline_module = compile_module(device, "outline_shader", &shaders::outline_shader())?;
        let handle_module = compile_module(device, "handle_shader", &shaders::handle_shader())?;

        let mut mask_pipelines = Vec::with_capacity(4);
        for (label, channel) in [
            ("mask_weight_r", wgpu::ColorWrites::RED),
            ("mask_weight_g", wgpu::ColorWrites::GREEN),
            ("mask_weight_b", wgpu::ColorWrites::BLUE),
            ("mask_weight_a", wgpu::ColorWrites::ALPHA),
        ] {
            mask_pipelines.push(overlay_pipeline(
                device,
                label,
                &overlay_layout,
                &mask_module,
                ("vs_mask", "fs_mask"),
                None,
                channel,
            )?);
        }
        let outline_pipeline = overlay_pipeline(
            device,
            "outline_pipeline",
            &overlay_layout,
            &outline_module,
            ("vs_outline", "fs_outline"),
            Some(wgpu::BlendState::ALPHA_BLENDING),
            wgpu::ColorWrites::ALL,
        )?;
        let handle_pipeline = overlay_pipeline(
            device,
            "handle_pipeline",
            &overlay_layout,
            &handle_module,
            ("vs_handle", "fs_handle"),
            Some(wgpu::BlendState::ALPHA_BLENDING),
            wgpu::ColorWrites::ALL,
        )?;

        let sampler_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler_linear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let frame_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniform_buf"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_uniform_bg"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buf.as_entire_binding(),
            }],
        });

        Ok(Self {
            ctx,
            uniform_bgl,
            composite_tex_bgl,
            composite_layout,
            programs: HashMap::new(),
            next_program: 1,
            mask_pipelines,
            outline_pipeline,
            handle_pipeline,
            sampler_linear,
            image: None,
            preview: None,
            export: None,
            frame_slot: (frame_buf, frame_bg),
            cached_overlay_slots: Vec::new(),
            cached_staging: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    /// Make sure at least `count` overlay slots exist.
    fn ensure_overlay_slots(&mut self, count: usize) {
        while self.cached_overlay_slots.len() < count {
            let buf = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("overlay_uniform_buf"),
                size: OVERLAY_SLOT_BYTES,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bg = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("overlay_uniform_bg"),
                layout: &self.uniform_bgl,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buf.as_entire_binding(),
                }],
            });
            self.cached_overlay_slots.push((buf, bg));
        }
    }

    fn write_slot<T: Pod>(&self, slot: usize, value: &T) {
        self.ctx
            .queue
            .write_buffer(&self.cached_overlay_slots[slot].0, 0, bytemuck::bytes_of(value));
    }

    /// (Re)create the target for `kind` if its size changed.
    fn ensure_target(&mut self, kind: TargetKind, width: u32, height: u32) {
        let (slot, label) = match kind {
            TargetKind::Preview => (&mut self.preview, "preview_target"),
            TargetKind::Export => (&mut self.export, "export_target"),
        };
        if !slot.as_ref().is_some_and(|t| t.matches(width, height)) {
            *slot = Some(RenderTarget::new(&self.ctx.device, label, width, height));
        }
    }

    /// Copy a target back to the CPU, stripping row padding.
    fn readback_texture(&mut self, kind: TargetKind) -> Result<Readback> {
        let target = match kind {
            TargetKind::Preview => self.preview.as_ref(),
            TargetKind::Export => self.export.as_ref(),
        }
        .ok_or_else(|| EngineError::Readback(format!("no {kind:?} frame has been rendered")))?;
        let (width, height) = (target.width, target.height);
        let device = &self.ctx.device;

        let bytes_per_row = aligned_bytes_per_row(width);
        let buffer_size = (bytes_per_row * height) as u64;

        let need_new = !matches!(&self.cached_staging, Some((_, sz)) if *sz >= buffer_size);
        if need_new {
            let buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_staging"),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.cached_staging = Some((buf, buffer_size));
        }
        let Some((staging, _)) = self.cached_staging.as_ref() else {
            return Err(EngineError::Readback("staging buffer missing".into()));
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.ctx.submit_one(encoder);

        let slice = staging.slice(..buffer_size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Readback(format!("map error: {e:?}"))),
            Err(e) => return Err(EngineError::Readback(format!("channel error: {e:?}"))),
        }

        let mapped = slice.get_mapped_range();
        let actual_row = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(actual_row * height as usize);
        for y in 0..height {
            let start = (y * bytes_per_row) as usize;
            pixels.extend_from_slice(&mapped[start..start + actual_row]);
        }
        drop(mapped);
        staging.unmap();

        Ok(Readback {
            width,
            height,
            pixels,
            row_order: RowOrder::TopDown,
        })
    }
}

pub(crate) fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// Create a shader module inside a validation error scope.
fn compile_module(device: &wgpu::Device, label: &str, wgsl: &str) -> Result<wgpu::ShaderModule> {
    validate_wgsl(label, wgsl)?;
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(EngineError::ShaderCompileFailed {
            label: label.to_string(),
            log: err.to_string(),
        });
    }
    Ok(module)
}

fn overlay_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    (vs, fs): (&str, &str),
    blend: Option<wgpu::BlendState>,
    write_mask: wgpu::ColorWrites,
) -> Result<wgpu::RenderPipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: vs,
            buffers: &[],
            compilation_options: Default::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: fs,
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend,
                write_mask,
            })],
            compilation_options: Default::default(),
        }),
        multiview: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(EngineError::ProgramLinkFailed {
            label: label.to_string(),
            log: err.to_string(),
        });
    }
    Ok(pipeline)
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn max_texture_size(&self) -> u32 {
        self.ctx.max_texture_dim
    }

    fn upload_image(&mut self, image: &RgbaImage) -> Result<()> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidImage(format!("{width}x{height}")));
        }
        if !self.ctx.supports_size(width, height) {
            return Err(EngineError::TextureTooLarge {
                width,
                height,
                max: self.ctx.max_texture_dim,
            });
        }
        let device = &self.ctx.device;

        let source = SourceTexture::new(device, &self.ctx.queue, width, height, image.as_raw());
        let weights = WeightTexture::new(device, width, height);
        let composite_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_tex_bg"),
            layout: &self.composite_tex_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler_linear),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&weights.array_view),
                },
            ],
        });
        let quad = image_quad(width as f32, height as f32);
        let vertex_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("image_quad_vb"),
            contents: bytemuck::cast_slice(&quad),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("image_quad_ib"),
            contents: bytemuck::cast_slice(&IMAGE_QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        self.image = Some(ImageResources {
            source,
            weights,
            composite_bg,
            vertex_buf,
            index_buf,
            weight_count: 0,
        });
        Ok(())
    }

    fn release_image(&mut self) {
        self.image = None;
    }

    fn build_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        let module = compile_module(&self.ctx.device, &source.label, &source.wgsl)?;
        let device = &self.ctx.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&source.label),
            layout: Some(&self.composite_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_image",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ImageVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(EngineError::ProgramLinkFailed {
                label: source.label.clone(),
                log: err.to_string(),
            });
        }

        let id = self.next_program;
        self.next_program += 1;
        self.programs.insert(id, pipeline);
        Ok(id)
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn has_program(&self, id: ProgramId) -> bool {
        self.programs.contains_key(&id)
    }

    fn rasterize_masks(&mut self, masks: &[Mask]) -> Result<()> {
        let (width, height) = match &self.image {
            Some(img) => (img.source.width, img.source.height),
            None => return Err(EngineError::NoImage),
        };
        let masks = &masks[..masks.len().min(MAX_MASKS)];
        self.ensure_overlay_slots(masks.len());

        let proj = image_projection(width as f32, height as f32);
        for (i, mask) in masks.iter().enumerate() {
            self.write_slot(i, &mask_uniforms(proj, mask));
        }

        let Some(img) = self.image.as_mut() else {
            return Err(EngineError::NoImage);
        };
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mask_weight_encoder"),
        });
        for (layer, view) in img.weights.layer_views.iter().enumerate() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mask_weight_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for i in (layer * 4)..((layer + 1) * 4).min(masks.len()) {
                pass.set_pipeline(&self.mask_pipelines[i % 4]);
                pass.set_bind_group(0, &self.cached_overlay_slots[i].1, &[]);
                pass.draw(0..6, 0..1);
            }
        }
        self.ctx.submit_one(encoder);
        img.weight_count = masks.len();
        Ok(())
    }

    fn render(&mut self, frame: &FrameDesc<'_>) -> Result<()> {
        if !self.programs.contains_key(&frame.program) {
            return Err(EngineError::ResourceUnavailable(format!(
                "program {} is not built",
                frame.program
            )));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(EngineError::Readback(format!(
                "empty target {}x{}",
                frame.width, frame.height
            )));
        }
        let (image_w, image_h, weight_count) = match &self.image {
            Some(img) => (img.source.width, img.source.height, img.weight_count),
            None => return Err(EngineError::NoImage),
        };

        // ---- Uniforms ----
        let mask_count = frame.locals.len().min(weight_count).min(MAX_MASKS);
        let mut local = [[0.0; EFFECT_SLOTS]; MAX_MASKS];
        for (dst, fx) in local.iter_mut().zip(&frame.locals[..mask_count]) {
            *dst = fx.as_uniform();
        }
        let uniforms = FrameUniforms {
            proj: frame.proj,
            image_size: [image_w as f32, image_h as f32],
            mask_count: mask_count as u32,
            _pad: 0,
            global: frame.global.as_uniform(),
            local,
        };
        self.ctx
            .queue
            .write_buffer(&self.frame_slot.0, 0, bytemuck::bytes_of(&uniforms));

        let overlay_count = frame.outlines.len() + frame.handles.len();
        self.ensure_overlay_slots(overlay_count);
        for (i, outline) in frame.outlines.iter().enumerate() {
            let m = &outline.mask;
            self.write_slot(
                i,
                &OutlineUniforms {
                    proj: frame.proj,
                    center: [m.center.x, m.center.y],
                    radii: [m.rx, m.ry],
                    rotation: m.rotation,
                    half_width: frame.outline_style.half_width,
                    feather: frame.outline_style.feather,
                    extent: m.bounding_radius() + frame.outline_style.half_width + frame.outline_style.feather,
                    color: outline.color,
                },
            );
        }
        let hs = frame.handle_style;
        for (i, handle) in frame.handles.iter().enumerate() {
            self.write_slot(
                frame.outlines.len() + i,
                &HandleUniforms {
                    proj: frame.proj,
                    center: [handle.at.x, handle.at.y],
                    radius: hs.radius,
                    inner_radius: hs.inner_radius,
                    feather: hs.feather,
                    shadow: hs.shadow,
                    shadow_alpha: hs.shadow_alpha,
                    with_inner: if handle.with_inner { 1.0 } else { 0.0 },
                },
            );
        }

        self.ensure_target(frame.target, frame.width, frame.height);
        let target = match frame.target {
            TargetKind::Preview => self.preview.as_ref(),
            TargetKind::Export => self.export.as_ref(),
        }
        .ok_or_else(|| EngineError::ResourceUnavailable("render target".into()))?;
        let img = self.image.as_ref().ok_or(EngineError::NoImage)?;
        let pipeline = self
            .programs
            .get(&frame.program)
            .ok_or_else(|| EngineError::ResourceUnavailable("program".into()))?;

        // ---- Passes ----
        let [r, g, b, a] = frame.clear;
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.frame_slot.1, &[]);
            pass.set_bind_group(1, &img.composite_bg, &[]);
            pass.set_vertex_buffer(0, img.vertex_buf.slice(..));
            pass.set_index_buffer(img.index_buf.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..IMAGE_QUAD_INDICES.len() as u32, 0, 0..1);

            if !frame.outlines.is_empty() {
                pass.set_pipeline(&self.outline_pipeline);
                for i in 0..frame.outlines.len() {
                    pass.set_bind_group(0, &self.cached_overlay_slots[i].1, &[]);
                    pass.draw(0..6, 0..1);
                }
            }
            if !frame.handles.is_empty() {
                pass.set_pipeline(&self.handle_pipeline);
                for i in frame.outlines.len()..overlay_count {
                    pass.set_bind_group(0, &self.cached_overlay_slots[i].1, &[]);
                    pass.draw(0..6, 0..1);
                }
            }
        }
        self.ctx.submit_one(encoder);
        Ok(())
    }

    fn read_frame(&mut self, target: TargetKind) -> Result<Readback> {
        self.readback_texture(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_wgsl_layouts() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 368);
        assert_eq!(std::mem::size_of::<MaskUniforms>(), 96);
        assert_eq!(std::mem::size_of::<OutlineUniforms>(), 112);
        assert_eq!(std::mem::size_of::<HandleUniforms>(), 96);
        assert!(std::mem::size_of::<OutlineUniforms>() as u64 <= OVERLAY_SLOT_BYTES);
    }

    #[test]
    fn image_quad_maps_top_row_to_top_edge() {
        let q = image_quad(100.0, 50.0);
        assert_eq!(q[0], ImageVertex { pos: [0.0, 50.0], uv: [0.0, 0.0] });
        assert_eq!(q[2], ImageVertex { pos: [100.0, 0.0], uv: [1.0, 1.0] });
        // both triangles wind through the shared diagonal 0-2
        assert_eq!(IMAGE_QUAD_INDICES, [3, 2, 0, 0, 1, 2]);
    }

    #[test]
    fn readback_rows_are_256_aligned() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }
}
