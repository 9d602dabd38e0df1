//! Headless backend for tests and offscreen runs without a GPU.
//!
//! Nothing is rasterized. The backend keeps every descriptor it was given,
//! the bytes written to buffers, and a depth texel store per depth texture so
//! clears, uploads and sampler policies can be inspected. Every pass command is
//! appended to a log that tests assert against.

use std::collections::HashMap;
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::shadow::sampling::{self, DepthImage};

/// A command recorded inside a render pass
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginRenderPass {
        label: Option<String>,
        color_attachments: Vec<TextureViewHandle>,
        depth_attachment: Option<TextureViewHandle>,
        depth_cleared: bool,
    },
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    },
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    SetDepthBias(Option<DepthBias>),
    /// `depth_bias` is the offset that actually applies to this draw
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
        depth_bias: Option<DepthBias>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
        depth_bias: Option<DepthBias>,
    },
}

struct BufferEntry {
    desc: BufferDescriptor,
    bytes: Vec<u8>,
}

struct TextureEntry {
    desc: TextureDescriptor,
    depth: Option<DepthImage>,
    bytes: Vec<u8>,
}

/// CPU-only implementation of [`GraphicsBackend`]
pub struct HeadlessBackend {
    buffers: HashMap<u64, BufferEntry>,
    textures: HashMap<u64, TextureEntry>,
    // view id -> texture id
    texture_views: HashMap<u64, u64>,
    samplers: HashMap<u64, SamplerDescriptor>,
    bind_group_layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    render_pipelines: HashMap<u64, RenderPipelineDescriptor>,
    next_id: u64,

    commands: Vec<RecordedCommand>,
    in_render_pass: bool,
    current_pipeline: Option<RenderPipelineHandle>,
    depth_bias: Option<DepthBias>,
    frame_open: bool,
    frames_submitted: u64,

    clamp_to_border: bool,
    memory_budget: Option<u64>,
    memory_used: u64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            next_id: 1,
            commands: Vec::new(),
            in_render_pass: false,
            current_pipeline: None,
            depth_bias: None,
            frame_open: false,
            frames_submitted: 0,
            clamp_to_border: true,
            memory_budget: None,
            memory_used: 0,
        }
    }

    /// Fail buffer and texture allocations once `bytes` would be exceeded
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Report no support for [`AddressMode::ClampToBorder`]
    pub fn without_clamp_to_border(mut self) -> Self {
        self.clamp_to_border = false;
        self
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reserve_memory(&mut self, bytes: u64) -> BackendResult<()> {
        if let Some(budget) = self.memory_budget {
            if self.memory_used + bytes > budget {
                log::trace!(
                    "HeadlessBackend: allocation of {} bytes exceeds budget ({} of {} used)",
                    bytes,
                    self.memory_used,
                    budget
                );
                return Err(BackendError::OutOfMemory);
            }
        }
        self.memory_used += bytes;
        Ok(())
    }

    fn record(&mut self, command: RecordedCommand) {
        if self.in_render_pass {
            log::trace!("HeadlessBackend: {:?}", command);
            self.commands.push(command);
        } else {
            log::warn!("HeadlessBackend: {:?} recorded outside a render pass", command);
        }
    }

    /// Offset that applies to a draw with the current pipeline
    fn effective_bias(&self) -> Option<DepthBias> {
        let pipeline = self.current_pipeline?;
        let desc = self.render_pipelines.get(&pipeline.0)?;
        if desc.primitive_topology.is_triangles() && desc.depth_stencil.is_some() {
            self.depth_bias
        } else {
            None
        }
    }

    fn view_texture(&self, view: TextureViewHandle) -> Option<&TextureEntry> {
        let texture = self.texture_views.get(&view.0)?;
        self.textures.get(texture)
    }

    /// All commands recorded so far
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Drain the command log
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.bytes.as_slice())
    }

    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer.0).map(|b| &b.desc)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    /// Descriptor of the texture a view was created from
    pub fn view_descriptor(&self, view: TextureViewHandle) -> Option<&TextureDescriptor> {
        self.view_texture(view).map(|t| &t.desc)
    }

    pub fn sampler_descriptor(&self, sampler: SamplerHandle) -> Option<&SamplerDescriptor> {
        self.samplers.get(&sampler.0)
    }

    pub fn pipeline_descriptor(
        &self,
        pipeline: RenderPipelineHandle,
    ) -> Option<&RenderPipelineDescriptor> {
        self.render_pipelines.get(&pipeline.0)
    }

    pub fn bind_group_entries(&self, bind_group: BindGroupHandle) -> Option<&[(u32, BindGroupEntry)]> {
        self.bind_groups.get(&bind_group.0).map(Vec::as_slice)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_samplers(&self) -> usize {
        self.samplers.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn live_bind_group_layouts(&self) -> usize {
        self.bind_group_layouts.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.render_pipelines.len()
    }

    /// Depth texels behind a depth texture view
    pub fn depth_image(&self, view: TextureViewHandle) -> Option<&DepthImage> {
        self.view_texture(view)?.depth.as_ref()
    }

    pub fn depth_image_mut(&mut self, view: TextureViewHandle) -> Option<&mut DepthImage> {
        let texture = self.texture_views.get(&view.0)?;
        self.textures.get_mut(texture)?.depth.as_mut()
    }

    /// Raw depth read through `sampler`, as a shader would see it
    pub fn sample_depth(
        &self,
        view: TextureViewHandle,
        sampler: SamplerHandle,
        u: f32,
        v: f32,
    ) -> Option<f32> {
        let image = self.depth_image(view)?;
        let desc = self.samplers.get(&sampler.0)?;
        Some(sampling::sample_depth(image, desc, u, v))
    }

    /// Shadow comparison through `sampler`; returns the lit fraction
    pub fn compare_depth(
        &self,
        view: TextureViewHandle,
        sampler: SamplerHandle,
        u: f32,
        v: f32,
        reference: f32,
    ) -> Option<f32> {
        let image = self.depth_image(view)?;
        let desc = self.samplers.get(&sampler.0)?;
        Some(sampling::compare_depth(image, desc, u, v, reference))
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless Backend"
    }

    fn supports_clamp_to_border(&self) -> bool {
        self.clamp_to_border
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.frame_open = true;
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.in_render_pass {
            log::warn!("HeadlessBackend: frame ended inside an open render pass");
            self.end_render_pass();
        }
        if self.frame_open {
            self.frames_submitted += 1;
            self.frame_open = false;
        }
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "HeadlessBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.reserve_memory(desc.size)?;
        let id = self.allocate_id();
        self.buffers.insert(
            id,
            BufferEntry {
                desc: desc.clone(),
                bytes: vec![0; desc.size as usize],
            },
        );
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let desc = BufferDescriptor {
            size: desc.size.max(data.len() as u64),
            ..desc.clone()
        };
        let handle = self.create_buffer(&desc)?;
        self.write_buffer(handle, 0, data);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("HeadlessBackend: write to unknown buffer {:?}", buffer);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > entry.bytes.len() {
            log::warn!(
                "HeadlessBackend: write of {} bytes at {} overflows buffer {:?} ({} bytes)",
                data.len(),
                offset,
                entry.desc.label,
                entry.bytes.len()
            );
            return;
        }
        entry.bytes[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "HeadlessBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "zero-sized texture {:?}",
                desc.label
            )));
        }
        self.reserve_memory(desc.byte_size())?;
        let depth = desc
            .format
            .is_depth()
            .then(|| DepthImage::filled(desc.width, desc.height, 1.0));
        let bytes = if depth.is_some() {
            Vec::new()
        } else {
            vec![0; desc.byte_size() as usize]
        };
        let id = self.allocate_id();
        self.textures.insert(
            id,
            TextureEntry {
                desc: desc.clone(),
                depth,
                bytes,
            },
        );
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::InvalidHandle(format!("{:?}", texture)));
        }
        let id = self.allocate_id();
        self.texture_views.insert(id, texture.0);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        let Some(entry) = self.textures.get_mut(&texture.0) else {
            log::warn!("HeadlessBackend: write to unknown texture {:?}", texture);
            return;
        };
        if width != entry.desc.width || height != entry.desc.height {
            log::warn!(
                "HeadlessBackend: partial texture writes are not supported ({}x{} into {}x{})",
                width,
                height,
                entry.desc.width,
                entry.desc.height
            );
            return;
        }
        match entry.depth.as_mut() {
            Some(image) => {
                let texels: Vec<f32> = bytemuck::pod_collect_to_vec(data);
                if texels.len() == image.texels.len() {
                    image.texels = texels;
                } else {
                    log::warn!("HeadlessBackend: depth upload has the wrong texel count");
                }
            }
            None => {
                let len = data.len().min(entry.bytes.len());
                entry.bytes[..len].copy_from_slice(&data[..len]);
            }
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("HeadlessBackend: creating sampler {:?}", desc.label);
        let uses_border = [desc.address_mode_u, desc.address_mode_v, desc.address_mode_w]
            .contains(&AddressMode::ClampToBorder);
        if uses_border && !self.clamp_to_border {
            return Err(BackendError::SamplerCreationFailed(
                "clamp-to-border is not supported by this device".into(),
            ));
        }
        let id = self.allocate_id();
        self.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.allocate_id();
        self.bind_group_layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_entries = self
            .bind_group_layouts
            .get(&layout.0)
            .ok_or_else(|| BackendError::PipelineCreationFailed("Layout not found".into()))?;
        for (binding, _) in entries {
            if !layout_entries.iter().any(|e| e.binding == *binding) {
                return Err(BackendError::PipelineCreationFailed(format!(
                    "binding {} is not part of the layout",
                    binding
                )));
            }
        }
        let id = self.allocate_id();
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("HeadlessBackend: creating pipeline {:?}", desc.label);
        let id = self.allocate_id();
        self.render_pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.in_render_pass {
            log::warn!("HeadlessBackend: render pass begun inside another pass");
        }
        let depth_cleared = match desc.depth_stencil_attachment.as_ref() {
            Some(att) if matches!(att.depth_load_op, LoadOp::Clear(_)) => {
                if let Some(image) = self.depth_image_mut(att.view) {
                    image.fill(att.depth_clear_value);
                }
                true
            }
            _ => false,
        };
        self.in_render_pass = true;
        self.current_pipeline = None;
        self.record(RecordedCommand::BeginRenderPass {
            label: desc.label.clone(),
            color_attachments: desc.color_attachments.iter().map(|c| c.view).collect(),
            depth_attachment: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
            depth_cleared,
        });
    }

    fn end_render_pass(&mut self) {
        self.record(RecordedCommand::EndRenderPass);
        self.in_render_pass = false;
        self.current_pipeline = None;
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.current_pipeline = Some(pipeline);
        self.record(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record(RecordedCommand::SetVertexBuffer { slot, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.record(RecordedCommand::SetIndexBuffer { buffer, offset, format });
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record(RecordedCommand::SetViewport { x, y, width, height });
    }

    fn set_depth_bias(&mut self, bias: Option<DepthBias>) {
        self.depth_bias = bias;
        if self.in_render_pass {
            self.record(RecordedCommand::SetDepthBias(bias));
        }
    }

    fn depth_bias(&self) -> Option<DepthBias> {
        self.depth_bias
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        let depth_bias = self.effective_bias();
        self.record(RecordedCommand::Draw {
            vertices,
            instances,
            depth_bias,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        let depth_bias = self.effective_bias();
        self.record(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
            depth_bias,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(entry) = self.buffers.remove(&buffer.0) {
            self.memory_used = self.memory_used.saturating_sub(entry.desc.size);
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture.0) {
            self.memory_used = self.memory_used.saturating_sub(entry.desc.byte_size());
            self.texture_views.retain(|_, t| *t != texture.0);
        }
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        self.bind_group_layouts.remove(&layout.0);
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.render_pipelines.remove(&pipeline.0);
        if self.current_pipeline == Some(pipeline) {
            self.current_pipeline = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_desc(size: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some("depth".into()),
            width: size,
            height: size,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }

    fn triangle_pipeline(backend: &mut HeadlessBackend, topology: PrimitiveTopology) -> RenderPipelineHandle {
        backend
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: None,
                vertex_shader: String::new(),
                fragment_shader: None,
                vertex_layouts: vec![],
                bind_group_layouts: vec![],
                primitive_topology: topology,
                front_face: FrontFace::Ccw,
                cull_mode: CullMode::None,
                depth_stencil: Some(DepthStencilState {
                    format: TextureFormat::Depth32Float,
                    depth_write_enabled: true,
                    depth_compare: CompareFunction::Less,
                }),
                color_targets: vec![],
            })
            .unwrap()
    }

    #[test]
    fn depth_clear_fills_texels() {
        let mut backend = HeadlessBackend::new();
        let texture = backend.create_texture(&depth_desc(4)).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        backend.depth_image_mut(view).unwrap().fill(0.3);

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear".into()),
            color_attachments: vec![],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view,
                depth_load_op: LoadOp::Clear([1.0; 4]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });
        backend.end_render_pass();

        assert!(backend.depth_image(view).unwrap().texels.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn memory_budget_rejects_allocation() {
        let mut backend = HeadlessBackend::new().with_memory_budget(1024);
        let result = backend.create_texture(&depth_desc(64));
        assert!(matches!(result, Err(BackendError::OutOfMemory)));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn destroy_texture_releases_views_and_budget() {
        let mut backend = HeadlessBackend::new().with_memory_budget(64 * 64 * 4);
        let texture = backend.create_texture(&depth_desc(64)).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        backend.destroy_texture(texture);
        assert!(backend.depth_image(view).is_none());
        assert!(backend.create_texture(&depth_desc(64)).is_ok());
    }

    #[test]
    fn depth_bias_only_reaches_triangle_draws() {
        let mut backend = HeadlessBackend::new();
        let triangles = triangle_pipeline(&mut backend, PrimitiveTopology::TriangleList);
        let points = triangle_pipeline(&mut backend, PrimitiveTopology::PointList);
        let bias = DepthBias::new(1.87, 1.0);

        backend.set_depth_bias(Some(bias));
        backend.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        backend.set_render_pipeline(triangles);
        backend.draw(0..3, 0..1);
        backend.set_render_pipeline(points);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();

        let biases: Vec<_> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Draw { depth_bias, .. } => Some(*depth_bias),
                _ => None,
            })
            .collect();
        assert_eq!(biases, vec![Some(bias), None]);
    }

    #[test]
    fn border_sampler_requires_capability() {
        let mut backend = HeadlessBackend::new().without_clamp_to_border();
        let result = backend.create_sampler(&SamplerDescriptor {
            address_mode_u: AddressMode::ClampToBorder,
            border_color: Some(BorderColor::OpaqueWhite),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn depth_upload_round_trips_through_sampler() {
        let mut backend = HeadlessBackend::new();
        let texture = backend.create_texture(&depth_desc(2)).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        let texels = [0.1f32, 0.2, 0.3, 0.4];
        backend.write_texture(texture, bytemuck::cast_slice(&texels), 2, 2);
        let sampler = backend
            .create_sampler(&SamplerDescriptor {
                mag_filter: FilterMode::Nearest,
                min_filter: FilterMode::Nearest,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(backend.sample_depth(view, sampler, 0.75, 0.75), Some(0.4));
    }
}
