//! GPU side of the particle effect: vertex upload and point rendering

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::particle::ParticleVertex;
use super::pool::ParticlePool;
use crate::backend::*;
use crate::shaders::PARTICLE_SHADER;

/// Vertex buffer sized for a full pool
pub struct ParticleBuffer {
    buffer: BufferHandle,
    capacity: usize,
    staging: Vec<ParticleVertex>,
    alive: u32,
}

impl ParticleBuffer {
    pub fn new<B: GraphicsBackend>(backend: &mut B, capacity: usize) -> BackendResult<Self> {
        let size = (capacity.max(1) * std::mem::size_of::<ParticleVertex>()) as u64;
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Particle Vertices".into()),
            size,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?;
        Ok(Self {
            buffer,
            capacity,
            staging: Vec::with_capacity(capacity),
            alive: 0,
        })
    }

    /// Write the pool's snapshot; returns the number of valid records
    pub fn upload<B: GraphicsBackend>(&mut self, backend: &mut B, pool: &ParticlePool) -> u32 {
        self.staging.clear();
        self.staging.extend(pool.snapshot().take(self.capacity));
        if !self.staging.is_empty() {
            backend.write_buffer(self.buffer, 0, bytemuck::cast_slice(&self.staging));
        }
        self.alive = self.staging.len() as u32;
        self.alive
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records written by the last upload
    pub fn alive(&self) -> u32 {
        self.alive
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.buffer);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ParticleUniform {
    pub view_proj: Mat4,
    pub color_young: Vec4,
    pub color_old: Vec4,
}

/// Additive point-list pipeline reading [`ParticleBuffer`]
pub struct ParticleRenderer {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    uniform_buffer: BufferHandle,
    bind_group: BindGroupHandle,
    vertices: ParticleBuffer,
    pub color_young: Vec4,
    pub color_old: Vec4,
}

impl ParticleRenderer {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        capacity: usize,
        color_format: TextureFormat,
        depth_format: Option<TextureFormat>,
    ) -> BackendResult<Self> {
        let layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;

        let uniform_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Particle Uniforms".into()),
            size: std::mem::size_of::<ParticleUniform>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;

        let bind_group = backend.create_bind_group(
            layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: uniform_buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Particle Pipeline".into()),
            vertex_shader: PARTICLE_SHADER.to_string(),
            fragment_shader: Some(PARTICLE_SHADER.to_string()),
            vertex_layouts: vec![ParticleVertex::layout()],
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::PointList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            // particles are depth tested against the scene but never occlude each other
            depth_stencil: depth_format.map(|format| DepthStencilState {
                format,
                depth_write_enabled: false,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: color_format,
                blend: Some(BlendState::additive()),
                write_mask: ColorWrites::ALL,
            }],
        })?;

        Ok(Self {
            layout,
            pipeline,
            uniform_buffer,
            bind_group,
            vertices: ParticleBuffer::new(backend, capacity)?,
            color_young: Vec4::new(1.0, 0.85, 0.4, 1.0),
            color_old: Vec4::new(0.7, 0.15, 0.05, 1.0),
        })
    }

    pub fn upload<B: GraphicsBackend>(&mut self, backend: &mut B, pool: &ParticlePool) -> u32 {
        self.vertices.upload(backend, pool)
    }

    /// Draw the last upload as points; must run inside a render pass
    pub fn draw<B: GraphicsBackend>(&self, backend: &mut B, view_proj: Mat4) {
        let uniform = ParticleUniform {
            view_proj,
            color_young: self.color_young,
            color_old: self.color_old,
        };
        backend.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        let count = self.vertices.alive();
        if count == 0 {
            return;
        }
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, self.bind_group);
        backend.set_vertex_buffer(0, self.vertices.handle(), 0);
        backend.draw(0..count, 0..1);
    }

    pub fn vertices(&self) -> &ParticleBuffer {
        &self.vertices
    }

    pub fn pipeline(&self) -> RenderPipelineHandle {
        self.pipeline
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_render_pipeline(self.pipeline);
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_bind_group_layout(self.layout);
        backend.destroy_buffer(self.uniform_buffer);
        self.vertices.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::Particle;
    use glam::Vec3;

    #[test]
    fn upload_writes_only_live_records() {
        let mut backend = HeadlessBackend::new();
        let mut pool = ParticlePool::new(8);
        for i in 0..3 {
            pool.spawn(Particle::new(Vec3::splat(i as f32), Vec3::ZERO, 2.0));
        }
        let mut buffer = ParticleBuffer::new(&mut backend, pool.capacity()).unwrap();

        assert_eq!(buffer.upload(&mut backend, &pool), 3);

        let bytes = backend.buffer_data(buffer.handle()).unwrap();
        assert_eq!(bytes.len(), 8 * 16);
        let records: Vec<ParticleVertex> = bytemuck::pod_collect_to_vec(&bytes[..3 * 16]);
        assert_eq!(records[2].position, [2.0, 2.0, 2.0]);
        assert_eq!(records[2].normalized_age, 0.0);
    }

    #[test]
    fn destroy_frees_every_resource() {
        let mut backend = HeadlessBackend::new();
        let renderer =
            ParticleRenderer::new(&mut backend, 16, TextureFormat::Rgba8Unorm, None).unwrap();
        assert_eq!(backend.live_buffers(), 2);

        renderer.destroy(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bind_groups(), 0);
        assert_eq!(backend.live_bind_group_layouts(), 0);
        assert_eq!(backend.live_pipelines(), 0);
    }

    #[test]
    fn draw_skips_empty_pool() {
        let mut backend = HeadlessBackend::new();
        let renderer =
            ParticleRenderer::new(&mut backend, 16, TextureFormat::Rgba8Unorm, None).unwrap();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        renderer.draw(&mut backend, Mat4::IDENTITY);
        backend.end_render_pass();

        assert!(!backend
            .commands()
            .iter()
            .any(|c| matches!(c, RecordedCommand::Draw { .. })));
    }

    #[test]
    fn points_are_blended_without_depth_writes() {
        let mut backend = HeadlessBackend::new();
        let renderer = ParticleRenderer::new(
            &mut backend,
            16,
            TextureFormat::Rgba8Unorm,
            Some(TextureFormat::Depth32Float),
        )
        .unwrap();
        let desc = backend.pipeline_descriptor(renderer.pipeline()).unwrap();
        assert_eq!(desc.primitive_topology, PrimitiveTopology::PointList);
        assert!(!desc.depth_stencil.as_ref().unwrap().depth_write_enabled);
        assert_eq!(desc.color_targets[0].blend, Some(BlendState::additive()));
    }
}
