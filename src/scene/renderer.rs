//! GPU resources for drawing the scene in the depth and main passes

use super::{FrameUniform, GpuMesh, ObjectUniform, Scene, ShadingUniform};
use crate::backend::*;
use crate::frame::ScenePass;
use crate::shaders::{DEPTH_SHADER, SHADING_SHADER};
use crate::shadow::target::{DEBUG_COLOR_FORMAT, DEPTH_FORMAT};
use crate::shadow::ShadowBinding;

struct UniformSlot {
    buffer: BufferHandle,
    bind_group: BindGroupHandle,
}

impl UniformSlot {
    fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_buffer(self.buffer);
    }

    fn new<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        label: &str,
        size: usize,
    ) -> BackendResult<Self> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: size as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let bind_group = backend.create_bind_group(
            layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;
        Ok(Self { buffer, bind_group })
    }
}

/// Draws a [`Scene`] for either pass of a frame
pub struct SceneRenderer {
    scene: Scene,
    meshes: Vec<GpuMesh>,
    objects: Vec<UniformSlot>,
    depth_pipeline: RenderPipelineHandle,
    depth_debug_pipeline: RenderPipelineHandle,
    shading_pipeline: RenderPipelineHandle,
    frame_layout: BindGroupLayoutHandle,
    object_layout: BindGroupLayoutHandle,
    shading_layout: BindGroupLayoutHandle,
    // the light and camera passes run in one submission, so each needs its own buffer
    light_frame: UniformSlot,
    camera_frame: UniformSlot,
    shading_buffer: BufferHandle,
    shadow_group: Option<(ShadowBinding, BindGroupHandle)>,
    shadow_group_builds: u32,
}

impl SceneRenderer {
    /// `color_format` and `depth_format` describe the main-pass target
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        scene: Scene,
        color_format: TextureFormat,
        depth_format: TextureFormat,
    ) -> BackendResult<Self> {
        let uniform_entry = |visibility| BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: BindingType::UniformBuffer,
        };
        let frame_layout = backend.create_bind_group_layout(&[uniform_entry(ShaderStageFlags::VERTEX)])?;
        let object_layout =
            backend.create_bind_group_layout(&[uniform_entry(ShaderStageFlags::VERTEX_FRAGMENT)])?;
        let shading_layout = backend.create_bind_group_layout(&[
            uniform_entry(ShaderStageFlags::VERTEX_FRAGMENT),
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Depth,
                },
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { comparison: true },
            },
        ])?;

        let depth_descriptor = |label: &str, debug_color: bool| RenderPipelineDescriptor {
            label: Some(label.to_string()),
            vertex_shader: DEPTH_SHADER.to_string(),
            fragment_shader: debug_color.then(|| DEPTH_SHADER.to_string()),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![frame_layout, object_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: if debug_color {
                vec![ColorTargetState {
                    format: DEBUG_COLOR_FORMAT,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                }]
            } else {
                Vec::new()
            },
        };
        let depth_pipeline = backend.create_render_pipeline(&depth_descriptor("Shadow Depth Pipeline", false))?;
        let depth_debug_pipeline =
            backend.create_render_pipeline(&depth_descriptor("Shadow Depth Debug Pipeline", true))?;

        let shading_pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Shading Pipeline".into()),
            vertex_shader: SHADING_SHADER.to_string(),
            fragment_shader: Some(SHADING_SHADER.to_string()),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![frame_layout, object_layout, shading_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: depth_format,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: color_format,
                blend: None,
                write_mask: ColorWrites::ALL,
            }],
        })?;

        let meshes = scene
            .meshes
            .iter()
            .map(|mesh| GpuMesh::upload(backend, mesh))
            .collect::<BackendResult<Vec<_>>>()?;
        let objects = scene
            .objects
            .iter()
            .map(|object| {
                UniformSlot::new(
                    backend,
                    object_layout,
                    &format!("{} Uniforms", object.name),
                    std::mem::size_of::<ObjectUniform>(),
                )
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let frame_size = std::mem::size_of::<FrameUniform>();
        let light_frame = UniformSlot::new(backend, frame_layout, "Light Frame Uniforms", frame_size)?;
        let camera_frame = UniformSlot::new(backend, frame_layout, "Camera Frame Uniforms", frame_size)?;
        let shading_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Shading Uniforms".into()),
            size: std::mem::size_of::<ShadingUniform>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;

        log::debug!(
            "Scene renderer ready: {} meshes, {} objects",
            meshes.len(),
            objects.len()
        );

        Ok(Self {
            scene,
            meshes,
            objects,
            depth_pipeline,
            depth_debug_pipeline,
            shading_pipeline,
            frame_layout,
            object_layout,
            shading_layout,
            light_frame,
            camera_frame,
            shading_buffer,
            shadow_group: None,
            shadow_group_builds: 0,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Objects may move freely; adding objects or meshes needs a new renderer
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Times the shadow bind group was (re)created
    pub fn shadow_group_builds(&self) -> u32 {
        self.shadow_group_builds
    }

    pub fn depth_pipeline(&self, debug_color: bool) -> RenderPipelineHandle {
        if debug_color {
            self.depth_debug_pipeline
        } else {
            self.depth_pipeline
        }
    }

    pub fn shading_pipeline(&self) -> RenderPipelineHandle {
        self.shading_pipeline
    }

    /// Record the draws for one pass; must run inside that pass
    pub fn draw<B: GraphicsBackend>(&mut self, backend: &mut B, pass: ScenePass<'_>) -> BackendResult<()> {
        match pass {
            ScenePass::Depth {
                view,
                proj,
                debug_color,
            } => {
                backend.write_buffer(
                    self.light_frame.buffer,
                    0,
                    bytemuck::bytes_of(&FrameUniform::new(view, proj)),
                );
                backend.set_render_pipeline(self.depth_pipeline(debug_color));
                backend.set_bind_group(0, self.light_frame.bind_group);
            }
            ScenePass::Main {
                view,
                proj,
                shading,
                shadow,
            } => {
                backend.write_buffer(
                    self.camera_frame.buffer,
                    0,
                    bytemuck::bytes_of(&FrameUniform::new(view, proj)),
                );
                backend.write_buffer(self.shading_buffer, 0, bytemuck::bytes_of(shading));
                let shadow_group = self.shadow_group(backend, shadow)?;
                backend.set_render_pipeline(self.shading_pipeline);
                backend.set_bind_group(0, self.camera_frame.bind_group);
                backend.set_bind_group(2, shadow_group);
            }
        }
        self.draw_objects(backend)
    }

    /// Destroy every GPU resource the renderer created
    pub fn release<B: GraphicsBackend>(self, backend: &mut B) {
        if let Some((_, group)) = self.shadow_group {
            backend.destroy_bind_group(group);
        }
        for slot in self.objects {
            slot.destroy(backend);
        }
        self.light_frame.destroy(backend);
        self.camera_frame.destroy(backend);
        backend.destroy_buffer(self.shading_buffer);
        for mesh in self.meshes {
            mesh.destroy(backend);
        }
        for pipeline in [self.depth_pipeline, self.depth_debug_pipeline, self.shading_pipeline] {
            backend.destroy_render_pipeline(pipeline);
        }
        for layout in [self.frame_layout, self.object_layout, self.shading_layout] {
            backend.destroy_bind_group_layout(layout);
        }
    }

    fn draw_objects<B: GraphicsBackend>(&self, backend: &mut B) -> BackendResult<()> {
        for (object, slot) in self.scene.objects.iter().zip(&self.objects) {
            let mesh = self.meshes.get(object.mesh_id).ok_or_else(|| {
                BackendError::InvalidHandle(format!("mesh {} of {}", object.mesh_id, object.name))
            })?;
            backend.write_buffer(slot.buffer, 0, bytemuck::bytes_of(&object.uniform_data()));
            backend.set_bind_group(1, slot.bind_group);
            mesh.draw(backend);
        }
        Ok(())
    }

    /// Bind group for the shadow map, rebuilt when the target or sampler changed
    fn shadow_group<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        shadow: ShadowBinding,
    ) -> BackendResult<BindGroupHandle> {
        if let Some((bound, group)) = self.shadow_group.take() {
            if bound == shadow {
                self.shadow_group = Some((bound, group));
                return Ok(group);
            }
            backend.destroy_bind_group(group);
        }
        let group = backend.create_bind_group(
            self.shading_layout,
            &[
                (
                    0,
                    BindGroupEntry::Buffer {
                        buffer: self.shading_buffer,
                        offset: 0,
                        size: None,
                    },
                ),
                (1, BindGroupEntry::Texture(shadow.depth_view)),
                (2, BindGroupEntry::Sampler(shadow.sampler)),
            ],
        )?;
        self.shadow_group = Some((shadow, group));
        self.shadow_group_builds += 1;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ShadingFlags, SpotLight};
    use crate::shadow::ShadowPipeline;
    use glam::{Mat4, Vec3};

    fn renderer(backend: &mut HeadlessBackend) -> SceneRenderer {
        SceneRenderer::new(
            backend,
            Scene::landing_pad(),
            TextureFormat::Rgba8Unorm,
            TextureFormat::Depth32Float,
        )
        .unwrap()
    }

    fn in_pass(
        backend: &mut HeadlessBackend,
        scene: &mut SceneRenderer,
        pass: ScenePass<'_>,
    ) -> BackendResult<()> {
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("scene".into()),
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        let result = scene.draw(backend, pass);
        backend.end_render_pass();
        result
    }

    #[test]
    fn depth_pass_draws_every_object_with_depth_pipeline() {
        let mut backend = HeadlessBackend::new();
        let mut scene = renderer(&mut backend);
        backend.take_commands();

        in_pass(
            &mut backend,
            &mut scene,
            ScenePass::Depth {
                view: Mat4::IDENTITY,
                proj: Mat4::IDENTITY,
                debug_color: false,
            },
        )
        .unwrap();

        let commands = backend.commands();
        assert!(matches!(commands[0], RecordedCommand::BeginRenderPass { .. }));
        assert!(matches!(
            commands[1],
            RecordedCommand::SetPipeline(p) if p == scene.depth_pipeline(false)
        ));
        assert!(matches!(commands.last(), Some(RecordedCommand::EndRenderPass)));
        let draws = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::DrawIndexed { .. }))
            .count();
        assert_eq!(draws, 2);

        let debug = backend.pipeline_descriptor(scene.depth_pipeline(true)).unwrap();
        assert_eq!(debug.color_targets[0].format, DEBUG_COLOR_FORMAT);
        let plain = backend.pipeline_descriptor(scene.depth_pipeline(false)).unwrap();
        assert!(plain.color_targets.is_empty() && plain.fragment_shader.is_none());
    }

    #[test]
    fn shadow_group_follows_binding() {
        let mut backend = HeadlessBackend::new();
        let mut scene = renderer(&mut backend);
        let mut shadow = ShadowPipeline::new(64, false).unwrap();
        let light = ShadowPipeline::compute_light_frame(Vec3::new(40.0, 40.0, 0.0));
        shadow.render_depth(&mut backend, &light, |_, _, _| {}).unwrap();

        let shading = ShadingUniform::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec3::ONE,
            &SpotLight::default(),
            ShadingFlags::default(),
        );
        let main = |scene: &mut SceneRenderer, backend: &mut HeadlessBackend, shadow: &ShadowPipeline| {
            in_pass(
                backend,
                scene,
                ScenePass::Main {
                    view: Mat4::IDENTITY,
                    proj: Mat4::IDENTITY,
                    shading: &shading,
                    shadow: shadow.shadow_binding().unwrap(),
                },
            )
            .unwrap();
        };

        main(&mut scene, &mut backend, &shadow);
        main(&mut scene, &mut backend, &shadow);
        assert_eq!(scene.shadow_group_builds(), 1);

        shadow.set_hardware_pcf(true);
        shadow.render_depth(&mut backend, &light, |_, _, _| {}).unwrap();
        main(&mut scene, &mut backend, &shadow);
        assert_eq!(scene.shadow_group_builds(), 2);
        assert_eq!(backend.live_bind_groups(), 2 + 2 + 1);

        let draws = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::DrawIndexed { .. }))
            .count();
        assert_eq!(draws, 6);
    }

    #[test]
    fn release_frees_every_resource() {
        let mut backend = HeadlessBackend::new();
        let mut scene = renderer(&mut backend);
        let mut shadow = ShadowPipeline::new(64, false).unwrap();
        let light = ShadowPipeline::compute_light_frame(Vec3::new(40.0, 40.0, 0.0));
        shadow.render_depth(&mut backend, &light, |_, _, _| {}).unwrap();
        let shading = ShadingUniform::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec3::ONE,
            &SpotLight::default(),
            ShadingFlags::default(),
        );
        in_pass(
            &mut backend,
            &mut scene,
            ScenePass::Main {
                view: Mat4::IDENTITY,
                proj: Mat4::IDENTITY,
                shading: &shading,
                shadow: shadow.shadow_binding().unwrap(),
            },
        )
        .unwrap();

        scene.release(&mut backend);
        shadow.release(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bind_groups(), 0);
        assert_eq!(backend.live_bind_group_layouts(), 0);
        assert_eq!(backend.live_pipelines(), 0);
        assert_eq!(backend.live_textures(), 0);
    }
}
