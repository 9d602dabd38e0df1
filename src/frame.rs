//! One frame of the demo: light depth pass, shaded main pass, particles
//!
//! [`FrameRenderer::render_frame`] records, in order:
//! 1. light rig update and light frame
//! 2. shadow settings and the depth pass from the light
//! 3. shadow matrix and shading uniform
//! 4. the main pass with the scene and the particle points
//! 5. particle simulation step, upload and draw, then spawning

use glam::Mat4;
use thiserror::Error;

use crate::backend::*;
use crate::config::{DemoConfig, RenderSettings};
use crate::particles::{ParticleEmitter, ParticlePool, ParticleRenderer};
use crate::scene::{Camera, LightRig, ShadingFlags, ShadingUniform, SpotLight};
use crate::shadow::{ShadowBinding, ShadowError, ShadowPipeline, DEPTH_CLEAR};

pub const MAIN_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const MAIN_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Shadow(#[from] ShadowError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// What the scene callback is asked to draw
#[derive(Debug, Clone, Copy)]
pub enum ScenePass<'a> {
    /// Depth from the light; the bound target carries a debug color
    /// attachment when `debug_color` is set
    Depth {
        view: Mat4,
        proj: Mat4,
        debug_color: bool,
    },
    /// Shaded view from the camera, reading the shadow map
    Main {
        view: Mat4,
        proj: Mat4,
        shading: &'a ShadingUniform,
        shadow: ShadowBinding,
    },
}

/// Camera, light and settings carried from frame to frame
#[derive(Debug, Clone)]
pub struct RenderState {
    pub camera: Camera,
    pub light_rig: LightRig,
    pub spot: SpotLight,
    pub settings: RenderSettings,
    /// Set while the user drags the light; pauses automatic rotation
    pub dragging: bool,
}

impl RenderState {
    pub fn from_config(config: &DemoConfig) -> Self {
        Self {
            camera: config.camera.clone(),
            light_rig: LightRig::default(),
            spot: SpotLight::default(),
            settings: config.settings.clone(),
            dragging: false,
        }
    }

    pub fn drag_light(&mut self, delta_x: f32) {
        self.light_rig.drag(delta_x);
    }

    fn shading_flags(&self) -> ShadingFlags {
        ShadingFlags {
            spot: self.settings.use_spot_light,
            soft_falloff: self.settings.soft_falloff,
            hardware_pcf: self.settings.hardware_pcf,
        }
    }
}

/// Color and depth views the main pass renders into
#[derive(Debug, Clone)]
pub struct FrameTargets {
    pub color: TextureViewHandle,
    pub depth: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    owned: Vec<TextureHandle>,
}

impl FrameTargets {
    /// Wrap views owned elsewhere
    pub fn new(color: TextureViewHandle, depth: TextureViewHandle, width: u32, height: u32) -> Self {
        Self {
            color,
            depth,
            width,
            height,
            owned: Vec::new(),
        }
    }

    /// Allocate an off-screen color and depth pair
    pub fn offscreen<B: GraphicsBackend>(backend: &mut B, width: u32, height: u32) -> BackendResult<Self> {
        let color_texture = backend.create_texture(&TextureDescriptor {
            label: Some("Main Color".into()),
            width,
            height,
            format: MAIN_COLOR_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        })?;
        let depth_texture = backend.create_texture(&TextureDescriptor {
            label: Some("Main Depth".into()),
            width,
            height,
            format: MAIN_DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        Ok(Self {
            color: backend.create_texture_view(color_texture)?,
            depth: backend.create_texture_view(depth_texture)?,
            width,
            height,
            owned: vec![color_texture, depth_texture],
        })
    }

    /// Destroy the textures this value allocated
    pub fn release<B: GraphicsBackend>(self, backend: &mut B) {
        for texture in self.owned {
            backend.destroy_texture(texture);
        }
    }
}

/// Per-frame numbers for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frame: u64,
    /// Particles in the pool after spawning
    pub alive_particles: usize,
    /// Points drawn this frame
    pub drawn_particles: u32,
    pub spawned: usize,
    pub expired: usize,
    pub shadow_resolution: u32,
    /// Shadow target allocations so far
    pub shadow_allocations: u32,
}

pub struct FrameRenderer {
    state: RenderState,
    shadow: ShadowPipeline,
    pool: ParticlePool,
    emitter: ParticleEmitter,
    particles: ParticleRenderer,
    clear_color: [f32; 4],
    frame: u64,
}

impl FrameRenderer {
    /// `seed` fixes the emitter's random sequence
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        config: &DemoConfig,
        seed: Option<u64>,
    ) -> Result<Self, RenderError> {
        let state = RenderState::from_config(config);
        let shadow = ShadowPipeline::new(state.settings.shadow_resolution, config.shadow_debug_color)?;
        let particles = ParticleRenderer::new(
            backend,
            config.particle_capacity,
            MAIN_COLOR_FORMAT,
            Some(MAIN_DEPTH_FORMAT),
        )?;
        log::info!(
            "Frame renderer on {}: {} particles max, shadow map {}",
            backend.name(),
            config.particle_capacity,
            state.settings.shadow_resolution
        );

        Ok(Self {
            state,
            shadow,
            pool: ParticlePool::new(config.particle_capacity),
            emitter: ParticleEmitter::new(config.emitter.clone(), seed),
            particles,
            clear_color: config.clear_color,
            frame: 0,
        })
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    pub fn shadow(&self) -> &ShadowPipeline {
        &self.shadow
    }

    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    pub fn emitter_mut(&mut self) -> &mut ParticleEmitter {
        &mut self.emitter
    }

    pub fn particles(&self) -> &ParticleRenderer {
        &self.particles
    }

    /// Record and submit one frame.
    ///
    /// `scene` is called once per pass with the matrices to draw with; it runs
    /// inside the open render pass.
    pub fn render_frame<B, F>(
        &mut self,
        backend: &mut B,
        dt: f32,
        targets: &FrameTargets,
        mut scene: F,
    ) -> Result<FrameStats, RenderError>
    where
        B: GraphicsBackend,
        F: FnMut(&mut B, ScenePass<'_>) -> BackendResult<()>,
    {
        backend.begin_frame()?;

        let state = &mut self.state;
        state
            .light_rig
            .update(dt, state.settings.manual_light_only, state.dragging);
        let light_position = state.light_rig.position();
        let light = ShadowPipeline::compute_light_frame(light_position);

        self.shadow.apply_settings(&state.settings)?;
        let debug_color = self.shadow.target().has_color();
        let mut depth_result = Ok(());
        self.shadow.render_depth(backend, &light, |backend, view, proj| {
            depth_result = scene(
                backend,
                ScenePass::Depth {
                    view: *view,
                    proj: *proj,
                    debug_color,
                },
            );
        })?;
        depth_result?;

        state.camera.set_aspect(targets.width as f32, targets.height as f32);
        let camera_view = state.camera.view_matrix();
        let camera_proj = state.camera.projection_matrix();
        let shadow_matrix = ShadowPipeline::compute_shadow_matrix(light.view, light.proj, camera_view);
        state.spot.inner_degrees = state.settings.inner_spot_angle;
        state.spot.outer_degrees = state.settings.outer_spot_angle;
        let shading = ShadingUniform::new(
            camera_view,
            shadow_matrix,
            light_position,
            &state.spot,
            state.shading_flags(),
        );
        let shadow = self
            .shadow
            .shadow_binding()
            .ok_or_else(|| BackendError::InvalidHandle("shadow binding".into()))?;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Main Pass".into()),
            color_attachments: vec![ColorAttachment {
                view: targets.color,
                load_op: LoadOp::Clear(self.clear_color),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: targets.depth,
                depth_load_op: LoadOp::Clear([DEPTH_CLEAR, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: DEPTH_CLEAR,
            }),
        });
        backend.set_viewport(0.0, 0.0, targets.width as f32, targets.height as f32, 0.0, 1.0);

        let main_result = scene(
            backend,
            ScenePass::Main {
                view: camera_view,
                proj: camera_proj,
                shading: &shading,
                shadow,
            },
        );
        let mut expired = 0;
        let mut drawn_particles = 0;
        if main_result.is_ok() {
            expired = self.pool.advance(dt);
            drawn_particles = self.particles.upload(backend, &self.pool);
            self.particles.draw(backend, camera_proj * camera_view);
        }
        backend.end_render_pass();
        main_result?;

        let spawned = self.emitter.emit(&mut self.pool);
        backend.end_frame()?;

        self.frame += 1;
        let stats = FrameStats {
            frame: self.frame,
            alive_particles: self.pool.len(),
            drawn_particles,
            spawned,
            expired,
            shadow_resolution: self.shadow.target().resolution(),
            shadow_allocations: self.shadow.target().allocations(),
        };
        log::trace!("{stats:?}");
        Ok(stats)
    }

    /// Destroy the shadow target and the particle resources
    pub fn release<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.shadow.release(backend);
        self.particles.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn setup(capacity: usize) -> (HeadlessBackend, FrameRenderer, FrameTargets) {
        let mut backend = HeadlessBackend::new();
        let config = DemoConfig {
            particle_capacity: capacity,
            ..Default::default()
        };
        let renderer = FrameRenderer::new(&mut backend, &config, Some(11)).unwrap();
        let targets = FrameTargets::offscreen(&mut backend, 64, 32).unwrap();
        (backend, renderer, targets)
    }

    #[test]
    fn scene_sees_depth_then_main() {
        let (mut backend, mut renderer, targets) = setup(256);
        let mut passes = Vec::new();
        renderer
            .render_frame(&mut backend, 0.016, &targets, |_, pass| {
                passes.push(match pass {
                    ScenePass::Depth { debug_color, .. } => format!("depth {debug_color}"),
                    ScenePass::Main { .. } => "main".to_string(),
                });
                Ok(())
            })
            .unwrap();
        assert_eq!(passes, vec!["depth true", "main"]);
        assert_eq!(backend.frames_submitted(), 1);
    }

    #[test]
    fn particles_spawn_after_drawing() {
        let (mut backend, mut renderer, targets) = setup(100);
        let first = renderer
            .render_frame(&mut backend, 0.016, &targets, |_, _| Ok(()))
            .unwrap();
        assert_eq!(first.drawn_particles, 0);
        assert_eq!(first.spawned, 64);

        let second = renderer
            .render_frame(&mut backend, 0.016, &targets, |_, _| Ok(()))
            .unwrap();
        assert_eq!(second.drawn_particles, 64);
        assert_eq!(second.spawned, 36);
        assert_eq!(second.alive_particles, 100);
    }

    #[test]
    fn main_pass_gets_view_space_light() {
        let (mut backend, mut renderer, targets) = setup(16);
        let mut seen = None;
        renderer
            .render_frame(&mut backend, 0.016, &targets, |_, pass| {
                if let ScenePass::Main { view, shading, .. } = pass {
                    seen = Some((view, *shading));
                }
                Ok(())
            })
            .unwrap();

        let (view, shading) = seen.unwrap();
        let world = view
            .inverse()
            .transform_point3(shading.light_position.truncate());
        // manual-only light stays at its start position
        assert!((world - Vec3::new(40.0, 40.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn release_frees_shadow_and_particle_resources() {
        let (mut backend, mut renderer, targets) = setup(64);
        renderer
            .render_frame(&mut backend, 0.016, &targets, |_, _| Ok(()))
            .unwrap();

        renderer.release(&mut backend);
        targets.release(&mut backend);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_samplers(), 0);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bind_groups(), 0);
        assert_eq!(backend.live_pipelines(), 0);
    }

    #[test]
    fn scene_errors_close_the_pass() {
        let (mut backend, mut renderer, targets) = setup(16);
        let result = renderer.render_frame(&mut backend, 0.016, &targets, |_, pass| match pass {
            ScenePass::Main { .. } => Err(BackendError::DeviceLost),
            _ => Ok(()),
        });
        assert!(matches!(result, Err(RenderError::Backend(BackendError::DeviceLost))));
        assert!(matches!(
            backend.commands().last(),
            Some(RecordedCommand::EndRenderPass)
        ));
        assert!(renderer.pool().is_empty());
    }
}
