//! Shared setup for the frame integration tests

#![allow(dead_code)]

use shadow_particles::backend::*;
use shadow_particles::frame::{MAIN_COLOR_FORMAT, MAIN_DEPTH_FORMAT};
use shadow_particles::{DemoConfig, FrameRenderer, FrameStats, FrameTargets, Scene, SceneRenderer};

pub const DT: f32 = 1.0 / 60.0;

/// Backends a test can run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Headless,
    Wgpu,
}

/// Renderer, scene and targets wired together on one backend
pub struct TestContext<B: GraphicsBackend> {
    pub backend: B,
    pub renderer: FrameRenderer,
    pub scene: SceneRenderer,
    pub targets: FrameTargets,
}

impl<B: GraphicsBackend> TestContext<B> {
    pub fn new(mut backend: B, config: &DemoConfig) -> Self {
        let targets = FrameTargets::offscreen(&mut backend, 64, 64).expect("main targets");
        let scene = SceneRenderer::new(
            &mut backend,
            Scene::landing_pad(),
            MAIN_COLOR_FORMAT,
            MAIN_DEPTH_FORMAT,
        )
        .expect("scene renderer");
        let renderer = FrameRenderer::new(&mut backend, config, Some(1234)).expect("frame renderer");
        Self {
            backend,
            renderer,
            scene,
            targets,
        }
    }

    pub fn frame(&mut self, dt: f32) -> FrameStats {
        let scene = &mut self.scene;
        self.renderer
            .render_frame(&mut self.backend, dt, &self.targets, |backend, pass| {
                scene.draw(backend, pass)
            })
            .expect("frame")
    }

    pub fn run(&mut self, frames: usize, dt: f32) -> Vec<FrameStats> {
        (0..frames).map(|_| self.frame(dt)).collect()
    }
}

pub fn headless(config: &DemoConfig) -> TestContext<HeadlessBackend> {
    TestContext::new(HeadlessBackend::new(), config)
}

/// Commands of each render pass, split at pass boundaries
pub fn passes(commands: &[RecordedCommand]) -> Vec<(String, Vec<RecordedCommand>)> {
    let mut passes = Vec::new();
    for command in commands {
        match command {
            RecordedCommand::BeginRenderPass { label, .. } => {
                passes.push((label.clone().unwrap_or_default(), Vec::new()));
            }
            other => {
                if let Some((_, pass)) = passes.last_mut() {
                    pass.push(other.clone());
                }
            }
        }
    }
    passes
}

/// Depth bias of every indexed draw in `pass`
pub fn draw_biases(pass: &[RecordedCommand]) -> Vec<Option<DepthBias>> {
    pass.iter()
        .filter_map(|c| match c {
            RecordedCommand::DrawIndexed { depth_bias, .. } => Some(*depth_bias),
            _ => None,
        })
        .collect()
}
