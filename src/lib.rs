//! Shadow Particles - two-pass shadow mapping and a CPU-simulated particle stream
//!
//! The renderer draws a scene twice per frame: once from the light into an
//! off-screen depth map, then from the camera with every fragment tested
//! against that map. A fixed-capacity particle pool is simulated on the host
//! and drawn as additive points in the main pass.
//!
//! Two backends implement [`backend::GraphicsBackend`]:
//! - **headless**: CPU-only, records commands and emulates depth clears and
//!   shadow sampling for tests
//! - **wgpu**: off-screen GPU rendering (feature `wgpu-backend`)
//!
//! # Features
//! - Lazily reallocated shadow target with edge or border clamping
//! - Polygon offset during the depth pass
//! - Spot light with hard or soft cone falloff
//! - Swap-remove particle pool with a cone emitter

pub mod backend;
pub mod config;
pub mod frame;
pub mod particles;
pub mod scene;
pub mod shaders;
pub mod shadow;
pub mod ui;

pub use backend::{GraphicsBackend, HeadlessBackend};
pub use config::{ConfigError, DemoConfig, RenderSettings};
pub use frame::{FrameRenderer, FrameStats, FrameTargets, RenderError, RenderState, ScenePass};
pub use particles::{Particle, ParticleEmitter, ParticlePool};
pub use scene::{Scene, SceneRenderer};
pub use shadow::{ClampMode, ShadowError, ShadowPipeline};

#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;

/// Backend selection for the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// CPU-only command recorder
    #[default]
    Headless,
    /// wgpu on whatever adapter is available, without a surface
    Wgpu,
}
