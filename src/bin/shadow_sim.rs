//! Headless driver: renders a fixed number of frames and logs frame statistics

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use shadow_particles::backend::GraphicsBackend;
use shadow_particles::{
    BackendType, DemoConfig, FrameRenderer, FrameTargets, HeadlessBackend, Scene, SceneRenderer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Headless,
    Wgpu,
}

impl From<BackendArg> for BackendType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Headless => BackendType::Headless,
            BackendArg::Wgpu => BackendType::Wgpu,
        }
    }
}

/// Shadow-mapped scene with a particle stream, rendered off-screen
#[derive(Parser, Debug)]
#[command(name = "shadow-sim")]
#[command(about = "Two-pass shadow mapping and particle simulation driver", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to render
    #[arg(short, long, default_value_t = 300)]
    frames: u64,

    /// Seconds per frame
    #[arg(long, default_value_t = 0.016_666_668)]
    dt: f32,

    /// Rendering backend
    #[arg(short, long, value_enum, default_value_t = BackendArg::Headless)]
    backend: BackendArg,

    /// Seed for the particle emitter
    #[arg(short, long)]
    seed: Option<u64>,

    /// Log statistics every N frames
    #[arg(long, default_value_t = 60)]
    report_every: u64,
}

fn run<B: GraphicsBackend>(backend: &mut B, config: &DemoConfig, args: &Args) -> anyhow::Result<()> {
    let targets = FrameTargets::offscreen(backend, config.width, config.height)
        .context("allocating the main render target")?;
    let mut scene = SceneRenderer::new(
        backend,
        Scene::landing_pad(),
        shadow_particles::frame::MAIN_COLOR_FORMAT,
        shadow_particles::frame::MAIN_DEPTH_FORMAT,
    )
    .context("creating scene resources")?;
    let mut renderer = FrameRenderer::new(backend, config, args.seed)?;

    for _ in 0..args.frames {
        let stats = renderer.render_frame(backend, args.dt, &targets, |backend, pass| {
            scene.draw(backend, pass)
        })?;
        if args.report_every > 0 && stats.frame % args.report_every == 0 {
            log::info!(
                "frame {}: {} particles alive ({} drawn, +{} / -{}), shadow map {} ({} allocations)",
                stats.frame,
                stats.alive_particles,
                stats.drawn_particles,
                stats.spawned,
                stats.expired,
                stats.shadow_resolution,
                stats.shadow_allocations
            );
        }
    }

    renderer.release(backend);
    scene.release(backend);
    targets.release(backend);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };

    match BackendType::from(args.backend) {
        BackendType::Headless => run(&mut HeadlessBackend::new(), &config, &args),
        #[cfg(feature = "wgpu-backend")]
        BackendType::Wgpu => {
            let mut backend = shadow_particles::WgpuBackend::new_headless()
                .context("creating the wgpu device")?;
            run(&mut backend, &config, &args)
        }
        #[cfg(not(feature = "wgpu-backend"))]
        BackendType::Wgpu => anyhow::bail!("built without the wgpu-backend feature"),
    }
}
