//! Host-simulated particle stream rendered as points

pub mod emitter;
pub mod gpu;
pub mod particle;
pub mod pool;

pub use emitter::{EmitterSettings, ParticleEmitter};
pub use gpu::{ParticleBuffer, ParticleRenderer, ParticleUniform};
pub use particle::{Particle, ParticleVertex};
pub use pool::ParticlePool;
