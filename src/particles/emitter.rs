//! Cone emitter feeding the pool each frame

use std::f32::consts::TAU;

use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::particle::Particle;
use super::pool::ParticlePool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterSettings {
    /// Particles requested per `emit` call
    pub spawn_per_frame: usize,
    /// Initial speed in units per second
    pub speed: f32,
    /// Seconds each particle lives
    pub life_span: f32,
    /// Lower bound of the cosine between a particle's direction and the cone axis
    pub cone_min_cos: f32,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            spawn_per_frame: 64,
            speed: 10.0,
            life_span: 5.0,
            cone_min_cos: 0.95,
        }
    }
}

/// Spawns particles from `origin` in a narrow cone around the local +Z axis
pub struct ParticleEmitter {
    settings: EmitterSettings,
    origin: Vec3,
    orientation: Quat,
    rng: StdRng,
}

impl ParticleEmitter {
    /// `seed` makes the emission sequence reproducible
    pub fn new(settings: EmitterSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            settings,
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            rng,
        }
    }

    pub fn settings(&self) -> &EmitterSettings {
        &self.settings
    }

    pub fn set_transform(&mut self, origin: Vec3, orientation: Quat) {
        self.origin = origin;
        self.orientation = orientation;
    }

    /// Axis the cone opens around
    pub fn axis(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    /// Unit direction with `cos(angle to axis)` uniform in `[cone_min_cos, 1]`
    pub fn sample_direction(&mut self) -> Vec3 {
        let min_cos = self.settings.cone_min_cos.clamp(-1.0, 1.0);
        let u: f32 = self.rng.random_range(min_cos..=1.0);
        let theta: f32 = self.rng.random_range(0.0..TAU);
        let r = (1.0 - u * u).max(0.0).sqrt();
        let local = Vec3::new(r * theta.cos(), r * theta.sin(), u).normalize();
        self.orientation * local
    }

    /// Spawn one frame's worth of particles; returns how many the pool accepted
    pub fn emit(&mut self, pool: &mut ParticlePool) -> usize {
        let mut spawned = 0;
        for _ in 0..self.settings.spawn_per_frame {
            if pool.is_full() {
                break;
            }
            let velocity = self.sample_direction() * self.settings.speed;
            if pool.spawn(Particle::new(self.origin, velocity, self.settings.life_span)) {
                spawned += 1;
            }
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_stay_inside_the_cone() {
        let mut emitter = ParticleEmitter::new(EmitterSettings::default(), Some(7));
        for _ in 0..1000 {
            let dir = emitter.sample_direction();
            assert!((dir.length() - 1.0).abs() < 1e-4);
            assert!(dir.dot(Vec3::Z) >= 0.95 - 1e-4);
        }
    }

    #[test]
    fn orientation_rotates_the_cone() {
        let mut emitter = ParticleEmitter::new(EmitterSettings::default(), Some(1));
        emitter.set_transform(Vec3::ZERO, Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
        assert!((emitter.axis() - Vec3::Y).length() < 1e-5);
        for _ in 0..100 {
            assert!(emitter.sample_direction().dot(Vec3::Y) >= 0.95 - 1e-4);
        }
    }

    #[test]
    fn emit_spawns_at_origin_with_speed() {
        let mut pool = ParticlePool::new(1000);
        let mut emitter = ParticleEmitter::new(EmitterSettings::default(), Some(3));
        emitter.set_transform(Vec3::new(0.0, 15.0, 0.0), Quat::IDENTITY);

        assert_eq!(emitter.emit(&mut pool), 64);
        for p in pool.particles() {
            assert_eq!(p.position, Vec3::new(0.0, 15.0, 0.0));
            assert!((p.velocity.length() - 10.0).abs() < 1e-3);
            assert_eq!(p.age, 0.0);
            assert_eq!(p.life_span, 5.0);
        }
    }

    #[test]
    fn emit_respects_capacity() {
        let mut pool = ParticlePool::new(100);
        let mut emitter = ParticleEmitter::new(EmitterSettings::default(), Some(3));
        assert_eq!(emitter.emit(&mut pool), 64);
        assert_eq!(emitter.emit(&mut pool), 36);
        assert_eq!(emitter.emit(&mut pool), 0);
    }

    #[test]
    fn same_seed_same_particles() {
        let mut a = ParticleEmitter::new(EmitterSettings::default(), Some(42));
        let mut b = ParticleEmitter::new(EmitterSettings::default(), Some(42));
        for _ in 0..16 {
            assert_eq!(a.sample_direction(), b.sample_direction());
        }
    }
}
