//! Fixed-capacity particle pool
//!
//! Particles live densely in `particles[..len]`. Removal swaps the last live
//! particle into the freed slot, so indices are not stable across calls.

use super::particle::{Particle, ParticleVertex};

pub struct ParticlePool {
    particles: Box<[Particle]>,
    len: usize,
}

impl ParticlePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            particles: vec![Particle::default(); capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.particles.len()
    }

    /// Live particles, in storage order
    pub fn particles(&self) -> &[Particle] {
        &self.particles[..self.len]
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles[..self.len]
    }

    /// Add a particle; dropped silently when the pool is full.
    ///
    /// Returns whether the particle was stored.
    pub fn spawn(&mut self, particle: Particle) -> bool {
        debug_assert!(particle.life_span > 0.0, "life span must be positive");
        if self.is_full() {
            return false;
        }
        self.particles[self.len] = particle;
        self.len += 1;
        true
    }

    /// Remove the particle at `index` by moving the last one into its slot.
    ///
    /// # Panics
    /// If `index >= len()`.
    pub fn kill(&mut self, index: usize) {
        assert!(
            index < self.len,
            "kill index {} out of range for {} particles",
            index,
            self.len
        );
        self.len -= 1;
        self.particles.swap(index, self.len);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Advance the simulation by `dt` seconds; returns how many particles expired.
    ///
    /// Expiry is decided on the pre-step age for every particle first: a
    /// particle whose `age + dt` would pass its life span is removed without
    /// receiving this step's motion. Only the survivors are then integrated.
    pub fn advance(&mut self, dt: f32) -> usize {
        let before = self.len;
        let mut i = 0;
        while i < self.len {
            let p = &self.particles[i];
            if p.age >= p.life_span || p.age + dt > p.life_span {
                // the swapped-in particle still needs checking
                self.kill(i);
            } else {
                i += 1;
            }
        }

        for p in self.particles_mut() {
            p.age += dt;
            p.position += p.velocity * dt;
        }
        before - self.len
    }

    /// Upload records for every live particle.
    ///
    /// The iterator is lazy and can be cloned to walk the pool again.
    /// Order follows storage and is otherwise unspecified.
    pub fn snapshot(&self) -> impl Iterator<Item = ParticleVertex> + Clone + '_ {
        self.particles()
            .iter()
            .filter(|p| p.is_alive())
            .map(Particle::to_vertex)
    }
}
