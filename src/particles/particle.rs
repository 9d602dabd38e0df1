//! Particle types: CPU simulation state and the uploaded vertex record

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::backend::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

/// CPU-side particle state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// Seconds since spawn
    pub age: f32,
    /// Seconds the particle may live, fixed at spawn
    pub life_span: f32,
    pub velocity: Vec3,
    pub position: Vec3,
}

impl Particle {
    pub fn new(position: Vec3, velocity: Vec3, life_span: f32) -> Self {
        Self {
            age: 0.0,
            life_span,
            velocity,
            position,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.age < self.life_span
    }

    /// `age / life_span`, below 1 while alive
    pub fn normalized_age(&self) -> f32 {
        self.age / self.life_span
    }

    pub fn to_vertex(&self) -> ParticleVertex {
        ParticleVertex {
            position: self.position.to_array(),
            normalized_age: self.normalized_age(),
        }
    }
}

/// Per-particle vertex: `(x, y, z, normalized_age)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 3],
    pub normalized_age: f32,
}

impl ParticleVertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x4,
                offset: 0,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_four_floats() {
        assert_eq!(std::mem::size_of::<ParticleVertex>(), 16);
        let v = Particle {
            age: 1.0,
            life_span: 4.0,
            velocity: Vec3::ZERO,
            position: Vec3::new(1.0, 2.0, 3.0),
        }
        .to_vertex();
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&v));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.25]);
    }

    #[test]
    fn alive_until_life_span() {
        let mut p = Particle::new(Vec3::ZERO, Vec3::X, 5.0);
        assert!(p.is_alive());
        p.age = 5.0;
        assert!(!p.is_alive());
    }
}
