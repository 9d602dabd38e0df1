//! Object placement and its per-object uniform

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};

/// Position, rotation and scale of a scene object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse transpose of the model matrix
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix().inverse().transpose()
    }

    /// Local +Z in world space
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

/// Per-object uniform read by both scene shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
    pub normal_matrix: Mat4,
    pub base_color: Vec4,
}

impl ObjectUniform {
    pub fn new(model: Mat4, base_color: Vec4) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
            base_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let transform = Transform::default().with_scale(Vec3::new(2.0, 1.0, 1.0));
        // a surface tilted 45 degrees in XY keeps a perpendicular normal after scaling
        let tangent = transform.matrix().transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        let normal = transform
            .normal_matrix()
            .transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert!(tangent.dot(normal).abs() < 1e-5);
    }

    #[test]
    fn object_uniform_matches_transform() {
        let transform = Transform::from_position(Vec3::new(0.0, 15.0, 0.0));
        let uniform = ObjectUniform::new(transform.matrix(), Vec4::ONE);
        assert_eq!(uniform.model, transform.matrix());
        assert_eq!(uniform.normal_matrix, transform.normal_matrix());
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 144);
    }
}
