//! Scene management

mod camera;
mod light;
mod mesh;
mod renderer;
mod transform;

pub use camera::*;
pub use light::*;
pub use mesh::*;
pub use renderer::*;
pub use transform::*;

use glam::{Vec3, Vec4};

/// Height of the fighter above the landing pad
pub const FIGHTER_ALTITUDE: f32 = 15.0;

/// A renderable object in the scene
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub name: String,
    pub mesh_id: usize,
    pub transform: Transform,
    pub base_color: Vec4,
}

impl RenderObject {
    pub fn new(name: &str, mesh_id: usize) -> Self {
        Self {
            name: name.to_string(),
            mesh_id,
            transform: Transform::default(),
            base_color: Vec4::ONE,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn uniform_data(&self) -> ObjectUniform {
        ObjectUniform::new(self.transform.matrix(), self.base_color)
    }
}

/// Meshes and the objects placing them
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub objects: Vec<RenderObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Landing pad at the origin with a fighter hovering above it.
    ///
    /// Both are procedural stand-ins: a flat pad and a box-shaped hull.
    pub fn landing_pad() -> Self {
        let mut scene = Self::new();
        let pad = scene.add_mesh(Mesh::plane(80.0, 80.0, 8));
        let hull = scene.add_mesh(Mesh::cube());

        scene.add_object(
            RenderObject::new("landing_pad", pad).with_color(Vec4::new(0.6, 0.6, 0.6, 1.0)),
        );
        scene.add_object(
            RenderObject::new("fighter", hull)
                .with_transform(
                    Transform::from_position(FIGHTER_ALTITUDE * Vec3::Y)
                        .with_scale(Vec3::new(6.0, 2.0, 14.0)),
                )
                .with_color(Vec4::new(0.8, 0.8, 0.85, 1.0)),
        );
        scene
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_object(&mut self, object: RenderObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn object(&self, name: &str) -> Option<&RenderObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut RenderObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }
}
