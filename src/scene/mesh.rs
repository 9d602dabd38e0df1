//! Mesh data structures and generation

use glam::{Vec2, Vec3};

use crate::backend::*;

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];

        for (normal, right) in faces {
            let up = normal.cross(right);
            let base = mesh.vertices.len() as u32;
            for (sx, sy, uv) in [
                (-0.5, -0.5, Vec2::new(0.0, 1.0)),
                (0.5, -0.5, Vec2::new(1.0, 1.0)),
                (0.5, 0.5, Vec2::new(1.0, 0.0)),
                (-0.5, 0.5, Vec2::new(0.0, 0.0)),
            ] {
                mesh.vertices.push(Vertex {
                    position: normal * 0.5 + right * sx + up * sy,
                    normal,
                    uv,
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Plane on the XZ axis facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let subdivisions = subdivisions.max(1);

        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                mesh.vertices.push(Vertex {
                    position: Vec3::new(
                        -width / 2.0 + x as f32 * step_x,
                        0.0,
                        -depth / 2.0 + z as f32 * step_z,
                    ),
                    normal: Vec3::Y,
                    uv: Vec2::new(x as f32 / subdivisions as f32, z as f32 / subdivisions as f32),
                });
            }
        }

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh
    }
}

/// Vertex and index buffers of an uploaded [`Mesh`]
#[derive(Debug, Clone, Copy)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload<B: GraphicsBackend>(backend: &mut B, mesh: &Mesh) -> BackendResult<Self> {
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} Vertices", mesh.name)),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            mesh.vertex_bytes(),
        )?;
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} Indices", mesh.name)),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            mesh.index_bytes(),
        )?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
        })
    }

    pub fn draw<B: GraphicsBackend>(&self, backend: &mut B) {
        backend.set_vertex_buffer(0, self.vertex_buffer, 0);
        backend.set_index_buffer(self.index_buffer, 0, IndexFormat::Uint32);
        backend.draw_indexed(0..self.index_count, 0, 0..1);
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_ccw(mesh: &Mesh) {
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[tri[i] as usize]);
            let face = (b.position - a.position).cross(c.position - a.position);
            if face.length_squared() < 1e-10 {
                continue;
            }
            assert!(face.dot(a.normal + b.normal + c.normal) > 0.0, "{} winding", mesh.name);
        }
    }

    #[test]
    fn cube_faces_are_outward() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_outward_ccw(&cube);
        for v in &cube.vertices {
            assert!((v.position.dot(v.normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn plane_winds_counter_clockwise_from_above() {
        let plane = Mesh::plane(10.0, 10.0, 4);
        assert_eq!(plane.vertices.len(), 25);
        assert_eq!(plane.triangle_count(), 32);
        assert_outward_ccw(&plane);
    }

    #[test]
    fn upload_copies_mesh_bytes() {
        let mut backend = HeadlessBackend::new();
        let mesh = Mesh::plane(2.0, 2.0, 1);
        let gpu = GpuMesh::upload(&mut backend, &mesh).unwrap();
        assert_eq!(gpu.index_count, 6);
        assert_eq!(backend.buffer_data(gpu.vertex_buffer).unwrap(), mesh.vertex_bytes());
        assert_eq!(backend.buffer_data(gpu.index_buffer).unwrap(), mesh.index_bytes());
    }
}
