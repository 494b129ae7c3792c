//! Procedural meshes for the samples.
//!
//! # Vertex Layout
//!
//! - location 0: position (vec3), offset 0
//! - location 1: normal (vec3), offset 12
//! - location 2: tex_coord (vec2), offset 24
//!
//! Stride is 32 bytes.

use std::f32::consts::{PI, TAU};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// Indexed triangle list.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned cube with edge `2 * half_extent`, four vertices per face
    /// so normals stay flat.
    pub fn cube(half_extent: f32) -> Self {
        // (normal, u axis, v axis) per face, counter-clockwise seen from outside.
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut mesh = MeshData::default();
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (normal + u * su + v * sv) * half_extent;
                let tex_coord = Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5);
                mesh.vertices.push(Vertex::new(position, normal, tex_coord));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// UV sphere of `radius` with `segments` longitudinal and `rings`
    /// latitudinal divisions.
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);

        let mut mesh = MeshData::default();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * TAU;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                mesh.vertices
                    .push(Vertex::new(normal * radius, normal, Vec2::new(u, v)));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                mesh.indices
                    .extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }

    /// Torus around the Y axis.
    pub fn torus(major_radius: f32, minor_radius: f32, segments: u32, sides: u32) -> Self {
        let segments = segments.max(3);
        let sides = sides.max(3);

        let mut mesh = MeshData::default();
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let phi = u * TAU;
            let center = Vec3::new(phi.cos(), 0.0, phi.sin()) * major_radius;
            for side in 0..=sides {
                let v = side as f32 / sides as f32;
                let theta = v * TAU;
                let outward = Vec3::new(phi.cos(), 0.0, phi.sin());
                let normal = outward * theta.cos() + Vec3::Y * theta.sin();
                mesh.vertices.push(Vertex::new(
                    center + normal * minor_radius,
                    normal,
                    Vec2::new(u, v),
                ));
            }
        }

        let stride = sides + 1;
        for segment in 0..segments {
            for side in 0..sides {
                let a = segment * stride + side;
                let b = a + stride;
                mesh.indices
                    .extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }

    /// Quad in the XY plane spanning `size` with UVs from the top-left.
    pub fn quad(size: Vec2) -> Self {
        let half = size * 0.5;
        let corners = [
            (Vec2::new(-half.x, -half.y), Vec2::new(0.0, 1.0)),
            (Vec2::new(half.x, -half.y), Vec2::new(1.0, 1.0)),
            (Vec2::new(half.x, half.y), Vec2::new(1.0, 0.0)),
            (Vec2::new(-half.x, half.y), Vec2::new(0.0, 0.0)),
        ];
        MeshData {
            vertices: corners
                .iter()
                .map(|&(p, uv)| Vertex::new(p.extend(0.0), Vec3::Z, uv))
                .collect(),
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Flat square grid on the XZ plane, centered on the origin, with
    /// `divisions` cells per side.
    ///
    /// Unlike the other meshes the indices are four-point patches, one per
    /// cell, ordered `(x, z)`, `(x + 1, z)`, `(x, z + 1)`, `(x + 1, z + 1)`.
    /// UVs run from 0 to 1 along +X and +Z.
    pub fn ground_patches(edge: f32, divisions: u32) -> Self {
        let divisions = divisions.max(1);
        let row = divisions + 1;
        let cell = edge / divisions as f32;

        let mut mesh = MeshData::default();
        for z in 0..row {
            for x in 0..row {
                let uv = Vec2::new(x as f32, z as f32) / divisions as f32;
                let position = Vec3::new(x as f32 * cell - edge * 0.5, 0.0, z as f32 * cell - edge * 0.5);
                mesh.vertices.push(Vertex::new(position, Vec3::Y, uv));
            }
        }
        for z in 0..divisions {
            for x in 0..divisions {
                let v0 = z * row + x;
                mesh.indices
                    .extend_from_slice(&[v0, v0 + 1, v0 + row, v0 + row + 1]);
            }
        }
        mesh
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(mesh: &MeshData) {
        assert_eq!(mesh.indices.len() % 3, 0);
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
    }

    /// Counter-clockwise seen from the side the normals point to. Degenerate
    /// pole triangles pass.
    fn assert_winds_outward(mesh: &MeshData) {
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[triangle[i] as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            let normal = a.normal + b.normal + c.normal;
            assert!(face_normal.dot(normal) >= -1e-6);
        }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(Vertex::binding_description().stride, 32);
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let mesh = MeshData::cube(1.0);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert_indices_in_range(&mesh);
        assert_winds_outward(&mesh);
    }

    #[test]
    fn test_sphere_vertices_lie_on_radius() {
        let mesh = MeshData::sphere(2.0, 16, 8);
        assert_indices_in_range(&mesh);
        assert_winds_outward(&mesh);
        for vertex in &mesh.vertices {
            assert!((vertex.position.length() - 2.0).abs() < 1e-4);
            assert!((vertex.normal.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_torus_and_quad_are_well_formed() {
        let torus = MeshData::torus(1.0, 0.3, 24, 12);
        assert_indices_in_range(&torus);
        assert_winds_outward(&torus);
        assert_eq!(torus.index_count(), 24 * 12 * 6);

        let quad = MeshData::quad(Vec2::new(640.0, 360.0));
        assert_indices_in_range(&quad);
        assert_eq!(quad.vertices[2].position, Vec3::new(320.0, 180.0, 0.0));
    }

    #[test]
    fn test_ground_patches_cover_centered_grid() {
        let mesh = MeshData::ground_patches(200.0, 10);
        assert_eq!(mesh.vertices.len(), 121);
        assert_eq!(mesh.indices.len(), 100 * 4);
        assert!(mesh.indices.iter().all(|&i| i < 121));

        // First patch: the corner cell at -X, -Z.
        assert_eq!(mesh.indices[..4], [0, 1, 11, 12]);
        let corner = mesh.vertices[0];
        assert_eq!(corner.position, Vec3::new(-100.0, 0.0, -100.0));
        assert_eq!(corner.tex_coord, Vec2::ZERO);
        let far = mesh.vertices[120];
        assert_eq!(far.position, Vec3::new(100.0, 0.0, 100.0));
        assert_eq!(far.tex_coord, Vec2::ONE);

        // Last patch: the corner cell at +X, +Z.
        assert_eq!(mesh.indices[396..], [108, 109, 119, 120]);
    }
}
