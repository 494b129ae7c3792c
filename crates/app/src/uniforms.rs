//! Uniform buffer layouts shared with the GLSL sources under `shaders/`.
//!
//! All structures are `#[repr(C)]`, `Pod`, and follow std140: matrices are
//! 64 bytes and vectors are widened to `Vec4`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use framekit_renderer::cubemap::CUBE_FACES;

/// Camera and one object transform.
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | view_projection |
/// | 64     | 64   | model |
/// | 128    | 16   | camera_position |
/// | 144    | 16   | params |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ObjectUbo {
    pub view_projection: Mat4,
    pub model: Mat4,
    /// World position in xyz.
    pub camera_position: Vec4,
    /// Sample-specific scalars: `x` is the animation time in seconds, `y` is
    /// the spacing of instanced objects.
    pub params: Vec4,
}

impl ObjectUbo {
    pub fn new(view_projection: Mat4, model: Mat4, camera_position: Vec3, params: Vec4) -> Self {
        Self {
            view_projection,
            model,
            camera_position: camera_position.extend(1.0),
            params,
        }
    }
}

/// Six face view-projections for layered cube capture.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LayeredCaptureUbo {
    pub face_view_projection: [Mat4; CUBE_FACES],
    pub model: Mat4,
    pub params: Vec4,
}

/// Split camera for the geometry-shader sample, bound as two uniform buffers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CameraUbo {
    pub view: Mat4,
    pub projection: Mat4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ModelUbo {
    pub model: Mat4,
    /// Inverse transpose of the model matrix.
    pub normal_matrix: Mat4,
    /// Light direction in xyz, normal line length in w.
    pub light: Vec4,
}

impl ModelUbo {
    pub fn new(model: Mat4, light_direction: Vec3, line_length: f32) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
            light: light_direction.normalize_or_zero().extend(line_length),
        }
    }
}

/// Transforms and tessellation controls for the tessellated ground.
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | world |
/// | 64     | 64   | view |
/// | 128    | 64   | projection |
/// | 192    | 16   | light |
/// | 208    | 16   | camera_position |
/// | 224    | 16   | tessellation |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GroundUbo {
    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    /// Direction towards the light in xyz.
    pub light: Vec4,
    pub camera_position: Vec4,
    /// Maximum level, height scale, and the distances at which the level
    /// starts and stops falling off.
    pub tessellation: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std140_sizes() {
        assert_eq!(std::mem::size_of::<ObjectUbo>(), 160);
        assert_eq!(std::mem::size_of::<LayeredCaptureUbo>(), 64 * 7 + 16);
        assert_eq!(std::mem::size_of::<CameraUbo>(), 128);
        assert_eq!(std::mem::size_of::<ModelUbo>(), 144);
        assert_eq!(std::mem::size_of::<GroundUbo>(), 240);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let ubo = ModelUbo::new(Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)), Vec3::Y, 0.2);
        let normal = ubo.normal_matrix.transform_vector3(Vec3::X);
        assert!((normal - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(ubo.light, Vec4::new(0.0, 1.0, 0.0, 0.2));
    }
}
