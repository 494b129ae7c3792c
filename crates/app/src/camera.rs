//! Orbiting camera, steerable with a mouse drag.

use std::f32::consts::TAU;

use glam::{Mat4, Vec3};

/// Radians of yaw per pixel of horizontal drag.
const DRAG_YAW_PER_PIXEL: f32 = 0.005;

/// Camera circling the origin at a fixed distance.
///
/// The automatic orbit keeps running while dragging; a drag adds a yaw
/// offset and raises or lowers the camera.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub distance: f32,
    pub height: f32,
    /// Radians per second.
    pub angular_speed: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Yaw added by dragging.
    pub yaw_offset: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            distance: 14.0,
            height: 4.0,
            angular_speed: 0.3,
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 100.0,
            yaw_offset: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn position(&self, time: f32) -> Vec3 {
        let angle = time * self.angular_speed + self.yaw_offset;
        Vec3::new(angle.sin() * self.distance, self.height, angle.cos() * self.distance)
    }

    /// Applies a drag of `(dx, dy)` pixels. Dragging down lifts the camera;
    /// the height stays within one orbit distance of the ground plane.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        self.yaw_offset = (self.yaw_offset - dx * DRAG_YAW_PER_PIXEL) % TAU;
        let step = self.distance * DRAG_YAW_PER_PIXEL;
        self.height = (self.height + dy * step).clamp(-self.distance, self.distance);
    }

    pub fn view(&self, time: f32) -> Mat4 {
        Mat4::look_at_rh(self.position(time), Vec3::ZERO, Vec3::Y)
    }

    /// Perspective projection for an `aspect` viewport. The main passes flip
    /// the viewport, so no Y flip is applied here.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(f32::EPSILON), self.near, self.far)
    }

    pub fn view_projection(&self, time: f32, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_keeps_distance_and_faces_origin() {
        let camera = OrbitCamera::default();
        for time in [0.0, 1.5, 10.0] {
            let position = camera.position(time);
            let horizontal = Vec3::new(position.x, 0.0, position.z).length();
            assert!((horizontal - camera.distance).abs() < 1e-4);

            let origin = camera.view(time).transform_point3(Vec3::ZERO);
            assert!(origin.x.abs() < 1e-4 && origin.y.abs() < 1e-4);
            assert!(origin.z < 0.0);
        }
    }

    #[test]
    fn test_drag_turns_and_lifts_within_bounds() {
        let mut camera = OrbitCamera::default();
        let before = camera.position(0.0);

        camera.drag(100.0, 0.0);
        let after = camera.position(0.0);
        assert!((after.y - before.y).abs() < 1e-6);
        assert!(before.distance(after) > 0.1);
        // Still on the orbit.
        let horizontal = Vec3::new(after.x, 0.0, after.z).length();
        assert!((horizontal - camera.distance).abs() < 1e-4);

        for _ in 0..100 {
            camera.drag(0.0, 100.0);
        }
        assert_eq!(camera.height, camera.distance);
        for _ in 0..100 {
            camera.drag(0.0, -100.0);
        }
        assert_eq!(camera.height, -camera.distance);
    }
}
