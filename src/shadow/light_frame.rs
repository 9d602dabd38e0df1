//! Light-space camera and the projective shadow matrix

use glam::{Mat4, Vec3};

/// Vertical field of view of the light frustum
pub const LIGHT_FOV_DEGREES: f32 = 45.0;
/// The shadow map is square
pub const LIGHT_ASPECT: f32 = 1.0;
pub const LIGHT_NEAR: f32 = 25.0;
pub const LIGHT_FAR: f32 = 100.0;

/// Maps clip-space x/y from [-1, 1] to [0, 1].
///
/// Depth is left alone: the projection already produces it in [0, 1].
pub const SHADOW_BIAS: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, 0.5, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.5, 0.5, 0.0, 1.0, //
]);

/// View and projection of the light, recomputed every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightFrame {
    pub view: Mat4,
    pub proj: Mat4,
}

impl LightFrame {
    /// Light looking at the world origin with +Y up.
    ///
    /// The position must not sit on the origin or on the Y axis, where the
    /// look-at basis is undefined.
    pub fn from_position(light_position: Vec3) -> Self {
        debug_assert!(
            light_position.length_squared() > f32::EPSILON,
            "light at the look-at target"
        );
        debug_assert!(
            light_position.cross(Vec3::Y).length_squared() > f32::EPSILON,
            "light direction parallel to the up vector"
        );

        Self {
            view: Mat4::look_at_rh(light_position, Vec3::ZERO, Vec3::Y),
            proj: Mat4::perspective_rh(
                LIGHT_FOV_DEGREES.to_radians(),
                LIGHT_ASPECT,
                LIGHT_NEAR,
                LIGHT_FAR,
            ),
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// Matrix from the main camera's view space into shadow-map space
    pub fn shadow_matrix(&self, camera_view: Mat4) -> Mat4 {
        shadow_matrix(self.view, self.proj, camera_view)
    }
}

/// `bias * light_proj * light_view * camera_view⁻¹`.
///
/// Applied to a view-space position and divided by w, this yields
/// `(u, v, depth)` with `u, v` in [0, 1] inside the light frustum. `v` grows
/// upward; texture lookups flip it.
pub fn shadow_matrix(light_view: Mat4, light_proj: Mat4, camera_view: Mat4) -> Mat4 {
    SHADOW_BIAS * light_proj * light_view * camera_view.inverse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).abs().max_element() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn light_looks_at_origin() {
        let frame = LightFrame::from_position(Vec3::new(40.0, 40.0, 0.0));
        let origin = frame.view.transform_point3(Vec3::ZERO);
        // right-handed view space looks down -Z
        assert!(origin.x.abs() < 1e-4 && origin.y.abs() < 1e-4);
        assert!((origin.z + Vec3::new(40.0, 40.0, 0.0).length()).abs() < 1e-3);
    }

    #[test]
    fn depth_range_covers_near_and_far() {
        let frame = LightFrame::from_position(Vec3::new(0.0, 0.0, 50.0));
        let near = frame.view_proj().project_point3(Vec3::new(0.0, 0.0, 50.0 - LIGHT_NEAR));
        let far = frame.view_proj().project_point3(Vec3::new(0.0, 0.0, 50.0 - LIGHT_FAR));
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn shadow_matrix_round_trip() {
        let light = LightFrame::from_position(Vec3::new(40.0, 40.0, 0.0));
        let camera_view = Mat4::look_at_rh(Vec3::new(-70.0, 50.0, 70.0), Vec3::ZERO, Vec3::Y);
        let shadow = light.shadow_matrix(camera_view);

        for world in [
            Vec3::ZERO,
            Vec3::new(5.0, 15.0, -3.0),
            Vec3::new(-10.0, 0.0, 8.0),
        ] {
            let ndc = light.view_proj().project_point3(world);
            let view_pos = camera_view.transform_point3(world);
            let shadow_pos = shadow * Vec4::from((view_pos, 1.0));
            let coord = shadow_pos.truncate() / shadow_pos.w;
            assert_close(coord, Vec3::new((ndc.x + 1.0) / 2.0, (ndc.y + 1.0) / 2.0, ndc.z));
        }
    }

    #[test]
    fn frustum_corners_map_to_unit_square() {
        let light = LightFrame::from_position(Vec3::new(0.0, 30.0, 40.0));
        let inv = light.view_proj().inverse();
        let corner = inv.project_point3(Vec3::new(1.0, 1.0, 0.5));
        let shadow = light.shadow_matrix(Mat4::IDENTITY);
        assert_close(shadow.project_point3(corner), Vec3::new(1.0, 1.0, 0.5));
    }
}
