//! Shadow-casting light: orbit rig, spot parameters and shading uniform

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};

/// Light position before any rotation
pub const LIGHT_START: Vec3 = Vec3::new(40.0, 40.0, 0.0);
/// Radians per second of automatic rotation
pub const LIGHT_ROTATION_SPEED: f32 = 1.0;
/// Radians of manual rotation per dragged pixel
pub const DRAG_RADIANS_PER_PIXEL: f32 = 0.01;

/// Orbits the light about +Y through the origin
#[derive(Debug, Clone, PartialEq)]
pub struct LightRig {
    pub start: Vec3,
    pub angle: f32,
    pub speed: f32,
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            start: LIGHT_START,
            angle: 0.0,
            speed: LIGHT_ROTATION_SPEED,
        }
    }
}

impl LightRig {
    /// Advance automatic rotation unless the light is manual-only or being dragged
    pub fn update(&mut self, dt: f32, manual_only: bool, dragging: bool) {
        if !manual_only && !dragging {
            self.rotate(self.speed * dt);
        }
    }

    /// Rotate by a horizontal drag of `delta_x` pixels
    pub fn drag(&mut self, delta_x: f32) {
        self.rotate(delta_x * DRAG_RADIANS_PER_PIXEL);
    }

    fn rotate(&mut self, radians: f32) {
        self.angle = (self.angle + radians).rem_euclid(std::f32::consts::TAU);
    }

    pub fn position(&self) -> Vec3 {
        Quat::from_rotation_y(self.angle) * self.start
    }
}

/// Color and cone of the spot light
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    /// Multiplier applied before the inverse-square falloff
    pub intensity: f32,
    pub inner_degrees: f32,
    pub outer_degrees: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 10_000.0,
            inner_degrees: 17.5,
            outer_degrees: 22.5,
        }
    }
}

impl SpotLight {
    pub fn cos_inner(&self) -> f32 {
        self.inner_degrees.to_radians().cos()
    }

    pub fn cos_outer(&self) -> f32 {
        self.outer_degrees.to_radians().cos()
    }
}

/// Shading switches forwarded to the fragment shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadingFlags {
    pub spot: bool,
    pub soft_falloff: bool,
    pub hardware_pcf: bool,
}

/// Main-pass light and shadow state; every vector is in camera view space
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadingUniform {
    pub shadow_matrix: Mat4,
    pub view_inverse: Mat4,
    pub light_position: Vec4,
    pub light_direction: Vec4,
    pub light_color: Vec4,
    pub spot: Vec4,
    pub flags: Vec4,
}

impl ShadingUniform {
    /// The spot points from `light_position` at the world origin
    pub fn new(
        camera_view: Mat4,
        shadow_matrix: Mat4,
        light_position: Vec3,
        light: &SpotLight,
        flags: ShadingFlags,
    ) -> Self {
        let direction = (-light_position).normalize_or_zero();
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        Self {
            shadow_matrix,
            view_inverse: camera_view.inverse(),
            light_position: camera_view.transform_point3(light_position).extend(1.0),
            light_direction: camera_view.transform_vector3(direction).extend(0.0),
            light_color: light.color.extend(light.intensity),
            spot: Vec4::new(light.cos_inner(), light.cos_outer(), 0.0, 0.0),
            flags: Vec4::new(
                flag(flags.spot),
                flag(flags.soft_falloff),
                flag(flags.hardware_pcf),
                0.0,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_only_light_stays_put() {
        let mut rig = LightRig::default();
        rig.update(0.5, true, false);
        assert_eq!(rig.position(), LIGHT_START);
        rig.update(0.5, false, true);
        assert_eq!(rig.position(), LIGHT_START);
    }

    #[test]
    fn automatic_rotation_orbits_about_y() {
        let mut rig = LightRig::default();
        rig.update(std::f32::consts::FRAC_PI_2, false, false);
        let p = rig.position();
        assert!((p - Vec3::new(0.0, 40.0, -40.0)).length() < 1e-4);
        assert!((p.length() - LIGHT_START.length()).abs() < 1e-4);
    }

    #[test]
    fn drag_uses_pixels() {
        let mut rig = LightRig::default();
        rig.drag(100.0);
        assert!((rig.angle - 1.0).abs() < 1e-6);
        rig.drag(-200.0);
        assert!((rig.angle - (std::f32::consts::TAU - 1.0)).abs() < 1e-5);
    }

    #[test]
    fn shading_uniform_is_in_view_space() {
        let view = Mat4::look_at_rh(Vec3::new(-70.0, 50.0, 70.0), Vec3::ZERO, Vec3::Y);
        let light = SpotLight::default();
        let uniform = ShadingUniform::new(
            view,
            Mat4::IDENTITY,
            LIGHT_START,
            &light,
            ShadingFlags {
                spot: true,
                ..Default::default()
            },
        );

        let world = uniform.view_inverse.transform_point3(uniform.light_position.truncate());
        assert!((world - LIGHT_START).length() < 1e-3);
        assert_eq!(uniform.light_color.w, 10_000.0);
        assert!(uniform.spot.x > uniform.spot.y);
        assert_eq!(uniform.flags, Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(std::mem::size_of::<ShadingUniform>(), 208);
    }
}
