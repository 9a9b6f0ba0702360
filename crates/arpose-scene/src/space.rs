//! Conversions between the three coordinate conventions in play.
//!
//! - Vision space (SLAM server, OpenCV camera convention): +X right, +Y down, +Z forward.
//! - Render space (scene graph, glam): +X right, +Y up, +Z toward the viewer.
//! - Physics space (rapier): render-space axes in nalgebra types.
//!
//! Vision to render is a 180 degree turn about X, which keeps handedness.

use glam::{Quat, Vec3};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// A vector as reported by the vision server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionVec3(pub Vec3);

impl VisionVec3 {
    pub fn to_render(self) -> Vec3 {
        Vec3::new(self.0.x, -self.0.y, -self.0.z)
    }

    pub fn to_physics(self) -> Vector3<f32> {
        render_to_physics_vec(self.to_render())
    }
}

/// A rotation as reported by the vision server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionQuat(pub Quat);

impl VisionQuat {
    /// Conjugate by the basis change: `R * q * R^-1` with `R` = 180 degrees about X.
    pub fn to_render(self) -> Quat {
        let q = self.0;
        Quat::from_xyzw(q.x, -q.y, -q.z, q.w).normalize()
    }

    pub fn to_physics(self) -> UnitQuaternion<f32> {
        render_to_physics_quat(self.to_render())
    }
}

pub fn render_to_physics_vec(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

pub fn render_to_physics_quat(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn physics_to_render_vec(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn physics_to_render_quat(q: &UnitQuaternion<f32>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_down_is_render_down() {
        // +Y is down in vision space, so it becomes -Y in render space.
        assert_eq!(VisionVec3(Vec3::Y).to_render(), Vec3::NEG_Y);
        // Looking forward (+Z) in vision space is -Z in render space.
        assert_eq!(VisionVec3(Vec3::Z).to_render(), Vec3::NEG_Z);
        assert_eq!(VisionVec3(Vec3::X).to_render(), Vec3::X);
    }

    #[test]
    fn rotation_conversion_commutes_with_vector_conversion() {
        let q = Quat::from_axis_angle(Vec3::new(0.3, -0.8, 0.5).normalize(), 1.1);
        let v = Vec3::new(0.4, -1.2, 2.5);

        let rotated_then_converted = VisionVec3(q * v).to_render();
        let converted_then_rotated = VisionQuat(q).to_render() * VisionVec3(v).to_render();
        assert!((rotated_then_converted - converted_then_rotated).length() < 1e-5);
    }

    #[test]
    fn conversion_is_deterministic() {
        let q = Quat::from_xyzw(0.740481, 0.193315, -0.595241, -0.244961);
        assert_eq!(VisionQuat(q).to_render(), VisionQuat(q).to_render());
        assert_eq!(VisionQuat(q).to_physics(), VisionQuat(q).to_physics());
    }

    #[test]
    fn physics_uses_render_axes() {
        let v = VisionVec3(Vec3::new(1.0, 2.0, 3.0));
        let p = v.to_physics();
        assert_eq!((p.x, p.y, p.z), (1.0, -2.0, -3.0));
        assert_eq!(physics_to_render_vec(&p), v.to_render());

        let q = Quat::from_rotation_y(0.7);
        let back = physics_to_render_quat(&render_to_physics_quat(q));
        assert!(back.angle_between(q) < 1e-5);
    }
}
