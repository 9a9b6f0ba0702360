use arpose_config::CameraConfig;
use glam::{Mat4, Quat, Vec3};

/// Render camera that mirrors the physical device camera.
///
/// Pose comes from the vision server each frame; projection comes from the
/// device intrinsics so virtual content lines up with the background feed.
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position (render space).
    pub position: Vec3,
    /// World-space orientation (render space). Looks down local -Z.
    pub orientation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Aspect ratio (width / height).
    pub aspect_ratio: f32,
    /// Near clipping plane (meters).
    pub near: f32,
    /// Far clipping plane (meters).
    pub far: f32,
}

impl Camera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            fov_y: config.fov_y(),
            aspect_ratio: config.aspect(),
            near: config.near,
            far: config.far,
        }
    }

    pub fn set_pose(&mut self, position: Vec3, orientation: Quat) {
        self.position = position;
        self.orientation = orientation;
    }

    /// Direction the camera is looking.
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    /// View matrix (inverse of camera world transform).
    pub fn view_matrix(&self) -> Mat4 {
        let rotation = Mat4::from_quat(self.orientation.conjugate());
        let translation = Mat4::from_translation(-self.position);
        rotation * translation
    }

    /// Perspective projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.near, self.far)
    }
}
