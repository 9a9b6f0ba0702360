use crate::align::PlaneAlignment;
use crate::camera::Camera;
use crate::physics::PhysicsWorld;
use crate::space::{
    physics_to_render_quat, physics_to_render_vec, render_to_physics_quat, render_to_physics_vec,
    VisionQuat, VisionVec3,
};
use arpose_config::{AppConfig, SceneConfig};
use arpose_net::{BackgroundFrame, CameraReading};
use glam::{Mat4, Quat, Vec3};
use rapier3d::prelude::RigidBodyHandle;
use thiserror::Error;
use tracing::{debug, info};

/// Squared quaternion lengths below this carry no usable orientation.
const MIN_ROTATION_LEN_SQ: f32 = 1e-8;

#[derive(Debug, Error, PartialEq)]
pub enum PoseError {
    #[error("Camera position is not finite: {0}")]
    NonFinitePosition(Vec3),
    #[error("Camera rotation is not a usable quaternion: {0}")]
    InvalidRotation(Quat),
}

/// The virtual ground the physics objects rest on.
#[derive(Debug, Clone)]
pub struct GroundPlane {
    pub position: Vec3,
    pub rotation: Quat,
    /// Full extents (meters).
    pub size: Vec3,
}

impl GroundPlane {
    pub fn new(size: Vec3) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            size,
        }
    }

    /// Compute the model matrix for the plane mesh.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.size, self.rotation, self.position)
    }

    /// Plane up direction.
    pub fn normal(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

/// Everything the renderer draws, in render space.
pub struct Stage {
    pub camera: Camera,
    /// Latest camera image, drawn behind the scene.
    pub background: Option<BackgroundFrame>,
    pub ground: GroundPlane,
}

impl Stage {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            camera: Camera::from_config(&config.camera),
            background: None,
            ground: GroundPlane::new(config.scene.ground_size),
        }
    }

    /// Move the render camera to the tracked pose and swap in the new background.
    ///
    /// A reading with an unusable pose is rejected and leaves the stage untouched.
    pub fn apply_camera(&mut self, reading: CameraReading) -> Result<(), PoseError> {
        if !reading.position.is_finite() {
            return Err(PoseError::NonFinitePosition(reading.position));
        }
        let rotation = reading.rotation;
        if !rotation.is_finite() || rotation.length_squared() < MIN_ROTATION_LEN_SQ {
            return Err(PoseError::InvalidRotation(rotation));
        }

        self.camera.set_pose(
            VisionVec3(reading.position).to_render(),
            VisionQuat(reading.rotation).to_render(),
        );
        self.background = Some(reading.frame);
        Ok(())
    }

    pub fn apply_alignment(&mut self, alignment: &PlaneAlignment) {
        self.ground.position = alignment.position;
        self.ground.rotation = alignment.rotation;
    }
}

/// Lifecycle hooks of the content placed on the detected plane.
pub trait SceneHooks {
    /// Build scene content. Runs once, after the first plane alignment.
    fn init(&mut self, stage: &Stage, physics: &mut PhysicsWorld);
    /// Runs once, right after `init`.
    fn on_start(&mut self);
    /// Advance scene logic. Physics has already been stepped by `dt`.
    fn update(&mut self, dt: f32, stage: &Stage, physics: &PhysicsWorld);
}

/// A physics-driven object mirrored into render space.
#[derive(Debug, Clone)]
pub struct Prop {
    pub body: RigidBodyHandle,
    pub position: Vec3,
    pub rotation: Quat,
    pub size: f32,
}

impl Prop {
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.size), self.rotation, self.position)
    }
}

/// Default scene: drops a few boxes onto the ground plane.
pub struct DebugScene {
    config: SceneConfig,
    props: Vec<Prop>,
    elapsed: f32,
    next_report: f32,
}

/// Seconds between settle reports.
const REPORT_INTERVAL: f32 = 2.0;

impl DebugScene {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            config: config.clone(),
            props: Vec::new(),
            elapsed: 0.0,
            next_report: REPORT_INTERVAL,
        }
    }

    pub fn props(&self) -> &[Prop] {
        &self.props
    }
}

impl SceneHooks for DebugScene {
    fn init(&mut self, stage: &Stage, physics: &mut PhysicsWorld) {
        let ground = &stage.ground;
        let up = ground.normal();
        let size = self.config.drop_box_size;
        // Spread along the plane's own x axis so they don't land on each other.
        let across = ground.rotation * Vec3::X;

        for i in 0..self.config.drop_count {
            let offset = (i as f32 - (self.config.drop_count as f32 - 1.0) / 2.0) * size * 2.0;
            let lift = self.config.drop_height + i as f32 * size;
            let position = ground.position + up * lift + across * offset;
            let body = physics.spawn_box(
                render_to_physics_vec(position),
                render_to_physics_quat(ground.rotation),
                size / 2.0,
            );
            self.props.push(Prop {
                body,
                position,
                rotation: ground.rotation,
                size,
            });
        }

        info!(props = self.props.len(), "Debug scene populated");
    }

    fn on_start(&mut self) {
        self.elapsed = 0.0;
        self.next_report = REPORT_INTERVAL;
    }

    fn update(&mut self, dt: f32, stage: &Stage, physics: &PhysicsWorld) {
        self.elapsed += dt;

        for prop in &mut self.props {
            if let Some((translation, rotation)) = physics.body_pose(prop.body) {
                prop.position = physics_to_render_vec(&translation);
                prop.rotation = physics_to_render_quat(&rotation);
            }
        }

        if self.elapsed >= self.next_report {
            self.next_report += REPORT_INTERVAL;
            let ground = &stage.ground;
            let heights: Vec<f32> = self
                .props
                .iter()
                .map(|p| (p.position - ground.position).dot(ground.normal()))
                .collect();
            debug!(elapsed = self.elapsed, ?heights, "Prop heights above plane");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arpose_net::PlaneReading;
    use glam::Vec4;

    fn camera_reading() -> CameraReading {
        CameraReading {
            frame: BackgroundFrame {
                data: vec![1, 2, 3],
                width: 1,
                height: 1,
            },
            position: Vec3::new(0.1, 0.2, 0.3),
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn camera_reading_is_converted_to_render_space() {
        let mut stage = Stage::new(&AppConfig::default());
        stage.apply_camera(camera_reading()).unwrap();

        assert_eq!(stage.camera.position, Vec3::new(0.1, -0.2, -0.3));
        assert!(stage.camera.orientation.angle_between(Quat::IDENTITY) < 1e-6);
        assert_eq!(stage.background.as_ref().map(|f| f.data.len()), Some(3));
    }

    #[test]
    fn unusable_camera_pose_is_rejected() {
        let mut stage = Stage::new(&AppConfig::default());
        stage.apply_camera(camera_reading()).unwrap();

        let mut nan_position = camera_reading();
        nan_position.position.x = f32::NAN;
        nan_position.frame.data = vec![9; 3];
        assert!(matches!(
            stage.apply_camera(nan_position),
            Err(PoseError::NonFinitePosition(_))
        ));

        for rotation in [
            Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
            Quat::from_xyzw(0.0, f32::NAN, 0.0, 1.0),
            Quat::from_xyzw(0.0, 0.0, f32::INFINITY, 1.0),
        ] {
            let mut reading = camera_reading();
            reading.rotation = rotation;
            assert!(matches!(
                stage.apply_camera(reading),
                Err(PoseError::InvalidRotation(_))
            ));
        }

        // The last good pose and background survive.
        assert_eq!(stage.camera.position, Vec3::new(0.1, -0.2, -0.3));
        assert!(stage.camera.orientation.is_finite());
        assert!(stage.camera.view_matrix().is_finite());
        assert_eq!(stage.background.as_ref().map(|f| f.data[0]), Some(1));
    }

    #[test]
    fn unnormalized_camera_rotation_is_accepted() {
        let mut stage = Stage::new(&AppConfig::default());
        let mut reading = camera_reading();
        reading.rotation = Quat::from_xyzw(0.0, 0.0, 0.0, 2.0);
        stage.apply_camera(reading).unwrap();
        assert!(stage.camera.orientation.angle_between(Quat::IDENTITY) < 1e-6);
    }

    #[test]
    fn ground_model_matrix_scales_by_size() {
        let ground = GroundPlane::new(Vec3::new(1.0, 0.05, 1.0));
        let corner = ground.model_matrix().transform_point3(Vec3::splat(0.5));
        assert!((corner - Vec3::new(0.5, 0.025, 0.5)).length() < 1e-6);
    }

    #[test]
    fn debug_scene_drops_boxes_that_settle_on_plane() {
        let config = AppConfig::default();
        let mut stage = Stage::new(&config);
        let mut physics = PhysicsWorld::new(
            render_to_physics_vec(config.scene.ground_size / 2.0),
            config.align.gravity,
        );

        let alignment = crate::align::align_plane(
            &PlaneReading {
                equation: Vec4::new(0.0, 1.0, 0.0, 0.0),
                anchor: Vec3::ZERO,
            },
            config.align.gravity,
        )
        .unwrap();
        stage.apply_alignment(&alignment);

        let mut scene = DebugScene::new(&config.scene);
        scene.init(&stage, &mut physics);
        scene.on_start();
        assert_eq!(scene.props().len(), config.scene.drop_count as usize);
        assert_eq!(physics.dynamic_body_count(), config.scene.drop_count as usize);

        for _ in 0..240 {
            physics.step(1.0 / 60.0);
            scene.update(1.0 / 60.0, &stage, &physics);
        }

        for prop in scene.props() {
            let height = (prop.position - stage.ground.position).dot(stage.ground.normal());
            assert!(height > 0.0 && height < config.scene.drop_height, "height {height}");
        }
    }
}
