//! Rigid-body world the virtual objects live in.
//!
//! Thin owner of the rapier sets and pipeline. Everything here is physics
//! space; see [`crate::space`] for conversions.

use nalgebra::{UnitQuaternion, Vector3};
use rapier3d::prelude::*;

/// Largest step taken in one go. Longer stalls are simulated as this much time.
pub const MAX_STEP_SECS: f32 = 0.1;

pub struct PhysicsWorld {
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    ground: RigidBodyHandle,
}

impl PhysicsWorld {
    /// World with a fixed ground box at the origin and standard downward gravity.
    pub fn new(ground_half_extents: Vector3<f32>, gravity: f32) -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        let ground = bodies.insert(RigidBodyBuilder::fixed().build());
        let collider = ColliderBuilder::cuboid(
            ground_half_extents.x,
            ground_half_extents.y,
            ground_half_extents.z,
        )
        .build();
        colliders.insert_with_parent(collider, ground, &mut bodies);

        Self {
            gravity: Vector3::new(0.0, -gravity, 0.0),
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            ground,
        }
    }

    pub fn gravity(&self) -> Vector3<f32> {
        self.gravity
    }

    /// Replace global gravity.
    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.gravity = gravity;
        // Resting bodies would otherwise ignore the new direction.
        for (_, body) in self.bodies.iter_mut() {
            if body.is_dynamic() {
                body.wake_up(true);
            }
        }
    }

    /// Overwrite the ground body's pose.
    pub fn set_ground_pose(&mut self, translation: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        if let Some(body) = self.bodies.get_mut(self.ground) {
            body.set_translation(translation, true);
            body.set_rotation(rotation, true);
        }
    }

    pub fn ground_translation(&self) -> Vector3<f32> {
        self.bodies
            .get(self.ground)
            .map(|body| *body.translation())
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn ground_rotation(&self) -> UnitQuaternion<f32> {
        self.bodies
            .get(self.ground)
            .map(|body| *body.rotation())
            .unwrap_or_else(UnitQuaternion::identity)
    }

    /// Add a dynamic box centered at `center`.
    pub fn spawn_box(
        &mut self,
        center: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        half_extent: f32,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic().translation(center).build();
        let handle = self.bodies.insert(body);
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_rotation(rotation, false);
        }
        let collider = ColliderBuilder::cuboid(half_extent, half_extent, half_extent)
            .restitution(0.1)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Pose of a body, if it still exists.
    pub fn body_pose(
        &self,
        handle: RigidBodyHandle,
    ) -> Option<(Vector3<f32>, UnitQuaternion<f32>)> {
        self.bodies
            .get(handle)
            .map(|body| (*body.translation(), *body.rotation()))
    }

    /// Number of dynamic bodies in the world.
    pub fn dynamic_body_count(&self) -> usize {
        self.bodies.iter().filter(|(_, b)| b.is_dynamic()).count()
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        self.integration_parameters.dt = dt.min(MAX_STEP_SECS);
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(Vector3::new(0.5, 0.025, 0.5), 9.81)
    }

    #[test]
    fn starts_with_downward_gravity() {
        let g = world().gravity();
        assert_eq!((g.x, g.y, g.z), (0.0, -9.81, 0.0));
    }

    #[test]
    fn set_gravity_replaces_previous_value() {
        let mut world = world();
        world.set_gravity(Vector3::new(1.0, -9.0, 0.5));
        world.set_gravity(Vector3::new(0.0, 0.0, -9.81));
        assert_eq!(world.gravity(), Vector3::new(0.0, 0.0, -9.81));
    }

    #[test]
    fn ground_pose_is_overwritten() {
        let mut world = world();
        let rotation = UnitQuaternion::from_euler_angles(0.2, 0.0, 0.1);
        world.set_ground_pose(Vector3::new(0.1, -0.4, -1.2), rotation);
        world.set_ground_pose(Vector3::new(0.0, -0.5, -1.0), rotation);

        assert!((world.ground_translation() - Vector3::new(0.0, -0.5, -1.0)).norm() < 1e-6);
        assert!(world.ground_rotation().angle_to(&rotation) < 1e-5);
    }

    #[test]
    fn dropped_box_comes_to_rest_on_ground() {
        let mut world = world();
        let handle = world.spawn_box(Vector3::new(0.0, 0.5, 0.0), UnitQuaternion::identity(), 0.05);
        assert_eq!(world.dynamic_body_count(), 1);

        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }

        let (translation, _) = world.body_pose(handle).unwrap();
        // Ground top is at 0.025, box half extent 0.05.
        assert!(translation.y > 0.0 && translation.y < 0.2, "y = {}", translation.y);
        assert!(translation.x.abs() < 0.05 && translation.z.abs() < 0.05);
    }

    #[test]
    fn non_positive_step_is_ignored() {
        let mut world = world();
        let handle = world.spawn_box(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity(), 0.05);
        world.step(0.0);
        world.step(-1.0);
        world.step(f32::NAN);
        let (translation, _) = world.body_pose(handle).unwrap();
        assert_eq!(translation.y, 1.0);
    }
}
