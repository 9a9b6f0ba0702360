//! Scene side of the AR client: coordinate conventions, plane alignment,
//! the render camera and the physics world the virtual objects live in.

pub mod align;
pub mod camera;
pub mod physics;
pub mod scene;
pub mod space;

pub use align::{align_plane, AlignError, PlaneAlignment};
pub use camera::Camera;
pub use physics::PhysicsWorld;
pub use scene::{DebugScene, GroundPlane, PoseError, Prop, SceneHooks, Stage};
