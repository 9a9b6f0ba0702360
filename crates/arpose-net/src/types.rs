use glam::{Quat, Vec3, Vec4};

/// Request/response kinds understood by the vision server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Camera = 1,
    Plane = 2,
}

impl MessageKind {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Camera),
            2 => Some(Self::Plane),
            _ => None,
        }
    }
}

/// RGB8 image the vision server tracked against; drawn behind the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundFrame {
    /// Row-major RGB8 pixels, `width * height * 3` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Camera pose in vision-server space, plus the frame it was tracked on.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraReading {
    pub frame: BackgroundFrame,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Detected ground plane in vision-server space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneReading {
    /// Homogeneous plane `(nx, ny, nz, d)` with `n . p + d = 0`.
    pub equation: Vec4,
    /// Reference point on the plane.
    pub anchor: Vec3,
}

impl PlaneReading {
    /// Unnormalized plane normal.
    pub fn normal(&self) -> Vec3 {
        self.equation.truncate()
    }
}

/// Connection status of the link to the vision server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No connection requested yet.
    Idle,
    /// Waiting for the server to accept.
    Connecting,
    Connected,
    /// Peer went away; a reconnect is in progress.
    Disconnected,
    /// Gave up connecting. Not recoverable.
    Failed(String),
}
