use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Connection to the vision server.
    pub net: NetConfig,
    /// Update loop timing.
    pub update: UpdateConfig,
    /// Device camera intrinsics and clip planes.
    pub camera: CameraConfig,
    /// Plane alignment behaviour.
    pub align: AlignConfig,
    /// Virtual scene contents.
    pub scene: SceneConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            net: NetConfig::default(),
            update: UpdateConfig::default(),
            camera: CameraConfig::default(),
            align: AlignConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Vision server host name or address.
    pub host: String,
    /// Vision server port.
    pub port: u16,
    /// Delay between connection attempts while the server is not up yet.
    pub retry_interval_ms: u64,
    /// Give up connecting after this many seconds. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9999,
            retry_interval_ms: 500,
            connect_timeout_secs: None,
        }
    }
}

impl NetConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Fixed tick interval in milliseconds.
    pub interval_ms: u64,
    /// Emit a debug heartbeat every this many ticks.
    pub heartbeat_ticks: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            interval_ms: 64,
            heartbeat_ticks: 150,
        }
    }
}

/// Pinhole intrinsics of the device camera feeding the vision server.
///
/// Defaults are the TUM RGB-D freiburg1 calibration at 960x720.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub focal_x: f32,
    pub focal_y: f32,
    pub image_width: u32,
    pub image_height: u32,
    /// Near clipping plane (meters).
    pub near: f32,
    /// Far clipping plane (meters).
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            focal_x: 517.306_4,
            focal_y: 516.469_2,
            image_width: 960,
            image_height: 720,
            near: 0.001,
            far: 2000.0,
        }
    }
}

impl CameraConfig {
    /// Aspect ratio corrected for non-square pixels.
    pub fn aspect(&self) -> f32 {
        (self.image_width as f32 * self.focal_y) / (self.image_height as f32 * self.focal_x)
    }

    /// Vertical field of view in radians.
    pub fn fov_y(&self) -> f32 {
        (self.image_height as f32 / (2.0 * self.focal_y)).atan() * 2.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Keep re-aligning the ground plane on every detection. When false the
    /// plane freezes after the first alignment.
    pub continuous: bool,
    /// Gravity magnitude (m/s^2).
    pub gravity: f32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            gravity: 9.81,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Full extents of the ground plane box (meters).
    #[serde(with = "vec3_serde")]
    pub ground_size: Vec3,
    /// Number of boxes dropped onto the plane when the scene starts.
    pub drop_count: u32,
    /// Height above the plane anchor the boxes start from (meters).
    pub drop_height: f32,
    /// Edge length of each dropped box (meters).
    pub drop_box_size: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            ground_size: Vec3::new(1.0, 0.05, 1.0),
            drop_count: 3,
            drop_height: 0.5,
            drop_box_size: 0.1,
        }
    }
}

// glam's own serde impls are fine, but TOML reads better with plain arrays.

mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(d)?;
        Ok(Vec3::new(x, y, z))
    }
}
