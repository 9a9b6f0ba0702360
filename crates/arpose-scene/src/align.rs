//! Orient the virtual ground plane and gravity to a detected real-world plane.

use crate::space::{render_to_physics_vec, VisionVec3};
use arpose_net::PlaneReading;
use glam::{Mat3, Quat, Vec3};
use nalgebra::Vector3;
use thiserror::Error;

/// Cross products shorter than this mean the normal is parallel to the reference axis.
pub const DEGENERATE_EPS: f32 = 1e-4;

/// Primary reference axis for building the plane basis.
const REFERENCE_AXIS: Vec3 = Vec3::NEG_X;
/// Used when the normal lies along `REFERENCE_AXIS`.
const FALLBACK_AXIS: Vec3 = Vec3::NEG_Z;

#[derive(Debug, Error, PartialEq)]
pub enum AlignError {
    #[error("Plane reading contains non-finite values")]
    NonFinite,
    #[error("Plane normal has zero length")]
    ZeroNormal,
}

/// Result of aligning to one plane reading. Render space unless noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneAlignment {
    /// Unit normal, pointing up.
    pub normal: Vec3,
    /// Columns are (x, normal, z).
    pub basis: Mat3,
    /// Ground plane orientation.
    pub rotation: Quat,
    /// Ground plane position (the plane anchor).
    pub position: Vec3,
    /// Global gravity, physics space.
    pub gravity: Vector3<f32>,
    /// The basis was built from `FALLBACK_AXIS`.
    pub used_fallback: bool,
}

/// Normalize `normal` and flip it so it points up.
pub fn canonical_normal(normal: Vec3) -> Result<Vec3, AlignError> {
    if !normal.is_finite() {
        return Err(AlignError::NonFinite);
    }
    let n = normal.try_normalize().ok_or(AlignError::ZeroNormal)?;
    Ok(if n.y < 0.0 { -n } else { n })
}

/// Build a right-handed orthonormal basis whose Y column is `normal`.
///
/// `normal` must be unit length. Returns the basis and whether the fallback
/// reference axis had to be used.
pub fn plane_basis(normal: Vec3) -> (Mat3, bool) {
    let (z, used_fallback) = match REFERENCE_AXIS.cross(normal).try_normalize() {
        Some(z) if REFERENCE_AXIS.cross(normal).length() >= DEGENERATE_EPS => (z, false),
        _ => (FALLBACK_AXIS.cross(normal).normalize(), true),
    };
    let x = normal.cross(z);
    (Mat3::from_cols(x, normal, z), used_fallback)
}

/// Gravity for a canonical plane normal, in physics space.
///
/// Points against the normal while the plane faces up; a vertical plane
/// (zero up-component) flips it.
pub fn gravity_for(normal: Vec3, magnitude: f32) -> Vector3<f32> {
    let signed = if normal.y > 0.0 { -magnitude } else { magnitude };
    render_to_physics_vec(normal * signed)
}

/// Compute the ground plane pose and gravity for a plane reading.
pub fn align_plane(reading: &PlaneReading, gravity: f32) -> Result<PlaneAlignment, AlignError> {
    if !reading.anchor.is_finite() {
        return Err(AlignError::NonFinite);
    }

    let normal = canonical_normal(VisionVec3(reading.normal()).to_render())?;
    let (basis, used_fallback) = plane_basis(normal);

    Ok(PlaneAlignment {
        normal,
        basis,
        rotation: Quat::from_mat3(&basis).normalize(),
        position: VisionVec3(reading.anchor).to_render(),
        gravity: gravity_for(normal, gravity),
        used_fallback,
    })
}
