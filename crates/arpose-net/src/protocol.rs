//! Wire format for the vision server link.
//!
//! Every message is `[kind: u8][len: u32 LE][payload]`. Requests carry no
//! payload. Responses carry one of the fixed layouts below, or nothing when the
//! server has no new data for that kind.
//!
//! Camera: `height u32 | width u32 | height*width*3 RGB bytes | pos 3xf32 | rot 4xf32 (w, x, y, z)`
//! Plane:  `equation 4xf32 | anchor 3xf32`
//!
//! All scalars are little-endian.

use crate::types::{BackgroundFrame, CameraReading, MessageKind, PlaneReading};
use glam::{Quat, Vec3, Vec4};
use std::collections::VecDeque;
use thiserror::Error;

/// Bytes in a frame header (kind + length).
pub const HEADER_LEN: usize = 5;
/// Largest payload accepted before the stream is considered corrupt.
pub const MAX_PAYLOAD_LEN: usize = 64 << 20;

const DIMS_LEN: usize = 8;
/// Position (3 floats) and rotation (4 floats) after the image.
const POSE_LEN: usize = 7 * 4;
const PLANE_LEN: usize = 7 * 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown message kind {0:#04x}")]
    UnknownKind(u8),
    #[error("Payload of {len} bytes exceeds the 64 MiB limit")]
    Oversized { len: usize },
    #[error("{kind:?} payload too short: got {len} bytes, need {need}")]
    PayloadTooShort {
        kind: MessageKind,
        len: usize,
        need: usize,
    },
    #[error("Camera image {width}x{height} does not fit in memory")]
    ImageTooLarge { width: u32, height: u32 },
}

/// One complete message off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

/// Streaming frame parser.
///
/// Feed raw socket bytes via `push_data`, then drain frames via `next_frame`.
pub struct FrameParser {
    buffer: VecDeque<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(64 * 1024),
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Try to extract the next complete frame.
    ///
    /// Returns `None` until a whole frame is buffered. A header error drops
    /// everything buffered, since the stream can no longer be resynchronized.
    pub fn next_frame(&mut self) -> Option<Result<Frame, ProtocolError>> {
        if self.buffer.len() < HEADER_LEN {
            return None;
        }

        let header: Vec<u8> = self.buffer.iter().take(HEADER_LEN).copied().collect();
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;

        let Some(kind) = MessageKind::from_id(header[0]) else {
            self.buffer.clear();
            return Some(Err(ProtocolError::UnknownKind(header[0])));
        };
        if len > MAX_PAYLOAD_LEN {
            self.buffer.clear();
            return Some(Err(ProtocolError::Oversized { len }));
        }
        if self.buffer.len() < HEADER_LEN + len {
            return None;
        }

        self.buffer.drain(..HEADER_LEN);
        let payload: Vec<u8> = self.buffer.drain(..len).collect();
        Some(Ok(Frame { kind, payload }))
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a complete frame.
pub fn encode_frame(kind: MessageKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(kind.id());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encode a zero-payload request.
pub fn encode_request(kind: MessageKind) -> Vec<u8> {
    encode_frame(kind, &[])
}

/// Encode a camera response payload.
pub fn encode_camera(reading: &CameraReading) -> Vec<u8> {
    let frame = &reading.frame;
    let mut out = Vec::with_capacity(DIMS_LEN + frame.data.len() + POSE_LEN);
    out.extend_from_slice(&frame.height.to_le_bytes());
    out.extend_from_slice(&frame.width.to_le_bytes());
    out.extend_from_slice(&frame.data);
    let p = reading.position;
    let q = reading.rotation;
    for v in [p.x, p.y, p.z, q.w, q.x, q.y, q.z] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Encode a plane response payload.
pub fn encode_plane(reading: &PlaneReading) -> Vec<u8> {
    let mut out = Vec::with_capacity(PLANE_LEN);
    let e = reading.equation;
    let a = reading.anchor;
    for v in [e.x, e.y, e.z, e.w, a.x, a.y, a.z] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a camera response payload.
///
/// The image bytes are copied out, so the result does not borrow `payload`.
pub fn decode_camera(payload: &[u8]) -> Result<CameraReading, ProtocolError> {
    let too_short = |need| ProtocolError::PayloadTooShort {
        kind: MessageKind::Camera,
        len: payload.len(),
        need,
    };

    if payload.len() < DIMS_LEN {
        return Err(too_short(DIMS_LEN + POSE_LEN));
    }
    let height = u32_at(payload, 0);
    let width = u32_at(payload, 4);

    let image_len = (height as usize)
        .checked_mul(width as usize)
        .and_then(|n| n.checked_mul(3))
        .filter(|&n| n <= MAX_PAYLOAD_LEN)
        .ok_or(ProtocolError::ImageTooLarge { width, height })?;

    let need = DIMS_LEN + image_len + POSE_LEN;
    if payload.len() < need {
        return Err(too_short(need));
    }

    let image_end = DIMS_LEN + image_len;
    let data = payload[DIMS_LEN..image_end].to_vec();
    let f = |i: usize| f32_at(payload, image_end + i * 4);

    Ok(CameraReading {
        frame: BackgroundFrame {
            data,
            width,
            height,
        },
        position: Vec3::new(f(0), f(1), f(2)),
        // Wire order is w, x, y, z.
        rotation: Quat::from_xyzw(f(4), f(5), f(6), f(3)),
    })
}

/// Decode a plane response payload.
pub fn decode_plane(payload: &[u8]) -> Result<PlaneReading, ProtocolError> {
    if payload.len() < PLANE_LEN {
        return Err(ProtocolError::PayloadTooShort {
            kind: MessageKind::Plane,
            len: payload.len(),
            need: PLANE_LEN,
        });
    }

    let f = |i: usize| f32_at(payload, i * 4);
    Ok(PlaneReading {
        equation: Vec4::new(f(0), f(1), f(2), f(3)),
        anchor: Vec3::new(f(4), f(5), f(6)),
    })
}

// Callers check lengths before reading.
fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let b = &bytes[offset..offset + 4];
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn f32_at(bytes: &[u8], offset: usize) -> f32 {
    let b = &bytes[offset..offset + 4];
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_camera(width: u32, height: u32) -> CameraReading {
        let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        CameraReading {
            frame: BackgroundFrame {
                data,
                width,
                height,
            },
            position: Vec3::new(0.05, 0.09, 1.28),
            rotation: Quat::from_xyzw(0.740481, 0.193315, -0.595241, -0.244961),
        }
    }

    #[test]
    fn camera_payload_decodes_to_sent_values() {
        let sent = make_camera(4, 3);
        let payload = encode_camera(&sent);
        assert_eq!(payload.len(), 8 + 4 * 3 * 3 + 28);

        let got = decode_camera(&payload).unwrap();
        assert_eq!(got.frame, sent.frame);
        assert!((got.position - sent.position).length() < 1e-6);
        assert!((got.rotation.w - -0.244961).abs() < 1e-6);
        assert!((got.rotation.x - 0.740481).abs() < 1e-6);
        assert!((got.rotation.y - 0.193315).abs() < 1e-6);
        assert!((got.rotation.z - -0.595241).abs() < 1e-6);
    }

    #[test]
    fn rotation_is_read_in_wxyz_order() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        for v in [0.0f32, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }

        let got = decode_camera(&payload).unwrap();
        assert_eq!(got.rotation.w, 1.0);
        assert_eq!(got.rotation.x, 2.0);
        assert_eq!(got.rotation.y, 3.0);
        assert_eq!(got.rotation.z, 4.0);
        assert!(got.frame.data.is_empty());
    }

    #[test]
    fn truncated_camera_payload_is_rejected() {
        let payload = encode_camera(&make_camera(2, 2));
        let err = decode_camera(&payload[..payload.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadTooShort {
                kind: MessageKind::Camera,
                len: payload.len() - 1,
                need: payload.len(),
            }
        );
        assert!(decode_camera(&[1, 2, 3]).is_err());
    }

    #[test]
    fn absurd_image_dimensions_are_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        payload.extend_from_slice(&[0u8; 28]);
        assert!(matches!(
            decode_camera(&payload),
            Err(ProtocolError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn plane_payload_decodes_to_sent_values() {
        let sent = PlaneReading {
            equation: Vec4::new(0.1, -0.98, 0.2, 1.5),
            anchor: Vec3::new(0.05, 0.09, 1.28),
        };
        let got = decode_plane(&encode_plane(&sent)).unwrap();
        assert!((got.equation - sent.equation).length() < 1e-6);
        assert!((got.anchor - sent.anchor).length() < 1e-6);
        assert!((got.normal() - Vec3::new(0.1, -0.98, 0.2)).length() < 1e-6);
    }

    #[test]
    fn truncated_plane_payload_is_rejected() {
        let payload = encode_plane(&PlaneReading {
            equation: Vec4::Y,
            anchor: Vec3::ZERO,
        });
        assert!(decode_plane(&payload[..27]).is_err());
    }

    #[test]
    fn parse_fragmented_frame() {
        let payload = encode_plane(&PlaneReading {
            equation: Vec4::new(0.0, 1.0, 0.0, 0.0),
            anchor: Vec3::ONE,
        });
        let bytes = encode_frame(MessageKind::Plane, &payload);
        let mut parser = FrameParser::new();

        // Header alone is not enough.
        parser.push_data(&bytes[..3]);
        assert!(parser.next_frame().is_none());
        parser.push_data(&bytes[3..10]);
        assert!(parser.next_frame().is_none());

        parser.push_data(&bytes[10..]);
        let frame = parser.next_frame().unwrap().unwrap();
        assert_eq!(frame.kind, MessageKind::Plane);
        assert_eq!(frame.payload, payload);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn parse_coalesced_frames() {
        let mut bytes = encode_frame(MessageKind::Camera, &[]);
        bytes.extend(encode_frame(MessageKind::Plane, &[7; 28]));

        let mut parser = FrameParser::new();
        parser.push_data(&bytes);

        let first = parser.next_frame().unwrap().unwrap();
        assert_eq!(first.kind, MessageKind::Camera);
        assert!(first.payload.is_empty());

        let second = parser.next_frame().unwrap().unwrap();
        assert_eq!(second.kind, MessageKind::Plane);
        assert_eq!(second.payload.len(), 28);

        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn unknown_kind_resets_the_stream() {
        let mut parser = FrameParser::new();
        parser.push_data(&[9, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(
            parser.next_frame(),
            Some(Err(ProtocolError::UnknownKind(9)))
        );
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn oversized_length_resets_the_stream() {
        let mut parser = FrameParser::new();
        parser.push_data(&[1, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(
            parser.next_frame(),
            Some(Err(ProtocolError::Oversized { .. }))
        ));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn request_is_header_only() {
        assert_eq!(encode_request(MessageKind::Plane), vec![2, 0, 0, 0, 0]);
    }
}
