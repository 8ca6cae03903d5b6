/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Decoding of stabilization-track samples.
//!
//! Each sample carries one incremental homography per strip:
//!
//! ```text
//! +--------+----------------+------------------------------------+
//! | type:1 | strip_count:2  | strip_count * 9 * f32 (row-major)  |
//! +--------+----------------+------------------------------------+
//! ```
//!
//! All multi-byte values are little-endian.

use serde::{Deserialize, Serialize};

use crate::transform::{StripTransformSet, Transform};
use crate::{PlayerError, Result};

/// MIME type of the stabilization metadata track.
pub const MOTION_TRACK_MIME: &str = "application/microvideo-meta-stream";

const HEADER_LEN: usize = 3;
const TRANSFORM_LEN: usize = 9 * 4;

/// How the homographies in a sample relate to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionDataType {
    /// Camera motion between the previous frame and this one.
    Interframe,
    /// The frame was stabilized at capture time; nothing to compose.
    AlreadyStabilized,
}

impl MotionDataType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MotionDataType::Interframe),
            1 => Some(MotionDataType::AlreadyStabilized),
            _ => None,
        }
    }

    fn tag(self) -> u8 {
        match self {
            MotionDataType::Interframe => 0,
            MotionDataType::AlreadyStabilized => 1,
        }
    }
}

/// One decoded stabilization sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionData {
    pub data_type: MotionDataType,
    pub increments: StripTransformSet,
}

impl MotionData {
    pub fn interframe(increments: StripTransformSet) -> Self {
        Self {
            data_type: MotionDataType::Interframe,
            increments,
        }
    }

    pub fn already_stabilized(strip_count: usize) -> Self {
        Self {
            data_type: MotionDataType::AlreadyStabilized,
            increments: StripTransformSet::identity(strip_count),
        }
    }

    /// Parses a sample, requiring exactly `expected_strips` homographies.
    pub fn decode(bytes: &[u8], expected_strips: usize) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(PlayerError::MalformedMotionData(format!(
                "sample of {} bytes is shorter than the header",
                bytes.len()
            )));
        }
        let data_type = MotionDataType::from_tag(bytes[0]).ok_or_else(|| {
            PlayerError::MalformedMotionData(format!("unknown motion data type {}", bytes[0]))
        })?;
        let strip_count = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        if strip_count != expected_strips {
            return Err(PlayerError::MalformedMotionData(format!(
                "expected {expected_strips} strips, sample declares {strip_count}"
            )));
        }
        let body = &bytes[HEADER_LEN..];
        if body.len() != strip_count * TRANSFORM_LEN {
            return Err(PlayerError::MalformedMotionData(format!(
                "{strip_count} strips need {} bytes, sample has {}",
                strip_count * TRANSFORM_LEN,
                body.len()
            )));
        }

        let mut strips = Vec::with_capacity(strip_count);
        for chunk in body.chunks_exact(TRANSFORM_LEN) {
            let entries: Vec<f32> = chunk
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            if entries.iter().any(|v| !v.is_finite()) {
                return Err(PlayerError::MalformedMotionData(
                    "non-finite homography entry".to_string(),
                ));
            }
            strips.push(Transform::try_from(entries)?);
        }

        Ok(Self {
            data_type,
            increments: StripTransformSet::from_transforms(strips),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.increments.len() * TRANSFORM_LEN);
        out.push(self.data_type.tag());
        out.extend_from_slice(&(self.increments.len() as u16).to_le_bytes());
        for transform in self.increments.iter() {
            for value in transform.entries() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }
}
