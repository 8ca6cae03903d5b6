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

//! Contains the value types exchanged with the hardware decoder.

use serde::{Deserialize, Serialize};

/// Identifies a decoder input buffer slot that is free to receive a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferToken(pub usize);

impl BufferToken {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A decoded frame waiting in a decoder output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// The output buffer slot holding the frame.
    pub index: usize,
    /// The container timestamp of the frame, in microseconds.
    pub presentation_timestamp_us: i64,
}

impl BufferDescriptor {
    pub fn new(index: usize, presentation_timestamp_us: i64) -> Self {
        Self {
            index,
            presentation_timestamp_us,
        }
    }
}

/// Flags attached to a queued input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFlags {
    pub end_of_stream: bool,
}

impl InputFlags {
    pub const NONE: InputFlags = InputFlags {
        end_of_stream: false,
    };
    pub const END_OF_STREAM: InputFlags = InputFlags {
        end_of_stream: true,
    };
}

/// What to do with a decoder output slot when handing it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRelease {
    /// Present the frame on the decoder's output surface at the given monotonic time.
    Render { timestamp_ns: i64 },
    /// Return the slot without presenting anything.
    Discard,
}

/// Static facts about an opened motion photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPhotoInfo {
    pub width: u32,
    pub height: u32,
    pub duration_us: i64,
    pub rotation_degrees: i32,
    /// The container carries a stabilization track.
    pub has_motion_track: bool,
    /// The video was stabilized at capture time.
    pub pre_stabilized: bool,
}
