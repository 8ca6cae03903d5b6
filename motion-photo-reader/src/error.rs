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

use thiserror::Error;
use web_time::Duration;

/// Result type for motion photo playback operations
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors that can occur while opening or playing back a motion photo.
///
/// Steady-state resource exhaustion (no decoder buffer within the poll timeout) is
/// not an error: it surfaces as [`crate::pipeline::CommandOutcome::Aborted`].
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid motion photo metadata: {0}")]
    Metadata(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transform requires exactly 9 entries, got {len}")]
    InvalidTransform { len: usize },

    #[error("Malformed motion data: {0}")]
    MalformedMotionData(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Render surface did not deliver a frame within {0:?}")]
    RenderTimeout(Duration),

    #[error("Render surface signalled a second frame before the first was consumed")]
    FrameOverrun,

    #[error("Render surface error: {0}")]
    Surface(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Session worker terminated after a fatal error")]
    SessionTerminated,

    #[error("Worker did not answer within {0:?}")]
    ReplyTimeout(Duration),
}

impl PlayerError {
    /// Fatal errors terminate the session; everything else is reported to the caller
    /// and playback may continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlayerError::Decoder(_)
                | PlayerError::RenderTimeout(_)
                | PlayerError::FrameOverrun
                | PlayerError::Surface(_)
                | PlayerError::SessionTerminated
        )
    }
}
