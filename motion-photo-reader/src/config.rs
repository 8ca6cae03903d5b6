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

//! Per-session tunables for the frame pipeline.

use web_time::Duration;

use crate::{PlayerError, Result};

/// Number of horizontal strips stabilized independently.
pub const DEFAULT_STRIP_COUNT: usize = 12;

/// Nominal frame rate used when consecutive presentation timestamps do not advance.
pub const NOMINAL_FRAME_RATE: u64 = 30;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of strips in every `StripTransformSet`
    pub strip_count: usize,
    /// How long the pipeline waits for a decoder input token or output descriptor
    /// before aborting the current command
    pub buffer_timeout: Duration,
    /// How long the pipeline waits for the compositor to signal a new image
    pub render_timeout: Duration,
    /// Frame interval substituted when presentation timestamps do not move forward
    pub fallback_frame_interval: Duration,
    /// Bounded wait for `has_next_frame` answers
    pub query_timeout: Duration,
    /// Bounded wait for `next_frame` / `seek_to` completion
    pub reply_timeout: Duration,
    /// Capacity of each decoder buffer channel
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strip_count: DEFAULT_STRIP_COUNT,
            buffer_timeout: Duration::from_micros(1000),
            render_timeout: Duration::from_millis(2500),
            fallback_frame_interval: Duration::from_nanos(1_000_000_000 / NOMINAL_FRAME_RATE),
            query_timeout: Duration::from_millis(500),
            reply_timeout: Duration::from_secs(5),
            channel_capacity: 32,
        }
    }
}

impl SessionConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.strip_count == 0 {
            return Err(PlayerError::InvalidConfig(
                "strip_count must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PlayerError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        let timeouts = [
            ("buffer_timeout", self.buffer_timeout),
            ("render_timeout", self.render_timeout),
            ("fallback_frame_interval", self.fallback_frame_interval),
            ("query_timeout", self.query_timeout),
            ("reply_timeout", self.reply_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(PlayerError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        // The caller must outlive every bounded wait the worker can make for one command.
        let worst_case = self.buffer_timeout * 2 + self.render_timeout;
        if self.reply_timeout < worst_case {
            return Err(PlayerError::InvalidConfig(format!(
                "reply_timeout {:?} is shorter than a single command's worst case {worst_case:?}",
                self.reply_timeout
            )));
        }
        Ok(())
    }

    /// Fallback interval in nanoseconds, as used by the frame pacer.
    pub fn fallback_frame_interval_ns(&self) -> i64 {
        self.fallback_frame_interval.as_nanos() as i64
    }
}
