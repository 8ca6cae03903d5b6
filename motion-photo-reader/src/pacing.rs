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

//! Wall-clock scheduling of frame presentation.

use web_time::Instant;

/// Source of monotonic time in nanoseconds.
pub trait MonotonicClock: Send {
    fn now_ns(&self) -> i64;
}

/// Monotonic clock measured from its own creation.
///
/// Readings start at one nanosecond so that zero keeps meaning "nothing rendered yet".
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MonotonicClock for SystemClock {
    fn now_ns(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64 + 1
    }
}

/// Computes render timestamps from presentation timestamps.
///
/// Under normal conditions frames are spaced by their presentation deltas. When the
/// pipeline falls behind the wall clock the schedule is rebased on "now" rather than
/// bursting frames to catch up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    previous_presentation_us: i64,
    previous_render_ns: i64,
    fallback_interval_ns: i64,
}

impl FramePacer {
    pub fn new(fallback_interval_ns: i64) -> Self {
        Self {
            previous_presentation_us: 0,
            previous_render_ns: 0,
            fallback_interval_ns,
        }
    }

    pub fn previous_presentation_us(&self) -> i64 {
        self.previous_presentation_us
    }

    pub fn previous_render_ns(&self) -> i64 {
        self.previous_render_ns
    }

    /// Render time for a frame with `presentation_us`, without committing it.
    pub fn schedule(&self, presentation_us: i64, now_ns: i64) -> i64 {
        let mut delta_ns = (presentation_us - self.previous_presentation_us) * 1000;
        if delta_ns <= 0 {
            delta_ns = self.fallback_interval_ns;
        }

        let target = if self.previous_render_ns == 0 {
            now_ns + delta_ns
        } else {
            self.previous_render_ns + delta_ns
        };

        if target < now_ns {
            log::debug!(
                "Render schedule fell {}us behind, rebasing",
                (now_ns - target) / 1000
            );
            now_ns + delta_ns
        } else {
            target
        }
    }

    /// Records a rendered frame so the next one is scheduled relative to it.
    pub fn commit(&mut self, presentation_us: i64, render_ns: i64) {
        self.previous_presentation_us = presentation_us;
        self.previous_render_ns = render_ns;
    }

    /// Moves the presentation baseline without advancing the render clock.
    pub fn rebaseline(&mut self, presentation_us: i64) {
        self.previous_presentation_us = presentation_us;
    }
}
