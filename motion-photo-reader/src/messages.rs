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

//! Messages posted to a session's worker thread

use crossbeam_channel::Sender;

use crate::pipeline::{CommandOutcome, FrameCommand};
use crate::Result;

pub(crate) enum WorkerMessage {
    /// Run a frame command and report how it ended
    Execute {
        command: FrameCommand,
        reply: Sender<Result<CommandOutcome>>,
    },
    /// Report whether the demuxer still has a sample, without consuming it
    HasNextFrame { reply: Sender<bool> },
    /// Release everything and exit the worker loop
    Shutdown,
}
