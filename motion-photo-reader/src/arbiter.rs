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

//! Bounded channels between the decoder's callback thread and the pipeline worker.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use web_time::Duration;

use crate::frame::{BufferDescriptor, BufferToken};

/// Producer side, handed to the decoder. Offers never block the calling thread.
#[derive(Debug, Clone)]
pub struct DecoderEvents {
    input_tokens: Sender<BufferToken>,
    output_frames: Sender<BufferDescriptor>,
    errors: Sender<String>,
}

impl DecoderEvents {
    /// An input slot is free to receive a sample.
    pub fn on_input_ready(&self, token: BufferToken) {
        offer(&self.input_tokens, token, "input token");
    }

    /// A decoded frame is waiting in an output slot.
    pub fn on_output_ready(&self, descriptor: BufferDescriptor) {
        offer(&self.output_frames, descriptor, "output descriptor");
    }

    /// The decoder hit an unrecoverable error. Only the first report is kept.
    pub fn on_error(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("Decoder reported error: {message}");
        let _ = self.errors.try_send(message);
    }
}

fn offer<T: std::fmt::Debug>(sender: &Sender<T>, value: T, what: &str) {
    match sender.try_send(value) {
        Ok(()) => {}
        Err(TrySendError::Full(value)) => {
            log::error!("Dropping {what} {value:?}: channel full");
        }
        Err(TrySendError::Disconnected(value)) => {
            log::debug!("Dropping {what} {value:?}: pipeline gone");
        }
    }
}

/// Consumer side, owned by the pipeline worker.
#[derive(Debug)]
pub struct BufferArbiter {
    input_tokens: Receiver<BufferToken>,
    output_frames: Receiver<BufferDescriptor>,
    errors: Receiver<String>,
}

impl BufferArbiter {
    /// Creates the channel pair; each buffer channel holds at most `capacity` entries.
    pub fn channel(capacity: usize) -> (DecoderEvents, BufferArbiter) {
        let (input_tx, input_rx) = crossbeam_channel::bounded(capacity);
        let (output_tx, output_rx) = crossbeam_channel::bounded(capacity);
        let (error_tx, error_rx) = crossbeam_channel::bounded(1);
        (
            DecoderEvents {
                input_tokens: input_tx,
                output_frames: output_tx,
                errors: error_tx,
            },
            BufferArbiter {
                input_tokens: input_rx,
                output_frames: output_rx,
                errors: error_rx,
            },
        )
    }

    /// Takes one free input slot, or `None` if the decoder offers none within `timeout`.
    pub fn poll_input(&self, timeout: Duration) -> Option<BufferToken> {
        self.input_tokens.recv_timeout(timeout).ok()
    }

    /// Takes one decoded frame, or `None` if none arrives within `timeout`.
    pub fn poll_output(&self, timeout: Duration) -> Option<BufferDescriptor> {
        self.output_frames.recv_timeout(timeout).ok()
    }

    pub fn take_error(&self) -> Option<String> {
        self.errors.try_recv().ok()
    }

    pub fn pending_inputs(&self) -> usize {
        self.input_tokens.len()
    }

    pub fn pending_outputs(&self) -> usize {
        self.output_frames.len()
    }
}
