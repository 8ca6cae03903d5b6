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

//! A decoder that behaves like an asynchronous hardware codec without decoding
//! anything. It runs its own callback thread, owns a fixed pool of input and output
//! slots, and can inject faults for exercising the pipeline's failure paths.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{self, Sender};

use super::HardwareDecoder;
use crate::arbiter::DecoderEvents;
use crate::frame::{BufferDescriptor, BufferToken, InputFlags, OutputRelease};
use crate::render_sync::FrameAvailableListener;
use crate::{PlayerError, Result};

/// Misbehaviour the simulated decoder can be told to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderFault {
    #[default]
    None,
    /// Report an error instead of decoding the n-th sample (0-based).
    ErrorAt(usize),
    /// Produce no output for the n-th sample (0-based) and every later one.
    SwallowOutputsFrom(usize),
    /// Offer at most n input slots over the decoder's lifetime.
    InputLimit(usize),
    /// Render frames without signalling the surface.
    SilentRender,
}

#[derive(Debug, Clone)]
pub struct SimulatedDecoderConfig {
    pub input_slots: usize,
    pub output_slots: usize,
    pub fault: DecoderFault,
}

impl Default for SimulatedDecoderConfig {
    fn default() -> Self {
        Self {
            input_slots: 4,
            output_slots: 4,
            fault: DecoderFault::None,
        }
    }
}

/// A message sent to the decoder's callback thread.
enum DecoderMessage {
    Input {
        token: BufferToken,
        timestamp_us: i64,
        flags: InputFlags,
    },
    ReleaseOutput {
        index: usize,
        release: OutputRelease,
    },
    Shutdown,
}

/// State confined to the callback thread.
struct CallbackLoop {
    config: SimulatedDecoderConfig,
    events: DecoderEvents,
    frames: FrameAvailableListener,
    free_outputs: VecDeque<usize>,
    /// Samples waiting for an output slot.
    waiting: VecDeque<i64>,
    samples_seen: usize,
    frames_rendered: usize,
    inputs_offered: usize,
}

impl CallbackLoop {
    fn start(&mut self) {
        for slot in 0..self.config.input_slots {
            self.offer_input(BufferToken(slot));
        }
    }

    fn offer_input(&mut self, token: BufferToken) {
        if let DecoderFault::InputLimit(limit) = self.config.fault {
            if self.inputs_offered >= limit {
                log::trace!("[SIM_DECODER] Withholding input slot {}", token.index());
                return;
            }
        }
        self.inputs_offered += 1;
        self.events.on_input_ready(token);
    }

    fn on_input(&mut self, token: BufferToken, timestamp_us: i64, flags: InputFlags) {
        let sample = self.samples_seen;
        self.samples_seen += 1;
        // The slot is free again as soon as the sample is copied in.
        self.offer_input(token);

        if flags.end_of_stream {
            log::debug!("[SIM_DECODER] End of stream queued");
            return;
        }
        if self.config.fault == DecoderFault::ErrorAt(sample) {
            self.events
                .on_error(format!("simulated failure decoding sample {sample}"));
            return;
        }
        if let DecoderFault::SwallowOutputsFrom(first) = self.config.fault {
            if sample >= first {
                return;
            }
        }
        self.waiting.push_back(timestamp_us);
        self.drain_waiting();
    }

    fn drain_waiting(&mut self) {
        while !self.waiting.is_empty() {
            let Some(index) = self.free_outputs.pop_front() else {
                break;
            };
            if let Some(timestamp_us) = self.waiting.pop_front() {
                log::trace!("[SIM_DECODER] Frame {timestamp_us}us ready in slot {index}");
                self.events
                    .on_output_ready(BufferDescriptor::new(index, timestamp_us));
            }
        }
    }

    fn on_release(&mut self, index: usize, release: OutputRelease) {
        if index >= self.config.output_slots || self.free_outputs.contains(&index) {
            log::warn!("[SIM_DECODER] Release of unowned output slot {index}");
            return;
        }
        if let OutputRelease::Render { .. } = release {
            self.frames_rendered += 1;
            log::trace!("[SIM_DECODER] Rendering frame #{}", self.frames_rendered);
            if self.config.fault != DecoderFault::SilentRender {
                self.frames.on_frame_available();
            }
        }
        self.free_outputs.push_back(index);
        self.drain_waiting();
    }
}

pub struct SimulatedDecoder {
    thread_handle: Option<JoinHandle<()>>,
    sender: Sender<DecoderMessage>,
}

impl SimulatedDecoder {
    /// Starts the callback thread, which immediately offers every input slot.
    pub fn start(
        config: SimulatedDecoderConfig,
        events: DecoderEvents,
        frames: FrameAvailableListener,
    ) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut callbacks = CallbackLoop {
            free_outputs: (0..config.output_slots).collect(),
            config,
            events,
            frames,
            waiting: VecDeque::new(),
            samples_seen: 0,
            frames_rendered: 0,
            inputs_offered: 0,
        };

        let thread_handle = thread::Builder::new()
            .name("sim-decoder-callbacks".to_string())
            .spawn(move || {
                callbacks.start();
                while let Ok(message) = receiver.recv() {
                    match message {
                        DecoderMessage::Input {
                            token,
                            timestamp_us,
                            flags,
                        } => callbacks.on_input(token, timestamp_us, flags),
                        DecoderMessage::ReleaseOutput { index, release } => {
                            callbacks.on_release(index, release)
                        }
                        DecoderMessage::Shutdown => {
                            log::debug!("[SIM_DECODER] Shutting down.");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            sender,
        })
    }

    fn send(&self, message: DecoderMessage) -> Result<()> {
        if self.thread_handle.is_none() {
            return Err(PlayerError::Decoder("decoder already released".to_string()));
        }
        self.sender
            .send(message)
            .map_err(|_| PlayerError::Decoder("decoder callback thread exited".to_string()))
    }
}

impl HardwareDecoder for SimulatedDecoder {
    fn queue_input(
        &mut self,
        token: BufferToken,
        _data: &[u8],
        timestamp_us: i64,
        flags: InputFlags,
    ) -> Result<()> {
        self.send(DecoderMessage::Input {
            token,
            timestamp_us,
            flags,
        })
    }

    fn release_output(&mut self, index: usize, release: OutputRelease) -> Result<()> {
        self.send(DecoderMessage::ReleaseOutput { index, release })
    }

    fn release(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if self.sender.send(DecoderMessage::Shutdown).is_err() {
            log::debug!("[SIM_DECODER] Callback thread already shut down.");
        }
        if handle.join().is_err() {
            log::error!("[SIM_DECODER] Callback thread panicked");
        }
    }
}

impl Drop for SimulatedDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::BufferArbiter;
    use crate::render_sync::RenderSync;
    use web_time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn start(
        fault: DecoderFault,
    ) -> (SimulatedDecoder, BufferArbiter, std::sync::Arc<RenderSync>) {
        let (events, arbiter) = BufferArbiter::channel(16);
        let sync = RenderSync::new();
        let config = SimulatedDecoderConfig {
            input_slots: 2,
            output_slots: 1,
            fault,
        };
        let decoder = SimulatedDecoder::start(config, events, sync.listener()).unwrap();
        (decoder, arbiter, sync)
    }

    #[test]
    fn offers_input_slots_and_decodes_in_order() {
        let (mut decoder, arbiter, sync) = start(DecoderFault::None);
        let token = arbiter.poll_input(WAIT).unwrap();
        decoder
            .queue_input(token, &[1, 2, 3], 0, InputFlags::NONE)
            .unwrap();
        let frame = arbiter.poll_output(WAIT).unwrap();
        assert_eq!(frame, BufferDescriptor::new(0, 0));

        decoder
            .release_output(frame.index, OutputRelease::Render { timestamp_ns: 1 })
            .unwrap();
        assert!(sync.await_new_image(WAIT).is_ok());
        decoder.release();
    }

    #[test]
    fn output_waits_for_a_free_slot() {
        let (mut decoder, arbiter, _sync) = start(DecoderFault::None);
        let first = arbiter.poll_input(WAIT).unwrap();
        let second = arbiter.poll_input(WAIT).unwrap();
        decoder.queue_input(first, &[], 0, InputFlags::NONE).unwrap();
        decoder
            .queue_input(second, &[], 33_333, InputFlags::NONE)
            .unwrap();
        let frame = arbiter.poll_output(WAIT).unwrap();
        assert_eq!(arbiter.poll_output(Duration::from_millis(20)), None);
        decoder
            .release_output(frame.index, OutputRelease::Discard)
            .unwrap();
        assert_eq!(
            arbiter.poll_output(WAIT),
            Some(BufferDescriptor::new(0, 33_333))
        );
    }

    #[test]
    fn injected_error_reaches_the_arbiter() {
        let (mut decoder, arbiter, _sync) = start(DecoderFault::ErrorAt(0));
        let token = arbiter.poll_input(WAIT).unwrap();
        decoder.queue_input(token, &[], 0, InputFlags::NONE).unwrap();
        assert_eq!(arbiter.poll_output(Duration::from_millis(50)), None);
        assert!(arbiter.take_error().is_some());
    }

    #[test]
    fn input_limit_stops_offering_slots() {
        let (mut decoder, arbiter, _sync) = start(DecoderFault::InputLimit(3));
        let mut queued = 0;
        while let Some(token) = arbiter.poll_input(Duration::from_millis(100)) {
            decoder
                .queue_input(token, &[], queued * 33_333, InputFlags::NONE)
                .unwrap();
            queued += 1;
        }
        assert_eq!(queued, 3);
    }

    #[test]
    fn swallowed_samples_produce_no_output() {
        let (mut decoder, arbiter, _sync) = start(DecoderFault::SwallowOutputsFrom(1));
        let first = arbiter.poll_input(WAIT).unwrap();
        decoder.queue_input(first, &[], 0, InputFlags::NONE).unwrap();
        let frame = arbiter.poll_output(WAIT).unwrap();
        decoder
            .release_output(frame.index, OutputRelease::Discard)
            .unwrap();

        let second = arbiter.poll_input(WAIT).unwrap();
        decoder
            .queue_input(second, &[], 33_333, InputFlags::NONE)
            .unwrap();
        assert_eq!(arbiter.poll_output(Duration::from_millis(50)), None);
    }

    #[test]
    fn released_decoder_rejects_work() {
        let (mut decoder, _arbiter, _sync) = start(DecoderFault::None);
        decoder.release();
        decoder.release();
        assert!(matches!(
            decoder.queue_input(BufferToken(0), &[], 0, InputFlags::NONE),
            Err(PlayerError::Decoder(_))
        ));
    }
}
