/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The FramePipeline, which interleaves the video and stabilization tracks, drives the
//! decoder, and renders each frame with its accumulated stabilization transforms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use web_time::Duration;

use crate::arbiter::BufferArbiter;
use crate::config::SessionConfig;
use crate::decoder::HardwareDecoder;
use crate::frame::{BufferDescriptor, InputFlags, OutputRelease};
use crate::media::{Demuxer, RenderSurface, SeekMode, TrackLayout};
use crate::motion::{MotionData, MotionDataType};
use crate::pacing::{FramePacer, MonotonicClock};
use crate::render_sync::RenderSync;
use crate::transform::StripTransformSet;
use crate::{PlayerError, Result};

/// A unit of work for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    /// Decode and render the next frame.
    Advance,
    /// Jump to a keyframe near `timestamp_us` and render it.
    SeekTo { timestamp_us: i64, mode: SeekMode },
}

/// Where the pipeline is within the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ReadingVideoSample,
    ReadingMotionSample,
    AwaitingOutputBuffer,
    Rendering,
    Aborted,
}

/// Why a command finished without rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The decoder offered no input slot within the buffer timeout.
    InputBufferUnavailable,
    /// The decoder produced no frame within the buffer timeout.
    OutputBufferUnavailable,
    /// Every selected track is exhausted.
    EndOfStream,
    /// The session is closing.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedFrame {
    pub presentation_timestamp_us: i64,
    pub render_timestamp_ns: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Rendered(RenderedFrame),
    Aborted(AbortReason),
}

impl CommandOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, CommandOutcome::Rendered(_))
    }

    pub fn rendered(&self) -> Option<&RenderedFrame> {
        match self {
            CommandOutcome::Rendered(frame) => Some(frame),
            CommandOutcome::Aborted(_) => None,
        }
    }
}

/// How a stabilization sample affects the accumulated transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionPolicy {
    Compose,
    Reset,
}

/// How the render timestamp is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacingPolicy {
    Advance,
    Freeze,
}

#[derive(Debug, Clone, Copy)]
struct StepPolicy {
    motion: MotionPolicy,
    pacing: PacingPolicy,
}

impl StepPolicy {
    const ADVANCE: StepPolicy = StepPolicy {
        motion: MotionPolicy::Compose,
        pacing: PacingPolicy::Advance,
    };
    const SEEK: StepPolicy = StepPolicy {
        motion: MotionPolicy::Reset,
        pacing: PacingPolicy::Freeze,
    };
}

/// A decoded frame and the transform set it should be drawn with, not yet committed.
struct PendingFrame {
    descriptor: BufferDescriptor,
    strips: StripTransformSet,
}

enum Interleaved {
    Frame(PendingFrame),
    Aborted(AbortReason),
}

/// Playback state carried between commands. Only the worker thread touches it.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub pacer: FramePacer,
    pub strips: StripTransformSet,
    pub tracks: TrackLayout,
}

impl PipelineState {
    pub fn stabilization_enabled(&self) -> bool {
        self.tracks.motion.is_some()
    }
}

/// The platform services a pipeline drives.
pub struct PipelineParts {
    pub demuxer: Box<dyn Demuxer>,
    pub decoder: Box<dyn HardwareDecoder>,
    pub surface: Box<dyn RenderSurface>,
    pub arbiter: BufferArbiter,
    pub render_sync: Arc<RenderSync>,
    pub clock: Box<dyn MonotonicClock>,
}

pub struct FramePipeline {
    config: SessionConfig,
    /// Frame size used for the device-space conversion.
    frame_size: (u32, u32),
    demuxer: Box<dyn Demuxer>,
    decoder: Box<dyn HardwareDecoder>,
    surface: Box<dyn RenderSurface>,
    arbiter: BufferArbiter,
    render_sync: Arc<RenderSync>,
    clock: Box<dyn MonotonicClock>,
    cancel: Arc<AtomicBool>,
    state: PipelineState,
    stage: Stage,
    sample_buffer: Vec<u8>,
    released: bool,
}

impl FramePipeline {
    /// Selects the tracks in `tracks` and positions the demuxer on the first keyframe.
    pub fn new(
        config: SessionConfig,
        tracks: TrackLayout,
        frame_size: (u32, u32),
        parts: PipelineParts,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let mut pipeline = Self {
            state: PipelineState {
                pacer: FramePacer::new(config.fallback_frame_interval_ns()),
                strips: StripTransformSet::identity(config.strip_count),
                tracks,
            },
            config,
            frame_size,
            demuxer: parts.demuxer,
            decoder: parts.decoder,
            surface: parts.surface,
            arbiter: parts.arbiter,
            render_sync: parts.render_sync,
            clock: parts.clock,
            cancel,
            stage: Stage::Idle,
            sample_buffer: Vec::new(),
            released: false,
        };
        // On failure the pipeline is dropped here, which releases every part.
        pipeline.demuxer.select_track(tracks.video)?;
        if let Some(motion) = tracks.motion {
            pipeline.demuxer.select_track(motion)?;
        }
        pipeline.demuxer.seek(0, SeekMode::PreviousSync);
        log::debug!(
            "Pipeline ready: video track {}, motion track {:?}, {} strips",
            tracks.video,
            tracks.motion,
            pipeline.config.strip_count
        );
        Ok(pipeline)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// True while any selected track still has a sample.
    pub fn has_next_frame(&self) -> bool {
        self.demuxer.current_track_index().is_some()
    }

    /// Runs one command to completion.
    ///
    /// Running out of decoder buffers or samples is reported as
    /// `CommandOutcome::Aborted` and leaves the playback state untouched; an `Err` is
    /// fatal for the session.
    pub fn execute(&mut self, command: FrameCommand) -> Result<CommandOutcome> {
        if self.released {
            return Err(PlayerError::SessionClosed);
        }
        self.stage = Stage::Idle;
        let policy = match command {
            FrameCommand::Advance => StepPolicy::ADVANCE,
            FrameCommand::SeekTo { timestamp_us, mode } => {
                log::debug!("Seeking to {timestamp_us}us ({mode:?})");
                self.demuxer.seek(timestamp_us, mode);
                StepPolicy::SEEK
            }
        };

        match self.interleave(policy.motion)? {
            Interleaved::Frame(frame) => self.render(frame, policy.pacing),
            Interleaved::Aborted(reason) => {
                log::debug!("{command:?} aborted: {reason:?}");
                self.stage = Stage::Aborted;
                Ok(CommandOutcome::Aborted(reason))
            }
        }
    }

    fn check_decoder(&self) -> Result<()> {
        match self.arbiter.take_error() {
            Some(message) => Err(PlayerError::Decoder(message)),
            None => Ok(()),
        }
    }

    /// Reads samples until the next frame has been decoded and its stabilization sample
    /// (if the motion track is selected) has been applied.
    fn interleave(&mut self, motion: MotionPolicy) -> Result<Interleaved> {
        let mut decoded: Option<BufferDescriptor> = None;
        let mut motion_visited = !self.state.stabilization_enabled();
        let mut strips = self.state.strips.clone();

        while decoded.is_none() || !motion_visited {
            self.check_decoder()?;
            if self.cancel.load(Ordering::Acquire) {
                return self.abort(decoded, AbortReason::Cancelled);
            }
            let Some(track) = self.demuxer.current_track_index() else {
                return self.abort(decoded, AbortReason::EndOfStream);
            };

            if track == self.state.tracks.video {
                if decoded.is_some() {
                    log::warn!("Video sample follows a frame without motion data");
                    // Unstabilized, and the next frame composes from identity.
                    strips = StripTransformSet::identity(self.config.strip_count);
                    break;
                }
                match self.decode_video_sample()? {
                    Ok(descriptor) => decoded = Some(descriptor),
                    Err(reason) => return self.abort(None, reason),
                }
            } else if Some(track) == self.state.tracks.motion {
                self.stage = Stage::ReadingMotionSample;
                strips = self.next_strips(&strips, motion);
                self.demuxer.advance();
                motion_visited = true;
            } else {
                self.demuxer.advance();
            }
        }

        // The loop only exits with a decoded frame.
        match decoded {
            Some(descriptor) => Ok(Interleaved::Frame(PendingFrame { descriptor, strips })),
            None => Ok(Interleaved::Aborted(AbortReason::EndOfStream)),
        }
    }

    /// Feeds the current video sample to the decoder and waits for a decoded frame.
    /// The inner `Err` is a non-fatal abort.
    fn decode_video_sample(
        &mut self,
    ) -> Result<std::result::Result<BufferDescriptor, AbortReason>> {
        self.stage = Stage::ReadingVideoSample;
        let timeout = self.config.buffer_timeout;
        let Some(token) = self.arbiter.poll_input(timeout) else {
            self.check_decoder()?;
            return Ok(Err(AbortReason::InputBufferUnavailable));
        };

        match self.demuxer.read_sample(&mut self.sample_buffer) {
            None => {
                log::debug!("Video track exhausted, signalling end of stream");
                self.decoder
                    .queue_input(token, &[], 0, InputFlags::END_OF_STREAM)?;
            }
            Some(size) => {
                let timestamp_us = self.demuxer.sample_timestamp_us();
                self.decoder.queue_input(
                    token,
                    &self.sample_buffer[..size],
                    timestamp_us,
                    InputFlags::NONE,
                )?;
                self.demuxer.advance();
            }
        }

        self.stage = Stage::AwaitingOutputBuffer;
        match self.arbiter.poll_output(timeout) {
            Some(descriptor) => Ok(Ok(descriptor)),
            None => {
                self.check_decoder()?;
                Ok(Err(AbortReason::OutputBufferUnavailable))
            }
        }
    }

    /// The transform set for the frame whose stabilization sample is current.
    ///
    /// Already-stabilized, malformed and unreadable samples yield identity, and that
    /// identity becomes the baseline later frames compose onto.
    fn next_strips(
        &mut self,
        current: &StripTransformSet,
        policy: MotionPolicy,
    ) -> StripTransformSet {
        let identity = StripTransformSet::identity(self.config.strip_count);
        if policy == MotionPolicy::Reset {
            return identity;
        }
        let Some(size) = self.demuxer.read_sample(&mut self.sample_buffer) else {
            log::warn!("Stabilization sample unreadable; frame left unstabilized");
            return identity;
        };
        match MotionData::decode(&self.sample_buffer[..size], self.config.strip_count) {
            Ok(MotionData {
                data_type: MotionDataType::Interframe,
                increments,
            }) => current.compose_left(&increments),
            Ok(MotionData {
                data_type: MotionDataType::AlreadyStabilized,
                ..
            }) => identity,
            Err(e) => {
                log::warn!("{e}; frame left unstabilized");
                identity
            }
        }
    }

    /// Gives back a decoded frame that will not be rendered and reports the abort.
    fn abort(
        &mut self,
        decoded: Option<BufferDescriptor>,
        reason: AbortReason,
    ) -> Result<Interleaved> {
        if let Some(descriptor) = decoded {
            self.decoder
                .release_output(descriptor.index, OutputRelease::Discard)?;
        }
        Ok(Interleaved::Aborted(reason))
    }

    fn render(&mut self, frame: PendingFrame, pacing: PacingPolicy) -> Result<CommandOutcome> {
        self.stage = Stage::Rendering;
        let presentation_us = frame.descriptor.presentation_timestamp_us;
        let render_ns = match pacing {
            PacingPolicy::Advance => self
                .state
                .pacer
                .schedule(presentation_us, self.clock.now_ns()),
            PacingPolicy::Freeze => self.state.pacer.previous_render_ns(),
        };

        self.decoder.release_output(
            frame.descriptor.index,
            OutputRelease::Render {
                timestamp_ns: render_ns,
            },
        )?;
        match pacing {
            PacingPolicy::Advance => self.state.pacer.commit(presentation_us, render_ns),
            PacingPolicy::Freeze => self.state.pacer.rebaseline(presentation_us),
        }
        self.state.strips = frame.strips;

        self.render_sync
            .await_new_image(self.config.render_timeout)?;
        let (width, height) = self.frame_size;
        self.surface
            .draw_image(&self.state.strips.to_device_space(width, height), render_ns)?;

        log::trace!("Rendered frame {presentation_us}us at {render_ns}ns");
        Ok(CommandOutcome::Rendered(RenderedFrame {
            presentation_timestamp_us: presentation_us,
            render_timestamp_ns: render_ns,
        }))
    }

    /// Returns outstanding output buffers, then releases the decoder, demuxer and
    /// surface. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        while let Some(descriptor) = self.arbiter.poll_output(Duration::ZERO) {
            if let Err(e) = self
                .decoder
                .release_output(descriptor.index, OutputRelease::Discard)
            {
                log::debug!("Could not return output buffer {}: {e}", descriptor.index);
                break;
            }
        }
        self.decoder.release();
        self.demuxer.release();
        self.surface.release();
        log::debug!("Pipeline released");
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.release();
    }
}
