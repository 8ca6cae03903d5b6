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

//! Interfaces to the platform services the player drives: container metadata,
//! demuxing, decoding and the GPU surface.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arbiter::DecoderEvents;
use crate::decoder::HardwareDecoder;
use crate::frame::MotionPhotoInfo;
use crate::motion::MOTION_TRACK_MIME;
use crate::render_sync::FrameAvailableListener;
use crate::transform::StripTransformSet;
use crate::{PlayerError, Result};

/// Which keyframe a seek lands on relative to the requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekMode {
    /// The nearest keyframe at or before the timestamp.
    PreviousSync,
    /// The nearest keyframe at or after the timestamp.
    NextSync,
    /// Whichever keyframe is closest to the timestamp.
    ClosestSync,
}

/// Format of one track in the embedded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

impl TrackFormat {
    pub fn is_video(&self) -> bool {
        self.mime.starts_with("video/")
    }

    pub fn is_motion(&self) -> bool {
        self.mime == MOTION_TRACK_MIME
    }
}

/// What the container resolver reports about a motion photo file.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerMetadata {
    /// Byte offset of the embedded video inside the file.
    pub video_offset: u64,
    pub tracks: Vec<TrackFormat>,
    pub rotation_degrees: i32,
    pub duration_us: i64,
    /// The video frames were stabilized when the photo was captured.
    pub pre_stabilized: bool,
}

/// Track indices the pipeline reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackLayout {
    pub video: usize,
    /// `None` when stabilization is off for this session.
    pub motion: Option<usize>,
}

impl ContainerMetadata {
    /// Finds the video and stabilization tracks. The motion track is dropped when
    /// stabilization is not requested or the content is already stabilized.
    pub fn track_layout(&self, stabilize: bool) -> Result<TrackLayout> {
        let video = self
            .tracks
            .iter()
            .position(TrackFormat::is_video)
            .ok_or_else(|| PlayerError::Metadata("no video track".to_string()))?;
        let motion = if stabilize && !self.pre_stabilized {
            self.tracks.iter().position(TrackFormat::is_motion)
        } else {
            None
        };
        Ok(TrackLayout { video, motion })
    }

    pub fn info(&self) -> Result<MotionPhotoInfo> {
        let layout = self.track_layout(true)?;
        let video = &self.tracks[layout.video];
        Ok(MotionPhotoInfo {
            width: video.width,
            height: video.height,
            duration_us: self.duration_us,
            rotation_degrees: self.rotation_degrees,
            has_motion_track: self.tracks.iter().any(TrackFormat::is_motion),
            pre_stabilized: self.pre_stabilized,
        })
    }
}

/// Sample-level access to the embedded video's tracks.
pub trait Demuxer: Send {
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Track of the current sample, or `None` when every selected track is exhausted.
    fn current_track_index(&self) -> Option<usize>;

    /// Copies the current sample into `buffer`; `None` signals end of stream.
    fn read_sample(&mut self, buffer: &mut Vec<u8>) -> Option<usize>;

    fn sample_timestamp_us(&self) -> i64;

    /// Moves to the next sample across all selected tracks.
    fn advance(&mut self) -> bool;

    fn seek(&mut self, timestamp_us: i64, mode: SeekMode);

    fn release(&mut self);
}

/// The GPU surface a decoded frame is drawn to.
///
/// The decoder renders into the surface's texture; the surface's listener reports
/// each new image through [`FrameAvailableListener`].
pub trait RenderSurface: Send {
    /// Draws the latest image warped by the device-space strip transforms.
    fn draw_image(&mut self, strips: &StripTransformSet, render_timestamp_ns: i64) -> Result<()>;

    fn release(&mut self);
}

/// Factory for the platform services backing a session.
pub trait MediaBackend {
    /// Reads the container metadata, failing with `Io` or `Metadata`.
    fn resolve(&self, path: &Path) -> Result<ContainerMetadata>;

    fn open_demuxer(&self, path: &Path, metadata: &ContainerMetadata) -> Result<Box<dyn Demuxer>>;

    /// Creates and starts a decoder for `format`. The decoder reports buffers through
    /// `events` and each rendered frame through `frames`.
    fn create_decoder(
        &self,
        format: &TrackFormat,
        events: DecoderEvents,
        frames: FrameAvailableListener,
    ) -> Result<Box<dyn HardwareDecoder>>;

    /// An offscreen surface, used when the caller does not supply one.
    fn create_surface(&self, width: u32, height: u32) -> Result<Box<dyn RenderSurface>>;
}
