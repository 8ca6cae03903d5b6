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

//! In-memory stand-ins for the platform services, for tests and offline simulation.
//!
//! A [`MotionPhotoFixture`] describes a synthetic motion photo; [`SimBackend`] serves
//! fixtures by path and wires them to a [`SimulatedDecoder`] and a [`RecordingSurface`].

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::arbiter::DecoderEvents;
use crate::decoder::{HardwareDecoder, SimulatedDecoder, SimulatedDecoderConfig};
use crate::media::{
    ContainerMetadata, Demuxer, MediaBackend, RenderSurface, SeekMode, TrackFormat,
};
use crate::motion::{MotionData, MOTION_TRACK_MIME};
use crate::render_sync::FrameAvailableListener;
use crate::transform::{StripTransformSet, Transform};
use crate::{PlayerError, Result};

/// Track index of the video track in generated fixtures.
pub const VIDEO_TRACK: usize = 0;
/// Track index of the stabilization track in generated fixtures.
pub const MOTION_TRACK: usize = 1;

/// One sample of a synthetic container, in container order.
#[derive(Debug, Clone)]
pub struct SimSample {
    pub track: usize,
    pub timestamp_us: i64,
    pub data: Vec<u8>,
    pub is_sync: bool,
}

/// A synthetic motion photo.
#[derive(Debug, Clone)]
pub struct MotionPhotoFixture {
    pub metadata: ContainerMetadata,
    pub samples: Vec<SimSample>,
}

impl MotionPhotoFixture {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::default()
    }

    pub fn video_sample_count(&self) -> usize {
        self.samples.iter().filter(|s| s.track == VIDEO_TRACK).count()
    }
}

#[derive(Debug, Clone)]
pub struct FixtureBuilder {
    frames: usize,
    frame_interval_us: i64,
    keyframe_interval: usize,
    width: u32,
    height: u32,
    strip_count: usize,
    motion_track: bool,
    per_frame_motion: Transform,
    overrides: HashMap<usize, Vec<u8>>,
    missing_motion: HashSet<usize>,
    pre_stabilized: bool,
    rotation_degrees: i32,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            frames: 30,
            frame_interval_us: 33_333,
            keyframe_interval: 10,
            width: 1440,
            height: 1080,
            strip_count: crate::config::DEFAULT_STRIP_COUNT,
            motion_track: true,
            per_frame_motion: Transform::identity(),
            overrides: HashMap::new(),
            missing_motion: HashSet::new(),
            pre_stabilized: false,
            rotation_degrees: 0,
        }
    }
}

impl FixtureBuilder {
    pub fn frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    pub fn frame_interval_us(mut self, interval: i64) -> Self {
        self.frame_interval_us = interval;
        self
    }

    pub fn keyframe_interval(mut self, interval: usize) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn strip_count(mut self, strips: usize) -> Self {
        self.strip_count = strips;
        self
    }

    pub fn rotation(mut self, degrees: i32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn without_motion_track(mut self) -> Self {
        self.motion_track = false;
        self
    }

    /// Every frame carries the same interframe motion on every strip.
    pub fn per_frame_motion(mut self, motion: Transform) -> Self {
        self.per_frame_motion = motion;
        self
    }

    /// Replaces the stabilization sample of `frame` with raw bytes.
    pub fn motion_payload(mut self, frame: usize, bytes: Vec<u8>) -> Self {
        self.overrides.insert(frame, bytes);
        self
    }

    /// Leaves `frame` without a stabilization sample.
    pub fn without_motion_sample(mut self, frame: usize) -> Self {
        self.missing_motion.insert(frame);
        self
    }

    pub fn pre_stabilized(mut self, pre_stabilized: bool) -> Self {
        self.pre_stabilized = pre_stabilized;
        self
    }

    pub fn build(self) -> MotionPhotoFixture {
        let mut tracks = vec![TrackFormat {
            mime: "video/avc".to_string(),
            width: self.width,
            height: self.height,
        }];
        if self.motion_track {
            tracks.push(TrackFormat {
                mime: MOTION_TRACK_MIME.to_string(),
                width: 0,
                height: 0,
            });
        }

        let increments = StripTransformSet::from_transforms(vec![
            self.per_frame_motion;
            self.strip_count
        ]);
        let motion_bytes = MotionData::interframe(increments).encode();

        let mut samples = Vec::with_capacity(self.frames * 2);
        for frame in 0..self.frames {
            let timestamp_us = frame as i64 * self.frame_interval_us;
            samples.push(SimSample {
                track: VIDEO_TRACK,
                timestamp_us,
                data: (frame as u32).to_le_bytes().to_vec(),
                is_sync: frame % self.keyframe_interval == 0,
            });
            if self.motion_track && !self.missing_motion.contains(&frame) {
                samples.push(SimSample {
                    track: MOTION_TRACK,
                    timestamp_us,
                    data: self
                        .overrides
                        .get(&frame)
                        .cloned()
                        .unwrap_or_else(|| motion_bytes.clone()),
                    is_sync: false,
                });
            }
        }

        MotionPhotoFixture {
            metadata: ContainerMetadata {
                video_offset: 4096,
                tracks,
                rotation_degrees: self.rotation_degrees,
                duration_us: self.frames as i64 * self.frame_interval_us,
                pre_stabilized: self.pre_stabilized,
            },
            samples,
        }
    }
}

/// Demuxer over a fixture's sample list.
#[derive(Debug)]
pub struct SimDemuxer {
    samples: Arc<Vec<SimSample>>,
    selected: Vec<usize>,
    /// Raw position; the current sample is the first selected one at or after it.
    position: usize,
    released: bool,
}

impl SimDemuxer {
    pub fn new(fixture: &MotionPhotoFixture) -> Self {
        Self {
            samples: Arc::new(fixture.samples.clone()),
            selected: Vec::new(),
            position: 0,
            released: false,
        }
    }

    fn current(&self) -> Option<(usize, &SimSample)> {
        if self.released {
            return None;
        }
        self.samples
            .iter()
            .enumerate()
            .skip(self.position)
            .find(|(_, sample)| self.selected.contains(&sample.track))
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Demuxer for SimDemuxer {
    fn select_track(&mut self, index: usize) -> Result<()> {
        if !self.samples.iter().any(|s| s.track == index) {
            return Err(PlayerError::Metadata(format!("track {index} has no samples")));
        }
        if !self.selected.contains(&index) {
            self.selected.push(index);
        }
        Ok(())
    }

    fn current_track_index(&self) -> Option<usize> {
        self.current().map(|(_, sample)| sample.track)
    }

    fn read_sample(&mut self, buffer: &mut Vec<u8>) -> Option<usize> {
        let (_, sample) = self.current()?;
        buffer.clear();
        buffer.extend_from_slice(&sample.data);
        Some(sample.data.len())
    }

    fn sample_timestamp_us(&self) -> i64 {
        self.current().map_or(-1, |(_, sample)| sample.timestamp_us)
    }

    fn advance(&mut self) -> bool {
        match self.current() {
            Some((index, _)) => {
                self.position = index + 1;
                self.current().is_some()
            }
            None => false,
        }
    }

    fn seek(&mut self, timestamp_us: i64, mode: SeekMode) {
        let syncs: Vec<(usize, i64)> = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_sync && self.selected.contains(&s.track))
            .map(|(i, s)| (i, s.timestamp_us))
            .collect();
        let (Some(&first), Some(&last)) = (syncs.first(), syncs.last()) else {
            return;
        };
        let target = match mode {
            SeekMode::PreviousSync => syncs
                .iter()
                .rev()
                .find(|(_, ts)| *ts <= timestamp_us)
                .copied()
                .unwrap_or(first),
            SeekMode::NextSync => syncs
                .iter()
                .find(|(_, ts)| *ts >= timestamp_us)
                .copied()
                .unwrap_or(last),
            SeekMode::ClosestSync => syncs
                .iter()
                .min_by_key(|(_, ts)| (ts - timestamp_us).abs())
                .copied()
                .unwrap_or(first),
        };
        log::trace!("[SIM_DEMUXER] Seek to {timestamp_us}us landed on {}us", target.1);
        self.position = target.0;
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// A frame handed to a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnFrame {
    pub strips: StripTransformSet,
    pub render_timestamp_ns: i64,
}

/// Shared view of everything a [`RecordingSurface`] drew.
#[derive(Debug, Clone, Default)]
pub struct DrawLog {
    frames: Arc<Mutex<Vec<DrawnFrame>>>,
    released: Arc<AtomicBool>,
}

impl DrawLog {
    pub fn frames(&self) -> Vec<DrawnFrame> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn last(&self) -> Option<DrawnFrame> {
        self.frames.lock().last().cloned()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// A surface that records each draw instead of touching a GPU.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    log: DrawLog,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: DrawLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> DrawLog {
        self.log.clone()
    }
}

impl RenderSurface for RecordingSurface {
    fn draw_image(&mut self, strips: &StripTransformSet, render_timestamp_ns: i64) -> Result<()> {
        if self.log.is_released() {
            return Err(PlayerError::Surface("surface already released".to_string()));
        }
        self.log.frames.lock().push(DrawnFrame {
            strips: strips.clone(),
            render_timestamp_ns,
        });
        Ok(())
    }

    fn release(&mut self) {
        self.log.released.store(true, Ordering::Release);
    }
}

/// Serves registered fixtures by path.
#[derive(Debug, Default)]
pub struct SimBackend {
    files: HashMap<PathBuf, MotionPhotoFixture>,
    decoder: SimulatedDecoderConfig,
    offscreen: DrawLog,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, fixture: MotionPhotoFixture) -> Self {
        self.files.insert(path.into(), fixture);
        self
    }

    pub fn with_decoder_config(mut self, config: SimulatedDecoderConfig) -> Self {
        self.decoder = config;
        self
    }

    /// Draws made to surfaces this backend created.
    pub fn offscreen_log(&self) -> DrawLog {
        self.offscreen.clone()
    }

    fn fixture(&self, path: &Path) -> Result<&MotionPhotoFixture> {
        self.files.get(path).ok_or_else(|| {
            PlayerError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ))
        })
    }
}

impl MediaBackend for SimBackend {
    fn resolve(&self, path: &Path) -> Result<ContainerMetadata> {
        Ok(self.fixture(path)?.metadata.clone())
    }

    fn open_demuxer(
        &self,
        path: &Path,
        _metadata: &ContainerMetadata,
    ) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(SimDemuxer::new(self.fixture(path)?)))
    }

    fn create_decoder(
        &self,
        format: &TrackFormat,
        events: DecoderEvents,
        frames: FrameAvailableListener,
    ) -> Result<Box<dyn HardwareDecoder>> {
        log::debug!(
            "[SIM_BACKEND] Starting decoder for {} {}x{}",
            format.mime,
            format.width,
            format.height
        );
        Ok(Box::new(SimulatedDecoder::start(
            self.decoder.clone(),
            events,
            frames,
        )?))
    }

    fn create_surface(&self, width: u32, height: u32) -> Result<Box<dyn RenderSurface>> {
        log::debug!("[SIM_BACKEND] Creating {width}x{height} offscreen surface");
        Ok(Box::new(RecordingSurface::with_log(self.offscreen.clone())))
    }
}
