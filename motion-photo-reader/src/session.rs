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

//! The caller-facing playback session.
//!
//! A [`Session`] owns one worker thread that owns the whole [`FramePipeline`]. Every
//! call posts a message to the worker's mailbox and waits, with a bound, on a one-shot
//! reply channel.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use web_time::Duration;

use crate::arbiter::BufferArbiter;
use crate::config::SessionConfig;
use crate::frame::MotionPhotoInfo;
use crate::media::{MediaBackend, RenderSurface, SeekMode};
use crate::messages::WorkerMessage;
use crate::pacing::SystemClock;
use crate::pipeline::{CommandOutcome, FrameCommand, FramePipeline, PipelineParts};
use crate::render_sync::RenderSync;
use crate::{PlayerError, Result};

/// How a session is opened.
pub struct SessionOptions {
    /// Surface to draw into; an offscreen one is created when `None`.
    pub surface: Option<Box<dyn RenderSurface>>,
    /// Overrides the video track's width for the device-space conversion.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Apply the stabilization track when the video has one.
    pub stabilize: bool,
    pub config: SessionConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            surface: None,
            width: None,
            height: None,
            stabilize: true,
            config: SessionConfig::default(),
        }
    }
}

pub struct Session {
    mailbox: Sender<WorkerMessage>,
    worker: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    render_sync: Arc<RenderSync>,
    config: SessionConfig,
    info: MotionPhotoInfo,
    current_timestamp_us: i64,
}

impl Session {
    /// Resolves `path`, builds the pipeline and starts the worker thread.
    ///
    /// Fails without leaving anything running if the file cannot be read, has no video
    /// track, or a platform service cannot be created. Services created before the
    /// failure, including a caller-supplied surface, are released.
    pub fn open(
        backend: &dyn MediaBackend,
        path: impl AsRef<Path>,
        options: SessionOptions,
    ) -> Result<Session> {
        let path = path.as_ref();
        let SessionOptions {
            surface,
            width,
            height,
            stabilize,
            config,
        } = options;

        let resolved = config
            .validate()
            .and_then(|_| backend.resolve(path))
            .and_then(|metadata| {
                let info = metadata.info()?;
                let tracks = metadata.track_layout(stabilize)?;
                Ok((metadata, info, tracks))
            });
        let (metadata, info, tracks) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("Failed to open {}: {e}", path.display());
                if let Some(mut surface) = surface {
                    surface.release();
                }
                return Err(e);
            }
        };
        let format = metadata.tracks[tracks.video].clone();
        let width = width.unwrap_or(format.width);
        let height = height.unwrap_or(format.height);
        log::info!(
            "Opening {}: {}x{} {}us, stabilization {}",
            path.display(),
            width,
            height,
            info.duration_us,
            if tracks.motion.is_some() { "on" } else { "off" }
        );

        let mut surface = match surface {
            Some(surface) => surface,
            None => backend.create_surface(width, height)?,
        };
        let mut demuxer = match backend.open_demuxer(path, &metadata) {
            Ok(demuxer) => demuxer,
            Err(e) => {
                log::warn!("Failed to open demuxer for {}: {e}", path.display());
                surface.release();
                return Err(e);
            }
        };
        let (events, arbiter) = BufferArbiter::channel(config.channel_capacity);
        let render_sync = RenderSync::new();
        let decoder = match backend.create_decoder(&format, events, render_sync.listener()) {
            Ok(decoder) => decoder,
            Err(e) => {
                log::warn!("Failed to create {} decoder: {e}", format.mime);
                demuxer.release();
                surface.release();
                return Err(e);
            }
        };

        // From here on the pipeline owns the services and releases them when dropped.
        let cancel = Arc::new(AtomicBool::new(false));
        let pipeline = FramePipeline::new(
            config.clone(),
            tracks,
            (width, height),
            PipelineParts {
                demuxer,
                decoder,
                surface,
                arbiter,
                render_sync: Arc::clone(&render_sync),
                clock: Box::new(SystemClock::new()),
            },
            Arc::clone(&cancel),
        )?;

        let (mailbox, inbox) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("motion-photo-worker".to_string())
            .spawn(move || run_worker(pipeline, inbox))?;

        Ok(Session {
            mailbox,
            worker: Some(worker),
            cancel,
            render_sync,
            config,
            info,
            current_timestamp_us: 0,
        })
    }

    pub fn info(&self) -> &MotionPhotoInfo {
        &self.info
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Presentation timestamp of the last rendered frame, 0 before the first one.
    pub fn current_timestamp_us(&self) -> i64 {
        self.current_timestamp_us
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_none()
    }

    /// Whether another sample is available. Does not consume it.
    pub fn has_next_frame(&self) -> Result<bool> {
        self.request(
            |reply| WorkerMessage::HasNextFrame { reply },
            self.config.query_timeout,
        )
    }

    /// Decodes and renders the next frame.
    pub fn next_frame(&mut self) -> Result<CommandOutcome> {
        self.execute(FrameCommand::Advance)
    }

    /// Jumps to a keyframe chosen by `mode` and renders it with stabilization reset.
    pub fn seek_to(&mut self, timestamp_us: i64, mode: SeekMode) -> Result<CommandOutcome> {
        self.execute(FrameCommand::SeekTo { timestamp_us, mode })
    }

    fn execute(&mut self, command: FrameCommand) -> Result<CommandOutcome> {
        let outcome = self.request(
            |reply| WorkerMessage::Execute { command, reply },
            self.config.reply_timeout,
        )??;
        if let Some(frame) = outcome.rendered() {
            self.current_timestamp_us = frame.presentation_timestamp_us;
        }
        Ok(outcome)
    }

    fn request<T>(
        &self,
        message: impl FnOnce(Sender<T>) -> WorkerMessage,
        timeout: Duration,
    ) -> Result<T> {
        if self.is_closed() {
            return Err(PlayerError::SessionClosed);
        }
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.mailbox
            .send(message(reply))
            .map_err(|_| PlayerError::SessionTerminated)?;
        match answer.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Worker did not answer within {timeout:?}");
                Err(PlayerError::ReplyTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PlayerError::SessionTerminated),
        }
    }

    /// Stops the worker and releases every platform resource. Safe to call more than
    /// once.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.cancel.store(true, Ordering::Release);
        self.render_sync.close();
        if self.mailbox.send(WorkerMessage::Shutdown).is_err() {
            log::debug!("Worker already exited");
        }
        if worker.join().is_err() {
            log::error!("Worker thread panicked");
        }
        log::info!("Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(mut pipeline: FramePipeline, inbox: Receiver<WorkerMessage>) {
    while let Ok(message) = inbox.recv() {
        match message {
            WorkerMessage::Execute { command, reply } => {
                let result = pipeline.execute(command);
                let failed = match &result {
                    Err(e) => {
                        log::error!("{command:?} failed, stopping worker: {e}");
                        true
                    }
                    Ok(_) => false,
                };
                if reply.send(result).is_err() {
                    log::debug!("Caller stopped waiting for {command:?}");
                }
                if failed {
                    break;
                }
            }
            WorkerMessage::HasNextFrame { reply } => {
                let _ = reply.send(pipeline.has_next_frame());
            }
            WorkerMessage::Shutdown => break,
        }
    }
    pipeline.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::DecoderEvents;
    use crate::decoder::{DecoderFault, HardwareDecoder, SimulatedDecoderConfig};
    use crate::media::{ContainerMetadata, Demuxer, TrackFormat};
    use crate::render_sync::FrameAvailableListener;
    use crate::sim::{DrawLog, MotionPhotoFixture, RecordingSurface, SimBackend};
    use crate::transform::Transform;

    const PATH: &str = "/sdcard/DCIM/PXL_0001.MP.jpg";

    fn options() -> SessionOptions {
        SessionOptions {
            config: SessionConfig {
                buffer_timeout: Duration::from_millis(500),
                render_timeout: Duration::from_millis(500),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn backend(frames: usize) -> SimBackend {
        let _ = env_logger::builder().is_test(true).try_init();
        SimBackend::new().with_file(
            PATH,
            MotionPhotoFixture::builder()
                .frames(frames)
                .per_frame_motion(Transform::translation(0.5, 0.25))
                .build(),
        )
    }

    /// A backend whose decoder cannot be created.
    struct NoDecoderBackend {
        inner: SimBackend,
    }

    impl MediaBackend for NoDecoderBackend {
        fn resolve(&self, path: &Path) -> Result<ContainerMetadata> {
            self.inner.resolve(path)
        }

        fn open_demuxer(
            &self,
            path: &Path,
            metadata: &ContainerMetadata,
        ) -> Result<Box<dyn Demuxer>> {
            self.inner.open_demuxer(path, metadata)
        }

        fn create_decoder(
            &self,
            format: &TrackFormat,
            _events: DecoderEvents,
            _frames: FrameAvailableListener,
        ) -> Result<Box<dyn HardwareDecoder>> {
            Err(PlayerError::Decoder(format!("no decoder for {}", format.mime)))
        }

        fn create_surface(&self, width: u32, height: u32) -> Result<Box<dyn RenderSurface>> {
            self.inner.create_surface(width, height)
        }
    }

    fn caller_surface(opts: &mut SessionOptions) -> DrawLog {
        let surface = RecordingSurface::new();
        let log = surface.log();
        opts.surface = Some(Box::new(surface));
        log
    }

    #[test]
    fn open_reports_info_and_starts_at_zero() {
        let session = Session::open(&backend(3), PATH, options()).unwrap();
        assert_eq!(session.info().width, 1440);
        assert_eq!(session.info().height, 1080);
        assert!(session.info().has_motion_track);
        assert_eq!(session.current_timestamp_us(), 0);
        assert!(session.has_next_frame().unwrap());
    }

    #[test]
    fn open_missing_file_is_io_error() {
        match Session::open(&backend(3), "/sdcard/missing.jpg", options()) {
            Err(PlayerError::Io(_)) => {}
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("opened a missing file"),
        }
    }

    #[test]
    fn open_rejects_invalid_config() {
        let mut opts = options();
        opts.config.strip_count = 0;
        assert!(matches!(
            Session::open(&backend(3), PATH, opts),
            Err(PlayerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn failed_decoder_creation_releases_caller_surface() {
        let backend = NoDecoderBackend { inner: backend(3) };
        let mut opts = options();
        let draws = caller_surface(&mut opts);
        assert!(matches!(
            Session::open(&backend, PATH, opts),
            Err(PlayerError::Decoder(_))
        ));
        assert!(draws.is_released());
    }

    #[test]
    fn failed_decoder_creation_releases_offscreen_surface() {
        let backend = NoDecoderBackend { inner: backend(3) };
        assert!(Session::open(&backend, PATH, options()).is_err());
        assert!(backend.inner.offscreen_log().is_released());
    }

    #[test]
    fn failed_resolve_releases_caller_surface() {
        let mut opts = options();
        let draws = caller_surface(&mut opts);
        assert!(Session::open(&backend(3), "/sdcard/missing.jpg", opts).is_err());
        assert!(draws.is_released());
    }

    #[test]
    fn plays_to_end_and_tracks_timestamp() {
        let mut session = Session::open(&backend(3), PATH, options()).unwrap();
        let mut rendered = 0;
        while session.has_next_frame().unwrap() {
            assert!(session.next_frame().unwrap().is_rendered());
            rendered += 1;
        }
        assert_eq!(rendered, 3);
        assert_eq!(session.current_timestamp_us(), 66_666);
    }

    #[test]
    fn caller_surface_receives_draws() {
        let mut opts = options();
        let draws = caller_surface(&mut opts);
        let mut session = Session::open(&backend(2), PATH, opts).unwrap();
        session.next_frame().unwrap();
        assert_eq!(draws.len(), 1);
        session.close();
        assert!(draws.is_released());
    }

    #[test]
    fn close_is_idempotent_and_rejects_calls() {
        let mut session = Session::open(&backend(2), PATH, options()).unwrap();
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(session.next_frame(), Err(PlayerError::SessionClosed)));
        assert!(matches!(
            session.has_next_frame(),
            Err(PlayerError::SessionClosed)
        ));
    }

    #[test]
    fn fatal_error_terminates_the_worker() {
        let backend = backend(4).with_decoder_config(SimulatedDecoderConfig {
            fault: DecoderFault::ErrorAt(0),
            ..Default::default()
        });
        let mut session = Session::open(&backend, PATH, options()).unwrap();
        assert!(matches!(session.next_frame(), Err(PlayerError::Decoder(_))));
        assert!(matches!(
            session.next_frame(),
            Err(PlayerError::SessionTerminated)
        ));
    }
}
