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
 */

//! End-to-end playback through the simulated backend.

use motion_photo_reader::motion::MotionData;
use motion_photo_reader::sim::{MotionPhotoFixture, SimBackend};
use motion_photo_reader::{
    CommandOutcome, PlayerError, SeekMode, Session, SessionConfig, SessionOptions,
    StripTransformSet, Transform,
};
use web_time::Duration;

const CLIP: &str = "/storage/emulated/0/DCIM/Camera/PXL_20250101_120000.MP.jpg";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Timeouts generous enough for a loaded CI machine.
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

fn open(fixture: MotionPhotoFixture) -> (Session, SimBackend) {
    init_logging();
    let backend = SimBackend::new().with_file(CLIP, fixture);
    let session = Session::open(&backend, CLIP, options()).expect("open session");
    (session, backend)
}

/// The identity strip set as a 1440x1080 surface receives it.
fn device_identity() -> StripTransformSet {
    StripTransformSet::identity(12).to_device_space(1440, 1080)
}

fn shaky(frames: usize) -> MotionPhotoFixture {
    MotionPhotoFixture::builder()
        .frames(frames)
        .per_frame_motion(Transform::translation(3.0, -2.0))
        .build()
}

#[test]
fn test_44_frame_clip_plays_exactly_44_frames() {
    let (mut session, backend) = open(shaky(44));

    let mut advances = 0;
    let mut previous = -1;
    while session.has_next_frame().unwrap() {
        let outcome = session.next_frame().unwrap();
        assert!(outcome.is_rendered(), "frame {advances} aborted: {outcome:?}");
        // Presentation timestamps must strictly increase
        assert!(session.current_timestamp_us() > previous);
        previous = session.current_timestamp_us();
        advances += 1;
    }

    assert_eq!(advances, 44);
    assert_eq!(backend.offscreen_log().len(), 44);
}

#[test]
fn test_render_timestamps_never_go_backwards() {
    let (mut session, backend) = open(shaky(10));
    while session.has_next_frame().unwrap() {
        session.next_frame().unwrap();
    }
    let frames = backend.offscreen_log().frames();
    assert!(frames
        .windows(2)
        .all(|pair| pair[1].render_timestamp_ns > pair[0].render_timestamp_ns));
}

#[test]
fn test_seek_to_zero_returns_to_start() {
    let (mut session, _backend) = open(shaky(25));
    for _ in 0..15 {
        session.next_frame().unwrap();
    }
    assert!(session.current_timestamp_us() > 0);

    let outcome = session.seek_to(0, SeekMode::PreviousSync).unwrap();
    assert!(outcome.is_rendered());
    assert_eq!(session.current_timestamp_us(), 0);
}

#[test]
fn test_seek_draws_identity_strips() {
    let (mut session, backend) = open(shaky(30));
    for _ in 0..5 {
        session.next_frame().unwrap();
    }
    let before_seek = backend.offscreen_log().last().unwrap();

    session.seek_to(700_000, SeekMode::ClosestSync).unwrap();
    assert_eq!(session.current_timestamp_us(), 666_660);

    let after_seek = backend.offscreen_log().last().unwrap();
    let identity_in_device_space = device_identity();
    assert_ne!(before_seek.strips, identity_in_device_space);
    assert_eq!(after_seek.strips, identity_in_device_space);
    // Seeking does not advance the render clock
    assert_eq!(
        after_seek.render_timestamp_ns,
        before_seek.render_timestamp_ns
    );
}

#[test]
fn test_playback_continues_after_seek() {
    let (mut session, _backend) = open(shaky(30));
    session.seek_to(400_000, SeekMode::NextSync).unwrap();
    assert_eq!(session.current_timestamp_us(), 666_660);

    let mut remaining = 0;
    while session.has_next_frame().unwrap() {
        assert!(session.next_frame().unwrap().is_rendered());
        remaining += 1;
    }
    // Frames 21..30 follow the keyframe at frame 20
    assert_eq!(remaining, 9);
}

#[test]
fn test_pre_stabilized_clip_ignores_motion_track() {
    let fixture = MotionPhotoFixture::builder()
        .frames(6)
        .per_frame_motion(Transform::translation(5.0, 5.0))
        .pre_stabilized(true)
        .build();
    let (mut session, backend) = open(fixture);
    assert!(session.info().pre_stabilized);

    let mut frames = 0;
    while session.has_next_frame().unwrap() {
        session.next_frame().unwrap();
        frames += 1;
    }
    assert_eq!(frames, 6);
    let identity = device_identity();
    assert!(backend
        .offscreen_log()
        .frames()
        .iter()
        .all(|frame| frame.strips == identity));
}

#[test]
fn test_clip_without_motion_track_plays() {
    let fixture = MotionPhotoFixture::builder()
        .frames(8)
        .without_motion_track()
        .build();
    let (mut session, _backend) = open(fixture);
    assert!(!session.info().has_motion_track);

    let mut frames = 0;
    while session.has_next_frame().unwrap() {
        assert!(session.next_frame().unwrap().is_rendered());
        frames += 1;
    }
    assert_eq!(frames, 8);
}

#[test]
fn test_corrupt_motion_sample_does_not_stop_playback() {
    let fixture = MotionPhotoFixture::builder()
        .frames(12)
        .per_frame_motion(Transform::translation(1.0, 1.0))
        .motion_payload(3, vec![7; 5])
        .motion_payload(4, MotionData::already_stabilized(12).encode())
        .build();
    let (mut session, _backend) = open(fixture);

    let mut frames = 0;
    while session.has_next_frame().unwrap() {
        assert!(session.next_frame().unwrap().is_rendered());
        frames += 1;
    }
    assert_eq!(frames, 12);
}

#[test]
fn test_advancing_past_the_end_aborts() {
    let (mut session, _backend) = open(shaky(2));
    session.next_frame().unwrap();
    session.next_frame().unwrap();
    assert!(!session.has_next_frame().unwrap());
    assert!(matches!(
        session.next_frame().unwrap(),
        CommandOutcome::Aborted(_)
    ));
    // The last rendered frame is still reported
    assert_eq!(session.current_timestamp_us(), 33_333);
}

#[test]
fn test_close_releases_everything() {
    let (mut session, backend) = open(shaky(5));
    session.next_frame().unwrap();
    session.close();
    assert!(backend.offscreen_log().is_released());
    assert!(matches!(session.next_frame(), Err(PlayerError::SessionClosed)));
}

#[test]
fn test_dropping_a_session_releases_everything() {
    let (session, backend) = open(shaky(5));
    drop(session);
    assert!(backend.offscreen_log().is_released());
}

#[test]
fn test_opening_a_missing_file_fails_synchronously() {
    init_logging();
    let backend = SimBackend::new();
    assert!(matches!(
        Session::open(&backend, CLIP, options()),
        Err(PlayerError::Io(_))
    ));
}
