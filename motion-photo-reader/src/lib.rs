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

//! Frame-by-frame playback of motion photos with per-strip video stabilization.
//!
//! A motion photo is a still image with a short video appended. Its container may carry
//! a stabilization track holding, for every video frame, one interframe homography per
//! horizontal strip of the image. A [`Session`] decodes the video one frame per call,
//! accumulates those homographies, and hands the rendered frame to a
//! [`RenderSurface`] together with the strip transforms in device coordinates.
//!
//! ```no_run
//! use motion_photo_reader::sim::{MotionPhotoFixture, SimBackend};
//! use motion_photo_reader::{Session, SessionOptions};
//!
//! # fn main() -> motion_photo_reader::Result<()> {
//! let backend = SimBackend::new().with_file("clip.jpg", MotionPhotoFixture::builder().build());
//! let mut session = Session::open(&backend, "clip.jpg", SessionOptions::default())?;
//! while session.has_next_frame()? {
//!     session.next_frame()?;
//! }
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod arbiter;
pub mod config;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod media;
mod messages;
pub mod motion;
pub mod pacing;
pub mod pipeline;
pub mod render_sync;
pub mod session;
pub mod sim;
pub mod transform;

pub use config::SessionConfig;
pub use error::{PlayerError, Result};
pub use frame::MotionPhotoInfo;
pub use media::{MediaBackend, RenderSurface, SeekMode};
pub use pipeline::{AbortReason, CommandOutcome, FrameCommand, RenderedFrame};
pub use session::{Session, SessionOptions};
pub use transform::{StripTransformSet, Transform};
