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

//! Single-slot handoff between the compositor's "new image" notification and the
//! pipeline's render step.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use web_time::Duration;

use crate::{PlayerError, Result};

#[derive(Debug, Default)]
struct Slot {
    pending: bool,
    overrun: bool,
    closed: bool,
}

/// Monitor guarding the pending-image slot.
#[derive(Debug, Default)]
pub struct RenderSync {
    slot: Mutex<Slot>,
    image_available: Condvar,
}

impl RenderSync {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handle for the compositor side.
    pub fn listener(self: &Arc<Self>) -> FrameAvailableListener {
        FrameAvailableListener {
            sync: Arc::clone(self),
        }
    }

    fn notify(&self) {
        let mut slot = self.slot.lock();
        if slot.pending {
            log::error!("New image signalled before the previous one was consumed");
            slot.overrun = true;
        }
        slot.pending = true;
        self.image_available.notify_all();
    }

    /// Blocks until the compositor signals an image, consuming the notification.
    pub fn await_new_image(&self, timeout: Duration) -> Result<()> {
        let mut slot = self.slot.lock();
        let result = self.image_available.wait_while_for(
            &mut slot,
            |slot| !slot.pending && !slot.closed,
            timeout,
        );
        if slot.closed {
            return Err(PlayerError::SessionClosed);
        }
        if slot.overrun {
            return Err(PlayerError::FrameOverrun);
        }
        if result.timed_out() && !slot.pending {
            return Err(PlayerError::RenderTimeout(timeout));
        }
        slot.pending = false;
        Ok(())
    }

    /// Wakes any waiter; later waits fail with `SessionClosed`.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        self.image_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}

/// Given to the decoder/compositor so it can report each new image exactly once.
#[derive(Debug, Clone)]
pub struct FrameAvailableListener {
    sync: Arc<RenderSync>,
}

impl FrameAvailableListener {
    pub fn on_frame_available(&self) {
        self.sync.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn notification_is_consumed_once() {
        let sync = RenderSync::new();
        sync.listener().on_frame_available();
        assert!(sync.await_new_image(Duration::from_millis(10)).is_ok());
        assert!(matches!(
            sync.await_new_image(Duration::from_millis(10)),
            Err(PlayerError::RenderTimeout(_))
        ));
    }

    #[test]
    fn waiter_wakes_on_notification_from_another_thread() {
        let sync = RenderSync::new();
        let listener = sync.listener();
        let notifier = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            listener.on_frame_available();
        });
        assert!(sync.await_new_image(Duration::from_secs(2)).is_ok());
        notifier.join().unwrap();
    }

    #[test]
    fn double_notification_is_an_overrun() {
        let sync = RenderSync::new();
        let listener = sync.listener();
        listener.on_frame_available();
        listener.on_frame_available();
        assert!(matches!(
            sync.await_new_image(Duration::from_millis(10)),
            Err(PlayerError::FrameOverrun)
        ));
    }

    #[test]
    fn close_unblocks_a_waiter() {
        let sync = RenderSync::new();
        let closer = Arc::clone(&sync);
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            closer.close();
        });
        let started = web_time::Instant::now();
        assert!(matches!(
            sync.await_new_image(Duration::from_secs(30)),
            Err(PlayerError::SessionClosed)
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(sync.is_closed());
        handle.join().unwrap();
    }
}
