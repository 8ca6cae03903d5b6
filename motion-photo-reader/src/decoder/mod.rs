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

//! The common interface for hardware video decoders.
//!
//! A decoder is asynchronous: it announces free input slots and finished output
//! frames through [`crate::arbiter::DecoderEvents`] from its own callback thread, and
//! reports each frame it renders through [`crate::render_sync::FrameAvailableListener`].

use crate::frame::{BufferToken, InputFlags, OutputRelease};
use crate::Result;

/// Operations the pipeline issues to a decoder. All calls come from the pipeline
/// worker thread.
pub trait HardwareDecoder: Send {
    /// Hands an encoded sample to the input slot named by `token`.
    fn queue_input(
        &mut self,
        token: BufferToken,
        data: &[u8],
        timestamp_us: i64,
        flags: InputFlags,
    ) -> Result<()>;

    /// Returns an output slot, optionally presenting its frame.
    fn release_output(&mut self, index: usize, release: OutputRelease) -> Result<()>;

    /// Stops the decoder and frees its resources. Safe to call more than once.
    fn release(&mut self);
}

mod simulated;
pub use self::simulated::{DecoderFault, SimulatedDecoder, SimulatedDecoderConfig};
