//! Soundfile I/O for PCM containers: WAVE, AIFF and NeXT/Sun `.snd`.
//!
//! Three layers, bottom up:
//!
//! - header and sample codecs ([`formats`], [`samples`], [`extended`])
//!   that translate between on-disk bytes and per-channel `f32` frames;
//! - a blocking one-shot engine ([`bulk`]) that moves whole channel
//!   regions between files and float vectors;
//! - a streaming engine ([`stream`]) that keeps disk I/O on a worker
//!   thread behind a circular byte FIFO, so a realtime block callback
//!   never waits on the disk in steady state.
//!
//! Supported payloads are 16- and 24-bit packed integers and 32-bit
//! IEEE floats, 1 to [`MAX_CHANNELS`] channels, either byte order.

mod prelude;

pub mod args;
pub mod bulk;
pub mod extended;
pub mod formats;
pub mod samples;
pub mod stream;

pub use args::{OpenArgs, ReadArgs, WriteArgs};
pub use bulk::{ReadOutcome, WriteOutcome};
pub use formats::{FileFormat, RawHeader, SoundfileInfo};
pub use stream::{MAX_BLOCK, StreamReader, StreamState, StreamWriter};

/// Hard ceiling on channels in any soundfile operation.
pub const MAX_CHANNELS: usize = 64;

/// Rate assumed when neither the caller nor the host supplies one.
pub const FALLBACK_SAMPLE_RATE: u32 = 44100;
