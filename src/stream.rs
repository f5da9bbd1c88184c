//! Background-threaded soundfile streaming.
//!
//! Each streaming instance pairs a realtime side (the object the host
//! drives block by block) with one worker thread that does all blocking
//! file I/O. The two meet at a circular byte FIFO and a request code,
//! both guarded by the instance mutex; the worker is poked through
//! `request_cond` whenever there is something to do and answers through
//! `answer_cond` whenever it has made progress. Syscalls always run with
//! the mutex released, so a new request can preempt a long read or write
//! at the next reacquisition.

use crate::formats::{FileFormat, UNLIMITED_BYTES};
use crate::prelude::*;
use std::fs::File;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

mod reader;
mod writer;

pub use reader::StreamReader;
pub use writer::StreamWriter;

pub(crate) const READ_SIZE: usize = 65536;
pub(crate) const WRITE_SIZE: usize = 65536;
pub(crate) const DEF_BUF_PER_CHANNEL: usize = 262144;
pub(crate) const MIN_BUF_SIZE: usize = 4 * READ_SIZE;
pub(crate) const MAX_BUF_SIZE: usize = 16 * 1024 * 1024;

/// Largest block a callback may move per call. The FIFO is rounded down
/// to a multiple of the worst-case block so cursor wraps stay
/// frame-aligned.
pub const MAX_BLOCK: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Nothing,
    Open,
    Close,
    Quit,
    /// Worker-internal: an Open is being serviced. Anything else showing
    /// up in the request slot preempts it.
    Busy,
}

/// Lifecycle of a streaming instance: `open` moves Idle to Startup,
/// `start` moves Startup to Stream, `stop` or end of file returns to
/// Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Startup,
    Stream,
}

/// Everything both sides share, guarded by the instance mutex.
pub(crate) struct Shared {
    pub request: Request,
    pub state: StreamState,
    pub buf: Box<[u8]>,
    /// Usable FIFO span; `buf.len()` rounded down to whole blocks.
    pub fifo_size: usize,
    /// Producer cursor (worker when reading, callback when writing).
    pub head: usize,
    /// Consumer cursor.
    pub tail: usize,
    pub eof: bool,
    /// Worker-recorded failure, reported from the realtime side.
    pub error: Option<String>,
    pub file: Option<File>,
    pub filename: String,
    pub file_format: FileFormat,
    pub sample_rate: u32,
    pub channels: usize,
    pub bytes_per_sample: usize,
    pub big_endian: bool,
    pub onset_frames: u64,
    /// `None` = detect the header; `Some(n)` = raw layout, audio at byte n.
    pub header_size: Option<u64>,
    pub byte_limit: i64,
    pub block_size: usize,
    pub sig_countdown: usize,
    pub sig_period: usize,
    pub items_written: u64,
}

pub(crate) struct Engine {
    pub shared: Mutex<Shared>,
    pub request_cond: Condvar,
    pub answer_cond: Condvar,
}

impl Engine {
    pub fn new(buf_size: usize, channels: usize) -> Arc<Engine> {
        Arc::new(Engine {
            shared: Mutex::new(Shared {
                request: Request::Nothing,
                state: StreamState::Idle,
                buf: vec![0u8; buf_size].into_boxed_slice(),
                fifo_size: 0,
                head: 0,
                tail: 0,
                eof: false,
                error: None,
                file: None,
                filename: String::new(),
                file_format: FileFormat::Wave,
                sample_rate: 0,
                channels,
                bytes_per_sample: 2,
                big_endian: false,
                onset_frames: 0,
                header_size: None,
                byte_limit: UNLIMITED_BYTES,
                block_size: MAX_BLOCK,
                sig_countdown: 0,
                sig_period: 0,
                items_written: 0,
            }),
            request_cond: Condvar::new(),
            answer_cond: Condvar::new(),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }
}

/// Default, then clamp, the construction-time buffer request.
pub(crate) fn clamp_buf_size(requested: usize, channels: usize) -> usize {
    let size = if requested == 0 {
        DEF_BUF_PER_CHANNEL * channels
    } else {
        requested
    };
    size.clamp(MIN_BUF_SIZE, MAX_BUF_SIZE)
}

impl Shared {
    /// Round the FIFO down to whole worst-case blocks and arrange for the
    /// worker to be prodded 16 times per FIFO traversal.
    pub fn reset_fifo_geometry(&mut self) {
        let granule = self.bytes_per_sample * self.channels * MAX_BLOCK;
        self.fifo_size = self.buf.len() - self.buf.len() % granule;
        self.refresh_sig_period();
        self.sig_countdown = self.sig_period;
    }

    pub fn refresh_sig_period(&mut self) {
        let per_block = 16 * self.bytes_per_sample * self.channels * self.block_size;
        self.sig_period = (self.fifo_size / per_block).max(1);
    }
}

/// Drop the file with the mutex released; the descriptor close may block.
pub(crate) fn close_file<'a>(
    engine: &'a Engine,
    mut st: MutexGuard<'a, Shared>,
) -> MutexGuard<'a, Shared> {
    if let Some(file) = st.file.take() {
        drop(st);
        drop(file);
        st = engine.lock();
    }
    st
}

/// Quit handshake shared by both streaming objects: request, wait for
/// the acknowledge, then join the worker.
pub(crate) fn shutdown(engine: &Engine, worker: &mut Option<JoinHandle<()>>) {
    let mut st = engine.lock();
    st.request = Request::Quit;
    engine.request_cond.notify_one();
    while st.request != Request::Nothing {
        engine.request_cond.notify_one();
        st = engine.answer_cond.wait(st).unwrap();
    }
    drop(st);
    if let Some(handle) = worker.take()
        && handle.join().is_err()
    {
        log::error!("stream worker join failed");
    }
}

pub(crate) fn log_status(st: &Shared) {
    log::info!("state {:?}", st.state);
    log::info!("fifo head {}", st.head);
    log::info!("fifo tail {}", st.tail);
    log::info!("fifo size {}", st.fifo_size);
    log::info!("file open {}", st.file.is_some());
    log::info!("eof {}", st.eof);
}
