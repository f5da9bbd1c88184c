use super::*;
use crate::args::WriteArgs;
use crate::formats::{self, SoundfileInfo, UNLIMITED_BYTES};
use crate::prelude::*;
use crate::samples;
use std::sync::{Arc, MutexGuard};
use std::thread;

/// Realtime soundfile recording backed by a worker thread.
///
/// Drive it with `open`, then `start`, then one `process` call per
/// block; `stop` drains the FIFO remainder and finalizes the header.
/// `process` blocks only when the disk has fallen a whole FIFO behind.
pub struct StreamWriter {
    engine: Arc<Engine>,
    worker: Option<thread::JoinHandle<()>>,
    inlets: usize,
}

impl StreamWriter {
    /// `channels` fixes the input bus width; `buf_size` of 0 takes the
    /// default per-channel allocation, anything else is clamped to the
    /// legal range.
    pub fn new(channels: usize, buf_size: usize) -> StreamWriter {
        let inlets = channels.clamp(1, MAX_CHANNELS);
        let engine = Engine::new(clamp_buf_size(buf_size, inlets), inlets);
        let worker = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || worker_main(&engine))
        };
        StreamWriter {
            engine,
            worker: Some(worker),
            inlets,
        }
    }

    pub fn channels(&self) -> usize {
        self.inlets
    }

    /// Hand the worker a file to create and move to Startup. A take
    /// still in progress is stopped first, and the handoff waits for the
    /// worker to acknowledge before the new request is posted.
    pub fn open(&mut self, args: WriteArgs) {
        if self.engine.lock().state != StreamState::Idle {
            self.stop();
        }
        if args.has_bulk_only_flags() {
            log::error!("normalize/skip/nframes arguments to a stream writer: ignored");
        }
        let mut st = self.engine.lock();
        while st.request != Request::Nothing {
            self.engine.request_cond.notify_one();
            st = self.engine.answer_cond.wait(st).unwrap();
        }
        st.bytes_per_sample = args.bytes_per_sample.max(2);
        st.big_endian = args.big_endian;
        st.filename = args.filename;
        st.file_format = args.file_format;
        st.items_written = 0;
        st.request = Request::Open;
        st.tail = 0;
        st.head = 0;
        st.eof = false;
        st.error = None;
        st.state = StreamState::Startup;
        if let Some(rate) = args.sample_rate {
            st.sample_rate = rate;
        } else if st.sample_rate == 0 {
            st.sample_rate = FALLBACK_SAMPLE_RATE;
        }
        st.reset_fifo_geometry();
        self.engine.request_cond.notify_one();
    }

    pub fn start(&mut self) {
        let mut st = self.engine.lock();
        if st.state == StreamState::Startup {
            st.state = StreamState::Stream;
        } else {
            log::error!("start requested with no prior 'open'");
        }
    }

    /// Stop recording; the worker drains whatever is still in the FIFO,
    /// patches the header sizes and closes the file.
    pub fn stop(&mut self) {
        let mut st = self.engine.lock();
        st.state = StreamState::Idle;
        st.request = Request::Close;
        self.engine.request_cond.notify_one();
    }

    /// Block until the worker has acknowledged the last request. Called
    /// after `stop`, this guarantees the FIFO remainder is on disk and
    /// the header sizes are final. Not meaningful while a take is still
    /// running.
    pub fn flush(&mut self) {
        let mut st = self.engine.lock();
        while st.request != Request::Nothing {
            self.engine.request_cond.notify_one();
            st = self.engine.answer_cond.wait(st).unwrap();
        }
    }

    /// Tell the instance how many frames each `process` call will move.
    /// Power-of-two sizes up to [`MAX_BLOCK`] keep the FIFO wraps aligned.
    pub fn set_block_size(&mut self, block_size: usize) {
        debug_assert!(block_size.is_power_of_two() && block_size <= MAX_BLOCK);
        let mut st = self.engine.lock();
        st.block_size = block_size;
        st.refresh_sig_period();
    }

    /// The rate the host is currently running at; used when an `open`
    /// names none.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.engine.lock().sample_rate = sample_rate;
    }

    /// Consume one block of audio from `inputs`. Outside the Stream
    /// state this is a no-op, as it is after a failed open or a disk
    /// error (reported once through the log).
    pub fn process(&mut self, inputs: &[&[f32]]) {
        let vecsize = inputs.first().map_or(0, |input| input.len());
        if vecsize == 0 {
            return;
        }
        let mut st = self.engine.lock();
        if st.state != StreamState::Stream {
            return;
        }
        let channels = st.channels;
        let bytes_per_sample = st.bytes_per_sample;
        let big_endian = st.big_endian;
        let wantbytes = channels * vecsize * bytes_per_sample;
        let mut room = st.tail as i64 - st.head as i64;
        if room <= 0 {
            room += st.fifo_size as i64;
        }
        while room < wantbytes as i64 + 1 && !st.eof {
            log::warn!(
                "stream writer waiting for disk (head {}, tail {}, room {}, want {})",
                st.head,
                st.tail,
                room,
                wantbytes
            );
            self.engine.request_cond.notify_one();
            st = self.engine.answer_cond.wait(st).unwrap();
            room = st.tail as i64 - st.head as i64;
            if room <= 0 {
                room += st.fifo_size as i64;
            }
        }
        if st.eof {
            if let Some(error) = st.error.take() {
                log::error!("dsp: {}: {}", st.filename, error);
            }
            return;
        }
        let head = st.head;
        samples::encode_frames(
            channels,
            inputs,
            vecsize,
            &mut st.buf[head..head + wantbytes],
            bytes_per_sample,
            big_endian,
            1.0,
            1,
        );
        st.head = head + wantbytes;
        if st.head >= st.fifo_size {
            st.head = 0;
        }
        st.sig_countdown = st.sig_countdown.saturating_sub(1);
        if st.sig_countdown == 0 {
            self.engine.request_cond.notify_one();
            st.sig_countdown = st.sig_period.max(1);
        }
    }

    /// Dump the instance state through the log facade.
    pub fn print(&self) {
        log_status(&self.engine.lock());
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        shutdown(&self.engine, &mut self.worker);
    }
}

/// Patch the header sizes and close, with the mutex released around the
/// file operations.
fn finalize_file<'a>(engine: &'a Engine, mut st: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
    let file_format = st.file_format;
    let big_endian = st.big_endian;
    let items_written = st.items_written;
    let bytes_per_frame = st.bytes_per_sample * st.channels;
    let filename = st.filename.clone();
    if let Some(mut file) = st.file.take() {
        drop(st);
        if let Err(e) = formats::finish_write(
            &mut file,
            file_format,
            big_endian,
            u64::MAX,
            items_written,
            bytes_per_frame,
        ) {
            log::error!("{filename}: {e}");
        }
        drop(file);
        st = engine.lock();
    }
    st
}

fn worker_main(engine: &Engine) {
    let mut scratch = vec![0u8; WRITE_SIZE];
    let mut st = engine.lock();
    loop {
        match st.request {
            Request::Open => {
                // local copies so the mutex can drop around the syscalls
                let filename = st.filename.clone();
                let file_format = st.file_format;
                let info = SoundfileInfo {
                    sample_rate: st.sample_rate,
                    channels: st.channels,
                    bytes_per_sample: st.bytes_per_sample,
                    header_size: 0,
                    big_endian: st.big_endian,
                    byte_limit: UNLIMITED_BYTES,
                };
                st.request = Request::Busy;
                st.error = None;
                // open() stops and waits first, so this only fires when a
                // take was abandoned; finish that file before starting over
                if st.file.is_some() {
                    st = finalize_file(engine, st);
                    if st.request != Request::Busy {
                        continue;
                    }
                }
                drop(st);
                let created = formats::create_soundfile(&filename, file_format, &info, 0);
                st = engine.lock();
                match created {
                    Ok((file, _path, _header_size)) => st.file = Some(file),
                    Err(e) => {
                        st.error = Some(e.to_string());
                        st.eof = true;
                        st.request = Request::Nothing;
                        engine.answer_cond.notify_one();
                        continue;
                    }
                }
                if st.request != Request::Busy {
                    continue;
                }
                st.tail = 0;
                st.items_written = 0;
                // drain the fifo to disk; on Close keep going until empty
                while st.request == Request::Busy
                    || (st.request == Request::Close && st.head != st.tail)
                {
                    let fifo_size = st.fifo_size;
                    let closing = st.request == Request::Close && st.head != st.tail;
                    // wrapped data and a closing drain go out right away;
                    // otherwise wait for a full write's worth
                    if !(st.head < st.tail || st.head >= st.tail + WRITE_SIZE || closing) {
                        engine.answer_cond.notify_one();
                        st = engine.request_cond.wait(st).unwrap();
                        continue;
                    }
                    let span_end = if st.head < st.tail { fifo_size } else { st.head };
                    let writebytes = (span_end - st.tail).min(READ_SIZE);
                    let tail = st.tail;
                    scratch[..writebytes].copy_from_slice(&st.buf[tail..tail + writebytes]);
                    let Some(mut file) = st.file.take() else {
                        break;
                    };
                    drop(st);
                    let result = file.write_all(&scratch[..writebytes]);
                    st = engine.lock();
                    st.file = Some(file);
                    if st.request != Request::Busy && st.request != Request::Close {
                        break;
                    }
                    match result {
                        Err(e) => {
                            st.error = Some(e.to_string());
                            st.eof = true;
                            break;
                        }
                        Ok(()) => {
                            st.tail = tail + writebytes;
                            if st.tail == fifo_size {
                                st.tail = 0;
                            }
                            st.items_written +=
                                (writebytes / (st.bytes_per_sample * st.channels)) as u64;
                        }
                    }
                    engine.answer_cond.notify_one();
                }
                // a Close, Quit, new Open or an error broke the loop; the
                // outer dispatch fields whatever the request slot holds now
            }
            Request::Close | Request::Quit => {
                let quit = st.request == Request::Quit;
                if st.file.is_some() {
                    st = finalize_file(engine, st);
                }
                st.request = Request::Nothing;
                engine.answer_cond.notify_one();
                if quit {
                    break;
                }
            }
            Request::Nothing | Request::Busy => {
                engine.answer_cond.notify_one();
                st = engine.request_cond.wait(st).unwrap();
            }
        }
    }
}
