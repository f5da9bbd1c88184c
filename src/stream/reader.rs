use super::*;
use crate::args::OpenArgs;
use crate::formats::{self, RawHeader};
use crate::prelude::*;
use crate::samples;
use std::sync::{Arc, MutexGuard};
use std::thread;

/// Realtime soundfile playback backed by a worker thread.
///
/// Drive it with `open`, then `start`, then one `process` call per block.
/// `process` blocks only while the worker has not yet buffered one
/// block's worth of audio; steady-state it just copies out of the FIFO.
pub struct StreamReader {
    engine: Arc<Engine>,
    worker: Option<thread::JoinHandle<()>>,
    outlets: usize,
}

impl StreamReader {
    /// `channels` fixes the output bus width; `buf_size` of 0 takes the
    /// default per-channel allocation, anything else is clamped to the
    /// legal range.
    pub fn new(channels: usize, buf_size: usize) -> StreamReader {
        let outlets = channels.clamp(1, MAX_CHANNELS);
        let engine = Engine::new(clamp_buf_size(buf_size, outlets), 1);
        let worker = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || worker_main(&engine))
        };
        StreamReader {
            engine,
            worker: Some(worker),
            outlets,
        }
    }

    pub fn channels(&self) -> usize {
        self.outlets
    }

    /// Hand the worker a file to open and move to Startup. Cursors reset
    /// immediately; any request in flight is abandoned at the worker's
    /// next look at the request slot.
    pub fn open(&mut self, args: OpenArgs) {
        let mut st = self.engine.lock();
        st.request = Request::Open;
        st.filename = args.filename;
        st.tail = 0;
        st.head = 0;
        st.big_endian = args.big_endian.unwrap_or(cfg!(target_endian = "big"));
        st.onset_frames = args.skip_frames;
        st.header_size = args.header_size;
        st.channels = args.channels;
        st.bytes_per_sample = args.bytes_per_sample;
        st.eof = false;
        st.error = None;
        st.state = StreamState::Startup;
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

    pub fn stop(&mut self) {
        let mut st = self.engine.lock();
        st.state = StreamState::Idle;
        st.request = Request::Close;
        self.engine.request_cond.notify_one();
    }

    /// Tell the instance how many frames each `process` call will move.
    /// Power-of-two sizes up to [`MAX_BLOCK`] keep the FIFO wraps aligned.
    pub fn set_block_size(&mut self, block_size: usize) {
        debug_assert!(block_size.is_power_of_two() && block_size <= MAX_BLOCK);
        let mut st = self.engine.lock();
        st.block_size = block_size;
        st.refresh_sig_period();
    }

    /// Produce one block of audio into `outputs`. Idle and Startup blocks
    /// are silence. Returns true exactly once, on the block where the
    /// file ran out; that block carries whatever frames were left and
    /// silence after them.
    pub fn process(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        let vecsize = outputs.first().map_or(0, |out| out.len());
        let mut st = self.engine.lock();
        if st.state != StreamState::Stream || vecsize == 0 {
            drop(st);
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return false;
        }
        let mut sf_channels = st.channels;
        let mut bytes_per_sample = st.bytes_per_sample;
        let mut big_endian = st.big_endian;
        let mut wantbytes = sf_channels * vecsize * bytes_per_sample;
        while !st.eof && st.head >= st.tail && st.head < st.tail + wantbytes - 1 {
            self.engine.request_cond.notify_one();
            st = self.engine.answer_cond.wait(st).unwrap();
            // the worker may have reparsed the header while we waited
            sf_channels = st.channels;
            bytes_per_sample = st.bytes_per_sample;
            big_endian = st.big_endian;
            wantbytes = sf_channels * vecsize * bytes_per_sample;
        }
        if st.eof && st.head >= st.tail && st.head < st.tail + wantbytes - 1 {
            if let Some(error) = st.error.take() {
                log::error!("dsp: {}: {}", st.filename, error);
            }
            st.state = StreamState::Idle;
            let xfer = (st.head - st.tail + 1) / (sf_channels * bytes_per_sample);
            if xfer > 0 {
                let tail = st.tail;
                samples::decode_frames(
                    sf_channels,
                    outputs,
                    xfer,
                    &st.buf[tail..],
                    bytes_per_sample,
                    big_endian,
                    1,
                );
            }
            for out in outputs.iter_mut() {
                out[xfer..].fill(0.0);
            }
            self.engine.request_cond.notify_one();
            return true;
        }
        let tail = st.tail;
        samples::decode_frames(
            sf_channels,
            outputs,
            vecsize,
            &st.buf[tail..],
            bytes_per_sample,
            big_endian,
            1,
        );
        st.tail += wantbytes;
        if st.tail >= st.fifo_size {
            st.tail = 0;
        }
        st.sig_countdown = st.sig_countdown.saturating_sub(1);
        if st.sig_countdown == 0 {
            self.engine.request_cond.notify_one();
            st.sig_countdown = st.sig_period.max(1);
        }
        false
    }

    /// Dump the instance state through the log facade.
    pub fn print(&self) {
        log_status(&self.engine.lock());
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        shutdown(&self.engine, &mut self.worker);
    }
}

fn finish_open<'a>(engine: &'a Engine, mut st: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
    if st.request == Request::Busy {
        st.request = Request::Nothing;
    }
    st = close_file(engine, st);
    engine.answer_cond.notify_one();
    st
}

fn worker_main(engine: &Engine) {
    let mut scratch = vec![0u8; READ_SIZE];
    let mut st = engine.lock();
    loop {
        match st.request {
            Request::Open => {
                // local copies so the mutex can drop around the syscalls
                let filename = st.filename.clone();
                let onset = st.onset_frames;
                let raw = st.header_size.map(|header_size| RawHeader {
                    header_size,
                    channels: st.channels,
                    bytes_per_sample: st.bytes_per_sample,
                    big_endian: Some(st.big_endian),
                });
                st.request = Request::Busy;
                st.error = None;
                if st.file.is_some() {
                    st = close_file(engine, st);
                    if st.request != Request::Busy {
                        st = finish_open(engine, st);
                        continue;
                    }
                }
                drop(st);
                let opened = formats::open_soundfile(Path::new(&filename), raw.as_ref(), onset);
                st = engine.lock();
                match opened {
                    Ok((file, info)) => {
                        st.bytes_per_sample = info.bytes_per_sample;
                        st.channels = info.channels;
                        st.big_endian = info.big_endian;
                        if info.sample_rate != 0 {
                            st.sample_rate = info.sample_rate;
                        }
                        st.byte_limit = info.byte_limit;
                        st.file = Some(file);
                    }
                    Err(e) => {
                        st.error = Some(e.to_string());
                        st.eof = true;
                        st = finish_open(engine, st);
                        continue;
                    }
                }
                if st.request != Request::Busy {
                    st = finish_open(engine, st);
                    continue;
                }
                st.head = 0;
                st.reset_fifo_geometry();
                // keep the fifo fed until told otherwise
                while st.request == Request::Busy {
                    if st.eof {
                        break;
                    }
                    let fifo_size = st.fifo_size;
                    let want = if st.head >= st.tail {
                        // reading up to the end with the tail at zero would
                        // make a full fifo look empty; hold off instead
                        if st.tail > 0 || fifo_size - st.head > READ_SIZE {
                            (fifo_size - st.head).min(READ_SIZE)
                        } else {
                            engine.answer_cond.notify_one();
                            st = engine.request_cond.wait(st).unwrap();
                            continue;
                        }
                    } else if st.tail - st.head - 1 < READ_SIZE {
                        engine.answer_cond.notify_one();
                        st = engine.request_cond.wait(st).unwrap();
                        continue;
                    } else {
                        READ_SIZE
                    };
                    let want = (want as i64).min(st.byte_limit).max(0) as usize;
                    let head = st.head;
                    let Some(mut file) = st.file.take() else {
                        break;
                    };
                    drop(st);
                    let result = file.read(&mut scratch[..want]);
                    st = engine.lock();
                    st.file = Some(file);
                    if st.request != Request::Busy {
                        break;
                    }
                    match result {
                        Err(e) => {
                            st.error = Some(e.to_string());
                            break;
                        }
                        Ok(0) => {
                            st.eof = true;
                            break;
                        }
                        Ok(n) => {
                            st.buf[head..head + n].copy_from_slice(&scratch[..n]);
                            st.head = head + n;
                            if st.head == fifo_size {
                                st.head = 0;
                            }
                            st.byte_limit -= n as i64;
                            if st.byte_limit <= 0 {
                                st.eof = true;
                                break;
                            }
                        }
                    }
                    engine.answer_cond.notify_one();
                }
                st = finish_open(engine, st);
            }
            Request::Close => {
                st = close_file(engine, st);
                if st.request == Request::Close {
                    st.request = Request::Nothing;
                }
                engine.answer_cond.notify_one();
            }
            Request::Quit => {
                st = close_file(engine, st);
                st.request = Request::Nothing;
                engine.answer_cond.notify_one();
                break;
            }
            Request::Nothing | Request::Busy => {
                engine.answer_cond.notify_one();
                st = engine.request_cond.wait(st).unwrap();
            }
        }
    }
}
