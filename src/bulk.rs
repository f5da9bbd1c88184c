//! One-shot, blocking soundfile transfers between disk and per-channel
//! float vectors. These calls may sit in disk I/O for as long as it
//! takes; realtime callers want [`crate::stream`] instead.

use crate::args::{DEFAULT_MAX_FRAMES, ReadArgs, WriteArgs};
use crate::formats::{self, FileFormat, SoundfileInfo, UNLIMITED_BYTES};
use crate::prelude::*;
use crate::samples;
use rayon::prelude::*;
use std::fs::File;

/// Bytes moved per transfer chunk.
const SAMPLE_BUF_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct ReadOutcome {
    pub frames_read: usize,
    pub info: SoundfileInfo,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    pub frames_written: u64,
    pub info: SoundfileInfo,
}

// fread semantics: fill as much of `buf` as the file still has.
fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match file.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}

/// Read a soundfile into per-channel vectors.
///
/// With `resize` the vectors are sized to the frames actually present
/// (clamped by `max_frames` and the header's byte limit); otherwise the
/// existing lengths bound the transfer. Elements past the last frame
/// read are zeroed, as are whole vectors beyond the file's channels.
pub fn read(args: &ReadArgs, vecs: &mut [Vec<f32>]) -> R<ReadOutcome> {
    if vecs.is_empty() {
        return Err(anyhow!("need filename and table argument(s)"));
    }
    if vecs.len() > MAX_CHANNELS {
        return Err(anyhow!("cannot read more than {MAX_CHANNELS} channels"));
    }

    let mut resize = args.resize;
    let mut final_frames = vecs[0].len();
    if !resize && vecs.iter().any(|v| v.len() != final_frames) {
        log::warn!("arrays have different lengths; resizing...");
        resize = true;
    }

    if args.ascii {
        let frames_read = read_ascii(Path::new(&args.filename), vecs, resize, final_frames)?;
        return Ok(ReadOutcome {
            frames_read,
            info: SoundfileInfo {
                sample_rate: 0,
                channels: vecs.len(),
                bytes_per_sample: 0,
                header_size: 0,
                big_endian: false,
                byte_limit: 0,
            },
        });
    }

    let (mut file, info) =
        formats::open_soundfile(Path::new(&args.filename), args.raw.as_ref(), args.skip_frames)
            .map_err(|e| anyhow!("{}: {e}", args.filename))?;
    let bytes_per_frame = info.bytes_per_frame();

    if resize {
        let pos = file.stream_position()?;
        let end = file.seek(SeekFrom::End(0))?;
        if end < pos {
            return Err(anyhow!("lseek failed: {pos}..{end}"));
        }
        file.seek(SeekFrom::Start(pos))?;
        let mut frames_in_file = ((end - pos) / bytes_per_frame as u64) as i64;
        if frames_in_file > args.max_frames {
            log::warn!("{}: truncated to {} elements", args.filename, args.max_frames);
            frames_in_file = args.max_frames;
        }
        frames_in_file = frames_in_file.min(info.byte_limit / bytes_per_frame as i64);
        final_frames = frames_in_file.max(0) as usize;
        for vec in vecs.iter_mut() {
            vec.clear();
            vec.resize(final_frames, 0.0);
        }
    }
    let final_frames = (final_frames as i64).min(info.byte_limit / bytes_per_frame as i64);

    let buf_frames = SAMPLE_BUF_SIZE / bytes_per_frame;
    let mut sampbuf = [0u8; SAMPLE_BUF_SIZE];
    let mut frames_read = 0usize;
    while (frames_read as i64) < final_frames {
        let this_read = ((final_frames - frames_read as i64) as usize).min(buf_frames);
        let nitems = match read_up_to(&mut file, &mut sampbuf[..this_read * bytes_per_frame]) {
            Ok(got) => got / bytes_per_frame,
            Err(e) => {
                log::error!("{}: {e}", args.filename);
                0
            }
        };
        if nitems == 0 {
            break;
        }
        let mut views: Vec<&mut [f32]> =
            vecs.iter_mut().map(|v| &mut v[frames_read..]).collect();
        samples::decode_frames(
            info.channels,
            &mut views,
            nitems,
            &sampbuf,
            info.bytes_per_sample,
            info.big_endian,
            1,
        );
        frames_read += nitems;
    }

    for vec in vecs.iter_mut() {
        let start = frames_read.min(vec.len());
        vec[start..].fill(0.0);
    }
    for vec in vecs.iter_mut().skip(info.channels) {
        vec.fill(0.0);
    }
    Ok(ReadOutcome { frames_read, info })
}

/// Write per-channel vectors out as a soundfile.
///
/// The shortest vector (past the skip offset) bounds the frame count.
/// When normalizing, or when an integer depth would clip, samples are
/// scaled so the peak lands just under full scale. Returns the frames
/// actually written, which is less than requested only after a disk
/// error.
pub fn write(args: &WriteArgs, vecs: &[&[f32]]) -> R<WriteOutcome> {
    let channels = vecs.len();
    if channels < 1 {
        return Err(anyhow!("argument for table name missing"));
    }
    if channels > MAX_CHANNELS {
        return Err(anyhow!("cannot have more than {MAX_CHANNELS} channels"));
    }
    if args.bytes_per_sample == 4 && args.file_format == FileFormat::Aiff {
        return Err(anyhow!("AIFF floating-point file format unavailable"));
    }

    let onset = args.skip_frames as usize;
    let mut nframes = args.nframes;
    for vec in vecs {
        nframes = nframes.min(vec.len() as i64 - onset as i64);
    }
    if nframes <= 0 {
        return Err(anyhow!("no samples at onset {onset}"));
    }
    let total = nframes as u64;

    let biggest = vecs
        .par_iter()
        .map(|v| {
            v[onset..onset + nframes as usize]
                .iter()
                .fold(0.0f32, |peak, s| peak.max(s.abs()))
        })
        .reduce(|| 0.0, f32::max);

    let mut info = SoundfileInfo {
        sample_rate: args.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE),
        channels,
        bytes_per_sample: args.bytes_per_sample,
        header_size: 0,
        big_endian: args.big_endian,
        byte_limit: UNLIMITED_BYTES,
    };
    let (mut file, path, header_size) =
        formats::create_soundfile(&args.filename, args.file_format, &info, total)
            .map_err(|e| anyhow!("{}: {e}", args.filename))?;
    info.header_size = header_size;

    let mut normalize = args.normalize;
    if !normalize {
        if args.bytes_per_sample != 4 && biggest > 1.0 {
            log::warn!("{}: normalizing max amplitude {biggest} to 1", path.display());
            normalize = true;
        } else {
            log::debug!("{}: biggest amplitude = {biggest}", path.display());
        }
    }
    let normfactor = if normalize && biggest > 0.0 {
        32767.0 / (32768.0 * biggest)
    } else {
        1.0
    };

    let bytes_per_frame = info.bytes_per_frame();
    let buf_frames = SAMPLE_BUF_SIZE / bytes_per_frame;
    let mut sampbuf = [0u8; SAMPLE_BUF_SIZE];
    let mut frames_written = 0u64;
    while frames_written < total {
        let this_write = ((total - frames_written) as usize).min(buf_frames);
        let views: Vec<&[f32]> = vecs
            .iter()
            .map(|v| &v[onset + frames_written as usize..])
            .collect();
        samples::encode_frames(
            channels,
            &views,
            this_write,
            &mut sampbuf,
            info.bytes_per_sample,
            info.big_endian,
            normfactor,
            1,
        );
        let want = this_write * bytes_per_frame;
        match file.write(&sampbuf[..want]) {
            Ok(n) if n == want => frames_written += this_write as u64,
            Ok(n) => {
                log::error!("{}: short write", path.display());
                frames_written += (n / bytes_per_frame) as u64;
                break;
            }
            Err(e) => {
                log::error!("{}: {e}", path.display());
                break;
            }
        }
    }

    if frames_written < total && args.nframes < DEFAULT_MAX_FRAMES {
        log::error!(
            "{}: {frames_written} out of {total} frames written",
            path.display()
        );
    }
    if let Err(e) = formats::finish_write(
        &mut file,
        args.file_format,
        info.big_endian,
        total,
        frames_written,
        bytes_per_frame,
    ) {
        log::error!("{}: {e}", path.display());
    }
    Ok(WriteOutcome {
        frames_written,
        info,
    })
}

// Whitespace-separated float samples, interleaved across the vectors.
fn read_ascii(path: &Path, vecs: &mut [Vec<f32>], resize: bool, final_frames: usize) -> R<usize> {
    let text = std::fs::read_to_string(path)?;
    let values: Vec<f32> = text
        .split_whitespace()
        .map(|tok| tok.parse().unwrap_or(0.0))
        .collect();
    let nvecs = vecs.len();
    let mut frames = values.len() / nvecs;
    if frames < 1 {
        return Err(anyhow!("{}: empty or very short file", path.display()));
    }
    if resize {
        for vec in vecs.iter_mut() {
            vec.clear();
            vec.resize(frames, 0.0);
        }
    } else {
        frames = frames.min(final_frames);
    }
    for j in 0..frames {
        for (i, vec) in vecs.iter_mut().enumerate() {
            vec[j] = values[j * nvecs + i];
        }
    }
    for vec in vecs.iter_mut() {
        let start = frames.min(vec.len());
        vec[start..].fill(0.0);
    }
    Ok(frames)
}
