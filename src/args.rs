//! Flag parsing for the read/write/open command surfaces.
//!
//! Callers hand in already-tokenized argument lists. `parse` functions
//! return the decoded request plus the number of tokens consumed; the
//! leftover tokens (destination table names and the like) belong to the
//! host.

use crate::formats::{FileFormat, RawHeader};
use crate::prelude::*;

/// Default frame ceiling for reads and writes.
pub const DEFAULT_MAX_FRAMES: i64 = 0x7fff_ffff;

const RAW_SYNTAX: &str = "'-raw' flag syntax: <headersize> <channels> <bytespersample> \
                          <endianness: 'b' for big, 'l' for little, 'n' for auto>";

const FLAG_NAMES: [&str; 11] = [
    "skip",
    "nframes",
    "bytes",
    "normalize",
    "wave",
    "nextstep",
    "aiff",
    "big",
    "little",
    "r",
    "rate",
];

/// Warn when a filename is probably a misplaced flag, dashed or not.
fn warn_if_flag_name(filename: &str) {
    let (stripped, dashed) = match filename.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (filename, false),
    };
    if FLAG_NAMES.contains(&stripped) {
        log::warn!(
            "filename '{}' looks like a flag{}",
            filename,
            if dashed { " name" } else { "" }
        );
    }
}

fn float_arg(flag: &str, tokens: &[&str], i: usize) -> R<f64> {
    let Some(tok) = tokens.get(i + 1) else {
        return Err(anyhow!("'{flag}' flag expects a float argument"));
    };
    tok.parse()
        .map_err(|_| anyhow!("'{flag}' flag expects a float but got '{tok}'"))
}

fn reject_float_arg(flag: &str, tokens: &[&str], i: usize) -> R<()> {
    if let Some(tok) = tokens.get(i + 1)
        && tok.parse::<f64>().is_ok()
    {
        return Err(anyhow!("'{flag}' flag does not accept a float argument"));
    }
    Ok(())
}

fn endianness_from(token: &str) -> Option<bool> {
    match token.chars().next() {
        Some('b') => Some(true),
        Some('l') => Some(false),
        _ => None,
    }
}

/// A decoded `read [flags] filename ...` request.
#[derive(Debug, Clone)]
pub struct ReadArgs {
    pub filename: String,
    pub skip_frames: u64,
    pub ascii: bool,
    pub raw: Option<RawHeader>,
    pub resize: bool,
    pub max_frames: i64,
}

impl ReadArgs {
    pub fn for_file(filename: &str) -> ReadArgs {
        ReadArgs {
            filename: filename.to_string(),
            skip_frames: 0,
            ascii: false,
            raw: None,
            resize: false,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }

    /// Decode flags and the filename; returns the tokens consumed.
    pub fn parse(tokens: &[&str]) -> R<(ReadArgs, usize)> {
        let mut args = ReadArgs::for_file("");
        let mut i = 0;
        while i < tokens.len() && tokens[i].starts_with('-') {
            let flag = tokens[i];
            match flag {
                "-skip" => {
                    let v = float_arg(flag, tokens, i)?;
                    if v < 0.0 {
                        return Err(anyhow!("'-skip' flag does not allow a negative number"));
                    }
                    args.skip_frames = v as u64;
                    i += 2;
                }
                "-ascii" => {
                    if args.raw.is_some() {
                        log::warn!("'-raw' overridden by '-ascii'");
                    }
                    args.ascii = true;
                    i += 1;
                }
                "-raw" => {
                    if args.ascii {
                        log::warn!("'-raw' overridden by '-ascii'");
                    }
                    if tokens.len() < i + 5 {
                        return Err(anyhow!("'-raw' flag needs four arguments\n{RAW_SYNTAX}"));
                    }
                    let header_size: f64 = tokens[i + 1].parse().map_err(|_| {
                        anyhow!("'-raw' flag needs a float for the headersize\n{RAW_SYNTAX}")
                    })?;
                    if header_size < 0.0 {
                        return Err(anyhow!(
                            "'-raw' headersize cannot be less than zero\n{RAW_SYNTAX}"
                        ));
                    }
                    let channels: f64 = tokens[i + 2].parse().map_err(|_| {
                        anyhow!("'-raw' flag needs a float to specify channels\n{RAW_SYNTAX}")
                    })?;
                    if channels < 1.0 {
                        return Err(anyhow!(
                            "'-raw' flag needs at least one channel\n{RAW_SYNTAX}"
                        ));
                    }
                    if channels > MAX_CHANNELS as f64 {
                        return Err(anyhow!(
                            "'-raw' channels value {} exceeds maximum of {} channels\n{RAW_SYNTAX}",
                            channels,
                            MAX_CHANNELS
                        ));
                    }
                    let bytes: f64 = tokens[i + 3].parse().map_err(|_| {
                        anyhow!(
                            "'-raw' flag needs a float to specify bytes per sample\n{RAW_SYNTAX}"
                        )
                    })?;
                    if !(2.0..=4.0).contains(&bytes) {
                        return Err(anyhow!(
                            "'-raw' bytes per sample must be between 2 and 4\n{RAW_SYNTAX}"
                        ));
                    }
                    let big_endian = match tokens[i + 4] {
                        t if t.starts_with('n') => None,
                        t => Some(endianness_from(t).ok_or_else(|| {
                            anyhow!("'-raw' endianness must be 'l' or 'b' or 'n'\n{RAW_SYNTAX}")
                        })?),
                    };
                    args.raw = Some(RawHeader {
                        header_size: header_size as u64,
                        channels: channels as usize,
                        bytes_per_sample: bytes as usize,
                        big_endian,
                    });
                    i += 5;
                }
                "-resize" => {
                    reject_float_arg(flag, tokens, i)?;
                    args.resize = true;
                    i += 1;
                }
                "-maxsize" => {
                    let v = float_arg(flag, tokens, i)?;
                    if v < 0.0 {
                        return Err(anyhow!("'-maxsize' flag cannot be less than zero"));
                    }
                    args.max_frames = if v > i64::MAX as f64 {
                        log::warn!(
                            "'-maxsize' overflow detected, clamping to maximum legal value ({})",
                            i64::MAX
                        );
                        i64::MAX
                    } else {
                        v as i64
                    };
                    args.resize = true; // maxsize implies resize
                    i += 2;
                }
                _ => return Err(anyhow!("unknown flag '{flag}'")),
            }
        }
        let Some(filename) = tokens.get(i) else {
            return Err(anyhow!("need filename and table argument(s)"));
        };
        warn_if_flag_name(filename);
        args.filename = filename.to_string();
        Ok((args, i + 1))
    }
}

/// A decoded `write [flags] filename ...` request, also used by the
/// streaming writer's `open`.
#[derive(Debug, Clone)]
pub struct WriteArgs {
    pub filename: String,
    pub file_format: FileFormat,
    pub bytes_per_sample: usize,
    pub big_endian: bool,
    pub normalize: bool,
    pub skip_frames: u64,
    pub nframes: i64,
    pub sample_rate: Option<u32>,
}

impl WriteArgs {
    pub fn for_file(filename: &str) -> WriteArgs {
        let file_format = FileFormat::from_path(filename).unwrap_or(FileFormat::Wave);
        WriteArgs {
            filename: filename.to_string(),
            file_format,
            bytes_per_sample: 2,
            big_endian: file_format.resolve_endianness(None),
            normalize: false,
            skip_frames: 0,
            nframes: DEFAULT_MAX_FRAMES,
            sample_rate: None,
        }
    }

    /// Decode flags and the filename; returns the tokens consumed.
    pub fn parse(tokens: &[&str]) -> R<(WriteArgs, usize)> {
        let mut bytes_per_sample = 2usize;
        let mut requested_endianness: Option<bool> = None;
        let mut file_format: Option<FileFormat> = None;
        let mut normalize = false;
        let mut skip_frames = 0u64;
        let mut nframes = DEFAULT_MAX_FRAMES;
        let mut sample_rate = None;
        let mut i = 0;
        while i < tokens.len() && tokens[i].starts_with('-') {
            let flag = tokens[i];
            match flag {
                "-skip" => {
                    let v = float_arg(flag, tokens, i)?;
                    if v < 0.0 {
                        return Err(anyhow!("'-skip' flag does not allow a negative number"));
                    }
                    skip_frames = v as u64;
                    i += 2;
                }
                "-nframes" => {
                    let v = float_arg(flag, tokens, i)?;
                    if v < 0.0 {
                        return Err(anyhow!("'-nframes' flag does not allow a negative number"));
                    }
                    nframes = v as i64;
                    i += 2;
                }
                "-bytes" => {
                    let v = float_arg(flag, tokens, i)?;
                    if !(2.0..=4.0).contains(&v) {
                        return Err(anyhow!("'-bytes' flag requires a number between 2 and 4"));
                    }
                    bytes_per_sample = v as usize;
                    i += 2;
                }
                "-normalize" => {
                    reject_float_arg(flag, tokens, i)?;
                    normalize = true;
                    i += 1;
                }
                "-wave" => {
                    reject_float_arg(flag, tokens, i)?;
                    file_format = Some(FileFormat::Wave);
                    i += 1;
                }
                "-nextstep" => {
                    reject_float_arg(flag, tokens, i)?;
                    file_format = Some(FileFormat::Next);
                    i += 1;
                }
                "-aiff" => {
                    reject_float_arg(flag, tokens, i)?;
                    file_format = Some(FileFormat::Aiff);
                    i += 1;
                }
                "-big" => {
                    reject_float_arg(flag, tokens, i)?;
                    requested_endianness = Some(true);
                    i += 1;
                }
                "-little" => {
                    reject_float_arg(flag, tokens, i)?;
                    requested_endianness = Some(false);
                    i += 1;
                }
                "-r" | "-rate" => {
                    let v = float_arg(flag, tokens, i)?;
                    if v <= 0.0 {
                        return Err(anyhow!(
                            "'{flag}' flag must have a float arg greater than zero"
                        ));
                    }
                    sample_rate = Some(v as u32);
                    i += 2;
                }
                _ => return Err(anyhow!("unknown flag '{flag}'")),
            }
        }
        let Some(filename) = tokens.get(i) else {
            return Err(anyhow!("need a filename"));
        };
        warn_if_flag_name(filename);
        let file_format =
            file_format.or_else(|| FileFormat::from_path(filename)).unwrap_or(FileFormat::Wave);
        if bytes_per_sample == 4 && file_format == FileFormat::Aiff {
            return Err(anyhow!("AIFF floating-point file format unavailable"));
        }
        let args = WriteArgs {
            filename: filename.to_string(),
            file_format,
            bytes_per_sample,
            big_endian: file_format.resolve_endianness(requested_endianness),
            normalize,
            skip_frames,
            nframes,
            sample_rate,
        };
        Ok((args, i + 1))
    }

    /// Flags the streaming writer parses but does not honor.
    pub(crate) fn has_bulk_only_flags(&self) -> bool {
        self.normalize || self.skip_frames != 0 || self.nframes != DEFAULT_MAX_FRAMES
    }
}

/// A decoded streaming-read `open` request:
/// `open filename [skipframes] [headerbytes] [channels] [bytespersample] [endian]`.
///
/// `headerbytes` of 0 means detect the header; a negative value means a
/// truly headerless raw file.
#[derive(Debug, Clone)]
pub struct OpenArgs {
    pub filename: String,
    pub skip_frames: u64,
    /// `None` parses the header; `Some(n)` trusts a raw layout whose
    /// audio starts at byte `n`.
    pub header_size: Option<u64>,
    pub channels: usize,
    pub bytes_per_sample: usize,
    pub big_endian: Option<bool>,
}

impl OpenArgs {
    pub fn new(filename: &str) -> OpenArgs {
        OpenArgs {
            filename: filename.to_string(),
            skip_frames: 0,
            header_size: None,
            channels: 1,
            bytes_per_sample: 2,
            big_endian: None,
        }
    }

    pub fn parse(tokens: &[&str]) -> R<OpenArgs> {
        let Some(filename) = tokens.first() else {
            return Err(anyhow!("need a filename"));
        };
        // trailing positional floats default to zero when absent
        let float = |i: usize| -> f64 {
            tokens
                .get(i)
                .and_then(|t| t.parse::<f64>().ok())
                .unwrap_or_default()
        };
        let header_bytes = float(2);
        let big_endian = match tokens.get(5) {
            None | Some(&"") => None,
            Some(t) => {
                let e = endianness_from(t);
                if e.is_none() {
                    log::error!("endianness neither 'b' nor 'l'");
                }
                e
            }
        };
        Ok(OpenArgs {
            filename: filename.to_string(),
            skip_frames: float(1).max(0.0) as u64,
            header_size: if header_bytes > 0.0 {
                Some(header_bytes as u64)
            } else if header_bytes == 0.0 {
                None
            } else {
                Some(0)
            },
            channels: (float(3).max(1.0) as usize).min(MAX_CHANNELS),
            bytes_per_sample: (float(4) as usize).clamp(2, 4),
            big_endian,
        })
    }
}
