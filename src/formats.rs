//! Container header handling for the three supported soundfile families.
//!
//! WAVE is always little-endian, AIFF always big-endian; NeXT `.snd`
//! carries its byte order in the magic (`.snd` big, `dns.` little).

use crate::prelude::*;
use std::fs::File;

mod aiff;
mod next;
mod wav;

/// Byte limit meaning "no limit" (the NeXT reader and raw opens use it).
pub const UNLIMITED_BYTES: i64 = 0x7fff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Wave,
    Aiff,
    Next,
}

impl FileFormat {
    /// Guess a format from the filename suffix.
    pub fn from_path(name: &str) -> Option<FileFormat> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".aif") || lower.ends_with(".aiff") {
            Some(FileFormat::Aiff)
        } else if lower.ends_with(".snd") || lower.ends_with(".au") {
            Some(FileFormat::Next)
        } else if lower.ends_with(".wav") {
            Some(FileFormat::Wave)
        } else {
            None
        }
    }

    /// On-disk byte order, reconciled against what the caller asked for.
    /// WAVE and AIFF have a fixed order; a conflicting request is noted
    /// and overridden.
    pub fn resolve_endianness(self, requested: Option<bool>) -> bool {
        match self {
            FileFormat::Wave => {
                if requested == Some(true) {
                    log::error!("WAVE file forced to little endian");
                }
                false
            }
            FileFormat::Aiff => {
                if requested == Some(false) {
                    log::error!("AIFF file forced to big endian");
                }
                true
            }
            FileFormat::Next => requested.unwrap_or(cfg!(target_endian = "big")),
        }
    }

    /// Append the canonical suffix when the filename has none that fits.
    pub fn ensure_suffix(self, name: &str) -> String {
        let lower = name.to_ascii_lowercase();
        let (fits, suffix) = match self {
            FileFormat::Wave => (lower.ends_with(".wav"), ".wav"),
            FileFormat::Aiff => (lower.ends_with(".aif") || lower.ends_with(".aiff"), ".aif"),
            FileFormat::Next => (lower.ends_with(".snd") || lower.ends_with(".au"), ".snd"),
        };
        if fits {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        }
    }
}

/// Everything later I/O needs to know about an open soundfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundfileInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub bytes_per_sample: usize,
    /// Byte offset of the first audio byte.
    pub header_size: u64,
    pub big_endian: bool,
    /// Payload bytes a reader may consume; [`UNLIMITED_BYTES`] if unbounded.
    pub byte_limit: i64,
}

impl SoundfileInfo {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.bytes_per_sample
    }

    pub fn endian_char(&self) -> char {
        if self.big_endian { 'b' } else { 'l' }
    }
}

/// Caller-supplied layout for files whose header is skipped, not parsed.
/// `big_endian: None` means machine byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub header_size: u64,
    pub channels: usize,
    pub bytes_per_sample: usize,
    pub big_endian: Option<bool>,
}

pub(crate) fn bad_header() -> anyhow::Error {
    anyhow!("unknown or bad header format")
}

fn read_prefix<T: Read>(rd: &mut T, buf: &mut [u8]) -> R<usize> {
    let mut got = 0;
    while got < buf.len() {
        let n = rd.read(&mut buf[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    Ok(got)
}

/// Classify a soundfile by its magic bytes and parse the header.
///
/// On success the reader is positioned somewhere inside the header; use
/// the returned `header_size` to seek to the audio payload.
pub fn read_header<T: Read + Seek>(rd: &mut T) -> R<SoundfileInfo> {
    let mut prefix = [0u8; 16];
    let got = read_prefix(rd, &mut prefix)?;
    if got < 4 {
        return Err(bad_header());
    }
    match &prefix[0..4] {
        b".snd" => next::parse(rd, true),
        b"dns." => next::parse(rd, false),
        b"RIFF" => {
            if got < 12 || &prefix[8..12] != b"WAVE" {
                return Err(bad_header());
            }
            wav::parse(rd)
        }
        b"FORM" => {
            if got < 12 || &prefix[8..12] != b"AIFF" {
                return Err(bad_header());
            }
            aiff::parse(rd)
        }
        _ => Err(bad_header()),
    }
}

/// Parse a file's header through a memory mapping, without touching the
/// payload.
pub fn probe(path: &Path) -> R<SoundfileInfo> {
    let file = File::open(path)?;
    let mapped = unsafe { MmapOptions::new().map(&file)? };
    read_header(&mut Cursor::new(&mapped[..]))
}

/// Open a soundfile and position it at the first wanted audio byte.
///
/// With `raw` supplied the header is not parsed at all; the given layout
/// is trusted and the byte limit is unbounded. `skip_frames` whole frames
/// are skipped past the header either way, and the byte limit shrinks
/// accordingly.
pub fn open_soundfile(
    path: &Path,
    raw: Option<&RawHeader>,
    skip_frames: u64,
) -> R<(File, SoundfileInfo)> {
    let mut file = File::open(path)?;
    let mut info = match raw {
        Some(raw) => SoundfileInfo {
            sample_rate: 0,
            channels: raw.channels,
            bytes_per_sample: raw.bytes_per_sample,
            header_size: raw.header_size,
            big_endian: raw.big_endian.unwrap_or(cfg!(target_endian = "big")),
            byte_limit: UNLIMITED_BYTES,
        },
        None => read_header(&mut file)?,
    };
    let skip_bytes = skip_frames * info.bytes_per_frame() as u64;
    file.seek(SeekFrom::Start(info.header_size + skip_bytes))?;
    info.byte_limit = (info.byte_limit - skip_bytes as i64).max(0);
    Ok((file, info))
}

/// Emit a fresh header for `frames` frames of audio; returns its size.
/// Pass 0 frames when streaming and patch the sizes afterwards with
/// [`finish_write`].
pub fn write_header<W: Write>(
    w: &mut W,
    format: FileFormat,
    info: &SoundfileInfo,
    frames: u64,
) -> R<u64> {
    match format {
        FileFormat::Wave => wav::write_header(w, info, frames),
        FileFormat::Aiff => aiff::write_header(w, info, frames),
        FileFormat::Next => next::write_header(w, info),
    }
}

/// Create a soundfile with the canonical suffix and a header sized for
/// `frames` frames. Returns the open descriptor, the actual path and the
/// header size.
pub fn create_soundfile(
    name: &str,
    format: FileFormat,
    info: &SoundfileInfo,
    frames: u64,
) -> R<(File, PathBuf, u64)> {
    let path = PathBuf::from(format.ensure_suffix(name));
    let mut file = File::create(&path)?;
    let header_size = write_header(&mut file, format, info, frames)?;
    Ok((file, path, header_size))
}

/// Patch the header size fields to the byte count actually written.
/// A no-op when the file came out exactly as promised at create time.
pub fn finish_write(
    file: &mut File,
    format: FileFormat,
    big_endian: bool,
    nframes: u64,
    items_written: u64,
    bytes_per_frame: usize,
) -> R<()> {
    if items_written >= nframes {
        return Ok(());
    }
    let data_bytes = items_written * bytes_per_frame as u64;
    match format {
        FileFormat::Wave => wav::finalize(file, data_bytes),
        FileFormat::Aiff => aiff::finalize(file, items_written, data_bytes),
        FileFormat::Next => next::finalize(file, big_endian, data_bytes),
    }
}

pub(crate) fn read_u32_e<T: Read>(rd: &mut T, big_endian: bool) -> R<u32> {
    Ok(if big_endian {
        rd.read_u32::<BigEndian>()?
    } else {
        rd.read_u32::<LittleEndian>()?
    })
}

pub(crate) fn write_u32_e<W: Write>(w: &mut W, value: u32, big_endian: bool) -> R<()> {
    if big_endian {
        w.write_u32::<BigEndian>(value)?;
    } else {
        w.write_u32::<LittleEndian>(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_roundtrip(format: FileFormat, info: SoundfileInfo, frames: u64) {
        let mut bytes = Vec::new();
        let header_size = write_header(&mut bytes, format, &info, frames).unwrap();
        // pretend the payload follows
        let payload = (frames as usize) * info.bytes_per_frame();
        bytes.resize(bytes.len() + payload, 0u8);
        let parsed = read_header(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(parsed.header_size, header_size);
        assert_eq!(parsed.channels, info.channels);
        assert_eq!(parsed.bytes_per_sample, info.bytes_per_sample);
        assert_eq!(parsed.sample_rate, info.sample_rate);
        assert_eq!(parsed.big_endian, info.big_endian);
        if format != FileFormat::Next {
            assert_eq!(
                parsed.byte_limit,
                (frames as i64) * info.bytes_per_frame() as i64
            );
        } else {
            assert_eq!(parsed.byte_limit, UNLIMITED_BYTES);
        }
    }

    #[test]
    fn headers_roundtrip_across_formats() {
        for (format, big_endian, depths) in [
            (FileFormat::Wave, false, &[2usize, 3, 4][..]),
            (FileFormat::Aiff, true, &[2, 3][..]),
            (FileFormat::Next, true, &[2, 3, 4][..]),
            (FileFormat::Next, false, &[2, 3, 4][..]),
        ] {
            for &bytes_per_sample in depths {
                for channels in [1usize, 2, 64] {
                    for sample_rate in [8000, 22050, 44100, 48000, 96000] {
                        header_roundtrip(
                            format,
                            SoundfileInfo {
                                sample_rate,
                                channels,
                                bytes_per_sample,
                                header_size: 0,
                                big_endian,
                                byte_limit: UNLIMITED_BYTES,
                            },
                            17,
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn wave_header_is_44_bytes_with_canonical_sizes() {
        let info = SoundfileInfo {
            sample_rate: 44100,
            channels: 2,
            bytes_per_sample: 2,
            header_size: 0,
            big_endian: false,
            byte_limit: UNLIMITED_BYTES,
        };
        let mut bytes = Vec::new();
        assert_eq!(write_header(&mut bytes, FileFormat::Wave, &info, 4).unwrap(), 44);
        assert_eq!(bytes.len(), 44);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 16 + 36);
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 16);
        // float data flips the format tag
        let mut float_info = info;
        float_info.bytes_per_sample = 4;
        let mut bytes = Vec::new();
        write_header(&mut bytes, FileFormat::Wave, &float_info, 4).unwrap();
        assert_eq!(u16::from_le_bytes(bytes[20..22].try_into().unwrap()), 3);
    }

    #[test]
    fn wave_parse_skips_unknown_odd_chunks() {
        // RIFF / WAVE, a LIST chunk of odd length, then fmt and data.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(b"abcde\0"); // odd payload plus pad byte
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&48000u32.to_le_bytes());
        bytes.extend_from_slice(&(48000u32 * 6).to_le_bytes());
        bytes.extend_from_slice(&6u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&12u32.to_le_bytes());
        let header_size = bytes.len() as u64;
        bytes.extend_from_slice(&[0u8; 12]);

        let info = read_header(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.bytes_per_sample, 3);
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.header_size, header_size);
        assert_eq!(info.byte_limit, 12);
    }

    #[test]
    fn unrecognized_magic_is_a_bad_header() {
        let err = read_header(&mut Cursor::new(&b"OggS\0\0\0\0\0\0\0\0\0\0\0\0"[..]))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown or bad header format");
        assert!(read_header(&mut Cursor::new(&b"RI"[..])).is_err());
    }

    #[test]
    fn aiff_rejects_float_writes() {
        let info = SoundfileInfo {
            sample_rate: 44100,
            channels: 1,
            bytes_per_sample: 4,
            header_size: 0,
            big_endian: true,
            byte_limit: UNLIMITED_BYTES,
        };
        assert!(write_header(&mut Vec::new(), FileFormat::Aiff, &info, 1).is_err());
    }

    #[test]
    fn suffixes_and_sniffing_agree() {
        assert_eq!(FileFormat::from_path("x.AIFF"), Some(FileFormat::Aiff));
        assert_eq!(FileFormat::from_path("x.au"), Some(FileFormat::Next));
        assert_eq!(FileFormat::from_path("x.pcm"), None);
        assert_eq!(FileFormat::Wave.ensure_suffix("take1"), "take1.wav");
        assert_eq!(FileFormat::Next.ensure_suffix("take1.au"), "take1.au");
        assert_eq!(FileFormat::Aiff.ensure_suffix("take1.aiff"), "take1.aiff");
    }
}
