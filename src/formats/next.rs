use crate::formats::{SoundfileInfo, UNLIMITED_BYTES, bad_header, read_u32_e, write_u32_e};
use crate::prelude::*;

const HEADER_SIZE: u64 = 28;

// sample format codes
const FORMAT_LINEAR_16: u32 = 3;
const FORMAT_LINEAR_24: u32 = 4;
const FORMAT_FLOAT: u32 = 6;

/// Length field value meaning "size not known at write time".
pub(super) const UNKNOWN_LENGTH: u32 = 0xffff_ffff;

/// Fixed 28-byte header; the magic already consumed by detection chose
/// the byte order. The length field is ignored on read, the file's own
/// extent governs.
pub(super) fn parse<T: Read + Seek>(rd: &mut T, big_endian: bool) -> R<SoundfileInfo> {
    rd.seek(SeekFrom::Start(4))?;
    let onset = read_u32_e(rd, big_endian).map_err(|_| bad_header())?;
    let _length = read_u32_e(rd, big_endian).map_err(|_| bad_header())?;
    let format = read_u32_e(rd, big_endian).map_err(|_| bad_header())?;
    let sample_rate = read_u32_e(rd, big_endian).map_err(|_| bad_header())?;
    let channels = read_u32_e(rd, big_endian).map_err(|_| bad_header())?;
    let bytes_per_sample = match format {
        FORMAT_LINEAR_16 => 2,
        FORMAT_LINEAR_24 => 3,
        FORMAT_FLOAT => 4,
        _ => return Err(bad_header()),
    };
    Ok(SoundfileInfo {
        sample_rate,
        channels: channels as usize,
        bytes_per_sample,
        header_size: u64::from(onset),
        big_endian,
        byte_limit: UNLIMITED_BYTES,
    })
}

pub(super) fn write_header<W: Write>(w: &mut W, info: &SoundfileInfo) -> R<u64> {
    let format = match info.bytes_per_sample {
        3 => FORMAT_LINEAR_24,
        4 => FORMAT_FLOAT,
        _ => FORMAT_LINEAR_16,
    };
    w.write_all(if info.big_endian { b".snd" } else { b"dns." })?;
    write_u32_e(w, HEADER_SIZE as u32, info.big_endian)?;
    write_u32_e(w, 0, info.big_endian)?; // length, patched on finalize
    write_u32_e(w, format, info.big_endian)?;
    write_u32_e(w, info.sample_rate, info.big_endian)?;
    write_u32_e(w, info.channels as u32, info.big_endian)?;
    w.write_all(b"Pd \0")?;
    Ok(HEADER_SIZE)
}

/// Rewrite the length field with the payload byte count.
pub(super) fn finalize(file: &mut std::fs::File, big_endian: bool, data_bytes: u64) -> R<()> {
    file.seek(SeekFrom::Start(8))?;
    let length = u32::try_from(data_bytes).unwrap_or(UNKNOWN_LENGTH);
    write_u32_e(file, length, big_endian)?;
    Ok(())
}
