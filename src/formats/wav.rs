use crate::formats::{SoundfileInfo, bad_header};
use crate::prelude::*;

// Format tags
const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

// RIFF + size + WAVE, then fmt and data chunk headers
const PREAMBLE_SIZE: u64 = 12;
const FMT_CHUNK_SIZE: u32 = 16;
const HEADER_SIZE: u64 = 44;

/// Walk the RIFF chunks until the `data` chunk.
///
/// Unknown chunks are skipped with the even-byte padding rule. A `fmt `
/// chunk appearing after `data` is never seen; until one is seen the
/// layout defaults to mono 16-bit at 44100 Hz.
pub(super) fn parse<T: Read + Seek>(rd: &mut T) -> R<SoundfileInfo> {
    let mut info = SoundfileInfo {
        sample_rate: 44100,
        channels: 1,
        bytes_per_sample: 2,
        header_size: 0,
        big_endian: false,
        byte_limit: 0,
    };
    rd.seek(SeekFrom::Start(PREAMBLE_SIZE))?;
    loop {
        let mut id = [0u8; 4];
        rd.read_exact(&mut id).map_err(|_| bad_header())?;
        let size = u64::from(rd.read_u32::<LittleEndian>().map_err(|_| bad_header())?);
        let payload = rd.stream_position()?;
        match &id {
            b"data" => {
                info.header_size = payload;
                info.byte_limit = size as i64;
                return Ok(info);
            }
            b"fmt " => {
                if size < u64::from(FMT_CHUNK_SIZE) {
                    return Err(bad_header());
                }
                let _format_tag = rd.read_u16::<LittleEndian>().map_err(|_| bad_header())?;
                info.channels =
                    usize::from(rd.read_u16::<LittleEndian>().map_err(|_| bad_header())?);
                info.sample_rate = rd.read_u32::<LittleEndian>().map_err(|_| bad_header())?;
                let _avg_bytes_per_sec = rd.read_u32::<LittleEndian>().map_err(|_| bad_header())?;
                let _block_align = rd.read_u16::<LittleEndian>().map_err(|_| bad_header())?;
                let bits = rd.read_u16::<LittleEndian>().map_err(|_| bad_header())?;
                info.bytes_per_sample = match bits {
                    16 => 2,
                    24 => 3,
                    32 => 4,
                    _ => return Err(bad_header()),
                };
            }
            _ => {}
        }
        rd.seek(SeekFrom::Start(payload + size + (size & 1)))?;
    }
}

pub(super) fn write_header<W: Write>(w: &mut W, info: &SoundfileInfo, frames: u64) -> R<u64> {
    let data_bytes = frames * info.bytes_per_frame() as u64;
    let format_tag = if info.bytes_per_sample == 4 {
        FORMAT_IEEE_FLOAT
    } else {
        FORMAT_PCM
    };
    w.write_all(b"RIFF")?;
    w.write_u32::<LittleEndian>((data_bytes + HEADER_SIZE - 8) as u32)?;
    w.write_all(b"WAVE")?;
    w.write_all(b"fmt ")?;
    w.write_u32::<LittleEndian>(FMT_CHUNK_SIZE)?;
    w.write_u16::<LittleEndian>(format_tag)?;
    w.write_u16::<LittleEndian>(info.channels as u16)?;
    w.write_u32::<LittleEndian>(info.sample_rate)?;
    w.write_u32::<LittleEndian>(info.sample_rate * info.bytes_per_frame() as u32)?;
    w.write_u16::<LittleEndian>(info.bytes_per_frame() as u16)?;
    w.write_u16::<LittleEndian>(8 * info.bytes_per_sample as u16)?;
    w.write_all(b"data")?;
    w.write_u32::<LittleEndian>(data_bytes as u32)?;
    Ok(HEADER_SIZE)
}

/// Rewrite the RIFF and `data` chunk sizes to the payload actually written.
pub(super) fn finalize(file: &mut std::fs::File, data_bytes: u64) -> R<()> {
    file.seek(SeekFrom::Start(4))?;
    file.write_u32::<LittleEndian>((data_bytes + HEADER_SIZE - 8) as u32)?;
    file.seek(SeekFrom::Start(40))?;
    file.write_u32::<LittleEndian>(data_bytes as u32)?;
    Ok(())
}
