use crate::extended;
use crate::formats::{SoundfileInfo, bad_header};
use crate::prelude::*;

const PREAMBLE_SIZE: u64 = 12;
const COMM_CHUNK_SIZE: u32 = 18;
// FORM..COMM plus the SSND chunk header with its offset/block words
const HEADER_SIZE: u64 = 54;
// audio bytes trail the SSND size field by this much
const SSND_EXTRA: u64 = 8;

/// Walk the FORM chunks until `SSND`; `COMM` supplies the layout.
///
/// The SSND chunk starts with an 8-byte offset/block-size pair, so the
/// payload begins 8 bytes in and the byte limit is the chunk size less 8.
pub(super) fn parse<T: Read + Seek>(rd: &mut T) -> R<SoundfileInfo> {
    let mut info = SoundfileInfo {
        sample_rate: 44100,
        channels: 1,
        bytes_per_sample: 2,
        header_size: 0,
        big_endian: true,
        byte_limit: 0,
    };
    rd.seek(SeekFrom::Start(PREAMBLE_SIZE))?;
    loop {
        let mut id = [0u8; 4];
        rd.read_exact(&mut id).map_err(|_| bad_header())?;
        let size = u64::from(rd.read_u32::<BigEndian>().map_err(|_| bad_header())?);
        let payload = rd.stream_position()?;
        match &id {
            b"SSND" => {
                info.header_size = payload + SSND_EXTRA;
                info.byte_limit = (size as i64 - SSND_EXTRA as i64).max(0);
                return Ok(info);
            }
            b"COMM" => {
                info.channels = usize::from(rd.read_u16::<BigEndian>().map_err(|_| bad_header())?);
                let _frames = rd.read_u32::<BigEndian>().map_err(|_| bad_header())?;
                let bits = rd.read_u16::<BigEndian>().map_err(|_| bad_header())?;
                info.bytes_per_sample = match bits {
                    16 => 2,
                    24 => 3,
                    _ => return Err(bad_header()),
                };
                let mut rate = [0u8; 10];
                rd.read_exact(&mut rate).map_err(|_| bad_header())?;
                info.sample_rate = extended::read_sample_rate(&rate);
            }
            _ => {}
        }
        rd.seek(SeekFrom::Start(payload + size + (size & 1)))?;
    }
}

pub(super) fn write_header<W: Write>(w: &mut W, info: &SoundfileInfo, frames: u64) -> R<u64> {
    if info.bytes_per_sample == 4 {
        return Err(anyhow!("AIFF floating-point file format unavailable"));
    }
    let data_bytes = frames * info.bytes_per_frame() as u64;
    w.write_all(b"FORM")?;
    w.write_u32::<BigEndian>((data_bytes + HEADER_SIZE - 8) as u32)?;
    w.write_all(b"AIFF")?;
    w.write_all(b"COMM")?;
    w.write_u32::<BigEndian>(COMM_CHUNK_SIZE)?;
    w.write_u16::<BigEndian>(info.channels as u16)?;
    w.write_u32::<BigEndian>(frames as u32)?;
    w.write_u16::<BigEndian>(8 * info.bytes_per_sample as u16)?;
    let mut rate = [0u8; 10];
    extended::write_sample_rate(f64::from(info.sample_rate), &mut rate);
    w.write_all(&rate)?;
    w.write_all(b"SSND")?;
    w.write_u32::<BigEndian>((data_bytes + SSND_EXTRA) as u32)?;
    w.write_u32::<BigEndian>(0)?; // offset
    w.write_u32::<BigEndian>(0)?; // block size
    Ok(HEADER_SIZE)
}

/// Rewrite the frame count and both chunk sizes to the payload actually
/// written.
pub(super) fn finalize(file: &mut std::fs::File, frames: u64, data_bytes: u64) -> R<()> {
    file.seek(SeekFrom::Start(4))?;
    file.write_u32::<BigEndian>((data_bytes + HEADER_SIZE - 8) as u32)?;
    file.seek(SeekFrom::Start(22))?;
    file.write_u32::<BigEndian>(frames as u32)?;
    file.seek(SeekFrom::Start(42))?;
    file.write_u32::<BigEndian>((data_bytes + SSND_EXTRA) as u32)?;
    Ok(())
}
