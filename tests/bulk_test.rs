use sndstream::args::{ReadArgs, WriteArgs};
use sndstream::bulk;
use tempfile::tempdir;

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes.try_into().unwrap())
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(bytes.try_into().unwrap())
}

#[test]
fn wave_write_is_bit_exact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pair.wav");
    let left = vec![0.0f32, 0.5, -0.5, 1.0];
    let right = vec![0.0f32, -0.5, 0.5, -1.0];

    let args = WriteArgs::for_file(path.to_str().unwrap());
    let outcome = bulk::write(&args, &[&left, &right]).unwrap();
    assert_eq!(outcome.frames_written, 4);
    assert_eq!(outcome.info.header_size, 44);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 60);
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(le_u32(&bytes[4..8]), 52); // 16 payload bytes + 36
    assert_eq!(&bytes[8..12], b"WAVE");
    assert_eq!(le_u32(&bytes[40..44]), 16);
    let words: Vec<i16> = bytes[44..]
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(
        words,
        vec![0, 0, 16384, -16384, -16384, 16384, 32767, -32767]
    );
}

#[test]
fn wave_reads_back_with_resize() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pair.wav");
    let left = vec![0.0f32, 0.5, -0.5, 1.0];
    let right = vec![0.0f32, -0.5, 0.5, -1.0];
    let args = WriteArgs::for_file(path.to_str().unwrap());
    bulk::write(&args, &[&left, &right]).unwrap();

    let mut rargs = ReadArgs::for_file(path.to_str().unwrap());
    rargs.resize = true;
    let mut vecs = vec![Vec::new(), Vec::new()];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();

    assert_eq!(outcome.frames_read, 4);
    assert_eq!(outcome.info.sample_rate, 44100);
    assert_eq!(outcome.info.header_size, 44);
    assert_eq!(outcome.info.channels, 2);
    assert_eq!(outcome.info.bytes_per_sample, 2);
    assert_eq!(outcome.info.endian_char(), 'l');
    assert_eq!(vecs[0].len(), 4);
    assert_eq!(vecs[1].len(), 4);
    for (want, got) in left.iter().chain(&right).zip(vecs[0].iter().chain(&vecs[1])) {
        assert!((want - got).abs() <= 1.0 / 32768.0, "{want} vs {got}");
    }
}

#[test]
fn aiff_single_sample_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("one.aif");
    let (args, _) =
        WriteArgs::parse(&["-aiff", "-bytes", "3", "-rate", "48000", path.to_str().unwrap()])
            .unwrap();
    let v = vec![1.0f32];
    let outcome = bulk::write(&args, &[&v]).unwrap();
    assert_eq!(outcome.frames_written, 1);
    assert_eq!(outcome.info.header_size, 54);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 57);
    assert_eq!(&bytes[0..4], b"FORM");
    assert_eq!(be_u32(&bytes[4..8]), 49); // 3 payload bytes + 46
    assert_eq!(&bytes[8..12], b"AIFF");
    assert_eq!(&bytes[12..16], b"COMM");
    assert_eq!(be_u32(&bytes[16..20]), 18);
    assert_eq!(u16::from_be_bytes(bytes[20..22].try_into().unwrap()), 1);
    assert_eq!(be_u32(&bytes[22..26]), 1); // frames
    assert_eq!(u16::from_be_bytes(bytes[26..28].try_into().unwrap()), 24);
    assert_eq!(
        &bytes[28..38],
        &[0x40, 0x0E, 0xBB, 0x80, 0, 0, 0, 0, 0, 0] // 48000 as 80-bit extended
    );
    assert_eq!(&bytes[38..42], b"SSND");
    assert_eq!(be_u32(&bytes[42..46]), 11); // 3 payload bytes + 8
    assert_eq!(be_u32(&bytes[46..50]), 0);
    assert_eq!(be_u32(&bytes[50..54]), 0);
    assert_eq!(&bytes[54..57], &[0x7f, 0xff, 0xff]);
}

#[test]
fn negative_nframes_is_rejected_before_any_file_exists() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.wav");
    assert!(WriteArgs::parse(&["-nframes", "-1", path.to_str().unwrap()]).is_err());
    assert!(!path.exists());
}

#[test]
fn read_honors_the_data_chunk_byte_limit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.wav");
    let samples: Vec<f32> = (0..6).map(|i| i as f32 / 8.0).collect();
    let args = WriteArgs::for_file(path.to_str().unwrap());
    bulk::write(&args, &[&samples]).unwrap();

    // undersell the payload: claim 4 bytes (2 frames) in the data chunk
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[40..44].copy_from_slice(&4u32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let mut rargs = ReadArgs::for_file(path.to_str().unwrap());
    rargs.resize = true;
    let mut vecs = vec![Vec::new()];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();
    assert_eq!(outcome.frames_read, 2);
    assert_eq!(vecs[0].len(), 2);
}

#[test]
fn read_honors_maxsize_and_skip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ramp.wav");
    let samples: Vec<f32> = (0..8).map(|i| i as f32 / 16.0).collect();
    let args = WriteArgs::for_file(path.to_str().unwrap());
    bulk::write(&args, &[&samples]).unwrap();

    let (rargs, _) =
        ReadArgs::parse(&["-skip", "2", "-maxsize", "3", path.to_str().unwrap(), "tab"]).unwrap();
    let mut vecs = vec![Vec::new()];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();
    assert_eq!(outcome.frames_read, 3);
    assert_eq!(vecs[0].len(), 3);
    for (i, got) in vecs[0].iter().enumerate() {
        let want = (i + 2) as f32 / 16.0;
        assert!((want - got).abs() <= 1.0 / 32768.0);
    }
}

#[test]
fn raw_layout_reads_headerless_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("noise.pcm");
    let mut bytes = Vec::new();
    for i in 0i16..8 {
        bytes.extend_from_slice(&(i * 1024).to_le_bytes());
    }
    std::fs::write(&path, &bytes).unwrap();

    let (mut rargs, _) =
        ReadArgs::parse(&["-raw", "0", "1", "2", "l", path.to_str().unwrap(), "tab"]).unwrap();
    rargs.resize = true;
    let mut vecs = vec![Vec::new()];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();
    assert_eq!(outcome.frames_read, 8);
    for (i, got) in vecs[0].iter().enumerate() {
        let want = (i as f32 * 1024.0) / 32768.0;
        assert!((want - got).abs() <= 1.0 / 32768.0);
    }
}

#[test]
fn surplus_destination_vectors_are_zeroed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    let samples = vec![0.5f32; 4];
    let args = WriteArgs::for_file(path.to_str().unwrap());
    bulk::write(&args, &[&samples]).unwrap();

    let mut rargs = ReadArgs::for_file(path.to_str().unwrap());
    rargs.resize = true;
    let mut vecs = vec![vec![9.0f32; 2], vec![9.0f32; 2]];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();
    assert_eq!(outcome.frames_read, 4);
    assert!(vecs[0].iter().all(|s| (s - 0.5).abs() <= 1.0 / 32768.0));
    assert!(vecs[1].iter().all(|s| *s == 0.0));
}

#[test]
fn normalizing_scales_the_peak_to_full_scale() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hot.wav");
    let samples = vec![2.0f32, -1.0];
    let (args, _) = WriteArgs::parse(&["-normalize", path.to_str().unwrap()]).unwrap();
    bulk::write(&args, &[&samples]).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let words: Vec<i16> = bytes[44..]
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(words, vec![32767, -16384]);

    // an integer depth normalizes on its own rather than clip
    let path2 = dir.path().join("hot2.wav");
    let args2 = WriteArgs::for_file(path2.to_str().unwrap());
    bulk::write(&args2, &[&samples]).unwrap();
    let bytes2 = std::fs::read(&path2).unwrap();
    assert_eq!(&bytes2[44..], &bytes[44..]);
}

#[test]
fn ascii_reads_interleaved_text() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frames.txt");
    std::fs::write(&path, "0 0.5\n-0.5 1\n-1 0.25\n").unwrap();

    let (rargs, _) =
        ReadArgs::parse(&["-ascii", "-resize", path.to_str().unwrap(), "a", "b"]).unwrap();
    let mut vecs = vec![Vec::new(), Vec::new()];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();
    assert_eq!(outcome.frames_read, 3);
    assert_eq!(vecs[0], vec![0.0, -0.5, -1.0]);
    assert_eq!(vecs[1], vec![0.5, 1.0, 0.25]);
}

#[test]
fn nextstep_roundtrips_floats_exactly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("float.snd");
    let samples: Vec<f32> = (0..32).map(|i| ((i * 37) as f32).sin()).collect();
    let (args, _) =
        WriteArgs::parse(&["-nextstep", "-bytes", "4", path.to_str().unwrap()]).unwrap();
    bulk::write(&args, &[&samples]).unwrap();

    let mut rargs = ReadArgs::for_file(path.to_str().unwrap());
    rargs.resize = true;
    let mut vecs = vec![Vec::new()];
    let outcome = bulk::read(&rargs, &mut vecs).unwrap();
    assert_eq!(outcome.frames_read, 32);
    assert_eq!(vecs[0], samples);
    assert_eq!(outcome.info.header_size, 28);
}
