//! 80-bit IEEE extended sample rates, as found in the AIFF `COMM` chunk.
//!
//! Audio sample rates are small positive integers, so only a narrow slice
//! of the extended format is ever exercised; both directions below are
//! restricted to that slice and are exact for it.

/// Recover an integer sample rate from a big-endian 80-bit extended number.
///
/// Layout is `[sign|exp_hi, exp_lo, mant0..mant7]`. Only the top 32
/// mantissa bits matter at audio rates. The mantissa is shifted down
/// `30 - exp_lo` places, rounding up when the last bit shifted out was
/// set; that rounding is what makes 44100 survive a round trip.
pub fn read_sample_rate(bytes: &[u8; 10]) -> u32 {
    let mut mantissa = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let mut last = 0u32;
    let shift = 30u8.wrapping_sub(bytes[1]);
    for _ in 0..shift {
        last = mantissa;
        mantissa >>= 1;
    }
    if last & 1 != 0 {
        mantissa += 1;
    }
    mantissa
}

/// Encode a positive sample rate as a big-endian 80-bit extended number.
///
/// The rate is decomposed as `mantissa * 2^(exponent - 32)` with the
/// mantissa normalized into `[2^31, 2^32)`; the biased exponent
/// (`exponent + 16382`) fills the first two bytes, the mantissa the next
/// four, and the low mantissa bytes stay zero.
pub fn write_sample_rate(rate: f64, out: &mut [u8; 10]) {
    debug_assert!(rate > 0.0);
    // f64 stores rate = frac * 2^exponent with frac in [0.5, 1)
    let exponent = ((rate.to_bits() >> 52) & 0x7ff) as i32 - 1022;
    let frac = rate / f64::powi(2.0, exponent);
    let mantissa = (frac * 4_294_967_296.0) as u32;
    out[0..2].copy_from_slice(&((exponent + 16382) as u16).to_be_bytes());
    out[2..6].copy_from_slice(&mantissa.to_be_bytes());
    out[6..10].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(rate: u32) -> u32 {
        let mut buf = [0u8; 10];
        write_sample_rate(rate as f64, &mut buf);
        read_sample_rate(&buf)
    }

    #[test]
    fn common_rates_roundtrip() {
        for rate in [8000, 11025, 22050, 44100, 48000, 88200, 96000] {
            assert_eq!(roundtrip(rate), rate);
        }
    }

    #[test]
    fn known_encodings() {
        // Reference bytes for the usual studio rates.
        let expect: [(u32, [u8; 4]); 4] = [
            (44100, [0x40, 0x0E, 0xAC, 0x44]),
            (48000, [0x40, 0x0E, 0xBB, 0x80]),
            (88200, [0x40, 0x0F, 0xAC, 0x44]),
            (96000, [0x40, 0x0F, 0xBB, 0x80]),
        ];
        for (rate, head) in expect {
            let mut buf = [0u8; 10];
            write_sample_rate(rate as f64, &mut buf);
            assert_eq!(&buf[0..4], &head, "rate {rate}");
            assert_eq!(&buf[4..10], &[0u8; 6], "rate {rate}");
        }
    }

    #[test]
    fn rounds_up_on_evicted_one() {
        // 44100 encoded: mantissa 0xAC440000, exp_lo 0x0E, shift 16.
        // Force an odd bit into the last evicted position and check the
        // reader rounds up instead of truncating.
        let mut buf = [0u8; 10];
        write_sample_rate(44100.0, &mut buf);
        buf[4] = 0x80; // mantissa 0xAC448000: bit 15 is the last evicted bit
        assert_eq!(read_sample_rate(&buf), 44101);
    }
}
