//! CRC32 as used by the GPT headers (ISO-HDLC, reflected polynomial `0xEDB88320`)

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

use crate::raw::ZEROES;

/// The 256 entries lookup table is computed at compile time and only ever read afterwards.
static GPT_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the CRC32 of a byte slice
#[must_use]
pub fn compute(bytes: &[u8]) -> u32 {
    GPT_CRC.checksum(bytes)
}

pub(crate) fn digest() -> Digest<'static, u32> {
    GPT_CRC.digest()
}

/// Feeds `len` zero bytes to the digest without allocating them
pub(crate) fn update_zeroes(digest: &mut Digest<'_, u32>, len: u64) {
    let mut remaining = len;

    while remaining > 0 {
        let chunk = usize::try_from(remaining).map_or(ZEROES.len(), |r| r.min(ZEROES.len()));

        digest.update(&ZEROES[..chunk]);
        remaining -= chunk as u64;
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::{compute, digest, update_zeroes};

    #[test]
    fn check_value() {
        assert_eq!(compute(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn empty() {
        assert_eq!(compute(&[]), 0);
    }

    #[test]
    fn deterministic() {
        let data = b"EFI PART\x00\x00\x01\x00";

        assert_eq!(compute(data), compute(data));
    }

    #[test]
    fn single_bit_flip() {
        let data = [0x5a_u8; 92];
        let reference = compute(&data);

        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut corrupted = data;
                corrupted[byte] ^= 1 << bit;

                assert_ne!(compute(&corrupted), reference, "Flip of bit {bit} in byte {byte}");
            }
        }
    }

    #[test]
    fn streamed_zeroes() {
        let mut data = vec![0xa5_u8; 92];
        data.resize(92 + 1000, 0);

        let mut streamed = digest();
        streamed.update(&[0xa5; 92]);
        update_zeroes(&mut streamed, 1000);

        assert_eq!(streamed.finalize(), compute(&data));
    }
}
