//! XTEA block cipher, used to unwrap the username block of the login
//! request. The key is the four client seed words from the RSA block.

const DELTA: u32 = 0x9e37_79b9;
const ROUNDS: u32 = 32;

/// Deciphers whole 8-byte blocks in place. A trailing partial block is
/// passed through untouched.
pub fn decipher(key: &[u32; 4], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();

    for block in out.chunks_exact_mut(8) {
        let mut v0 = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        let mut v1 = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
        let mut sum = DELTA.wrapping_mul(ROUNDS);

        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(key[(sum >> 11 & 3) as usize]),
            );
            sum = sum.wrapping_sub(DELTA);
            v0 = v0.wrapping_sub(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(key[(sum & 3) as usize]),
            );
        }

        block[..4].copy_from_slice(&v0.to_be_bytes());
        block[4..].copy_from_slice(&v1.to_be_bytes());
    }

    out
}

/// Enciphers whole 8-byte blocks in place, the inverse of [`decipher`].
pub fn encipher(key: &[u32; 4], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();

    for block in out.chunks_exact_mut(8) {
        let mut v0 = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        let mut v1 = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
        let mut sum = 0_u32;

        for _ in 0..ROUNDS {
            v0 = v0.wrapping_add(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(key[(sum & 3) as usize]),
            );
            sum = sum.wrapping_add(DELTA);
            v1 = v1.wrapping_add(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(key[(sum >> 11 & 3) as usize]),
            );
        }

        block[..4].copy_from_slice(&v0.to_be_bytes());
        block[4..].copy_from_slice(&v1.to_be_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [0x0011_2233, 0x4455_6677, 0x8899_aabb, 0xccdd_eeff];
        let plain = b"sixteen  bytes!!";

        let ct = encipher(&key, plain);
        assert_ne!(&ct[..], &plain[..]);
        assert_eq!(decipher(&key, &ct), plain);
    }

    #[test]
    fn partial_tail_untouched() {
        let key = [1, 2, 3, 4];
        let data = [0xaa_u8; 11];

        let ct = encipher(&key, &data);
        assert_eq!(&ct[8..], &data[8..]);
        assert_eq!(decipher(&key, &ct), data);
    }

    #[test]
    fn wrong_key_fails() {
        let plain = [7_u8; 8];
        let ct = encipher(&[1, 2, 3, 4], &plain);
        assert_ne!(decipher(&[1, 2, 3, 5], &ct), plain);
    }
}
