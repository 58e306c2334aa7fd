//! RC4 stream cipher.
//!
//! Used both for whole-buffer encryption (key derivation, strings) and as a
//! streaming filter over content and image streams.

/// RC4 cipher state.
#[derive(Clone)]
pub(crate) struct Rc4Cipher {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4Cipher {
    /// Initialize the cipher with a 1..=256 byte key.
    pub(crate) fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, val) in s.iter_mut().enumerate() {
            *val = i as u8;
        }

        if !key.is_empty() {
            let mut j = 0u8;
            for i in 0..256 {
                j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
                s.swap(i, j as usize);
            }
        }

        Self { s, i: 0, j: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let k = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[k as usize]
    }

    /// XOR the keystream into `data`, continuing from the current state.
    pub(crate) fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }
}

impl std::fmt::Debug for Rc4Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4Cipher").finish_non_exhaustive()
    }
}

/// Encrypt or decrypt `data` with a fresh cipher state.
///
/// RC4 is symmetric, so the same call decrypts.
pub fn rc4_crypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut cipher = Rc4Cipher::new(key);
    let mut result = data.to_vec();
    cipher.apply_keystream(&mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc4_known_vector() {
        // Classic test vector: Key / Plaintext.
        let ciphertext = rc4_crypt(b"Key", b"Plaintext");
        assert_eq!(ciphertext, vec![0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn test_rc4_symmetric() {
        let ciphertext = rc4_crypt(b"testkey", b"Hello, World!");
        assert_ne!(&ciphertext[..], b"Hello, World!");
        assert_eq!(rc4_crypt(b"testkey", &ciphertext), b"Hello, World!");
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let expected = rc4_crypt(b"Secret", data);

        let mut cipher = Rc4Cipher::new(b"Secret");
        let mut chunked = data.to_vec();
        let (a, b) = chunked.split_at_mut(10);
        cipher.apply_keystream(a);
        cipher.apply_keystream(b);
        assert_eq!(chunked, expected);
    }

    #[test]
    fn test_rc4_empty() {
        assert!(rc4_crypt(b"k", b"").is_empty());
    }
}
