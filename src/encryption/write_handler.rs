//! Per-object encryption for the PDF writer.

use super::rc4::{rc4_crypt, Rc4Cipher};
use super::Algorithm;
use md5::{Digest, Md5};

/// Encrypts the strings and streams of each indirect object.
///
/// Every string and every stream starts from a fresh RC4 state keyed by
/// the owning object's number.
#[derive(Debug, Clone)]
pub struct EncryptionWriteHandler {
    /// File encryption key
    encryption_key: Vec<u8>,
    /// Algorithm in use
    algorithm: Algorithm,
}

impl EncryptionWriteHandler {
    /// Create a handler from a derived file key.
    pub fn from_key(encryption_key: Vec<u8>, algorithm: Algorithm) -> Self {
        Self {
            encryption_key,
            algorithm,
        }
    }

    /// Object key: MD5 of the file key, the low three bytes of the object
    /// number and a zero generation, cut to `min(n + 5, 16)` bytes.
    pub fn object_key(&self, obj_num: u32) -> Vec<u8> {
        let mut hasher = Md5::new();
        hasher.update(&self.encryption_key);
        hasher.update(&obj_num.to_le_bytes()[..3]);
        hasher.update(0u16.to_le_bytes());
        let hash = hasher.finalize();
        let key_length = (self.encryption_key.len() + 5).min(16);
        hash[..key_length].to_vec()
    }

    /// Encrypt a string belonging to object `obj_num`.
    pub fn encrypt_string(&self, data: &[u8], obj_num: u32) -> Vec<u8> {
        rc4_crypt(&self.object_key(obj_num), data)
    }

    /// Fresh cipher for a stream belonging to object `obj_num`.
    pub(crate) fn stream_cipher(&self, obj_num: u32) -> Rc4Cipher {
        Rc4Cipher::new(&self.object_key(obj_num))
    }

    /// Algorithm in use.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// File encryption key.
    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }
}
