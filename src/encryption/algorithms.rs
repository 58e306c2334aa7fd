//! Standard Security Handler key derivation (revisions 2 and 3).
//!
//! PDF Spec: Section 7.6.3, Algorithms 2 to 5.

use super::rc4::rc4_crypt;
use md5::{Digest, Md5};

/// Padding string used to extend passwords to 32 bytes.
pub(crate) const PADDING: &[u8; 32] = b"\x28\xBF\x4E\x5E\x4E\x75\x8A\x41\
                                        \x64\x00\x4E\x56\xFF\xFA\x01\x08\
                                        \x2E\x2E\x00\xB6\xD0\x68\x3E\x80\
                                        \x2F\x0C\xA9\xFE\x64\x53\x69\x7A";

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// MD5 digest, rehashed fifty times over its first `key_length` bytes for
/// revision 3.
fn stretch(mut hash: Vec<u8>, revision: u32, key_length: usize) -> Vec<u8> {
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_length]).to_vec();
        }
    }
    hash
}

/// RC4 applied once (revision 2) or twenty times with the key XORed by the
/// round number (revision 3).
fn rc4_rounds(key: &[u8], data: &[u8], revision: u32) -> Vec<u8> {
    let mut result = rc4_crypt(key, data);
    if revision >= 3 {
        for round in 1..=19u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
            result = rc4_crypt(&round_key, &result);
        }
    }
    result
}

/// Compute the `/O` value (Algorithm 3).
///
/// An empty owner password falls back to the user password.
pub fn compute_owner_password_hash(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u32,
    key_length: usize,
) -> [u8; 32] {
    let password = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let hash = stretch(Md5::digest(pad_password(password)).to_vec(), revision, key_length);
    let rc4_key = &hash[..key_length];

    let mut owner = [0u8; 32];
    owner.copy_from_slice(&rc4_rounds(rc4_key, &pad_password(user_password), revision));
    owner
}

/// Compute the file encryption key (Algorithm 2).
pub fn compute_encryption_key(
    user_password: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(user_password));
    hasher.update(owner_hash);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    let hash = stretch(hasher.finalize().to_vec(), revision, key_length);
    hash[..key_length].to_vec()
}

/// Compute the `/U` value (Algorithm 4 for revision 2, 5 for revision 3).
pub fn compute_user_password_hash(key: &[u8], file_id: &[u8], revision: u32) -> [u8; 32] {
    let mut user = [0u8; 32];
    if revision >= 3 {
        let mut hasher = Md5::new();
        hasher.update(PADDING);
        hasher.update(file_id);
        let digest = hasher.finalize();
        let mut hash = rc4_crypt(key, &digest);
        for round in 1..=19u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
            hash = rc4_crypt(&round_key, &hash);
        }
        // The remaining 16 bytes are arbitrary padding.
        user[..16].copy_from_slice(&hash);
        user[16..].copy_from_slice(&PADDING[..16]);
    } else {
        user.copy_from_slice(&rc4_crypt(key, PADDING));
    }
    user
}

/// Check a user password against a `/U` value, returning the file key.
///
/// Revision 3 compares only the first 16 bytes.
pub fn authenticate_user_password(
    password: &[u8],
    user_hash: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
) -> Option<Vec<u8>> {
    let key = compute_encryption_key(password, owner_hash, permissions, file_id, revision, key_length);
    let expected = compute_user_password_hash(&key, file_id, revision);
    let compared = if revision >= 3 { 16 } else { 32 };
    if user_hash.len() >= compared && constant_time_eq(&user_hash[..compared], &expected[..compared]) {
        Some(key)
    } else {
        None
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// File identifier: MD5 over the title, the creation time and the page count.
pub fn compute_file_id(title: &str, created: i64, pages: usize) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(title.as_bytes());
    hasher.update(created.to_le_bytes());
    hasher.update((pages as u64).to_le_bytes());
    let mut id = [0u8; 16];
    id.copy_from_slice(&hasher.finalize());
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password() {
        assert_eq!(pad_password(b""), *PADDING);
        let padded = pad_password(b"abc");
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(&padded[3..], &PADDING[..29]);
        let long = [b'x'; 40];
        assert_eq!(pad_password(&long), [b'x'; 32]);
    }

    #[test]
    fn test_owner_hash_defaults_to_user_password() {
        let a = compute_owner_password_hash(b"", b"user", 3, 16);
        let b = compute_owner_password_hash(b"user", b"user", 3, 16);
        assert_eq!(a, b);
        let c = compute_owner_password_hash(b"owner", b"user", 3, 16);
        assert_ne!(a, c);
    }

    #[test]
    fn test_user_password_round_trip_r2() {
        let id = compute_file_id("Doc", 1_700_000_000, 3);
        let owner = compute_owner_password_hash(b"owner", b"secret", 2, 5);
        let key = compute_encryption_key(b"secret", &owner, -4, &id, 2, 5);
        assert_eq!(key.len(), 5);
        let user = compute_user_password_hash(&key, &id, 2);

        assert_eq!(authenticate_user_password(b"secret", &user, &owner, -4, &id, 2, 5), Some(key));
        assert_eq!(authenticate_user_password(b"wrong", &user, &owner, -4, &id, 2, 5), None);
    }

    #[test]
    fn test_user_password_round_trip_r3() {
        let id = compute_file_id("Doc", 1_700_000_000, 3);
        let owner = compute_owner_password_hash(b"", b"", 3, 16);
        let key = compute_encryption_key(b"", &owner, -3904, &id, 3, 16);
        assert_eq!(key.len(), 16);
        let user = compute_user_password_hash(&key, &id, 3);

        assert!(authenticate_user_password(b"", &user, &owner, -3904, &id, 3, 16).is_some());
        // Permission bits are bound into the key.
        assert!(authenticate_user_password(b"", &user, &owner, -4, &id, 3, 16).is_none());
    }

    #[test]
    fn test_file_id_depends_on_inputs() {
        let a = compute_file_id("A", 1, 1);
        assert_eq!(a, compute_file_id("A", 1, 1));
        assert_ne!(a, compute_file_id("B", 1, 1));
        assert_ne!(a, compute_file_id("A", 2, 1));
        assert_ne!(a, compute_file_id("A", 1, 2));
    }
}
