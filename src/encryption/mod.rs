//! PDF encryption (Standard Security Handler, RC4).
//!
//! Supports the two RC4 variants:
//! - RC4-40: `/V 1 /R 2`, PDF 1.1+
//! - RC4-128: `/V 2 /R 3`, PDF 1.4+
//!
//! The file key is derived once per export; each indirect object then gets
//! its own key from the object number (see [`EncryptionWriteHandler`]).
//!
//! # References
//!
//! - PDF Spec Section 7.6.2: General Encryption Algorithm
//! - PDF Spec Section 7.6.3: Standard Security Handler

use crate::config::EncryptionConfig;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::writer::ObjectSerializer;
use serde::{Deserialize, Serialize};

pub mod algorithms;
mod rc4;
mod write_handler;

pub use rc4::rc4_crypt;
pub(crate) use rc4::Rc4Cipher;
pub use write_handler::EncryptionWriteHandler;

/// Encryption algorithm.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4 with a 40-bit key (V=1, R=2)
    Rc4_40,
    /// RC4 with a 128-bit key (V=2, R=3)
    Rc4_128,
}

impl Algorithm {
    /// Select the algorithm for a key length in bits.
    pub fn from_key_bits(bits: u32) -> Result<Self> {
        match bits {
            40 => Ok(Algorithm::Rc4_40),
            128 => Ok(Algorithm::Rc4_128),
            other => Err(Error::Encryption(format!("unsupported key length {}", other))),
        }
    }

    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 => 16,
        }
    }

    /// `(V, R)` pair written to the encryption dictionary.
    pub fn version_revision(&self) -> (u32, u32) {
        match self {
            Algorithm::Rc4_40 => (1, 2),
            Algorithm::Rc4_128 => (2, 3),
        }
    }
}

bitflags::bitflags! {
    /// User access permissions (`/P`).
    ///
    /// PDF Spec: Table 22 - User access permissions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permissions: u32 {
        /// Print the document
        const PRINT = 1 << 2;
        /// Modify the contents
        const MODIFY = 1 << 3;
        /// Copy text and graphics
        const COPY = 1 << 4;
        /// Add or modify annotations
        const ANNOTATE = 1 << 5;
        /// Fill in form fields (R3)
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility (R3)
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Assemble the document (R3)
        const ASSEMBLE = 1 << 10;
        /// High-quality printing (R3)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Signed `/P` value with the reserved bits set for a revision.
    pub fn p_value(&self, revision: u32) -> i32 {
        let reserved: u32 = if revision >= 3 { 0xFFFF_F0C0 } else { 0xFFFF_FFC0 };
        let granted = if revision >= 3 {
            self.bits()
        } else {
            (*self & (Self::PRINT | Self::MODIFY | Self::COPY | Self::ANNOTATE)).bits()
        };
        (reserved | granted) as i32
    }
}

/// Encryption dictionary written to the output (`/Encrypt`).
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptDict {
    /// Algorithm version (`/V`)
    pub version: u32,
    /// Revision (`/R`)
    pub revision: u32,
    /// Key length in bits (`/Length`)
    pub key_bits: u32,
    /// Owner password hash (`/O`)
    pub owner_hash: [u8; 32],
    /// User password hash (`/U`)
    pub user_hash: [u8; 32],
    /// Permission value (`/P`)
    pub permissions: i32,
}

impl EncryptDict {
    /// Build the dictionary object. It is never itself encrypted.
    pub fn to_object(&self) -> Object {
        let mut entries = vec![
            ("Filter", ObjectSerializer::name("Standard")),
            ("V", ObjectSerializer::integer(self.version as i64)),
            ("R", ObjectSerializer::integer(self.revision as i64)),
            ("O", Object::String(self.owner_hash.to_vec())),
            ("U", Object::String(self.user_hash.to_vec())),
            ("P", ObjectSerializer::integer(self.permissions as i64)),
        ];
        if self.version >= 2 {
            entries.push(("Length", ObjectSerializer::integer(self.key_bits as i64)));
        }
        ObjectSerializer::dict(entries)
    }
}

/// Derive the encryption dictionary and object encryptor for one export.
pub fn setup(config: &EncryptionConfig, file_id: &[u8]) -> Result<(EncryptDict, EncryptionWriteHandler)> {
    let algorithm = Algorithm::from_key_bits(config.key_bits)?;
    let (version, revision) = algorithm.version_revision();
    let key_length = algorithm.key_length();
    let permissions = config.permissions.p_value(revision);

    let owner_hash = algorithms::compute_owner_password_hash(
        config.owner_password.as_bytes(),
        config.user_password.as_bytes(),
        revision,
        key_length,
    );
    let key = algorithms::compute_encryption_key(
        config.user_password.as_bytes(),
        &owner_hash,
        permissions,
        file_id,
        revision,
        key_length,
    );
    let user_hash = algorithms::compute_user_password_hash(&key, file_id, revision);
    log::debug!("Encryption: V={} R={} P={}", version, revision, permissions);

    let dict = EncryptDict {
        version,
        revision,
        key_bits: config.key_bits,
        owner_hash,
        user_hash,
        permissions,
    };
    Ok((dict, EncryptionWriteHandler::from_key(key, algorithm)))
}
