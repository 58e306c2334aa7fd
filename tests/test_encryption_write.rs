//! Integration tests for encrypted PDF output.
//!
//! Reads the `/Encrypt` dictionary and trailer `/ID` back out of the
//! written file and checks that the user password authenticates.

use printflow::encryption::algorithms::authenticate_user_password;
use printflow::encryption::Permissions;
use printflow::{export_to_vec, Document, Element, EncryptionConfig, ExportConfig, FixedMetrics, Node, Style};
use regex::bytes::Regex;

fn doc() -> Document {
    let metrics = FixedMetrics::default();
    Document::new(vec![
        Node::block(Element::Heading(1), "Secret Chapter", Style::default(), &metrics),
        Node::block(Element::Paragraph, "Confidential body text.", Style::default(), &metrics),
    ])
    .with_title("Locked")
}

fn hex(bytes: &[u8]) -> Vec<u8> {
    let text = std::str::from_utf8(bytes).unwrap();
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap())
        .collect()
}

fn capture<'a>(pattern: &str, out: &'a [u8]) -> &'a [u8] {
    Regex::new(pattern)
        .unwrap()
        .captures(out)
        .unwrap_or_else(|| panic!("no match for {pattern}"))
        .get(1)
        .unwrap()
        .as_bytes()
}

fn check_user_password(out: &[u8], password: &str, revision: u32, key_length: usize) -> bool {
    let owner = hex(capture(r"/O <([0-9A-F]{64})>", out));
    let user = hex(capture(r"/U <([0-9A-F]{64})>", out));
    let p: i32 = std::str::from_utf8(capture(r"/P (-?\d+)", out)).unwrap().parse().unwrap();
    let id = hex(capture(r"/ID\[<([0-9A-Fa-f]{32})>", out));
    authenticate_user_password(password.as_bytes(), &user, &owner, p, &id, revision, key_length).is_some()
}

mod rc4_tests {
    use super::*;

    #[test]
    fn test_rc4_128_dictionary() {
        let config = ExportConfig::default()
            .with_compression(0)
            .with_encryption(EncryptionConfig::default().with_user_password("reader"));
        let out = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/Filter /Standard"));
        assert!(text.contains("/V 2"));
        assert!(text.contains("/R 3"));
        assert!(text.contains("/Length 128"));
        assert!(check_user_password(&out, "reader", 3, 16));
        assert!(!check_user_password(&out, "wrong", 3, 16));
    }

    #[test]
    fn test_rc4_40_dictionary() {
        let config = ExportConfig::default().with_compression(0).with_encryption(
            EncryptionConfig::default()
                .with_user_password("reader")
                .with_owner_password("owner")
                .with_key_bits(40),
        );
        let out = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/V 1"));
        assert!(text.contains("/R 2"));
        assert!(!text.contains("/Length 40"));
        assert!(check_user_password(&out, "reader", 2, 5));
    }

    #[test]
    fn test_empty_user_password_opens() {
        let config = ExportConfig::default()
            .with_encryption(EncryptionConfig::default().with_owner_password("owner"));
        let out = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap();
        assert!(check_user_password(&out, "", 3, 16));
    }

    #[test]
    fn test_content_is_not_plaintext() {
        let config = ExportConfig::default()
            .with_compression(0)
            .with_encryption(EncryptionConfig::default().with_user_password("reader"));
        let out = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(!text.contains("Confidential"));
        assert!(!text.contains("(Secret Chapter)"));
        assert!(!text.contains("(Locked)"));
    }

    #[test]
    fn test_restricted_permissions_value() {
        let config = ExportConfig::default().with_encryption(
            EncryptionConfig::default().with_permissions(Permissions::PRINT | Permissions::COPY),
        );
        let out = export_to_vec(&doc(), &config, &FixedMetrics::default()).unwrap();
        let p: i32 = std::str::from_utf8(capture(r"/P (-?\d+)", &out)).unwrap().parse().unwrap();
        assert_ne!(p & (1 << 2), 0);
        assert_ne!(p & (1 << 4), 0);
        assert_eq!(p & (1 << 3), 0);
        assert_eq!(p & (1 << 5), 0);
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_unsupported_key_length_rejected() {
        let config = ExportConfig::default()
            .with_encryption(EncryptionConfig::default().with_key_bits(256));
        assert!(export_to_vec(&doc(), &config, &FixedMetrics::default()).is_err());
    }
}
