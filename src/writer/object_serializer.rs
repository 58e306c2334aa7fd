//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! PDF specification ISO 32000-1:2008.

use crate::encryption::EncryptionWriteHandler;
use crate::object::{Object, ObjectRef};
use std::collections::HashMap;
use std::io::{self, Write};

/// Width of the `/Length` placeholder written before stream data.
pub const LENGTH_PLACEHOLDER_WIDTH: usize = 10;

/// Serializer for PDF objects.
///
/// Converts PDF Object types to their byte representation following
/// the PDF specification syntax rules. Dictionary keys are written in
/// sorted order so output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

/// Encryption context of the object being written: the handler and the
/// owning object's number.
pub type Crypt<'a> = Option<(&'a EncryptionWriteHandler, u32)>;

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_object(&mut buf, obj, None);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Write an indirect object definition.
    ///
    /// Format: `{id} 0 obj\n{object}\nendobj\n`. Strings inside the object
    /// are encrypted with the object's key when a handler is given.
    pub fn write_indirect<W: Write>(
        &self,
        w: &mut W,
        id: u32,
        obj: &Object,
        handler: Option<&EncryptionWriteHandler>,
    ) -> io::Result<()> {
        writeln!(w, "{} 0 obj", id)?;
        self.write_object(w, obj, handler.map(|h| (h, id)))?;
        write!(w, "\nendobj\n")
    }

    /// Write the head of a stream object: the object header, its dictionary
    /// with a zeroed `/Length` placeholder, and the `stream` keyword.
    ///
    /// Returns the offset of the placeholder digits within `buf`, to be
    /// patched once the stream data is known.
    pub fn begin_stream(
        &self,
        buf: &mut Vec<u8>,
        id: u32,
        dict: &Object,
        handler: Option<&EncryptionWriteHandler>,
    ) -> io::Result<usize> {
        writeln!(buf, "{} 0 obj", id)?;
        write!(buf, "<<")?;
        if let Object::Dictionary(entries) = dict {
            self.write_entries(buf, entries, handler.map(|h| (h, id)))?;
        }
        if !self.compact {
            write!(buf, "\n  ")?;
        }
        write!(buf, "/Length ")?;
        let placeholder = buf.len();
        buf.extend_from_slice(&[b'0'; LENGTH_PLACEHOLDER_WIDTH]);
        if !self.compact {
            writeln!(buf)?;
        }
        write!(buf, ">>\nstream\n")?;
        Ok(placeholder)
    }

    /// Close a stream object opened with [`begin_stream`](Self::begin_stream).
    pub fn end_stream<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "\nendstream\nendobj\n")
    }

    /// Write an object, encrypting strings when a context is given.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object, crypt: Crypt<'_>) -> io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => match crypt {
                Some((handler, obj_num)) => self.write_string(w, &handler.encrypt_string(s, obj_num)),
                None => self.write_string(w, s),
            },
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr, crypt),
            Object::Dictionary(dict) => self.write_dictionary(w, dict, crypt),
            Object::Reference(r) => write!(w, "{} 0 R", r.id),
        }
    }

    /// Write a real number with appropriate precision.
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> io::Result<()> {
        if value.fract() == 0.0 {
            write!(w, "{}", value as i64)
        } else {
            // Format with enough precision, then trim trailing zeros
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }

    /// Write a PDF string.
    ///
    /// Uses literal string syntax `(...)` with proper escaping,
    /// or hex string syntax `<...>` for binary data.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Write a PDF name.
    ///
    /// Names start with `/` and escape special characters with `#xx`.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> io::Result<()> {
        write!(w, "/")?;
        for byte in name.bytes() {
            match byte {
                b'!'
                | b'"'
                | b'$'..=b'&'
                | b'\''..=b'.'
                | b'0'..=b'9'
                | b';'
                | b'<'
                | b'>'
                | b'?'
                | b'@'
                | b'A'..=b'Z'
                | b'^'..=b'z'
                | b'|'
                | b'~' => {
                    w.write_all(&[byte])?;
                },
                _ => {
                    write!(w, "#{:02X}", byte)?;
                },
            }
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object], crypt: Crypt<'_>) -> io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj, crypt)?;
        }
        write!(w, "]")
    }

    fn write_dictionary<W: Write>(
        &self,
        w: &mut W,
        dict: &HashMap<String, Object>,
        crypt: Crypt<'_>,
    ) -> io::Result<()> {
        write!(w, "<<")?;
        self.write_entries(w, dict, crypt)?;
        if !self.compact && !dict.is_empty() {
            writeln!(w)?;
        }
        write!(w, ">>")
    }

    fn write_entries<W: Write>(
        &self,
        w: &mut W,
        dict: &HashMap<String, Object>,
        crypt: Crypt<'_>,
    ) -> io::Result<()> {
        // Sort keys for deterministic output
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(value) = dict.get(key) {
                if !self.compact {
                    write!(w, "\n  ")?;
                }
                self.write_name(w, key)?;
                write!(w, " ")?;
                self.write_object(w, value, crypt)?;
            }
        }
        Ok(())
    }
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a String object from a Rust string.
    pub fn string(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec())
    }

    /// Create an Integer object.
    pub fn integer(i: i64) -> Object {
        Object::Integer(i)
    }

    /// Create a Real object.
    pub fn real(r: f64) -> Object {
        Object::Real(r)
    }

    /// Create a Boolean object.
    pub fn boolean(b: bool) -> Object {
        Object::Boolean(b)
    }

    /// Create an Array object.
    pub fn array(items: Vec<Object>) -> Object {
        Object::Array(items)
    }

    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        let map: HashMap<String, Object> = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Object::Dictionary(map)
    }

    /// Create a Reference object.
    pub fn reference(id: u32) -> Object {
        Object::Reference(ObjectRef::new(id))
    }

    /// Create a rectangle array [x, y, width, height] -> [llx, lly, urx, ury].
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Object {
        Object::Array(vec![
            Object::Real(x),
            Object::Real(y),
            Object::Real(x + width),
            Object::Real(y + height),
        ])
    }
}
