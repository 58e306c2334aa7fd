//! Object numbering, offsets and the cross-reference table.
//!
//! Object numbers are handed out up front while the document is planned,
//! then every object must be emitted in exactly that order. Any deviation
//! is an internal accounting error, never silently repaired.

use super::object_serializer::LENGTH_PLACEHOLDER_WIDTH;
use crate::error::{Error, Result};
use std::io::Write;

/// Highest object number a classic xref table may address.
pub const MAX_OBJECTS: u32 = 8_388_607;

/// Allocates object numbers and records where each object starts.
#[derive(Debug, Clone)]
pub struct ObjectAllocator {
    /// Byte offset of each emitted object; index 0 is object 1
    offsets: Vec<Option<usize>>,
    /// Next object number expected by [`begin`](Self::begin)
    next_emit: u32,
}

impl ObjectAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self {
            offsets: Vec::new(),
            next_emit: 1,
        }
    }

    /// Reserve the next object number.
    pub fn alloc(&mut self) -> Result<u32> {
        let id = self.offsets.len() as u32 + 1;
        if id > MAX_OBJECTS {
            return Err(Error::TooManyObjects(MAX_OBJECTS));
        }
        self.offsets.push(None);
        Ok(id)
    }

    /// Reserve `count` consecutive object numbers, returning the first.
    pub fn alloc_many(&mut self, count: usize) -> Result<u32> {
        let first = self.offsets.len() as u32 + 1;
        for _ in 0..count {
            self.alloc()?;
        }
        Ok(first)
    }

    /// Number of allocated objects.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Record that object `id` starts at `offset`.
    ///
    /// Objects must be emitted in ascending order with no gaps.
    pub fn begin(&mut self, id: u32, offset: usize) -> Result<()> {
        if id != self.next_emit || id as usize > self.offsets.len() {
            return Err(Error::Internal {
                expected: self.next_emit,
                found: id,
            });
        }
        self.offsets[id as usize - 1] = Some(offset);
        self.next_emit += 1;
        Ok(())
    }

    /// Check that every allocated object was emitted.
    pub fn finish(&self) -> Result<()> {
        match self.offsets.iter().position(Option::is_none) {
            Some(missing) => Err(Error::Internal {
                expected: missing as u32 + 1,
                found: self.next_emit,
            }),
            None => Ok(()),
        }
    }

    /// Trailer `/Size`: one more than the highest object number.
    pub fn size(&self) -> u32 {
        self.offsets.len() as u32 + 1
    }

    /// Write the `xref` section.
    pub fn write_xref<W: Write>(&self, w: &mut W) -> Result<()> {
        self.finish()?;
        writeln!(w, "xref")?;
        writeln!(w, "0 {}", self.size())?;
        writeln!(w, "0000000000 65535 f ")?;
        for offset in self.offsets.iter().flatten() {
            writeln!(w, "{:010} 00000 n ", offset)?;
        }
        Ok(())
    }
}

impl Default for ObjectAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Overwrite a zeroed `/Length` placeholder with the actual length.
pub fn patch_length(buf: &mut [u8], at: usize, length: usize) -> Result<()> {
    let digits = format!("{:0width$}", length, width = LENGTH_PLACEHOLDER_WIDTH);
    if digits.len() != LENGTH_PLACEHOLDER_WIDTH || at + LENGTH_PLACEHOLDER_WIDTH > buf.len() {
        return Err(Error::InternalState(format!(
            "stream length {} does not fit its placeholder at {}",
            length, at
        )));
    }
    buf[at..at + LENGTH_PLACEHOLDER_WIDTH].copy_from_slice(digits.as_bytes());
    Ok(())
}

/// References written to the trailer.
#[derive(Debug, Clone, Copy)]
pub struct TrailerRefs {
    /// Catalog object
    pub root: u32,
    /// Info object
    pub info: u32,
    /// Encrypt dictionary, if any
    pub encrypt: Option<u32>,
}

/// Write the trailer, `startxref` and the end-of-file marker.
pub fn write_trailer<W: Write>(
    w: &mut W,
    size: u32,
    refs: TrailerRefs,
    file_id: &[u8; 16],
    xref_start: usize,
) -> Result<()> {
    let hex: String = file_id.iter().map(|b| format!("{:02x}", b)).collect();
    writeln!(w, "trailer")?;
    write!(w, "<</Size {}/Root {} 0 R/Info {} 0 R", size, refs.root, refs.info)?;
    if let Some(encrypt) = refs.encrypt {
        write!(w, "/Encrypt {} 0 R", encrypt)?;
    }
    writeln!(w, "/ID[<{}><{}>]>>", hex, hex)?;
    writeln!(w, "startxref")?;
    writeln!(w, "{}", xref_start)?;
    writeln!(w, "%%EOF")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_emit_in_order() {
        let mut xref = ObjectAllocator::new();
        assert_eq!(xref.alloc().unwrap(), 1);
        assert_eq!(xref.alloc_many(3).unwrap(), 2);
        assert_eq!(xref.len(), 4);

        for (id, offset) in [(1, 15), (2, 40), (3, 90), (4, 120)] {
            xref.begin(id, offset).unwrap();
        }
        xref.finish().unwrap();

        let mut out = Vec::new();
        xref.write_xref(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "xref");
        assert_eq!(lines[1], "0 5");
        assert_eq!(lines[2], "0000000000 65535 f ");
        assert_eq!(lines[3], "0000000015 00000 n ");
        assert_eq!(lines[6], "0000000120 00000 n ");
    }

    #[test]
    fn test_out_of_order_is_internal_error() {
        let mut xref = ObjectAllocator::new();
        xref.alloc_many(3).unwrap();
        xref.begin(1, 10).unwrap();
        match xref.begin(3, 20) {
            Err(Error::Internal { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unallocated_object_is_internal_error() {
        let mut xref = ObjectAllocator::new();
        xref.alloc().unwrap();
        xref.begin(1, 10).unwrap();
        assert!(matches!(xref.begin(2, 20), Err(Error::Internal { .. })));
    }

    #[test]
    fn test_missing_object_detected() {
        let mut xref = ObjectAllocator::new();
        xref.alloc_many(2).unwrap();
        xref.begin(1, 10).unwrap();
        assert!(matches!(xref.finish(), Err(Error::Internal { expected: 2, .. })));
        assert!(xref.write_xref(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_patch_length() {
        let mut buf = b"/Length 0000000000>>".to_vec();
        patch_length(&mut buf, 8, 1234).unwrap();
        assert_eq!(&buf, b"/Length 0000001234>>");
        assert!(patch_length(&mut buf, 15, 1).is_err());
    }

    #[test]
    fn test_trailer() {
        let mut out = Vec::new();
        let refs = TrailerRefs {
            root: 1,
            info: 3,
            encrypt: Some(4),
        };
        write_trailer(&mut out, 9, refs, &[0xab; 16], 777).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("/Size 9/Root 1 0 R/Info 3 0 R/Encrypt 4 0 R/ID[<abab"));
        assert!(text.ends_with("startxref\n777\n%%EOF\n"));
    }
}
