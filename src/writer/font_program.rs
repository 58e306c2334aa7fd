//! Type 1 font programs for embedding.
//!
//! A font program arrives either as PFB (binary segments with 6-byte
//! headers) or PFA (hex-encoded eexec section). PDF wants the three parts
//! concatenated with their lengths in `/Length1..3`; PostScript wants the
//! PFA form.

use crate::error::{Error, Result};
use crate::fonts::{FontStyle, Typeface};
use crate::object::Object;
use crate::writer::ObjectSerializer;

/// A parsed Type 1 font program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type1Program {
    /// Clear-text part, ending after `eexec`
    pub clear: Vec<u8>,
    /// Binary (encrypted) part
    pub binary: Vec<u8>,
    /// Trailer: zeros and `cleartomark`
    pub trailer: Vec<u8>,
}

const PFB_MARKER: u8 = 0x80;

impl Type1Program {
    /// Parse PFB or PFA bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.first() == Some(&PFB_MARKER) {
            Self::parse_pfb(data)
        } else {
            Self::parse_pfa(data)
        }
    }

    fn parse_pfb(data: &[u8]) -> Result<Self> {
        let mut parts: [Vec<u8>; 3] = Default::default();
        let mut part = 0;
        let mut last_kind = 0u8;
        let mut pos = 0;

        while pos + 2 <= data.len() {
            if data[pos] != PFB_MARKER {
                return Err(Error::Font(format!("bad PFB segment marker at {}", pos)));
            }
            let kind = data[pos + 1];
            if kind == 3 {
                break;
            }
            if pos + 6 > data.len() {
                return Err(Error::Font("truncated PFB segment header".to_string()));
            }
            let len = u32::from_le_bytes([data[pos + 2], data[pos + 3], data[pos + 4], data[pos + 5]]) as usize;
            let start = pos + 6;
            let end = start
                .checked_add(len)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| Error::Font("truncated PFB segment".to_string()))?;

            // ASCII, binary, ASCII: a change of kind moves to the next part.
            if last_kind != 0 && kind != last_kind {
                part = (part + 1).min(2);
            }
            last_kind = kind;
            parts[part].extend_from_slice(&data[start..end]);
            pos = end;
        }

        let [clear, binary, trailer] = parts;
        if binary.is_empty() {
            return Err(Error::Font("PFB font has no binary segment".to_string()));
        }
        Ok(Self { clear, binary, trailer })
    }

    fn parse_pfa(data: &[u8]) -> Result<Self> {
        let eexec = find(data, b"eexec")
            .ok_or_else(|| Error::Font("font program has no eexec section".to_string()))?;
        let mut split = eexec + b"eexec".len();
        while split < data.len() && (data[split] == b'\r' || data[split] == b'\n') {
            split += 1;
        }
        let rest = &data[split..];
        let trailer_start = find(rest, b"0000000000").unwrap_or(rest.len());

        let mut binary = Vec::with_capacity(trailer_start / 2);
        let mut high: Option<u8> = None;
        for &c in &rest[..trailer_start] {
            let Some(nibble) = (c as char).to_digit(16) else {
                continue;
            };
            match high.take() {
                Some(h) => binary.push(h << 4 | nibble as u8),
                None => high = Some(nibble as u8),
            }
        }

        Ok(Self {
            clear: data[..split].to_vec(),
            binary,
            trailer: rest[trailer_start..].to_vec(),
        })
    }

    /// The three parts concatenated, as stored in a `/FontFile` stream.
    pub fn pdf_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.clear.len() + self.binary.len() + self.trailer.len());
        out.extend_from_slice(&self.clear);
        out.extend_from_slice(&self.binary);
        out.extend_from_slice(&self.trailer);
        out
    }

    /// PFA text for a PostScript prolog.
    pub fn to_pfa(&self) -> Vec<u8> {
        let mut out = self.clear.clone();
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        for line in self.binary.chunks(32) {
            for b in line {
                out.extend_from_slice(format!("{:02x}", b).as_bytes());
            }
            out.push(b'\n');
        }
        out.extend_from_slice(&self.trailer);
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        out
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Approximate descriptor metrics: (flags, ascent, descent, cap height,
/// stem V, italic angle, bbox).
fn descriptor_metrics(typeface: Typeface, style: FontStyle) -> (i64, i64, i64, i64, i64, i64, [i64; 4]) {
    let italic = matches!(style, FontStyle::Italic | FontStyle::BoldItalic);
    let bold = matches!(style, FontStyle::Bold | FontStyle::BoldItalic);
    let angle = if italic { -12 } else { 0 };
    let italic_flag = if italic { 64 } else { 0 };
    match typeface {
        Typeface::Courier => (
            1 | 32 | italic_flag,
            629,
            -157,
            562,
            if bold { 106 } else { 51 },
            angle,
            [-23, -250, 715, 805],
        ),
        Typeface::Times => (
            2 | 32 | italic_flag,
            683,
            -217,
            662,
            if bold { 139 } else { 84 },
            angle,
            [-168, -218, 1000, 898],
        ),
        Typeface::Helvetica => (
            32 | italic_flag,
            718,
            -207,
            718,
            if bold { 140 } else { 88 },
            angle,
            [-166, -225, 1000, 931],
        ),
        Typeface::Symbol => (4, 1010, -293, 700, 85, 0, [-180, -293, 1090, 1010]),
        Typeface::Dingbats => (4, 820, -143, 700, 90, 0, [-1, -143, 981, 820]),
    }
}

/// `/FontDescriptor` dictionary for an embedded standard font.
pub fn font_descriptor(base_font: &str, typeface: Typeface, style: FontStyle, font_file: u32) -> Object {
    let (flags, ascent, descent, cap_height, stem_v, angle, bbox) = descriptor_metrics(typeface, style);
    ObjectSerializer::dict(vec![
        ("Type", ObjectSerializer::name("FontDescriptor")),
        ("FontName", ObjectSerializer::name(base_font)),
        ("Flags", ObjectSerializer::integer(flags)),
        (
            "FontBBox",
            ObjectSerializer::array(bbox.iter().map(|v| ObjectSerializer::integer(*v)).collect()),
        ),
        ("ItalicAngle", ObjectSerializer::integer(angle)),
        ("Ascent", ObjectSerializer::integer(ascent)),
        ("Descent", ObjectSerializer::integer(descent)),
        ("CapHeight", ObjectSerializer::integer(cap_height)),
        ("StemV", ObjectSerializer::integer(stem_v)),
        ("FontFile", ObjectSerializer::reference(font_file)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pfb_segment(kind: u8, data: &[u8]) -> Vec<u8> {
        let mut out = vec![PFB_MARKER, kind];
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_parse_pfb() {
        let mut data = pfb_segment(1, b"%!PS-AdobeFont-1.0: Test\ncurrentfile eexec\n");
        data.extend(pfb_segment(2, &[0xde, 0xad]));
        data.extend(pfb_segment(2, &[0xbe, 0xef]));
        data.extend(pfb_segment(1, b"0000\ncleartomark\n"));
        data.extend([PFB_MARKER, 3]);

        let program = Type1Program::parse(&data).unwrap();
        assert!(program.clear.ends_with(b"eexec\n"));
        assert_eq!(program.binary, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(program.trailer, b"0000\ncleartomark\n");
        assert_eq!(program.pdf_data().len(), program.clear.len() + 4 + program.trailer.len());
    }

    #[test]
    fn test_parse_pfa() {
        let zeros = "0".repeat(64);
        let text = format!("%!FontType1\ncurrentfile eexec\nDEAD\nbeef\n{}\ncleartomark\n", zeros);
        let program = Type1Program::parse(text.as_bytes()).unwrap();
        assert_eq!(program.clear, b"%!FontType1\ncurrentfile eexec\n");
        assert_eq!(program.binary, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(program.trailer.starts_with(b"0000000000"));
    }

    #[test]
    fn test_pfa_round_trip() {
        let mut data = pfb_segment(1, b"%!FontType1\ncurrentfile eexec\n");
        data.extend(pfb_segment(2, &[1, 2, 3]));
        data.extend(pfb_segment(1, b"0000000000000000\ncleartomark\n"));
        let program = Type1Program::parse(&data).unwrap();
        let pfa = program.to_pfa();
        assert_eq!(Type1Program::parse(&pfa).unwrap().binary, vec![1, 2, 3]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Type1Program::parse(b"not a font").is_err());
        assert!(Type1Program::parse(&[PFB_MARKER, 1, 0xff, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_descriptor() {
        let d = font_descriptor("Times-Italic", Typeface::Times, FontStyle::Italic, 9);
        let dict = d.as_dict().unwrap();
        assert_eq!(dict["ItalicAngle"].as_integer(), Some(-12));
        assert_eq!(dict["Flags"].as_integer(), Some(2 | 32 | 64));
        assert_eq!(dict["FontFile"].as_reference().map(|r| r.id), Some(9));
    }
}
