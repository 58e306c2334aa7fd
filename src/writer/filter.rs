//! Stream filters for binary data.
//!
//! PDF streams pass through deflate (optional) and then per-object RC4
//! encryption (optional) before reaching the output buffer. PostScript has
//! no 8-bit-clean channel, so binary data is always written as hex or
//! base-85 text, optionally deflated first.

use crate::encryption::Rc4Cipher;
use crate::error::{Error, Result};
use crate::tree::RasterImage;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Writer that RC4-encrypts everything passing through it.
///
/// With no cipher it is a plain pass-through.
pub(crate) struct Rc4Writer<W: Write> {
    inner: W,
    cipher: Option<Rc4Cipher>,
    scratch: Vec<u8>,
}

impl<W: Write> Rc4Writer<W> {
    pub(crate) fn new(inner: W, cipher: Option<Rc4Cipher>) -> Self {
        Self {
            inner,
            cipher,
            scratch: Vec::new(),
        }
    }
}

impl<W: Write> Write for Rc4Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.cipher {
            Some(cipher) => {
                self.scratch.clear();
                self.scratch.extend_from_slice(buf);
                cipher.apply_keystream(&mut self.scratch);
                self.inner.write_all(&self.scratch)?;
            },
            None => self.inner.write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write stream data through the deflate and encryption filters.
///
/// `compression` 0 disables deflate; `cipher` is the owning object's fresh
/// RC4 state.
pub(crate) fn write_filtered<W: Write>(
    out: W,
    data: &[u8],
    compression: u32,
    cipher: Option<Rc4Cipher>,
) -> io::Result<()> {
    let mut sink = Rc4Writer::new(out, cipher);
    if compression > 0 {
        let mut encoder = ZlibEncoder::new(&mut sink, Compression::new(compression.min(9)));
        encoder.write_all(data)?;
        encoder.finish()?;
    } else {
        sink.write_all(data)?;
    }
    sink.flush()
}

/// Deflate a buffer with zlib framing.
pub fn deflate(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.clamp(1, 9)));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Encode an image as a baseline JPEG.
pub fn encode_jpeg(image: &RasterImage, quality: u8) -> Result<Vec<u8>> {
    use image::codecs::jpeg::JpegEncoder;
    use image::ColorType;

    let color = if image.depth == 1 {
        ColorType::L8
    } else {
        ColorType::Rgb8
    };
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(&image.pixels, image.width, image.height, color)
        .map_err(|e| Error::Image(e.to_string()))?;
    Ok(out)
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Hex encoder, 40 bytes (80 characters) per line.
pub struct HexWriter<W: Write> {
    inner: W,
    column: usize,
}

impl<W: Write> HexWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner, column: 0 }
    }

    /// End the last line and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.column > 0 {
            self.inner.write_all(b"\n")?;
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for HexWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut line = Vec::with_capacity(buf.len() * 2 + buf.len() / 40 + 1);
        for &byte in buf {
            line.push(HEX_DIGITS[(byte >> 4) as usize]);
            line.push(HEX_DIGITS[(byte & 15) as usize]);
            self.column = (self.column + 1) % 40;
            if self.column == 0 {
                line.push(b'\n');
            }
        }
        self.inner.write_all(&line)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// ASCII base-85 encoder with `z` compression of zero groups.
///
/// Lines break once they reach 80 characters. [`finish`](Self::finish)
/// flushes the partial group and writes the `~>` end marker.
pub struct Ascii85Writer<W: Write> {
    inner: W,
    pending: [u8; 4],
    pending_len: usize,
    column: usize,
}

impl<W: Write> Ascii85Writer<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: [0; 4],
            pending_len: 0,
            column: 0,
        }
    }

    fn encode_group(group: [u8; 4]) -> [u8; 5] {
        let mut b = u32::from_be_bytes(group);
        let mut out = [0u8; 5];
        for slot in out.iter_mut().rev() {
            *slot = (b % 85) as u8 + b'!';
            b /= 85;
        }
        out
    }

    fn emit(&mut self, group: [u8; 4]) -> io::Result<()> {
        if group == [0; 4] {
            self.inner.write_all(b"z")?;
            self.column += 1;
        } else {
            self.inner.write_all(&Self::encode_group(group))?;
            self.column += 5;
        }
        if self.column >= 80 {
            self.column = 0;
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flush the final partial group, write `~>` and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.pending_len > 0 {
            let mut group = [0u8; 4];
            group[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
            let encoded = Self::encode_group(group);
            self.inner.write_all(&encoded[..self.pending_len + 1])?;
        }
        self.inner.write_all(b"~>\n")?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Ascii85Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.pending[self.pending_len] = byte;
            self.pending_len += 1;
            if self.pending_len == 4 {
                self.pending_len = 0;
                let group = self.pending;
                self.emit(group)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Base-85 encode a buffer in one call.
pub fn ascii85(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut writer = Ascii85Writer::new(Vec::new());
    writer.write_all(data)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::rc4_crypt;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_plain_passthrough() {
        let mut out = Vec::new();
        write_filtered(&mut out, b"BT ET", 0, None).unwrap();
        assert_eq!(out, b"BT ET");
    }

    #[test]
    fn test_deflate_then_encrypt() {
        let data = b"0 0 m 100 100 l S\n".repeat(20);
        let mut out = Vec::new();
        write_filtered(&mut out, &data, 6, Some(Rc4Cipher::new(b"key"))).unwrap();

        let decrypted = rc4_crypt(b"key", &out);
        assert_eq!(inflate(&decrypted), data);
    }

    #[test]
    fn test_hex_writer_wraps() {
        let mut w = HexWriter::new(Vec::new());
        w.write_all(&[0xAB; 41]).unwrap();
        let out = String::from_utf8(w.finish().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 80);
        assert_eq!(lines[1], "AB");
    }

    #[test]
    fn test_ascii85_known_values() {
        assert_eq!(ascii85(b"").unwrap(), b"~>\n");
        assert_eq!(ascii85(&[0, 0, 0, 0]).unwrap(), b"z~>\n");
        // "Man " is the classic first group of the Leviathan quote.
        assert_eq!(ascii85(b"Man ").unwrap(), b"9jqo^~>\n");
        assert_eq!(ascii85(b"Ma").unwrap(), b"9jn~>\n");
    }

    #[test]
    fn test_ascii85_chunked_writes_match() {
        let data: Vec<u8> = (0u8..=255).collect();
        let expected = ascii85(&data).unwrap();

        let mut w = Ascii85Writer::new(Vec::new());
        for chunk in data.chunks(7) {
            w.write_all(chunk).unwrap();
        }
        assert_eq!(w.finish().unwrap(), expected);
        assert!(expected.split(|b| *b == b'\n').all(|line| line.len() <= 80));
    }

    #[test]
    fn test_encode_jpeg() {
        let image = RasterImage::new(8, 8, 3, vec![128; 8 * 8 * 3]).unwrap();
        let jpeg = encode_jpeg(&image, 75).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
