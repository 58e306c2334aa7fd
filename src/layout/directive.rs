//! Comment directives.
//!
//! A comment such as `<!-- MEDIA SIZE A4 -->` or `<!-- HEADER LEFT "$TITLE" -->`
//! changes pagination or page attributes at the point it appears. One
//! comment may hold several directives; parsing stops at the first word
//! that isn't one.

use crate::config::{media_size, parse_length};

/// A parsed directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `PAGE BREAK` or `NEW PAGE`
    PageBreak,
    /// `NEW SHEET`: next page, then to a right-hand page in duplex mode
    NewSheet,
    /// `HALF PAGE`
    HalfPage,
    /// `NEED <length>`
    Need(f32),
    /// `MEDIA COLOR <name>`
    MediaColor(String),
    /// `MEDIA TYPE <name>`
    MediaType(String),
    /// `MEDIA POSITION <n>`
    MediaPosition(u32),
    /// `MEDIA SIZE <name|WxH>`, in points
    MediaSize(f32, f32),
    /// `MEDIA LEFT|RIGHT|TOP|BOTTOM <length>`
    MediaMargin(MarginSide, f32),
    /// `MEDIA LANDSCAPE YES|NO`
    MediaLandscape(bool),
    /// `MEDIA DUPLEX YES|NO`
    MediaDuplex(bool),
    /// `HEADER LEFT|CENTER|RIGHT "<fmt>"`; slot 0..=2
    Header(usize, String),
    /// `FOOTER LEFT|CENTER|RIGHT "<fmt>"`
    Footer(usize, String),
    /// `NUMBER-UP <n>`
    NumberUp(u8),
}

impl Directive {
    /// Whether the directive changes the physical page and so must start
    /// on a fresh page.
    pub fn needs_fresh_page(&self) -> bool {
        matches!(
            self,
            Directive::MediaColor(_)
                | Directive::MediaType(_)
                | Directive::MediaPosition(_)
                | Directive::MediaSize(..)
                | Directive::MediaMargin(..)
                | Directive::MediaLandscape(_)
                | Directive::MediaDuplex(_)
        )
    }
}

/// Page edge named by a `MEDIA` margin directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginSide {
    /// Left margin
    Left,
    /// Right margin
    Right,
    /// Top margin
    Top,
    /// Bottom margin
    Bottom,
}

/// Result of parsing one comment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedComment {
    /// Directives in order
    pub directives: Vec<Directive>,
    /// Description of the first malformed directive, if any
    pub error: Option<String>,
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.rest.is_empty()
    }

    /// Consume `keyword` when it matches case-insensitively and is followed
    /// by whitespace or the end.
    fn keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let len = keyword.len();
        let Some(head) = self.rest.get(..len) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(keyword) {
            return false;
        }
        let next = self.rest[len..].chars().next();
        if next.map_or(true, char::is_whitespace) {
            self.rest = &self.rest[len..];
            true
        } else {
            false
        }
    }

    /// Next whitespace-delimited word, or a quoted string.
    fn word(&mut self) -> Option<String> {
        self.skip_ws();
        if self.rest.starts_with('"') {
            return self.quoted();
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let word = self.rest[..end].to_string();
        self.rest = &self.rest[end..];
        Some(word)
    }

    /// Quoted string with backslash escapes.
    fn quoted(&mut self) -> Option<String> {
        self.skip_ws();
        let mut chars = self.rest.strip_prefix('"')?.char_indices();
        let mut out = String::new();
        let body = &self.rest[1..];
        let mut consumed = body.len();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                },
                '"' => {
                    consumed = i + 1;
                    break;
                },
                _ => out.push(c),
            }
        }
        self.rest = &body[consumed..];
        Some(out)
    }
}

fn parse_switch(word: &str) -> Option<bool> {
    let lower = word.to_ascii_lowercase();
    if lower.starts_with("off") || lower.starts_with('n') {
        Some(false)
    } else if lower.starts_with("on") || lower.starts_with('y') {
        Some(true)
    } else {
        None
    }
}

fn parse_slot(cursor: &mut Cursor<'_>) -> Option<usize> {
    if cursor.keyword("LEFT") {
        Some(0)
    } else if cursor.keyword("CENTER") {
        Some(1)
    } else if cursor.keyword("RIGHT") {
        Some(2)
    } else {
        None
    }
}

/// Parse a comment's text into directives.
///
/// Comments that don't start with a directive keyword yield nothing and no
/// error; they are ordinary comments.
pub fn parse_comment(text: &str) -> ParsedComment {
    let mut parsed = ParsedComment::default();
    let mut cur = Cursor { rest: text };

    while !cur.at_end() {
        let directive = if cur.keyword("PAGE BREAK") || cur.keyword("NEW PAGE") {
            Ok(Directive::PageBreak)
        } else if cur.keyword("NEW SHEET") {
            Ok(Directive::NewSheet)
        } else if cur.keyword("HALF PAGE") {
            Ok(Directive::HalfPage)
        } else if cur.keyword("NEED") {
            cur.word()
                .and_then(|w| parse_length(&w))
                .map(Directive::Need)
                .ok_or("bad NEED amount")
        } else if cur.keyword("NUMBER-UP") {
            cur.word()
                .and_then(|w| w.parse::<u8>().ok())
                .filter(|n| matches!(n, 1 | 2 | 4 | 6 | 9 | 16))
                .map(Directive::NumberUp)
                .ok_or("bad NUMBER-UP value")
        } else if cur.keyword("MEDIA") {
            parse_media(&mut cur)
        } else if cur.keyword("HEADER") {
            parse_slot(&mut cur)
                .ok_or("bad HEADER position")
                .and_then(|pos| {
                    cur.quoted()
                        .map(|s| Directive::Header(pos, s))
                        .ok_or("bad HEADER string")
                })
        } else if cur.keyword("FOOTER") {
            parse_slot(&mut cur)
                .ok_or("bad FOOTER position")
                .and_then(|pos| {
                    cur.quoted()
                        .map(|s| Directive::Footer(pos, s))
                        .ok_or("bad FOOTER string")
                })
        } else {
            break;
        };

        match directive {
            Ok(d) => parsed.directives.push(d),
            Err(message) => {
                parsed.error = Some(format!("{}: \"{}\"", message, text.trim()));
                break;
            },
        }
    }
    parsed
}

fn parse_media(cur: &mut Cursor<'_>) -> std::result::Result<Directive, &'static str> {
    if cur.keyword("COLOR") {
        cur.word().map(Directive::MediaColor).ok_or("bad MEDIA COLOR")
    } else if cur.keyword("TYPE") {
        cur.word().map(Directive::MediaType).ok_or("bad MEDIA TYPE")
    } else if cur.keyword("POSITION") {
        cur.word()
            .and_then(|w| w.parse().ok())
            .map(Directive::MediaPosition)
            .ok_or("bad MEDIA POSITION")
    } else if cur.keyword("SIZE") {
        cur.word()
            .and_then(|w| media_size(&w))
            .map(|(w, l)| Directive::MediaSize(w, l))
            .ok_or("bad MEDIA SIZE")
    } else if cur.keyword("LANDSCAPE") {
        cur.word()
            .and_then(|w| parse_switch(&w))
            .map(Directive::MediaLandscape)
            .ok_or("bad MEDIA LANDSCAPE")
    } else if cur.keyword("DUPLEX") {
        cur.word()
            .and_then(|w| parse_switch(&w))
            .map(Directive::MediaDuplex)
            .ok_or("bad MEDIA DUPLEX")
    } else {
        let side = if cur.keyword("LEFT") {
            MarginSide::Left
        } else if cur.keyword("RIGHT") {
            MarginSide::Right
        } else if cur.keyword("TOP") {
            MarginSide::Top
        } else if cur.keyword("BOTTOM") {
            MarginSide::Bottom
        } else {
            return Err("unknown MEDIA directive");
        };
        cur.word()
            .and_then(|w| parse_length(&w))
            .filter(|v| *v >= 0.0)
            .map(|v| Directive::MediaMargin(side, v))
            .ok_or("bad MEDIA margin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_comment_is_ignored() {
        let parsed = parse_comment(" just a note ");
        assert!(parsed.directives.is_empty());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_page_breaks() {
        assert_eq!(parse_comment("PAGE BREAK").directives, vec![Directive::PageBreak]);
        assert_eq!(parse_comment(" new page ").directives, vec![Directive::PageBreak]);
        assert_eq!(parse_comment("NEW SHEET").directives, vec![Directive::NewSheet]);
        assert_eq!(parse_comment("HALF PAGE").directives, vec![Directive::HalfPage]);
        // Keyword must end at a word boundary.
        assert!(parse_comment("PAGE BREAKS").directives.is_empty());
    }

    #[test]
    fn test_need_units() {
        assert_eq!(parse_comment("NEED 2in").directives, vec![Directive::Need(144.0)]);
        assert_eq!(parse_comment("NEED 36").directives, vec![Directive::Need(36.0)]);
        assert!(parse_comment("NEED lots").error.is_some());
    }

    #[test]
    fn test_media_directives() {
        let parsed = parse_comment("MEDIA SIZE A4 MEDIA LANDSCAPE yes MEDIA TOP 1in");
        assert_eq!(parsed.directives, vec![
            Directive::MediaSize(595.0, 842.0),
            Directive::MediaLandscape(true),
            Directive::MediaMargin(MarginSide::Top, 72.0),
        ]);
        assert!(parsed.directives.iter().all(Directive::needs_fresh_page));
        assert_eq!(parse_comment("MEDIA COLOR \"Light Blue\"").directives, vec![
            Directive::MediaColor("Light Blue".to_string())
        ]);
        assert_eq!(parse_comment("MEDIA DUPLEX off").directives, vec![Directive::MediaDuplex(false)]);
    }

    #[test]
    fn test_header_footer() {
        let parsed = parse_comment(r#"HEADER LEFT "Page \"$PAGE\"" FOOTER RIGHT "$DATE""#);
        assert_eq!(parsed.directives, vec![
            Directive::Header(0, "Page \"$PAGE\"".to_string()),
            Directive::Footer(2, "$DATE".to_string()),
        ]);
        let bad = parse_comment("HEADER MIDDLE \"x\"");
        assert!(bad.directives.is_empty());
        assert!(bad.error.unwrap().contains("HEADER position"));
    }

    #[test]
    fn test_number_up() {
        assert_eq!(parse_comment("NUMBER-UP 4").directives, vec![Directive::NumberUp(4)]);
        assert!(parse_comment("NUMBER-UP 3").error.is_some());
    }
}
