//! Number formatting for list labels and page numbers.

/// Numbering style selected by a one-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberStyle {
    /// `1`: arabic
    #[default]
    Arabic,
    /// `a`: lower-case letters
    LowerAlpha,
    /// `A`: upper-case letters
    UpperAlpha,
    /// `i`: lower-case roman
    LowerRoman,
    /// `I`: upper-case roman
    UpperRoman,
}

impl NumberStyle {
    /// Parse a style code (`1`, `a`, `A`, `i`, `I`).
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '1' => Some(NumberStyle::Arabic),
            'a' => Some(NumberStyle::LowerAlpha),
            'A' => Some(NumberStyle::UpperAlpha),
            'i' => Some(NumberStyle::LowerRoman),
            'I' => Some(NumberStyle::UpperRoman),
            _ => None,
        }
    }
}

const ROMAN: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

fn roman(mut n: u32) -> String {
    // Values past the classic range wrap around.
    if n >= 3000 {
        n = (n - 3000) % 2999 + 1;
    }
    let mut out = String::new();
    for (value, digits) in ROMAN {
        while n >= value {
            out.push_str(digits);
            n -= value;
        }
    }
    out
}

fn alpha(mut n: u32) -> String {
    if n > 26 * 26 {
        n = n % (26 * 26) + 1;
    }
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Format `n` in a numbering style.
///
/// Non-positive values fall back to arabic for the letter and roman styles.
pub fn format_number(n: i64, style: NumberStyle) -> String {
    if n <= 0 || style == NumberStyle::Arabic {
        return n.to_string();
    }
    let n = n.min(u32::MAX as i64) as u32;
    match style {
        NumberStyle::Arabic => n.to_string(),
        NumberStyle::LowerAlpha => alpha(n).to_ascii_lowercase(),
        NumberStyle::UpperAlpha => alpha(n),
        NumberStyle::LowerRoman => roman(n).to_ascii_lowercase(),
        NumberStyle::UpperRoman => roman(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arabic() {
        assert_eq!(format_number(42, NumberStyle::Arabic), "42");
        assert_eq!(format_number(0, NumberStyle::LowerRoman), "0");
    }

    #[test]
    fn test_roman() {
        assert_eq!(format_number(4, NumberStyle::LowerRoman), "iv");
        assert_eq!(format_number(14, NumberStyle::UpperRoman), "XIV");
        assert_eq!(format_number(1994, NumberStyle::UpperRoman), "MCMXCIV");
        assert_eq!(format_number(3000, NumberStyle::UpperRoman), "I");
    }

    #[test]
    fn test_alpha() {
        assert_eq!(format_number(1, NumberStyle::LowerAlpha), "a");
        assert_eq!(format_number(26, NumberStyle::UpperAlpha), "Z");
        assert_eq!(format_number(27, NumberStyle::UpperAlpha), "AA");
        assert_eq!(format_number(52, NumberStyle::LowerAlpha), "az");
    }

    #[test]
    fn test_style_codes() {
        assert_eq!(NumberStyle::from_code('i'), Some(NumberStyle::LowerRoman));
        assert_eq!(NumberStyle::from_code('x'), None);
    }
}
