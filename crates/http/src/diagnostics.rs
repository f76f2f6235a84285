//! Escaped rendering of raw wire bytes for logs.
//!
//! Tab, newline and carriage return render as `\t`, `\n` and `\r`, other
//! control bytes and everything above 126 as `\xHH`, the rest as themselves.

use std::borrow::Cow;
use std::fmt;

/// Printable ASCII, from `b' '` to `b'~'`.
const PRINTABLE: &str =
    " !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// Escaped form of one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escaped {
    Text(&'static str),
    Hex(u8),
}

impl Escaped {
    fn of(byte: u8) -> Self {
        match byte {
            b'\t' => Escaped::Text("\\t"),
            b'\n' => Escaped::Text("\\n"),
            b'\r' => Escaped::Text("\\r"),
            b' '..=b'~' => {
                let index = usize::from(byte - b' ');
                Escaped::Text(&PRINTABLE[index..=index])
            }
            _ => Escaped::Hex(byte),
        }
    }
}

impl fmt::Display for Escaped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Escaped::Text(text) => f.write_str(text),
            Escaped::Hex(byte) => write!(f, "\\x{byte:02X}"),
        }
    }
}

/// Renders a single byte in its escaped textual form.
///
/// Only `\xHH` escapes allocate.
pub fn render_byte(byte: u8) -> Cow<'static, str> {
    match Escaped::of(byte) {
        Escaped::Text(text) => Cow::Borrowed(text),
        hex @ Escaped::Hex(_) => Cow::Owned(hex.to_string()),
    }
}

/// `Display` adapter rendering a byte slice without allocating per byte.
///
/// ```
/// use edge_http::diagnostics::EscapedBytes;
///
/// assert_eq!(EscapedBytes(b"GET /\r\n\x00").to_string(), "GET /\\r\\n\\x00");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EscapedBytes<'a>(pub &'a [u8]);

impl fmt::Display for EscapedBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|&byte| Escaped::of(byte).fmt(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventional_escapes() {
        assert_eq!(render_byte(9), "\\t");
        assert_eq!(render_byte(10), "\\n");
        assert_eq!(render_byte(13), "\\r");
    }

    #[test]
    fn printable_ascii() {
        assert_eq!(render_byte(65), "A");
        assert_eq!(render_byte(b' '), " ");
        assert_eq!(render_byte(b'~'), "~");
    }

    #[test]
    fn printable_bytes_are_borrowed() {
        for byte in b' '..=b'~' {
            let rendered = render_byte(byte);
            assert!(matches!(rendered, Cow::Borrowed(_)), "{byte} allocated");
            assert_eq!(rendered, char::from(byte).to_string());
        }
        assert!(matches!(render_byte(b'\n'), Cow::Borrowed(_)));
    }

    #[test]
    fn hex_escapes() {
        assert_eq!(render_byte(200), "\\xC8");
        assert_eq!(render_byte(0), "\\x00");
        assert_eq!(render_byte(8), "\\x08");
        assert_eq!(render_byte(11), "\\x0B");
        assert_eq!(render_byte(12), "\\x0C");
        assert_eq!(render_byte(31), "\\x1F");
        assert_eq!(render_byte(127), "\\x7F");
        assert_eq!(render_byte(255), "\\xFF");
    }

    #[test]
    fn slice_matches_single_bytes() {
        let bytes = (0..=255).collect::<Vec<u8>>();
        let expected = bytes.iter().map(|b| render_byte(*b)).collect::<String>();
        assert_eq!(EscapedBytes(&bytes).to_string(), expected);
    }
}
