use crate::{
    pdf::PdfString,
    writer::{Encoder, Writer},
};

use super::SimpleEncoder;

/// Positions of parentheses without a partner. Balanced pairs may stay
/// unescaped inside a literal string.
fn unbalanced_parentheses(s: &[u8]) -> Vec<bool> {
    let mut unbalanced = vec![false; s.len()];
    let mut open = Vec::new();
    for (index, &c) in s.iter().enumerate() {
        match c {
            b'(' => open.push(index),
            b')' => {
                if open.pop().is_none() {
                    unbalanced[index] = true;
                }
            }
            _ => {}
        }
    }
    for index in open {
        unbalanced[index] = true;
    }
    unbalanced
}

fn write_literal(s: &[u8], writer: &mut dyn Writer) {
    writer.write(b"(");

    let unbalanced = unbalanced_parentheses(s);
    let mut last_written_index = 0;
    for (index, &c) in s.iter().enumerate() {
        let escaped: &[u8] = match c {
            b'(' | b')' if unbalanced[index] => &s[index..=index],
            b'\\' => br"\",
            // a raw CR would read back as LF
            b'\r' => b"r",
            _ => continue,
        };
        writer.write(&s[last_written_index..index]);
        writer.write(br"\");
        writer.write(escaped);
        last_written_index = index + 1;
    }
    writer.write(&s[last_written_index..]);
    writer.write(b")");
}

impl Encoder<PdfString> for SimpleEncoder {
    fn write_to(&self, s: &PdfString, writer: &mut dyn Writer) {
        if self.hex_strings {
            writer.write(b"<");
            writer.write(hex::encode_upper(&s[..]).as_bytes());
            writer.write(b">");
        } else {
            write_literal(s, writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(s: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_literal(s, &mut out);
        out
    }

    #[test]
    fn test_simple() {
        assert_eq!(literal(b"abcdefg"), b"(abcdefg)");
        assert_eq!(literal(b""), b"()");
    }

    #[test]
    fn test_end_with_closing_paranthesis() {
        assert_eq!(literal(b"(abcdefg)"), b"((abcdefg))");
    }

    #[test]
    fn test_end_with_unmatched_closing_paranthesis() {
        assert_eq!(literal(b"abcdefg)"), br"(abcdefg\))");
    }

    #[test]
    fn test_many_unmatched_closing_paranthesis() {
        assert_eq!(literal(b")))"), br"(\)\)\))");
    }

    #[test]
    fn test_many_unmatched_opening_paranthesis() {
        assert_eq!(literal(b"((("), br"(\(\(\()");
    }

    #[test]
    fn test_many_matched_paranthesis() {
        assert_eq!(literal(b"((()))"), b"(((())))");
    }

    #[test]
    fn test_many_unmatched_paranthesis() {
        assert_eq!(literal(b"))(("), br"(\)\)\(\()");
        assert_eq!(literal(b"(()"), br"(\(())");
    }

    #[test]
    fn test_backslash_and_cr() {
        assert_eq!(literal(b"a\\b\r\n"), b"(a\\\\b\\r\n)");
    }

    #[test]
    fn test_reparse() {
        use crate::parse::{object::object, span};
        use crate::pdf::Object;

        let raw = b"x)\\(y\r\nz((".to_vec();
        let out = literal(&raw);
        let (_, parsed) = object(span(&out)).unwrap();
        assert_eq!(parsed, Object::from(PdfString::from(raw)));
    }
}
