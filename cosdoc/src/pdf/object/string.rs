use std::ops::Deref;

const UTF16_BOM: [u8; 2] = [0xfe, 0xff];

/// PDFDocEncoding code points for 0x80..=0xa0 that differ from Latin-1.
const PDF_DOC_HIGH: [u16; 33] = [
    0x2022, 0x2020, 0x2021, 0x2026, 0x2014, 0x2013, 0x0192, 0x2044, 0x2039, 0x203a, 0x2212, 0x2030,
    0x201e, 0x201c, 0x201d, 0x2018, 0x2019, 0x201a, 0x2122, 0xfb01, 0xfb02, 0x0141, 0x0152, 0x0160,
    0x0178, 0x017d, 0x0131, 0x0142, 0x0153, 0x0161, 0x017e, 0xfffd, 0x20ac,
];

/// A PDF string as raw bytes. Whether it is written in literal or hex form is
/// decided when saving.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct PdfString(Vec<u8>);

impl PdfString {
    /// Encode text as a PDF text string: plain bytes when the text is ASCII,
    /// UTF-16BE with a byte order mark otherwise.
    pub fn from_text(text: &str) -> Self {
        if text.is_ascii() {
            return Self(text.as_bytes().to_vec());
        }
        let mut bytes = UTF16_BOM.to_vec();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Self(bytes)
    }

    /// Decode a PDF text string (UTF-16BE with BOM, or PDFDocEncoding).
    pub fn to_text(&self) -> String {
        if let Some(utf16) = self.0.strip_prefix(&UTF16_BOM[..]) {
            let units: Vec<u16> = utf16
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                .collect();
            return String::from_utf16_lossy(&units);
        }

        self.0
            .iter()
            .map(|&b| match b {
                0x80..=0xa0 => char::from_u32(PDF_DOC_HIGH[usize::from(b - 0x80)].into()).unwrap_or('\u{fffd}'),
                _ => char::from(b),
            })
            .collect()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for PdfString {
    fn from(v: Vec<u8>) -> Self {
        PdfString(v)
    }
}

impl From<&[u8]> for PdfString {
    fn from(v: &[u8]) -> Self {
        PdfString(v.to_vec())
    }
}

impl From<&str> for PdfString {
    fn from(s: &str) -> Self {
        PdfString(s.as_bytes().to_vec())
    }
}

impl Deref for PdfString {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for PdfString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PdfString")
            .field(&String::from_utf8_lossy(&self.0[..]))
            .finish()
    }
}

impl std::fmt::Display for PdfString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_stays_plain() {
        let s = PdfString::from_text("Me, myself, and I");
        assert_eq!(&s[..], b"Me, myself, and I");
        assert_eq!(s.to_text(), "Me, myself, and I");
    }

    #[test]
    fn unicode_text_uses_utf16() {
        let s = PdfString::from_text("Grüße");
        assert_eq!(&s[..2], &UTF16_BOM[..]);
        assert_eq!(s.to_text(), "Grüße");
    }

    #[test]
    fn pdf_doc_encoding() {
        let s = PdfString::from(vec![b'a', 0x80, 0xa0, 0xe9]);
        assert_eq!(s.to_text(), "a\u{2022}\u{20ac}é");
    }
}
