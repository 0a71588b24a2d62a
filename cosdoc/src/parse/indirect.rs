use nom::{branch, bytes, character, Slice};
use nom_tracable::tracable_parser;

use super::{
    error::{SyntaxError, SyntaxErrorKind},
    object::{dictionary, is_whitespace, keyword, object, space0},
    ParseResult, Span,
};
use crate::pdf::{document::K_LENGTH, Dictionary, Object, Reference, Stream};

pub(crate) const OBJ: &[u8] = b"obj";
pub(crate) const ENDOBJ: &[u8] = b"endobj";
pub(crate) const STREAM: &[u8] = b"stream";
pub(crate) const ENDSTREAM: &[u8] = b"endstream";

/// Resolves a `Length` entry given as an indirect reference.
pub(crate) trait LengthResolver {
    fn resolve_length(&self, reference: Reference) -> Option<usize>;
}

/// Never resolves; indirect lengths fall back to scanning for `endstream`.
impl LengthResolver for () {
    fn resolve_length(&self, _reference: Reference) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndirectObject {
    pub reference: Reference,
    pub object: Object,
    /// Whether the closing `endobj` was present.
    pub terminated: bool,
    /// Byte offset right after `endobj`, or after the body when it is missing.
    pub end: usize,
}

/// `N G obj`
#[tracable_parser]
pub(crate) fn object_header(input: Span) -> ParseResult<Reference> {
    let (remainder, number) = character::complete::u32(input)?;
    let (remainder, _) = space0(remainder)?;
    let (remainder, generation) = character::complete::u16(remainder)?;
    let (remainder, _) = space0(remainder)?;
    let (remainder, _) = keyword(OBJ)(remainder)?;

    Ok((remainder, Reference::new(number, generation)))
}

/// `stream` followed by CRLF or LF. A lone CR and trailing spaces are
/// tolerated.
fn stream_start(input: Span) -> ParseResult<()> {
    let (remainder, _) = bytes::complete::tag(STREAM)(input)?;
    let (remainder, _) = bytes::complete::take_while(|c: u8| c == b' ')(remainder)?;
    let (remainder, _) = branch::alt((
        bytes::complete::tag(&b"\r\n"[..]),
        bytes::complete::tag(&b"\n"[..]),
        bytes::complete::tag(&b"\r"[..]),
    ))(remainder)?;
    Ok((remainder, ()))
}

/// Whether `bytes` continues with `endstream` after optional whitespace.
fn ends_stream(bytes: &[u8]) -> bool {
    let start = bytes.iter().position(|&c| !is_whitespace(c)).unwrap_or(bytes.len());
    bytes[start..].starts_with(ENDSTREAM)
}

/// Length of the data in front of the next `endstream` without the end of
/// line marker that precedes the keyword.
fn scan_endstream(bytes: &[u8]) -> Option<usize> {
    let (_, data) = bytes::complete::take_until::<_, _, ()>(ENDSTREAM)(bytes).ok()?;
    let trimmed = data
        .strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .or_else(|| data.strip_suffix(b"\r"))
        .unwrap_or(data);
    Some(trimmed.len())
}

fn stream<'a>(input: Span<'a>, dictionary: Dictionary, lengths: &dyn LengthResolver) -> ParseResult<'a, Stream> {
    let (data_start, _) = stream_start(input)?;
    let bytes = *data_start.fragment();

    let declared = match dictionary.get(K_LENGTH) {
        Some(Object::Integer(len)) => usize::try_from(*len).ok(),
        Some(Object::Reference(r)) => lengths.resolve_length(*r),
        _ => None,
    };
    let length = match declared.filter(|&len| len <= bytes.len() && ends_stream(&bytes[len..])) {
        Some(len) => Some(len),
        None => {
            log::debug!(
                "Stream Length {:?} at byte {} is unusable, searching for endstream",
                declared,
                data_start.location_offset()
            );
            scan_endstream(bytes)
        }
    };
    let length = length.ok_or_else(|| SyntaxError::failure(input, SyntaxErrorKind::MalformedStream))?;

    let (remainder, _) = space0(data_start.slice(length..))?;
    let (remainder, _) = keyword(ENDSTREAM)(remainder)
        .map_err(|_| SyntaxError::failure(input, SyntaxErrorKind::MalformedStream))?;

    Ok((remainder, Stream::new(dictionary, bytes[..length].to_vec())))
}

/// The value of an indirect object: a direct object or a stream.
pub(crate) fn object_body<'a>(input: Span<'a>, lengths: &dyn LengthResolver) -> ParseResult<'a, Object> {
    if let Ok((after_dict, dict)) = dictionary(input) {
        return if stream_start(after_dict).is_ok() {
            let (remainder, stream) = stream(after_dict, dict, lengths)?;
            Ok((remainder, Object::Stream(stream)))
        } else {
            Ok((after_dict, Object::Dictionary(dict)))
        };
    }

    // `N G obj endobj` is read as null
    if keyword(ENDOBJ)(input).is_ok() {
        return Ok((input, Object::Null));
    }
    object(input)
}

/// `N G obj <body> endobj`. A missing `endobj` is tolerated.
pub(crate) fn indirect_object<'a>(input: Span<'a>, lengths: &dyn LengthResolver) -> ParseResult<'a, IndirectObject> {
    let (remainder, reference) = object_header(input)?;
    let (remainder, object) = object_body(remainder, lengths)?;
    let (remainder, terminated, end) = match keyword(ENDOBJ)(remainder) {
        Ok((r, tag)) => (r, true, tag.location_offset() + tag.fragment().len()),
        Err(_) => (remainder, false, remainder.location_offset()),
    };

    log::trace!("Parsed object {} at byte {}", reference, input.location_offset());
    Ok((
        remainder,
        IndirectObject {
            reference,
            object,
            terminated,
            end,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::span;

    struct Fixed(usize);

    impl LengthResolver for Fixed {
        fn resolve_length(&self, _reference: Reference) -> Option<usize> {
            Some(self.0)
        }
    }

    #[test]
    fn test_indirect_object() {
        let (_, indirect) = indirect_object(span(b"12 0 obj null endobj "), &()).unwrap();
        assert_eq!(indirect.reference, Reference::new(12, 0));
        assert_eq!(indirect.object, Object::Null);
        assert!(indirect.terminated);
        assert_eq!(indirect.end, 20);

        let (_, empty) = indirect_object(span(b"3 1 obj\nendobj"), &()).unwrap();
        assert_eq!(empty.object, Object::Null);
        assert_eq!(empty.reference, Reference::new(3, 1));
    }

    #[test]
    fn missing_endobj_is_tolerated() {
        let (remainder, indirect) = indirect_object(span(b"1 0 obj [1 2]\n2 0 obj"), &()).unwrap();
        assert!(!indirect.terminated);
        assert_eq!(remainder.fragment(), &&b"2 0 obj"[..]);
    }

    #[test]
    fn stream_with_direct_length() {
        let input = b"4 0 obj\n<< /Length 5 >>\nstream\r\nhello\nendstream\nendobj\n";
        let (_, indirect) = indirect_object(span(input), &()).unwrap();
        let stream = indirect.object.stream().unwrap();
        assert_eq!(stream.raw_data(), b"hello");
    }

    #[test]
    fn stream_with_wrong_length_is_recovered() {
        let input = b"4 0 obj\n<< /Length 500 >>\nstream\nhello world\nendstream\nendobj\n";
        let (_, indirect) = indirect_object(span(input), &()).unwrap();
        let stream = indirect.object.stream().unwrap();
        assert_eq!(stream.raw_data(), b"hello world");
        assert_eq!(stream.dictionary().get(K_LENGTH), Some(&Object::Integer(11)));
    }

    #[test]
    fn stream_with_indirect_length() {
        // the data contains the keyword, only the resolved length finds the end
        let input = b"4 0 obj\n<< /Length 9 0 R >>\nstream\nendstream\nendstream\nendobj\n";
        let (_, indirect) = indirect_object(span(input), &Fixed(10)).unwrap();
        assert_eq!(indirect.object.stream().unwrap().raw_data(), b"endstream\n");

        let (_, fallback) = indirect_object(span(input), &()).unwrap();
        assert_eq!(fallback.object.stream().unwrap().raw_data(), b"");
    }

    #[test]
    fn stream_without_end() {
        let input = b"4 0 obj\n<< /Length 50 >>\nstream\ndata";
        let err = indirect_object(span(input), &()).unwrap_err();
        assert!(matches!(
            err,
            nom::Err::Failure(SyntaxError {
                kind: SyntaxErrorKind::MalformedStream,
                ..
            })
        ));
    }
}
