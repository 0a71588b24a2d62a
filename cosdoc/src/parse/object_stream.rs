use nom::{character, Slice};

use super::{error::SyntaxErrorKind, object::object, object::space0, span, ParseResult, Span};
use crate::pdf::{
    document::{dict_types::OBJECT_STREAM, has_type, K_FIRST, K_STREAM_OBJECT_COUNT},
    Object, Stream,
};

/// `N1 O1 N2 O2 ...`: object numbers and offsets relative to `First`.
fn parse_header(input: Span, obj_count: usize) -> ParseResult<Vec<(u32, usize)>> {
    let mut remainder = input;
    let mut pairs = Vec::with_capacity(obj_count.min(input.fragment().len() / 4));
    for _ in 0..obj_count {
        let (r, _) = space0(remainder)?;
        let (r, obj_number) = character::complete::u32(r)?;
        let (r, _) = space0(r)?;
        let (r, byte_offset) = character::complete::u64(r)?;
        let byte_offset = usize::try_from(byte_offset).unwrap_or(usize::MAX);
        remainder = r;
        pairs.push((obj_number, byte_offset));
    }

    Ok((remainder, pairs))
}

/// Parse all objects of an object stream. Objects that fail to parse read as
/// null.
pub(crate) fn object_stream(stream: &Stream) -> Result<Vec<(u32, Object)>, SyntaxErrorKind> {
    let dict = stream.dictionary();
    if !has_type(dict, OBJECT_STREAM) {
        return Err(SyntaxErrorKind::UnexpectedObject);
    }
    let count = |key: &[u8]| {
        dict.get(key)
            .and_then(Object::integer)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(SyntaxErrorKind::MalformedStream)
    };
    let obj_count = count(K_STREAM_OBJECT_COUNT)?;
    let first_offset = count(K_FIRST)?;

    let data = stream.decoded_data()?;
    let content = span(&data[..]);
    let (_, pairs) = parse_header(content, obj_count).map_err(|_| SyntaxErrorKind::MalformedStream)?;

    let objects = pairs
        .into_iter()
        .map(|(number, offset)| {
            let position = first_offset.saturating_add(offset);
            let parsed = if position < data.len() {
                object(content.slice(position..)).ok()
            } else {
                None
            };
            match parsed {
                Some((_, obj)) => (number, obj),
                None => {
                    log::warn!("Object {} at position {} of an object stream is unreadable", number, position);
                    (number, Object::Null)
                }
            }
        })
        .collect();

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{
        document::K_TYPE,
        Dictionary, Filter, Name,
    };

    fn obj_stream(count: i64, first: i64) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert(Name::from(K_TYPE), Object::from(Name::from(OBJECT_STREAM)));
        dict.insert(Name::from(K_STREAM_OBJECT_COUNT), Object::Integer(count));
        dict.insert(Name::from(K_FIRST), Object::Integer(first));
        dict
    }

    #[test]
    fn test_object_stream_empty() {
        let input_stream = Stream::new(obj_stream(0, 0), Vec::new());
        assert_eq!(object_stream(&input_stream), Ok(vec![]))
    }

    #[test]
    fn test_object_stream_single() {
        let input_stream = Stream::new(obj_stream(1, 6), b"123 0 999".to_vec());
        assert_eq!(object_stream(&input_stream), Ok(vec![(123, Object::Integer(999))]))
    }

    #[test]
    fn test_object_stream_compressed() {
        let data = b"11 0 12 9\n<</A 1>> [/B]";
        let stream = Stream::encoded(obj_stream(2, 10), data, Filter::Flate).unwrap();
        let objects = object_stream(&stream).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].0, 11);
        assert_eq!(objects[0].1.get(b"A"), Some(&Object::Integer(1)));
        assert_eq!(objects[1], (12, Object::from(vec![Object::Name(Name::from("B"))])));
    }

    #[test]
    fn test_object_stream_wrong_type() {
        let stream = Stream::new(Dictionary::new(), Vec::new());
        assert_eq!(object_stream(&stream), Err(SyntaxErrorKind::UnexpectedObject));
    }
}
