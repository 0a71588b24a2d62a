use nom::{branch, bytes, character, combinator, multi};
use nom_tracable::tracable_parser;

use super::{
    backward_search,
    error::{SyntaxError, SyntaxErrorKind},
    indirect::indirect_object,
    object::{keyword, space0},
    trailer::trailer,
    ParseResult, Span,
};
use crate::pdf::{
    document::{dict_types::XREF as XREF_TYPE, has_type, K_INDEX, K_W},
    trailer::K_SIZE,
    xref::{FreeObject, Unsupported, UsedCompressedObject, UsedObject, XREF_COMPRESSED, XREF_FREE, XREF_USED},
    Object, Revision, Stream, XrefEntry, XrefKind,
};

pub(crate) const STARTXREF: &[u8] = b"startxref";
pub(crate) const XREF: &[u8] = b"xref";

#[tracable_parser]
pub(crate) fn startxref_tail(input: Span) -> ParseResult<usize> {
    let (remainder, (trailing, _)) =
        backward_search(STARTXREF.len() + 2048, bytes::complete::tag_no_case(STARTXREF))(input)?;
    let (trailing, _) = space0(trailing)?;
    let (_, xref_pos) = character::complete::u64(trailing)?;
    let xref_pos: usize = xref_pos
        .try_into()
        .map_err(|_| SyntaxError::error(input, SyntaxErrorKind::StartxrefInvalid))?;

    Ok((remainder, xref_pos))
}

#[tracable_parser]
fn xref_entries(input: Span) -> ParseResult<Vec<XrefEntry>> {
    let (remainder, first) = character::complete::u32(input)?;
    let (remainder, _) = character::complete::space1(remainder)?;
    let (remainder, obj_count) = character::complete::u32(remainder)?;
    let (remainder, _) = space0(remainder)?;

    // every entry takes 20 bytes, don't trust counts the input can't hold
    let capacity = usize::try_from(obj_count).unwrap_or(0).min(remainder.fragment().len() / 20);
    let mut entries = Vec::<XrefEntry>::with_capacity(capacity);

    let mut remainder = remainder;
    for i in 0..obj_count {
        let number = first
            .checked_add(i)
            .ok_or_else(|| SyntaxError::failure(input, SyntaxErrorKind::XrefInvalid))?;
        let (inner_rmndr, offset) = character::complete::u64(remainder)?;
        let (inner_rmndr, _) = character::complete::space1(inner_rmndr)?;
        let (inner_rmndr, generation) = character::complete::u16(inner_rmndr)?;
        let (inner_rmndr, _) = character::complete::space1(inner_rmndr)?;
        let (inner_rmndr, free) = branch::alt((
            combinator::value(false, bytes::complete::tag(&b"n"[..])),
            combinator::value(true, bytes::complete::tag(&b"f"[..])),
        ))(inner_rmndr)?;
        let (inner_rmndr, _) = space0(inner_rmndr)?;

        let invalid = || SyntaxError::failure(remainder, SyntaxErrorKind::XrefInvalid);
        entries.push(if free {
            FreeObject {
                number,
                generation,
                next_free: offset.try_into().map_err(|_| invalid())?,
            }
            .into()
        } else {
            UsedObject {
                number,
                byte_offset: offset.try_into().map_err(|_| invalid())?,
                generation,
            }
            .into()
        });
        remainder = inner_rmndr;
    }

    Ok((remainder, entries))
}

/// Classical `xref` table followed by its trailer.
#[tracable_parser]
pub(crate) fn xref_table(input: Span) -> ParseResult<Revision> {
    let (remainder, _) = keyword(XREF)(input)?;
    let (remainder, sections) = multi::many1(xref_entries)(remainder)?;
    let (remainder, trailer) = trailer(remainder)?;

    Ok((
        remainder,
        Revision {
            startxref: input.location_offset(),
            kind: XrefKind::Table,
            trailer,
            entries: sections.into_iter().flatten().collect::<Vec<_>>().into(),
            hybrid_entries: None,
        },
    ))
}

/// Cross-reference stream object.
#[tracable_parser]
pub(crate) fn xref_stream(input: Span) -> ParseResult<Revision> {
    let (remainder, indirect) = indirect_object(input, &())?;
    let stream = match indirect.object {
        Object::Stream(stream) if has_type(stream.dictionary(), XREF_TYPE) => stream,
        _ => return Err(SyntaxError::error(input, SyntaxErrorKind::XrefInvalid)),
    };
    let entries = xref_stream_entries(&stream).map_err(|kind| SyntaxError::failure(input, kind))?;

    Ok((
        remainder,
        Revision {
            startxref: input.location_offset(),
            kind: XrefKind::Stream(indirect.reference),
            trailer: stream.dictionary().clone(),
            entries: entries.into(),
            hybrid_entries: None,
        },
    ))
}

/// A cross-reference section of either form.
pub(crate) fn section(input: Span) -> ParseResult<Revision> {
    branch::alt((xref_table, xref_stream))(input)
}

fn read_field(data: &[u8]) -> u64 {
    data.iter().fold(0, |acc, &b| acc.wrapping_shl(8) | u64::from(b))
}

fn integers(obj: Option<&Object>) -> Option<Vec<u64>> {
    obj?.array()?
        .iter()
        .map(|o| o.integer().and_then(|i| u64::try_from(i).ok()))
        .collect()
}

/// Decode the binary entries of a cross-reference stream.
pub(crate) fn xref_stream_entries(stream: &Stream) -> Result<Vec<XrefEntry>, SyntaxErrorKind> {
    let dict = stream.dictionary();
    let w = integers(dict.get(K_W)).ok_or(SyntaxErrorKind::XrefInvalid)?;
    let (w1, w2, w3) = match w[..] {
        [w1, w2, w3] if w1 <= 8 && w2 <= 8 && w3 <= 8 => (w1 as usize, w2 as usize, w3 as usize),
        _ => return Err(SyntaxErrorKind::XrefInvalid),
    };
    let size = dict
        .get(K_SIZE)
        .and_then(Object::integer)
        .and_then(|s| u64::try_from(s).ok())
        .ok_or(SyntaxErrorKind::XrefInvalid)?;
    let index = match integers(dict.get(K_INDEX)) {
        Some(index) if index.len() % 2 == 0 => index,
        Some(_) => return Err(SyntaxErrorKind::XrefInvalid),
        None => vec![0, size],
    };

    let data = stream.decoded_data()?;
    let entry_len = w1 + w2 + w3;
    if entry_len == 0 {
        return Err(SyntaxErrorKind::XrefInvalid);
    }
    let mut rows = data.chunks_exact(entry_len);
    let mut entries = Vec::with_capacity(data.len() / entry_len);

    for pair in index.chunks_exact(2) {
        for number in pair[0]..pair[0].saturating_add(pair[1]) {
            let row = match rows.next() {
                Some(row) => row,
                None => {
                    log::warn!("xref stream holds fewer entries than its Index announces");
                    return Ok(entries);
                }
            };
            let number = u32::try_from(number).map_err(|_| SyntaxErrorKind::XrefInvalid)?;
            // a missing type field defaults to 1
            let type_num = if w1 == 0 { XREF_USED } else { read_field(&row[..w1]) };
            let f2 = read_field(&row[w1..w1 + w2]);
            let f3 = read_field(&row[w1 + w2..]);
            let invalid = |_| SyntaxErrorKind::XrefInvalid;

            entries.push(match type_num {
                XREF_FREE => FreeObject {
                    number,
                    next_free: f2.try_into().map_err(invalid)?,
                    generation: f3.try_into().map_err(invalid)?,
                }
                .into(),
                XREF_USED => UsedObject {
                    number,
                    byte_offset: f2.try_into().map_err(invalid)?,
                    generation: f3.try_into().map_err(invalid)?,
                }
                .into(),
                XREF_COMPRESSED => UsedCompressedObject {
                    number,
                    containing_object: f2.try_into().map_err(invalid)?,
                    index: f3.try_into().map_err(invalid)?,
                }
                .into(),
                type_num => Unsupported {
                    number,
                    type_num,
                    w1: f2,
                    w2: f3,
                }
                .into(),
            });
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parse::span,
        pdf::{Dictionary, Name},
    };

    #[test]
    fn test_startxref_tail() {
        let input = &b"         startxref\n2132"[..];
        let res = startxref_tail(span(input));
        assert!(matches!(res, Ok((_, 2132))));

        let input = &b"         startxref\n555\n%%EOF\n"[..];
        let res = startxref_tail(span(input));
        assert!(matches!(res, Ok((_, 555))));
    }

    #[test]
    fn test_invalid_startxref_tail() {
        // to big
        let input = &b"         startxref\n9999999999999999999999999999999"[..];
        let res = startxref_tail(span(input));
        assert!(matches!(res, Err(nom::Err::Error(_))));
    }

    #[test]
    fn test_xref_table() {
        let input = b"xref
0 3
0000000000 65535 f\r
0000000017 00000 n\r
0000000000 00001 f\r
7 1
0000000230 00002 n\r
trailer
<< /Size 8 >>
";
        let (_, revision) = xref_table(span(input)).unwrap();
        assert_eq!(revision.kind, XrefKind::Table);
        assert_eq!(revision.trailer.get(K_SIZE), Some(&Object::Integer(8)));
        let entries: Vec<_> = revision.entries.entries().cloned().collect();
        assert_eq!(
            entries,
            vec![
                FreeObject {
                    number: 0,
                    generation: 65535,
                    next_free: 0
                }
                .into(),
                UsedObject {
                    number: 1,
                    byte_offset: 17,
                    generation: 0
                }
                .into(),
                FreeObject {
                    number: 2,
                    generation: 1,
                    next_free: 0
                }
                .into(),
                UsedObject {
                    number: 7,
                    byte_offset: 230,
                    generation: 2
                }
                .into(),
            ]
        );
    }

    #[test]
    fn test_xref_stream_entries() {
        let mut dict = Dictionary::new();
        dict.insert(Name::from("Type"), Object::Name(Name::from("XRef")));
        dict.insert(Name::from("Size"), Object::Integer(12));
        dict.insert(
            Name::from("W"),
            Object::from(vec![Object::Integer(1), Object::Integer(2), Object::Integer(1)]),
        );
        dict.insert(
            Name::from("Index"),
            Object::from(vec![Object::Integer(0), Object::Integer(1), Object::Integer(10), Object::Integer(2)]),
        );
        let data = vec![
            0, 0x00, 0x00, 0xff, // 0: free
            1, 0x01, 0x10, 0x00, // 10: offset 272
            2, 0x00, 0x0b, 0x03, // 11: in object stream 11, index 3
        ];
        let stream = Stream::new(dict, data);

        let entries = xref_stream_entries(&stream).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].location(), crate::pdf::Location::Free { next: 0, generation: 255 });
        assert_eq!(
            entries[1],
            UsedObject {
                number: 10,
                byte_offset: 272,
                generation: 0
            }
            .into()
        );
        assert_eq!(
            entries[2],
            UsedCompressedObject {
                number: 11,
                containing_object: 11,
                index: 3
            }
            .into()
        );
    }

    #[test]
    fn xref_stream_requires_type() {
        let input = b"5 0 obj\n<< /Length 0 >>\nstream\n\nendstream\nendobj\n";
        assert!(section(span(input)).is_err());
    }
}
