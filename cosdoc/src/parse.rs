use fnv::FnvHashSet;
use nom::{bytes, character, IResult, Slice};
use nom_locate::LocatedSpan;
use nom_tracable::{tracable_parser, TracableInfo};

use self::error::{SyntaxError, SyntaxErrorKind};
use crate::{
    error::Warning,
    pdf::{trailer::Trailer, XrefChain, XrefKind},
};

pub mod error;
pub(crate) mod indirect;
pub mod object;
pub(crate) mod object_stream;
pub(crate) mod scan;
pub(crate) mod trailer;
pub(crate) mod xref;

pub type Span<'a> = LocatedSpan<&'a [u8], TracableInfo>;
pub type ParseResult<'a, O> = IResult<Span<'a>, O, SyntaxError<Span<'a>>>;

const HEADER: &[u8] = b"%PDF-";

/// Wrap a whole file. Offsets reported by the parsers are relative to `buf`.
pub fn span(buf: &[u8]) -> Span<'_> {
    let info = TracableInfo::new().forward(true).backward(true);
    LocatedSpan::new_extra(buf, info)
}

/// Search `parser` backwards starting at the end of the input, trying at most
/// `limit` start positions.
///
/// Returns the input in front of the match together with the remainder after
/// the match and the parser output.
pub(crate) fn backward_search<'a, O, F>(
    limit: usize,
    mut parser: F,
) -> impl FnMut(Span<'a>) -> ParseResult<'a, (Span<'a>, O)>
where
    F: FnMut(Span<'a>) -> ParseResult<'a, O>,
{
    move |input: Span<'a>| {
        let len = input.fragment().len();
        for start in (len.saturating_sub(limit)..len).rev() {
            if let Ok((trailing, out)) = parser(input.slice(start..)) {
                return Ok((input.slice(..start), (trailing, out)));
            }
        }
        Err(SyntaxError::error(input, SyntaxErrorKind::BackwardSearchNotFound))
    }
}

#[tracable_parser]
fn version(input: Span) -> ParseResult<(u8, u8)> {
    let (remainder, _) = bytes::complete::tag_no_case(HEADER)(input)?;
    let (remainder, major) = character::complete::u8(remainder)?;
    let (remainder, _) = character::complete::char('.')(remainder)?;
    let (remainder, minor) = character::complete::u8(remainder)?;

    Ok((remainder, (major, minor)))
}

/// Find the `%PDF-x.y` header within the first kilobyte.
pub(crate) fn header(buf: &[u8]) -> Option<(u8, u8)> {
    let window = &buf[..buf.len().min(1024)];
    let start = window.windows(HEADER.len()).position(|w| w == HEADER)?;
    version(span(buf).slice(start..)).ok().map(|(_, v)| v)
}

/// Walk the `Prev` chain starting at the offset given by `startxref`.
///
/// Broken links truncate the chain and are reported as warnings. Returns
/// `None` if not even the newest section could be read.
pub(crate) fn read_xref_chain(buf: &[u8], prefer_stream: bool, warnings: &mut Vec<Warning>) -> Option<XrefChain> {
    let file = span(buf);
    let start = match xref::startxref_tail(file) {
        Ok((_, start)) => start,
        Err(err) => {
            let err = crate::Error::from(err);
            log::warn!("No usable startxref: {}", err);
            warnings.push(Warning::CorruptXRef(err.to_string()));
            return None;
        }
    };

    let mut chain = XrefChain::new(prefer_stream);
    let mut visited = FnvHashSet::default();
    let mut next = Some(start);

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            log::warn!("Prev chain loops back to byte {}", offset);
            warnings.push(Warning::CorruptXRef(format!("Prev loops back to byte {}", offset)));
            break;
        }
        if offset >= buf.len() {
            log::warn!("xref offset {} is outside of the file ({} bytes)", offset, buf.len());
            warnings.push(Warning::CorruptXRef(format!(
                "xref offset {} is outside of the file",
                offset
            )));
            break;
        }

        let mut revision = match xref::section(file.slice(offset..)) {
            Ok((_, revision)) => revision,
            Err(err) => {
                let err = crate::Error::from(err);
                log::warn!("Unreadable xref section at byte {}: {}", offset, err);
                warnings.push(Warning::CorruptXRef(err.to_string()));
                break;
            }
        };

        let trailer = match Trailer::try_from(&revision.trailer) {
            Ok(trailer) => trailer,
            Err(err) => {
                log::warn!("Invalid trailer at byte {}: {:?}", offset, err);
                warnings.push(Warning::CorruptXRef(format!("invalid trailer at byte {}: {:?}", offset, err)));
                // keep the entries, but don't follow anything
                chain.record_older(revision);
                break;
            }
        };

        if let (Some(stm), XrefKind::Table) = (trailer.x_ref_stm, revision.kind) {
            let hybrid = if stm < buf.len() {
                xref::section(file.slice(stm..)).ok()
            } else {
                None
            };
            match hybrid {
                Some((_, hybrid)) => revision.hybrid_entries = Some(hybrid.entries),
                None => {
                    log::warn!("Unreadable XRefStm at byte {}", stm);
                    warnings.push(Warning::CorruptXRef(format!("unreadable XRefStm at byte {}", stm)));
                }
            }
        }

        chain.record_older(revision);
        next = trailer.previous;
    }

    if chain.is_empty() {
        None
    } else {
        Some(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert!(matches!(version(span(b"%PDF-1.7\n")), Ok((_, (1, 7)))));
        assert_eq!(header(b"junk\n%PDF-2.0\n"), Some((2, 0)));
        assert_eq!(header(b"%!PS-Adobe"), None);
    }

    #[test]
    fn test_backward_search() {
        let input = span(b"aaa trailer bbb trailer ccc");
        let (before, (after, _)) =
            backward_search(100, bytes::complete::tag::<_, _, SyntaxError<Span>>(&b"trailer"[..]))(input).unwrap();
        assert_eq!(before.fragment(), &&b"aaa trailer bbb "[..]);
        assert_eq!(after.fragment(), &&b" ccc"[..]);

        assert!(backward_search(3, bytes::complete::tag::<_, _, SyntaxError<Span>>(&b"trailer"[..]))(input).is_err());
    }

    #[test]
    fn broken_prev_truncates_chain() {
        let file = b"%PDF-1.4
1 0 obj
<< /Type /Catalog >>
endobj
xref
0 2
0000000000 65535 f\r
0000000009 00000 n\r
trailer
<< /Size 2 /Root 1 0 R /Prev 99999 >>
startxref
45
%%EOF";
        let mut warnings = Vec::new();
        let chain = read_xref_chain(file, true, &mut warnings).unwrap();
        assert_eq!(chain.revisions().len(), 1);
        assert!(matches!(warnings[..], [Warning::CorruptXRef(_)]));
        assert_eq!(
            chain.resolve(1),
            Some(crate::pdf::Location::Offset { offset: 9, generation: 0 })
        );
    }
}
