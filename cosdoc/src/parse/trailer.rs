use nom_tracable::tracable_parser;

use super::{
    backward_search,
    object::{dictionary, keyword},
    ParseResult, Span,
};
use crate::pdf::{trailer::TRAILER, Dictionary};

/// `trailer << ... >>`
#[tracable_parser]
pub(crate) fn trailer(input: Span) -> ParseResult<Dictionary> {
    let (remainder, _) = keyword(TRAILER)(input)?;
    dictionary(remainder)
}

/// The last readable `trailer` dictionary in the input.
#[tracable_parser]
pub(crate) fn trailer_tail(input: Span) -> ParseResult<Dictionary> {
    // search from the end, a damaged trailer makes us look further back
    let (remainder, (trailing, trailer)) = backward_search(input.fragment().len(), trailer)(input)?;
    if !trailing.fragment().is_empty() {
        log::trace!("{} bytes follow the last trailer", trailing.fragment().len());
    }

    Ok((remainder, trailer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parse::span,
        pdf::{Object, Reference},
    };

    #[test]
    fn test_trailer() {
        let (_, dict) = trailer(span(b"trailer\n<< /Size 3 /Root 1 0 R >>\n")).unwrap();
        assert_eq!(dict.get(&b"Root"[..]), Some(&Object::Reference(Reference::new(1, 0))));
        assert!(trailer(span(b"trailers << >>")).is_err());
    }

    #[test]
    fn test_trailer_tail() {
        let input = b"trailer << /Size 1 >> junk trailer << /Size 2 >> startxref 0 %%EOF";
        let (_, dict) = trailer_tail(span(input)).unwrap();
        assert_eq!(dict.get(&b"Size"[..]), Some(&Object::Integer(2)));

        let damaged = b"trailer << /Size 1 >> junk trailer << /Size (2 >> %%EOF";
        let (_, dict) = trailer_tail(span(damaged)).unwrap();
        assert_eq!(dict.get(&b"Size"[..]), Some(&Object::Integer(1)));
    }
}
