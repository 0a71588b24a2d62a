use nom::{branch, bytes, character, combinator, error::ErrorKind, multi, sequence, Slice};
use nom_tracable::tracable_parser;

use super::{
    error::{SyntaxError, SyntaxErrorKind},
    ParseResult, Span,
};
use crate::pdf::{Array, Dictionary, Name, Object, PdfString, Reference};

pub(crate) const TRUE_OBJECT: &[u8] = b"true";
pub(crate) const FALSE_OBJECT: &[u8] = b"false";
pub(crate) const NULL_OBJECT: &[u8] = b"null";
const DICT_START: &[u8] = b"<<";
const DICT_END: &[u8] = b">>";
/// Deepest nesting of arrays and dictionaries.
pub(crate) const MAX_DEPTH: usize = 100;

pub(crate) fn is_whitespace(chr: u8) -> bool {
    matches!(chr, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(chr: u8) -> bool {
    matches!(
        chr,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub(crate) fn is_regular(chr: u8) -> bool {
    !is_delimiter(chr) && !is_whitespace(chr)
}

/// Consume whitespace and comments.
pub(crate) fn space0(input: Span) -> ParseResult<()> {
    let bytes = *input.fragment();
    let mut pos = 0;
    while let Some(&chr) = bytes.get(pos) {
        if chr == b'%' {
            while bytes.get(pos).map_or(false, |&c| c != b'\r' && c != b'\n') {
                pos += 1;
            }
        } else if is_whitespace(chr) {
            pos += 1;
        } else {
            break;
        }
    }
    Ok((input.slice(pos..), ()))
}

/// The token must not continue with a regular character. Consumes the
/// following whitespace.
fn require_termination(input: Span) -> ParseResult<()> {
    match input.fragment().first() {
        Some(&chr) if is_regular(chr) => Err(SyntaxError::error(input, SyntaxErrorKind::Nom(ErrorKind::Verify))),
        _ => space0(input),
    }
}

/// Parse the keyword `kw` as a complete token.
pub(crate) fn keyword<'a>(kw: &'static [u8]) -> impl FnMut(Span<'a>) -> ParseResult<'a, Span<'a>> {
    move |input| sequence::terminated(bytes::complete::tag(kw), require_termination)(input)
}

#[tracable_parser]
pub(crate) fn bool_object(input: Span) -> ParseResult<Object> {
    branch::alt((
        combinator::value(Object::Bool(true), keyword(TRUE_OBJECT)),
        combinator::value(Object::Bool(false), keyword(FALSE_OBJECT)),
    ))(input)
}

#[tracable_parser]
pub(crate) fn null_object(input: Span) -> ParseResult<Object> {
    combinator::value(Object::Null, keyword(NULL_OBJECT))(input)
}

/// Integers and exponent-free reals. Integers that overflow become reals.
#[tracable_parser]
pub(crate) fn number_object(input: Span) -> ParseResult<Object> {
    let bytes = *input.fragment();
    let digits = |from: usize| bytes[from..].iter().take_while(|c| c.is_ascii_digit()).count();

    let mut pos = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let int_digits = digits(pos);
    pos += int_digits;
    let is_real = bytes.get(pos) == Some(&b'.');
    let mut frac_digits = 0;
    if is_real {
        pos += 1;
        frac_digits = digits(pos);
        pos += frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return Err(SyntaxError::error(input, SyntaxErrorKind::Nom(ErrorKind::Digit)));
    }

    let invalid = || SyntaxError::error(input, SyntaxErrorKind::Nom(ErrorKind::Float));
    let text = std::str::from_utf8(&bytes[..pos]).map_err(|_| invalid())?;
    let obj = if is_real {
        text.parse::<f64>().map(Object::Real).map_err(|_| invalid())?
    } else {
        match text.parse::<i64>() {
            Ok(i) => Object::Integer(i),
            Err(_) => text.parse::<f64>().map(Object::Real).map_err(|_| invalid())?,
        }
    };

    let (remainder, _) = require_termination(input.slice(pos..))?;
    Ok((remainder, obj))
}

/// Resolve `#xx` escapes. Malformed escapes are kept verbatim.
fn decode_name(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            if let Some(byte) = raw.get(i + 1..i + 3).and_then(|h| hex::decode(h).ok()) {
                out.extend_from_slice(&byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

#[tracable_parser]
pub(crate) fn name(input: Span) -> ParseResult<Name> {
    let (remainder, _) = character::complete::char('/')(input)?;
    let (remainder, raw) = bytes::complete::take_while(is_regular)(remainder)?;
    let (remainder, _) = space0(remainder)?;

    Ok((remainder, Name::from(decode_name(raw.fragment()))))
}

pub(crate) fn name_object(input: Span) -> ParseResult<Object> {
    combinator::map(name, Object::Name)(input)
}

/// A parenthesized string with escapes resolved and line ends normalized to
/// `\n`.
#[tracable_parser]
pub(crate) fn literal_string(input: Span) -> ParseResult<PdfString> {
    let bytes = *input.fragment();
    if bytes.first() != Some(&b'(') {
        return Err(SyntaxError::error(input, SyntaxErrorKind::Nom(ErrorKind::Char)));
    }
    let unterminated = || SyntaxError::failure(input, SyntaxErrorKind::Nom(ErrorKind::Eof));

    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut pos = 1;
    loop {
        let chr = *bytes.get(pos).ok_or_else(unterminated)?;
        pos += 1;
        match chr {
            b'(' => {
                depth += 1;
                out.push(chr);
            }
            b')' if depth == 0 => break,
            b')' => {
                depth -= 1;
                out.push(chr);
            }
            b'\r' => {
                out.push(b'\n');
                if bytes.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            b'\\' => {
                let escaped = *bytes.get(pos).ok_or_else(unterminated)?;
                pos += 1;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    // line continuation
                    b'\r' => {
                        if bytes.get(pos) == Some(&b'\n') {
                            pos += 1;
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = u32::from(escaped - b'0');
                        for _ in 0..2 {
                            match bytes.get(pos) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    pos += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push((value & 0xff) as u8);
                    }
                    // `\(`, `\)`, `\\` and unknown escapes drop the backslash
                    other => out.push(other),
                }
            }
            _ => out.push(chr),
        }
    }

    let (remainder, _) = space0(input.slice(pos..))?;
    Ok((remainder, out.into()))
}

#[tracable_parser]
pub(crate) fn hex_string(input: Span) -> ParseResult<PdfString> {
    let (remainder, content) = sequence::delimited(
        sequence::terminated(character::complete::char('<'), combinator::not(character::complete::char('<'))),
        bytes::complete::take_while(|c: u8| c != b'>'),
        character::complete::char('>'),
    )(input)?;

    let mut digits: Vec<u8> = content.fragment().iter().copied().filter(|&c| !is_whitespace(c)).collect();
    // a missing last digit counts as 0
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    let decoded =
        hex::decode(&digits).map_err(|_| SyntaxError::failure(input, SyntaxErrorKind::Nom(ErrorKind::HexDigit)))?;

    let (remainder, _) = space0(remainder)?;
    Ok((remainder, decoded.into()))
}

pub(crate) fn string_object(input: Span) -> ParseResult<Object> {
    combinator::map(branch::alt((literal_string, hex_string)), Object::String)(input)
}

fn dictionary_entry(input: Span, depth: usize) -> ParseResult<(Name, Object)> {
    let (remainder, name) = name(input)?;
    let (remainder, obj) = object_at(remainder, depth)?;

    Ok((remainder, (name, obj)))
}

fn dictionary_at(input: Span, depth: usize) -> ParseResult<Dictionary> {
    sequence::delimited(
        sequence::terminated(bytes::complete::tag(DICT_START), space0),
        multi::fold_many0(
            |i| dictionary_entry(i, depth + 1),
            Dictionary::new,
            |mut acc, (name, obj)| {
                acc.insert(name, obj);
                acc
            },
        ),
        sequence::terminated(bytes::complete::tag(DICT_END), space0),
    )(input)
}

#[tracable_parser]
pub(crate) fn dictionary(input: Span) -> ParseResult<Dictionary> {
    dictionary_at(input, 0)
}

fn array_at(input: Span, depth: usize) -> ParseResult<Array> {
    sequence::delimited(
        sequence::terminated(character::complete::char('['), space0),
        multi::fold_many0(
            |i| object_at(i, depth + 1),
            Array::new,
            |mut acc, obj| {
                acc.push(obj);
                acc
            },
        ),
        sequence::terminated(character::complete::char(']'), space0),
    )(input)
}

/// `N G R`
#[tracable_parser]
pub(crate) fn reference(input: Span) -> ParseResult<Reference> {
    let (remainder, number) = character::complete::u32(input)?;
    let (remainder, _) = space0(remainder)?;
    let (remainder, generation) = character::complete::u16(remainder)?;
    let (remainder, _) = space0(remainder)?;
    let (remainder, _) = keyword(b"R")(remainder)?;

    Ok((remainder, Reference::new(number, generation)))
}

pub(crate) fn reference_object(input: Span) -> ParseResult<Object> {
    combinator::map(reference, Object::Reference)(input)
}

/// A direct object.
#[tracable_parser]
pub fn object(input: Span) -> ParseResult<Object> {
    object_at(input, 0)
}

/// A direct object nested `depth` arrays or dictionaries deep.
fn object_at(input: Span, depth: usize) -> ParseResult<Object> {
    if depth > MAX_DEPTH {
        return Err(SyntaxError::failure(input, SyntaxErrorKind::TooDeep));
    }
    // The order is important!
    branch::alt((
        combinator::map(|i| dictionary_at(i, depth), Object::Dictionary),
        combinator::map(|i| array_at(i, depth), Object::Array),
        string_object,
        // references have to be tested before we try to parse an integer.
        // `0 0 R` is a reference while `0 0` are two integers.
        reference_object,
        number_object,
        bool_object,
        null_object,
        name_object,
    ))(input)
}
