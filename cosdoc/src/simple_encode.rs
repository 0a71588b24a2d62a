use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    parse::object::{FALSE_OBJECT, NULL_OBJECT, TRUE_OBJECT},
    pdf::{Array, Dictionary, Object, Reference},
    writer::{Encoder, Writer},
};

pub(crate) mod indirect;
pub(crate) mod name;
pub(crate) mod section;
pub(crate) mod stream;
pub(crate) mod string;

static DEFAULT_HEX_STRINGS: AtomicBool = AtomicBool::new(false);

/// Choose whether strings are written as `<hex>` instead of `(literal)` when
/// a save does not ask for hex strings itself.
pub fn set_default_hex_strings(hex: bool) {
    DEFAULT_HEX_STRINGS.store(hex, Ordering::Relaxed);
}

pub fn default_hex_strings() -> bool {
    DEFAULT_HEX_STRINGS.load(Ordering::Relaxed)
}

/// Writes objects in their canonical textual form, one space between tokens.
#[derive(Debug, Clone, Copy)]
pub struct SimpleEncoder {
    pub hex_strings: bool,
}

impl Default for SimpleEncoder {
    fn default() -> Self {
        Self {
            hex_strings: default_hex_strings(),
        }
    }
}

/// Encode a direct object with the default settings.
pub fn encode_to_vec(obj: &Object) -> Vec<u8> {
    let mut out = Vec::new();
    SimpleEncoder::default().write_to(obj, &mut out);
    out
}

/// Shortest decimal form that reads back as the same real. Reals never use
/// exponents and always carry a decimal point.
fn format_real(f: f64) -> String {
    if !f.is_finite() {
        log::warn!("Writing non-finite real {} as 0.0", f);
        return "0.0".to_string();
    }
    let mut s = f.to_string();
    if !s.contains('.') {
        s.push_str(".0");
    }
    s
}

impl Encoder<Object> for SimpleEncoder {
    fn write_to(&self, obj: &Object, writer: &mut dyn Writer) {
        match obj {
            Object::Null => writer.write(NULL_OBJECT),
            Object::Bool(true) => writer.write(TRUE_OBJECT),
            Object::Bool(false) => writer.write(FALSE_OBJECT),
            Object::Integer(i) => writer.write(i.to_string().as_bytes()),
            Object::Real(f) => writer.write(format_real(*f).as_bytes()),
            Object::String(s) => self.write_to(s, writer),
            Object::Name(n) => self.write_to(n, writer),
            Object::Array(a) => self.write_to(a, writer),
            Object::Dictionary(d) => self.write_to(d, writer),
            Object::Stream(s) => self.write_to(s, writer),
            Object::Reference(r) => self.write_to(r, writer),
        }
    }
}

impl Encoder<Reference> for SimpleEncoder {
    fn write_to(&self, r: &Reference, writer: &mut dyn Writer) {
        writer.write(r.to_string().as_bytes());
    }
}

impl Encoder<Array> for SimpleEncoder {
    fn write_to(&self, array: &Array, writer: &mut dyn Writer) {
        writer.write(b"[");
        for (i, item) in array.iter().enumerate() {
            if i != 0 {
                writer.write(b" ");
            }
            self.write_to(item, writer);
        }
        writer.write(b"]");
    }
}

impl Encoder<Dictionary> for SimpleEncoder {
    fn write_to(&self, dict: &Dictionary, writer: &mut dyn Writer) {
        writer.write(b"<<");
        for (i, (key, value)) in dict.iter().enumerate() {
            if i != 0 {
                writer.write(b" ");
            }
            self.write_to(key, writer);
            writer.write(b" ");
            self.write_to(value, writer);
        }
        writer.write(b">>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{Name, PdfString};

    fn encode(obj: &Object) -> String {
        String::from_utf8(encode_to_vec(obj)).unwrap()
    }

    #[test]
    fn empty_array() {
        assert_eq!(encode(&Object::from(Array::new())), "[]");
    }

    #[test]
    fn array_with_numbers() {
        let array = Array::from(vec![Object::Integer(0), Object::Integer(-1), Object::Real(2.5)]);
        assert_eq!(encode(&Object::from(array)), "[0 -1 2.5]");
    }

    #[test]
    fn reals() {
        assert_eq!(format_real(1.0), "1.0");
        assert_eq!(format_real(-0.125), "-0.125");
        assert_eq!(format_real(0.1), "0.1");
        assert_eq!(format_real(1e-7), "0.0000001");
        assert_eq!(format_real(f64::NAN), "0.0");
    }

    #[test]
    fn empty_dict() {
        assert_eq!(encode(&Object::from(Dictionary::new())), "<<>>");
    }

    #[test]
    fn filled_dict_keeps_order() {
        let mut d = Dictionary::new();
        d.insert(Name::from("one"), Object::Integer(1));
        d.insert(Name::from("two"), Object::Reference(Reference::new(12, 3)));
        d.insert(Name::from("three"), Object::Null);
        d.insert(Name::from("four"), Object::from(Name::from("Four")));
        assert_eq!(encode(&Object::from(d)), "<</one 1 /two 12 3 R /three null /four /Four>>");
    }

    #[test]
    fn nested_values() {
        let obj = Object::from(vec![
            Object::Bool(true),
            Object::Bool(false),
            Object::from(PdfString::from("a(b)")),
            Object::from(vec![Object::Null]),
        ]);
        assert_eq!(encode(&obj), "[true false (a(b)) [null]]");
        assert_eq!(obj.to_string(), "[true false (a(b)) [null]]");
    }

    #[test]
    fn hex_strings() {
        let mut out = Vec::new();
        let encoder = SimpleEncoder { hex_strings: true };
        encoder.write_to(&Object::from(PdfString::from("Hi)")), &mut out);
        assert_eq!(out, b"<486929>");
    }
}
