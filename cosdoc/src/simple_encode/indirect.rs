use crate::{
    parse::indirect::{ENDOBJ, OBJ},
    pdf::{Object, Reference},
    writer::{Encoder, Writer},
};

use super::SimpleEncoder;

/// An object together with the number it is written under.
pub(crate) struct Indirect<'a> {
    pub reference: Reference,
    pub object: &'a Object,
}

impl Encoder<Indirect<'_>> for SimpleEncoder {
    fn write_to(&self, o: &Indirect<'_>, writer: &mut dyn Writer) {
        log::trace!("Write object {}", o.reference);
        writer.write(o.reference.number.to_string().as_bytes());
        writer.write(b" ");
        writer.write(o.reference.generation.to_string().as_bytes());
        writer.write(b" ");
        writer.write(OBJ);
        writer.write(b"\n");
        self.write_to(o.object, writer);
        writer.write(b"\n");
        writer.write(ENDOBJ);
        writer.write(b"\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parse::{indirect::indirect_object, span},
        pdf::Dictionary,
    };

    #[test]
    fn indirect_layout() {
        let mut out = Vec::new();
        let object = Object::Integer(7);
        let indirect = Indirect {
            reference: Reference::new(12, 1),
            object: &object,
        };
        SimpleEncoder { hex_strings: false }.write_to(&indirect, &mut out);
        assert_eq!(out, b"12 1 obj\n7\nendobj\n");
    }

    #[test]
    fn written_stream_parses_back() {
        let object = Object::from(crate::pdf::Stream::new(Dictionary::new(), b"endstream".to_vec()));
        let mut out = Vec::new();
        let indirect = Indirect {
            reference: Reference::new(3, 0),
            object: &object,
        };
        SimpleEncoder { hex_strings: false }.write_to(&indirect, &mut out);

        let (_, parsed) = indirect_object(span(&out), &()).unwrap();
        assert_eq!(parsed.reference, Reference::new(3, 0));
        assert_eq!(parsed.object, object);
        assert!(parsed.terminated);
    }
}
