use std::borrow::Cow;

use crate::{
    parse::indirect::{ENDSTREAM, STREAM},
    pdf::{document::K_LENGTH, Name, Object, Stream},
    writer::{Encoder, Writer},
};

use super::SimpleEncoder;

impl Encoder<Stream> for SimpleEncoder {
    fn write_to(&self, s: &Stream, writer: &mut dyn Writer) {
        let data = s.raw_data();
        let mut dict = Cow::Borrowed(s.dictionary());
        if dict.get(K_LENGTH).and_then(Object::integer) != i64::try_from(data.len()).ok() {
            dict.to_mut().insert(Name::from(K_LENGTH), Object::from(data.len()));
        }

        self.write_to(dict.as_ref(), writer);
        writer.write(b"\n");
        writer.write(STREAM);
        writer.write(b"\n");
        writer.write(data);
        writer.write(b"\n");
        writer.write(ENDSTREAM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Dictionary;

    #[test]
    fn stream_layout() {
        let stream = Stream::new(Dictionary::new(), b"BT ET".to_vec());
        let mut out = Vec::new();
        SimpleEncoder { hex_strings: false }.write_to(&stream, &mut out);
        assert_eq!(out, b"<</Length 5>>\nstream\nBT ET\nendstream");
    }

    #[test]
    fn stale_length_is_rewritten() {
        let mut stream = Stream::new(Dictionary::new(), b"abc".to_vec());
        stream.dictionary_mut().insert(Name::from(K_LENGTH), Object::Integer(99));
        let mut out = Vec::new();
        SimpleEncoder { hex_strings: false }.write_to(&stream, &mut out);
        assert_eq!(out, b"<</Length 3>>\nstream\nabc\nendstream");
    }
}
