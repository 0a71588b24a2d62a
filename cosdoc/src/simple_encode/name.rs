use crate::{
    parse::object::is_regular,
    pdf::Name,
    writer::{Encoder, Writer},
};

use super::SimpleEncoder;

/// Bytes that have to be written as `#xx` inside a name.
fn needs_escape(c: u8) -> bool {
    !is_regular(c) || c == b'#' || !(0x21..=0x7e).contains(&c)
}

impl Encoder<Name> for SimpleEncoder {
    fn write_to(&self, n: &Name, writer: &mut dyn Writer) {
        let mut last_write = 0;
        writer.write(b"/");
        for (index, &c) in n.iter().enumerate() {
            if needs_escape(c) {
                writer.write(&n[last_write..index]);
                last_write = index + 1;
                writer.write(b"#");
                writer.write(hex::encode_upper([c]).as_bytes())
            }
        }
        writer.write(&n[last_write..]);
    }
}
