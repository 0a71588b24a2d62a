use crate::{
    parse::xref::{STARTXREF, XREF},
    pdf::{
        document::{dict_types::XREF as XREF_TYPE, K_INDEX, K_TYPE, K_W},
        trailer::TRAILER,
        Dictionary, Filter, FilterError, Name, Object, Stream, XrefEntry,
    },
    pdf::xref::Xref,
    writer::{Encoder, Writer},
};

use super::SimpleEncoder;

/// Runs of consecutive object numbers, as `(first, count)`.
fn subsections(entries: &[&XrefEntry]) -> Vec<(u32, usize)> {
    let mut runs: Vec<(u32, usize)> = Vec::new();
    for entry in entries {
        match runs.last_mut() {
            Some((first, count)) if u64::from(*first) + *count as u64 == u64::from(entry.number()) => *count += 1,
            _ => runs.push((entry.number(), 1)),
        }
    }
    runs
}

fn sorted_entries(xref: &Xref) -> Vec<&XrefEntry> {
    let mut entries: Vec<&XrefEntry> = xref.entries().collect();
    entries.sort_by_key(|e| e.number());
    entries.dedup_by_key(|e| e.number());
    entries
}

/// Classical table with fixed 20-byte entries.
impl Encoder<Xref> for SimpleEncoder {
    fn write_to(&self, xref: &Xref, writer: &mut dyn Writer) {
        log::trace!("Write xref table with {} entries", xref.len());

        let entries: Vec<&XrefEntry> = sorted_entries(xref)
            .into_iter()
            .filter(|e| match e {
                XrefEntry::Free(_) | XrefEntry::Used(_) => true,
                _ => {
                    log::warn!("Object {} can't be listed in an xref table", e.number());
                    false
                }
            })
            .collect();

        writer.write(XREF);
        writer.write(b"\n");
        let mut rest = &entries[..];
        for (first, count) in subsections(&entries) {
            writer.write(format!("{} {}\n", first, count).as_bytes());
            let (run, remainder) = rest.split_at(count);
            rest = remainder;
            for entry in run {
                let line = match entry {
                    XrefEntry::Free(f) => format!("{:010} {:05} f\r\n", f.next_free, f.generation),
                    XrefEntry::Used(u) => format!("{:010} {:05} n\r\n", u.byte_offset, u.generation),
                    _ => continue,
                };
                writer.write(line.as_bytes());
            }
        }
    }
}

fn xref_to_tuple(entry: &XrefEntry) -> (u64, u64, u64) {
    let xref_type = entry.type_num();
    match entry {
        XrefEntry::Free(entry) => (xref_type, entry.next_free.into(), entry.generation.into()),
        XrefEntry::Used(entry) => (xref_type, entry.byte_offset as u64, entry.generation.into()),
        XrefEntry::UsedCompressed(entry) => (xref_type, entry.containing_object.into(), entry.index.into()),
        XrefEntry::Unsupported(unsup) => (xref_type, unsup.w1, unsup.w2),
    }
}

/// Bytes needed to store `v` big-endian, at least one.
fn field_width(v: u64) -> usize {
    (8 - v.leading_zeros() as usize / 8).max(1)
}

fn encode_xref_entry(w: [usize; 3], entry: &XrefEntry, buffer: &mut Vec<u8>) {
    let (f1, f2, f3) = xref_to_tuple(entry);
    for (value, width) in [(f1, w[0]), (f2, w[1]), (f3, w[2])] {
        buffer.extend_from_slice(&value.to_be_bytes()[8 - width..]);
    }
}

/// Build a cross-reference stream. `dict` carries the trailer entries; `W`,
/// `Index` and `Type` are filled in here. Field widths are as small as the
/// entries allow.
pub(crate) fn xref_stream(xref: &Xref, mut dict: Dictionary) -> Result<Stream, FilterError> {
    let entries = sorted_entries(xref);

    let mut w = [1usize, 1, 1];
    for entry in &entries {
        let (_, f2, f3) = xref_to_tuple(entry);
        w[1] = w[1].max(field_width(f2));
        w[2] = w[2].max(field_width(f3));
    }

    let mut data = Vec::<u8>::with_capacity(entries.len() * w.iter().sum::<usize>());
    for entry in &entries {
        encode_xref_entry(w, entry, &mut data);
    }

    let index: Vec<Object> = subsections(&entries)
        .into_iter()
        .flat_map(|(first, count)| [Object::from(first), Object::from(count)])
        .collect();

    dict.insert(Name::from(K_TYPE), Object::from(Name::from(XREF_TYPE)));
    dict.insert(Name::from(K_W), Object::from(w.iter().map(|&v| Object::from(v)).collect::<Vec<_>>()));
    dict.insert(Name::from(K_INDEX), Object::from(index));
    Stream::encoded(dict, &data, Filter::Flate)
}

impl SimpleEncoder {
    /// `trailer << ... >>`
    pub(crate) fn write_trailer(&self, dict: &Dictionary, writer: &mut dyn Writer) {
        log::trace!("Write trailer");
        writer.write(TRAILER);
        writer.write(b"\n");
        self.write_to(dict, writer);
        writer.write(b"\n");
    }

    /// `startxref` pointing at the last cross-reference section, then `%%EOF`.
    pub(crate) fn write_startxref(&self, offset: usize, writer: &mut dyn Writer) {
        writer.write(STARTXREF);
        writer.write(b"\n");
        writer.write(offset.to_string().as_bytes());
        writer.write(b"\n%%EOF\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parse::{span, xref::xref_stream_entries},
        pdf::{
            trailer::K_SIZE,
            xref::{FreeObject, UsedCompressedObject, UsedObject},
        },
    };

    fn sample() -> Xref {
        Xref::from(vec![
            XrefEntry::from(FreeObject {
                number: 0,
                generation: 65535,
                next_free: 0,
            }),
            UsedObject {
                number: 1,
                byte_offset: 15,
                generation: 0,
            }
            .into(),
            UsedObject {
                number: 4,
                byte_offset: 70000,
                generation: 2,
            }
            .into(),
        ])
    }

    #[test]
    fn table_entries_are_20_bytes() {
        let mut out = Vec::new();
        SimpleEncoder { hex_strings: false }.write_to(&sample(), &mut out);
        let expected = b"xref\n0 2\n0000000000 65535 f\r\n0000000015 00000 n\r\n4 1\n0000070000 00002 n\r\n";
        assert_eq!(String::from_utf8_lossy(&out), String::from_utf8_lossy(expected));
    }

    #[test]
    fn table_parses_back() {
        let mut out = Vec::new();
        let encoder = SimpleEncoder { hex_strings: false };
        encoder.write_to(&sample(), &mut out);
        let mut trailer = Dictionary::new();
        trailer.insert(Name::from(K_SIZE), Object::Integer(5));
        encoder.write_trailer(&trailer, &mut out);

        let (_, revision) = crate::parse::xref::section(span(&out)).unwrap();
        assert_eq!(revision.entries, sample());
    }

    #[test]
    fn stream_widths_fit_entries() {
        let mut xref: Vec<XrefEntry> = sample().entries().cloned().collect();
        xref.push(
            UsedCompressedObject {
                number: 5,
                containing_object: 4,
                index: 0,
            }
            .into(),
        );
        let xref = Xref::from(xref);

        let mut dict = Dictionary::new();
        dict.insert(Name::from(K_SIZE), Object::Integer(6));
        let stream = xref_stream(&xref, dict).unwrap();
        assert_eq!(
            stream.dictionary().get(K_W),
            Some(&Object::from(vec![Object::Integer(1), Object::Integer(3), Object::Integer(2)]))
        );
        assert_eq!(
            stream.dictionary().get(K_INDEX),
            Some(&Object::from(vec![
                Object::Integer(0),
                Object::Integer(2),
                Object::Integer(4),
                Object::Integer(2)
            ]))
        );
        assert_eq!(xref_stream_entries(&stream).unwrap(), xref.entries().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn startxref_footer() {
        let mut out = Vec::new();
        SimpleEncoder { hex_strings: false }.write_startxref(1234, &mut out);
        assert_eq!(out, b"startxref\n1234\n%%EOF\n");
    }
}
