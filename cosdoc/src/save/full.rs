use super::{compress, free_entries, used, write_header, Plan, SaveFlags};
use crate::{
    doc::Document,
    error::Result,
    pdf::{object::Name, trailer::K_SIZE, xref::Xref, Object, Reference},
    simple_encode::{indirect::Indirect, section::xref_stream, SimpleEncoder},
    writer::{Encoder, Writer},
};

/// Cross-reference streams need PDF 1.5.
const XREF_STREAM_VERSION: (u8, u8) = (1, 5);

/// A complete file: header, every object, one cross-reference section.
pub(super) fn write(doc: &Document, flags: SaveFlags, encoder: &SimpleEncoder) -> Result<Vec<u8>> {
    let plan = Plan::new(doc, flags);
    let xref_stream_wanted = flags.contains(SaveFlags::XREF_STREAM);
    let version = if xref_stream_wanted {
        doc.version().max(XREF_STREAM_VERSION)
    } else {
        doc.version()
    };
    log::debug!(
        "Write {} objects as PDF {}.{}",
        plan.objects.len(),
        version.0,
        version.1
    );

    let mut out = Vec::new();
    write_header(version, &mut out);

    let mut entries = free_entries(&plan.free);
    for (reference, obj) in plan.objects {
        let obj = if flags.contains(SaveFlags::COMPRESS_STREAMS) {
            compress(obj)
        } else {
            obj
        };
        entries.push(used(reference, out.position()));
        encoder.write_to(
            &Indirect {
                reference,
                object: &obj,
            },
            &mut out,
        );
    }

    let mut trailer = plan.trailer;
    let start_xref = out.position();
    if xref_stream_wanted {
        let reference = Reference::new(plan.size, 0);
        trailer.insert(Name::from(K_SIZE), Object::from(plan.size + 1));
        entries.push(used(reference, start_xref));
        let stream = xref_stream(&Xref::from(entries), trailer)?;
        encoder.write_to(
            &Indirect {
                reference,
                object: &Object::Stream(stream),
            },
            &mut out,
        );
    } else {
        encoder.write_to(&Xref::from(entries), &mut out);
        encoder.write_trailer(&trailer, &mut out);
    }
    encoder.write_startxref(start_xref, &mut out);

    Ok(out)
}
