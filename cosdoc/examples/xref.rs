use cosdoc::{Document, OpenOptions, SlotState, XrefKind};
use std::path::PathBuf;
use structopt::StructOpt;

/// Print the cross-reference sections and the object table of a PDF file.
#[derive(StructOpt, Debug)]
#[structopt(name = "cosdoc-xref")]
struct Opt {
    /// Input file
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,

    /// Let classical tables shadow XRefStm entries in hybrid files
    #[structopt(long)]
    prefer_table: bool,

    /// Also print every slot
    #[structopt(short, long)]
    slots: bool,
}

pub fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let options = OpenOptions {
        prefer_xref_stream: !opt.prefer_table,
        ..OpenOptions::default()
    };
    let doc = match Document::open(&opt.input, options) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("Error while parsing: {}", e);
            return;
        }
    };

    println!("PDF {}.{}, {} slots", doc.version().0, doc.version().1, doc.xref_size());
    for revision in doc.revisions() {
        let kind = match revision.kind {
            XrefKind::Table if revision.hybrid_entries.is_some() => "hybrid table".to_string(),
            XrefKind::Table => "table".to_string(),
            XrefKind::Stream(r) => format!("stream {}", r),
        };
        println!(
            "section at {}: {}, {} entries",
            revision.startxref,
            kind,
            revision.object_numbers().count()
        );
    }
    for warning in doc.warnings() {
        println!("warning: {}", warning);
    }

    if opt.slots {
        for slot in doc.slots() {
            let state = match slot.state {
                SlotState::Free { next } => format!("free, next {}", next),
                SlotState::InUse { offset: Some(offset) } => format!("at byte {}", offset),
                SlotState::InUse { offset: None } => "in memory".to_string(),
                SlotState::Compressed { container, index } => format!("in {} at {}", container, index),
            };
            println!("{:>6} {:>5} {}", slot.number, slot.generation, state);
        }
    }
}
