use cosdoc::{Document, OpenOptions, SaveFlags};
use std::path::PathBuf;
use structopt::StructOpt;

/// Read a PDF and write it back.
#[derive(StructOpt, Debug)]
#[structopt(name = "cosdoc-rw")]
struct Opt {
    /// Input file
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,

    /// Output file. Defaults to the input file.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Append changes instead of rewriting the file
    #[structopt(long)]
    incremental: bool,

    /// Drop objects that can't be reached from the trailer
    #[structopt(long)]
    remove_unused: bool,

    /// Put the first page in front
    #[structopt(long)]
    linearize: bool,

    /// Write a cross-reference stream
    #[structopt(long)]
    xref_stream: bool,

    /// Flate-compress unfiltered streams
    #[structopt(long)]
    compress: bool,

    /// Write strings in hex form
    #[structopt(long)]
    hex: bool,
}

impl Opt {
    fn flags(&self) -> SaveFlags {
        let mut flags = SaveFlags::empty();
        flags.set(SaveFlags::INCREMENTAL, self.incremental);
        flags.set(SaveFlags::REMOVE_UNUSED, self.remove_unused);
        flags.set(SaveFlags::LINEARIZED, self.linearize);
        flags.set(SaveFlags::XREF_STREAM, self.xref_stream);
        flags.set(SaveFlags::COMPRESS_STREAMS, self.compress);
        flags.set(SaveFlags::HEX_STRINGS, self.hex);
        flags
    }
}

pub fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    log::debug!("Read PDF file");
    let mut doc = match Document::open(&opt.input, OpenOptions::default()) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("Error while parsing: {}", e);
            return;
        }
    };
    for warning in doc.warnings() {
        log::warn!("{}", warning);
    }

    let output = opt.output.clone().unwrap_or_else(|| opt.input.clone());
    log::debug!("Write {} with {:?}", output.display(), opt.flags());
    if let Err(e) = doc.save(&output, opt.flags()) {
        log::error!("Error while writing: {}", e);
        return;
    }
    println!("{} objects, {} pages", doc.xref_size(), doc.page_count());
}
