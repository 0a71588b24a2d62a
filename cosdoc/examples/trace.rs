use cosdoc::{Document, OpenOptions};
use nom_tracable::histogram;
use std::path::PathBuf;
use structopt::StructOpt;

/// Read a PDF file and parse every object.
///
/// Build with `--features trace` to print how often each parser ran.
#[derive(StructOpt, Debug)]
#[structopt(name = "cosdoc-trace")]
struct Opt {
    /// Input file
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,
}

pub fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let options = OpenOptions {
        memory_map: false,
        ..OpenOptions::default()
    };
    let doc = match Document::open(&opt.input, options) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("Error while parsing: {}", e);
            return;
        }
    };

    let loaded = (1..doc.xref_size()).filter(|&n| doc.get_obj(n).is_ok()).count();
    println!("{} of {} objects parsed", loaded, doc.xref_size() - 1);
    for warning in doc.warnings() {
        println!("warning: {}", warning);
    }

    histogram();
}
