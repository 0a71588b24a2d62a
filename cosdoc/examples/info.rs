use cosdoc::{Document, Object, OpenOptions, SaveFlags};
use std::path::PathBuf;
use structopt::StructOpt;

/// Print the catalog and the Info dictionary of a PDF file and optionally
/// change Info entries with an incremental update.
#[derive(StructOpt, Debug)]
#[structopt(name = "cosdoc-info")]
struct Opt {
    /// Input file
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,

    /// Entries to set, as `Key=Text`
    #[structopt(short, long)]
    set: Vec<String>,
}

pub fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let mut doc = match Document::open(&opt.input, OpenOptions::default()) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("Error while parsing: {}", e);
            return;
        }
    };

    match doc.catalog() {
        Ok(catalog) => println!("Catalog {}: {}", catalog.reference(), Object::from(catalog.dictionary().clone())),
        Err(e) => log::warn!("No catalog: {}", e),
    }
    println!("{} pages", doc.page_count());

    if let Some(info) = doc.info() {
        if let Ok(Object::Dictionary(dict)) = doc.get(info) {
            for (key, value) in dict {
                match value.string() {
                    Some(text) => println!("{}: {}", key, text.to_text()),
                    None => println!("{}: {}", key, value),
                }
            }
        }
    }

    if opt.set.is_empty() {
        return;
    }
    let info = doc.get_or_create_info();
    for entry in &opt.set {
        let (key, text) = match entry.split_once('=') {
            Some(pair) => pair,
            None => {
                log::error!("Expected Key=Text, got {}", entry);
                return;
            }
        };
        if let Err(e) = doc.put_text(info, key, text) {
            log::error!("Could not set {}: {}", key, e);
            return;
        }
    }
    if let Err(e) = doc.save(&opt.input, SaveFlags::INCREMENTAL) {
        log::error!("Error while writing: {}", e);
    }
}
