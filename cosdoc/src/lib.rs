//! Object-level access to PDF files: an indirect object table with lazy
//! parsing, free-list and generation bookkeeping, and full, incremental and
//! linearized saving.
//!
//! ```no_run
//! use cosdoc::{Document, OpenOptions, SaveFlags};
//!
//! let mut doc = Document::open("in.pdf", OpenOptions::default())?;
//! let info = doc.get_or_create_info();
//! doc.put_text(info, "Producer", "cosdoc")?;
//! doc.save("in.pdf", SaveFlags::INCREMENTAL)?;
//! # Ok::<(), cosdoc::Error>(())
//! ```

pub use doc::{Document, OpenOptions};
pub use error::{Error, Result, Warning};
pub use pdf::{
    document::Catalog, Array, Dictionary, Filter, FilterError, Name, Object, ObjectKind, PdfString, Reference,
    Revision, Stream, XrefKind,
};
pub use save::SaveFlags;
pub use simple_encode::{set_default_hex_strings, SimpleEncoder};
pub use store::{SlotInfo, SlotState};

mod doc;
mod error;
pub mod parse;
pub mod pdf;
mod save;
pub mod simple_encode;
mod source;
mod store;
pub mod writer;
