pub mod array;
pub mod name;
pub mod reference;
pub mod stream;
pub mod string;

pub use array::Array;
pub use name::Name;
pub use reference::Reference;
pub use stream::{filter, Stream};
pub use string::PdfString;

use super::Object;

/// Dictionaries keep their insertion order so files round-trip key by key.
pub type Dictionary = indexmap::IndexMap<Name, Object>;
