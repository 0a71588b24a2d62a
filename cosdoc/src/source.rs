use std::{fs::File, io::Read, ops::Deref, path::Path};

use memmap2::Mmap;

/// The bytes a document was loaded from.
pub(crate) enum Source {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Source {
    pub fn open(path: &Path, memory_map: bool) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        // empty files can't be mapped
        if memory_map && file.metadata()?.len() > 0 {
            // SAFETY: the mapping is read-only. Full saves replace the file by
            // renaming a new one over it and incremental saves only append, so
            // the mapped range is never shortened while it is in use.
            let map = unsafe { Mmap::map(&file) }?;
            log::debug!("Mapped {} ({} bytes)", path.display(), map.len());
            return Ok(Source::Mapped(map));
        }

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(Source::Owned(buf))
    }
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Source::Owned(buf) => buf,
            Source::Mapped(map) => map,
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Owned(buf) => write!(f, "Owned({} bytes)", buf.len()),
            Source::Mapped(map) => write!(f, "Mapped({} bytes)", map.len()),
        }
    }
}
