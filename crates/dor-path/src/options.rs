/// How [`open_write`](crate::CollectionPathProvider::open_write) treats
/// existing and missing files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Create the file (and any missing parent directories) if absent.
    pub create: bool,
    /// Fail if the file already exists. Implies `create`.
    pub create_new: bool,
    /// Discard existing content.
    pub truncate: bool,
    /// Keep existing content and write after it.
    pub append: bool,
}

impl WriteOptions {
    /// Create or replace.
    pub fn create_or_replace() -> Self {
        Self {
            create: true,
            truncate: true,
            ..Self::default()
        }
    }

    /// Create a file that must not exist yet.
    pub fn create_new() -> Self {
        Self {
            create_new: true,
            ..Self::default()
        }
    }

    /// Replace an existing file.
    pub fn truncate_existing() -> Self {
        Self {
            truncate: true,
            ..Self::default()
        }
    }

    /// Append to a file, creating it if absent.
    pub fn append() -> Self {
        Self {
            create: true,
            append: true,
            ..Self::default()
        }
    }

    pub(crate) fn may_create(&self) -> bool {
        self.create || self.create_new
    }
}

/// Options for copy and move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Overwrite existing target files.
    pub replace_existing: bool,
    /// Carry last-modified times and labels over to the copies.
    pub copy_attributes: bool,
}
