use serde::Serialize;

/// A file or directory as reconstructed from its on-disk directory slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Long name when one was recorded, otherwise the 8.3 name.
    pub name: String,
    pub entry_type: EntryType,
    pub size: u32,
    /// First cluster of the entry's data.
    pub first_cluster: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryType {
    File,
    Directory,
}

impl FileEntry {
    pub fn new_directory(name: String, first_cluster: u32) -> Self {
        Self {
            name,
            entry_type: EntryType::Directory,
            size: 0,
            first_cluster,
        }
    }

    pub fn new_file(name: String, size: u32, first_cluster: u32) -> Self {
        Self {
            name,
            entry_type: EntryType::File,
            size,
            first_cluster,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}
