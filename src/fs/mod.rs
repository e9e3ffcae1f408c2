//! On-disk FAT32 engine: boot sector, allocation table, directory entries,
//! and the volume that ties them to a block store.

pub mod block;
pub mod bpb;
pub mod dirent;
pub mod entry;
pub mod fat;
pub mod volume;

pub use block::{BlockStore, ImageStore};
pub use bpb::{BootParameterBlock, FormatOptions, Geometry};
pub use entry::{EntryType, FileEntry};
pub use fat::FatTable;
pub use volume::{FatFilesystem, VolumeInfo};
