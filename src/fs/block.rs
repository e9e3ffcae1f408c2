//! Positioned access to the raw image: boot sector, FAT region, clusters.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use super::bpb::{Geometry, SECTOR_SIZE};

/// Byte-addressed storage backing a volume.
///
/// Implementors supply positioned reads and writes; every write must be
/// durable (flushed) before it returns. The FAT32-shaped helpers are built
/// on top of those two primitives.
pub trait BlockStore {
    /// Total size of the backing image.
    fn size_bytes(&mut self) -> io::Result<u64>;

    /// Fill `buf` from `offset`. A short read is an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `data` at `offset` and flush.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    fn read_boot_sector(&mut self) -> io::Result<[u8; SECTOR_SIZE]> {
        let mut sector = [0u8; SECTOR_SIZE];
        self.read_at(0, &mut sector)?;
        Ok(sector)
    }

    /// Write one 512-byte sector (boot sector, FSInfo, backup boot sector).
    fn write_sector(&mut self, sector: u64, data: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        self.write_at(sector * SECTOR_SIZE as u64, data)
    }

    /// Read the first FAT copy.
    fn read_fat(&mut self, geometry: &Geometry) -> io::Result<Vec<u8>> {
        let mut fat = vec![0u8; geometry.fat_size_bytes()];
        self.read_at(geometry.fat_offset(), &mut fat)?;
        Ok(fat)
    }

    /// Write `fat` to every FAT copy.
    fn write_fat(&mut self, geometry: &Geometry, fat: &[u8]) -> io::Result<()> {
        for copy in 0..geometry.fat_count() {
            let offset = geometry.fat_offset() + copy * geometry.fat_size_bytes() as u64;
            self.write_at(offset, fat)?;
        }
        Ok(())
    }

    fn read_cluster(&mut self, geometry: &Geometry, cluster: u32) -> io::Result<Vec<u8>> {
        let mut data = vec![0u8; geometry.cluster_size()];
        self.read_at(geometry.cluster_offset(cluster), &mut data)?;
        Ok(data)
    }

    fn write_cluster(&mut self, geometry: &Geometry, cluster: u32, data: &[u8]) -> io::Result<()> {
        self.write_at(geometry.cluster_offset(cluster), data)
    }
}

/// [`BlockStore`] over anything seekable: an image `File`, or a
/// `Cursor<Vec<u8>>` in tests.
pub struct ImageStore<F> {
    inner: F,
}

impl<F> ImageStore<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl ImageStore<File> {
    /// Open an image read-write, creating it at `create_size` bytes when it
    /// does not exist yet.
    pub fn open_or_create(path: &Path, create_size: u64) -> Result<Self> {
        if path.exists() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            return Ok(Self::new(file));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.set_len(create_size)
            .with_context(|| format!("failed to grow {} to {create_size} bytes", path.display()))?;
        info!("created image {} ({create_size} bytes)", path.display());
        Ok(Self::new(file))
    }
}

impl<F: Read + Write + Seek> BlockStore for ImageStore<F> {
    fn size_bytes(&mut self) -> io::Result<u64> {
        self.inner.seek(SeekFrom::End(0))
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(data)?;
        self.inner.flush()
    }
}
