//! Directory navigation and creation on a FAT32 image.
//!
//! [`FatFilesystem`] owns the block store and, once a FAT32 boot sector is
//! present, the resident FAT. Every mutating operation updates the in-memory
//! table and then writes the FAT and the touched clusters straight back; no
//! write is deferred or cached.

use log::{debug, info, warn};
use serde::Serialize;

use super::block::BlockStore;
use super::bpb::{
    encode_fs_info, BootParameterBlock, FormatOptions, Geometry, SECTOR_SIZE,
};
use super::dirent::{
    decode_directory, encode_entry_set, init_directory_cluster, needs_long_name, parent_cluster,
    reserve_slots, short_names, slots_for_name, validate_name, ShortName, ATTR_ARCHIVE,
    ATTR_DIRECTORY,
};
use super::entry::FileEntry;
use super::fat::FatTable;
use crate::error::{FatError, Result};

/// Clusters given to every new file, whatever it will hold.
pub const FILE_CLUSTERS: usize = 2;

/// FAT32 volume on a block store.
pub struct FatFilesystem<S> {
    store: S,
    mounted: Option<Mounted>,
}

struct Mounted {
    bpb: BootParameterBlock,
    geometry: Geometry,
    fat: FatTable,
}

/// Geometry summary reported by `info`.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeInfo {
    pub volume_label: String,
    pub volume_id: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub fat_size_sectors: u32,
    pub total_sectors: u32,
    pub data_start_sector: u64,
    pub root_cluster: u32,
    pub cluster_size: usize,
    pub cluster_count: u32,
    pub free_clusters: u32,
}

/// One write of a multi-step operation.
enum PendingWrite<'a> {
    Sector(u64, &'a [u8; SECTOR_SIZE]),
    Fat(&'a [u8]),
    Cluster(u32, &'a [u8]),
}

/// Issue `writes` in order. Any failure is reported as `PartialWrite` with
/// the number of writes that completed before it; earlier writes are not
/// undone.
fn run_writes<S: BlockStore>(
    store: &mut S,
    geometry: &Geometry,
    operation: &'static str,
    writes: &[PendingWrite<'_>],
) -> Result<()> {
    for (completed, write) in writes.iter().enumerate() {
        let result = match write {
            PendingWrite::Sector(sector, data) => store.write_sector(*sector, data),
            PendingWrite::Fat(data) => store.write_fat(geometry, data),
            PendingWrite::Cluster(cluster, data) => store.write_cluster(geometry, *cluster, data),
        };
        if let Err(source) = result {
            warn!(
                "{operation}: write {} of {} failed: {source}",
                completed + 1,
                writes.len()
            );
            return Err(FatError::PartialWrite {
                operation,
                completed,
                source,
            });
        }
    }
    Ok(())
}

impl Mounted {
    fn load<S: BlockStore>(store: &mut S, bpb: BootParameterBlock) -> Result<Self> {
        let geometry = Geometry::new(&bpb)?;
        let image_size = store.size_bytes()?;
        let volume_size = bpb.sector_count() as u64 * geometry.bytes_per_sector();
        if volume_size > image_size {
            return Err(FatError::InvalidGeometry(format!(
                "boot sector describes {volume_size} bytes, image holds {image_size}"
            )));
        }
        let fat_bytes = store.read_fat(&geometry)?;
        let fat = FatTable::load(&fat_bytes, geometry.cluster_count());
        debug!(
            "mounted FAT32: {} clusters of {} bytes, {} free",
            geometry.cluster_count(),
            geometry.cluster_size(),
            fat.free_count()
        );
        Ok(Self { bpb, geometry, fat })
    }

    fn read_directory<S: BlockStore>(&self, store: &mut S, cluster: u32) -> Result<Vec<u8>> {
        if !self.geometry.contains_cluster(cluster) {
            return Err(FatError::InvalidCluster(cluster));
        }
        Ok(store.read_cluster(&self.geometry, cluster)?)
    }
}

/// Reserve slots for `name` in `parent_data` and pick its short name.
/// Returns the byte offset of the first reserved slot.
fn plan_entry(parent: u32, parent_data: &mut [u8], name: &str) -> Result<(usize, ShortName)> {
    validate_name(name)?;
    if decode_directory(parent_data).iter().any(|e| e.name == name) {
        return Err(FatError::UnsupportedName(format!("{name:?} already exists")));
    }

    let existing = short_names(parent_data);
    let short = if needs_long_name(name) {
        ShortName::alias(name, &existing)?
    } else {
        let short = ShortName::from_plain(name);
        if existing.contains(&short) {
            return Err(FatError::UnsupportedName(format!(
                "{name:?} collides with an existing short name"
            )));
        }
        short
    };

    let needed = slots_for_name(name);
    let offset = reserve_slots(parent_data, needed).ok_or_else(|| {
        FatError::OutOfSpace(format!(
            "directory cluster {parent} has no run of {needed} free slots"
        ))
    })?;
    debug!("{name:?}: {needed} slots at offset {offset} of cluster {parent}");
    Ok((offset, short))
}

fn place_slots(data: &mut [u8], offset: usize, slots: &[[u8; 32]]) {
    for (i, slot) in slots.iter().enumerate() {
        let start = offset + i * slot.len();
        data[start..start + slot.len()].copy_from_slice(slot);
    }
}

impl<S: BlockStore> FatFilesystem<S> {
    /// Attach to an image. An image without a FAT32 boot sector mounts
    /// unformatted: only [`format`](Self::format) works until it is formatted.
    /// So does one whose boot sector describes an impossible layout.
    pub fn mount(mut store: S) -> Result<Self> {
        let sector = store.read_boot_sector()?;
        let mounted = match BootParameterBlock::decode(&sector)
            .and_then(|bpb| Mounted::load(&mut store, bpb))
        {
            Ok(mounted) => Some(mounted),
            Err(FatError::NotFat32) => {
                info!("image has no FAT32 boot sector");
                None
            }
            Err(e @ (FatError::InvalidGeometry(_) | FatError::InvalidCluster(_))) => {
                warn!("ignoring boot sector: {e}");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(Self { store, mounted })
    }

    pub fn is_formatted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn volume(&self) -> Result<&Mounted> {
        self.mounted.as_ref().ok_or(FatError::NotFat32)
    }

    fn parts(&mut self) -> Result<(&mut S, &mut Mounted)> {
        let Self { store, mounted } = self;
        let mounted = mounted.as_mut().ok_or(FatError::NotFat32)?;
        Ok((store, mounted))
    }

    pub fn boot_sector(&self) -> Result<&BootParameterBlock> {
        Ok(&self.volume()?.bpb)
    }

    pub fn fat(&self) -> Result<&FatTable> {
        Ok(&self.volume()?.fat)
    }

    pub fn root_cluster(&self) -> Result<u32> {
        Ok(self.volume()?.geometry.root_cluster())
    }

    /// Lay a fresh FAT32 filesystem over the whole image: boot sector,
    /// FSInfo, backup boot sector, both FATs, and a root directory holding
    /// only "." and "..".
    pub fn format(&mut self, options: &FormatOptions) -> Result<()> {
        let size = self.store.size_bytes()?;
        let bpb = BootParameterBlock::format(size, options)?;
        let geometry = Geometry::new(&bpb)?;
        let mut fat = FatTable::empty(geometry.fat_size_bytes(), geometry.cluster_count());
        fat.mark_special();

        let root = geometry.root_cluster();
        let boot_sector = bpb.encode();
        let fs_info = encode_fs_info();
        let fat_bytes = fat.serialize();
        let root_data = init_directory_cluster(geometry.cluster_size(), root, root);

        self.mounted = None;
        run_writes(
            &mut self.store,
            &geometry,
            "format",
            &[
                PendingWrite::Sector(0, &boot_sector),
                PendingWrite::Sector(bpb.fs_info_sector as u64, &fs_info),
                PendingWrite::Sector(bpb.backup_boot_sector as u64, &boot_sector),
                PendingWrite::Fat(&fat_bytes),
                PendingWrite::Cluster(root, &root_data),
            ],
        )?;

        info!(
            "formatted {size} bytes: {} sectors, FAT {} sectors x{}, {} clusters",
            bpb.total_sectors,
            bpb.fat32_size_sectors,
            bpb.fat_count,
            geometry.cluster_count()
        );
        self.mounted = Some(Mounted { bpb, geometry, fat });
        Ok(())
    }

    /// Entries of the directory stored at `cluster`, in slot order.
    pub fn list(&mut self, cluster: u32) -> Result<Vec<FileEntry>> {
        let (store, volume) = self.parts()?;
        let data = volume.read_directory(store, cluster)?;
        Ok(decode_directory(&data))
    }

    /// Create directory `name` under `parent`; returns its cluster.
    ///
    /// Writes the FAT, then the parent cluster, then the new cluster.
    pub fn create_directory(&mut self, parent: u32, name: &str) -> Result<u32> {
        let (store, volume) = self.parts()?;
        let mut parent_data = volume.read_directory(store, parent)?;
        let (offset, short) = plan_entry(parent, &mut parent_data, name)?;

        let cluster = volume.fat.allocate_chain(1)?[0];
        let slots = encode_entry_set(name, &short, ATTR_DIRECTORY, cluster, 0);
        place_slots(&mut parent_data, offset, &slots);
        let new_data = init_directory_cluster(volume.geometry.cluster_size(), cluster, parent);
        let fat_bytes = volume.fat.serialize();

        run_writes(
            store,
            &volume.geometry,
            "create directory",
            &[
                PendingWrite::Fat(&fat_bytes),
                PendingWrite::Cluster(parent, &parent_data),
                PendingWrite::Cluster(cluster, &new_data),
            ],
        )?;
        info!("created directory {name:?} at cluster {cluster}");
        Ok(cluster)
    }

    /// Create file `name` under `parent` with a zero-filled two-cluster
    /// chain; returns its first cluster.
    ///
    /// The recorded size is the capacity of the chain, not a content length.
    pub fn create_file(&mut self, parent: u32, name: &str) -> Result<u32> {
        let (store, volume) = self.parts()?;
        let mut parent_data = volume.read_directory(store, parent)?;
        let (offset, short) = plan_entry(parent, &mut parent_data, name)?;

        let chain = volume.fat.allocate_chain(FILE_CLUSTERS)?;
        let cluster_size = volume.geometry.cluster_size();
        let size = (cluster_size * FILE_CLUSTERS) as u32;
        let slots = encode_entry_set(name, &short, ATTR_ARCHIVE, chain[0], size);
        place_slots(&mut parent_data, offset, &slots);
        let zeros = vec![0u8; cluster_size];
        let fat_bytes = volume.fat.serialize();

        let mut writes: Vec<PendingWrite<'_>> = chain
            .iter()
            .map(|&cluster| PendingWrite::Cluster(cluster, &zeros))
            .collect();
        writes.push(PendingWrite::Fat(&fat_bytes));
        writes.push(PendingWrite::Cluster(parent, &parent_data));

        run_writes(store, &volume.geometry, "create file", &writes)?;
        info!("created file {name:?} using clusters {chain:?}");
        Ok(chain[0])
    }

    /// Resolve one path component relative to the directory at `cluster`.
    ///
    /// `/` is the root, `..` follows the parent recorded in the directory's
    /// own ".." slot, anything else must name a subdirectory exactly
    /// (case-sensitive).
    pub fn change_directory(&mut self, cluster: u32, component: &str) -> Result<u32> {
        let root = self.root_cluster()?;
        match component {
            "/" => Ok(root),
            ".." => {
                let (store, volume) = self.parts()?;
                let data = volume.read_directory(store, cluster)?;
                match parent_cluster(&data) {
                    // Other formatters record the root as cluster 0.
                    Some(0) => Ok(root),
                    Some(parent) if volume.geometry.contains_cluster(parent) => Ok(parent),
                    Some(parent) => Err(FatError::InvalidCluster(parent)),
                    None => Err(FatError::DirectoryNotFound(format!(
                        "cluster {cluster} has no \"..\" entry"
                    ))),
                }
            }
            name => self
                .list(cluster)?
                .into_iter()
                .find(|e| e.is_directory() && e.name == name)
                .map(|e| if e.first_cluster == 0 { root } else { e.first_cluster })
                .ok_or_else(|| FatError::DirectoryNotFound(name.to_string())),
        }
    }

    pub fn info(&self) -> Result<VolumeInfo> {
        let volume = self.volume()?;
        let bpb = &volume.bpb;
        let geometry = &volume.geometry;
        Ok(VolumeInfo {
            volume_label: bpb.label(),
            volume_id: format!("{:08X}", bpb.volume_id),
            bytes_per_sector: bpb.bytes_per_sector,
            sectors_per_cluster: bpb.sectors_per_cluster,
            reserved_sectors: bpb.reserved_sectors,
            fat_count: bpb.fat_count,
            fat_size_sectors: bpb.fat32_size_sectors,
            total_sectors: bpb.sector_count(),
            data_start_sector: geometry.data_start_sector(),
            root_cluster: geometry.root_cluster(),
            cluster_size: geometry.cluster_size(),
            cluster_count: geometry.cluster_count(),
            free_clusters: volume.fat.free_count(),
        })
    }
}
