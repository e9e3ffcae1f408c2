//! Resident FAT32 allocation table.
//!
//! The whole first FAT copy is held in memory for the lifetime of a mounted
//! volume. Entries are stored and written back as raw 32-bit values; the
//! reserved top nibble is not masked.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::error::{FatError, Result};

pub const FREE_CLUSTER: u32 = 0;
/// Value written for the last cluster of a chain.
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;
/// Any entry at or above this value terminates a chain.
pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;
/// Entry 0: media descriptor in the low byte.
pub const MEDIA_ENTRY: u32 = 0x0FFF_FFF8;
/// Entry 1: reserved sentinel.
pub const RESERVED_ENTRY: u32 = 0xFFFF_FFFF;

pub const FIRST_DATA_CLUSTER: u32 = 2;
const ENTRY_SIZE: usize = 4;

pub fn is_end_of_chain(entry: u32) -> bool {
    entry >= END_OF_CHAIN_MIN
}

/// In-memory cluster graph for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    entries: Vec<u32>,
    /// Highest cluster number that may be allocated.
    max_cluster: u32,
}

impl FatTable {
    /// Parse a FAT region. `cluster_count` is the number of data clusters;
    /// allocation never goes past the last cluster that also has an entry in
    /// `bytes`.
    pub fn load(bytes: &[u8], cluster_count: u32) -> Self {
        let len = bytes.len() / ENTRY_SIZE;
        let mut entries = vec![0u32; len];
        LittleEndian::read_u32_into(&bytes[..len * ENTRY_SIZE], &mut entries);
        let max_cluster =
            (cluster_count as u64 + 1).min(len.saturating_sub(1) as u64) as u32;
        Self {
            entries,
            max_cluster,
        }
    }

    /// All-free table of `size_bytes`, as laid down by `format`.
    pub fn empty(size_bytes: usize, cluster_count: u32) -> Self {
        Self::load(&vec![0u8; size_bytes], cluster_count)
    }

    pub fn max_cluster(&self) -> u32 {
        self.max_cluster
    }

    /// Raw entry value; clusters without an entry read as free.
    pub fn entry(&self, cluster: u32) -> u32 {
        self.entries
            .get(cluster as usize)
            .copied()
            .unwrap_or(FREE_CLUSTER)
    }

    pub fn set_entry(&mut self, cluster: u32, value: u32) {
        if let Some(slot) = self.entries.get_mut(cluster as usize) {
            *slot = value;
        }
    }

    /// Media marker, reserved sentinel, and the root directory's single
    /// cluster terminated at entry 2.
    pub fn mark_special(&mut self) {
        self.set_entry(0, MEDIA_ENTRY);
        self.set_entry(1, RESERVED_ENTRY);
        self.set_entry(FIRST_DATA_CLUSTER, END_OF_CHAIN);
    }

    /// First free cluster at or after `search_from` (never below cluster 2).
    pub fn find_free(&self, search_from: u32) -> Option<u32> {
        (search_from.max(FIRST_DATA_CLUSTER)..=self.max_cluster)
            .find(|&cluster| self.entries[cluster as usize] == FREE_CLUSTER)
    }

    /// Allocate `count` clusters linked into one chain ending in
    /// [`END_OF_CHAIN`].
    ///
    /// All clusters are located before any entry is linked, so an
    /// `OutOfSpace` failure leaves the table untouched.
    pub fn allocate_chain(&mut self, count: usize) -> Result<Vec<u32>> {
        let mut clusters = Vec::with_capacity(count);
        let mut search_from = FIRST_DATA_CLUSTER;
        while clusters.len() < count {
            let Some(cluster) = self.find_free(search_from) else {
                return Err(FatError::OutOfSpace(format!(
                    "need {count} free clusters, only {} available",
                    clusters.len()
                )));
            };
            clusters.push(cluster);
            search_from = cluster + 1;
        }

        for pair in clusters.windows(2) {
            self.set_entry(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_entry(last, END_OF_CHAIN);
        }
        debug!("allocated cluster chain {clusters:?}");
        Ok(clusters)
    }

    /// Next cluster in a chain, or `None` at the end (or on a free/reserved
    /// entry).
    pub fn next_cluster(&self, cluster: u32) -> Option<u32> {
        let next = self.entry(cluster);
        if is_end_of_chain(next) || next < FIRST_DATA_CLUSTER || next > self.max_cluster {
            None
        } else {
            Some(next)
        }
    }

    /// Every cluster of the chain starting at `start`.
    pub fn chain(&self, start: u32) -> Result<Vec<u32>> {
        if start < FIRST_DATA_CLUSTER || start > self.max_cluster {
            return Err(FatError::InvalidCluster(start));
        }
        let mut clusters = vec![start];
        let mut cluster = start;
        while let Some(next) = self.next_cluster(cluster) {
            if clusters.len() > self.max_cluster as usize {
                return Err(FatError::InvalidGeometry(format!(
                    "cluster chain starting at {start} does not terminate"
                )));
            }
            clusters.push(next);
            cluster = next;
        }
        Ok(clusters)
    }

    /// Number of allocatable clusters currently free.
    pub fn free_count(&self) -> u32 {
        (FIRST_DATA_CLUSTER..=self.max_cluster)
            .filter(|&cluster| self.entries[cluster as usize] == FREE_CLUSTER)
            .count() as u32
    }

    /// The full FAT region, ready to be written to every FAT copy.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.entries.len() * ENTRY_SIZE];
        LittleEndian::write_u32_into(&self.entries, &mut bytes);
        bytes
    }
}
