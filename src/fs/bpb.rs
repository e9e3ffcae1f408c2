//! FAT32 boot sector (BIOS parameter block) codec and format-time sizing.
//!
//! Every field is encoded and decoded explicitly at its fixed little-endian
//! offset inside the 512-byte sector, so `decode(&encode(bpb))` is lossless.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{FatError, Result};

/// Size of the boot sector and of every sector this crate formats.
pub const SECTOR_SIZE: usize = 512;

pub const BYTES_PER_SECTOR: u16 = SECTOR_SIZE as u16;
pub const SECTORS_PER_CLUSTER: u8 = 8;
pub const RESERVED_SECTORS: u16 = 32;
pub const FAT_COUNT: u8 = 2;
pub const ROOT_CLUSTER: u32 = 2;
pub const MEDIA_DESCRIPTOR: u8 = 0xF8;

pub const FS_INFO_SECTOR: u16 = 1;
pub const BACKUP_BOOT_SECTOR: u16 = 6;

const JUMP_INSTRUCTION: [u8; 3] = [0xEB, 0x58, 0x90];
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const FS_TYPE: [u8; 8] = *b"FAT32   ";

const FS_INFO_LEAD_SIGNATURE: u32 = 0x4161_5252;
const FS_INFO_STRUCT_SIGNATURE: u32 = 0x6141_7272;
const FS_INFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;
const FS_INFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// User-selectable parts of a freshly formatted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub volume_label: String,
    pub volume_id: u32,
    pub oem_name: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            volume_label: "FAT32IMG".into(),
            volume_id: 0x1234_5678,
            oem_name: "FATMAN".into(),
        }
    }
}

/// Decoded FAT32 boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootParameterBlock {
    pub jump: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    /// Always 0 on FAT32.
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    /// Always 0 on FAT32.
    pub fat16_size_sectors: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors: u32,
    pub fat32_size_sectors: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub drive_number: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
    pub signature: [u8; 2],
}

impl BootParameterBlock {
    /// Build the boot sector for an image of `target_size_bytes`.
    ///
    /// Geometry is fixed (512-byte sectors, 8 sectors per cluster, 32 reserved
    /// sectors, two FATs, root at cluster 2); only the FAT size is solved.
    pub fn format(target_size_bytes: u64, options: &FormatOptions) -> Result<Self> {
        let total_sectors = u32::try_from(target_size_bytes / BYTES_PER_SECTOR as u64)
            .map_err(|_| {
                FatError::InvalidGeometry(format!(
                    "{target_size_bytes} bytes exceeds the 32-bit sector count"
                ))
            })?;

        let fat32_size_sectors = solve_fat_size(
            total_sectors,
            RESERVED_SECTORS,
            FAT_COUNT,
            SECTORS_PER_CLUSTER,
            BYTES_PER_SECTOR,
        )?;

        let bpb = Self {
            jump: JUMP_INSTRUCTION,
            oem_name: pad_ascii(&options.oem_name),
            bytes_per_sector: BYTES_PER_SECTOR,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
            reserved_sectors: RESERVED_SECTORS,
            fat_count: FAT_COUNT,
            root_entry_count: 0,
            total_sectors_16: 0,
            media: MEDIA_DESCRIPTOR,
            fat16_size_sectors: 0,
            sectors_per_track: 63,
            heads: 255,
            hidden_sectors: 0,
            total_sectors,
            fat32_size_sectors,
            ext_flags: 0,
            fs_version: 0,
            root_cluster: ROOT_CLUSTER,
            fs_info_sector: FS_INFO_SECTOR,
            backup_boot_sector: BACKUP_BOOT_SECTOR,
            drive_number: 0x80,
            boot_signature: EXTENDED_BOOT_SIGNATURE,
            volume_id: options.volume_id,
            volume_label: pad_ascii(&options.volume_label),
            fs_type: FS_TYPE,
            signature: BOOT_SIGNATURE,
        };

        // Rejects images too small to hold the root cluster.
        Geometry::new(&bpb)?;
        Ok(bpb)
    }

    /// Decode sector 0. A zero root cluster means the image was never
    /// formatted as FAT32.
    pub fn decode(sector: &[u8]) -> Result<Self> {
        if sector.len() < SECTOR_SIZE {
            return Err(FatError::InvalidGeometry(format!(
                "boot sector is {} bytes, expected {SECTOR_SIZE}",
                sector.len()
            )));
        }

        let bpb = Self {
            jump: [sector[0], sector[1], sector[2]],
            oem_name: array_at(sector, 3),
            bytes_per_sector: LittleEndian::read_u16(&sector[11..13]),
            sectors_per_cluster: sector[13],
            reserved_sectors: LittleEndian::read_u16(&sector[14..16]),
            fat_count: sector[16],
            root_entry_count: LittleEndian::read_u16(&sector[17..19]),
            total_sectors_16: LittleEndian::read_u16(&sector[19..21]),
            media: sector[21],
            fat16_size_sectors: LittleEndian::read_u16(&sector[22..24]),
            sectors_per_track: LittleEndian::read_u16(&sector[24..26]),
            heads: LittleEndian::read_u16(&sector[26..28]),
            hidden_sectors: LittleEndian::read_u32(&sector[28..32]),
            total_sectors: LittleEndian::read_u32(&sector[32..36]),
            fat32_size_sectors: LittleEndian::read_u32(&sector[36..40]),
            ext_flags: LittleEndian::read_u16(&sector[40..42]),
            fs_version: LittleEndian::read_u16(&sector[42..44]),
            root_cluster: LittleEndian::read_u32(&sector[44..48]),
            fs_info_sector: LittleEndian::read_u16(&sector[48..50]),
            backup_boot_sector: LittleEndian::read_u16(&sector[50..52]),
            drive_number: sector[64],
            boot_signature: sector[66],
            volume_id: LittleEndian::read_u32(&sector[67..71]),
            volume_label: array_at(sector, 71),
            fs_type: array_at(sector, 82),
            signature: [sector[510], sector[511]],
        };

        if bpb.root_cluster == 0 {
            return Err(FatError::NotFat32);
        }
        Ok(bpb)
    }

    /// Encode into a full boot sector. Reserved and boot-code areas are zero.
    pub fn encode(&self) -> [u8; SECTOR_SIZE] {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[0..3].copy_from_slice(&self.jump);
        sector[3..11].copy_from_slice(&self.oem_name);
        LittleEndian::write_u16(&mut sector[11..13], self.bytes_per_sector);
        sector[13] = self.sectors_per_cluster;
        LittleEndian::write_u16(&mut sector[14..16], self.reserved_sectors);
        sector[16] = self.fat_count;
        LittleEndian::write_u16(&mut sector[17..19], self.root_entry_count);
        LittleEndian::write_u16(&mut sector[19..21], self.total_sectors_16);
        sector[21] = self.media;
        LittleEndian::write_u16(&mut sector[22..24], self.fat16_size_sectors);
        LittleEndian::write_u16(&mut sector[24..26], self.sectors_per_track);
        LittleEndian::write_u16(&mut sector[26..28], self.heads);
        LittleEndian::write_u32(&mut sector[28..32], self.hidden_sectors);
        LittleEndian::write_u32(&mut sector[32..36], self.total_sectors);
        LittleEndian::write_u32(&mut sector[36..40], self.fat32_size_sectors);
        LittleEndian::write_u16(&mut sector[40..42], self.ext_flags);
        LittleEndian::write_u16(&mut sector[42..44], self.fs_version);
        LittleEndian::write_u32(&mut sector[44..48], self.root_cluster);
        LittleEndian::write_u16(&mut sector[48..50], self.fs_info_sector);
        LittleEndian::write_u16(&mut sector[50..52], self.backup_boot_sector);
        sector[64] = self.drive_number;
        sector[66] = self.boot_signature;
        LittleEndian::write_u32(&mut sector[67..71], self.volume_id);
        sector[71..82].copy_from_slice(&self.volume_label);
        sector[82..90].copy_from_slice(&self.fs_type);
        sector[510..512].copy_from_slice(&self.signature);
        sector
    }

    /// Volume label with trailing padding removed.
    pub fn label(&self) -> String {
        String::from_utf8_lossy(&self.volume_label)
            .trim_end_matches([' ', '\0'])
            .to_string()
    }

    /// Sector count, falling back to the 16-bit field other formatters use
    /// for small volumes.
    pub fn sector_count(&self) -> u32 {
        if self.total_sectors != 0 {
            self.total_sectors
        } else {
            self.total_sectors_16 as u32
        }
    }
}

/// FSInfo sector with free and next-free counts left "unknown".
pub fn encode_fs_info() -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    LittleEndian::write_u32(&mut sector[0..4], FS_INFO_LEAD_SIGNATURE);
    LittleEndian::write_u32(&mut sector[484..488], FS_INFO_STRUCT_SIGNATURE);
    LittleEndian::write_u32(&mut sector[488..492], FS_INFO_UNKNOWN);
    LittleEndian::write_u32(&mut sector[492..496], FS_INFO_UNKNOWN);
    LittleEndian::write_u32(&mut sector[508..512], FS_INFO_TRAIL_SIGNATURE);
    sector
}

/// Smallest FAT size (in sectors) that can address every cluster left over
/// once the FATs themselves are carved out of the volume.
fn solve_fat_size(
    total_sectors: u32,
    reserved_sectors: u16,
    fat_count: u8,
    sectors_per_cluster: u8,
    bytes_per_sector: u16,
) -> Result<u32> {
    let mut fat_size: u32 = 1;
    loop {
        let overhead = reserved_sectors as u64 + fat_count as u64 * fat_size as u64;
        let data_sectors = (total_sectors as u64).checked_sub(overhead).ok_or_else(|| {
            FatError::InvalidGeometry(format!(
                "{total_sectors} sectors cannot hold {fat_count} FATs of {fat_size} sectors"
            ))
        })?;
        let clusters = data_sectors / sectors_per_cluster as u64;
        let required = (clusters * 4).div_ceil(bytes_per_sector as u64);
        if required <= fat_size as u64 {
            return Ok(fat_size);
        }
        fat_size += 1;
    }
}

fn pad_ascii<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (slot, byte) in out.iter_mut().zip(text.bytes()) {
        *slot = byte;
    }
    out
}

fn array_at<const N: usize>(sector: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&sector[offset..offset + N]);
    out
}

/// Byte-level layout of a mounted volume, derived from its boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    bytes_per_sector: u64,
    sectors_per_cluster: u64,
    reserved_sectors: u64,
    fat_count: u64,
    fat_size_sectors: u64,
    total_sectors: u64,
    root_cluster: u32,
}

impl Geometry {
    pub fn new(bpb: &BootParameterBlock) -> Result<Self> {
        if !matches!(bpb.bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(FatError::InvalidGeometry(format!(
                "invalid bytes per sector: {}",
                bpb.bytes_per_sector
            )));
        }
        if bpb.sectors_per_cluster == 0 {
            return Err(FatError::InvalidGeometry(
                "invalid sectors per cluster: 0".into(),
            ));
        }
        if bpb.fat_count == 0 || bpb.fat32_size_sectors == 0 {
            return Err(FatError::InvalidGeometry("volume has no FAT".into()));
        }

        let geometry = Self {
            bytes_per_sector: bpb.bytes_per_sector as u64,
            sectors_per_cluster: bpb.sectors_per_cluster as u64,
            reserved_sectors: bpb.reserved_sectors as u64,
            fat_count: bpb.fat_count as u64,
            fat_size_sectors: bpb.fat32_size_sectors as u64,
            total_sectors: bpb.sector_count() as u64,
            root_cluster: bpb.root_cluster,
        };

        if geometry.total_sectors <= geometry.data_start_sector() || geometry.cluster_count() == 0
        {
            return Err(FatError::InvalidGeometry(format!(
                "{} sectors leave no room for data clusters",
                geometry.total_sectors
            )));
        }
        if !geometry.contains_cluster(geometry.root_cluster) {
            return Err(FatError::InvalidCluster(geometry.root_cluster));
        }
        Ok(geometry)
    }

    pub fn bytes_per_sector(&self) -> u64 {
        self.bytes_per_sector
    }

    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    pub fn fat_count(&self) -> u64 {
        self.fat_count
    }

    pub fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.bytes_per_sector
    }

    /// Byte offset of the first FAT copy.
    pub fn fat_offset(&self) -> u64 {
        self.sector_offset(self.reserved_sectors)
    }

    /// Size of one FAT copy in bytes.
    pub fn fat_size_bytes(&self) -> usize {
        (self.fat_size_sectors * self.bytes_per_sector) as usize
    }

    pub fn data_start_sector(&self) -> u64 {
        self.reserved_sectors + self.fat_count * self.fat_size_sectors
    }

    pub fn cluster_size(&self) -> usize {
        (self.bytes_per_sector * self.sectors_per_cluster) as usize
    }

    /// Number of data clusters the volume holds.
    pub fn cluster_count(&self) -> u32 {
        let data_sectors = self.total_sectors.saturating_sub(self.data_start_sector());
        (data_sectors / self.sectors_per_cluster).min(u32::MAX as u64 - 2) as u32
    }

    /// Highest cluster number that both exists in the data region and has an
    /// entry in the FAT.
    pub fn max_cluster(&self) -> u32 {
        let fat_entries = (self.fat_size_bytes() / 4) as u64;
        (self.cluster_count() as u64 + 1).min(fat_entries.saturating_sub(1)) as u32
    }

    pub fn contains_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster <= self.max_cluster()
    }

    /// Byte offset of a data cluster.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        let sector =
            self.data_start_sector() + (cluster as u64 - 2) * self.sectors_per_cluster;
        self.sector_offset(sector)
    }
}
