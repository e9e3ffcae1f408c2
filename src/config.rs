//! Process configuration: image path from the command line; image size, log
//! level and volume label from the environment.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::LevelFilter;

use crate::fs::FormatOptions;
use crate::logger;

/// Size given to an image that does not exist yet.
pub const DEFAULT_IMAGE_SIZE: u64 = 2 * 1024 * 1024;

pub const IMAGE_SIZE_VAR: &str = "FATMAN_IMAGE_SIZE";
pub const LOG_VAR: &str = "FATMAN_LOG";
pub const LABEL_VAR: &str = "FATMAN_VOLUME_LABEL";

/// Volume labels are 11 space-padded bytes on disk.
const MAX_LABEL_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub image_path: PathBuf,
    pub create_size_bytes: u64,
    pub log_level: LevelFilter,
    /// Label and identity written by `format`.
    pub format_options: FormatOptions,
}

impl Config {
    /// Build from the real process arguments and environment.
    pub fn from_env() -> Result<Self> {
        Self::from_parts(std::env::args().skip(1), |var| std::env::var(var).ok())
    }

    /// `args` excludes the program name; `lookup` reads one environment
    /// variable.
    pub fn from_parts<I, F>(args: I, lookup: F) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let image_path = match args.as_slice() {
            [path] => PathBuf::from(path),
            _ => bail!("usage: fatman <image>"),
        };

        let create_size_bytes = match lookup(IMAGE_SIZE_VAR) {
            Some(value) => {
                parse_size(&value).with_context(|| format!("invalid {IMAGE_SIZE_VAR}"))?
            }
            None => DEFAULT_IMAGE_SIZE,
        };

        let log_level = match lookup(LOG_VAR) {
            Some(value) => match logger::parse_level(&value) {
                Some(level) => level,
                None => bail!("invalid {LOG_VAR}: {value:?}"),
            },
            None => LevelFilter::Warn,
        };

        let mut format_options = FormatOptions::default();
        if let Some(label) = lookup(LABEL_VAR) {
            if label.is_empty() || label.len() > MAX_LABEL_LEN || !label.is_ascii() {
                bail!("invalid {LABEL_VAR}: {label:?} (1 to {MAX_LABEL_LEN} ASCII characters)");
            }
            format_options.volume_label = label;
        }

        Ok(Self {
            image_path,
            create_size_bytes,
            log_level,
            format_options,
        })
    }
}

/// Byte count with an optional `K`/`M`/`G` (binary) suffix.
pub fn parse_size(value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 'K' | 'k')) => (&value[..idx], 1024),
        Some((idx, 'M' | 'm')) => (&value[..idx], 1024 * 1024),
        Some((idx, 'G' | 'g')) => (&value[..idx], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let count: u64 = digits
        .parse()
        .with_context(|| format!("{value:?} is not a size"))?;
    count
        .checked_mul(multiplier)
        .with_context(|| format!("{value:?} is too large"))
}
