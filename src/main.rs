use std::io;

use anyhow::{Context, Result};
use log::info;

use fatman::config::Config;
use fatman::fs::{FatFilesystem, ImageStore};
use fatman::logger;
use fatman::shell::Shell;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logger::init(config.log_level);

    let store = ImageStore::open_or_create(&config.image_path, config.create_size_bytes)?;
    let fs = FatFilesystem::mount(store)
        .with_context(|| format!("failed to read {}", config.image_path.display()))?;
    if !fs.is_formatted() {
        println!("Unknown disk format, run `format` first");
    }
    info!("session on {}", config.image_path.display());

    let mut shell = Shell::new(fs).with_format_options(config.format_options);
    shell.run(io::stdin().lock(), io::stdout().lock())
}
