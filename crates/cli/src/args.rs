use clap::Args;
use norsim::config::{
    DeviceConfig, ENV_BIT_FLIPS, ENV_CACHE_FILE, ENV_ERASE_SIZE, ENV_GRAVE_PAGES, ENV_SEED, ENV_SIZE,
    ENV_WEAK_PAGES,
};
use std::path::PathBuf;

/// Device settings, each falling back to its `NS_*` environment variable.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Backing file of the flash image. Without it the image lives in memory.
    #[arg(long, env = ENV_CACHE_FILE)]
    pub cache_file: Option<PathBuf>,

    /// Device size in KiB
    #[arg(long, env = ENV_SIZE, default_value_t = 64)]
    pub size_kb: u64,

    /// Erase block size in KiB
    #[arg(long, env = ENV_ERASE_SIZE, default_value_t = 4)]
    pub erase_size_kb: u64,

    /// Weak pages, e.g. "eio 1,3;1024,10;"
    #[arg(long, env = ENV_WEAK_PAGES)]
    pub weak_pages: Option<String>,

    /// Grave pages, same format as weak pages
    #[arg(long, env = ENV_GRAVE_PAGES)]
    pub grave_pages: Option<String>,

    /// Force each faulty page's stuck bits to zero on reads
    #[arg(long, env = ENV_BIT_FLIPS, value_parser = clap::builder::BoolishValueParser::new())]
    pub bit_flips: bool,

    /// Seed for the pseudo-random corruption choices
    #[arg(long, env = ENV_SEED)]
    pub seed: Option<u64>,
}

impl DeviceArgs {
    pub fn to_config(&self) -> anyhow::Result<DeviceConfig> {
        let kib = |v: u64| {
            v.checked_mul(1024)
                .ok_or_else(|| anyhow::anyhow!("Size too large: {}kB", v))
        };
        let erase_size = kib(self.erase_size_kb)?;
        if erase_size == 0 {
            anyhow::bail!("Erase size must be greater than zero");
        }
        Ok(DeviceConfig {
            cache_file: self.cache_file.clone(),
            size: kib(self.size_kb)?,
            erase_size,
            weak_pages: self.weak_pages.clone(),
            grave_pages: self.grave_pages.clone(),
            bit_flips: self.bit_flips,
            seed: self.seed,
        })
    }
}

impl Default for DeviceArgs {
    fn default() -> Self {
        Self {
            cache_file: None,
            size_kb: 64,
            erase_size_kb: 4,
            weak_pages: None,
            grave_pages: None,
            bit_flips: false,
            seed: None,
        }
    }
}
