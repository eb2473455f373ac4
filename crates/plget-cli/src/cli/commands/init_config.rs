//! `plget init-config` – write the default config file.

use anyhow::Result;
use plget_core::config;

pub fn run_init_config() -> Result<()> {
    let (path, created) = config::write_default()?;
    if created {
        println!("Wrote default config to {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}
