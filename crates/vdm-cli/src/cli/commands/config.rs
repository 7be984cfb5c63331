//! `vdm config show|path|get|set`.

use anyhow::Result;
use vdm_core::config::{self, CONFIG_KEYS};

use crate::cli::ConfigAction;

pub fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", config::config_path()?.display()),
        ConfigAction::Show => {
            let cfg = config::load_or_init()?;
            for key in CONFIG_KEYS {
                println!("{key} = {}", cfg.get(key)?);
            }
        }
        ConfigAction::Get { key } => {
            let cfg = config::load_or_init()?;
            println!("{}", cfg.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut cfg = config::load_or_init()?;
            cfg.set(&key, &value)?;
            config::save(&cfg)?;
            tracing::info!(%key, %value, "config updated");
            println!("{key} = {}", cfg.get(&key)?);
        }
    }
    Ok(())
}
