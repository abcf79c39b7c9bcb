//! Runtime configuration read from the environment.
//!
//! `TAX_ENGINE_LAW_DIR` points at the directory of rule-set JSON files
//! (default `tax_laws`); `TAX_ENGINE_BIND_ADDR` is the HTTP listen
//! address (default `127.0.0.1:3000`).

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const LAW_DIR_VAR: &str = "TAX_ENGINE_LAW_DIR";
pub const BIND_ADDR_VAR: &str = "TAX_ENGINE_BIND_ADDR";

const DEFAULT_LAW_DIR: &str = "tax_laws";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub tax_law_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tax_law_dir = lookup(LAW_DIR_VAR).unwrap_or_else(|| DEFAULT_LAW_DIR.to_string());
        let bind_addr = lookup(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("{BIND_ADDR_VAR}={bind_addr} is not a socket address"))?;
        Ok(Config {
            tax_law_dir: PathBuf::from(tax_law_dir),
            bind_addr,
        })
    }
}
