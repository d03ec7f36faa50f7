pub mod analyze;
pub mod diff;

use clap::Args;
use eyre::{Result, WrapErr, bail};
use heaptrace::analysis::symbolize;
use heaptrace::dump::{Dump, parse_dumps};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Options shared by commands that resolve caller addresses.
#[derive(Debug, Args)]
pub struct SymbolArgs {
    #[arg(long, help = "Binary the dump was produced by, used to symbolize caller addresses")]
    binary: Option<PathBuf>,

    #[arg(
        long,
        default_value = "addr2line",
        help = "addr2line compatible program used for symbolization"
    )]
    addr2line: String,

    #[arg(
        long,
        value_parser = parse_address,
        default_value = "0",
        help = "Load address of the binary, subtracted before symbolization (hex)"
    )]
    load_base: u64,
}

impl SymbolArgs {
    pub fn resolve(&self, addresses: &[u64]) -> Result<HashMap<u64, String>> {
        let Some(binary) = &self.binary else {
            return Ok(HashMap::new());
        };
        symbolize(&self.addr2line, binary, addresses, self.load_base)
            .wrap_err_with(|| format!("Failed to symbolize callers of {}", binary.display()))
    }
}

pub fn parse_address(value: &str) -> Result<u64, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address `{value}`: {e}"))
}

pub fn load_dumps(path: &Path) -> Result<Vec<Dump>> {
    let input = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let dumps = parse_dumps(&input);
    if dumps.is_empty() {
        bail!("No heaptrace dumps found in {}", path.display());
    }
    Ok(dumps)
}
