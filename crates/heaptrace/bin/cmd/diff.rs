use clap::Parser;
use eyre::{Result, eyre};
use heaptrace::analysis::diff;
use heaptrace::dump::Dump;
use heaptrace::output::Format;
use std::path::PathBuf;

use super::{SymbolArgs, load_dumps};

#[derive(Debug, Parser)]
pub struct DiffArgs {
    #[arg(long, help = "Console log taken first")]
    before: PathBuf,

    #[arg(long, help = "Console log taken later")]
    after: PathBuf,

    #[arg(long, default_value_t = Format::Table, help = "Output format: table, json, json-pretty or pipe")]
    format: Format,

    #[command(flatten)]
    symbols: SymbolArgs,
}

fn last_dump(dumps: Vec<Dump>) -> Result<Dump> {
    dumps
        .into_iter()
        .last()
        .ok_or_else(|| eyre!("No heaptrace dumps found"))
}

impl DiffArgs {
    pub fn run(&self) -> Result<()> {
        let before = last_dump(load_dumps(&self.before)?)?;
        let after = last_dump(load_dumps(&self.after)?)?;

        let mut report = diff(&before, &after);
        let symbols = self.symbols.resolve(&report.caller_addresses())?;
        report.apply_symbols(&symbols);

        self.format
            .reporter()
            .report_diff(&report, &mut std::io::stdout().lock())
            .map_err(|e| eyre!("Failed to write report: {e}"))?;

        Ok(())
    }
}
