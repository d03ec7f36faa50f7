use clap::Parser;
use eyre::{Result, eyre};
use heaptrace::analysis::{AnalysisOptions, analyze};
use heaptrace::output::Format;
use std::path::PathBuf;

use super::{SymbolArgs, load_dumps};

#[derive(Debug, Parser)]
pub struct AnalyzeArgs {
    #[arg(help = "Console log containing heaptrace dumps")]
    file: PathBuf,

    #[arg(long, default_value_t = Format::Table, help = "Output format: table, json, json-pretty or pipe")]
    format: Format,

    #[arg(
        long,
        default_value_t = 10,
        help = "Minimum age in ticks for an allocation to be reported as a leak suspect"
    )]
    min_age: u32,

    #[arg(
        long,
        value_delimiter = ',',
        default_value = "50,95,99",
        help = "Size percentiles reported per caller"
    )]
    percentiles: Vec<u8>,

    #[arg(long, help = "Only analyze the dump at this position (0 is the first)")]
    index: Option<usize>,

    #[command(flatten)]
    symbols: SymbolArgs,
}

impl AnalyzeArgs {
    pub fn run(&self) -> Result<()> {
        if let Some(p) = self.percentiles.iter().find(|p| **p > 100) {
            return Err(eyre!("Percentile {p} is out of range (0-100)"));
        }

        let mut dumps = load_dumps(&self.file)?;
        if let Some(index) = self.index {
            if index >= dumps.len() {
                return Err(eyre!(
                    "Dump index {index} is out of range, {} contains {} dumps",
                    self.file.display(),
                    dumps.len()
                ));
            }
            dumps = vec![dumps.swap_remove(index)];
        }

        let options = AnalysisOptions {
            percentiles: self.percentiles.clone(),
            min_age: self.min_age,
        };
        let reporter = self.format.reporter();
        let mut stdout = std::io::stdout().lock();

        for dump in &dumps {
            let mut analysis = analyze(dump, &options)?;
            let symbols = self.symbols.resolve(&analysis.caller_addresses())?;
            analysis.apply_symbols(&symbols);
            reporter
                .report(&analysis, &mut stdout)
                .map_err(|e| eyre!("Failed to write report: {e}"))?;
        }

        Ok(())
    }
}
