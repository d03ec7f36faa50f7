mod cmd;
use clap::{Parser, Subcommand};
use cmd::analyze::AnalyzeArgs;
use cmd::diff::DiffArgs;
use eyre::Result;

#[derive(Subcommand, Debug)]
pub enum HTSubcommand {
    #[command(about = "Summarize the dumps found in a captured console log")]
    Analyze(AnalyzeArgs),
    #[command(about = "Compare the last dump of two captured console logs")]
    Diff(DiffArgs),
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "heaptrace CLI: read heap tracker dumps back from console logs, attribute live
allocations to their callers and spot leaks and heap growth"
)]
pub struct HTArgs {
    #[command(subcommand)]
    pub cmd: HTSubcommand,
}

fn main() -> Result<()> {
    let root_args = HTArgs::parse();

    match root_args.cmd {
        HTSubcommand::Analyze(args) => {
            args.run()?;
        }
        HTSubcommand::Diff(args) => {
            args.run()?;
        }
    }

    Ok(())
}
