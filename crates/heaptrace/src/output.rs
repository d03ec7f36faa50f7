use colored::*;
use prettytable::{Attr, Cell, Row, Table, color};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::analysis::{Analysis, DiffReport};

/// Output format of the `heaptrace` CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
    /// One `POINTER|SIZE|TIME|CALLER` line per allocation.
    Pipe,
}

impl Format {
    pub fn reporter(self) -> Box<dyn Reporter> {
        match self {
            Format::Table => Box::new(TableReporter::from_env()),
            Format::Json => Box::new(JsonReporter),
            Format::JsonPretty => Box::new(JsonPrettyReporter),
            Format::Pipe => Box::new(PipeReporter),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Table => write!(f, "table"),
            Format::Json => write!(f, "json"),
            Format::JsonPretty => write!(f, "json-pretty"),
            Format::Pipe => write!(f, "pipe"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            "json-pretty" => Ok(Format::JsonPretty),
            "pipe" => Ok(Format::Pipe),
            other => Err(format!(
                "unknown format `{other}`, expected one of: table, json, json-pretty, pipe"
            )),
        }
    }
}

/// Renders analysis results.
///
/// Implement this trait to feed dump analyses into other tooling.
///
/// ```rust
/// use heaptrace::analysis::{Analysis, DiffReport};
/// use heaptrace::output::Reporter;
/// use std::error::Error;
/// use std::io::Write;
///
/// struct Summary;
///
/// impl Reporter for Summary {
///     fn report(&self, analysis: &Analysis, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
///         writeln!(out, "{} bytes in {} allocations", analysis.total_bytes, analysis.entries)?;
///         Ok(())
///     }
///
///     fn report_diff(&self, diff: &DiffReport, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
///         writeln!(out, "{} -> {} bytes", diff.before_bytes, diff.after_bytes)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter {
    fn report(&self, analysis: &Analysis, out: &mut dyn Write) -> Result<(), Box<dyn Error>>;

    fn report_diff(&self, diff: &DiffReport, out: &mut dyn Write) -> Result<(), Box<dyn Error>>;
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}

fn format_delta(delta: i64) -> String {
    let magnitude = format_bytes(delta.unsigned_abs());
    match delta.signum() {
        1 => format!("+{magnitude}"),
        -1 => format!("-{magnitude}"),
        _ => magnitude,
    }
}

/// Human-readable tables.
pub struct TableReporter {
    use_colors: bool,
}

impl TableReporter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Colors unless `NO_COLOR` is set.
    pub fn from_env() -> Self {
        Self::new(std::env::var("NO_COLOR").is_err())
    }

    fn header_row(&self, headers: &[&str]) -> Row {
        Row::new(
            headers
                .iter()
                .map(|header| {
                    let cell = Cell::new(header).with_style(Attr::Bold);
                    if self.use_colors {
                        cell.with_style(Attr::ForegroundColor(color::CYAN))
                    } else {
                        cell
                    }
                })
                .collect(),
        )
    }

    fn tag(&self) -> String {
        if self.use_colors {
            "[heaptrace]".blue().bold().to_string()
        } else {
            "[heaptrace]".to_string()
        }
    }

    fn emphasis(&self, text: &str) -> String {
        if self.use_colors {
            text.yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }
}

impl Reporter for TableReporter {
    fn report(&self, analysis: &Analysis, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        let kind = analysis.kind.as_deref().unwrap_or("unnamed dump");
        writeln!(
            out,
            "{} {} - {} allocations, {} tracked",
            self.tag(),
            kind,
            analysis.entries,
            format_bytes(analysis.total_bytes)
        )?;

        if analysis.callers.is_empty() {
            writeln!(out, "No live allocations.")?;
        } else {
            let percentile_headers: Vec<String> = analysis.callers[0]
                .sizes
                .iter()
                .map(|p| format!("P{}", p.percentile))
                .collect();
            let mut headers = vec!["Caller", "Count", "Bytes", "Oldest"];
            headers.extend(percentile_headers.iter().map(String::as_str));
            headers.push("Symbol");

            let mut table = Table::new();
            table.add_row(self.header_row(&headers));
            for caller in &analysis.callers {
                let mut cells = vec![
                    Cell::new(&format!("{:#x}", caller.caller)),
                    Cell::new(&caller.count.to_string()),
                    Cell::new(&format_bytes(caller.total_bytes)),
                    Cell::new(&caller.oldest_age.to_string()),
                ];
                cells.extend(
                    caller
                        .sizes
                        .iter()
                        .map(|p| Cell::new(&format_bytes(p.bytes))),
                );
                cells.push(Cell::new(caller.symbol.as_deref().unwrap_or("-")));
                table.add_row(Row::new(cells));
            }
            table.print(out)?;
        }

        if !analysis.suspects.is_empty() {
            writeln!(
                out,
                "{} (age >= {}): {}",
                self.emphasis("Leak suspects"),
                analysis.min_age,
                analysis.suspects.len()
            )?;
            let mut table = Table::new();
            table.add_row(self.header_row(&["Pointer", "Caller", "Size", "Age"]));
            for entry in &analysis.suspects {
                table.add_row(Row::new(vec![
                    Cell::new(&format!("{:#x}", entry.pointer)),
                    Cell::new(&format!("{:#x}", entry.caller)),
                    Cell::new(&entry.size.to_string()),
                    Cell::new(&entry.age.to_string()),
                ]));
            }
            table.print(out)?;
        }

        if let Some(reason) = &analysis.halt {
            writeln!(out, "{}: {}", self.emphasis("halted"), reason)?;
        }
        Ok(())
    }

    fn report_diff(&self, diff: &DiffReport, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        writeln!(
            out,
            "{} {} -> {} ({})",
            self.tag(),
            format_bytes(diff.before_bytes),
            format_bytes(diff.after_bytes),
            format_delta(diff.after_bytes as i64 - diff.before_bytes as i64)
        )?;

        if diff.callers.is_empty() {
            writeln!(out, "No changes.")?;
            return Ok(());
        }

        let mut table = Table::new();
        table.add_row(self.header_row(&["Caller", "Count", "Bytes", "Change", "Symbol"]));
        for caller in &diff.callers {
            table.add_row(Row::new(vec![
                Cell::new(&format!("{:#x}", caller.caller)),
                Cell::new(&format!("{} → {}", caller.before_count, caller.after_count)),
                Cell::new(&format!(
                    "{} → {}",
                    format_bytes(caller.before_bytes),
                    format_bytes(caller.after_bytes)
                )),
                Cell::new(&format!(
                    "{} ({:+.1}%)",
                    format_delta(caller.byte_delta()),
                    caller.byte_change_percent()
                )),
                Cell::new(caller.symbol.as_deref().unwrap_or("-")),
            ]));
        }
        table.print(out)?;
        Ok(())
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, analysis: &Analysis, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        serde_json::to_writer(&mut *out, analysis)?;
        writeln!(out)?;
        Ok(())
    }

    fn report_diff(&self, diff: &DiffReport, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        serde_json::to_writer(&mut *out, diff)?;
        writeln!(out)?;
        Ok(())
    }
}

pub struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, analysis: &Analysis, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        serde_json::to_writer_pretty(&mut *out, analysis)?;
        writeln!(out)?;
        Ok(())
    }

    fn report_diff(&self, diff: &DiffReport, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        serde_json::to_writer_pretty(&mut *out, diff)?;
        writeln!(out)?;
        Ok(())
    }
}

/// Machine-friendly lines for shell pipelines and symbolizer scripts.
pub struct PipeReporter;

impl Reporter for PipeReporter {
    fn report(&self, analysis: &Analysis, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        writeln!(out, "POINTER|SIZE|TIME|CALLER")?;
        for entry in &analysis.records {
            writeln!(
                out,
                "{:#x}|{}|{}|{:#x}",
                entry.pointer, entry.size, entry.age, entry.caller
            )?;
        }
        Ok(())
    }

    fn report_diff(&self, diff: &DiffReport, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        writeln!(out, "CALLER|BEFORE|AFTER|DELTA")?;
        for caller in &diff.callers {
            writeln!(
                out,
                "{:#x}|{}|{}|{}",
                caller.caller,
                caller.before_bytes,
                caller.after_bytes,
                caller.byte_delta()
            )?;
        }
        Ok(())
    }
}
