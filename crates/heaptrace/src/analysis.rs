//! Offline analysis of parsed dumps: per-caller aggregation, leak suspects, symbolization and
//! dump-to-dump comparison.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

use crate::dump::{Dump, DumpEntry};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to set up size histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("failed to record allocation size: {0}")]
    Record(#[from] hdrhistogram::RecordError),

    #[error("failed to run `{program}`: {source}")]
    SymbolizerSpawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    SymbolizerFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Knobs of [`analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Size percentiles reported per caller.
    pub percentiles: Vec<u8>,
    /// Allocations at least this many ticks old are reported as leak suspects.
    pub min_age: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            percentiles: vec![50, 95, 99],
            min_age: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePercentile {
    pub percentile: u8,
    pub bytes: u64,
}

/// Live allocations attributed to one caller address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerSummary {
    pub caller: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub count: u64,
    pub total_bytes: u64,
    pub oldest_age: u32,
    pub sizes: Vec<SizePercentile>,
}

/// Result of analysing one dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub kind: Option<String>,
    pub entries: usize,
    pub total_bytes: u64,
    pub min_age: u32,
    /// Callers ordered by retained bytes, largest first.
    pub callers: Vec<CallerSummary>,
    /// Allocations at least `min_age` ticks old, oldest first.
    pub suspects: Vec<DumpEntry>,
    /// Every allocation of the dump, by ascending address.
    pub records: Vec<DumpEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<String>,
}

impl Analysis {
    /// Attaches symbol names to callers present in `symbols`.
    pub fn apply_symbols(&mut self, symbols: &HashMap<u64, String>) {
        for caller in &mut self.callers {
            caller.symbol = symbols.get(&caller.caller).cloned();
        }
    }

    pub fn caller_addresses(&self) -> Vec<u64> {
        self.callers.iter().map(|c| c.caller).collect()
    }
}

struct CallerStats {
    count: u64,
    total_bytes: u64,
    oldest_age: u32,
    sizes: Histogram<u64>,
}

impl CallerStats {
    const LOW_BYTES: u64 = 1;
    const HIGH_BYTES: u64 = 1 << 32;
    const SIGFIGS: u8 = 3;

    fn new() -> Result<Self, AnalysisError> {
        Ok(Self {
            count: 0,
            total_bytes: 0,
            oldest_age: 0,
            sizes: Histogram::new_with_bounds(Self::LOW_BYTES, Self::HIGH_BYTES, Self::SIGFIGS)?,
        })
    }

    fn record(&mut self, entry: &DumpEntry) -> Result<(), AnalysisError> {
        let size = u64::from(entry.size);
        self.count += 1;
        self.total_bytes += size;
        self.oldest_age = self.oldest_age.max(entry.age);
        self.sizes
            .record(size.clamp(Self::LOW_BYTES, Self::HIGH_BYTES))?;
        Ok(())
    }

    fn summary(&self, caller: u64, percentiles: &[u8]) -> CallerSummary {
        CallerSummary {
            caller,
            symbol: None,
            count: self.count,
            total_bytes: self.total_bytes,
            oldest_age: self.oldest_age,
            sizes: percentiles
                .iter()
                .map(|&percentile| SizePercentile {
                    percentile,
                    bytes: self.sizes.value_at_quantile(f64::from(percentile) / 100.0),
                })
                .collect(),
        }
    }
}

pub fn analyze(dump: &Dump, options: &AnalysisOptions) -> Result<Analysis, AnalysisError> {
    let mut by_caller: HashMap<u64, CallerStats> = HashMap::new();
    for entry in &dump.entries {
        let stats = match by_caller.entry(entry.caller) {
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => slot.insert(CallerStats::new()?),
        };
        stats.record(entry)?;
    }

    let mut callers: Vec<CallerSummary> = by_caller
        .iter()
        .map(|(caller, stats)| stats.summary(*caller, &options.percentiles))
        .collect();
    callers.sort_by(|a, b| {
        b.total_bytes
            .cmp(&a.total_bytes)
            .then(a.caller.cmp(&b.caller))
    });

    let mut suspects: Vec<DumpEntry> = dump
        .entries
        .iter()
        .filter(|entry| entry.age >= options.min_age)
        .copied()
        .collect();
    suspects.sort_by(|a, b| b.age.cmp(&a.age).then(a.pointer.cmp(&b.pointer)));

    let mut records = dump.entries.clone();
    records.sort_by_key(|entry| entry.pointer);

    Ok(Analysis {
        kind: dump.kind.clone(),
        entries: dump.entries.len(),
        total_bytes: dump.total_size(),
        min_age: options.min_age,
        callers,
        suspects,
        records,
        halt: dump.halt.clone(),
    })
}

/// Maps caller addresses to `function at file:line` by running an `addr2line` compatible
/// program once over all of them.
///
/// `load_base` is subtracted from every address first, which is needed for position
/// independent executables.
pub fn symbolize(
    program: &str,
    binary: &Path,
    addresses: &[u64],
    load_base: u64,
) -> Result<HashMap<u64, String>, AnalysisError> {
    let mut unique: Vec<u64> = addresses.iter().copied().filter(|a| *a != 0).collect();
    unique.sort_unstable();
    unique.dedup();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }

    let output = Command::new(program)
        .arg("-f")
        .arg("-C")
        .arg("-e")
        .arg(binary)
        .args(
            unique
                .iter()
                .map(|address| format!("{:#x}", address.wrapping_sub(load_base))),
        )
        .output()
        .map_err(|source| AnalysisError::SymbolizerSpawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(AnalysisError::SymbolizerFailed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_symbolizer_output(
        &unique,
        &String::from_utf8_lossy(&output.stdout),
    ))
}

/// `addr2line -f` prints two lines per address: the function, then `file:line`.
fn parse_symbolizer_output(addresses: &[u64], stdout: &str) -> HashMap<u64, String> {
    let lines: Vec<&str> = stdout.lines().collect();
    addresses
        .iter()
        .zip(lines.chunks(2))
        .filter_map(|(address, pair)| {
            let function = pair.first().map(|f| f.trim()).filter(|f| *f != "??")?;
            let symbol = match pair.get(1).map(|l| l.trim()) {
                Some(location) if !location.starts_with("??") => {
                    format!("{function} at {location}")
                }
                _ => function.to_string(),
            };
            Some((*address, symbol))
        })
        .collect()
}

/// Change in live allocations of one caller between two dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerDiff {
    pub caller: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub before_count: u64,
    pub after_count: u64,
    pub before_bytes: u64,
    pub after_bytes: u64,
}

impl CallerDiff {
    pub fn byte_delta(&self) -> i64 {
        self.after_bytes as i64 - self.before_bytes as i64
    }

    pub fn count_delta(&self) -> i64 {
        self.after_count as i64 - self.before_count as i64
    }

    pub fn byte_change_percent(&self) -> f64 {
        percentage_diff(self.before_bytes, self.after_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub before_bytes: u64,
    pub after_bytes: u64,
    /// Callers whose live allocations changed, largest growth first.
    pub callers: Vec<CallerDiff>,
}

impl DiffReport {
    pub fn apply_symbols(&mut self, symbols: &HashMap<u64, String>) {
        for caller in &mut self.callers {
            caller.symbol = symbols.get(&caller.caller).cloned();
        }
    }

    pub fn caller_addresses(&self) -> Vec<u64> {
        self.callers.iter().map(|c| c.caller).collect()
    }
}

pub fn diff(before: &Dump, after: &Dump) -> DiffReport {
    fn slot(totals: &mut HashMap<u64, CallerDiff>, caller: u64) -> &mut CallerDiff {
        totals.entry(caller).or_insert_with(|| CallerDiff {
            caller,
            symbol: None,
            before_count: 0,
            after_count: 0,
            before_bytes: 0,
            after_bytes: 0,
        })
    }

    let mut totals: HashMap<u64, CallerDiff> = HashMap::new();
    for entry in &before.entries {
        let diff = slot(&mut totals, entry.caller);
        diff.before_count += 1;
        diff.before_bytes += u64::from(entry.size);
    }
    for entry in &after.entries {
        let diff = slot(&mut totals, entry.caller);
        diff.after_count += 1;
        diff.after_bytes += u64::from(entry.size);
    }

    let mut callers: Vec<CallerDiff> = totals
        .into_values()
        .filter(|d| d.byte_delta() != 0 || d.count_delta() != 0)
        .collect();
    callers.sort_by(|a, b| {
        b.byte_delta()
            .cmp(&a.byte_delta())
            .then(a.caller.cmp(&b.caller))
    });

    DiffReport {
        before_bytes: before.total_size(),
        after_bytes: after.total_size(),
        callers,
    }
}

pub fn percentage_diff(before: u64, after: u64) -> f64 {
    if before == 0 {
        if after == 0 {
            0.0
        } else {
            100.0
        }
    } else {
        ((after as f64 - before as f64) / before as f64) * 100.0
    }
}
