//! Reading dumps back from captured console output.
//!
//! Console logs usually carry more than the tracker's output, so the parser is lenient: any
//! line it does not recognise is skipped, and recognised lines may be preceded by a log
//! prefix such as a timestamp. Record lines that appear outside of a `[heaptrace]` section
//! are gathered into an unnamed dump.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::{ArenaStats, HeapStats};

const TAG: &str = "[heaptrace] ";
const END_MARKER: &str = "end of dump";
const DUMP_SUFFIX: &str = " dump";
const HALT_PREFIX: &str = "halt: ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value `{value}` for field `{field}`")]
    InvalidNumber { field: &'static str, value: String },

    #[error("not a record line")]
    NotARecord,
}

/// One `P: C: S: T:` record line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DumpEntry {
    pub pointer: u64,
    pub caller: u64,
    pub size: u32,
    pub age: u32,
}

impl DumpEntry {
    /// Parses a record line, tolerating any prefix before `P:`.
    pub fn parse_line(line: &str) -> Option<Self> {
        line.parse().ok()
    }
}

impl FromStr for DumpEntry {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let start = line.find("P: ").ok_or(ParseError::NotARecord)?;
        let mut tokens = line[start..].split_whitespace();

        let pointer = next_field(&mut tokens, "P")?;
        let caller = next_field(&mut tokens, "C")?;
        let size = next_field(&mut tokens, "S")?;
        let age = next_field(&mut tokens, "T")?;

        Ok(Self {
            pointer: parse_hex("P", pointer)?,
            caller: parse_hex("C", caller)?,
            size: parse_dec("S", size)?,
            age: parse_dec("T", age)?,
        })
    }
}

/// The `tracker:` summary line of a dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerTotals {
    pub tracked: u64,
    pub peak: u64,
    pub max_entries: u64,
    pub entries: u64,
}

/// One dump section recovered from a log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dump {
    /// Section label such as `live table` or `peak snapshot`; `None` for unmarked records.
    pub kind: Option<String>,
    pub heap: Option<HeapStats>,
    pub arena: Option<ArenaStats>,
    pub totals: Option<TrackerTotals>,
    pub entries: Vec<DumpEntry>,
    /// Halt reason printed right after this dump, if the process stopped.
    pub halt: Option<String>,
}

impl Dump {
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.size)).sum()
    }

    fn is_blank(&self) -> bool {
        self.kind.is_none()
            && self.heap.is_none()
            && self.arena.is_none()
            && self.totals.is_none()
            && self.entries.is_empty()
    }
}

/// Splits captured console output into dumps, in order of appearance.
pub fn parse_dumps(input: &str) -> Vec<Dump> {
    let mut dumps = Vec::new();
    let mut current: Option<Dump> = None;

    for line in input.lines() {
        if let Some(tagged) = line.find(TAG).map(|at| line[at + TAG.len()..].trim()) {
            if tagged == END_MARKER {
                dumps.extend(current.take());
            } else if let Some(reason) = tagged.strip_prefix(HALT_PREFIX) {
                dumps.extend(current.take());
                match dumps.last_mut() {
                    Some(last) => last.halt = Some(reason.to_string()),
                    None => dumps.push(Dump {
                        halt: Some(reason.to_string()),
                        ..Dump::default()
                    }),
                }
            } else if let Some(label) = tagged.strip_suffix(DUMP_SUFFIX) {
                dumps.extend(current.take());
                current = Some(Dump {
                    kind: Some(label.to_string()),
                    ..Dump::default()
                });
            }
            continue;
        }

        if let Some(entry) = DumpEntry::parse_line(line) {
            current.get_or_insert_with(Dump::default).entries.push(entry);
        } else if let Some(fields) = key_values(line, "heap:") {
            current.get_or_insert_with(Dump::default).heap = heap_stats(&fields);
        } else if let Some(fields) = key_values(line, "arena:") {
            current.get_or_insert_with(Dump::default).arena = arena_stats(&fields);
        } else if let Some(fields) = key_values(line, "tracker:") {
            current.get_or_insert_with(Dump::default).totals = tracker_totals(&fields);
        }
    }

    dumps.extend(current.filter(|dump| !dump.is_blank()));
    dumps
}

fn next_field<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    key: &'static str,
) -> Result<&'a str, ParseError> {
    match (tokens.next(), tokens.next()) {
        (Some(k), Some(value)) if k.strip_suffix(':') == Some(key) => Ok(value),
        _ => Err(ParseError::MissingField(key)),
    }
}

fn parse_hex(field: &'static str, value: &str) -> Result<u64, ParseError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_dec<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Parses `prefix key=value key=value ...`, tolerating text before the prefix.
fn key_values<'a>(line: &'a str, prefix: &str) -> Option<HashMap<&'a str, usize>> {
    let start = line.find(prefix)?;
    let fields: HashMap<_, _> = line[start + prefix.len()..]
        .split_whitespace()
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key, value.parse().ok()?))
        })
        .collect();
    (!fields.is_empty()).then_some(fields)
}

fn heap_stats(fields: &HashMap<&str, usize>) -> Option<HeapStats> {
    Some(HeapStats {
        current_size: *fields.get("current")?,
        max_size: *fields.get("max")?,
        total_size: *fields.get("total")?,
        reserved_size: fields.get("reserved").copied().unwrap_or(0),
        alloc_count: fields.get("allocations").copied().unwrap_or(0),
        alloc_fail_count: fields.get("failed").copied().unwrap_or(0),
    })
}

fn arena_stats(fields: &HashMap<&str, usize>) -> Option<ArenaStats> {
    let get = |key: &str| fields.get(key).copied().unwrap_or(0);
    Some(ArenaStats {
        arena: *fields.get("size")?,
        free_chunks: get("free_chunks"),
        mmapped_regions: get("mmapped_regions"),
        mmapped_bytes: get("mmapped_bytes"),
        in_use: get("in_use"),
        free: get("free"),
    })
}

fn tracker_totals(fields: &HashMap<&str, usize>) -> Option<TrackerTotals> {
    let get = |key: &str| fields.get(key).map(|v| *v as u64);
    Some(TrackerTotals {
        tracked: get("tracked")?,
        peak: get("peak").unwrap_or(0),
        max_entries: get("max_entries").unwrap_or(0),
        entries: get("entries").unwrap_or(0),
    })
}
