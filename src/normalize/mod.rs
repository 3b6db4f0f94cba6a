// src/normalize/mod.rs

//! Source normalizer
//!
//! Rewrites heterogeneous input records into the canonical key=value
//! stream consumed by the import parser. Rule tables drive the rewrite:
//! which keys open a new record, which keys are valid after which
//! context, how keys rename, and which values live in a per-source PIN
//! namespace.
//!
//! PIN rewriting exists to stop a league's habit of using federation
//! grading codes as PINs from silently joining different players across
//! sources: a PIN that looks like a grading code is replaced by
//! `<source>-<n>` where n is its insertion index in the source's PIN
//! map. The map is per-source and never shared.

pub mod league;
pub mod submission_file;

use crate::ecf::code;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One canonical record: ordered key=value pairs
pub type CanonicalRecord = Vec<(String, String)>;

/// A structural problem found while normalizing one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeIssue {
    pub description: String,
    pub line: usize,
    pub text: String,
}

/// Result of normalizing one source file
#[derive(Debug, Clone)]
pub struct SourceReport {
    /// Base name of the source; also the PIN namespace prefix
    pub source: String,
    pub records: Vec<CanonicalRecord>,
    /// Non-empty means the source was abandoned at the first error
    pub errors: Vec<NormalizeIssue>,
}

impl SourceReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A key=value input line with its provenance
#[derive(Debug, Clone)]
pub struct KeyedLine {
    pub key: String,
    pub value: String,
    pub line: usize,
    pub raw: String,
}

/// Split raw text into keyed lines; empty lines are skipped, lines
/// without '=' are structural errors handled by the engine.
pub fn keyed_lines(text: &str) -> Vec<KeyedLine> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (String::new(), String::new()),
            };
            KeyedLine {
                key,
                value,
                line: i,
                raw: line.to_string(),
            }
        })
        .collect()
}

/// Validity rule for a key: which context must precede it
#[derive(Debug, Clone)]
pub enum Validity {
    Always,
    After(&'static str),
    AfterAny(&'static [&'static str]),
}

/// Rule tables driving one source format
#[derive(Debug, Clone, Default)]
pub struct RuleTables {
    /// Keys that close the in-progress record and open a new one
    pub context: HashSet<&'static str>,
    /// Context requirements; keys absent here are always valid
    pub validmap: HashMap<&'static str, Validity>,
    /// Canonical output key per input key; absence means discard unless
    /// the key is a context marker or carries a grading code
    pub keymap: HashMap<&'static str, &'static str>,
    /// Keys whose values introduce a new entry in the PIN namespace
    pub pinmap: HashSet<&'static str>,
    /// Keys whose values must already be in the PIN namespace
    pub pinreadmap: HashSet<&'static str>,
    /// Keys carrying an explicit grading code, with their output key
    pub gradingcodemap: HashMap<&'static str, &'static str>,
    /// Keys consumed but never re-emitted
    pub discardmap: HashSet<&'static str>,
}

/// Per-source PIN namespace map
#[derive(Debug, Default)]
struct PinMap {
    map: HashMap<String, String>,
}

impl PinMap {
    /// Introduce a value; grading-code-shaped values are renamed into
    /// the source namespace, anything else passes through unchanged.
    fn introduce(&mut self, prefix: &str, value: &str) -> String {
        if let Some(existing) = self.map.get(value) {
            return existing.clone();
        }
        let mapped = if code::looks_like_code(value) {
            format!("{}-{}", prefix, self.map.len())
        } else {
            value.to_string()
        };
        self.map.insert(value.to_string(), mapped.clone());
        mapped
    }

    fn read(&self, value: &str) -> Option<String> {
        self.map.get(value).cloned()
    }
}

/// The rule-table-driven rewrite engine
pub struct Normalizer<'a> {
    tables: &'a RuleTables,
}

impl<'a> Normalizer<'a> {
    pub fn new(tables: &'a RuleTables) -> Self {
        Self { tables }
    }

    /// Normalize one source.
    ///
    /// `keep_record` filters flushed records; the league driver uses it
    /// to drop player records whose PIN no game references. Processing
    /// stops at the first structural error; the partial record list is
    /// still returned alongside the error.
    pub fn run<F>(&self, source: &str, lines: &[KeyedLine], mut keep_record: F) -> SourceReport
    where
        F: FnMut(&str, &CanonicalRecord) -> bool,
    {
        let mut report = SourceReport {
            source: source.to_string(),
            records: Vec::new(),
            errors: Vec::new(),
        };
        let mut pins = PinMap::default();
        let mut record: CanonicalRecord = Vec::new();
        // Raw (un-rewritten) value of the current record's PIN field
        let mut record_raw_pin: Option<String> = None;
        // Context key that opened the current record
        let mut context_key: Option<String> = None;

        for line in lines {
            if line.key.is_empty() {
                report.errors.push(NormalizeIssue {
                    description: "Line is not a keyword=value record".to_string(),
                    line: line.line,
                    text: line.raw.clone(),
                });
                break;
            }
            let key = line.key.as_str();

            if let Some(validity) = self.tables.validmap.get(key) {
                let prior = context_key.as_deref().unwrap_or("");
                let ok = match validity {
                    Validity::Always => true,
                    Validity::After(required) => prior == *required,
                    Validity::AfterAny(allowed) => allowed.contains(&prior),
                };
                if !ok {
                    report.errors.push(NormalizeIssue {
                        description: format!(
                            "Keyword {} not expected after keyword {}",
                            key,
                            if prior.is_empty() { "<start>" } else { prior }
                        ),
                        line: line.line,
                        text: line.raw.clone(),
                    });
                    break;
                }
            }

            if self.tables.context.contains(key) {
                // Flush the in-progress record before switching context
                if !record.is_empty() {
                    let ctx = context_key.as_deref().unwrap_or("");
                    if keep_record(ctx, &record) {
                        report.records.push(std::mem::take(&mut record));
                    } else {
                        record.clear();
                    }
                }
                record_raw_pin = None;
                context_key = Some(key.to_string());
            }

            if self.tables.discardmap.contains(key) {
                continue;
            }

            if let Some(out_key) = self.tables.gradingcodemap.get(key) {
                if let Some(raw_pin) = &record_raw_pin {
                    if raw_pin.starts_with(line.value.as_str()) {
                        report.errors.push(NormalizeIssue {
                            description: format!(
                                "Grading code {} is included in player pin {}",
                                line.value, raw_pin
                            ),
                            line: line.line,
                            text: line.raw.clone(),
                        });
                        break;
                    }
                }
                record.push(((*out_key).to_string(), line.value.clone()));
                continue;
            }

            let value = if self.tables.pinmap.contains(key) {
                record_raw_pin = Some(line.value.clone());
                pins.introduce(source, &line.value)
            } else if self.tables.pinreadmap.contains(key) {
                if line.value == "0" {
                    // Federation-reserved PIN for bye and void scoring;
                    // it never names a player record
                    record.push((
                        self.tables
                            .keymap
                            .get(key)
                            .map(|k| (*k).to_string())
                            .unwrap_or_else(|| key.to_string()),
                        line.value.clone(),
                    ));
                    continue;
                }
                match pins.read(&line.value) {
                    Some(mapped) => mapped,
                    None => {
                        report.errors.push(NormalizeIssue {
                            description: format!(
                                "PIN {} for field {} is not in PIN map",
                                line.value, key
                            ),
                            line: line.line,
                            text: line.raw.clone(),
                        });
                        break;
                    }
                }
            } else {
                line.value.clone()
            };

            match self.tables.keymap.get(key) {
                Some(out_key) => record.push(((*out_key).to_string(), value)),
                None => {
                    // Unmapped non-context keys are discarded
                    if !self.tables.context.contains(key) {
                        debug!("Discarding unmapped keyword {} at line {}", key, line.line);
                    }
                }
            }
        }

        if report.errors.is_empty() && !record.is_empty() {
            let ctx = context_key.as_deref().unwrap_or("");
            if keep_record(ctx, &record) {
                report.records.push(record);
            }
        }
        report
    }
}

/// Render a list of source reports as one canonical key=value stream
pub fn render_stream(reports: &[SourceReport]) -> String {
    let mut out = String::new();
    for report in reports {
        for record in &report.records {
            for (key, value) in record {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> RuleTables {
        let mut t = RuleTables::default();
        t.context = ["P", "G"].into_iter().collect();
        t.keymap = [("P", "pin"), ("N", "name"), ("G", "homepin")]
            .into_iter()
            .collect();
        t.validmap
            .insert("N", Validity::After("P"));
        t.pinmap = ["P"].into_iter().collect();
        t.pinreadmap = ["G"].into_iter().collect();
        t
    }

    fn lines(text: &str) -> Vec<KeyedLine> {
        keyed_lines(text)
    }

    #[test]
    fn test_pin_namespace_rewrite() {
        let tables = tables();
        let normalizer = Normalizer::new(&tables);
        let input = lines("P=123456A\nN=Smith A\nG=123456A\n");
        let report = normalizer.run("src1", &input, |_, _| true);
        assert!(report.is_ok(), "{:?}", report.errors);
        assert_eq!(report.records[0][0], ("pin".to_string(), "src1-0".to_string()));
        assert_eq!(report.records[1][0], ("homepin".to_string(), "src1-0".to_string()));
    }

    #[test]
    fn test_plain_pin_preserved() {
        let tables = tables();
        let normalizer = Normalizer::new(&tables);
        let input = lines("P=17\nN=Smith A\n");
        let report = normalizer.run("src1", &input, |_, _| true);
        assert_eq!(report.records[0][0], ("pin".to_string(), "17".to_string()));
    }

    #[test]
    fn test_non_ascii_pin_passes_through() {
        let tables = tables();
        let normalizer = Normalizer::new(&tables);
        // Seven bytes with a multibyte tail: not a grading code, kept verbatim
        let input = lines("P=12345é\nN=Smith A\nG=12345é\n");
        let report = normalizer.run("src1", &input, |_, _| true);
        assert!(report.is_ok(), "{:?}", report.errors);
        assert_eq!(report.records[0][0], ("pin".to_string(), "12345é".to_string()));
        assert_eq!(report.records[1][0], ("homepin".to_string(), "12345é".to_string()));
    }

    #[test]
    fn test_pin_map_miss_is_fatal() {
        let tables = tables();
        let normalizer = Normalizer::new(&tables);
        let input = lines("G=999999\n");
        let report = normalizer.run("src1", &input, |_, _| true);
        assert!(!report.is_ok());
        assert!(report.errors[0]
            .description
            .contains("PIN 999999 for field G is not in PIN map"));
    }

    #[test]
    fn test_keyword_after_wrong_context() {
        let tables = tables();
        let normalizer = Normalizer::new(&tables);
        let input = lines("N=Smith A\n");
        let report = normalizer.run("src1", &input, |_, _| true);
        assert!(!report.is_ok());
        assert!(report.errors[0]
            .description
            .contains("Keyword N not expected after keyword"));
    }

    #[test]
    fn test_distinct_sources_get_distinct_namespaces() {
        let tables = tables();
        let normalizer = Normalizer::new(&tables);
        let input = lines("P=123456A\n");
        let a = normalizer.run("src1", &input, |_, _| true);
        let b = normalizer.run("src2", &input, |_, _| true);
        assert_eq!(a.records[0][0].1, "src1-0");
        assert_eq!(b.records[0][0].1, "src2-0");
    }
}
