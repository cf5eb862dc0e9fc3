//! Result Record Module
//!
//! Normalized records produced by the pipeline. Every typing field is a
//! [`Call`]: either a concrete value or the "NA" sentinel. "NA" is a
//! first-class domain value (a dependency was missing or a tool's output
//! could not be used), not an error, and always populates its column.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Sentinel text for a typing field with no usable value.
pub const NA: &str = "NA";

/// A typing field: a called value or the "NA" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Value(String),
    Na,
}

impl Call {
    pub fn value(v: impl Into<String>) -> Self {
        Call::Value(v.into())
    }

    pub fn is_na(&self) -> bool {
        matches!(self, Call::Na)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Call::Value(v) => v,
            Call::Na => NA,
        }
    }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Call {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Normalized outcome for one input genome. Built once per sample after all
/// three adapters complete; never mutated afterward.
///
/// Field names match the JSON records the original tool emitted, so
/// downstream consumers of `<stem>.ecolityper.json` keep working.
#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    /// Input file name (not the full path).
    pub sample: String,
    pub mlst_scheme: Call,
    #[serde(rename = "mlst_ST")]
    pub mlst_st: Call,
    pub mlst_alleles: Call,
    #[serde(rename = "O_type")]
    pub o_type: Call,
    #[serde(rename = "H_type")]
    pub h_type: Call,
    /// Combined `O:H` string, or whichever side was typed.
    pub serotype: Call,
    /// One of A, B1, B2, C, D, E, F, G, or NA.
    pub clermont_phylotype: Call,
    /// Fixed to "PCR" when typed (ezclermont's sole mode).
    pub clermont_method: Call,
    /// ISO-8601 timestamp of when this sample was typed.
    pub typing_date: String,
    /// Path of the archived raw SerotypeFinder JSON, or NA.
    pub serotype_json_file: Call,
}

impl SampleResult {
    /// TSV row for `mlst_results.tsv`.
    pub fn mlst_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.sample, self.mlst_scheme, self.mlst_st, self.mlst_alleles
        )
    }

    /// TSV row for `serotype_results.tsv`.
    pub fn serotype_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.sample, self.o_type, self.h_type, self.serotype
        )
    }

    /// TSV row for `clermont_results.tsv`.
    pub fn clermont_row(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.sample, self.clermont_phylotype, self.clermont_method
        )
    }

    /// TSV row for `ecolityper_summary.tsv`.
    pub fn summary_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.sample,
            self.mlst_scheme,
            self.mlst_st,
            self.o_type,
            self.h_type,
            self.clermont_phylotype,
            self.clermont_method
        )
    }
}

/// Run-level metadata, written once at the end of a batch.
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    pub version: String,
    /// Batch start time, ISO-8601.
    pub date: String,
    /// Resolved absolute input paths.
    pub inputs: Vec<String>,
    /// Resolved output directory.
    pub outdir: String,
    /// Tool name to resolved path, "NA" when unavailable.
    pub tools: BTreeMap<String, String>,
}

impl RunMetadata {
    pub fn new(
        start: chrono::DateTime<chrono::Local>,
        inputs: &[PathBuf],
        outdir: &Path,
        tools: &crate::locate::ToolSet,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            date: start.to_rfc3339(),
            inputs: inputs.iter().map(|p| p.display().to_string()).collect(),
            outdir: outdir.display().to_string(),
            tools: tools
                .entries()
                .into_iter()
                .map(|(name, path)| {
                    let value = path
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| NA.to_string());
                    (name.to_string(), value)
                })
                .collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
