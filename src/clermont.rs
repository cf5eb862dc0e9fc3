//! Clermont Adapter Module
//!
//! Wraps the ezclermont phylotyper (installed separately via pip). The tool
//! takes a genome path as its sole argument and prints a tab-separated
//! assignment line such as `ecoli\tB1`. The second field must be one of the
//! eight Clermont phylogroups; anything else is ignored. ezclermont has a
//! single classification mode, so the method label is fixed to "PCR".

use std::path::Path;

use crate::record::Call;
use crate::runner::{self, DEFAULT_TIMEOUT};

/// The fixed Clermont phylogroup codes for E. coli.
pub const PHYLOGROUPS: [&str; 8] = ["A", "B1", "B2", "C", "D", "E", "F", "G"];

/// Method label reported for a successful call.
const METHOD: &str = "PCR";

/// Clermont typing outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClermontResult {
    pub phylotype: Call,
    pub method: Call,
}

impl ClermontResult {
    fn degraded() -> Self {
        Self {
            phylotype: Call::Na,
            method: Call::Na,
        }
    }
}

/// Runs ezclermont on one sample.
pub fn run_clermont(sample: &Path, ezclermont_bin: Option<&Path>) -> ClermontResult {
    let Some(ezclermont_bin) = ezclermont_bin else {
        eprintln!("[clermont] ezclermont not found (install with: pip install ezclermont)");
        return ClermontResult::degraded();
    };

    let sample_arg = sample.display().to_string();
    let cp = match runner::run_cmd_retry(
        ezclermont_bin,
        &[&sample_arg],
        None,
        None,
        DEFAULT_TIMEOUT,
    ) {
        Ok(cp) => cp,
        Err(e) => {
            eprintln!("[clermont] {}", e);
            return ClermontResult::degraded();
        }
    };

    if !cp.success() {
        eprintln!("[clermont] command failed: {}", cp.stderr.trim());
        return ClermontResult::degraded();
    }

    if cp.stdout.trim().is_empty() {
        eprintln!("[clermont] no output produced for {}", sample.display());
        return ClermontResult::degraded();
    }

    match parse_clermont_output(&cp.stdout) {
        Some(phylotype) => {
            eprintln!("[clermont] {}: {} ({})", sample.display(), phylotype, METHOD);
            ClermontResult {
                phylotype: Call::value(phylotype),
                method: Call::value(METHOD),
            }
        }
        None => {
            eprintln!("[clermont] could not parse phylotype for {}", sample.display());
            ClermontResult::degraded()
        }
    }
}

/// Scans output lines for the first tab-separated line whose second field
/// is a known phylogroup code.
pub fn parse_clermont_output(stdout: &str) -> Option<&str> {
    for line in stdout.lines() {
        let line = line.trim();
        let mut fields = line.split('\t');
        let _label = fields.next()?;
        if let Some(second) = fields.next() {
            let candidate = second.trim();
            if PHYLOGROUPS.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
