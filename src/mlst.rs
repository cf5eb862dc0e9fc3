//! MLST Adapter Module
//!
//! Wraps the bundled MLST caller (tseemann/mlst). The tool takes a genome
//! path as its sole argument and prints one tab-separated row per input:
//!
//! ```text
//! <file>  <scheme>  <ST>  [<allele profile>]
//! ```
//!
//! Every failure mode (missing tool, non-executable tool, missing input,
//! failed command, unparseable output) degrades to `NA,NA,NA` with a logged
//! reason. It never aborts the sample.

use std::collections::HashMap;
use std::path::Path;

use crate::record::Call;
use crate::runner::{self, DEFAULT_TIMEOUT};

/// MLST typing outcome. Each field independently falls back to NA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlstResult {
    pub scheme: Call,
    pub st: Call,
    pub alleles: Call,
}

impl MlstResult {
    fn degraded() -> Self {
        Self {
            scheme: Call::Na,
            st: Call::Na,
            alleles: Call::Na,
        }
    }
}

/// Runs the MLST caller on one sample.
///
/// The tool is invoked from its own directory (it resolves its scheme
/// database relative to cwd) with `PERL5LIB` pointed at the bundled perl
/// runtime when present.
pub fn run_mlst(sample: &Path, mlst_bin: Option<&Path>) -> MlstResult {
    let Some(mlst_bin) = mlst_bin else {
        eprintln!("[mlst] binary not found, skipping");
        return MlstResult::degraded();
    };

    if !is_executable(mlst_bin) {
        eprintln!("[mlst] binary not executable: {}", mlst_bin.display());
        return MlstResult::degraded();
    }

    if !sample.exists() {
        eprintln!("[mlst] input file does not exist: {}", sample.display());
        return MlstResult::degraded();
    }

    let mut env = HashMap::new();
    if let Some(tool_dir) = mlst_bin.parent() {
        if let Some(install_root) = tool_dir.parent() {
            let perl5 = install_root.join("perl5");
            if perl5.exists() {
                env.insert("PERL5LIB".to_string(), perl5.display().to_string());
            }
        }
    }

    let sample_arg = sample.display().to_string();
    let cp = match runner::run_cmd_retry(
        mlst_bin,
        &[&sample_arg],
        mlst_bin.parent(),
        Some(&env),
        DEFAULT_TIMEOUT,
    ) {
        Ok(cp) => cp,
        Err(e) => {
            eprintln!("[mlst] {}", e);
            return MlstResult::degraded();
        }
    };

    if !cp.success() {
        eprintln!("[mlst] command failed: {}", cp.stderr.trim());
        return MlstResult::degraded();
    }

    match parse_mlst_output(&cp.stdout, sample) {
        Some(res) => {
            eprintln!("[mlst] {}: ST{} ({})", sample.display(), res.st, res.scheme);
            res
        }
        None => {
            eprintln!("[mlst] no matching row for {}", sample.display());
            MlstResult::degraded()
        }
    }
}

/// Scans tab-separated output for the row belonging to `sample` and pulls
/// scheme / ST / alleles from it. A row belongs to the sample when its first
/// field is the sample's file name or full path (the tool echoes back
/// whichever form it was given); substring matches are not accepted, so
/// `A.fasta` never claims a `strainA.fasta` row. The alleles column is
/// optional; when absent it is reported as an empty string, not NA.
pub fn parse_mlst_output(stdout: &str, sample: &Path) -> Option<MlstResult> {
    let file_name = sample.file_name()?;
    let full_path = sample.display().to_string();

    for line in stdout.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        let first = parts[0];
        if first != full_path && Path::new(first).file_name() != Some(file_name) {
            continue;
        }
        if parts.len() >= 3 {
            let alleles = parts.get(3).copied().unwrap_or("");
            return Some(MlstResult {
                scheme: Call::value(parts[1]),
                st: Call::value(parts[2]),
                alleles: Call::value(alleles),
            });
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.exists()
}

// ============================================================================
// Tests
// ============================================================================
