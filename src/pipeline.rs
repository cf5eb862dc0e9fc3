//! Sample Pipeline Module
//!
//! Runs the three typing adapters over one genome assembly and folds their
//! outcomes into a single [`SampleResult`]. The typing steps are independent:
//! a degraded field never blocks the others. Per-sample artifacts (the raw
//! SerotypeFinder JSON and the full result record) are written into the
//! shared output directory under sample-derived names, so concurrent samples
//! never collide.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::clermont;
use crate::locate::ToolSet;
use crate::mlst;
use crate::record::{Call, SampleResult};
use crate::serotype;

/// Processes one sample end-to-end and returns its normalized record.
///
/// A scratch directory scoped to this sample holds the serotyping tool's
/// working output; it is removed when the returned guard drops, and removal
/// failure is swallowed (tempfile's cleanup is best-effort by design).
pub fn process_sample(sample: &Path, tools: &ToolSet, outdir: &Path) -> Result<SampleResult> {
    eprintln!("[pipeline] processing {}", sample.display());

    let stem = sample_stem(sample);
    let scratch = tempfile::Builder::new()
        .prefix(&format!("ecolityper_{}_", stem))
        .tempdir()
        .context("failed to create scratch directory")?;

    let mlst_res = mlst::run_mlst(sample, tools.mlst.as_deref());
    let sero_res = serotype::run_serotypefinder(
        sample,
        tools.serotypefinder.as_deref(),
        tools.serotypefinder_db.as_deref(),
        tools.python.as_deref(),
        scratch.path(),
    );
    let clermont_res = clermont::run_clermont(sample, tools.ezclermont.as_deref());

    // Archive the raw serotype JSON before the scratch dir goes away.
    let serotype_json_file = match sero_res.json_path.as_deref().filter(|p| p.exists()) {
        Some(raw) => {
            let dest = outdir.join(format!("{}_serotype.json", stem));
            fs::copy(raw, &dest)
                .with_context(|| format!("failed to archive {}", raw.display()))?;
            Call::value(dest.display().to_string())
        }
        None => Call::Na,
    };

    let result = SampleResult {
        sample: sample
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| sample.display().to_string()),
        mlst_scheme: mlst_res.scheme,
        mlst_st: mlst_res.st,
        mlst_alleles: mlst_res.alleles,
        o_type: sero_res.o_type,
        h_type: sero_res.h_type,
        serotype: sero_res.serotype,
        clermont_phylotype: clermont_res.phylotype,
        clermont_method: clermont_res.method,
        typing_date: chrono::Local::now().to_rfc3339(),
        serotype_json_file,
    };

    let record_path = outdir.join(format!("{}.ecolityper.json", stem));
    let json = serde_json::to_string_pretty(&result)?;
    fs::write(&record_path, json)
        .with_context(|| format!("failed to write {}", record_path.display()))?;

    Ok(result)
}

/// File stem used to derive per-sample artifact names.
fn sample_stem(sample: &Path) -> String {
    sample
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tools_missing_yields_fully_na_record() {
        let outdir = tempfile::tempdir().unwrap();
        let sample_dir = tempfile::tempdir().unwrap();
        let sample = sample_dir.path().join("strainA.fasta");
        fs::write(&sample, ">contig1\nACGT\n").unwrap();

        let tools = ToolSet::default();
        let res = process_sample(&sample, &tools, outdir.path()).unwrap();

        assert_eq!(res.sample, "strainA.fasta");
        assert!(res.mlst_scheme.is_na());
        assert!(res.mlst_st.is_na());
        assert!(res.mlst_alleles.is_na());
        assert!(res.o_type.is_na());
        assert!(res.h_type.is_na());
        assert!(res.serotype.is_na());
        assert!(res.clermont_phylotype.is_na());
        assert!(res.clermont_method.is_na());
        assert!(res.serotype_json_file.is_na());
        assert!(!res.typing_date.is_empty());
    }

    #[test]
    fn test_per_sample_json_written() {
        let outdir = tempfile::tempdir().unwrap();
        let sample_dir = tempfile::tempdir().unwrap();
        let sample = sample_dir.path().join("strainB.fasta");
        fs::write(&sample, ">c\nACGT\n").unwrap();

        let res = process_sample(&sample, &ToolSet::default(), outdir.path()).unwrap();

        let record_path = outdir.path().join("strainB.ecolityper.json");
        let text = fs::read_to_string(&record_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["sample"], "strainB.fasta");
        assert_eq!(parsed["mlst_ST"], "NA");
        assert_eq!(parsed["typing_date"], res.typing_date);
    }

    #[test]
    fn test_records_identical_apart_from_timestamp() {
        let outdir = tempfile::tempdir().unwrap();
        let sample_dir = tempfile::tempdir().unwrap();
        let sample = sample_dir.path().join("strainC.fasta");
        fs::write(&sample, ">c\nACGT\n").unwrap();

        let a = process_sample(&sample, &ToolSet::default(), outdir.path()).unwrap();
        let b = process_sample(&sample, &ToolSet::default(), outdir.path()).unwrap();

        let mut ja = serde_json::to_value(&a).unwrap();
        let mut jb = serde_json::to_value(&b).unwrap();
        ja["typing_date"] = serde_json::Value::Null;
        jb["typing_date"] = serde_json::Value::Null;
        assert_eq!(ja, jb);
    }
}
