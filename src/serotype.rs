//! Serotype Adapter Module
//!
//! Wraps the bundled SerotypeFinder script. The script is run through the
//! python interpreter with an input genome, a private output directory, and
//! the reference database; it writes its findings to a `data.json` file:
//!
//! ```text
//! {"serotypefinder": {"results": {
//!     "O_type": {"<hit-id>": {"serotype": "O157", "bitscore": ...}, ...},
//!     "H_type": {"<hit-id>": {"serotype": "H7", ...}, ...}
//! }}}
//! ```
//!
//! Hit selection is deterministic: highest `bitscore` wins, ties break by
//! hit key. (The reference implementation took whatever hit the JSON map
//! happened to yield first, which is unstable under key reordering.)

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::record::Call;
use crate::runner::{self, DEFAULT_TIMEOUT};

/// Fixed name of the script's JSON result file.
const RESULT_FILE: &str = "data.json";

/// Serotyping outcome. `json_path` is kept even when no O/H type was found
/// so the raw output can still be archived next to the tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerotypeResult {
    pub o_type: Call,
    pub h_type: Call,
    /// Combined `O:H`, or whichever side is present, or NA.
    pub serotype: Call,
    pub json_path: Option<PathBuf>,
}

impl SerotypeResult {
    fn degraded() -> Self {
        Self {
            o_type: Call::Na,
            h_type: Call::Na,
            serotype: Call::Na,
            json_path: None,
        }
    }
}

/// Runs SerotypeFinder on one sample, writing tool output under `scratch`.
pub fn run_serotypefinder(
    sample: &Path,
    script: Option<&Path>,
    db: Option<&Path>,
    python: Option<&Path>,
    scratch: &Path,
) -> SerotypeResult {
    let Some(script) = script else {
        eprintln!("[serotype] SerotypeFinder script not found, skipping");
        return SerotypeResult::degraded();
    };
    let Some(db) = db else {
        eprintln!("[serotype] reference database not found, skipping");
        return SerotypeResult::degraded();
    };
    let Some(python) = python else {
        eprintln!("[serotype] python interpreter not found, skipping");
        return SerotypeResult::degraded();
    };

    let out_dir = scratch.join("serotypefinder_out");
    if let Err(e) = fs::create_dir_all(&out_dir) {
        eprintln!("[serotype] cannot create output dir: {}", e);
        return SerotypeResult::degraded();
    }

    let script_arg = script.display().to_string();
    let sample_arg = sample.display().to_string();
    let out_arg = out_dir.display().to_string();
    let db_arg = db.display().to_string();
    let cp = match runner::run_cmd_retry(
        python,
        &[
            &script_arg,
            "-i",
            &sample_arg,
            "-o",
            &out_arg,
            "-p",
            &db_arg,
        ],
        None,
        None,
        DEFAULT_TIMEOUT,
    ) {
        Ok(cp) => cp,
        Err(e) => {
            eprintln!("[serotype] {}", e);
            return SerotypeResult::degraded();
        }
    };

    if !cp.success() {
        eprintln!("[serotype] command failed: {}", cp.stderr.trim());
        return SerotypeResult::degraded();
    }

    let Some(json_path) = find_result_json(&out_dir) else {
        eprintln!("[serotype] no output produced for {}", sample.display());
        return SerotypeResult::degraded();
    };

    let text = match fs::read_to_string(&json_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("[serotype] cannot read {}: {}", json_path.display(), e);
            return SerotypeResult {
                json_path: Some(json_path),
                ..SerotypeResult::degraded()
            };
        }
    };

    let mut res = parse_serotype_json(&text);
    res.json_path = Some(json_path);
    if res.o_type.is_na() && res.h_type.is_na() {
        eprintln!("[serotype] no O or H type found for {}", sample.display());
    } else {
        eprintln!("[serotype] {}: {}", sample.display(), res.serotype);
    }
    res
}

/// Locates `data.json` inside the tool's output directory. Some tool
/// versions nest it one directory deeper, so one level of subdirectories is
/// searched as well (sorted, so discovery order is stable).
pub fn find_result_json(out_dir: &Path) -> Option<PathBuf> {
    let direct = out_dir.join(RESULT_FILE);
    if direct.exists() {
        return Some(direct);
    }

    let mut subdirs: Vec<PathBuf> = fs::read_dir(out_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    subdirs
        .into_iter()
        .map(|d| d.join(RESULT_FILE))
        .find(|p| p.exists())
}

/// Parses the SerotypeFinder result JSON into O/H calls. Unparseable text
/// or an unexpected shape degrades to NA; `json_path` is left for the
/// caller to fill in.
pub fn parse_serotype_json(text: &str) -> SerotypeResult {
    let data: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[serotype] could not parse result JSON: {}", e);
            return SerotypeResult::degraded();
        }
    };

    let results = &data["serotypefinder"]["results"];
    let o_type = best_hit_serotype(&results["O_type"]);
    let h_type = best_hit_serotype(&results["H_type"]);

    let serotype = match (&o_type, &h_type) {
        (Call::Value(o), Call::Value(h)) => Call::value(format!("{}:{}", o, h)),
        (Call::Value(o), Call::Na) => Call::value(o.clone()),
        (Call::Na, Call::Value(h)) => Call::value(h.clone()),
        (Call::Na, Call::Na) => Call::Na,
    };

    SerotypeResult {
        o_type,
        h_type,
        serotype,
        json_path: None,
    }
}

/// Picks one serotype out of a type's hit map: highest bitscore first,
/// then lexicographically smallest hit key.
fn best_hit_serotype(hits: &Value) -> Call {
    let Some(map) = hits.as_object() else {
        return Call::Na;
    };

    let mut best: Option<(f64, &String, &str)> = None;
    for (key, hit) in map {
        let Some(serotype) = hit.get("serotype").and_then(Value::as_str) else {
            continue;
        };
        let score = hit.get("bitscore").and_then(Value::as_f64).unwrap_or(0.0);
        let better = match &best {
            None => true,
            Some((best_score, best_key, _)) => {
                score > *best_score || (score == *best_score && key < *best_key)
            }
        };
        if better {
            best = Some((score, key, serotype));
        }
    }

    match best {
        Some((_, _, serotype)) => Call::value(serotype),
        None => Call::Na,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_types() {
        let json = r#"{"serotypefinder":{"results":{
            "O_type":{"h1":{"serotype":"O157"}},
            "H_type":{"h2":{"serotype":"H7"}}}}}"#;
        let res = parse_serotype_json(json);
        assert_eq!(res.o_type, Call::value("O157"));
        assert_eq!(res.h_type, Call::value("H7"));
        assert_eq!(res.serotype, Call::value("O157:H7"));
    }

    #[test]
    fn test_parse_o_only() {
        let json = r#"{"serotypefinder":{"results":{
            "O_type":{"h1":{"serotype":"O26"}},
            "H_type":{}}}}"#;
        let res = parse_serotype_json(json);
        assert_eq!(res.o_type, Call::value("O26"));
        assert_eq!(res.h_type, Call::Na);
        assert_eq!(res.serotype, Call::value("O26"));
    }

    #[test]
    fn test_parse_h_only() {
        let json = r#"{"serotypefinder":{"results":{
            "H_type":{"h2":{"serotype":"H11"}}}}}"#;
        let res = parse_serotype_json(json);
        assert_eq!(res.o_type, Call::Na);
        assert_eq!(res.serotype, Call::value("H11"));
    }

    #[test]
    fn test_parse_empty_results_is_na() {
        let json = r#"{"serotypefinder":{"results":{"O_type":{},"H_type":{}}}}"#;
        let res = parse_serotype_json(json);
        assert_eq!(res.o_type, Call::Na);
        assert_eq!(res.h_type, Call::Na);
        assert_eq!(res.serotype, Call::Na);
    }

    #[test]
    fn test_parse_garbage_is_na() {
        let res = parse_serotype_json("not json at all");
        assert_eq!(res.serotype, Call::Na);
    }

    #[test]
    fn test_best_hit_prefers_highest_bitscore() {
        let json = r#"{"serotypefinder":{"results":{
            "O_type":{
                "z":{"serotype":"O111","bitscore":900.0},
                "a":{"serotype":"O157","bitscore":1500.0}},
            "H_type":{}}}}"#;
        let res = parse_serotype_json(json);
        assert_eq!(res.o_type, Call::value("O157"));
    }

    #[test]
    fn test_best_hit_ties_break_by_key() {
        let json = r#"{"serotypefinder":{"results":{
            "O_type":{
                "b":{"serotype":"O26","bitscore":100.0},
                "a":{"serotype":"O103","bitscore":100.0}},
            "H_type":{}}}}"#;
        let res = parse_serotype_json(json);
        assert_eq!(res.o_type, Call::value("O103"));
    }

    #[test]
    fn test_find_result_json_direct_and_nested() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_result_json(dir.path()), None);

        let nested = dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join(RESULT_FILE), "{}").unwrap();
        assert_eq!(find_result_json(dir.path()).unwrap(), nested.join(RESULT_FILE));

        // direct file wins over the nested one
        let direct = dir.path().join(RESULT_FILE);
        std::fs::write(&direct, "{}").unwrap();
        assert_eq!(find_result_json(dir.path()).unwrap(), direct);
    }

    #[test]
    fn test_missing_script_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let res = run_serotypefinder(
            Path::new("strainA.fasta"),
            None,
            Some(Path::new("/db")),
            Some(Path::new("/usr/bin/python3")),
            dir.path(),
        );
        assert_eq!(res, SerotypeResult::degraded());
    }

    #[test]
    fn test_missing_db_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let res = run_serotypefinder(
            Path::new("strainA.fasta"),
            Some(Path::new("/tools/serotypefinder.py")),
            None,
            Some(Path::new("/usr/bin/python3")),
            dir.path(),
        );
        assert_eq!(res, SerotypeResult::degraded());
    }
}
