use anyhow::{Context, Result};
use clap::Parser;
use rustc_hash::FxHashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use ecolityper::locate::{BundledResolver, ToolSet};
use ecolityper::pipeline::process_sample;
use ecolityper::record::{RunMetadata, SampleResult};

/// Exit status for "no inputs specified or none matched".
const EXIT_NO_INPUTS: u8 = 2;
/// Exit status after a user interrupt (SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "ecolityper")]
#[command(about = "Unified MLST + serotyping + Clermont phylotyping for E. coli assemblies")]
#[command(long_about = r#"
ecolityper - unified E. coli genotyping

Runs three typing tools over each input genome assembly and merges their
results: MLST (scheme, sequence type, allele profile), SerotypeFinder
(O/H antigen types), and ezclermont (Clermont phylogroup). A typing step
whose tool is unavailable or whose output cannot be used reports "NA" for
its fields; the remaining steps and samples are unaffected.

OUTPUT FILES (inside --outdir):
  mlst_results.tsv            sample, mlst_scheme, mlst_ST, alleles
  serotype_results.tsv        sample, O_type, H_type, serotype
  clermont_results.tsv        sample, clermont_phylotype, clermont_method
  ecolityper_summary.tsv      combined table
  {sample}.ecolityper.json    full per-sample record
  {sample}_serotype.json      raw SerotypeFinder output, when produced
  ecolityper_run_meta.json    run metadata

EXIT CODES:
  0    success
  2    no input files specified or none matched
  1    fatal error
  130  interrupted by user
"#)]
struct Args {
    /// Input genome FASTA files (supports globs, e.g. '*.fasta')
    #[arg(short = 'i', long, num_args = 1.., help_heading = "Input")]
    inputs: Option<Vec<String>>,

    /// Output directory
    #[arg(short = 'o', long, default_value = "ecolityper_results", help_heading = "Output")]
    outdir: PathBuf,

    /// Number of parallel workers (0 = all CPUs)
    #[arg(long, default_value_t = 0, help_heading = "Runtime")]
    threads: usize,

    /// Check tool/database availability and exit
    #[arg(long, help_heading = "Runtime")]
    check: bool,

    /// Update bundled databases before running (not yet implemented)
    #[arg(long, help_heading = "Runtime")]
    update_db: bool,

    /// Print version and exit
    #[arg(long, help_heading = "Runtime")]
    version: bool,
}

struct Semaphore {
    count: Mutex<usize>,
    cvar: Condvar,
}

impl Semaphore {
    fn new(count: usize) -> Self {
        Semaphore {
            count: Mutex::new(count),
            cvar: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cvar.wait(count).unwrap();
        }
        *count -= 1;
    }

    fn release(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cvar.notify_one();
    }
}

// ============================================================================
// Output tables
// ============================================================================

/// One TSV result table. Appends take the file mutex for the whole row, so
/// concurrent workers never interleave within a line.
struct Table {
    file: Mutex<File>,
}

impl Table {
    fn create(path: &Path, header: &str) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(file, "{}", header)?;
        file.flush()?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Writes one full row and flushes immediately, so a crashed batch still
    /// leaves a valid partial table.
    fn append(&self, row: &str) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{}", row)?;
        file.flush()?;
        Ok(())
    }
}

/// The four synchronized result tables.
struct OutputTables {
    mlst: Table,
    serotype: Table,
    clermont: Table,
    summary: Table,
}

impl OutputTables {
    fn create(outdir: &Path) -> Result<Self> {
        Ok(Self {
            mlst: Table::create(
                &outdir.join("mlst_results.tsv"),
                "sample\tmlst_scheme\tmlst_ST\talleles",
            )?,
            serotype: Table::create(
                &outdir.join("serotype_results.tsv"),
                "sample\tO_type\tH_type\tserotype",
            )?,
            clermont: Table::create(
                &outdir.join("clermont_results.tsv"),
                "sample\tclermont_phylotype\tclermont_method",
            )?,
            summary: Table::create(
                &outdir.join("ecolityper_summary.tsv"),
                "sample\tmlst_scheme\tmlst_ST\tO_type\tH_type\tclermont_phylotype\tclermont_method",
            )?,
        })
    }

    fn append(&self, res: &SampleResult) -> Result<()> {
        self.mlst.append(&res.mlst_row())?;
        self.serotype.append(&res.serotype_row())?;
        self.clermont.append(&res.clermont_row())?;
        self.summary.append(&res.summary_row())?;
        Ok(())
    }
}

// ============================================================================
// Input expansion
// ============================================================================

/// Expands input patterns (shell globs, `~`) into a deduplicated list of
/// existing files, resolved to absolute paths. First-occurrence order is
/// preserved; missing paths and directories are silently dropped.
fn expand_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern = expand_tilde(pattern);
        let candidates: Vec<PathBuf> = match glob::glob(&pattern) {
            Ok(matches) => matches.filter_map(|m| m.ok()).collect(),
            // Not a valid glob pattern; treat it as a literal path.
            Err(_) => vec![PathBuf::from(&pattern)],
        };

        for candidate in candidates {
            if !candidate.is_file() {
                continue;
            }
            let resolved = fs::canonicalize(&candidate).unwrap_or(candidate);
            if seen.insert(resolved.clone()) {
                files.push(resolved);
            }
        }
    }

    files
}

fn expand_tilde(pattern: &str) -> String {
    if let Some(home) = dirs::home_dir() {
        if pattern == "~" {
            return home.display().to_string();
        }
        if let Some(rest) = pattern.strip_prefix("~/") {
            return home.join(rest).display().to_string();
        }
    }
    pattern.to_string()
}

// ============================================================================
// Environment report
// ============================================================================

fn print_environment_report(tools: &ToolSet) {
    eprintln!("tool availability:");
    for (name, path) in tools.entries() {
        match path {
            Some(p) => eprintln!("  [ok]      {:16} {}", name, p.display()),
            None => eprintln!("  [missing] {:16} NOT FOUND", name),
        }
    }
}

// ============================================================================
// Batch run
// ============================================================================

fn run_batch(args: &Args, samples: &[PathBuf], interrupted: &AtomicBool) -> Result<ExitCode> {
    fs::create_dir_all(&args.outdir)
        .with_context(|| format!("failed to create output directory {}", args.outdir.display()))?;

    let start_time = chrono::Local::now();
    let wall_clock = Instant::now();

    let tables = OutputTables::create(&args.outdir)?;
    let tools = ToolSet::detect(&BundledResolver::new());

    let threads = if args.threads == 0 {
        num_cpus::get()
    } else {
        args.threads
    };
    let workers = threads.max(1);

    eprintln!(
        "[batch] processing {} sample(s) with {} worker(s)",
        samples.len(),
        workers
    );

    let semaphore = Semaphore::new(workers);
    let completed = AtomicUsize::new(0);
    let total = samples.len();
    let tools_ref = &tools;
    let tables_ref = &tables;
    let outdir = args.outdir.as_path();

    std::thread::scope(|s| {
        for sample in samples {
            let sem = &semaphore;
            let completed = &completed;

            s.spawn(move || {
                sem.acquire();
                if interrupted.load(Ordering::SeqCst) {
                    sem.release();
                    return;
                }

                match process_sample(sample, tools_ref, outdir) {
                    Ok(res) => {
                        if let Err(e) = tables_ref.append(&res) {
                            eprintln!("[batch] failed to record {}: {}", res.sample, e);
                        } else {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            eprintln!("[batch] {}/{} done: {}", done, total, res.sample);
                        }
                    }
                    Err(e) => {
                        eprintln!("[batch] error processing {}: {:#}", sample.display(), e)
                    }
                }

                sem.release();
            });
        }
    });

    if interrupted.load(Ordering::SeqCst) {
        eprintln!("[batch] interrupted, stopping");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }

    let meta = RunMetadata::new(start_time, samples, &args.outdir, &tools);
    let meta_path = args.outdir.join("ecolityper_run_meta.json");
    fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("failed to write {}", meta_path.display()))?;

    eprintln!(
        "[batch] finished in {:.1}s, results in {}",
        wall_clock.elapsed().as_secs_f64(),
        args.outdir.display()
    );

    Ok(ExitCode::SUCCESS)
}

fn run(args: &Args, interrupted: &AtomicBool) -> Result<ExitCode> {
    if args.version {
        println!("ecolityper {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    if args.check {
        let tools = ToolSet::detect(&BundledResolver::new());
        print_environment_report(&tools);
        return Ok(ExitCode::SUCCESS);
    }

    if args.update_db {
        eprintln!("[update] database update is not implemented yet");
    }

    let Some(patterns) = args.inputs.as_deref().filter(|p| !p.is_empty()) else {
        eprintln!("ERROR: no input files specified. Use -i to supply genomes.");
        return Ok(ExitCode::from(EXIT_NO_INPUTS));
    };

    let samples = expand_inputs(patterns);
    if samples.is_empty() {
        eprintln!("ERROR: no input files matched.");
        return Ok(ExitCode::from(EXIT_NO_INPUTS));
    }

    run_batch(args, &samples, interrupted)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        // Stop picking up new samples; in-flight ones are allowed to finish.
        let _ = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        });
    }

    match run(&args, &interrupted) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ecolityper::record::Call;

    fn na_result(sample: &str) -> SampleResult {
        SampleResult {
            sample: sample.to_string(),
            mlst_scheme: Call::Na,
            mlst_st: Call::Na,
            mlst_alleles: Call::Na,
            o_type: Call::Na,
            h_type: Call::Na,
            serotype: Call::Na,
            clermont_phylotype: Call::Na,
            clermont_method: Call::Na,
            typing_date: "2025-01-01T00:00:00".to_string(),
            serotype_json_file: Call::Na,
        }
    }

    #[test]
    fn test_expand_inputs_glob_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.fasta"), ">a\n").unwrap();
        fs::write(dir.path().join("b.fasta"), ">b\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("sub.fasta")).unwrap();

        let glob_pat = format!("{}/*.fasta", dir.path().display());
        let literal = format!("{}/a.fasta", dir.path().display());
        let files = expand_inputs(&[glob_pat, literal]);

        // a.fasta appears in both patterns but only once in the result;
        // the directory named *.fasta is filtered out
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.is_absolute()));
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.fasta", "b.fasta"]);
    }

    #[test]
    fn test_expand_tilde_handles_bare_and_prefixed_forms() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_tilde("~"), home.display().to_string());
        assert_eq!(
            expand_tilde("~/genomes/*.fasta"),
            home.join("genomes/*.fasta").display().to_string()
        );
        // a tilde anywhere else is literal
        assert_eq!(expand_tilde("data/~backup.fasta"), "data/~backup.fasta");
    }

    #[test]
    fn test_expand_inputs_nothing_matched() {
        let dir = tempfile::tempdir().unwrap();
        let pat = format!("{}/*.fasta", dir.path().display());
        assert!(expand_inputs(&[pat]).is_empty());
        assert!(expand_inputs(&["/nonexistent/strain.fasta".to_string()]).is_empty());
    }

    #[test]
    fn test_tables_have_headers_and_one_row_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let tables = OutputTables::create(dir.path()).unwrap();
        tables.append(&na_result("s1.fasta")).unwrap();
        tables.append(&na_result("s2.fasta")).unwrap();

        for (name, cols) in [
            ("mlst_results.tsv", 4),
            ("serotype_results.tsv", 4),
            ("clermont_results.tsv", 3),
            ("ecolityper_summary.tsv", 7),
        ] {
            let text = fs::read_to_string(dir.path().join(name)).unwrap();
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 3, "{}: header + 2 rows", name);
            for line in &lines {
                assert_eq!(line.split('\t').count(), cols, "{}: {}", name, line);
            }
            assert!(lines[0].starts_with("sample\t"));
        }
    }

    #[test]
    fn test_concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let tables = OutputTables::create(dir.path()).unwrap();

        std::thread::scope(|s| {
            for i in 0..8 {
                let tables = &tables;
                s.spawn(move || {
                    for j in 0..25 {
                        tables.append(&na_result(&format!("s{}_{}.fasta", i, j))).unwrap();
                    }
                });
            }
        });

        let text = fs::read_to_string(dir.path().join("ecolityper_summary.tsv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 8 * 25);
        for line in &lines[1..] {
            assert_eq!(line.split('\t').count(), 7, "malformed row: {}", line);
            assert!(line.ends_with("\tNA\tNA\tNA\tNA\tNA\tNA"));
        }
    }
}
