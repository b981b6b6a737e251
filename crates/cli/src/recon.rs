//! `iurecon` subcommands: run, validate, blocks.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use interunit_io::{load_grid, LoadError, LoadOptions};
use interunit_recon::cache::LedgerIndex;
use interunit_recon::model::{ReconResult, RowAnnotation};
use interunit_recon::{run_with, BlockCache, Grid, Ledger, PipelineOptions, ReconConfig};

use crate::exit_codes::{recon_exit_code, EXIT_RECON_RUNTIME, EXIT_RECON_UNMATCHED};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Match two ledgers per a TOML config file
    #[command(after_help = "\
Examples:
  iurecon run interunit.recon.toml
  iurecon run interunit.recon.toml --json
  iurecon run interunit.recon.toml --file1 a.xlsx --file2 b.xlsx --output result.json
  iurecon run interunit.recon.toml --annotations out/ --fail-on-unmatched")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// First ledger workbook (overrides `file1` in the config)
        #[arg(long)]
        file1: Option<PathBuf>,

        /// Second ledger workbook (overrides `file2` in the config)
        #[arg(long)]
        file2: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write per-row match annotations as CSV into this directory
        #[arg(long, value_name = "DIR")]
        annotations: Option<PathBuf>,

        /// Rebuild block indexes for every stage instead of caching them
        #[arg(long)]
        no_cache: bool,

        /// Exit 63 when resolvable blocks remain unmatched
        #[arg(long)]
        fail_on_unmatched: bool,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  iurecon validate interunit.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },

    /// List the transaction blocks found in one ledger workbook
    #[command(after_help = "\
Examples:
  iurecon blocks unit_a.xlsx
  iurecon blocks unit_a.xlsx --sheet Ledger --data-start-row 12")]
    Blocks {
        /// Ledger workbook
        file: PathBuf,

        /// Worksheet name (first sheet when omitted)
        #[arg(long)]
        sheet: Option<String>,

        /// 1-based sheet row where ledger data starts
        #[arg(long, default_value_t = 10)]
        data_start_row: usize,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, file1, file2, json, output, annotations, no_cache, fail_on_unmatched } => {
            cmd_recon_run(RunArgs { config, file1, file2, json, output, annotations, no_cache, fail_on_unmatched })
        }
        ReconCommands::Validate { config } => cmd_recon_validate(config),
        ReconCommands::Blocks { file, sheet, data_start_row } => cmd_blocks(file, sheet, data_start_row),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn load_err(path: &Path, err: LoadError) -> CliError {
    let e = recon_err(EXIT_RECON_RUNTIME, format!("cannot load {}: {err}", path.display()));
    match err {
        LoadError::SheetNotFound(_) => e.with_hint("set [layout] sheet in the config, or omit it to read the first sheet"),
        _ => e,
    }
}

fn read_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str).map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))
}

/// CLI override first, then the config entry resolved against the config's
/// directory.
fn ledger_path(
    flag: Option<PathBuf>,
    configured: Option<&str>,
    base_dir: &Path,
    which: &str,
) -> Result<PathBuf, CliError> {
    match (flag, configured) {
        (Some(path), _) => Ok(path),
        (None, Some(file)) => Ok(base_dir.join(file)),
        (None, None) => Err(CliError::args(format!("no {which} ledger given"))
            .with_hint(format!("set {which} in the config or pass --{which}"))),
    }
}

struct RunArgs {
    config: PathBuf,
    file1: Option<PathBuf>,
    file2: Option<PathBuf>,
    json: bool,
    output: Option<PathBuf>,
    annotations: Option<PathBuf>,
    no_cache: bool,
    fail_on_unmatched: bool,
}

fn cmd_recon_run(args: RunArgs) -> Result<(), CliError> {
    let config = read_config(&args.config)?;

    // Resolve file paths relative to config file's directory
    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let path1 = ledger_path(args.file1, config.file1.as_deref(), base_dir, "file1")?;
    let path2 = ledger_path(args.file2, config.file2.as_deref(), base_dir, "file2")?;

    let options = LoadOptions {
        sheet: config.layout.sheet.clone(),
        data_start_row: config.layout.data_start_row,
    };
    let grid1: Grid = load_grid(&path1, &options).map_err(|e| load_err(&path1, e))?;
    let grid2: Grid = load_grid(&path2, &options).map_err(|e| load_err(&path2, e))?;

    let id1 = path1.display().to_string();
    let id2 = path2.display().to_string();
    let mut cache = BlockCache::new();
    let result = run_with(
        &config,
        &mut cache,
        PipelineOptions { use_cache: !args.no_cache },
        Ledger::new(&id1, &grid1),
        Ledger::new(&id2, &grid2),
    )
    .map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))?;

    // Output
    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &json_str)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref dir) = args.annotations {
        write_annotations(dir, &result)?;
    }

    if args.json {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "recon '{}': {} matches ({} ids); file1 {} blocks, {} matched, {} unmatched, {} excluded; file2 {} blocks, {} matched, {} unmatched, {} excluded",
        result.meta.config_name,
        s.total_matches,
        s.distinct_ids,
        s.blocks_file1,
        s.matched_blocks_file1,
        s.unmatched_file1,
        s.excluded_file1,
        s.blocks_file2,
        s.matched_blocks_file2,
        s.unmatched_file2,
        s.excluded_file2,
    );
    for (kind, count) in &s.by_kind {
        eprintln!("  {kind}: {count}");
    }

    let unmatched = s.unmatched_file1 + s.unmatched_file2;
    if unmatched > 0 && (args.fail_on_unmatched || config.fail_on_unmatched) {
        return Err(recon_err(EXIT_RECON_UNMATCHED, format!("{unmatched} block(s) unmatched")));
    }

    Ok(())
}

/// One CSV per ledger: `file1.annotations.csv`, `file2.annotations.csv`.
fn write_annotations(dir: &Path, result: &ReconResult) -> Result<(), CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot create {}: {e}", dir.display())))?;

    for (name, rows) in [
        ("file1.annotations.csv", &result.annotations.file1),
        ("file2.annotations.csv", &result.annotations.file2),
    ] {
        let path = dir.join(name);
        write_annotation_csv(&path, rows)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn write_annotation_csv(path: &Path, rows: &[RowAnnotation]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["row", "match_id", "audit_info"])?;
    for row in rows {
        wtr.write_record([
            row.sheet_row.to_string().as_str(),
            row.match_id.as_deref().unwrap_or(""),
            row.audit_info.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let stages: Vec<String> = config.stages.ordered().iter().map(|k| k.to_string()).collect();
    eprintln!(
        "valid: recon '{}' with {} stage(s) [{}], {} bank account(s), data from row {}",
        config.name,
        stages.len(),
        stages.join(", "),
        config.bank_accounts.len(),
        config.layout.data_start_row,
    );
    Ok(())
}

fn cmd_blocks(file: PathBuf, sheet: Option<String>, data_start_row: usize) -> Result<(), CliError> {
    if data_start_row == 0 {
        return Err(CliError::args("--data-start-row must be at least 1"));
    }
    let options = LoadOptions { sheet, data_start_row };
    let grid = load_grid(&file, &options).map_err(|e| load_err(&file, e))?;

    let id = file.display().to_string();
    let layout = interunit_recon::Layout { data_start_row };
    let index = LedgerIndex::build(Ledger::new(&id, &grid), layout)
        .map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))?;

    println!("{:>6}  {:>6}  {:<8}  {:>16}  {:<12}  narration", "start", "end", "role", "amount", "voucher");
    for entry in &index.entries {
        let (role, amount) = match &entry.resolved {
            Ok(r) => (r.role.to_string(), r.amount.to_string()),
            Err(e) => ("-".to_string(), e.to_string()),
        };
        println!(
            "{:>6}  {:>6}  {:<8}  {:>16}  {:<12}  {}",
            layout.sheet_row(entry.block.start),
            layout.sheet_row(entry.block.end),
            role,
            amount,
            entry.voucher.as_deref().unwrap_or(""),
            entry.narration,
        );
    }
    eprintln!("{}: {} block(s)", id, index.len());
    Ok(())
}
