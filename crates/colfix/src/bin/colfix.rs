//! colfix launcher: generate fixture suites, or replay written suites against
//! the oracle.
//!
//! # Subcommands
//!
//! - `generate <suite|all>`: write datasets, scripts, expected outputs and
//!   `manifest.json` into the dataset directory.
//! - `verify <suite|all>`: replay the written scripts on a fresh oracle and
//!   compare against the written expected outputs; optionally check an
//!   engine's persisted catalog afterwards.

use std::ffi::OsString;
use std::io::{self, Write as _};
use std::path::PathBuf;

use colfix::catalog::verify_persisted;
use colfix::config::{GeneratorConfig, SuiteSizes};
use colfix::orchestrator::Orchestrator;
use colfix::replay::replay_suites;
use colfix::suites::Suite;
use colfix_error::{ColfixError, Result};

// ── CLI Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Generate,
    Verify,
}

#[derive(Debug, Default)]
struct Overrides {
    config_file: Option<PathBuf>,
    seed: Option<u64>,
    size: Option<usize>,
    dataset_dir: Option<PathBuf>,
    engine_prefix: Option<String>,
    catalog_dir: Option<PathBuf>,
    json: bool,
}

#[derive(Debug, serde::Serialize)]
struct VerifySummary<'a> {
    suites: Vec<&'a str>,
    scenarios: usize,
    catalog_checked: bool,
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() {
    let exit_code = run_cli(std::env::args_os());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run_cli<I>(os_args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let raw: Vec<String> = os_args
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let tail = if raw.len() > 1 { &raw[1..] } else { &[] };

    if tail.is_empty() || tail.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return 0;
    }

    match parse_args(tail).and_then(|(command, suites, overrides)| {
        let config = build_config(&overrides)?;
        match command {
            Command::Generate => cmd_generate(config, &suites, &overrides),
            Command::Verify => cmd_verify(&config, &suites, &overrides),
        }
    }) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(hint) = err.suggestion() {
                eprintln!("hint: {hint}");
            }
            err.exit_code()
        }
    }
}

fn parse_args(tail: &[String]) -> Result<(Command, Vec<Suite>, Overrides)> {
    let mut overrides = Overrides::default();
    let mut positional = Vec::new();
    let mut args = tail.iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .cloned()
                .ok_or_else(|| ColfixError::config(flag, "missing value"))
        };
        match arg.as_str() {
            "--json" => overrides.json = true,
            "--config" => overrides.config_file = Some(PathBuf::from(value("--config")?)),
            "--dataset-dir" => overrides.dataset_dir = Some(PathBuf::from(value("--dataset-dir")?)),
            "--engine-prefix" => overrides.engine_prefix = Some(value("--engine-prefix")?),
            "--catalog" => overrides.catalog_dir = Some(PathBuf::from(value("--catalog")?)),
            "--seed" => overrides.seed = Some(parse_number("--seed", &value("--seed")?)?),
            "--size" => overrides.size = Some(parse_number("--size", &value("--size")?)?),
            flag if flag.starts_with("--") => {
                return Err(ColfixError::config(flag, "unknown option"));
            }
            _ => positional.push(arg.as_str()),
        }
    }

    let command = match positional.first() {
        Some(&"generate") => Command::Generate,
        Some(&"verify") => Command::Verify,
        Some(other) => return Err(ColfixError::config("subcommand", format!("unknown: {other}"))),
        None => return Err(ColfixError::config("subcommand", "none specified")),
    };
    let selection = match positional.as_slice() {
        [_, suites] => suites,
        [_] => return Err(ColfixError::config("suite", "expected a suite name or `all`")),
        _ => return Err(ColfixError::config("suite", "expected exactly one suite selection")),
    };
    Ok((command, Suite::parse_selection(selection)?, overrides))
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ColfixError::config(flag, format!("{raw:?}: {e}")))
}

/// Config file, then environment, then flags.
fn build_config(overrides: &Overrides) -> Result<GeneratorConfig> {
    let mut config = match &overrides.config_file {
        Some(path) => GeneratorConfig::from_json_file(path)?,
        None => GeneratorConfig::default(),
    };
    config.apply_env()?;
    if let Some(seed) = overrides.seed {
        config.seed = seed;
    }
    if let Some(rows) = overrides.size {
        config.sizes = SuiteSizes::uniform(rows);
    }
    if let Some(dir) = &overrides.dataset_dir {
        config.dataset_dir.clone_from(dir);
    }
    if let Some(prefix) = &overrides.engine_prefix {
        config.engine_path_prefix.clone_from(prefix);
    }
    config.validate()?;
    Ok(config)
}

fn print_help() {
    let text = "\
colfix: column-store fixture generator and reference oracle

USAGE:
    colfix [OPTIONS] generate <SUITE|all>
    colfix [OPTIONS] verify <SUITE|all>

SUITES:
    scan      check-in table, scans, sums, arithmetic (tests 1-9)
    batch     batched and single-core query groups (tests 10-19)
    index     clustered and unclustered indexes (tests 20-44)
    join      joins over Zipf-keyed fact and dimension tables (tests 45-59)
    update    inserts, updates, deletes (tests 60-65)

OPTIONS:
    --config <FILE>         JSON generator config
    --seed <N>              Run seed (overrides COLFIX_SEED)
    --size <ROWS>           Every suite table at ROWS rows
    --dataset-dir <DIR>     Where artifacts are written and read
    --engine-prefix <DIR>   Directory the engine sees datasets under
    --catalog <DIR>         verify: also check a persisted engine catalog
    --json                  Print the manifest or summary as JSON
    -h, --help              Show this help message
";
    let _ = io::stdout().write_all(text.as_bytes());
}

// ── Subcommands ──────────────────────────────────────────────────────────

fn cmd_generate(config: GeneratorConfig, suites: &[Suite], overrides: &Overrides) -> Result<()> {
    let manifest = Orchestrator::new(config).generate(suites)?;
    if overrides.json {
        println!("{}", manifest.to_pretty_json()?);
    } else {
        for record in &manifest.suites {
            println!(
                "{:<8} seed {:>20}  {} files",
                record.suite.as_str(),
                record.seed,
                record.artifacts.len()
            );
        }
        println!(
            "generated {} scenarios, {} files",
            manifest.scenario_count(),
            manifest.artifacts().count()
        );
    }
    Ok(())
}

fn cmd_verify(config: &GeneratorConfig, suites: &[Suite], overrides: &Overrides) -> Result<()> {
    let report = replay_suites(config, suites)?;
    let catalog_checked = match &overrides.catalog_dir {
        Some(dir) => {
            let db = report
                .database
                .as_ref()
                .ok_or_else(|| ColfixError::invariant("replay ended without a database"))?;
            verify_persisted(db, dir)?;
            true
        }
        None => false,
    };
    let summary = VerifySummary {
        suites: report.suites.iter().map(|s| s.as_str()).collect(),
        scenarios: report.scenarios,
        catalog_checked,
    };
    if overrides.json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| ColfixError::format("json", e))?;
        println!("{text}");
    } else {
        println!(
            "verified {} scenarios ({}){}",
            summary.scenarios,
            summary.suites.join(", "),
            if catalog_checked { ", catalog matches" } else { "" }
        );
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────
