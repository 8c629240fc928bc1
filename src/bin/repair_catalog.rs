//! Normalize block ids and reading order of existing catalogs.
//!
//! Usage:
//!   repair_catalog                          # every document under data/cache
//!   repair_catalog --document 3f2a9c01      # one document
//!   repair_catalog --check-only             # report, change nothing
//!   repair_catalog --no-backup

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pdf_catalog::catalog::repair::document_catalogs;
use pdf_catalog::catalog::{Catalog, CatalogRepairer, DocumentPaths};
use pdf_catalog::Result;

/// Normalize block ids and reading order of existing catalogs
#[derive(Parser, Debug)]
#[command(name = "repair_catalog")]
#[command(version, about, long_about = None)]
struct Args {
    /// Cache directory holding one directory per document
    #[arg(long, default_value = "data/cache")]
    cache_dir: PathBuf,

    /// Only this document id
    #[arg(short, long)]
    document: Option<String>,

    /// Report id status without modifying anything
    #[arg(long)]
    check_only: bool,

    /// Do not write content.backup_*.json before modifying a catalog
    #[arg(long)]
    no_backup: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn targets(args: &Args) -> Result<Vec<(String, PathBuf)>> {
    match &args.document {
        Some(id) => Ok(vec![(id.clone(), DocumentPaths::new(&args.cache_dir, id).content_json())]),
        None => document_catalogs(&args.cache_dir),
    }
}

fn check(repairer: &CatalogRepairer, targets: &[(String, PathBuf)]) -> Result<bool> {
    let mut pending = 0;
    for (id, path) in targets {
        let catalog = Catalog::from_json(&std::fs::read_to_string(path)?)?;
        let report = repairer.check(&catalog);
        println!(
            "{}: {} blocks (block_={} det_={} mrg_={} other={}) {}",
            id,
            report.total_blocks,
            report.block_ids,
            report.det_ids,
            report.mrg_ids,
            report.other_ids,
            if report.normalized { "normalized" } else { "NEEDS REPAIR" }
        );
        if !report.normalized {
            pending += 1;
        }
    }
    println!("{} of {} catalogs need repair", pending, targets.len());
    Ok(true)
}

fn repair(repairer: &CatalogRepairer, targets: &[(String, PathBuf)]) -> bool {
    let (mut repaired, mut unchanged, mut errors) = (0, 0, 0);
    for (id, path) in targets {
        match repairer.repair_file(path) {
            Ok(outcome) if outcome.changed => {
                println!(
                    "{}: renamed {} ids, rebuilt {} page orders",
                    id,
                    outcome.id_mapping.len(),
                    outcome.rebuilt_pages.len()
                );
                repaired += 1;
            },
            Ok(_) => unchanged += 1,
            Err(e) => {
                eprintln!("{}: {}", id, e);
                errors += 1;
            },
        }
    }
    println!(
        "total={} repaired={} already_normalized={} errors={}",
        targets.len(),
        repaired,
        unchanged,
        errors
    );
    errors == 0
}

fn run(args: &Args) -> Result<bool> {
    let repairer = CatalogRepairer::new().with_backup(!args.no_backup);
    let targets = targets(args)?;
    if targets.is_empty() {
        println!("no catalogs under {}", args.cache_dir.display());
        return Ok(true);
    }
    if args.check_only {
        check(&repairer, &targets)
    } else {
        Ok(repair(&repairer, &targets))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        },
    }
}
