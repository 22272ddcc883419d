use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::audit::{audit_directory, LedgerAudit};
use library::ledger::ledger_path;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = env::args()
        .nth(1)
        .or_else(|| env::var("MUSIC_ROOT").ok())
        .ok_or("MUSIC_ROOT not set and no path argument")?;
    let root = PathBuf::from(root);

    let mut dirs = Vec::new();
    if ledger_path(&root).is_file() {
        dirs.push(root.clone());
    }
    for entry in fs::read_dir(&root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut dirty = 0;
    for dir in &dirs {
        match audit_directory(dir) {
            Ok(audit) => {
                if !audit.is_clean() {
                    dirty += 1;
                }
                print_audit(dir, &audit);
            }
            Err(err) => warn!("Failed to audit {:?}: {}", dir, err),
        }
    }

    println!("Audited {} directories, {} with issues", dirs.len(), dirty);
    Ok(())
}

fn print_audit(dir: &Path, audit: &LedgerAudit) {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string());
    if audit.is_clean() {
        println!("{}: {} rows, ok", name, audit.rows);
        return;
    }
    println!("{}: {} rows", name, audit.rows);
    print_list("rows without file", &audit.orphan_rows);
    print_list("files without row", &audit.untracked_files);
    print_list("filenames in several rows", &audit.duplicate_filenames);
    let keys: Vec<String> = audit.duplicate_keys.iter().map(ToString::to_string).collect();
    print_list("songs in several rows", &keys);
    print_list("ambiguous numbered copies", &audit.ambiguous_variants);
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {} [{}]", label, items.len());
    for item in items {
        println!("    {}", item);
    }
}
