use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::report::PairResult;

pub const DEFAULT_LOG_DIR: &str = ".textrename";
const LOG_FILE: &str = "rename_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameLogEntry {
    pub timestamp: String,
    pub directory: String,
    pub original: String,
    pub desired: String,
    pub action: String,
}

/// Append-only JSON-lines record of attempted renames.
#[derive(Debug, Clone)]
pub struct RenameLog {
    dir: PathBuf,
}

impl RenameLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn record(&self, directory: &Path, result: &PairResult) -> Result<()> {
        let log_path = self.ensure_log_file()?;
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".into());
        let entry = RenameLogEntry {
            timestamp,
            directory: directory.display().to_string(),
            original: result.pair.original.clone(),
            desired: result.pair.desired.clone(),
            action: result.outcome.label().to_string(),
        };
        let json = serde_json::to_string(&entry)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .with_context(|| format!("opening {log_path:?}"))?;
        writeln!(file, "{json}")?;
        truncate_log(&log_path)?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<RenameLogEntry>> {
        let lines = read_lines(&self.path())?;
        // Skip lines a crashed writer may have left half-written.
        Ok(lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn read_recent(&self, tail: usize) -> Result<Vec<RenameLogEntry>> {
        let mut entries = self.read_all()?;
        let start = entries.len().saturating_sub(tail);
        Ok(entries.split_off(start))
    }

    fn ensure_log_file(&self) -> Result<PathBuf> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).with_context(|| format!("creating {:?}", self.dir))?;
        }
        Ok(self.path())
    }
}

/// Lines of the log file; empty when it does not exist yet.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("reading {path:?}")),
    };
    BufReader::new(file)
        .lines()
        .collect::<Result<Vec<String>, _>>()
        .with_context(|| format!("reading {path:?}"))
}

/// Keeps only the newest `MAX_ENTRIES` records.
fn truncate_log(path: &Path) -> Result<()> {
    let lines = read_lines(path)?;
    let Some(excess) = lines.len().checked_sub(MAX_ENTRIES).filter(|n| *n > 0) else {
        return Ok(());
    };
    let mut kept = lines[excess..].join("\n");
    kept.push('\n');
    fs::write(path, kept).with_context(|| format!("rewriting {path:?}"))
}
