use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<RenameJob>,
}

/// One directory and its two name lists, given inline or by file.
#[derive(Debug, Deserialize)]
pub struct RenameJob {
    pub directory: PathBuf,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before_file: Option<PathBuf>,
    #[serde(default)]
    pub after_file: Option<PathBuf>,
    pub apply: Option<bool>,
}

impl RenameJob {
    pub fn directory_in(&self, base: &Path) -> PathBuf {
        base.join(&self.directory)
    }

    /// Returns the (before, after) list texts. Relative paths are taken from `base`.
    pub fn load_lists(&self, base: &Path) -> Result<(String, String)> {
        let before = load_list("before", &self.before, &self.before_file, base)?;
        let after = load_list("after", &self.after, &self.after_file, base)?;
        Ok((before, after))
    }
}

fn load_list(
    label: &str,
    inline: &Option<String>,
    file: &Option<PathBuf>,
    base: &Path,
) -> Result<String> {
    match (inline, file) {
        (Some(text), None) => Ok(text.clone()),
        (None, Some(path)) => {
            let path = base.join(path);
            fs::read_to_string(&path)
                .with_context(|| format!("reading {label} list {}", path.display()))
        }
        (Some(_), Some(_)) => bail!("job sets both `{label}` and `{label}_file`"),
        (None, None) => bail!("job is missing `{label}` or `{label}_file`"),
    }
}

pub fn load_jobs(path: &Path) -> Result<JobFile> {
    let data = fs::read(path).with_context(|| format!("reading job file {}", path.display()))?;
    if path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        Ok(serde_json::from_slice(&data)?)
    } else {
        Ok(serde_yaml::from_slice(&data)?)
    }
}
