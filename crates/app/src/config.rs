use anyhow::{Context, Result};
use billcal_core::DEFAULT_HORIZON_MONTHS;
use billcal_import::{SourceKind, DEFAULT_PREVIEW_ROWS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "BILLCAL_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How far ahead occurrences are generated.
    pub horizon_months: u32,
    /// Rows shown by an import preview.
    pub preview_rows: usize,
    pub default_source: SourceKind,
    pub snooze_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            horizon_months: DEFAULT_HORIZON_MONTHS,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            default_source: SourceKind::CommBank,
            snooze_days: 3,
        }
    }
}

/// `--data-dir`, then `$BILLCAL_DATA_DIR`, then the platform data directory.
pub fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let project_dirs = directories::ProjectDirs::from("com", "billcal", "Billcal")
        .context("no home directory to place app data in")?;
    Ok(project_dirs.data_dir().to_path_buf())
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

pub fn load_config(data_dir: &Path) -> Result<Config> {
    let p = config_path(data_dir);
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(data_dir: &Path, cfg: &Config) -> Result<()> {
    let p = config_path(data_dir);
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config(data_dir: &Path) -> Result<()> {
    let p = config_path(data_dir);
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(data_dir, &Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn init_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path()).unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.horizon_months, 12);
        assert_eq!(cfg.preview_rows, 50);
        assert_eq!(cfg.default_source, SourceKind::CommBank);
        assert_eq!(cfg.snooze_days, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(config_path(dir.path()), "horizon_months = 6\ndefault_source = \"anz\"\n").unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.horizon_months, 6);
        assert_eq!(cfg.default_source, SourceKind::Anz);
        assert_eq!(cfg.preview_rows, 50);
    }

    #[test]
    fn bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(config_path(dir.path()), "horizon_months = \"soon\"").unwrap();
        assert!(load_config(dir.path()).is_err());
    }

    #[test]
    fn flag_wins_over_environment() {
        let dir = PathBuf::from("/tmp/explicit");
        assert_eq!(resolve_data_dir(Some(dir.clone())).unwrap(), dir);
    }
}
