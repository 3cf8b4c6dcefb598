//! Resolution of external tool locations and preflight checks.
//!
//! Explicit arguments win, then environment overrides that point at an existing
//! file, then fixed install locations.

use crate::error::ExportError;
use crate::model::{ExportConfig, DEFAULT_BINARY_MIN_BYTES};
use std::path::{Path, PathBuf};

pub const APP_EXE_ENV: &str = "NESSTAR_CONVERTER_EXE";
pub const AUTOMATION_EXE_ENV: &str = "NESSTAR_AUTOMATION_EXE";
pub const AUTOMATION_SCRIPT_ENV: &str = "NESSTAR_CONVERTER_SCRIPT";
pub const MIN_SAV_BYTES_ENV: &str = "NESSTAR_MIN_SAV_BYTES";

const APP_EXE_NAME: &str = "NesstarExplorer.exe";
const AUTOMATION_EXE_NAME: &str = "AutoIt3.exe";
const SCRIPT_NAME: &str = "nesstar_export.au3";

/// Pick a tool path from an explicit argument, an environment value, or the
/// first existing default.
///
/// An environment value that does not exist falls through to the defaults.
/// When nothing exists the most specific candidate is returned so preflight can
/// name it.
pub fn resolve_tool(
    explicit: Option<&Path>,
    env_value: Option<&str>,
    defaults: &[PathBuf],
) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let env_path = env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    if let Some(p) = env_path.as_ref().filter(|p| p.is_file()) {
        return p.clone();
    }
    if let Some(p) = defaults.iter().find(|p| p.is_file()) {
        return p.clone();
    }
    env_path
        .or_else(|| defaults.first().cloned())
        .unwrap_or_default()
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn program_files() -> Vec<PathBuf> {
    let mut roots = vec![
        PathBuf::from(r"C:\Program Files (x86)"),
        PathBuf::from(r"C:\Program Files"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        roots.push(local.join("Programs"));
    }
    roots
}

pub fn default_app_paths() -> Vec<PathBuf> {
    program_files()
        .into_iter()
        .flat_map(|root| {
            [
                root.join("Nesstar").join("Nesstar Explorer").join(APP_EXE_NAME),
                root.join("Nesstar Explorer").join(APP_EXE_NAME),
            ]
        })
        .collect()
}

pub fn default_automation_exe_paths() -> Vec<PathBuf> {
    program_files()
        .into_iter()
        .map(|root| root.join("AutoIt3").join(AUTOMATION_EXE_NAME))
        .collect()
}

pub fn default_script_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(SCRIPT_NAME));
    }
    if let Some(data) = dirs::data_dir() {
        paths.push(data.join("nesstar-export").join(SCRIPT_NAME));
    }
    paths
}

/// Locate Nesstar Explorer.
pub fn discover_app_exe(explicit: Option<&Path>) -> PathBuf {
    resolve_tool(explicit, env_value(APP_EXE_ENV).as_deref(), &default_app_paths())
}

pub fn discover_automation_exe(explicit: Option<&Path>) -> PathBuf {
    resolve_tool(
        explicit,
        env_value(AUTOMATION_EXE_ENV).as_deref(),
        &default_automation_exe_paths(),
    )
}

pub fn discover_automation_script(explicit: Option<&Path>) -> PathBuf {
    resolve_tool(
        explicit,
        env_value(AUTOMATION_SCRIPT_ENV).as_deref(),
        &default_script_paths(),
    )
}

/// Parse a SAV size override; unset, empty or malformed means the default.
pub fn parse_min_bytes(value: Option<&str>) -> u64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => match v.parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(value = v, "ignoring malformed {MIN_SAV_BYTES_ENV}");
                DEFAULT_BINARY_MIN_BYTES
            }
        },
        None => DEFAULT_BINARY_MIN_BYTES,
    }
}

pub fn binary_min_bytes_from_env() -> u64 {
    parse_min_bytes(env_value(MIN_SAV_BYTES_ENV).as_deref())
}

/// Fail fast on anything that would doom every attempt.
pub fn preflight(cfg: &ExportConfig) -> Result<(), ExportError> {
    if !cfg.app_exe.is_file() {
        return Err(ExportError::MissingExecutable(cfg.app_exe.clone()));
    }
    if !cfg.study_path.is_file() {
        return Err(ExportError::MissingStudy(cfg.study_path.clone()));
    }
    if !cfg.automation_exe.is_file() {
        return Err(ExportError::MissingAutomationExecutable(
            cfg.automation_exe.clone(),
        ));
    }
    if !cfg.automation_script.is_file() {
        return Err(ExportError::MissingAutomationScript(
            cfg.automation_script.clone(),
        ));
    }
    ensure_writable(&cfg.output_dir)?;
    if cfg.staging_dir != cfg.output_dir {
        ensure_writable(&cfg.staging_dir)?;
    }
    Ok(())
}

/// Create `dir` if needed and prove a file can be written into it.
fn ensure_writable(dir: &Path) -> Result<(), ExportError> {
    let not_writable = |source| ExportError::DestinationNotWritable {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(not_writable)?;
    let marker = dir.join(format!(".nesstar-export-write-test-{}", std::process::id()));
    std::fs::write(&marker, b"").map_err(not_writable)?;
    let _ = std::fs::remove_file(&marker);
    Ok(())
}
