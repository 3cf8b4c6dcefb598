use crate::error::{ExportError, FailureCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum size of a binary (SAV) data file: strictly more than 1 MiB.
pub const DEFAULT_BINARY_MIN_BYTES: u64 = 1024 * 1024 + 1;
/// Minimum size of a textual (CSV) data file.
pub const TEXT_MIN_BYTES: u64 = 1024;
pub const DEFAULT_MAIN_WINDOW_TITLE: &str = "Nesstar Explorer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub app_exe: PathBuf,
    pub study_path: PathBuf,
    pub output_dir: PathBuf,
    /// Where the application is told to save; equals `output_dir` unless overridden.
    pub staging_dir: PathBuf,
    pub automation_exe: PathBuf,
    pub automation_script: PathBuf,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub target_schema: Option<String>,
    pub format: ExportFormat,
    pub transfer: TransferMode,
    pub max_attempts: u32,
    /// Case-insensitive substring of the application's main window title.
    pub main_window_title: String,
    pub binary_min_bytes: u64,
    pub timings: Timings,
}

impl ExportConfig {
    /// Defaults for everything but the paths: CSV, copy, three attempts,
    /// staging directly into `output_dir`.
    pub fn new(
        app_exe: PathBuf,
        study_path: PathBuf,
        output_dir: PathBuf,
        automation_exe: PathBuf,
        automation_script: PathBuf,
    ) -> Self {
        Self {
            app_exe,
            study_path,
            staging_dir: output_dir.clone(),
            output_dir,
            automation_exe,
            automation_script,
            job_id: None,
            target_schema: None,
            format: ExportFormat::Csv,
            transfer: TransferMode::Copy,
            max_attempts: 3,
            main_window_title: DEFAULT_MAIN_WINDOW_TITLE.to_string(),
            binary_min_bytes: DEFAULT_BINARY_MIN_BYTES,
            timings: Timings::default(),
        }
    }

    /// Path typed into the save dialog: `<staging>/<study stem>.<ext>`.
    pub fn export_target(&self) -> PathBuf {
        let stem = self
            .study_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export");
        self.staging_dir
            .join(format!("{stem}.{}", self.format.extension()))
    }

    pub fn data_pattern(&self) -> FilePattern {
        FilePattern::extension(self.format.extension())
    }

    /// Per-file minimum for the configured format.
    pub fn min_data_bytes(&self) -> u64 {
        match self.format {
            ExportFormat::Sav => self.binary_min_bytes,
            ExportFormat::Csv => TEXT_MIN_BYTES,
        }
    }

    pub fn job_label(&self) -> &str {
        self.job_id.as_deref().unwrap_or("-")
    }
}

/// Every wait of a run: one poll interval and a deadline per stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timings {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Total wait for the main window.
    #[serde(with = "humantime_serde")]
    pub main_window: Duration,
    /// Focus confirmation per candidate window.
    #[serde(with = "humantime_serde")]
    pub activation: Duration,
    pub open_study_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub open_study: Duration,
    /// Wait for the save target dialog after triggering export.
    #[serde(with = "humantime_serde")]
    pub save_step: Duration,
    /// Hard ceiling for the save dialog to close.
    #[serde(with = "humantime_serde")]
    pub save_close: Duration,
    /// Re-apply path and save when nothing happened for this long.
    #[serde(with = "humantime_serde")]
    pub save_reissue: Duration,
    pub wizard_substeps: u32,
    #[serde(with = "humantime_serde")]
    pub quiet_period: Duration,
    #[serde(with = "humantime_serde")]
    pub stability: Duration,
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Timings {
    /// Derive every stage deadline from the per-step timeout.
    pub fn from_step(step: Duration) -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            main_window: step,
            activation: Duration::from_secs(2),
            open_study_attempts: 3,
            open_study: step.min(Duration::from_secs(15)),
            save_step: step,
            save_close: step,
            save_reissue: Duration::from_millis(1500),
            wizard_substeps: 5,
            quiet_period: Duration::from_secs(5),
            stability: step,
            grace_period: Duration::from_secs(5),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_step(Duration::from_secs(120))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Sav,
    Csv,
}

impl ExportFormat {
    /// Anything but SAV/SPSS falls back to CSV.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_uppercase().as_str() {
            "SAV" | "SPSS" => ExportFormat::Sav,
            _ => ExportFormat::Csv,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Sav => "SAV",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Sav => "sav",
            ExportFormat::Csv => "csv",
        }
    }

    /// Accelerator chord that picks this format in the export dialog.
    pub fn selection_keys(self) -> &'static str {
        match self {
            ExportFormat::Sav => "!s",
            ExportFormat::Csv => "!c",
        }
    }
}

/// Normalized format name for a free-form request.
pub fn normalize_format(input: &str) -> &'static str {
    ExportFormat::parse(input).as_str()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Name filter for files in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    extension: String,
}

impl FilePattern {
    pub fn extension(ext: &str) -> Self {
        Self {
            extension: ext.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

/// Stage markers on the stdout event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Started,
    ExportDialogOpened,
    ConfirmingExportOptions,
    SavingDatasets,
    ValidatingExportedFiles,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Started => "STARTED",
            Stage::ExportDialogOpened => "EXPORT_DIALOG_OPENED",
            Stage::ConfirmingExportOptions => "CONFIRMING_EXPORT_OPTIONS",
            Stage::SavingDatasets => "SAVING_DATASETS",
            Stage::ValidatingExportedFiles => "VALIDATING_EXPORTED_FILES",
        }
    }
}

pub const SUCCESS_MARKER: &str = "NESSTAR_REAL_EXPORT_SUCCESS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Log(String),
    Stage(Stage),
    Success,
    Failure { code: FailureCode, message: String },
}

impl DriverEvent {
    /// Render the protocol line for this event.
    pub fn to_line(&self) -> String {
        match self {
            DriverEvent::Log(msg) => format!("LOG {msg}"),
            DriverEvent::Stage(stage) => format!("STAGE {}", stage.as_str()),
            DriverEvent::Success => SUCCESS_MARKER.to_string(),
            DriverEvent::Failure { code, message } => {
                format!("ERROR [{}] {message}", code.exit_code())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success,
    RecoverableFailure(FailureCode),
    FatalFailure(FailureCode),
}

impl AttemptOutcome {
    pub fn from_error(err: &ExportError) -> Self {
        if err.is_recoverable() {
            AttemptOutcome::RecoverableFailure(err.code())
        } else {
            AttemptOutcome::FatalFailure(err.code())
        }
    }
}

/// One launch-through-validate cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub index: u32,
    pub started_at: String,
    pub outcome: Option<AttemptOutcome>,
}

impl Attempt {
    pub fn start(index: u32) -> Self {
        Self {
            index,
            started_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            outcome: None,
        }
    }
}
