use crate::config;
use crate::events::EventSink;
use crate::model::{DriverEvent, ExportConfig, ExportFormat, Timings, TransferMode};
use crate::orchestrator::process::{AppLauncher, SystemLauncher};
use crate::orchestrator::{run_export, JOB_ID_ENV, TARGET_SCHEMA_ENV};
use crate::window::tool::ToolAdapter;
use crate::window::WindowAdapter;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
///
/// Each line is written and flushed on its own. No lock on the streams is held
/// between lines, since tracing writes to stderr concurrently.
fn spawn_output_writer<O, E>(
    mut out: O,
    mut err: E,
) -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
)
where
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                    let _ = out.flush();
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                    let _ = err.flush();
                }
            }
        }
    });
    (tx, handle)
}

/// Routes protocol events to the writer: failures to stderr, the rest to stdout.
struct StreamSink {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl EventSink for StreamSink {
    fn emit(&self, event: DriverEvent) {
        let line = match &event {
            DriverEvent::Failure { .. } => OutputLine::Stderr(event.to_line()),
            _ => OutputLine::Stdout(event.to_line()),
        };
        let _ = self.tx.send(line);
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "nesstar-export",
    version,
    about = "Export a Nesstar study to SAV or CSV by driving Nesstar Explorer"
)]
pub struct Cli {
    /// Input study file (.nesstar)
    #[arg(long)]
    pub study: PathBuf,

    /// Directory that receives the exported data files
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Nesstar Explorer executable [env: NESSTAR_CONVERTER_EXE, then default install paths]
    #[arg(long)]
    pub app_exe: Option<PathBuf>,

    /// Automation tool executable [env: NESSTAR_AUTOMATION_EXE]
    #[arg(long)]
    pub automation_exe: Option<PathBuf>,

    /// Automation script run by the tool [env: NESSTAR_CONVERTER_SCRIPT]
    #[arg(long)]
    pub automation_script: Option<PathBuf>,

    /// Directory the application saves into (defaults to the output directory)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Move staged files instead of copying them
    #[arg(long)]
    pub move_files: bool,

    /// Export format: SAV (or SPSS) and CSV; anything else means CSV
    #[arg(long, default_value = "CSV")]
    pub format: String,

    /// Per-step timeout; every stage deadline derives from it
    #[arg(long, default_value = "120s")]
    pub step_timeout: humantime::Duration,

    /// Launch-through-validate attempts before giving up
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Opaque job identifier echoed in logs and summaries
    #[arg(long)]
    pub job_id: Option<String>,

    /// Target schema hint passed through to the automation environment
    #[arg(long)]
    pub target_schema: Option<String>,

    /// Case-insensitive substring of the main window title
    #[arg(long, default_value = crate::model::DEFAULT_MAIN_WINDOW_TITLE)]
    pub main_window_title: String,

    /// Poll interval of every wait
    #[arg(long, default_value = "250ms")]
    pub poll_interval: humantime::Duration,

    /// How long output must stay unchanged to count as complete
    #[arg(long, default_value = "5s")]
    pub quiet_period: humantime::Duration,

    /// Ceiling for the output to settle (defaults to the step timeout)
    #[arg(long)]
    pub stability_timeout: Option<humantime::Duration>,

    /// Time the application gets to close before it is killed
    #[arg(long, default_value = "5s")]
    pub grace_period: humantime::Duration,

    /// Write a JSON run summary to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Ceiling for one call of the automation tool
    #[arg(long, default_value = "10s")]
    pub tool_timeout: humantime::Duration,
}

/// Build an `ExportConfig` from CLI arguments and the environment.
pub fn build_config(args: &Cli) -> ExportConfig {
    let step = Duration::from(args.step_timeout);
    let mut timings = Timings::from_step(step);
    timings.poll_interval = Duration::from(args.poll_interval);
    timings.quiet_period = Duration::from(args.quiet_period);
    timings.grace_period = Duration::from(args.grace_period);
    if let Some(t) = args.stability_timeout {
        timings.stability = Duration::from(t);
    }

    let mut cfg = ExportConfig::new(
        config::discover_app_exe(args.app_exe.as_deref()),
        args.study.clone(),
        args.output_dir.clone(),
        config::discover_automation_exe(args.automation_exe.as_deref()),
        config::discover_automation_script(args.automation_script.as_deref()),
    );
    if let Some(staging) = &args.staging_dir {
        cfg.staging_dir = staging.clone();
    }
    cfg.job_id = args.job_id.clone();
    cfg.target_schema = args.target_schema.clone();
    cfg.format = ExportFormat::parse(&args.format);
    cfg.transfer = if args.move_files {
        TransferMode::Move
    } else {
        TransferMode::Copy
    };
    cfg.max_attempts = args.max_attempts.max(1);
    cfg.main_window_title = args.main_window_title.clone();
    cfg.binary_min_bytes = config::binary_min_bytes_from_env();
    cfg.timings = timings;
    cfg
}

/// Diagnostics go to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run one export and return the process exit code.
pub async fn run(args: Cli) -> i32 {
    let cfg = build_config(&args);
    let mut adapter = ToolAdapter::new(cfg.automation_exe.clone(), cfg.automation_script.clone())
        .with_call_timeout(Duration::from(args.tool_timeout));
    if let Some(job) = &cfg.job_id {
        adapter = adapter.with_env(JOB_ID_ENV, job);
    }
    if let Some(schema) = &cfg.target_schema {
        adapter = adapter.with_env(TARGET_SCHEMA_ENV, schema);
    }

    execute(
        &cfg,
        &SystemLauncher,
        &adapter,
        args.summary_json.as_deref(),
        std::io::stdout(),
        std::io::stderr(),
    )
    .await
}

/// Drive one export, writing the line protocol to `out` and failures to `err`.
pub async fn execute<A, O, E>(
    cfg: &ExportConfig,
    launcher: &dyn AppLauncher,
    adapter: &A,
    summary_json: Option<&Path>,
    out: O,
    err: E,
) -> i32
where
    A: WindowAdapter + ?Sized,
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    let (out_tx, out_handle) = spawn_output_writer(out, err);
    let sink = StreamSink { tx: out_tx.clone() };

    let report = run_export(cfg, launcher, adapter, &sink).await;

    if let Some(p) = summary_json {
        let summary = crate::summary::RunSummary::from_report(cfg, &report);
        if let Err(e) = crate::summary::export_json(p, &summary) {
            let _ = out_tx.send(OutputLine::Stderr(format!("summary not written: {e:#}")));
        }
    }

    let code = report.exit_code();
    drop(sink);
    drop(out_tx);
    let _ = out_handle.await;
    code
}
