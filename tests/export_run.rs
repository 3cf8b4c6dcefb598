use nesstar_export::events::MemorySink;
use nesstar_export::model::{
    DriverEvent, ExportConfig, ExportFormat, Stage, Timings, TransferMode, SUCCESS_MARKER,
};
use nesstar_export::orchestrator::process::fake::FakeLauncher;
use nesstar_export::orchestrator::run_export;
use nesstar_export::window::fake::{Action, Effect, FakeDesktop, FakeWindow, Trigger};
use nesstar_export::window::keys;
use std::fs;
use std::path::Path;
use std::time::Duration;

const MAIN: &str = "Nesstar Explorer - Labour Force";

/// Existing tools and study under `root`, output into `root/out`.
fn ready_config(root: &Path) -> ExportConfig {
    for name in ["NesstarExplorer.exe", "lfs.nesstar", "AutoIt3.exe", "export.au3"] {
        fs::write(root.join(name), b"").unwrap();
    }
    let mut cfg = ExportConfig::new(
        root.join("NesstarExplorer.exe"),
        root.join("lfs.nesstar"),
        root.join("out"),
        root.join("AutoIt3.exe"),
        root.join("export.au3"),
    );
    cfg.timings = Timings::from_step(Duration::from_secs(5));
    cfg.timings.quiet_period = Duration::from_secs(1);
    cfg
}

/// Main window whose open-file dialog accepts every submission.
fn desktop_with_study() -> FakeDesktop {
    let desktop = FakeDesktop::new();
    desktop.open(FakeWindow::main(MAIN));
    desktop.on(
        MAIN,
        Trigger::keys(keys::OPEN),
        vec![Effect::Open(
            FakeWindow::dialog("Open").text_entry().button("&Open").button("Cancel"),
        )],
    );
    desktop.on("Open", Trigger::keys(keys::CONFIRM), vec![Effect::CloseSelf]);
    desktop
}

fn save_as() -> FakeWindow {
    FakeWindow::dialog("Save As").text_entry().button("&Save").button("Cancel")
}

#[tokio::test(start_paused = true)]
async fn prepopulated_output_without_application_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = ready_config(root.path());
    cfg.format = ExportFormat::Sav;
    cfg.max_attempts = 3;
    fs::create_dir_all(&cfg.output_dir).unwrap();
    fs::write(cfg.output_dir.join("lfs_person.sav"), vec![0u8; 2 * 1024 * 1024]).unwrap();
    fs::write(cfg.output_dir.join("lfs_household.sav"), vec![0u8; 3 * 1024 * 1024]).unwrap();

    let desktop = FakeDesktop::new();
    let launcher = FakeLauncher::new();
    let sink = MemorySink::new();
    let report = run_export(&cfg, &launcher, &desktop, &sink).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(launcher.launches(), 1);
    assert_eq!(
        sink.stages(),
        vec![
            Stage::Started,
            Stage::ExportDialogOpened,
            Stage::ValidatingExportedFiles
        ]
    );
    let lines = sink.lines();
    assert_eq!(lines.last().map(String::as_str), Some(SUCCESS_MARKER));
    assert!(lines[..lines.len() - 1]
        .iter()
        .any(|l| l == "LOG Attempts: 1 of 3"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("LOG Output: 2 file(s)")));
    assert_eq!(report.result.unwrap().files.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unwritable_destination_fails_before_launch() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = ready_config(root.path());
    let blocker = root.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();
    cfg.output_dir = blocker.join("out");
    cfg.staging_dir = cfg.output_dir.clone();

    let desktop = FakeDesktop::new();
    let launcher = FakeLauncher::new();
    let sink = MemorySink::new();
    let report = run_export(&cfg, &launcher, &desktop, &sink).await;

    assert_eq!(report.exit_code(), 14);
    assert_eq!(launcher.launches(), 0);
    assert!(report.attempts.is_empty());
    assert!(sink.lines().iter().any(|l| l.starts_with("ERROR [14]")));
    assert!(!sink.events().contains(&DriverEvent::Success));
}

#[tokio::test(start_paused = true)]
async fn missing_application_is_reported_with_its_code() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = ready_config(root.path());
    cfg.app_exe = root.path().join("nowhere").join("NesstarExplorer.exe");

    let launcher = FakeLauncher::new();
    let report = run_export(&cfg, &launcher, &FakeDesktop::new(), &MemorySink::new()).await;
    assert_eq!(report.exit_code(), 10);
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn scripted_dialog_flow_exports_and_moves_files() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = ready_config(root.path());
    cfg.staging_dir = root.path().join("stage");
    cfg.transfer = TransferMode::Move;
    let target = cfg.export_target();

    let desktop = desktop_with_study();
    desktop.on(
        MAIN,
        Trigger::keys(keys::EXPORT),
        vec![Effect::Open(FakeWindow::dialog("Export").button("OK").button("Cancel"))],
    );
    desktop.on(
        "Export",
        Trigger::invoke("ok"),
        vec![Effect::CloseSelf, Effect::Open(save_as())],
    );
    desktop.on(
        "Save As",
        Trigger::invoke("save"),
        vec![
            Effect::CloseSelf,
            Effect::WriteFile {
                path: target.clone(),
                len: 4096,
            },
        ],
    );

    let launcher = FakeLauncher::new();
    let sink = MemorySink::new();
    let report = run_export(&cfg, &launcher, &desktop, &sink).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        sink.stages(),
        vec![
            Stage::Started,
            Stage::ExportDialogOpened,
            Stage::ConfirmingExportOptions,
            Stage::SavingDatasets,
            Stage::ValidatingExportedFiles,
        ]
    );
    assert!(cfg.output_dir.join("lfs.csv").exists());
    assert!(!target.exists());
    // Teardown asked the application to close.
    assert_eq!(desktop.count(MAIN, &Action::Keys(keys::CLOSE.into())), 1);
    assert_eq!(launcher.kills(), 0);
}

#[tokio::test(start_paused = true)]
async fn lost_export_command_is_retried_with_a_fresh_attempt() {
    let root = tempfile::tempdir().unwrap();
    let cfg = ready_config(root.path());
    let target = cfg.export_target();

    let desktop = desktop_with_study();
    desktop.on_after(
        MAIN,
        Trigger::keys(keys::EXPORT),
        1,
        vec![Effect::Open(save_as())],
    );
    desktop.on(
        "Save As",
        Trigger::invoke("save"),
        vec![
            Effect::CloseSelf,
            Effect::WriteFile {
                path: target,
                len: 2048,
            },
        ],
    );

    let launcher = FakeLauncher::new();
    let sink = MemorySink::new();
    let report = run_export(&cfg, &launcher, &desktop, &sink).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(sink.stage_count(Stage::ExportDialogOpened), 2);
    assert_eq!(sink.stage_count(Stage::Started), 1);
}

#[tokio::test(start_paused = true)]
async fn undersized_output_fails_validation_after_all_attempts() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = ready_config(root.path());
    cfg.max_attempts = 2;
    let target = cfg.export_target();

    let desktop = desktop_with_study();
    desktop.on(MAIN, Trigger::keys(keys::EXPORT), vec![Effect::Open(save_as())]);
    desktop.on(
        "Save As",
        Trigger::invoke("save"),
        vec![
            Effect::CloseSelf,
            Effect::WriteFile {
                path: target,
                len: 100,
            },
        ],
    );

    let launcher = FakeLauncher::new();
    let sink = MemorySink::new();
    let report = run_export(&cfg, &launcher, &desktop, &sink).await;

    assert_eq!(report.exit_code(), 17);
    assert_eq!(launcher.launches(), 2);
    // The failure line closes the stream, after the summary.
    let lines = sink.lines();
    assert!(lines.last().unwrap().starts_with("ERROR [17]"));
    assert!(lines.iter().any(|l| l == "LOG Attempts: 2 of 2"));
}
