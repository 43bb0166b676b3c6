#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

use cardiac_seg_driver::{
    DriverError, Launcher, ProjectLayout, RunMode, SystemProcessRunner, TrainingDriver,
};

// Stand-in for expers/tune.py: records its arguments, one per line.
const FAKE_TUNE: &str = r#"
for arg in "$@"; do echo "$arg"; done > args.txt
[ -z "$TUNE_EXIT" ] || exit "$TUNE_EXIT"
"#;

fn setup_project(temp_dir: &TempDir, script: &str) -> ProjectLayout {
    let layout =
        ProjectLayout::new(temp_dir.path(), "swinunetr", "chgh", "AICUP_training").unwrap();
    fs::create_dir_all(layout.root.join("expers")).unwrap();
    fs::write(layout.tune_script(), script).unwrap();
    layout
}

fn recorded_args(root: &Path) -> Vec<String> {
    fs::read_to_string(root.join("args.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_test_mode_runs_in_project_root() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let layout = setup_project(&temp_dir, FAKE_TUNE);
    let launcher = Launcher::new("sh", &layout.root);
    let runner = SystemProcessRunner::new();

    TrainingDriver::new(&runner, &launcher, &layout)
        .run(RunMode::Test, None)
        .await?;

    // args.txt is written relative to the child's working directory
    let args = recorded_args(&layout.root);
    assert!(args.contains(&"--tune_mode=test".to_string()));
    assert!(args.contains(&"--roi_z=128".to_string()));
    assert!(args.contains(&"--resume_tuner".to_string()));

    let depths = args.iter().position(|a| a == "--depths").unwrap();
    assert_eq!(&args[depths + 1..depths + 5], ["2", "2", "4", "2"]);
    Ok(())
}

#[tokio::test]
async fn test_failing_tune_process_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let layout = setup_project(&temp_dir, "exit 4\n");
    let launcher = Launcher::new("sh", &layout.root);
    let runner = SystemProcessRunner::new();

    let err = TrainingDriver::new(&runner, &launcher, &layout)
        .run(RunMode::Train, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::ProcessFailed { .. }));
}

fn cli(root: &Path, extra: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cardiac-seg"));
    command
        .arg("--project-root")
        .arg(root)
        .args(["--interpreter", "sh"])
        .args(extra)
        .env_remove("TUNE_EXIT");
    command
}

#[test]
fn test_cli_resume_without_checkpoint_exits_1() {
    let temp_dir = TempDir::new().unwrap();
    let layout = setup_project(&temp_dir, FAKE_TUNE);

    let status = cli(&layout.root, &["train", "--mode", "resume"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let missing = layout.root.join("models/missing.pth");
    let status = cli(
        &layout.root,
        &["train", "--mode", "resume", "--checkpoint", missing.to_str().unwrap()],
    )
    .status()
    .unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(!layout.root.join("args.txt").exists());
}

#[test]
fn test_cli_propagates_training_failure() {
    let temp_dir = TempDir::new().unwrap();
    let layout = setup_project(&temp_dir, FAKE_TUNE);

    let status = cli(&layout.root, &["train"])
        .env("TUNE_EXIT", "3")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let status = cli(&layout.root, &["train"]).status().unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(recorded_args(&layout.root).contains(&"--tune_mode=train".to_string()));
}

#[test]
fn test_cli_resolves_relative_checkpoint_from_invoking_directory() {
    let temp_dir = TempDir::new().unwrap();
    let layout = setup_project(&temp_dir, FAKE_TUNE);
    let caller = TempDir::new().unwrap();

    // only under the project root: the caller's relative path does not name it
    fs::create_dir_all(layout.root.join("models")).unwrap();
    fs::write(layout.root.join("models/ssl.pth"), b"weights").unwrap();
    let status = cli(&layout.root, &["train", "--mode", "resume", "--checkpoint", "models/ssl.pth"])
        .current_dir(caller.path())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(!layout.root.join("args.txt").exists());

    fs::create_dir_all(caller.path().join("models")).unwrap();
    fs::write(caller.path().join("models/ssl.pth"), b"weights").unwrap();
    let status = cli(&layout.root, &["train", "--mode", "resume", "--checkpoint", "models/ssl.pth"])
        .current_dir(caller.path())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    let args = recorded_args(&layout.root);
    let checkpoint = args
        .iter()
        .find_map(|a| a.strip_prefix("--ssl_checkpoint="))
        .unwrap();
    assert_eq!(
        Path::new(checkpoint).canonicalize().unwrap(),
        caller.path().join("models/ssl.pth").canonicalize().unwrap()
    );
}
