use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// Binary with an isolated environment rooted at `dir`
fn drive_audio(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("drive-audio").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir)
        .env("HOME", dir)
        .env("CREDENTIALS_DIR", dir.join("credentials"))
        .env_remove("INPUT_FOLDER_ID")
        .env_remove("OUTPUT_FOLDER_ID")
        .env_remove("SKIP_EXISTING")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_mentions_environment_configuration() {
    let dir = tempfile::tempdir().unwrap();

    drive_audio(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("INPUT_FOLDER_ID"))
        .stdout(predicate::str::contains("authorize"));
}

#[test]
fn missing_folders_exit_with_status_one() {
    let dir = tempfile::tempdir().unwrap();

    drive_audio(dir.path())
        .env("OUTPUT_FOLDER_ID", "out")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing environment variables: INPUT_FOLDER_ID"));
}

#[test]
fn missing_credentials_exit_with_status_one() {
    let dir = tempfile::tempdir().unwrap();

    drive_audio(dir.path())
        .arg("convert")
        .env("INPUT_FOLDER_ID", "in")
        .env("OUTPUT_FOLDER_ID", "out")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No usable credentials"))
        .stderr(predicate::str::contains("drive-audio authorize"));
}

#[test]
fn authorize_without_client_secret_explains_setup() {
    let dir = tempfile::tempdir().unwrap();

    drive_audio(dir.path())
        .arg("authorize")
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("client_secret.json not found"));

    assert!(!dir.path().join("credentials").join("token.json").exists());
}

#[test]
fn config_reads_settings_file_and_environment() {
    let dir = tempfile::tempdir().unwrap();
    fs_err::write(
        dir.path().join("config.yaml"),
        "transcode:\n  fallback_bitrate: 192k\n",
    )
    .unwrap();

    drive_audio(dir.path())
        .arg("config")
        .env("INPUT_FOLDER_ID", "in-123")
        .env("OUTPUT_FOLDER_ID", "out-456")
        .env("SKIP_EXISTING", "FALSE")
        .assert()
        .success()
        .stdout(predicate::str::contains("Input Folder: in-123"))
        .stdout(predicate::str::contains("Skip Existing: false"))
        .stdout(predicate::str::contains("aac @ 192k"));
}

#[test]
fn empty_video_type_list_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    fs_err::write(dir.path().join("config.yaml"), "video_mime_types: []\n").unwrap();

    drive_audio(dir.path())
        .env("INPUT_FOLDER_ID", "in")
        .env("OUTPUT_FOLDER_ID", "out")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("video_mime_types"));
}
