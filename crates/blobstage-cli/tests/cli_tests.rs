//! Command-line tests against a local store in a temporary directory

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a blobstage command rooted in `dir`
#[allow(deprecated)]
fn blobstage(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("blobstage").unwrap();
    cmd.current_dir(dir)
        .env("BLOBSTAGE_STORAGE_ROOT", dir.join("store"))
        .env_remove("BLOBSTAGE_BLOCK_SIZE")
        .env_remove("BLOBSTAGE_MAX_CONCURRENCY");
    cmd
}

fn write_input(dir: &Path, name: &str, len: usize) -> Vec<u8> {
    let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    fs::write(dir.join(name), &data).unwrap();
    data
}

#[test]
fn test_upload_download_round_trip() {
    let dir = TempDir::new().unwrap();
    let data = write_input(dir.path(), "input.bin", 300_000);

    blobstage(dir.path())
        .args(["-q", "upload", "input.bin", "media/input.bin"])
        .args(["--block-size", "65536", "--concurrency", "3", "--single-shot-threshold", "65536"])
        .assert()
        .success();

    blobstage(dir.path())
        .args(["-q", "download", "media/input.bin", "out/copy.bin"])
        .assert()
        .success();

    assert_eq!(fs::read(dir.path().join("out/copy.bin")).unwrap(), data);
}

#[test]
fn test_upload_json_summary() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "input.bin", 200_000);

    blobstage(dir.path())
        .args(["-q", "upload", "input.bin", "obj", "--json"])
        .args(["--block-size", "65536", "--single-shot-threshold", "1024"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"path\": \"chunked\""))
        .stdout(predicate::str::contains("\"blocks\": 4"));
}

#[test]
fn test_stat_reports_metadata() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "small.txt", 1000);

    blobstage(dir.path())
        .args(["-q", "upload", "small.txt", "notes/small.txt"])
        .assert()
        .success();

    blobstage(dir.path())
        .args(["stat", "notes/small.txt", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"size\": 1000"))
        .stdout(predicate::str::contains("\"kind\": \"block\""));
}

#[test]
fn test_stat_missing_object_fails() {
    let dir = TempDir::new().unwrap();
    blobstage(dir.path())
        .args(["-q", "stat", "absent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent"));
}

#[test]
fn test_download_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "a.bin", 10);
    fs::write(dir.path().join("existing"), b"keep").unwrap();

    blobstage(dir.path())
        .args(["-q", "upload", "a.bin", "a"])
        .assert()
        .success();
    blobstage(dir.path())
        .args(["-q", "download", "a", "existing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_eq!(fs::read(dir.path().join("existing")).unwrap(), b"keep");
}

#[test]
fn test_append_kind() {
    let dir = TempDir::new().unwrap();
    let data = write_input(dir.path(), "app.log", 5000);

    blobstage(dir.path())
        .args(["-q", "upload", "app.log", "logs/app.log", "--kind", "append"])
        .args(["--block-size", "1024", "--single-shot-threshold", "1024"])
        .assert()
        .success();
    blobstage(dir.path())
        .args(["-q", "download", "logs/app.log", "copy.log"])
        .assert()
        .success();

    assert_eq!(fs::read(dir.path().join("copy.log")).unwrap(), data);
}

#[test]
fn test_page_kind_rejects_unaligned_file() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "disk.img", 1000);

    blobstage(dir.path())
        .args(["-q", "upload", "disk.img", "disk", "--kind", "page"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("multiple of 512"));
}

#[test]
fn test_unknown_kind_is_usage_error() {
    let dir = TempDir::new().unwrap();
    blobstage(dir.path())
        .args(["upload", "x", "y", "--kind", "tape"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown object kind"));
}

#[test]
fn test_config_file_sets_block_size() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "input.bin", 10_000);
    fs::write(
        dir.path().join("blobstage.toml"),
        "[transfer]\nblock_size = 2048\nsingle_shot_threshold = 0\n",
    )
    .unwrap();

    blobstage(dir.path())
        .args(["-q", "--config", "blobstage.toml", "upload", "input.bin", "obj", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"blocks\": 5"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    blobstage(dir.path())
        .args(["--config", "nope.toml", "stat", "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}
