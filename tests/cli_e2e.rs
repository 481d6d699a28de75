//! End-to-end CLI tests for the outcall binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_string, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::local_server::{start_mock_server_or_skip, url};

#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("call"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_binary_rejects_unknown_flag() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("--no-such-flag");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_binary_call_rejects_untyped_argument() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.args(["call", "libc.so.6", "abs", "--ret", "i32", "5"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("VALUE:TYPE"));
}

#[test]
fn test_binary_call_missing_library_fails() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.args(["call", "/nonexistent/libnothing.so", "f", "--ret", "i32"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("libnothing"));
}

#[cfg(all(target_os = "linux", target_env = "gnu", target_pointer_width = "64"))]
#[test]
fn test_binary_call_prints_float_result() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.args(["call", "libm.so.6", "floor", "--ret", "f64", "2.7:f64"]);
    cmd.assert().success().stdout("2.0\n");
}

#[cfg(all(target_os = "linux", target_env = "gnu", target_pointer_width = "64"))]
#[test]
fn test_binary_call_accepts_negative_integer() {
    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.args(["call", "libc.so.6", "abs", "--ret", "i32", "-5:i32"]);
    cmd.assert().success().stdout("5\n");
}

#[tokio::test]
async fn test_binary_fetch_prints_body() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(query_param("name", "world"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi world"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("-q")
        .arg("fetch")
        .arg(url(&mock_server, "/hello"))
        .args(["-Q", "name=world"]);
    cmd.assert().success().stdout("hi world");
}

#[tokio::test]
async fn test_binary_fetch_form_post() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_string("k=v"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stored"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("fetch")
        .arg(url(&mock_server, "/submit"))
        .args(["-d", "k=v"]);
    cmd.assert().success().stdout("stored");
}

#[tokio::test]
async fn test_binary_fetch_saves_output_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"PDF".to_vec())
                .insert_header("Content-Type", "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    let output = tempdir.path().join("saved.pdf");

    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("-q")
        .arg("fetch")
        .arg(url(&mock_server, "/report.pdf"))
        .arg("-o")
        .arg(&output);
    cmd.assert().success().stdout("");

    assert_eq!(std::fs::read(&output).unwrap(), b"PDF");
}

#[tokio::test]
async fn test_binary_fetch_error_status_fails() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&mock_server)
        .await;

    let mut cmd = Command::cargo_bin("outcall").unwrap();
    cmd.arg("-q")
        .arg("fetch")
        .arg(url(&mock_server, "/missing"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("404"));
}
