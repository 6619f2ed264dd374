//! End-to-end runs of the `deliver` binary against temporary package trees.

use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

/// Copies the developer definition into `<deploy>/<family>/<version>/`.
const COPY_BUILD: &str = r#"d="$DELIVER_DEPLOY_PATH/$(basename "$(dirname "$PWD")")/$(basename "$PWD")"; mkdir -p "$d" && cp package.toml "$d/""#;

/// Test context with an isolated deliver home, settings file and package trees
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        for dir in ["dev", "install", "release", "home"] {
            std::fs::create_dir_all(temp_dir.path().join(dir)).expect("failed to create dir");
        }
        let ctx = Self { temp_dir };
        ctx.write_settings();
        ctx
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    fn write_settings(&self) {
        let settings = format!(
            r#"
packages_path = ["{install}", "{release}"]
local_packages_path = "{install}"
release_packages_path = "{release}"
dev_repository_roots = ["{dev}"]
build_command = ["sh", "-c", '{build}']
release_command = ["sh", "-c", '{build}']
"#,
            install = self.path("install").display(),
            release = self.path("release").display(),
            dev = self.path("dev").display(),
            build = COPY_BUILD,
        );
        std::fs::write(self.path("config.toml"), settings).expect("failed to write settings");
    }

    fn package(&self, root: &str, name: &str, version: &str, requires: &[&str]) {
        let dir = self.path(root).join(name).join(version);
        std::fs::create_dir_all(&dir).expect("failed to create package dir");
        let requires: Vec<String> = requires.iter().map(|r| format!("\"{r}\"")).collect();
        let text = format!(
            "[package]\nname = \"{name}\"\nversion = \"{version}\"\nrequires = [{}]\n",
            requires.join(", ")
        );
        std::fs::write(dir.join("package.toml"), text).expect("failed to write definition");
    }

    fn deliver(&self, args: &[&str]) -> Output {
        let bin_path = env!("CARGO_BIN_EXE_deliver");
        Command::new(bin_path)
            .args(args)
            .env("HOME", self.path("home"))
            .env("DELIVER_HOME", self.path("home"))
            .env("DELIVER_CONFIG", self.path("config.toml"))
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to run deliver")
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.deliver(args);
        assert!(
            output.status.success(),
            "deliver failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
    }
}

fn summary(manifest: &Value) -> Vec<(String, String)> {
    manifest
        .as_array()
        .expect("manifest is an array")
        .iter()
        .map(|e| {
            (
                e["name"].as_str().unwrap_or_default().to_string(),
                e["status"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn pair(name: &str, status: &str) -> (String, String) {
    (name.to_string(), status.to_string())
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.deliver(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("--release"));
}

#[test]
fn test_requests_are_required() {
    let ctx = TestContext::new();
    assert!(!ctx.deliver(&[]).status.success());
}

#[test]
fn test_preview_prints_manifest_json() {
    let ctx = TestContext::new();
    ctx.package("dev", "foo", "1", &["bar"]);
    ctx.package("dev", "bar", "2", &[]);
    ctx.package("install", "bar", "2", &[]);

    let manifest = ctx.json(&["foo", "--json"]);
    assert_eq!(
        summary(&manifest),
        vec![pair("bar-2", "installed"), pair("foo-1", "ready")]
    );
    assert_eq!(manifest[1]["source"]["kind"], "developer");
    assert_eq!(manifest[0]["depended_by"][0]["name"], "foo-1");
}

#[test]
fn test_missing_request_is_reported() {
    let ctx = TestContext::new();
    let manifest = ctx.json(&["nope", "--json"]);
    assert_eq!(summary(&manifest), vec![pair("nope", "package_not_found")]);
}

#[test]
fn test_json_deploy_needs_yes() {
    let ctx = TestContext::new();
    ctx.package("dev", "foo", "1", &[]);
    let output = ctx.deliver(&["foo", "-i", "--json"]);
    assert!(!output.status.success());
    assert!(!ctx.path("install").join("foo").exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let ctx = TestContext::new();
    ctx.package("dev", "foo", "1", &[]);

    let output = ctx.deliver(&["foo", "-i", "--dry-run"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("foo-1"));
    assert!(stdout.contains("sh -c"));
    assert!(!ctx.path("install").join("foo").exists());
}

#[cfg(unix)]
#[test]
fn test_install_builds_then_reports_installed() {
    let ctx = TestContext::new();
    ctx.package("dev", "foo", "1", &["bar"]);
    ctx.package("dev", "bar", "1", &[]);

    let output = ctx.deliver(&["foo", "--install", "--yes"]);
    assert!(
        output.status.success(),
        "deliver failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("SUCCESS"));
    assert!(ctx.path("install").join("bar/1/package.toml").is_file());
    assert!(ctx.path("install").join("foo/1/package.toml").is_file());

    let manifest = ctx.json(&["foo", "--json"]);
    assert_eq!(
        summary(&manifest),
        vec![pair("bar-1", "installed"), pair("foo-1", "installed")]
    );
}

#[cfg(unix)]
#[test]
fn test_release_ignores_local_installs() {
    let ctx = TestContext::new();
    ctx.package("dev", "foo", "1", &["bar"]);
    ctx.package("dev", "bar", "1", &[]);
    ctx.package("install", "bar", "1", &[]);

    let manifest = ctx.json(&["foo", "--release", "--dry-run", "--json"]);
    assert_eq!(summary(&manifest), vec![pair("bar-1", "ready"), pair("foo-1", "ready")]);

    let output = ctx.deliver(&["foo", "-r", "-y"]);
    assert!(output.status.success());
    assert!(ctx.path("release").join("bar/1/package.toml").is_file());
    assert!(ctx.path("release").join("foo/1/package.toml").is_file());
}

#[test]
fn test_list_developer_packages() {
    let ctx = TestContext::new();
    ctx.package("dev", "foo", "1", &[]);
    ctx.package("dev", "foo", "2", &[]);
    ctx.package("dev", "bar", "1", &[]);

    let listing = ctx.json(&["--list", "--json"]);
    let names: Vec<&str> = listing
        .as_array()
        .expect("listing is an array")
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert!(names.contains(&"foo"));
    assert!(names.contains(&"bar"));

    let listing = ctx.json(&["--list", "--json", "foo"]);
    assert_eq!(listing[0]["versions"], serde_json::json!(["1", "2"]));
}

#[test]
fn test_invalid_settings_fail() {
    let ctx = TestContext::new();
    std::fs::write(ctx.path("config.toml"), "build_command = []").expect("write settings");
    let output = ctx.deliver(&["foo"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("build_command"));
}
