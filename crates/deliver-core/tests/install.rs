//! Deploying a resolved manifest through a recording runner.

mod common;

use std::sync::Arc;

use common::{Fixture, RecordingReporter, RecordingRunner, summary};
use deliver_core::{DeliverError, DeployMode, Status};
use deliver_schema::Requirement;

fn request(text: &str) -> Requirement {
    Requirement::parse(text).unwrap()
}

#[test]
fn test_target_mode_by_exact_path() {
    let fx = Fixture::new();
    let mut installer = fx.installer(RecordingRunner::default(), Arc::new(RecordingReporter::default()));

    assert_eq!(installer.target(&fx.release_root()), DeployMode::Release);
    assert_eq!(installer.target(&fx.release_root().join("./")), DeployMode::Release);
    assert_eq!(installer.target(&fx.release_root().join("sub")), DeployMode::Install);
    assert_eq!(installer.target(&fx.install_root()), DeployMode::Install);
    assert_eq!(installer.mode(), DeployMode::Install);
}

#[test]
fn test_target_resets_manifest() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    let mut installer = fx.installer(RecordingRunner::default(), Arc::new(RecordingReporter::default()));

    installer.target(&fx.install_root());
    installer.resolve(&request("foo"), None).unwrap();
    assert_eq!(installer.manifest().len(), 1);

    installer.target(&fx.release_root());
    assert!(installer.manifest().is_empty());
}

#[test]
fn test_run_requires_target() {
    let fx = Fixture::new();
    let mut installer = fx.installer(RecordingRunner::default(), Arc::new(RecordingReporter::default()));
    assert!(matches!(installer.run(), Err(DeliverError::Config(_))));
}

#[test]
fn test_run_builds_binds_and_skips() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &["platform", "ext"], &[]);
    fx.installed("ext", "1", &[], &[]);

    let runner = RecordingRunner::default();
    let reporter = Arc::new(RecordingReporter::default());
    let mut installer = fx.installer(runner.clone(), reporter.clone());

    installer.target(&fx.install_root());
    installer.resolve(&request("foo"), None).unwrap();
    assert_eq!(
        summary(&installer.manifest()),
        vec![
            ("platform-linux".to_string(), Status::Ready),
            ("ext-1".to_string(), Status::External),
            ("foo-1".to_string(), Status::Ready),
        ]
    );

    assert_eq!(installer.run().unwrap(), 2);
    assert_eq!(runner.built(), vec!["foo-1"]);
    assert!(fx.install_root().join("platform/linux/package.toml").is_file());

    let commands = runner.commands.lock().unwrap().clone();
    assert_eq!(commands[0].source_dir, fx.dev_root().join("foo/1"));
    assert_eq!(commands[0].deploy_path, fx.install_root());
    assert_eq!(commands[0].mode, DeployMode::Install);

    assert_eq!(
        reporter.events(),
        vec![
            "mode install",
            "binding platform-linux",
            "deployed platform-linux",
            "skipped ext-1",
            "building foo-1",
            "deployed foo-1",
        ]
    );

    // The bound package is visible once the deploy path listing is refreshed.
    installer.reset();
    installer.resolve(&request("foo"), None).unwrap();
    assert_eq!(installer.manifest()[0].status(), Status::Installed);
}

#[test]
fn test_variants_are_built_with_their_index() {
    let fx = Fixture::new();
    fx.dev("python", "3", &[], &[]);
    fx.dev("tool", "1", &[], &[&["python"], &[]]);

    let runner = RecordingRunner::default();
    let mut installer = fx.installer(runner.clone(), Arc::new(RecordingReporter::default()));
    installer.target(&fx.release_root());
    installer.resolve(&request("tool"), None).unwrap();

    assert_eq!(installer.run().unwrap(), 3);
    assert_eq!(runner.built(), vec!["python-3", "tool-1[0]", "tool-1[1]"]);
    let commands = runner.commands.lock().unwrap().clone();
    assert!(commands.iter().all(|c| c.mode == DeployMode::Release));
}

#[test]
fn test_failure_stops_the_run() {
    let fx = Fixture::new();
    fx.dev("a", "1", &["b"], &[]);
    fx.dev("b", "1", &[], &[]);

    let runner = RecordingRunner::failing_on("b-1");
    let mut installer = fx.installer(runner.clone(), Arc::new(RecordingReporter::default()));
    installer.target(&fx.install_root());
    installer.resolve(&request("a"), None).unwrap();

    let err = installer.run().unwrap_err();
    assert!(matches!(err, DeliverError::ExternalProcess { code: Some(1), .. }));
    assert_eq!(runner.built(), vec!["b-1"]);
}

#[test]
fn test_run_iter_is_lazy() {
    let fx = Fixture::new();
    fx.dev("a", "1", &["b"], &[]);
    fx.dev("b", "1", &[], &[]);

    let runner = RecordingRunner::default();
    let mut installer = fx.installer(runner.clone(), Arc::new(RecordingReporter::default()));
    installer.target(&fx.install_root());
    installer.resolve(&request("a"), None).unwrap();

    let mut steps = installer.run_iter().unwrap();
    let first = steps.next().unwrap().unwrap();
    assert_eq!(first.name(), "b-1");
    assert_eq!(runner.built(), vec!["b-1"]);

    assert_eq!(steps.next().unwrap().unwrap().name(), "a-1");
    assert!(steps.next().is_none());
    assert_eq!(runner.built(), vec!["b-1", "a-1"]);
}

#[test]
fn test_failed_entries_trigger_nothing() {
    let fx = Fixture::new();
    fx.dev("a", "1", &["missing_family"], &[]);

    let runner = RecordingRunner::default();
    let reporter = Arc::new(RecordingReporter::default());
    let mut installer = fx.installer(runner.clone(), reporter.clone());
    installer.target(&fx.install_root());
    installer.resolve(&request("a"), None).unwrap();
    installer.resolve(&request("nope"), None).unwrap();

    assert_eq!(installer.run().unwrap(), 0);
    assert!(runner.built().is_empty());
    assert!(reporter.events().contains(&"skipped a-1".to_string()));
    assert!(reporter.events().contains(&"skipped nope".to_string()));
}
