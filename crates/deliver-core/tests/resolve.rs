//! Resolving requests into a manifest against developer and installed trees.

mod common;

use std::sync::Arc;

use common::{Fixture, RecordingReporter, summary};
use deliver_core::{DeliverError, DeployMode, EntryId, Status};
use deliver_schema::{PackageOrigin, Requirement};

fn request(text: &str) -> Requirement {
    Requirement::parse(text).unwrap()
}

fn entry(name: &str, status: Status) -> (String, Status) {
    (name.to_string(), status)
}

#[test]
fn test_newer_developer_version_is_ready() {
    let fx = Fixture::new();
    fx.dev("foo", "2", &[], &[]);
    fx.installed("foo", "1", &[], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("foo"), None).unwrap();

    let manifest = solver.manifest();
    assert_eq!(summary(&manifest), vec![entry("foo-2", Status::Ready)]);
    assert_eq!(
        manifest[0].source(),
        Some(&PackageOrigin::Developer(fx.dev_root().join("foo/2")))
    );
}

#[test]
fn test_newer_installed_version_is_installed() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    fx.installed("foo", "2", &[], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("foo"), None).unwrap();

    let manifest = solver.manifest();
    assert_eq!(summary(&manifest), vec![entry("foo-2", Status::Installed)]);
    assert_eq!(
        manifest[0].source(),
        Some(&PackageOrigin::Installed(fx.install_root().join("foo/2")))
    );
}

#[test]
fn test_installed_only_is_external() {
    let fx = Fixture::new();
    fx.installed("foo", "1", &[], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("foo"), None).unwrap();
    assert_eq!(summary(&solver.manifest()), vec![entry("foo-1", Status::External)]);
}

#[test]
fn test_equal_versions_use_both_variant_sets() {
    let fx = Fixture::new();
    fx.dev("a", "1", &[], &[]);
    fx.dev("b", "1", &[], &[]);
    fx.dev("foo", "1", &[], &[&["a"], &["b"]]);
    fx.installed("foo", "1", &[], &[&["a"]]);

    let mut solver = fx.solver();
    solver.resolve(&request("foo"), None).unwrap();

    let manifest = solver.manifest();
    assert_eq!(
        summary(&manifest),
        vec![
            entry("a-1", Status::Ready),
            entry("foo-1[0]", Status::Installed),
            entry("b-1", Status::Ready),
            entry("foo-1[1]", Status::Ready),
        ]
    );
    assert_eq!(
        manifest[1].source(),
        Some(&PackageOrigin::Installed(fx.install_root().join("foo/1")))
    );
}

#[test]
fn test_installed_variant_keeps_developer_index() {
    let fx = Fixture::new();
    fx.dev("a", "1", &[], &[]);
    fx.dev("b", "1", &[], &[]);
    fx.dev("foo", "1", &[], &[&["a"], &["b"]]);
    fx.installed("foo", "1", &[], &[&["b"]]);

    let mut solver = fx.solver();
    solver.resolve(&request("foo"), None).unwrap();

    let manifest = solver.manifest();
    assert_eq!(
        summary(&manifest),
        vec![
            entry("a-1", Status::Ready),
            entry("foo-1[0]", Status::Ready),
            entry("b-1", Status::Ready),
            entry("foo-1[1]", Status::Installed),
        ]
    );
    assert_eq!(
        manifest[1].source(),
        Some(&PackageOrigin::Developer(fx.dev_root().join("foo/1")))
    );
    assert_eq!(
        manifest[3].source(),
        Some(&PackageOrigin::Installed(fx.install_root().join("foo/1")))
    );

    solver.reset();
    solver.resolve(&request("foo"), Some(1)).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("b-1", Status::Ready), entry("foo-1[1]", Status::Installed)]
    );
}

#[test]
fn test_unmatched_installed_variant_is_ignored() {
    let fx = Fixture::new();
    fx.dev("a", "1", &[], &[]);
    fx.dev("foo", "1", &[], &[&["a"]]);
    fx.installed("foo", "1", &[], &[&["c"]]);

    let mut solver = fx.solver();
    solver.resolve(&request("foo"), None).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("a-1", Status::Ready), entry("foo-1[0]", Status::Ready)]
    );
}

#[test]
fn test_dependencies_come_first() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    fx.dev("bar", "1", &["foo"], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("bar"), None).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("foo-1", Status::Ready), entry("bar-1", Status::Ready)]
    );
}

#[test]
fn test_each_variant_gets_an_entry() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    fx.dev("goo", "1", &[], &[]);
    fx.dev("bar", "1", &[], &[&["foo"], &["goo"]]);

    let mut solver = fx.solver();
    solver.resolve(&request("bar"), None).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![
            entry("foo-1", Status::Ready),
            entry("bar-1[0]", Status::Ready),
            entry("goo-1", Status::Ready),
            entry("bar-1[1]", Status::Ready),
        ]
    );

    solver.reset();
    solver.resolve(&request("bar"), Some(1)).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("goo-1", Status::Ready), entry("bar-1[1]", Status::Ready)]
    );
}

#[test]
fn test_diamond_has_one_shared_entry() {
    let fx = Fixture::new();
    fx.dev("a", "1", &["b", "c"], &[]);
    fx.dev("b", "1", &["d"], &[]);
    fx.dev("c", "1", &["d"], &[]);
    fx.dev("d", "1", &[], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("a"), None).unwrap();

    let manifest = solver.manifest();
    assert_eq!(
        summary(&manifest),
        vec![
            entry("d-1", Status::Ready),
            entry("b-1", Status::Ready),
            entry("c-1", Status::Ready),
            entry("a-1", Status::Ready),
        ]
    );
    let d = solver.entry(&EntryId::new("d-1", None)).unwrap();
    assert!(d.depended_by().contains(&EntryId::new("b-1", None)));
    assert!(d.depended_by().contains(&EntryId::new("c-1", None)));
}

#[test]
fn test_resolving_again_reuses_entries() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    fx.dev("bar", "1", &["foo"], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("bar"), None).unwrap();
    solver.resolve(&request("bar"), None).unwrap();
    solver.resolve(&request("foo"), None).unwrap();
    assert_eq!(solver.manifest().len(), 2);
}

#[test]
fn test_unmatched_request_is_one_missing_entry() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("nope-1"), None).unwrap();
    solver.resolve(&request("foo-2"), None).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![
            entry("nope-1", Status::PackageNotFound),
            entry("foo-2", Status::PackageNotFound),
        ]
    );
}

#[test]
fn test_unresolvable_variant_fails_alone() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    fx.dev("goo", "1", &[], &[]);
    fx.dev("bar", "1", &[], &[&["foo-2"], &["goo"]]);
    fx.dev("baz", "1", &["missing_family"], &[]);

    let reporter = Arc::new(RecordingReporter::default());
    let mut solver = fx.solver().with_reporter(reporter.clone());
    solver.resolve(&request("bar"), None).unwrap();
    solver.resolve(&request("baz"), None).unwrap();

    assert_eq!(
        summary(&solver.manifest()),
        vec![
            entry("bar-1[0]", Status::ResolveFailed),
            entry("goo-1", Status::Ready),
            entry("bar-1[1]", Status::Ready),
            entry("baz-1", Status::ResolveFailed),
        ]
    );
    assert_eq!(reporter.events(), vec!["failed bar-1[0]", "failed baz-1"]);
}

#[test]
fn test_missing_family_is_loaded_and_retried() {
    let fx = Fixture::new();
    fx.dev("tool", "1", &["ext"], &[]);
    fx.dev("devlib", "1", &[], &[]);
    fx.installed("ext", "1", &["devlib"], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("tool"), None).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![
            entry("devlib-1", Status::Ready),
            entry("ext-1", Status::External),
            entry("tool-1", Status::Ready),
        ]
    );
}

#[test]
fn test_conflict_requests_constrain_contexts() {
    let fx = Fixture::new();
    fx.dev("bar", "1", &[], &[]);
    fx.dev("bar", "2", &[], &[]);
    fx.dev("foo", "1", &["bar"], &[]);

    let mut solver = fx.solver();
    solver.resolve_requests(&["foo", "!bar-2"]).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("bar-1", Status::Ready), entry("foo-1", Status::Ready)]
    );

    solver.resolve_requests(&["foo"]).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("bar-2", Status::Ready), entry("foo-1", Status::Ready)]
    );
}

#[test]
fn test_conflict_scope_restored_after_error() {
    let fx = Fixture::new();
    fx.dev("bar", "1", &[], &[]);
    fx.dev("bar", "2", &[], &[]);
    fx.dev("foo", "1", &["bar"], &[]);

    let mut solver = fx.solver();
    let result = solver.with_conflicts(vec![request("!bar-2")], |_| {
        Err(DeliverError::Other("interrupted".to_string()))
    });
    assert!(result.is_err());

    solver.resolve(&request("foo"), None).unwrap();
    assert_eq!(solver.manifest()[0].name(), "bar-2");

    let err = solver.with_conflicts(vec![request("bar")], |_| Ok(())).unwrap_err();
    assert!(matches!(err, DeliverError::Request(_)));
}

#[test]
fn test_non_package_requests_rejected() {
    let fx = Fixture::new();
    let mut solver = fx.solver();
    assert!(matches!(
        solver.resolve(&request("~foo-1"), None),
        Err(DeliverError::Request(_))
    ));
    assert!(matches!(
        solver.resolve_requests(&["foo-"]),
        Err(DeliverError::Request(_))
    ));
}

#[test]
fn test_variant_request_syntax() {
    let fx = Fixture::new();
    fx.dev("foo", "1", &[], &[]);
    fx.dev("goo", "1", &[], &[]);
    fx.dev("bar", "1", &[], &[&["foo"], &["goo"]]);

    let mut solver = fx.solver();
    solver.resolve_requests(&["bar-1[0]"]).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![entry("foo-1", Status::Ready), entry("bar-1[0]", Status::Ready)]
    );
}

#[test]
fn test_release_mode_hides_local_installs() {
    let fx = Fixture::new();
    fx.installed("foo", "3", &[], &[]);
    fx.released("foo", "2", &[], &[]);
    fx.installed("local_only", "1", &[], &[]);

    let mut solver = fx.solver();
    solver.set_mode(DeployMode::Release);
    solver.resolve(&request("foo"), None).unwrap();
    solver.resolve(&request("local_only"), None).unwrap();
    assert_eq!(
        summary(&solver.manifest()),
        vec![
            entry("foo-2", Status::External),
            entry("local_only", Status::PackageNotFound),
        ]
    );

    solver.set_mode(DeployMode::Install);
    assert!(solver.manifest().is_empty());
    solver.resolve(&request("foo"), None).unwrap();
    assert_eq!(summary(&solver.manifest()), vec![entry("foo-3", Status::External)]);
}

#[test]
fn test_bind_packages_resolve_in_memory() {
    let fx = Fixture::new();
    fx.dev("tool", "1", &["os"], &[]);

    let mut solver = fx.solver();
    solver.resolve(&request("tool"), None).unwrap();

    let manifest = solver.manifest();
    assert_eq!(
        summary(&manifest),
        vec![
            entry("platform-linux", Status::Ready),
            entry("arch-x86_64", Status::Ready),
            entry("os-ubuntu-22.04", Status::Ready),
            entry("tool-1", Status::Ready),
        ]
    );
    assert!(manifest.iter().take(3).all(deliver_core::ManifestEntry::is_synthesized));
}
