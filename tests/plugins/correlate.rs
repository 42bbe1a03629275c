use ciwarden::core::lock::LockPolicy;
use ciwarden::core::model::{GuidanceStatus, TestEvent, TestStatus};
use ciwarden::core::store::EventStore;
use ciwarden::plugins::correlate::{CorrelationEngine, GuidanceThresholds, component_stats};
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, EventStore) {
    let tmp = tempdir().expect("tempdir");
    let store =
        EventStore::open(&tmp.path().join("guidance.db"), LockPolicy::default()).expect("open");
    (tmp, store)
}

fn event(run: &str, pr: Option<i64>, component: &str, status: TestStatus, ts: &str) -> TestEvent {
    TestEvent {
        run_id: run.to_string(),
        pr_id: pr,
        commit_sha: format!("sha-{run}"),
        test_id: format!("{component}.Tests#case"),
        suite: format!("{component}.Tests"),
        status,
        duration_ms: 10,
        component: component.to_string(),
        file_hint: String::new(),
        timestamp: ts.to_string(),
    }
}

/// r1 docs fail, r2..r4 docs pass, r5/r6 cli fail on two PRs.
fn seed_cli_hotspot(store: &mut EventStore) {
    use TestStatus::*;
    store
        .record_test_events(&[
            event("r1", Some(1), "docs", Failed, "0001Z"),
            event("r2", Some(2), "docs", Passed, "0002Z"),
            event("r3", Some(3), "docs", Passed, "0003Z"),
            event("r4", Some(4), "docs", Passed, "0004Z"),
            event("r5", Some(5), "cli", Failed, "0005Z"),
            event("r6", Some(6), "cli", Failed, "0006Z"),
        ])
        .expect("seed");
}

fn add_runs(store: &mut EventStore, runs: &[&str], component: &str, status: TestStatus) {
    let events: Vec<TestEvent> = runs
        .iter()
        .map(|run| event(run, Some(100), component, status, "0100Z"))
        .collect();
    store.record_test_events(&events).expect("append");
}

fn engine(retire_after_runs: u32) -> CorrelationEngine {
    CorrelationEngine::new(GuidanceThresholds {
        min_support: 2,
        min_lift: 1.5,
        retire_after_runs,
    })
}

fn assert_rules_well_formed(store: &EventStore) {
    for rule in store.get_all_guidance().expect("all guidance") {
        assert!(rule.support_prs >= 1, "{} has no support", rule.component);
        assert!(rule.lift.is_finite(), "{} has undefined lift", rule.component);
    }
}

#[test]
fn test_hotspot_component_activates_with_lift_and_support() {
    let (_tmp, mut store) = open_store();
    seed_cli_hotspot(&mut store);

    let summary = engine(20).recompute(&mut store).expect("recompute");
    assert_eq!(summary.total_runs, 6);
    assert_eq!(summary.activated, vec!["cli"]);

    let active = store.get_active_guidance().expect("active");
    assert_eq!(active.len(), 1);
    let rule = &active[0];
    assert_eq!(rule.component, "cli");
    assert_eq!(
        rule.description,
        "Run the cli test suites before merging changes to cli"
    );
    assert_eq!(rule.support_prs, 2);
    // cli fails every run it touches; the other four runs fail a quarter of the time.
    assert!((rule.lift - 4.0).abs() < 1e-9);
    assert_eq!(rule.status, GuidanceStatus::Active);
    assert_eq!(rule.first_seen, "0005Z");
    assert_eq!(rule.last_seen, "0006Z");
    assert_rules_well_formed(&store);
}

#[test]
fn test_recompute_over_unchanged_events_is_idempotent() {
    let (_tmp, mut store) = open_store();
    seed_cli_hotspot(&mut store);
    let engine = engine(20);

    engine.recompute(&mut store).expect("first");
    let before = store.get_all_guidance().expect("before");

    let summary = engine.recompute(&mut store).expect("second");
    assert!(!summary.changed());
    assert_eq!(store.get_all_guidance().expect("after"), before);
}

#[test]
fn test_failures_from_one_pr_do_not_meet_support() {
    use TestStatus::*;
    let (_tmp, mut store) = open_store();
    store
        .record_test_events(&[
            event("r1", Some(1), "docs", Failed, "0001Z"),
            event("r2", Some(2), "docs", Passed, "0002Z"),
            event("r3", Some(3), "docs", Passed, "0003Z"),
            event("r4", Some(7), "api", Failed, "0004Z"),
            event("r5", Some(7), "api", Failed, "0005Z"),
            event("r6", None, "api", Failed, "0006Z"),
        ])
        .expect("seed");

    let snapshot = component_stats(&store.load_test_events().expect("events"));
    assert_eq!(snapshot.component("api").expect("api").support_prs, 1);

    let summary = engine(20).recompute(&mut store).expect("recompute");
    assert!(summary.activated.is_empty());
    assert!(store.get_active_guidance().expect("active").is_empty());
}

#[test]
fn test_zero_baseline_never_activates() {
    use TestStatus::*;
    let (_tmp, mut store) = open_store();
    store
        .record_test_events(&[
            event("r1", Some(1), "cli", Failed, "0001Z"),
            event("r2", Some(2), "cli", Failed, "0002Z"),
            event("r3", Some(3), "docs", Passed, "0003Z"),
        ])
        .expect("seed");

    engine(20).recompute(&mut store).expect("recompute");
    assert!(store.get_all_guidance().expect("all").is_empty());
}

#[test]
fn test_active_rule_below_threshold_keeps_last_stats() {
    let (_tmp, mut store) = open_store();
    seed_cli_hotspot(&mut store);
    let engine = engine(20);
    engine.recompute(&mut store).expect("activate");

    // Four passing cli runs pull its lift down to (2/6) / (1/4).
    add_runs(&mut store, &["r7", "r8", "r9", "r10"], "cli", TestStatus::Passed);
    let snapshot = component_stats(&store.load_test_events().expect("events"));
    assert!(snapshot.component("cli").and_then(|s| s.lift).expect("lift") < 1.5);

    let summary = engine.recompute(&mut store).expect("recompute");
    assert!(!summary.changed());
    let active = store.get_active_guidance().expect("active");
    assert_eq!(active.len(), 1);
    assert!((active[0].lift - 4.0).abs() < 1e-9);
    assert_eq!(active[0].support_prs, 2);
}

#[test]
fn test_rule_retires_after_window_and_reactivates_on_new_evidence() {
    let (_tmp, mut store) = open_store();
    seed_cli_hotspot(&mut store);
    let engine = engine(3);
    engine.recompute(&mut store).expect("activate");

    // Three quiet runs: still inside the window.
    add_runs(&mut store, &["r7", "r8", "r9"], "docs", TestStatus::Passed);
    let summary = engine.recompute(&mut store).expect("within window");
    assert!(summary.retired.is_empty());
    assert_eq!(summary.reinforced, vec!["cli"]);
    assert_eq!(store.get_active_guidance().expect("active").len(), 1);

    // A fourth quiet run crosses it.
    add_runs(&mut store, &["r10"], "docs", TestStatus::Passed);
    let summary = engine.recompute(&mut store).expect("past window");
    assert_eq!(summary.retired, vec!["cli"]);
    assert!(store.get_active_guidance().expect("active").is_empty());
    let all = store.get_all_guidance().expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, GuidanceStatus::Retired);
    // Retirement touches status only.
    assert!((all[0].lift - 7.0).abs() < 1e-9);

    // Retired rules stay retired while the evidence is quiet.
    assert!(!engine.recompute(&mut store).expect("quiet").changed());

    store
        .record_test_events(&[event("r11", Some(11), "cli", TestStatus::Failed, "0011Z")])
        .expect("new failure");
    let summary = engine.recompute(&mut store).expect("reactivate");
    assert_eq!(summary.activated, vec!["cli"]);

    let active = store.get_active_guidance().expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].support_prs, 3);
    assert_eq!(active[0].first_seen, "0005Z");
    assert_eq!(active[0].last_seen, "0011Z");
    assert_rules_well_formed(&store);
}

#[test]
fn test_changed_description_supersedes_the_old_rule() {
    let (_tmp, mut store) = open_store();
    seed_cli_hotspot(&mut store);
    engine(20).recompute(&mut store).expect("activate");

    let with_command = engine(20).with_command("cli", "cargo test --test cli");
    let summary = with_command.recompute(&mut store).expect("recompute");
    assert_eq!(summary.activated, vec!["cli"]);
    assert_eq!(summary.retired, vec!["cli"]);

    let active = store.get_active_guidance().expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(
        active[0].description,
        "Run `cargo test --test cli` before merging changes to cli"
    );
    assert_eq!(store.get_all_guidance().expect("all").len(), 2);
}

#[test]
fn test_events_survive_reopen_in_insertion_order() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("guidance.db");
    {
        let mut store = EventStore::open(&path, LockPolicy::default()).expect("open");
        seed_cli_hotspot(&mut store);
    }
    let store = EventStore::open(&path, LockPolicy::default()).expect("reopen");
    let events = store.load_test_events().expect("events");
    assert_eq!(events.len(), 6);
    assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(events[4].event.run_id, "r5");
    assert_eq!(events[4].event.commit_sha, "sha-r5");
}
