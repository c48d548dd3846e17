//! Collection loop tests, driven end to end by scripted feeds with the
//! pacing durations shrunk to near zero.

use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

use reelmark_common::RuleSet;

use crate::collector::{Collector, CollectorConfig, Phase, StopReason};
use crate::session::{read_snapshot, ResumeMode, SessionState};
use crate::testing::{raw_item, ScriptedFeed};

fn fast_cfg(session_file: &Path) -> CollectorConfig {
    CollectorConfig {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(100),
        delay_increment: Duration::from_millis(1),
        rate_limit_wait: Duration::from_millis(2),
        batch_pause_every: 0,
        batch_pause: Duration::from_millis(1),
        error_pause: Duration::from_millis(1),
        save_every: 2,
        max_cycles: 50,
        empty_cycle_limit: 5,
        jitter: false,
        continue_on_error: true,
        session_file: session_file.to_path_buf(),
        pause_poll: Duration::from_millis(1),
    }
}

fn matching_item(id: &str) -> reelmark_common::RawItem {
    raw_item(id, "filmfan", "Movie night 1994")
}

fn plain_item(id: &str) -> reelmark_common::RawItem {
    raw_item(id, "someone", "just had lunch")
}

#[tokio::test]
async fn five_empty_cycles_stop_the_loop() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .cycle(vec![])
        .cycle(vec![])
        .cycle(vec![])
        .cycle(vec![])
        .cycle(vec![]);
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&dir.path().join("session.json")),
    );
    let mut session = SessionState::new();

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::Exhausted);
    assert_eq!(outcome.cycles, 5);
    assert_eq!(collector.phase(), Phase::Done);
    assert!(outcome.reason.is_complete());
}

#[tokio::test]
async fn duplicates_are_counted_not_reclassified() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .cycle(vec![matching_item("100")])
        .cycle(vec![matching_item("100"), plain_item("300")])
        .end_cycle();
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&dir.path().join("session.json")),
    );
    let mut session = SessionState::new();

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::TerminalMarker);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(session.stats.collected, 2);
    assert_eq!(session.stats.duplicates, 1);
    assert_eq!(session.stats.matched, 1);
    assert_eq!(session.matched().len(), 1);
    assert_eq!(session.matched()[0].id, "100");
    assert_eq!(session.stats.by_category.get("YEAR"), Some(&1));
    assert_eq!(session.stats.by_category.get("MOVIE"), Some(&1));
}

#[tokio::test]
async fn rate_limit_signal_backs_off_and_continues() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .rate_limited_cycle()
        .cycle(vec![matching_item("100")])
        .end_cycle();
    let mut cfg = fast_cfg(&dir.path().join("session.json"));
    cfg.base_delay = Duration::from_millis(4);
    let mut collector = Collector::new(feed, RuleSet::default(), cfg);
    let mut session = SessionState::new();

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::TerminalMarker);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(session.pacing.rate_limits, 1);
    // 4ms base bumped by the 1.5x rate-limit factor
    assert_eq!(session.pacing.current_delay, Duration::from_millis(6));
    assert_eq!(session.stats.matched, 1);
}

#[tokio::test]
async fn rate_limit_error_from_a_cycle_backs_off_too() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .rate_limit_error_cycle()
        .cycle(vec![matching_item("100")])
        .end_cycle();
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&dir.path().join("session.json")),
    );
    let mut session = SessionState::new();

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::TerminalMarker);
    assert_eq!(session.pacing.rate_limits, 1);
    assert_eq!(session.stats.matched, 1);
}

#[tokio::test]
async fn cycle_errors_do_not_abort_by_default() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .failing_cycle("boom")
        .cycle(vec![matching_item("100")])
        .end_cycle();
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&dir.path().join("session.json")),
    );
    let mut session = SessionState::new();

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::TerminalMarker);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(session.stats.collected, 1);
    assert_eq!(session.stats.matched, 1);
}

#[tokio::test]
async fn fail_fast_aborts_and_persists_the_session() {
    let dir = tempdir().unwrap();
    let session_file = dir.path().join("session.json");
    let feed = ScriptedFeed::new()
        .cycle(vec![matching_item("100")])
        .failing_cycle("boom");
    let mut cfg = fast_cfg(&session_file);
    cfg.continue_on_error = false;
    let mut collector = Collector::new(feed, RuleSet::default(), cfg);
    let mut session = SessionState::new();

    let err = collector.run(&mut session).await.unwrap_err();

    assert!(err.to_string().contains("boom"));
    assert_eq!(collector.phase(), Phase::Done);
    let snapshot = read_snapshot(&session_file).unwrap().unwrap();
    assert_eq!(snapshot.matched_records.len(), 1);
    assert_eq!(snapshot.stats.matched, 1);
}

#[tokio::test]
async fn pause_suspends_cycles_until_resume() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .cycle(vec![matching_item("100")])
        .end_cycle();
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&dir.path().join("session.json")),
    );
    let flags = collector.flags();
    flags.request_pause();
    tokio::spawn({
        let flags = flags.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flags.request_resume();
        }
    });

    let started = std::time::Instant::now();
    let mut session = SessionState::new();
    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::TerminalMarker);
    assert_eq!(outcome.cycles, 1);
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[tokio::test]
async fn stop_during_pause_wins_over_resume() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .cycle(vec![matching_item("100")])
        .end_cycle();
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&dir.path().join("session.json")),
    );
    let flags = collector.flags();
    flags.request_pause();
    tokio::spawn({
        let flags = flags.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flags.request_stop();
        }
    });

    let mut session = SessionState::new();
    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::StopRequested);
    assert_eq!(outcome.cycles, 0);
    assert!(!outcome.reason.is_complete());
    assert_eq!(session.stats.collected, 0);
}

#[tokio::test]
async fn cycle_budget_stops_the_loop() {
    let dir = tempdir().unwrap();
    let feed = ScriptedFeed::new()
        .cycle(vec![plain_item("1")])
        .cycle(vec![plain_item("2")])
        .cycle(vec![plain_item("3")])
        .cycle(vec![plain_item("4")]);
    let mut cfg = fast_cfg(&dir.path().join("session.json"));
    cfg.max_cycles = 3;
    let mut collector = Collector::new(feed, RuleSet::default(), cfg);
    let mut session = SessionState::new();

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::CycleBudget);
    assert_eq!(outcome.cycles, 3);
    assert!(outcome.reason.is_complete());
    assert_eq!(session.stats.collected, 3);
}

#[tokio::test]
async fn resumed_session_never_reappends_matches() {
    let dir = tempdir().unwrap();
    let session_file = dir.path().join("session.json");

    let feed = ScriptedFeed::new()
        .cycle(vec![matching_item("100")])
        .cycle(vec![]);
    let mut cfg = fast_cfg(&session_file);
    cfg.max_cycles = 1;
    let mut collector = Collector::new(feed, RuleSet::default(), cfg);
    let mut session = SessionState::new();
    collector.run(&mut session).await.unwrap();
    assert_eq!(session.matched().len(), 1);

    // Second run re-serves the same record; it must come back as a
    // duplicate, not a second match.
    let feed = ScriptedFeed::new()
        .cycle(vec![matching_item("100")])
        .end_cycle();
    let mut collector = Collector::new(
        feed,
        RuleSet::default(),
        fast_cfg(&session_file),
    );
    let mut session = SessionState::resume(&session_file, ResumeMode::Full);

    let outcome = collector.run(&mut session).await.unwrap();

    assert_eq!(outcome.reason, StopReason::TerminalMarker);
    assert_eq!(session.matched().len(), 1);
    assert_eq!(session.stats.matched, 1);
    assert_eq!(session.stats.duplicates, 1);
}
