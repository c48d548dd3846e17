//! The incremental collection loop.
//!
//! Repeats snapshot -> extract -> dedup -> classify -> accumulate cycles
//! against a [`FeedDriver`], with adaptive pacing, rate-limit backoff,
//! periodic checkpointing, and cooperative pause/stop control. Single
//! threaded by construction: the loop suspends only at its sleep points,
//! so session state is never touched concurrently and a stop can never
//! land in the middle of a cycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};

use reelmark_common::{classify, Config, ReelmarkError, RuleSet};

use crate::extractor::{extract_records, LinkScanner};
use crate::feed::FeedDriver;
use crate::session::SessionState;

/// Multiplicative delay bump applied on every rate-limit signal.
const RATE_LIMIT_FACTOR: f64 = 1.5;
/// Jittered sleeps draw uniformly from +-30% of the current delay.
const JITTER_SPREAD: f64 = 0.3;

/// Collector lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Paused,
    RateLimitedBackoff,
    Stopping,
    Done,
}

/// Shared cooperative control handles. Cloneable so a signal handler or a
/// supervising task can request pause/stop while the loop runs.
#[derive(Clone, Default)]
pub struct ControlFlags {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl ControlFlags {
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::Relaxed);
    }

    pub fn request_resume(&self) {
        self.pause.store(false, Ordering::Relaxed);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::Relaxed)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator asked for a stop; the session stays resumable.
    StopRequested,
    /// Configured cycle budget reached.
    CycleBudget,
    /// The feed showed its end-of-content marker.
    TerminalMarker,
    /// Consecutive empty cycles hit the limit.
    Exhausted,
}

impl StopReason {
    /// Whether the run reached a natural end. Complete runs clear their
    /// session snapshot; an operator stop keeps it for resuming.
    pub fn is_complete(&self) -> bool {
        !matches!(self, StopReason::StopRequested)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectionOutcome {
    pub reason: StopReason,
    pub cycles: u32,
}

/// Loop tuning. All durations are real sleeps, so tests shrink them to
/// near zero.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub delay_increment: Duration,
    pub rate_limit_wait: Duration,
    pub batch_pause_every: u32,
    pub batch_pause: Duration,
    pub error_pause: Duration,
    pub save_every: u32,
    pub max_cycles: u32,
    pub empty_cycle_limit: u32,
    pub jitter: bool,
    pub continue_on_error: bool,
    pub session_file: PathBuf,
    pub pause_poll: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3_000),
            max_delay: Duration::from_millis(15_000),
            delay_increment: Duration::from_millis(1_000),
            rate_limit_wait: Duration::from_millis(60_000),
            batch_pause_every: 5,
            batch_pause: Duration::from_millis(30_000),
            error_pause: Duration::from_millis(60_000),
            save_every: 10,
            max_cycles: 500,
            empty_cycle_limit: 5,
            jitter: true,
            continue_on_error: true,
            session_file: PathBuf::from("reelmark_session.json"),
            pause_poll: Duration::from_millis(500),
        }
    }
}

impl CollectorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            delay_increment: Duration::from_millis(config.delay_increment_ms),
            rate_limit_wait: Duration::from_millis(config.rate_limit_wait_ms),
            batch_pause_every: config.batch_pause_every,
            batch_pause: Duration::from_millis(config.batch_pause_ms),
            save_every: config.save_every,
            max_cycles: config.max_cycles,
            empty_cycle_limit: config.empty_cycle_limit,
            session_file: config.session_file.clone(),
            ..Self::default()
        }
    }
}

pub struct Collector<D: FeedDriver> {
    driver: D,
    rules: RuleSet,
    scanner: LinkScanner,
    cfg: CollectorConfig,
    flags: ControlFlags,
    phase: Phase,
}

impl<D: FeedDriver> Collector<D> {
    pub fn new(driver: D, rules: RuleSet, cfg: CollectorConfig) -> Self {
        let scanner = LinkScanner::new(&rules.target_domains);
        Self {
            driver,
            rules,
            scanner,
            cfg,
            flags: ControlFlags::default(),
            phase: Phase::Idle,
        }
    }

    /// Handles for pausing or stopping this collector from outside.
    pub fn flags(&self) -> ControlFlags {
        self.flags.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run cycles until a termination condition fires. State is persisted
    /// on every exit path, including the fail-fast error return.
    pub async fn run(&mut self, session: &mut SessionState) -> Result<CollectionOutcome> {
        self.phase = Phase::Running;
        session.pacing.current_delay = self.cfg.base_delay;

        let mut cycle: u32 = 0;
        let reason = loop {
            if self.flags.stop_requested() {
                break StopReason::StopRequested;
            }
            if self.wait_if_paused().await {
                break StopReason::StopRequested;
            }

            cycle += 1;
            session.stats.cycles += 1;

            if self.driver.rate_limited().await {
                warn!(cycle, "Feed reports a rate limit");
                self.backoff(session).await;
                if let Err(err) = self.driver.advance().await {
                    error!(cycle, at = %Utc::now(), error = %err, "Advance failed after backoff");
                    if !self.cfg.continue_on_error {
                        self.shutdown(session);
                        return Err(err);
                    }
                }
                continue;
            }

            match self.run_cycle(cycle, session).await {
                Ok(new_records) => {
                    if new_records == 0 {
                        session.pacing.empty_cycles += 1;
                        if session.pacing.empty_cycles >= self.cfg.empty_cycle_limit {
                            info!(
                                cycle,
                                limit = self.cfg.empty_cycle_limit,
                                "No new records for several cycles, feed looks exhausted"
                            );
                            break StopReason::Exhausted;
                        }
                    } else {
                        session.pacing.empty_cycles = 0;
                    }
                }
                Err(err) if is_rate_limit(&err) => {
                    warn!(cycle, "Rate limited during cycle");
                    self.backoff(session).await;
                    continue;
                }
                Err(err) => {
                    error!(cycle, at = %Utc::now(), error = %err, "Cycle failed");
                    if !self.cfg.continue_on_error {
                        self.shutdown(session);
                        return Err(err);
                    }
                    tokio::time::sleep(self.cfg.error_pause).await;
                    continue;
                }
            }

            if self.driver.at_end().await {
                info!(cycle, "Feed reports its end marker");
                break StopReason::TerminalMarker;
            }
            if cycle >= self.cfg.max_cycles {
                info!(cycle, "Cycle budget reached");
                break StopReason::CycleBudget;
            }

            if self.cfg.save_every > 0 && cycle % self.cfg.save_every == 0 {
                self.persist_best_effort(session);
            }
            if self.cfg.batch_pause_every > 0 && cycle % self.cfg.batch_pause_every == 0 {
                info!(cycle, "Batch pause");
                tokio::time::sleep(self.cfg.batch_pause).await;
            }

            tokio::time::sleep(self.pacing_delay(session)).await;
            session.pacing.current_delay =
                (session.pacing.current_delay + self.cfg.delay_increment).min(self.cfg.max_delay);
        };

        self.shutdown(session);
        info!(
            cycles = cycle,
            reason = ?reason,
            matched = session.stats.matched,
            rate_limits = session.pacing.rate_limits,
            "Collection finished"
        );
        Ok(CollectionOutcome { reason, cycles: cycle })
    }

    /// One snapshot -> extract -> dedup -> classify -> accumulate pass,
    /// followed by the advance side effect.
    async fn run_cycle(&mut self, cycle: u32, session: &mut SessionState) -> Result<usize> {
        let items = self.driver.snapshot().await?;
        let records = extract_records(&items, &self.scanner, Utc::now());

        let mut new_records = 0usize;
        let mut matched = 0usize;
        let mut duplicates = 0usize;
        for mut record in records {
            record.is_duplicate = !session.observe(&record.id);
            if record.is_duplicate {
                duplicates += 1;
                session.stats.duplicates += 1;
                continue;
            }
            new_records += 1;
            session.stats.collected += 1;

            let verdict = classify(&record, &self.rules);
            if verdict.matched {
                matched += 1;
                session.record_match(record, &verdict);
            }
        }

        self.driver.advance().await?;
        info!(
            cycle,
            items = items.len(),
            new = new_records,
            matched,
            duplicates,
            "Cycle complete"
        );
        Ok(new_records)
    }

    /// Poll-wait while paused. Returns true if a stop arrived during the
    /// pause; stop takes precedence over resuming.
    async fn wait_if_paused(&mut self) -> bool {
        if !self.flags.pause_requested() {
            return false;
        }
        self.phase = Phase::Paused;
        info!("Collection paused");
        while self.flags.pause_requested() {
            if self.flags.stop_requested() {
                return true;
            }
            tokio::time::sleep(self.cfg.pause_poll).await;
        }
        self.phase = Phase::Running;
        info!("Collection resumed");
        false
    }

    /// One long fixed wait after a rate-limit signal, with the inter-cycle
    /// delay bumped multiplicatively for the cycles that follow.
    async fn backoff(&mut self, session: &mut SessionState) {
        self.phase = Phase::RateLimitedBackoff;
        session.pacing.rate_limits += 1;
        session.pacing.current_delay = session
            .pacing
            .current_delay
            .mul_f64(RATE_LIMIT_FACTOR)
            .min(self.cfg.max_delay);
        warn!(
            wait_ms = self.cfg.rate_limit_wait.as_millis() as u64,
            next_delay_ms = session.pacing.current_delay.as_millis() as u64,
            "Backing off"
        );
        tokio::time::sleep(self.cfg.rate_limit_wait).await;
        self.phase = Phase::Running;
    }

    fn pacing_delay(&self, session: &SessionState) -> Duration {
        let delay = session.pacing.current_delay;
        if !self.cfg.jitter {
            return delay;
        }
        delay.mul_f64(rand::rng().random_range(1.0 - JITTER_SPREAD..1.0 + JITTER_SPREAD))
    }

    fn persist_best_effort(&self, session: &SessionState) {
        if let Err(err) = session.persist(&self.cfg.session_file) {
            warn!(error = %err, "Failed to persist session");
        }
    }

    fn shutdown(&mut self, session: &SessionState) {
        self.phase = Phase::Stopping;
        self.persist_best_effort(session);
        self.phase = Phase::Done;
    }
}

fn is_rate_limit(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ReelmarkError>(),
        Some(ReelmarkError::RateLimited)
    )
}
