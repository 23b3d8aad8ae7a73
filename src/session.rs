//! Session lifecycle
//!
//! Tracks a monitoring session through Inactive → Active ⇄ Paused → Ended,
//! accumulates per-frame aggregates, and persists through a `SessionStore`.
//! Persistence is best-effort: store failures are logged and never stall the
//! live pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::types::FatigueLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Inactive,
    Active,
    Paused,
    Ended,
}

/// Finalized aggregates persisted when a session ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Excluding paused time
    pub duration_secs: f64,
    pub mean_ear: f64,
    pub min_ear: f64,
    pub max_ear: f64,
    pub mean_blink_rate: f64,
    pub median_fatigue_level: FatigueLevel,
    pub total_blinks: u64,
    pub alert_count: u64,
    pub break_count: u64,
    pub ended_by_timeout: bool,
}

/// One periodic metrics flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub recorded_at: DateTime<Utc>,
    pub ear: f64,
    pub blink_rate: f64,
    pub fatigue_level: FatigueLevel,
    pub sample_count: u64,
}

/// A stored session, live or finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
    pub summary: Option<SessionSummary>,
    pub metrics: Vec<MetricsRecord>,
}

/// Persistence boundary for sessions
pub trait SessionStore {
    fn create_session(&mut self, user: &str, now: DateTime<Utc>) -> Result<String, EngineError>;
    fn end_session(&mut self, id: &str, summary: &SessionSummary) -> Result<(), EngineError>;
    fn log_metrics(&mut self, id: &str, record: &MetricsRecord) -> Result<(), EngineError>;
    fn recent_sessions(&self, user: &str, limit: usize)
        -> Result<Vec<SessionRecord>, EngineError>;
}

/// In-memory store, newest sessions first in `recent_sessions`
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: HashMap<String, SessionRecord>,
    order: Vec<String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&mut self, user: &str, now: DateTime<Utc>) -> Result<String, EngineError> {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            SessionRecord {
                session_id: id.clone(),
                user: user.to_string(),
                started_at: now,
                summary: None,
                metrics: Vec::new(),
            },
        );
        self.order.push(id.clone());
        Ok(id)
    }

    fn end_session(&mut self, id: &str, summary: &SessionSummary) -> Result<(), EngineError> {
        let record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::StoreError(format!("unknown session {id}")))?;
        record.summary = Some(summary.clone());
        Ok(())
    }

    fn log_metrics(&mut self, id: &str, record: &MetricsRecord) -> Result<(), EngineError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::StoreError(format!("unknown session {id}")))?;
        session.metrics.push(record.clone());
        Ok(())
    }

    fn recent_sessions(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, EngineError> {
        Ok(self
            .order
            .iter()
            .rev()
            .filter_map(|id| self.sessions.get(id))
            .filter(|r| r.user == user)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug)]
struct LiveSession {
    id: String,
    user: String,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    pause_started: Option<DateTime<Utc>>,
    total_paused: Duration,
    ear_values: Vec<f64>,
    blink_rates: Vec<f64>,
    fatigue_levels: Vec<FatigueLevel>,
    total_blinks: u64,
    alert_count: u64,
    break_count: u64,
    sample_count: u64,
}

/// Point-in-time view of the live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub state: SessionState,
    pub duration_secs: f64,
    pub active_duration_secs: f64,
    pub sample_count: u64,
    pub total_blinks: u64,
    pub alert_count: u64,
    pub break_count: u64,
}

/// Lifecycle manager over a `SessionStore`
pub struct SessionManager {
    config: SessionConfig,
    store: Box<dyn SessionStore>,
    state: SessionState,
    session: Option<LiveSession>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, store: Box<dyn SessionStore>) -> Self {
        Self {
            config,
            store,
            state: SessionState::Inactive,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Start a session for `user`. An already active session is force-ended
    /// first. If the store cannot create a record, the session falls back to
    /// a locally generated id and keeps running; later flushes against the
    /// unknown id will warn and be dropped.
    pub fn start(&mut self, user: &str, now: DateTime<Utc>) -> String {
        if matches!(self.state, SessionState::Active | SessionState::Paused) {
            warn!("starting a new session while one is active, force-ending the old one");
            self.end(now, false);
        }

        let id = match self.store.create_session(user, now) {
            Ok(id) => id,
            Err(e) => {
                warn!("session create failed, continuing unpersisted: {e}");
                Uuid::new_v4().to_string()
            }
        };

        info!("session {id} started for {user}");
        self.session = Some(LiveSession {
            id: id.clone(),
            user: user.to_string(),
            started_at: now,
            last_activity: now,
            pause_started: None,
            total_paused: Duration::zero(),
            ear_values: Vec::new(),
            blink_rates: Vec::new(),
            fatigue_levels: Vec::new(),
            total_blinks: 0,
            alert_count: 0,
            break_count: 0,
            sample_count: 0,
        });
        self.state = SessionState::Active;
        id
    }

    /// Pause the active session. Warns and no-ops in any other state.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.state != SessionState::Active {
            warn!("pause ignored in state {:?}", self.state);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.pause_started = Some(now);
        }
        self.state = SessionState::Paused;
    }

    /// Resume a paused session, accumulating the pause span.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.state != SessionState::Paused {
            warn!("resume ignored in state {:?}", self.state);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            if let Some(pause_started) = session.pause_started.take() {
                session.total_paused = session.total_paused + (now - pause_started);
            }
            session.last_activity = now;
        }
        self.state = SessionState::Active;
    }

    /// Record one frame's metrics. Samples arriving while not Active are
    /// dropped. Every Nth sample is flushed to the store.
    pub fn update_metrics(
        &mut self,
        ear: f64,
        blink_rate: f64,
        fatigue_level: FatigueLevel,
        blink_detected: bool,
        now: DateTime<Utc>,
    ) {
        if self.state != SessionState::Active {
            return;
        }
        let flush_every = self.config.flush_every_samples;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.last_activity = now;
        session.ear_values.push(ear);
        session.blink_rates.push(blink_rate);
        session.fatigue_levels.push(fatigue_level);
        if blink_detected {
            session.total_blinks += 1;
        }
        session.sample_count += 1;

        if flush_every > 0 && session.sample_count % flush_every as u64 == 0 {
            let record = MetricsRecord {
                recorded_at: now,
                ear,
                blink_rate,
                fatigue_level,
                sample_count: session.sample_count,
            };
            let id = session.id.clone();
            if let Err(e) = self.store.log_metrics(&id, &record) {
                warn!("metrics flush failed for session {id}: {e}");
            }
        }
    }

    pub fn record_alert(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.alert_count += 1;
        }
    }

    pub fn record_break(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.break_count += 1;
        }
    }

    /// Session duration in seconds. While paused the clock stops at the
    /// pause start; `exclude_pauses` additionally subtracts accumulated
    /// pause time.
    pub fn duration(&self, exclude_pauses: bool, now: DateTime<Utc>) -> f64 {
        let Some(session) = self.session.as_ref() else {
            return 0.0;
        };
        let reference = session.pause_started.unwrap_or(now);
        let mut elapsed = reference - session.started_at;
        if exclude_pauses {
            elapsed = elapsed - session.total_paused;
        }
        (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Force-end the session when inactivity exceeds the timeout. Returns
    /// the summary when a timeout fired.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> Option<SessionSummary> {
        if self.state != SessionState::Active {
            return None;
        }
        let idle = {
            let session = self.session.as_ref()?;
            now - session.last_activity
        };
        if idle <= Duration::seconds(self.config.timeout_secs as i64) {
            return None;
        }
        warn!("session timed out after {}s of inactivity", idle.num_seconds());
        self.end(now, true)
    }

    /// End the session, compute the summary, persist it, and transition to
    /// Ended. No-op with a warning when nothing is running.
    pub fn end_session(&mut self, now: DateTime<Utc>) -> Option<SessionSummary> {
        self.end(now, false)
    }

    fn end(&mut self, now: DateTime<Utc>, by_timeout: bool) -> Option<SessionSummary> {
        if !matches!(self.state, SessionState::Active | SessionState::Paused) {
            warn!("end ignored in state {:?}", self.state);
            return None;
        }
        let duration_secs = self.duration(true, now);
        let session = self.session.take()?;

        let summary = SessionSummary {
            session_id: session.id.clone(),
            user: session.user.clone(),
            started_at: session.started_at,
            ended_at: now,
            duration_secs,
            mean_ear: mean(&session.ear_values),
            min_ear: if session.ear_values.is_empty() {
                0.0
            } else {
                session.ear_values.iter().copied().fold(f64::INFINITY, f64::min)
            },
            max_ear: if session.ear_values.is_empty() {
                0.0
            } else {
                session
                    .ear_values
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max)
            },
            mean_blink_rate: mean(&session.blink_rates),
            median_fatigue_level: median_level(&session.fatigue_levels),
            total_blinks: session.total_blinks,
            alert_count: session.alert_count,
            break_count: session.break_count,
            ended_by_timeout: by_timeout,
        };

        if let Err(e) = self.store.end_session(&session.id, &summary) {
            warn!("failed to persist summary for session {}: {e}", session.id);
        }
        info!(
            "session {} ended after {:.0}s, {} blinks",
            session.id, summary.duration_secs, summary.total_blinks
        );
        self.state = SessionState::Ended;
        Some(summary)
    }

    /// Snapshot of the live session, `None` when nothing is running.
    pub fn current_stats(&self, now: DateTime<Utc>) -> Option<SessionStats> {
        let session = self.session.as_ref()?;
        Some(SessionStats {
            session_id: session.id.clone(),
            state: self.state,
            duration_secs: self.duration(false, now),
            active_duration_secs: self.duration(true, now),
            sample_count: session.sample_count,
            total_blinks: session.total_blinks,
            alert_count: session.alert_count,
            break_count: session.break_count,
        })
    }

    /// Recent sessions for `user`, newest first.
    pub fn recent_sessions(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, EngineError> {
        self.store.recent_sessions(user, limit)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median_level(levels: &[FatigueLevel]) -> FatigueLevel {
    if levels.is_empty() {
        return FatigueLevel::Normal;
    }
    let mut indices: Vec<usize> = levels.iter().map(|l| l.as_index()).collect();
    indices.sort_unstable();
    let mid = indices[indices.len() / 2];
    FatigueLevel::from_index(mid).unwrap_or(FatigueLevel::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default(), Box::new(MemorySessionStore::new()))
    }

    #[test]
    fn test_lifecycle_states() {
        let mut mgr = manager();
        assert_eq!(mgr.state(), SessionState::Inactive);

        mgr.start("alice", t0());
        assert_eq!(mgr.state(), SessionState::Active);

        mgr.pause(t0() + Duration::seconds(10));
        assert_eq!(mgr.state(), SessionState::Paused);

        mgr.resume(t0() + Duration::seconds(20));
        assert_eq!(mgr.state(), SessionState::Active);

        let summary = mgr.end_session(t0() + Duration::seconds(30)).unwrap();
        assert_eq!(mgr.state(), SessionState::Ended);
        assert!(!summary.ended_by_timeout);
    }

    #[test]
    fn test_invalid_transitions_no_op() {
        let mut mgr = manager();
        mgr.pause(t0());
        assert_eq!(mgr.state(), SessionState::Inactive);
        mgr.resume(t0());
        assert_eq!(mgr.state(), SessionState::Inactive);
        assert!(mgr.end_session(t0()).is_none());

        mgr.start("alice", t0());
        mgr.resume(t0()); // not paused
        assert_eq!(mgr.state(), SessionState::Active);
    }

    #[test]
    fn test_duration_with_and_without_pauses() {
        let mut mgr = manager();
        mgr.start("alice", t0());

        // 100s active, 50s paused, 20s active
        let pause_at = t0() + Duration::seconds(100);
        mgr.pause(pause_at);
        let resume_at = pause_at + Duration::seconds(50);
        mgr.resume(resume_at);
        let now = resume_at + Duration::seconds(20);

        assert!((mgr.duration(true, now) - 120.0).abs() < 0.01);
        assert!((mgr.duration(false, now) - 170.0).abs() < 0.01);
    }

    #[test]
    fn test_duration_frozen_while_paused() {
        let mut mgr = manager();
        mgr.start("alice", t0());
        mgr.pause(t0() + Duration::seconds(60));

        // Clock stops at the pause start no matter how far now advances
        let later = t0() + Duration::seconds(600);
        assert!((mgr.duration(false, later) - 60.0).abs() < 0.01);
        assert!((mgr.duration(true, later) - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_update_metrics_dropped_while_paused() {
        let mut mgr = manager();
        mgr.start("alice", t0());
        mgr.update_metrics(0.3, 15.0, FatigueLevel::Normal, false, t0());
        mgr.pause(t0() + Duration::seconds(1));

        let before = mgr.current_stats(t0() + Duration::seconds(2)).unwrap();
        mgr.update_metrics(0.3, 15.0, FatigueLevel::Normal, true, t0() + Duration::seconds(2));
        let after = mgr.current_stats(t0() + Duration::seconds(3)).unwrap();

        assert_eq!(before.sample_count, after.sample_count);
        assert_eq!(after.sample_count, 1);
        assert_eq!(after.total_blinks, 0);
    }

    #[test]
    fn test_metrics_flush_every_nth_sample() {
        let mut mgr =
            SessionManager::new(SessionConfig::default(), Box::new(MemorySessionStore::new()));
        let id = mgr.start("alice", t0());

        for i in 0..300 {
            let now = t0() + Duration::milliseconds(33 * i);
            mgr.update_metrics(0.3, 15.0, FatigueLevel::Normal, false, now);
        }

        let records = mgr.recent_sessions("alice", 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, id);
        // 300 samples at a 150-sample flush interval
        assert_eq!(records[0].metrics.len(), 2);
        assert_eq!(records[0].metrics[0].sample_count, 150);
        assert_eq!(records[0].metrics[1].sample_count, 300);
    }

    #[test]
    fn test_timeout_force_ends() {
        let mut mgr = manager();
        mgr.start("alice", t0());
        mgr.update_metrics(0.3, 15.0, FatigueLevel::Normal, false, t0());

        // Inside the timeout: nothing
        assert!(mgr.check_timeout(t0() + Duration::seconds(299)).is_none());

        let summary = mgr.check_timeout(t0() + Duration::seconds(301)).unwrap();
        assert!(summary.ended_by_timeout);
        assert_eq!(mgr.state(), SessionState::Ended);
    }

    #[test]
    fn test_timeout_not_checked_while_paused() {
        let mut mgr = manager();
        mgr.start("alice", t0());
        mgr.pause(t0() + Duration::seconds(1));
        assert!(mgr.check_timeout(t0() + Duration::seconds(1000)).is_none());
        assert_eq!(mgr.state(), SessionState::Paused);
    }

    #[test]
    fn test_start_force_ends_running_session() {
        let mut mgr = manager();
        let first = mgr.start("alice", t0());
        let second = mgr.start("alice", t0() + Duration::seconds(60));
        assert_ne!(first, second);
        assert_eq!(mgr.state(), SessionState::Active);

        // The first session was persisted with a summary
        let records = mgr.recent_sessions("alice", 10).unwrap();
        assert_eq!(records.len(), 2);
        let old = records.iter().find(|r| r.session_id == first).unwrap();
        assert!(old.summary.is_some());
    }

    #[test]
    fn test_summary_aggregates() {
        let mut mgr = manager();
        mgr.start("alice", t0());

        let ears = [0.2, 0.3, 0.4];
        let levels = [FatigueLevel::Normal, FatigueLevel::Moderate, FatigueLevel::Mild];
        for (i, (&ear, &level)) in ears.iter().zip(levels.iter()).enumerate() {
            let now = t0() + Duration::seconds(i as i64);
            mgr.update_metrics(ear, 12.0 + i as f64, level, true, now);
        }
        mgr.record_alert();
        mgr.record_break();

        let summary = mgr.end_session(t0() + Duration::seconds(10)).unwrap();
        assert!((summary.mean_ear - 0.3).abs() < 1e-9);
        assert!((summary.min_ear - 0.2).abs() < 1e-9);
        assert!((summary.max_ear - 0.4).abs() < 1e-9);
        assert!((summary.mean_blink_rate - 13.0).abs() < 1e-9);
        assert_eq!(summary.median_fatigue_level, FatigueLevel::Mild);
        assert_eq!(summary.total_blinks, 3);
        assert_eq!(summary.alert_count, 1);
        assert_eq!(summary.break_count, 1);
        assert!((summary.duration_secs - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_memory_store_recent_sessions_order_and_filter() {
        let mut store = MemorySessionStore::new();
        let a = store.create_session("alice", t0()).unwrap();
        let _b = store.create_session("bob", t0() + Duration::seconds(1)).unwrap();
        let c = store.create_session("alice", t0() + Duration::seconds(2)).unwrap();

        let recent = store.recent_sessions("alice", 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, c);
        assert_eq!(recent[1].session_id, a);

        let limited = store.recent_sessions("alice", 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].session_id, c);
    }

    #[test]
    fn test_memory_store_unknown_session_errors() {
        let mut store = MemorySessionStore::new();
        let record = MetricsRecord {
            recorded_at: t0(),
            ear: 0.3,
            blink_rate: 15.0,
            fatigue_level: FatigueLevel::Normal,
            sample_count: 1,
        };
        assert!(store.log_metrics("missing", &record).is_err());
    }

    #[test]
    fn test_median_level_even_count_takes_upper() {
        let levels = [
            FatigueLevel::Normal,
            FatigueLevel::Normal,
            FatigueLevel::Moderate,
            FatigueLevel::Severe,
        ];
        assert_eq!(median_level(&levels), FatigueLevel::Moderate);
        assert_eq!(median_level(&[]), FatigueLevel::Normal);
    }
}
