//! Alert engine
//!
//! Independently evaluated rules over the current frame metrics. Each rule
//! debounces itself: break reminders by an anti-spam gap, low-blink and
//! prolonged-focus by the presence of an undismissed active alert of the
//! same type, fatigue by a suppression window, duration milestones by the
//! full alert history (one-shot per threshold for the session's lifetime).

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::AlertConfig;
use crate::types::FatigueLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    BreakReminder,
    LowBlinkRate,
    ProlongedFocus,
    Fatigue,
    DurationMilestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A single raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub dismissed: bool,
    pub snoozed_until: Option<DateTime<Utc>>,
}

/// Counts reported by `statistics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total_triggered: u64,
    pub total_dismissed: u64,
    pub total_snoozed: u64,
    pub active_count: usize,
    /// Seconds until the next scheduled break reminder, if one is scheduled
    pub secs_until_next_break: Option<f64>,
}

/// Rule engine producing at most one alert per rule per evaluation
#[derive(Debug)]
pub struct AlertEngine {
    config: AlertConfig,
    active: Vec<Alert>,
    history: Vec<Alert>,
    next_break_time: Option<DateTime<Utc>>,
    last_break_reminder: Option<DateTime<Utc>>,
    triggered_count: u64,
    dismissed_count: u64,
    snoozed_count: u64,
}

impl AlertEngine {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            history: Vec::new(),
            next_break_time: None,
            last_break_reminder: None,
            triggered_count: 0,
            dismissed_count: 0,
            snoozed_count: 0,
        }
    }

    /// Evaluate all rules against the current metrics. Returns the alerts
    /// raised by this call.
    pub fn check_alerts(
        &mut self,
        blink_rate: f64,
        fatigue_level: FatigueLevel,
        session_duration_secs: f64,
        gaze_stability: f64,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        // First evaluation schedules the first break
        if self.next_break_time.is_none() {
            self.next_break_time =
                Some(now + Duration::minutes(self.config.break_interval_minutes as i64));
        }

        let mut raised = Vec::new();

        if let Some(alert) = self.check_break_reminder(now) {
            raised.push(alert);
        }
        if let Some(alert) = self.check_low_blink_rate(blink_rate, now) {
            raised.push(alert);
        }
        if let Some(alert) =
            self.check_prolonged_focus(gaze_stability, session_duration_secs, now)
        {
            raised.push(alert);
        }
        if let Some(alert) = self.check_fatigue(fatigue_level, now) {
            raised.push(alert);
        }
        raised.extend(self.check_duration_milestones(session_duration_secs, now));

        for alert in &raised {
            debug!("alert raised: {} ({:?})", alert.id, alert.severity);
            self.active.push(alert.clone());
            self.history.push(alert.clone());
            self.triggered_count += 1;
        }

        raised
    }

    fn check_break_reminder(&mut self, now: DateTime<Utc>) -> Option<Alert> {
        let due = self.next_break_time.is_some_and(|t| now >= t);
        if !due {
            return None;
        }
        let gap_ok = match self.last_break_reminder {
            Some(last) => {
                now - last >= Duration::seconds(self.config.break_reminder_min_gap_secs as i64)
            }
            None => true,
        };
        if !gap_ok {
            return None;
        }

        self.next_break_time =
            Some(now + Duration::minutes(self.config.break_interval_minutes as i64));
        self.last_break_reminder = Some(now);

        Some(Alert {
            id: format!("break_{}", now.timestamp()),
            alert_type: AlertType::BreakReminder,
            severity: AlertSeverity::Info,
            message: format!(
                "Time for a break: look at something {} seconds away from the screen",
                self.config.break_duration_secs
            ),
            created_at: now,
            dismissed: false,
            snoozed_until: None,
        })
    }

    fn check_low_blink_rate(&self, blink_rate: f64, now: DateTime<Utc>) -> Option<Alert> {
        if blink_rate >= self.config.low_blink_threshold {
            return None;
        }
        if self.has_active_undismissed(AlertType::LowBlinkRate) {
            return None;
        }

        let severity = if blink_rate < self.config.low_blink_warning_threshold {
            AlertSeverity::Warning
        } else {
            AlertSeverity::Info
        };

        Some(Alert {
            id: format!("blink_{}", now.timestamp()),
            alert_type: AlertType::LowBlinkRate,
            severity,
            message: format!("Low blink rate: {blink_rate:.1} blinks/min"),
            created_at: now,
            dismissed: false,
            snoozed_until: None,
        })
    }

    fn check_prolonged_focus(
        &self,
        gaze_stability: f64,
        session_duration_secs: f64,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if gaze_stability <= self.config.prolonged_focus_stability
            || session_duration_secs <= self.config.prolonged_focus_min_duration_secs as f64
        {
            return None;
        }
        if self.has_active_undismissed(AlertType::ProlongedFocus) {
            return None;
        }

        Some(Alert {
            id: format!("focus_{}", now.timestamp()),
            alert_type: AlertType::ProlongedFocus,
            severity: AlertSeverity::Info,
            message: "Prolonged screen focus detected, consider shifting your gaze".into(),
            created_at: now,
            dismissed: false,
            snoozed_until: None,
        })
    }

    fn check_fatigue(&self, level: FatigueLevel, now: DateTime<Utc>) -> Option<Alert> {
        if (level.as_index()) < 2 {
            return None;
        }

        // Suppressed while an undismissed fatigue alert from the window exists
        let window = Duration::seconds(self.config.fatigue_suppression_secs as i64);
        let suppressed = self.history.iter().any(|a| {
            a.alert_type == AlertType::Fatigue && !a.dismissed && now - a.created_at < window
        });
        if suppressed {
            return None;
        }

        let severity = if level == FatigueLevel::Severe {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        Some(Alert {
            id: format!("fatigue_{}", now.timestamp()),
            alert_type: AlertType::Fatigue,
            severity,
            message: format!("Eye fatigue detected: {}", level.as_str()),
            created_at: now,
            dismissed: false,
            snoozed_until: None,
        })
    }

    fn check_duration_milestones(
        &self,
        session_duration_secs: f64,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let minutes = session_duration_secs / 60.0;
        let mut raised = Vec::new();

        for &threshold in &self.config.duration_milestones_minutes {
            if minutes < threshold as f64 {
                continue;
            }
            let id = format!("duration_{threshold}");
            // One-shot for the whole session regardless of dismissal
            if self.history.iter().any(|a| a.id == id) {
                continue;
            }

            let severity = if threshold >= 120 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };

            raised.push(Alert {
                id,
                alert_type: AlertType::DurationMilestone,
                severity,
                message: format!("You have been working for {threshold} minutes"),
                created_at: now,
                dismissed: false,
                snoozed_until: None,
            });
        }

        raised
    }

    fn has_active_undismissed(&self, alert_type: AlertType) -> bool {
        self.active
            .iter()
            .any(|a| a.alert_type == alert_type && !a.dismissed)
    }

    /// Mark an alert dismissed. Idempotent; unknown ids are ignored.
    pub fn dismiss(&mut self, id: &str) {
        let mut newly_dismissed = false;
        for alert in self.active.iter_mut().chain(self.history.iter_mut()) {
            if alert.id == id && !alert.dismissed {
                alert.dismissed = true;
                newly_dismissed = true;
            }
        }
        if newly_dismissed {
            self.dismissed_count += 1;
        }
    }

    /// Snooze an alert for the configured duration. Snoozing a break
    /// reminder also pushes the next scheduled break out.
    pub fn snooze(&mut self, id: &str, now: DateTime<Utc>) {
        let until = now + Duration::minutes(self.config.snooze_minutes as i64);
        let mut snoozed_type = None;
        for alert in self.active.iter_mut().chain(self.history.iter_mut()) {
            if alert.id == id && !alert.dismissed {
                alert.snoozed_until = Some(until);
                snoozed_type = Some(alert.alert_type);
            }
        }
        if let Some(alert_type) = snoozed_type {
            self.snoozed_count += 1;
            if alert_type == AlertType::BreakReminder {
                self.next_break_time = Some(until);
            }
        }
    }

    /// Alerts currently demanding attention: undismissed and not snoozed.
    /// Expired snoozes are woken as a side effect.
    pub fn active_alerts(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        for alert in self.active.iter_mut() {
            if alert.snoozed_until.is_some_and(|t| now >= t) {
                alert.snoozed_until = None;
            }
        }
        self.active
            .iter()
            .filter(|a| !a.dismissed && a.snoozed_until.is_none())
            .cloned()
            .collect()
    }

    /// Drop dismissed active alerts older than `max_age_secs`. Undismissed
    /// alerts stay regardless of age, which also keeps their per-type
    /// duplicate suppression armed. History is untouched.
    pub fn clear_old(&mut self, max_age_secs: u32, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(max_age_secs as i64);
        self.active.retain(|a| a.created_at >= cutoff || !a.dismissed);
    }

    /// Full append-only history.
    pub fn history(&self) -> &[Alert] {
        &self.history
    }

    /// Counter and scheduling snapshot.
    pub fn statistics(&self, now: DateTime<Utc>) -> AlertStatistics {
        AlertStatistics {
            total_triggered: self.triggered_count,
            total_dismissed: self.dismissed_count,
            total_snoozed: self.snoozed_count,
            active_count: self
                .active
                .iter()
                .filter(|a| !a.dismissed && a.snoozed_until.map_or(true, |t| now >= t))
                .count(),
            secs_until_next_break: self
                .next_break_time
                .map(|t| ((t - now).num_milliseconds() as f64 / 1000.0).max(0.0)),
        }
    }

    /// Clear all alerts, counters, and break scheduling.
    pub fn reset(&mut self) {
        self.active.clear();
        self.history.clear();
        self.next_break_time = None;
        self.last_break_reminder = None;
        self.triggered_count = 0;
        self.dismissed_count = 0;
        self.snoozed_count = 0;
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
