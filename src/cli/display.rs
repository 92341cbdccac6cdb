//! Display utilities for the Tomato CLI.
//!
//! This module provides formatted output for:
//! - Action results
//! - Error messages
//! - Status display and the one-line status
//! - Daily and weekly statistics

use chrono::{Datelike, Duration, NaiveDate};

use crate::types::{Action, Phase, RunState, StatusPayload};

/// Printed by `line` when no daemon answers.
pub const OFFLINE_LINE: &str = "⏹ --:--";

const WEEKDAY_LABELS: [&str; 7] = ["M", "T", "W", "T", "F", "S", "S"];

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the result of a mutating action.
    pub fn show_action_result(action: Action, status: &StatusPayload) {
        println!("{}", Self::format_action_result(action, status));
    }

    /// Shows the current timer status.
    pub fn show_status(status: &StatusPayload) {
        println!("{}", Self::format_status(status));
    }

    /// Shows the one-line status.
    pub fn show_line(status: &StatusPayload) {
        println!("{}", Self::format_line(status));
    }

    /// Shows today's progress and the trailing week.
    pub fn show_stats(status: &StatusPayload, today: NaiveDate) {
        println!("{}", Self::format_stats(status, today));
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    /// One sentence describing what an action did.
    pub fn format_action_result(action: Action, status: &StatusPayload) -> String {
        match action {
            Action::Start | Action::Resume => match status.run_state {
                RunState::Running => format!(
                    "> {} running, {} left",
                    Self::phase_label(status.phase),
                    status.remaining
                ),
                _ => format!("Timer is {}", status.run_state),
            },
            Action::Pause => match status.run_state {
                RunState::Paused => format!("|| Paused with {} left", status.remaining),
                _ => format!("Timer is {}", status.run_state),
            },
            Action::Skip => format!(
                ">> Skipped to {} ({})",
                Self::phase_label(status.phase),
                status.remaining
            ),
            Action::Reset => format!("[] Timer reset ({})", status.remaining),
            Action::ToggleBlock => {
                format!("Blocking: {}", Self::on_off(status.block_enabled))
            }
            Action::ToggleAlwaysBlock => {
                format!("Always block: {}", Self::on_off(status.always_block))
            }
            Action::Status => Self::format_status(status),
        }
    }

    /// Multi-line status summary.
    pub fn format_status(status: &StatusPayload) -> String {
        let mut lines = vec![
            "Tomato status".to_string(),
            "─────────────────────────────".to_string(),
            format!("State:     {}", status.run_state),
            format!("Phase:     {}", Self::phase_label(status.phase)),
            format!("Remaining: {}", status.remaining),
            format!("Today:     {}/{}", status.intervals_today, status.daily_goal),
        ];
        let blocking = if status.block_enabled && status.always_block {
            "on (always)"
        } else {
            Self::on_off(status.block_enabled)
        };
        lines.push(format!("Blocking:  {}", blocking));
        lines.join("\n")
    }

    /// Compact status such as `🍅 24:59 ·3`.
    pub fn format_line(status: &StatusPayload) -> String {
        format!(
            "{} {} ·{}",
            Self::icon(status),
            status.remaining,
            status.intervals_today
        )
    }

    /// Today's count against the goal plus the trailing seven days.
    pub fn format_stats(status: &StatusPayload, today: NaiveDate) -> String {
        let days = status.week_values.len();
        let labels: String = (0..days)
            .map(|i| {
                let offset = i64::try_from(days - 1 - i).unwrap_or(0);
                let date = today - Duration::days(offset);
                let index = date.weekday().num_days_from_monday() as usize;
                format!("{:<3}", WEEKDAY_LABELS[index])
            })
            .collect();
        let counts: String = status
            .week_values
            .iter()
            .map(|count| format!("{:<3}", count))
            .collect();

        format!(
            "Today: {}/{} intervals\nWeek:  {}\n       {}",
            status.intervals_today,
            status.daily_goal,
            labels.trim_end(),
            counts.trim_end()
        )
    }

    fn icon(status: &StatusPayload) -> &'static str {
        if status.run_state == RunState::Paused {
            return "⏸";
        }
        match status.phase {
            Phase::Work => "🍅",
            Phase::ShortBreak | Phase::LongBreak => "☕",
        }
    }

    fn phase_label(phase: Phase) -> &'static str {
        match phase {
            Phase::Work => "Work",
            Phase::ShortBreak => "Short break",
            Phase::LongBreak => "Long break",
        }
    }

    fn on_off(flag: bool) -> &'static str {
        if flag {
            "on"
        } else {
            "off"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
