//! Plain-text rendering of daemon replies

use chrono::{DateTime, Local};
use detox_api::{
    CountdownView, Event, EventPayload, ProcessView, StateSnapshot, UnblockOutcome, UnblockTarget,
};
use detox_util::{format_clock_time, format_countdown, format_datetime_full, format_duration};
use std::fmt::Write;
use std::time::Duration;

fn minutes(d: Duration) -> u64 {
    d.as_secs() / 60
}

fn until(now: DateTime<Local>, end: DateTime<Local>) -> String {
    let remaining = (end - now).to_std().unwrap_or_default();
    format!("until {} ({} left)", format_clock_time(&end), format_duration(remaining))
}

pub fn target_label(target: &UnblockTarget) -> String {
    match target {
        UnblockTarget::App { name } => name.to_string(),
        UnblockTarget::Internet => "internet".into(),
    }
}

pub fn countdown_line(countdown: &CountdownView) -> String {
    format!(
        "{} unblocks in {}",
        target_label(&countdown.target),
        format_countdown(countdown.remaining)
    )
}

pub fn render_state(state: &StateSnapshot) -> String {
    let mut out = String::new();
    let now = state.now;

    let _ = writeln!(out, "As of {}", format_datetime_full(&now));
    let _ = writeln!(out, "Cooling period: {} min", minutes(state.cooling_period));

    match &state.internet {
        Some(block) => {
            let _ = writeln!(out, "Internet: blocked {}", until(now, block.end_time));
        }
        None => {
            let _ = writeln!(out, "Internet: allowed");
        }
    }

    if state.blocked_apps.is_empty() {
        let _ = writeln!(out, "Blocked apps: none");
    } else {
        let _ = writeln!(out, "Blocked apps:");
        for app in &state.blocked_apps {
            let source = match (app.manual, app.routine_ids.len()) {
                (true, 0) => "manual".to_string(),
                (true, n) => format!("manual + {} routine(s)", n),
                (false, n) => format!("{} routine(s)", n),
            };
            let _ = writeln!(out, "  {} {} [{}]", app.name, until(now, app.until), source);
        }
    }

    if !state.routines.is_empty() {
        let _ = writeln!(out, "Routines:");
        for routine in &state.routines {
            let apps: Vec<&str> = routine.apps.iter().map(|a| a.as_str()).collect();
            let _ = writeln!(
                out,
                "  {} {}-{} {} [{}]{}",
                routine.routine_id,
                routine.start,
                routine.end,
                routine.days.names().join(","),
                apps.join(", "),
                if routine.active { " (active)" } else { "" }
            );
        }
    }

    if !state.upcoming.is_empty() {
        let _ = writeln!(out, "Upcoming:");
        for instance in &state.upcoming {
            let apps: Vec<&str> = instance.apps.iter().map(|a| a.as_str()).collect();
            let _ = writeln!(
                out,
                "  {} {} - {} [{}]",
                instance.start.format("%a"),
                format_clock_time(&instance.start),
                format_clock_time(&instance.end),
                apps.join(", ")
            );
        }
    }

    for countdown in &state.countdowns {
        let _ = writeln!(out, "Pending: {}", countdown_line(countdown));
    }

    out
}

pub fn render_processes(processes: &[ProcessView]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>8}  NAME", "PID");
    for p in processes {
        let _ = writeln!(out, "{:>8}  {}", p.pid, p.name);
    }
    out
}

pub fn render_outcome(outcome: &UnblockOutcome) -> String {
    match outcome {
        UnblockOutcome::NoActiveBlock { target } => {
            format!("Nothing to unblock: {} is not blocked", target_label(target))
        }
        UnblockOutcome::CoolingDown { countdown } => {
            format!("Countdown started: {}", countdown_line(countdown))
        }
        UnblockOutcome::AlreadyCoolingDown { countdown } => {
            format!("Countdown already running: {}", countdown_line(countdown))
        }
        UnblockOutcome::Committed { target } => format!("{} unblocked", target_label(target)),
    }
}

pub fn render_event(event: &Event) -> String {
    let at = format_clock_time(&event.timestamp);
    let text = match &event.payload {
        EventPayload::StateChanged(state) => format!(
            "state: {} app(s) blocked, internet {}",
            state.blocked_apps.len(),
            if state.internet_blocked() { "blocked" } else { "allowed" }
        ),
        EventPayload::AppBlocked { name, until } => {
            format!("{} blocked until {}", name, format_clock_time(until))
        }
        EventPayload::InternetBlocked { until } => {
            format!("internet blocked until {}", format_clock_time(until))
        }
        EventPayload::RoutineAdded { routine_id } => format!("routine {} added", routine_id),
        EventPayload::RoutineRemoved { routine_id } => format!("routine {} removed", routine_id),
        EventPayload::UnblockCountdownStarted { countdown } => countdown_line(countdown),
        EventPayload::UnblockCancelled { target } => {
            format!("unblock of {} cancelled", target_label(target))
        }
        EventPayload::UnblockCommitted { target } => format!("{} unblocked", target_label(target)),
        EventPayload::CoolingPeriodChanged { cooling_period } => {
            format!("cooling period set to {} min", minutes(*cooling_period))
        }
        EventPayload::EnforcementStarted { name, until } => {
            format!("enforcing {} until {}", name, format_clock_time(until))
        }
        EventPayload::EnforcementStopped { name } => format!("stopped enforcing {}", name),
        EventPayload::NetworkEnforcement { blocked: true } => "network switched off".into(),
        EventPayload::NetworkEnforcement { blocked: false } => "network switched on".into(),
        EventPayload::Shutdown => "daemon shutting down".into(),
    };
    format!("[{}] {}", at, text)
}
