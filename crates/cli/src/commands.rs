// Command implementations
//
// Each command works on an already-bound PreferencesSession and writes its
// report to `out`, so tests can drive them against an in-memory medium.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;
use storyforge_prefs::store::with_field;
use storyforge_prefs::{ActivityKind, KeyValueMedium, Plan, PlanUpdate, PreferencesSession};

use crate::exit_codes::{EXIT_ERROR, EXIT_IMPORT_REJECTED, EXIT_STORAGE, EXIT_USAGE};

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_STORAGE, message: msg.into(), hint: None }
    }

    pub fn import_rejected(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_IMPORT_REJECTED,
            message: msg.into(),
            hint: Some("stored preferences were left unchanged".to_string()),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn write_err(e: std::io::Error) -> CliError {
    CliError::io(format!("cannot write output: {e}"))
}

/// Mutating commands need someone to mutate.
fn require_identity<M: KeyValueMedium>(session: &PreferencesSession<M>) -> Result<String, CliError> {
    session
        .identity()
        .map(str::to_owned)
        .ok_or_else(|| CliError::usage("no user given").with_hint("pass --user EMAIL or set STORYFORGE_USER"))
}

pub fn cmd_show<M: KeyValueMedium>(
    session: &PreferencesSession<M>,
    json: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let prefs = session.preferences();
    if json {
        let text = serde_json::to_string_pretty(prefs).map_err(|e| CliError::io(e.to_string()))?;
        return writeln!(out, "{text}").map_err(write_err);
    }

    let now = session.store().now();
    let plan = &prefs.plan;
    let term = match plan.days_remaining(now) {
        Some(days) => format!("{days} day(s) left"),
        None => "no end date".to_string(),
    };

    let mut report = String::new();
    report.push_str(&format!("user:        {}\n", session.identity().unwrap_or("(none, showing defaults)")));
    report.push_str(&format!(
        "plan:        {} / {} ({}, {term})\n",
        plan.plan_type,
        plan.status,
        if session.is_active_plan() { "active" } else { "inactive" },
    ));
    report.push_str(&format!("features:    {}\n", plan.features.as_deref().unwrap_or_default().join(", ")));
    report.push_str(&format!("logins:      {} (last {})\n", prefs.login_count, prefs.last_login_at.to_rfc3339()));
    report.push_str(&format!("account age: {} day(s)\n", prefs.account_age_days(now)));
    report.push_str(&format!("books:       {}\n", prefs.recent_books.join(", ")));
    report.push_str(&format!("stories:     {}\n", prefs.recent_stories.join(", ")));
    report.push_str(&format!("beta:        {}\n", prefs.beta_features.join(", ")));
    out.write_all(report.as_bytes()).map_err(write_err)
}

/// `value` is parsed as JSON; anything that isn't JSON is taken as a string.
pub fn cmd_set<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    key: &str,
    value: &str,
) -> Result<(), CliError> {
    require_identity(session)?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    // The session drops bad values silently; surface them here instead.
    with_field(session.preferences(), key, value.clone())
        .map_err(|e| CliError::usage(format!("cannot set '{key}': {e}")))?;

    session.update_preference(key, value);
    Ok(())
}

pub fn cmd_plan<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    update: PlanUpdate,
) -> Result<(), CliError> {
    require_identity(session)?;
    if update == PlanUpdate::default() {
        return Err(CliError::usage("nothing to change").with_hint("pass --type, --status, --start or --end"));
    }
    session.update_plan(update);
    Ok(())
}

/// Start a one-year professional term now.
pub fn cmd_upgrade<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    require_identity(session)?;
    let plan = Plan::professional_from(session.store().now());
    let end = plan.end_date;
    session.update_plan(PlanUpdate {
        plan_type: Some(plan.plan_type),
        status: Some(plan.status),
        start_date: plan.start_date,
        end_date: plan.end_date,
        features: plan.features,
    });
    let written = match end {
        Some(end) => writeln!(out, "professional until {}", end.to_rfc3339()),
        None => writeln!(out, "professional"),
    };
    written.map_err(write_err)
}

pub fn cmd_login<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    require_identity(session)?;
    session.record_login();
    let info = session.login_info();
    writeln!(out, "login #{} at {}", info.login_count, info.last_login_at.to_rfc3339()).map_err(write_err)
}

pub fn cmd_recent<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    kind: ActivityKind,
    id: &str,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    require_identity(session)?;
    session.add_to_recent(kind, id);
    writeln!(out, "{}", session.preferences().recent(kind).join(", ")).map_err(write_err)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaAction {
    Enable,
    Disable,
    Check,
}

pub fn cmd_beta<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    action: BetaAction,
    tag: &str,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let user = require_identity(session)?;
    match action {
        BetaAction::Enable => session.enable_beta_feature(tag),
        BetaAction::Disable => session.disable_beta_feature(tag),
        BetaAction::Check => {
            let enabled = session.store_mut().is_beta_feature_enabled(tag, Some(user.as_str()));
            return writeln!(out, "{tag}: {}", if enabled { "enabled" } else { "disabled" }).map_err(write_err);
        }
    }
    Ok(())
}

pub fn cmd_export<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    output: Option<PathBuf>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let user = session.identity().map(str::to_owned);
    let json = session
        .store_mut()
        .export_record(user.as_deref())
        .ok_or_else(|| CliError::io("could not serialize preferences"))?;

    match output {
        Some(path) => fs::write(&path, json + "\n")
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display()))),
        None => writeln!(out, "{json}").map_err(write_err),
    }
}

pub fn cmd_import<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    file: PathBuf,
) -> Result<(), CliError> {
    let user = require_identity(session)?;
    let json = fs::read_to_string(&file)
        .map_err(|e| CliError::usage(format!("cannot read {}: {e}", file.display())))?;

    session
        .store_mut()
        .import_record(&json, Some(user.as_str()))
        .map_err(|e| CliError::import_rejected(format!("{}: {e}", file.display())))?;
    session.reload();
    Ok(())
}

pub fn cmd_clear<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    yes: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let user = require_identity(session)?;
    if !yes {
        return Err(CliError::usage(format!("refusing to delete preferences for {user}"))
            .with_hint("pass --yes to confirm"));
    }
    session.store_mut().clear(Some(user.as_str()));
    writeln!(out, "cleared preferences for {user}").map_err(write_err)
}

pub fn cmd_age<M: KeyValueMedium>(
    session: &mut PreferencesSession<M>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let user = session.identity().map(str::to_owned);
    let days = session.store_mut().account_age_days(user.as_deref());
    writeln!(out, "{days}").map_err(write_err)
}

pub fn cmd_reset<M: KeyValueMedium>(session: &mut PreferencesSession<M>) -> Result<(), CliError> {
    require_identity(session)?;
    session.reset_to_defaults();
    Ok(())
}

/// RFC 3339 timestamp argument
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 timestamp (e.g. 2024-01-15T00:00:00Z): {e}"))
}
