//! Corrective migrations for records written by older clients
//!
//! Each migration is idempotent and reports whether it changed the record.
//! `run_all` applies them in order on every load.

use crate::types::{one_year_after, PlanType, UserPreferences, FREELANCE_BOOK_LIMIT};

/// Names of the migrations that changed the record
pub type Applied = Vec<&'static str>;

/// Freelance plans predating the single-book limit get the tag appended.
/// A plan with no features list at all is left alone.
pub fn freelance_book_limit(prefs: &mut UserPreferences) -> bool {
    let plan = &mut prefs.plan;
    if plan.plan_type != PlanType::Freelance {
        return false;
    }
    let Some(features) = plan.features.as_mut() else {
        return false;
    };
    if features.iter().any(|f| f == FREELANCE_BOOK_LIMIT) {
        return false;
    }
    features.push(FREELANCE_BOOK_LIMIT.to_string());
    true
}

/// Professional plans that recorded a start but no end run one year.
pub fn professional_end_date(prefs: &mut UserPreferences) -> bool {
    let plan = &mut prefs.plan;
    if plan.plan_type != PlanType::Professional || plan.end_date.is_some() {
        return false;
    }
    let Some(start) = plan.start_date else {
        return false;
    };
    match one_year_after(start) {
        Some(end) => {
            plan.end_date = Some(end);
            true
        }
        None => false,
    }
}

pub fn run_all(prefs: &mut UserPreferences) -> Applied {
    let mut applied = Vec::new();
    if freelance_book_limit(prefs) {
        applied.push("freelance_book_limit");
    }
    if professional_end_date(prefs) {
        applied.push("professional_end_date");
    }
    applied
}
