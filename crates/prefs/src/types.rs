//! Preference record types
//!
//! `UserPreferences` is the single persisted record per identity. Field names
//! serialize as camelCase so stored records and export files keep the shape
//! the web client has always written.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability tag every freelance plan must carry.
pub const FREELANCE_BOOK_LIMIT: &str = "up-to-1-book";

/// Maximum length of `recentBooks` / `recentStories`.
pub const RECENT_LIMIT: usize = 10;

// ============================================================================
// Plan
// ============================================================================

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    /// Local-only, single book
    #[default]
    Freelance,
    /// Cloud storage, unlimited books, yearly term
    Professional,
}

impl PlanType {
    /// Capability tags granted by a fresh plan of this type
    pub fn default_features(&self) -> Vec<String> {
        let tags: &[&str] = match self {
            PlanType::Freelance => &["local-storage", FREELANCE_BOOK_LIMIT],
            PlanType::Professional => &[
                "cloud-storage",
                "unlimited-books",
                "export-zip",
                "priority-support",
            ],
        };
        tags.iter().map(|t| t.to_string()).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Freelance => "freelance",
            PlanType::Professional => "professional",
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Active,
    Expired,
    Cancelled,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Active => write!(f, "active"),
            PlanStatus::Expired => write!(f, "expired"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A user's subscription plan.
///
/// Every field has a default so that a partially written plan object from an
/// older client still decodes. A plan without a features list keeps none and
/// is written back without one; it is not filled with the type's default set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(rename = "type", default)]
    pub plan_type: PlanType,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Ordered set of capability tags. `None` when the stored plan has no list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            plan_type: PlanType::Freelance,
            status: PlanStatus::Active,
            start_date: None,
            end_date: None,
            features: Some(PlanType::Freelance.default_features()),
        }
    }
}

impl Plan {
    /// Active professional plan running one year from `start`
    pub fn professional_from(start: DateTime<Utc>) -> Self {
        Self {
            plan_type: PlanType::Professional,
            status: PlanStatus::Active,
            start_date: Some(start),
            end_date: one_year_after(start),
            features: Some(PlanType::Professional.default_features()),
        }
    }

    /// Active iff status is active and the term has not ended.
    /// `end_date` itself still counts as active.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PlanStatus::Active && self.end_date.map_or(true, |end| now <= end)
    }

    /// Whole days left in the term (rounded up), `None` for open-ended plans
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        let end = self.end_date?;
        Some(ceil_days(end.signed_duration_since(now)).max(0))
    }

    pub fn has_feature(&self, tag: &str) -> bool {
        self.features.iter().flatten().any(|f| f == tag)
    }
}

/// Partial plan, shallow-merged into the stored plan. Unset fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanUpdate {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<PlanType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl PlanUpdate {
    pub fn apply_to(&self, plan: &mut Plan) {
        if let Some(plan_type) = self.plan_type {
            plan.plan_type = plan_type;
        }
        if let Some(status) = self.status {
            plan.status = status;
        }
        if let Some(start) = self.start_date {
            plan.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            plan.end_date = Some(end);
        }
        if let Some(features) = &self.features {
            plan.features = Some(features.clone());
        }
    }
}

// ============================================================================
// Preference enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the OS setting
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultView {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Rtf,
    Txt,
    Markdown,
    Zip,
}

/// Which recent-activity list an id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Book,
    Story,
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "book" => Ok(ActivityKind::Book),
            "story" => Ok(ActivityKind::Story),
            other => Err(format!("unknown activity kind '{other}' (expected book or story)")),
        }
    }
}

// ============================================================================
// UserPreferences
// ============================================================================

/// Per-user preference record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub plan: Plan,
    pub account_created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
    pub login_count: u64,

    // UI
    pub theme: Theme,
    pub sidebar_collapsed: bool,
    pub default_view: DefaultView,

    // Writing
    pub auto_save: bool,
    /// Seconds between auto-saves
    pub auto_save_interval: u32,
    pub font_size: u16,
    pub font_family: String,
    pub line_height: f32,
    pub word_count_goal: u32,

    // Notifications
    pub email_notifications: bool,
    pub browser_notifications: bool,
    pub weekly_digest: bool,

    // Export
    pub export_format: ExportFormat,
    pub include_metadata: bool,

    /// Most recent first, at most `RECENT_LIMIT`, no duplicates
    pub recent_books: Vec<String>,
    pub recent_stories: Vec<String>,

    pub beta_features: Vec<String>,
    pub experimental_features: Vec<String>,

    pub custom_settings: Map<String, Value>,

    /// Fields written by other client versions that this build does not know.
    /// Kept so a save never drops them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserPreferences {
    /// Fresh default record for a first-time user.
    ///
    /// Returns a new value on every call; there is no shared template to
    /// mutate.
    pub fn defaults_at(now: DateTime<Utc>) -> Self {
        Self {
            plan: Plan::default(),
            account_created_at: now,
            last_login_at: now,
            login_count: 1,
            theme: Theme::System,
            sidebar_collapsed: false,
            default_view: DefaultView::Grid,
            auto_save: true,
            auto_save_interval: 30,
            font_size: 16,
            font_family: "Georgia".to_string(),
            line_height: 1.6,
            word_count_goal: 1000,
            email_notifications: true,
            browser_notifications: false,
            weekly_digest: true,
            export_format: ExportFormat::Rtf,
            include_metadata: true,
            recent_books: Vec::new(),
            recent_stories: Vec::new(),
            beta_features: Vec::new(),
            experimental_features: Vec::new(),
            custom_settings: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn recent_mut(&mut self, kind: ActivityKind) -> &mut Vec<String> {
        match kind {
            ActivityKind::Book => &mut self.recent_books,
            ActivityKind::Story => &mut self.recent_stories,
        }
    }

    pub fn recent(&self, kind: ActivityKind) -> &[String] {
        match kind {
            ActivityKind::Book => &self.recent_books,
            ActivityKind::Story => &self.recent_stories,
        }
    }

    /// Whole days since the account was created, rounded up
    pub fn account_age_days(&self, now: DateTime<Utc>) -> i64 {
        ceil_days(now.signed_duration_since(self.account_created_at)).max(0)
    }
}

/// Login statistics, read live from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub login_count: u64,
    pub last_login_at: DateTime<Utc>,
    pub account_created_at: DateTime<Utc>,
    pub account_age_days: i64,
}

// ============================================================================
// Helpers
// ============================================================================

/// `start` plus one calendar year. Feb 29 clamps to Feb 28.
pub fn one_year_after(start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    start.checked_add_months(Months::new(12))
}

fn ceil_days(delta: chrono::Duration) -> i64 {
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    let ms = delta.num_milliseconds();
    -((-ms).div_euclid(DAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_serialize_camel_case() {
        let prefs = UserPreferences::defaults_at(at(2024, 3, 1));
        let json = serde_json::to_value(&prefs).unwrap();

        assert_eq!(json["plan"]["type"], "freelance");
        assert_eq!(json["plan"]["status"], "active");
        assert!(json["plan"].get("startDate").is_none());
        assert_eq!(json["accountCreatedAt"], "2024-03-01T00:00:00Z");
        assert_eq!(json["loginCount"], 1);
        assert!(json["recentBooks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_defaults_are_independent() {
        let now = at(2024, 3, 1);
        let mut a = UserPreferences::defaults_at(now);
        a.beta_features.push("outline-view".to_string());
        a.plan.features = None;

        let b = UserPreferences::defaults_at(now);
        assert!(b.beta_features.is_empty());
        assert!(b.plan.has_feature(FREELANCE_BOOK_LIMIT));
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let mut json = serde_json::to_value(UserPreferences::defaults_at(at(2024, 1, 1))).unwrap();
        json["legacyToolbar"] = serde_json::json!({"pinned": true});

        let parsed: UserPreferences = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.extra["legacyToolbar"]["pinned"], true);

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["legacyToolbar"]["pinned"], true);
    }

    #[test]
    fn test_partial_plan_decodes_with_defaults() {
        let plan: Plan = serde_json::from_str(r#"{"type": "professional"}"#).unwrap();
        assert_eq!(plan.plan_type, PlanType::Professional);
        assert_eq!(plan.status, PlanStatus::Active);
        assert!(plan.start_date.is_none());
        assert!(plan.features.is_none());
    }

    #[test]
    fn test_is_active_at_boundaries() {
        let now = at(2025, 6, 1);
        let mut plan = Plan::professional_from(at(2024, 6, 1));

        plan.end_date = Some(now - Duration::seconds(1));
        assert!(!plan.is_active_at(now));

        plan.end_date = Some(now + Duration::seconds(1));
        assert!(plan.is_active_at(now));

        plan.end_date = Some(now);
        assert!(plan.is_active_at(now));

        plan.end_date = None;
        assert!(plan.is_active_at(now));

        plan.status = PlanStatus::Cancelled;
        assert!(!plan.is_active_at(now));
    }

    #[test]
    fn test_professional_term_is_one_year() {
        let plan = Plan::professional_from(at(2024, 1, 15));
        assert_eq!(plan.end_date, Some(at(2025, 1, 15)));
        assert!(plan.has_feature("unlimited-books"));

        // Leap day clamps rather than rolling into March
        assert_eq!(one_year_after(at(2024, 2, 29)), Some(at(2025, 2, 28)));
    }

    #[test]
    fn test_days_remaining() {
        let start = at(2024, 1, 15);
        let plan = Plan::professional_from(start);

        assert_eq!(plan.days_remaining(at(2025, 1, 14)), Some(1));
        assert_eq!(plan.days_remaining(at(2025, 1, 14) + Duration::hours(1)), Some(1));
        assert_eq!(plan.days_remaining(at(2025, 2, 1)), Some(0));
        assert_eq!(Plan::default().days_remaining(start), None);
    }

    #[test]
    fn test_account_age_rounds_up() {
        let created = at(2024, 1, 1);
        let prefs = UserPreferences::defaults_at(created);

        assert_eq!(prefs.account_age_days(created), 0);
        assert_eq!(prefs.account_age_days(created + Duration::minutes(5)), 1);
        assert_eq!(prefs.account_age_days(created + Duration::days(3)), 3);
        assert_eq!(prefs.account_age_days(created + Duration::days(3) + Duration::seconds(1)), 4);
    }

    #[test]
    fn test_plan_update_keeps_unset_fields() {
        let mut plan = Plan::professional_from(at(2024, 1, 15));
        let update = PlanUpdate {
            status: Some(PlanStatus::Cancelled),
            ..Default::default()
        };
        update.apply_to(&mut plan);

        assert_eq!(plan.status, PlanStatus::Cancelled);
        assert_eq!(plan.plan_type, PlanType::Professional);
        assert_eq!(plan.end_date, Some(at(2025, 1, 15)));
    }
}
