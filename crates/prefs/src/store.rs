//! Per-user preferences store
//!
//! Records are keyed by `key_prefix + identity` in a `KeyValueMedium`.
//! Preferences are best-effort: no operation here panics or hands an error
//! back to the caller (except `import_record`, whose result is the caller's
//! only signal that a restore was rejected). Failures are logged and passed to
//! the optional failure hook, and the caller gets defaults or a silent no-op.
//!
//! Updates are read-merge-write of the whole record with last-writer-wins.
//! That is only correct while one context owns a given identity's record.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::error::PrefsError;
use crate::medium::KeyValueMedium;
use crate::migrate;
use crate::recent::push_recent;
use crate::types::{ActivityKind, LoginInfo, PlanUpdate, UserPreferences};

pub const DEFAULT_KEY_PREFIX: &str = "userPreferences_";

/// Logins closer together than this count as one session.
pub const LOGIN_DEBOUNCE_MINUTES: i64 = 30;

/// Fields an imported record must carry to be accepted
const REQUIRED_IMPORT_FIELDS: [&str; 2] = ["plan", "accountCreatedAt"];

/// Store operation, reported with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Load,
    Save,
    Update,
    UpdateField,
    UpdatePlan,
    RecordLogin,
    AddRecent,
    BetaFeature,
    Export,
    Import,
    Clear,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Save => "save",
            Self::Update => "update",
            Self::UpdateField => "update_field",
            Self::UpdatePlan => "update_plan",
            Self::RecordLogin => "record_login",
            Self::AddRecent => "add_recent",
            Self::BetaFeature => "beta_feature",
            Self::Export => "export",
            Self::Import => "import",
            Self::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// A failure the store swallowed
#[derive(Debug)]
pub struct StoreFailure<'a> {
    pub op: StoreOp,
    pub user: Option<&'a str>,
    pub error: &'a PrefsError,
}

/// Observability callback for swallowed failures
pub type FailureHook = Box<dyn Fn(&StoreFailure<'_>)>;

pub struct PreferencesStore<M: KeyValueMedium> {
    medium: M,
    clock: Box<dyn Clock>,
    key_prefix: String,
    failure_hook: Option<FailureHook>,
}

impl<M: KeyValueMedium> PreferencesStore<M> {
    pub fn new(medium: M) -> Self {
        Self {
            medium,
            clock: Box::new(SystemClock),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            failure_hook: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_failure_hook(mut self, hook: impl Fn(&StoreFailure<'_>) + 'static) -> Self {
        self.failure_hook = Some(Box::new(hook));
        self
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Storage key for an identity
    pub fn key_for(&self, user: &str) -> String {
        format!("{}{}", self.key_prefix, user)
    }

    /// A fresh default record stamped with the current time
    pub fn defaults(&self) -> UserPreferences {
        UserPreferences::defaults_at(self.now())
    }

    // ------------------------------------------------------------------------
    // Load / save
    // ------------------------------------------------------------------------

    /// Load the record for `user`, filling defaults and running migrations.
    ///
    /// A first-time user's default record is persisted. A migration that
    /// fires is persisted before returning, so a load may write.
    pub fn load(&mut self, user: Option<&str>) -> UserPreferences {
        let Some(user) = user else {
            return self.defaults();
        };
        match self.fetch(user) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                let prefs = self.defaults();
                self.save(&prefs, Some(user));
                prefs
            }
            Err(e) => {
                self.report(StoreOp::Load, Some(user), &e);
                self.defaults()
            }
        }
    }

    /// Overwrite the stored record. No-op without an identity.
    pub fn save(&mut self, prefs: &UserPreferences, user: Option<&str>) {
        let Some(user) = user else {
            return;
        };
        if let Err(e) = self.write(prefs, user) {
            self.report(StoreOp::Save, Some(user), &e);
        }
    }

    /// Remove the stored record (account deletion).
    pub fn clear(&mut self, user: Option<&str>) {
        let Some(user) = user else {
            return;
        };
        let key = self.key_for(user);
        if let Err(e) = self.medium.remove(&key) {
            self.report(StoreOp::Clear, Some(user), &e.into());
        }
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Set one top-level field (camelCase name) from JSON.
    ///
    /// A value that does not fit the field's type leaves the record untouched.
    pub fn update_field(&mut self, key: &str, value: Value, user: Option<&str>) {
        self.modify(StoreOp::UpdateField, user, |prefs, _| {
            *prefs = with_field(prefs, key, value)?;
            Ok(())
        });
    }

    /// Typed read-merge-write. Returns `None` when nothing was written.
    pub fn update<R>(&mut self, user: Option<&str>, f: impl FnOnce(&mut UserPreferences) -> R) -> Option<R> {
        self.modify(StoreOp::Update, user, |prefs, _| Ok(f(prefs)))
    }

    pub fn update_plan(&mut self, update: &PlanUpdate, user: Option<&str>) {
        self.modify(StoreOp::UpdatePlan, user, |prefs, _| {
            update.apply_to(&mut prefs.plan);
            Ok(())
        });
    }

    /// Stamp a login. Only a gap longer than `LOGIN_DEBOUNCE_MINUTES` since the last
    /// stamp counts as a new login.
    pub fn record_login(&mut self, user: Option<&str>) {
        self.modify(StoreOp::RecordLogin, user, |prefs, now| {
            let gap = now.signed_duration_since(prefs.last_login_at);
            if gap > Duration::minutes(LOGIN_DEBOUNCE_MINUTES) {
                prefs.login_count += 1;
                log::debug!("new login session (#{}) after {}m", prefs.login_count, gap.num_minutes());
            }
            prefs.last_login_at = now;
            Ok(())
        });
    }

    pub fn add_recent_activity(&mut self, kind: ActivityKind, id: &str, user: Option<&str>) {
        self.modify(StoreOp::AddRecent, user, |prefs, _| {
            push_recent(prefs.recent_mut(kind), id);
            Ok(())
        });
    }

    pub fn enable_beta_feature(&mut self, tag: &str, user: Option<&str>) {
        self.modify(StoreOp::BetaFeature, user, |prefs, _| {
            if !prefs.beta_features.iter().any(|f| f == tag) {
                prefs.beta_features.push(tag.to_string());
            }
            Ok(())
        });
    }

    pub fn disable_beta_feature(&mut self, tag: &str, user: Option<&str>) {
        self.modify(StoreOp::BetaFeature, user, |prefs, _| {
            prefs.beta_features.retain(|f| f != tag);
            Ok(())
        });
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn is_beta_feature_enabled(&mut self, tag: &str, user: Option<&str>) -> bool {
        self.load(user).beta_features.iter().any(|f| f == tag)
    }

    pub fn account_age_days(&mut self, user: Option<&str>) -> i64 {
        let now = self.now();
        self.load(user).account_age_days(now)
    }

    /// Login statistics, always read from storage
    pub fn login_info(&mut self, user: Option<&str>) -> LoginInfo {
        let now = self.now();
        let prefs = self.load(user);
        LoginInfo {
            login_count: prefs.login_count,
            last_login_at: prefs.last_login_at,
            account_created_at: prefs.account_created_at,
            account_age_days: prefs.account_age_days(now),
        }
    }

    // ------------------------------------------------------------------------
    // Backup / restore
    // ------------------------------------------------------------------------

    /// Pretty JSON of the loaded record
    pub fn export_record(&mut self, user: Option<&str>) -> Option<String> {
        let prefs = self.load(user);
        match serde_json::to_string_pretty(&prefs) {
            Ok(json) => Some(json),
            Err(e) => {
                self.report(StoreOp::Export, user, &e.into());
                None
            }
        }
    }

    /// Replace the stored record with an exported one.
    ///
    /// Rejected payloads leave the stored record as it was.
    pub fn import_record(&mut self, json: &str, user: Option<&str>) -> Result<(), PrefsError> {
        let result = self.try_import(json, user);
        if let Err(e) = &result {
            self.report(StoreOp::Import, user, e);
        }
        result
    }

    fn try_import(&mut self, json: &str, user: Option<&str>) -> Result<(), PrefsError> {
        let user = user.ok_or(PrefsError::NoIdentity)?;
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(fields) = &value else {
            return Err(PrefsError::NotAnObject);
        };
        if let Some(missing) = REQUIRED_IMPORT_FIELDS.iter().find(|f| !fields.contains_key(**f)) {
            return Err(PrefsError::MissingField(*missing));
        }

        let (mut prefs, _) = merge_over_defaults(self.defaults(), value)?;
        migrate::run_all(&mut prefs);
        self.write(&prefs, user)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Decode the stored record over defaults. `Ok(None)` if nothing stored.
    /// The flag is set when defaults filled in fields the record lacked.
    fn read(&self, user: &str) -> Result<Option<(UserPreferences, bool)>, PrefsError> {
        let Some(raw) = self.medium.get(&self.key_for(user))? else {
            return Ok(None);
        };
        let stored: Value = serde_json::from_str(&raw)?;
        merge_over_defaults(self.defaults(), stored).map(Some)
    }

    /// `read` plus migrations. A backfilled or migrated record is persisted
    /// so the next load sees the same values.
    fn fetch(&mut self, user: &str) -> Result<Option<UserPreferences>, PrefsError> {
        let Some((mut prefs, backfilled)) = self.read(user)? else {
            return Ok(None);
        };
        let applied = migrate::run_all(&mut prefs);
        if !applied.is_empty() {
            log::debug!("migrated preferences for {user}: {}", applied.join(", "));
        }
        if backfilled || !applied.is_empty() {
            self.save(&prefs, Some(user));
        }
        Ok(Some(prefs))
    }

    fn write(&mut self, prefs: &UserPreferences, user: &str) -> Result<(), PrefsError> {
        let json = serde_json::to_string(prefs)?;
        let key = self.key_for(user);
        self.medium.set(&key, &json)?;
        Ok(())
    }

    /// Read-merge-write. An unreadable record is reported and replaced: the
    /// change is applied to defaults and written over it.
    fn modify<R>(
        &mut self,
        op: StoreOp,
        user: Option<&str>,
        f: impl FnOnce(&mut UserPreferences, DateTime<Utc>) -> Result<R, PrefsError>,
    ) -> Option<R> {
        let user = user?;
        let mut prefs = match self.fetch(user) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => self.defaults(),
            Err(e) => {
                self.report(op, Some(user), &e);
                self.defaults()
            }
        };

        let now = self.now();
        let result = f(&mut prefs, now).and_then(|r| self.write(&prefs, user).map(|()| r));
        match result {
            Ok(r) => Some(r),
            Err(e) => {
                self.report(op, Some(user), &e);
                None
            }
        }
    }

    fn report(&self, op: StoreOp, user: Option<&str>, error: &PrefsError) {
        log::warn!(
            "preferences {op} failed for {}: {error}",
            user.unwrap_or("<no identity>")
        );
        if let Some(hook) = &self.failure_hook {
            hook(&StoreFailure { op, user, error });
        }
    }
}

/// Shallow merge: top-level fields of `stored` replace those of `defaults`.
/// Nested objects such as `plan` are replaced whole, not merged.
///
/// Also reports whether any default field was missing from `stored`.
pub(crate) fn merge_over_defaults(
    defaults: UserPreferences,
    stored: Value,
) -> Result<(UserPreferences, bool), PrefsError> {
    let Value::Object(stored) = stored else {
        return Err(PrefsError::NotAnObject);
    };
    let mut merged = serde_json::to_value(defaults)?;
    let Value::Object(base) = &mut merged else {
        return Err(PrefsError::NotAnObject);
    };
    let backfilled = base.keys().any(|k| !stored.contains_key(k));
    base.extend(stored);
    Ok((serde_json::from_value(merged)?, backfilled))
}

/// Copy of `prefs` with one top-level field replaced.
pub fn with_field(prefs: &UserPreferences, key: &str, value: Value) -> Result<UserPreferences, PrefsError> {
    let mut json = serde_json::to_value(prefs)?;
    let Value::Object(fields) = &mut json else {
        return Err(PrefsError::NotAnObject);
    };
    fields.insert(key.to_string(), value);
    Ok(serde_json::from_value(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::medium::MemoryMedium;
    use crate::types::Theme;
    use chrono::TimeZone;
    use serde_json::json;

    fn store() -> (PreferencesStore<MemoryMedium>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let store = PreferencesStore::new(MemoryMedium::new()).with_clock(clock.clone());
        (store, clock)
    }

    #[test]
    fn test_first_load_persists_defaults() {
        let (mut store, _clock) = store();
        let prefs = store.load(Some("ada@example.com"));

        assert_eq!(prefs, store.defaults());
        assert!(store.medium().get("userPreferences_ada@example.com").unwrap().is_some());
    }

    #[test]
    fn test_no_identity_writes_nothing() {
        let (mut store, _clock) = store();
        store.load(None);
        store.update_field("theme", json!("dark"), None);
        store.record_login(None);
        store.add_recent_activity(ActivityKind::Book, "1", None);

        assert!(store.medium().is_empty());
    }

    #[test]
    fn test_update_field_sets_one_field() {
        let (mut store, _clock) = store();
        let user = Some("ada@example.com");
        store.update_field("theme", json!("dark"), user);
        store.update_field("wordCountGoal", json!(2500), user);

        let prefs = store.load(user);
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.word_count_goal, 2500);
    }

    #[test]
    fn test_update_field_rejects_wrong_type() {
        let (mut store, _clock) = store();
        let user = Some("ada@example.com");
        store.update_field("fontSize", json!(20), user);
        store.update_field("fontSize", json!("huge"), user);

        assert_eq!(store.load(user).font_size, 20);
    }

    #[test]
    fn test_typed_update_returns_closure_result() {
        let (mut store, _clock) = store();
        let goal = store.update(Some("ada@example.com"), |prefs| {
            prefs.word_count_goal *= 2;
            prefs.word_count_goal
        });

        assert_eq!(goal, Some(2000));
        assert_eq!(store.load(Some("ada@example.com")).word_count_goal, 2000);
        assert_eq!(store.update(None, |prefs| prefs.word_count_goal), None);
    }

    /// Reads nothing, refuses every write
    struct ReadOnlyMedium;

    impl KeyValueMedium for ReadOnlyMedium {
        fn get(&self, _key: &str) -> Result<Option<String>, crate::error::MediumError> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), crate::error::MediumError> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied).into())
        }

        fn remove(&mut self, _key: &str) -> Result<(), crate::error::MediumError> {
            Ok(())
        }
    }

    #[test]
    fn test_typed_update_failure_reported_as_update() {
        let ops = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen = ops.clone();
        let mut store = PreferencesStore::new(ReadOnlyMedium)
            .with_failure_hook(move |failure| seen.borrow_mut().push(failure.op));

        assert_eq!(store.update(Some("ada@example.com"), |prefs| prefs.font_size), None);
        let defaults = store.defaults();
        store.save(&defaults, Some("ada@example.com"));

        assert_eq!(*ops.borrow(), vec![StoreOp::Update, StoreOp::Save]);
        assert_eq!(StoreOp::Update.to_string(), "update");
    }

    #[test]
    fn test_custom_prefix() {
        let (store, _clock) = store();
        let mut store = store.with_key_prefix("prefs:");
        store.load(Some("ada"));
        assert!(store.medium().get("prefs:ada").unwrap().is_some());
    }

    #[test]
    fn test_shallow_merge_replaces_nested_objects() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stored = json!({ "plan": { "type": "professional" }, "fontSize": 18 });
        let (merged, backfilled) = merge_over_defaults(UserPreferences::defaults_at(now), stored).unwrap();

        assert!(backfilled);
        assert_eq!(merged.font_size, 18);
        // Plan came from the stored object alone, not field-merged with the default plan
        assert!(merged.plan.features.is_none());
        assert_eq!(merged.word_count_goal, 1000);
    }
}
