//! Identity-bound preferences session
//!
//! Wraps a `PreferencesStore` for one consumer (a window, a request handler,
//! a CLI run). The session keeps the current identity's record in memory,
//! updates it optimistically and writes every change through to the store.
//!
//! Login statistics are the exception: `login_info` and `record_login` go to
//! storage directly, and `record_login` re-reads the record afterwards.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::medium::KeyValueMedium;
use crate::recent::push_recent;
use crate::store::{with_field, PreferencesStore};
use crate::types::{ActivityKind, LoginInfo, PlanStatus, PlanType, PlanUpdate, UserPreferences};

/// Where the session is in its load lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No identity has been applied yet
    Uninitialized,
    /// Reloading after an identity change
    Loading,
    Ready,
}

type Observer = Box<dyn FnMut(&UserPreferences)>;

#[derive(Default)]
struct ObserverList {
    entries: RefCell<Vec<(u64, Observer)>>,
    /// Subscriptions dropped while `entries` was borrowed by `notify`
    dropped: RefCell<Vec<u64>>,
}

impl ObserverList {
    fn remove(&self, id: u64) {
        match self.entries.try_borrow_mut() {
            Ok(mut entries) => entries.retain(|(entry, _)| *entry != id),
            Err(_) => self.dropped.borrow_mut().push(id),
        }
    }

    fn purge_dropped(&self) {
        let dropped: Vec<u64> = self.dropped.borrow_mut().drain(..).collect();
        if !dropped.is_empty() {
            self.entries.borrow_mut().retain(|(id, _)| !dropped.contains(id));
        }
    }
}

/// Keeps an observer registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription removes the observer"]
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverList>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.remove(self.id);
        }
    }
}

type ActiveMemo = (PlanStatus, Option<DateTime<Utc>>, bool);

pub struct PreferencesSession<M: KeyValueMedium> {
    store: PreferencesStore<M>,
    identity: Option<String>,
    state: LoadState,
    preferences: UserPreferences,
    active_memo: Cell<Option<ActiveMemo>>,
    observers: Rc<ObserverList>,
    next_observer_id: u64,
}

impl<M: KeyValueMedium> PreferencesSession<M> {
    /// Session with no identity yet. Preferences read as defaults until
    /// `set_identity` is called.
    pub fn new(store: PreferencesStore<M>) -> Self {
        let preferences = store.defaults();
        Self {
            store,
            identity: None,
            state: LoadState::Uninitialized,
            preferences,
            active_memo: Cell::new(None),
            observers: Rc::new(ObserverList::default()),
            next_observer_id: 0,
        }
    }

    pub fn store(&self) -> &PreferencesStore<M> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PreferencesStore<M> {
        &mut self.store
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state != LoadState::Ready
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    /// Switch to a new identity (or to none) and reload.
    ///
    /// Setting the identity already in effect does nothing.
    pub fn set_identity(&mut self, identity: Option<String>) {
        if self.state != LoadState::Uninitialized && identity == self.identity {
            return;
        }
        self.state = LoadState::Loading;
        self.identity = identity;
        self.preferences = self.store.load(self.identity.as_deref());
        self.state = LoadState::Ready;
        log::debug!(
            "preferences ready for {}",
            self.identity.as_deref().unwrap_or("<no identity>")
        );
        self.notify();
    }

    /// Call `f` after every change to the in-memory record.
    pub fn observe(&mut self, f: impl FnMut(&UserPreferences) + 'static) -> Subscription {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.purge_dropped();
        self.observers.entries.borrow_mut().push((id, Box::new(f)));
        Subscription {
            id,
            observers: Rc::downgrade(&self.observers),
        }
    }

    // ------------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------------

    pub fn plan_type(&self) -> PlanType {
        self.preferences.plan.plan_type
    }

    /// Memoized on the plan's status and end date
    pub fn is_active_plan(&self) -> bool {
        let plan = &self.preferences.plan;
        if let Some((status, end_date, active)) = self.active_memo.get() {
            if status == plan.status && end_date == plan.end_date {
                return active;
            }
        }
        let active = plan.is_active_at(self.store.now());
        self.active_memo.set(Some((plan.status, plan.end_date, active)));
        active
    }

    /// Read live from storage, not from the in-memory record
    pub fn login_info(&mut self) -> LoginInfo {
        self.store.login_info(self.identity.as_deref())
    }

    /// False until loaded and without an identity
    pub fn check_feature(&self, tag: &str) -> bool {
        if self.state != LoadState::Ready || self.identity.is_none() {
            return false;
        }
        self.preferences.plan.has_feature(tag)
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Set one top-level field (camelCase name) in memory, then in storage.
    pub fn update_preference(&mut self, key: &str, value: Value) {
        match with_field(&self.preferences, key, value.clone()) {
            Ok(updated) => self.preferences = updated,
            Err(e) => {
                log::warn!("ignoring preference update '{key}': {e}");
                return;
            }
        }
        self.notify();
        self.store.update_field(key, value, self.identity.as_deref());
    }

    pub fn update_plan(&mut self, update: PlanUpdate) {
        update.apply_to(&mut self.preferences.plan);
        self.notify();
        self.store.update_plan(&update, self.identity.as_deref());
    }

    pub fn add_to_recent(&mut self, kind: ActivityKind, id: &str) {
        push_recent(self.preferences.recent_mut(kind), id);
        self.notify();
        self.store.add_recent_activity(kind, id, self.identity.as_deref());
    }

    pub fn enable_beta_feature(&mut self, tag: &str) {
        if !self.preferences.beta_features.iter().any(|f| f == tag) {
            self.preferences.beta_features.push(tag.to_string());
            self.notify();
        }
        self.store.enable_beta_feature(tag, self.identity.as_deref());
    }

    pub fn disable_beta_feature(&mut self, tag: &str) {
        self.preferences.beta_features.retain(|f| f != tag);
        self.notify();
        self.store.disable_beta_feature(tag, self.identity.as_deref());
    }

    /// Back to defaults, keeping account age and login count.
    pub fn reset_to_defaults(&mut self) {
        let mut fresh = self.store.defaults();
        fresh.account_created_at = self.preferences.account_created_at;
        fresh.login_count = self.preferences.login_count;
        fresh.last_login_at = self.store.now();
        self.preferences = fresh;
        self.notify();
        self.store.save(&self.preferences, self.identity.as_deref());
    }

    /// Record a login in storage and refresh the in-memory record from it.
    pub fn record_login(&mut self) {
        self.store.record_login(self.identity.as_deref());
        self.reload();
    }

    /// Replace the in-memory record with what storage holds now.
    pub fn reload(&mut self) {
        self.preferences = self.store.load(self.identity.as_deref());
        self.notify();
    }

    fn notify(&self) {
        self.observers.purge_dropped();
        {
            let mut entries = self.observers.entries.borrow_mut();
            for (id, observer) in entries.iter_mut() {
                if self.observers.dropped.borrow().contains(id) {
                    continue;
                }
                observer(&self.preferences);
            }
        }
        self.observers.purge_dropped();
    }
}
