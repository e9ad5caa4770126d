//! `storyforge-prefs`: per-user preferences for the storyforge writing app.
//!
//! - `PreferencesStore`: load / default-fill / migrate / save of one
//!   `UserPreferences` record per identity over a `KeyValueMedium`
//! - `PreferencesSession`: the store bound to the signed-in identity, with an
//!   in-memory copy that is updated optimistically and written through
//!
//! Everything is synchronous and single-threaded. Storage failures never reach
//! the caller; they are logged and handed to the store's failure hook.

pub mod clock;
pub mod error;
pub mod medium;
pub mod migrate;
pub mod recent;
pub mod session;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{MediumError, PrefsError};
pub use medium::{DirMedium, KeyValueMedium, MemoryMedium};
#[cfg(feature = "sqlite")]
pub use medium::SqliteMedium;
pub use session::{LoadState, PreferencesSession, Subscription};
pub use store::{PreferencesStore, StoreFailure, StoreOp, DEFAULT_KEY_PREFIX};
pub use types::*;
