//! Persistence media
//!
//! The store only needs a synchronous string-keyed get/set/remove surface.
//! Media are assumed single-writer: nothing here coordinates concurrent
//! writers to the same key.

mod dir;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use dir::DirMedium;
pub use memory::MemoryMedium;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMedium;

use crate::error::MediumError;

pub trait KeyValueMedium {
    /// Stored value for `key`, `Ok(None)` if absent
    fn get(&self, key: &str) -> Result<Option<String>, MediumError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), MediumError>;

    /// Removing an absent key is not an error
    fn remove(&mut self, key: &str) -> Result<(), MediumError>;
}

impl<M: KeyValueMedium + ?Sized> KeyValueMedium for Box<M> {
    fn get(&self, key: &str) -> Result<Option<String>, MediumError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), MediumError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), MediumError> {
        (**self).remove(key)
    }
}
