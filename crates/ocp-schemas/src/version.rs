//! Schema versioning for persisted JSON files.
//!
//! Any missing `schema_version` field defaults to `1.0.0`; readers
//! migrate forward to [`SchemaVersion::CURRENT`] on load.

use serde::{Deserialize, Serialize};

pub const CURRENT: &str = "1.1.0";
const LEGACY_DEFAULT: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion(pub String);

impl SchemaVersion {
    pub const CURRENT: &'static str = CURRENT;

    pub fn current() -> Self {
        Self(CURRENT.to_string())
    }

    pub fn legacy_default() -> Self {
        Self(LEGACY_DEFAULT.to_string())
    }

    /// Migrate an older version string forward. Unknown versions are
    /// treated as the legacy default and migrated the same way.
    pub fn migrate(self) -> Self {
        match self.0.as_str() {
            CURRENT => self,
            _ => Self::current(),
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::legacy_default()
    }
}
