//! Built-in component types every app gets for free, without needing a
//! plugin to register them.

use serde::{Deserialize, Serialize};

/// A display string carried by an entity, read by the blueprint loader's
/// debug output and by anything that wants a human-readable label for an
/// entity without round-tripping it through the entity ID itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Name {
    pub value: String,
}

impl Name {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}
