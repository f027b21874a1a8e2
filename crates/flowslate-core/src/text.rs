//! Opaque rich-text documents.
//!
//! The rich-text editor owns the document structure. We only store what it
//! hands us and give it back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rich-text document as produced by the external editor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText(Value);

impl RichText {
    pub fn from_raw(raw: Value) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}
