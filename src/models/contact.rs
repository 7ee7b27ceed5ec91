use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A contact in a dispatch batch, already parsed upstream (CSV mechanics
/// stay at the upload boundary). `variables` holds any non-reserved columns
/// as custom key/value pairs for template rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Canonicalized phone (digits only).
    pub phone: String,
    pub name: Option<String>,
    pub document: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}
