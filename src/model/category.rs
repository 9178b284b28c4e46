use serde::{Deserialize, Serialize};

/// A spending/income category in the user's pool.
///
/// Categories are created lazily by the resolver when no rule matches and
/// no pool entry fits; the caller is responsible for merging those into the
/// persisted pool. `label` is assumed unique (case-insensitive) per user.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub label: String,
    pub emoji: String,
    pub color: String,
    pub is_custom: bool,
}

impl Category {
    pub fn new(label: &str, emoji: &str, color: &str, is_custom: bool) -> Self {
        Self {
            id: format!("cat_{}", slug(label)),
            label: label.to_string(),
            emoji: emoji.to_string(),
            color: color.to_string(),
            is_custom,
        }
    }

    pub fn matches_label(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

/// Deterministic id fragment so the same lazily-created label maps to the
/// same id across runs.
fn slug(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
