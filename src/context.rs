use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One named key group of an [`EvaluationContext`]: a mapping of identifier names to values,
/// e.g. `{"id": "comp_123"}`.
///
/// `BTreeMap` keeps keys sorted, so serialization is canonical by construction.
pub type ContextKeys = BTreeMap<String, String>;

/// Identifies *who* flags are evaluated for: optional `company` and `user` key groups.
///
/// Two contexts are equal iff their canonical (sorted-key) JSON serializations are equal;
/// because the key groups are sorted maps, structural equality and canonical-serialization
/// equality coincide, and reordering keys within a group never makes two contexts differ.
///
/// # Examples
/// ```
/// # use schematic::EvaluationContext;
/// let context = EvaluationContext::new()
///     .with_company([("id".to_owned(), "comp_123".to_owned())].into_iter().collect())
///     .with_user([("id".to_owned(), "user_456".to_owned())].into_iter().collect());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationContext {
    /// Identifying keys for the company the flags are evaluated against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<ContextKeys>,
    /// Identifying keys for the user the flags are evaluated against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ContextKeys>,
}

impl EvaluationContext {
    /// Create an empty context. An empty context is valid and may be sent to the server.
    pub fn new() -> EvaluationContext {
        EvaluationContext::default()
    }

    /// Set the company key group.
    pub fn with_company(mut self, keys: ContextKeys) -> EvaluationContext {
        self.company = Some(keys);
        self
    }

    /// Set the user key group.
    pub fn with_user(mut self, keys: ContextKeys) -> EvaluationContext {
        self.user = Some(keys);
        self
    }

    /// Returns true if neither key group is set.
    pub fn is_empty(&self) -> bool {
        self.company.is_none() && self.user.is_none()
    }

    /// Canonical string form of this context, used as the cache key and for
    /// change detection in `set_context`.
    pub fn canonical_key(&self) -> String {
        // Serializing string maps cannot fail.
        serde_json::to_string(self).expect("EvaluationContext serialization should not fail")
    }
}
