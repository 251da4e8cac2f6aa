//! Connector type compatibility
//!
//! The matrix maps a source type name to the set of destination type names
//! it may feed. It is fetched once from the backend when a session opens
//! and treated as immutable afterwards; `is_allowed` is queried on every
//! wiring attempt, never cached per connection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::Result;

/// Type compatibility matrix
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeCompatibility {
    matrix: HashMap<String, Vec<String>>,
}

impl TypeCompatibility {
    /// Build from an explicit mapping (tests, offline use)
    pub fn from_map(matrix: HashMap<String, Vec<String>>) -> Self {
        Self { matrix }
    }

    /// Fetch the matrix from the backend
    pub async fn fetch(backend: &dyn Backend) -> Result<Self> {
        let matrix = backend.type_compatibility().await?;
        log::debug!("type compatibility matrix loaded ({} source types)", matrix.len());
        Ok(Self { matrix })
    }

    /// Check whether an output of type `source` may feed an input of type `dest`
    ///
    /// Identical types are always allowed; otherwise `dest` must be listed
    /// as reachable from `source`.
    pub fn is_allowed(&self, source: &str, dest: &str) -> bool {
        source == dest
            || self
                .matrix
                .get(source)
                .is_some_and(|targets| targets.iter().any(|t| t == dest))
    }

    /// Destination types reachable from `source`, not counting itself
    pub fn reachable_from(&self, source: &str) -> &[String] {
        self.matrix.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> TypeCompatibility {
        TypeCompatibility::from_map(HashMap::from([
            (
                "ts_list".to_string(),
                vec!["list".to_string(), "number".to_string()],
            ),
            ("number".to_string(), vec![]),
        ]))
    }

    #[test]
    fn test_same_type_always_allowed() {
        let compat = matrix();
        assert!(compat.is_allowed("ts_list", "ts_list"));
        // Even for types absent from the matrix
        assert!(compat.is_allowed("table", "table"));
    }

    #[test]
    fn test_matrix_entry_allowed() {
        let compat = matrix();
        assert!(compat.is_allowed("ts_list", "list"));
        assert!(compat.is_allowed("ts_list", "number"));
    }

    #[test]
    fn test_unlisted_pair_rejected() {
        let compat = matrix();
        assert!(!compat.is_allowed("ts_list", "table"));
        assert!(!compat.is_allowed("number", "ts_list"));
        assert!(!compat.is_allowed("table", "ts_list"));
    }
}
