//! Operator registry
//!
//! Maps operator names to their metadata and, for local operators, the
//! behavior implementation. Remote operators are usually registered
//! metadata-only (palette listing); their execution goes through the
//! engine's generic job submit/poll path.

use std::collections::HashMap;
use std::sync::Arc;

use crate::behavior::OperatorBehavior;
use crate::descriptor::OperatorMetadata;

struct RegistryEntry {
    metadata: OperatorMetadata,
    behavior: Option<Arc<dyn OperatorBehavior>>,
}

/// Registry of operators keyed by functional name
pub struct OperatorRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl OperatorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a local operator behavior
    ///
    /// The metadata is taken from the behavior itself, keeping one source
    /// of truth for each operator's definition.
    pub fn register(&mut self, behavior: Arc<dyn OperatorBehavior>) {
        let metadata = behavior.metadata();
        self.entries.insert(
            metadata.name.clone(),
            RegistryEntry {
                metadata,
                behavior: Some(behavior),
            },
        );
    }

    /// Register an operator with metadata only (no local behavior)
    pub fn register_metadata(&mut self, metadata: OperatorMetadata) {
        self.entries.insert(
            metadata.name.clone(),
            RegistryEntry {
                metadata,
                behavior: None,
            },
        );
    }

    /// Get metadata for an operator
    pub fn get_metadata(&self, name: &str) -> Option<&OperatorMetadata> {
        self.entries.get(name).map(|e| &e.metadata)
    }

    /// Get the behavior for a local operator
    pub fn get_behavior(&self, name: &str) -> Option<Arc<dyn OperatorBehavior>> {
        self.entries.get(name).and_then(|e| e.behavior.clone())
    }

    /// Check if an operator is registered
    pub fn has_operator(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered metadata
    pub fn all_metadata(&self) -> Vec<&OperatorMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Metadata grouped by family (palette tree)
    pub fn metadata_by_family(&self) -> HashMap<String, Vec<&OperatorMetadata>> {
        let mut grouped: HashMap<String, Vec<&OperatorMetadata>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.metadata.family.clone())
                .or_default()
                .push(&entry.metadata);
        }
        grouped
    }

    /// All registered operator names
    pub fn operator_names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override same-named entries in `self`.
    pub fn merge(&mut self, other: OperatorRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
