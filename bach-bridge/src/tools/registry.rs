//! Name lookup over the static catalog

use std::collections::HashMap;

use serde_json::Value;

use super::catalog::{ToolKind, ToolSpec, CATALOG};
use crate::config::ToolTier;
use crate::error::{BridgeError, Result};

/// Immutable lookup table built once at startup
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    by_name: HashMap<&'static str, &'static ToolSpec>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let by_name = CATALOG.iter().map(|spec| (spec.name(), spec)).collect();
        Self { by_name }
    }

    /// Find a tool by the name the model used
    pub fn resolve(&self, name: &str) -> Result<&'static ToolSpec> {
        self.by_name
            .get(name.trim())
            .copied()
            .ok_or_else(|| BridgeError::ToolNotFound(name.to_string()))
    }

    pub fn spec(&self, kind: ToolKind) -> Option<&'static ToolSpec> {
        self.by_name.get(kind.name()).copied()
    }

    /// Tools visible at `tier`, in catalog order
    pub fn visible(&self, tier: ToolTier) -> impl Iterator<Item = &'static ToolSpec> {
        CATALOG.iter().filter(move |spec| spec.advertised_at(tier))
    }

    /// Function schemas to hand to the chat backend
    pub fn advertised(&self, tier: ToolTier) -> Vec<Value> {
        self.visible(tier).map(ToolSpec::function_schema).collect()
    }

    pub fn names(&self, tier: ToolTier) -> Vec<&'static str> {
        self.visible(tier).map(ToolSpec::name).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
