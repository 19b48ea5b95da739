//! # Scene Configuration
//!
//! Tunables for block sizing, directory growth and query caching.
//! Loaded once at startup from TOML; every field has a default.
//!
//! ```toml
//! block_capacity = 128
//! block_bytes = 32768
//! max_blocks = 4096
//! recycle_entity_indices = true
//! block_match = "first_fit"
//! cache_queries = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::Entity;
use crate::error::{EcsError, EcsResult};
use crate::memory::CACHE_LINE;

/// Default number of rows per block.
pub const DEFAULT_BLOCK_CAPACITY: usize = 128;

/// Default slab buffer size (32 KiB).
pub const DEFAULT_BLOCK_BYTES: usize = 32 * 1024;

/// Default upper bound on live blocks.
pub const DEFAULT_MAX_BLOCKS: usize = 4096;

/// How a block is picked among blocks with the same signature.
///
/// Archetype identity is always exact signature equality; the policy only
/// decides which same-signature block with spare rows receives an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockMatchPolicy {
    /// Lowest block id with a free row.
    #[default]
    FirstFit,
    /// Block with the most occupied rows that still has a free row.
    MostOccupied,
}

/// Storage configuration for a [`Scene`](crate::ecs::Scene).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    /// Maximum rows per block.
    pub block_capacity: usize,
    /// Payload bytes per block (one slab buffer).
    pub block_bytes: usize,
    /// Maximum simultaneously live blocks.
    pub max_blocks: usize,
    /// Reuse index slots of destroyed entities.
    pub recycle_entity_indices: bool,
    /// Selection among same-signature blocks.
    pub block_match: BlockMatchPolicy,
    /// Cache query block lists between structural mutations.
    pub cache_queries: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            block_bytes: DEFAULT_BLOCK_BYTES,
            max_blocks: DEFAULT_MAX_BLOCKS,
            recycle_entity_indices: true,
            block_match: BlockMatchPolicy::FirstFit,
            cache_queries: true,
        }
    }
}

impl SceneConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConfigLoad`] on malformed TOML and
    /// [`EcsError::InvalidConfig`] on inconsistent values.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EcsError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConfigLoad`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EcsError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks the values against each other.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> EcsResult<()> {
        if self.block_capacity == 0 {
            return Err(EcsError::InvalidConfig("block_capacity must be > 0".into()));
        }
        if self.block_capacity > u32::MAX as usize {
            return Err(EcsError::InvalidConfig("block_capacity must fit in u32".into()));
        }
        if self.max_blocks == 0 {
            return Err(EcsError::InvalidConfig("max_blocks must be > 0".into()));
        }
        if self.block_bytes == 0 || self.block_bytes % CACHE_LINE != 0 {
            return Err(EcsError::InvalidConfig(format!(
                "block_bytes must be a non-zero multiple of {CACHE_LINE}"
            )));
        }
        let entity_bytes = std::mem::size_of::<Entity>() * self.block_capacity;
        if entity_bytes > self.block_bytes {
            return Err(EcsError::InvalidConfig(format!(
                "entity array alone needs {entity_bytes} bytes, block_bytes is {}",
                self.block_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SceneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_capacity, 128);
        assert_eq!(config.block_bytes, 32 * 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SceneConfig::from_toml_str(
            "block_capacity = 64\nblock_match = \"most_occupied\"\n",
        )
        .unwrap();
        assert_eq!(config.block_capacity, 64);
        assert_eq!(config.block_match, BlockMatchPolicy::MostOccupied);
        assert_eq!(config.max_blocks, DEFAULT_MAX_BLOCKS);
        assert!(config.recycle_entity_indices);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = SceneConfig::from_toml_str("block_size = 3").unwrap_err();
        assert!(matches!(err, EcsError::ConfigLoad(_)));
    }

    #[test]
    fn test_rejects_unaligned_block_bytes() {
        let err = SceneConfig::from_toml_str("block_bytes = 1000").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_entity_array_overflow() {
        let config = SceneConfig {
            block_capacity: 1024,
            block_bytes: 4096,
            ..SceneConfig::default()
        };
        assert!(matches!(config.validate(), Err(EcsError::InvalidConfig(_))));
    }
}
