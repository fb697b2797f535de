//! Per-agent retrieval settings.
//!
//! An agent is any caller that searches on an owner's behalf and identifies
//! itself with an agent id. Its saved settings supply the search defaults
//! and can switch retrieval off for that agent entirely.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Default minimum cosine similarity for search results.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;

/// Saved retrieval settings of one agent, scoped to an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub agent_id: String,
    pub owner_id: Uuid,

    /// Searches for a disabled agent are refused
    pub enabled: bool,

    pub limit: usize,
    pub threshold: f32,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

/// Partial settings change. `None` keeps the saved value, or the default
/// when nothing is saved yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgentSettingsUpdate {
    pub enabled: Option<bool>,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
}

impl AgentSettingsUpdate {
    /// True when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.limit.is_none() && self.threshold.is_none()
    }
}

/// Check a result limit and similarity threshold.
///
/// # Errors
///
/// `InvalidParameter` for a zero limit or a threshold outside [-1, 1].
pub fn validate_retrieval(limit: usize, threshold: f32) -> Result<()> {
    if limit == 0 {
        return Err(Error::InvalidParameter("limit must be greater than 0".into()));
    }
    if !(-1.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidParameter(format!(
            "threshold must be between -1 and 1, got {threshold}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_retrieval() {
        assert!(validate_retrieval(1, -1.0).is_ok());
        assert!(validate_retrieval(DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD).is_ok());
        assert!(matches!(validate_retrieval(0, 0.5), Err(Error::InvalidParameter(_))));
        assert!(matches!(validate_retrieval(3, 1.01), Err(Error::InvalidParameter(_))));
        assert!(matches!(validate_retrieval(3, f32::NAN), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_empty_update() {
        assert!(AgentSettingsUpdate::default().is_empty());
        let update = AgentSettingsUpdate {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
