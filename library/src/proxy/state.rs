use serde::{Deserialize, Serialize};

use crate::error::GhostError;
use crate::host::NodeId;

/// The part of a proxy that survives save and load. Results, timings,
/// warnings and the registry count are never persisted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyState {
    #[serde(default)]
    pub target_id: Option<NodeId>,
    #[serde(default)]
    pub auto_requeue: bool,
}

impl ProxyState {
    pub fn to_json(&self) -> Result<String, GhostError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, GhostError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_missing_fields_default() {
        let state = ProxyState::from_json("{}").unwrap();
        assert_eq!(state, ProxyState::default());
    }

    #[test]
    fn test_json_carries_both_fields() {
        let id = Uuid::new_v4();
        let state = ProxyState {
            target_id: Some(id),
            auto_requeue: true,
        };
        let json = state.to_json().unwrap();
        assert!(json.contains(&id.to_string()));
        assert!(json.contains("auto_requeue"));
        assert!(ProxyState::from_json("not json").is_err());
    }
}
