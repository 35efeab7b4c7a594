//! # Tags
//!
//! Ordered key/value annotations attached to transaction and block results.
//! Order is part of the consensus-visible result and is never re-sorted.

use serde::{Deserialize, Serialize};

/// Well-known tag keys.
pub mod keys {
    pub const ACTION: &str = "action";
    pub const SENDER: &str = "sender";
    pub const RECIPIENT: &str = "recipient";
    pub const VALIDATOR: &str = "validator";
    pub const DELEGATOR: &str = "delegator";
    pub const SRC_VALIDATOR: &str = "source-validator";
    pub const DST_VALIDATOR: &str = "destination-validator";
    pub const PROPOSAL_ID: &str = "proposal-id";
    pub const PROPOSAL_RESULT: &str = "proposal-result";
    pub const MINT_COIN: &str = "mint-coin";
    pub const REWARD: &str = "reward";
    pub const COMMUNITY_POOL: &str = "community-pool";
    pub const SLASH_REASON: &str = "slash-reason";
    pub const JAILED: &str = "jailed";
    pub const END_HEIGHT: &str = "end-height";
    pub const REQUEST_ID: &str = "request-id";
    pub const UPGRADE_VERSION: &str = "upgrade-version";
    pub const UPGRADE_RESULT: &str = "upgrade-result";
    pub const RECORD_ID: &str = "record-id";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Tags::push`].
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: &str, value: impl ToString) {
        self.0.push(Tag {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Appends `other` after the existing tags.
    pub fn extend(&mut self, other: Tags) {
        self.0.extend(other.0);
    }

    /// Builder form of [`Tags::extend`].
    pub fn chain(mut self, other: Tags) -> Self {
        self.extend(other);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_preserves_order() {
        let mut tags = Tags::new().with(keys::MINT_COIN, "5stake");
        tags.extend(Tags::new().with(keys::REWARD, 1).with(keys::JAILED, "x"));
        let order: Vec<&str> = tags.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(order, vec!["mint-coin", "reward", "jailed"]);
        assert_eq!(tags.get(keys::REWARD), Some("1"));
    }
}
