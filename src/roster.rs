//! Locally cached user roster for opponent display

use crate::types::OpponentProfile;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Roster shared with whatever populates it; matchmaking only reads it
pub type SharedRoster = Arc<RwLock<Roster>>;

/// Known users indexed by id
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_id: HashMap<String, OpponentProfile>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedRoster {
        Arc::new(RwLock::new(self))
    }

    /// Insert or replace a profile, returning the previous one
    pub fn insert(&mut self, profile: OpponentProfile) -> Option<OpponentProfile> {
        self.by_id.insert(profile.id.clone(), profile)
    }

    pub fn get(&self, id: &str) -> Option<&OpponentProfile> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Profile for `id`, or a placeholder identity when the roster has no entry
    pub fn resolve(&self, id: &str) -> OpponentProfile {
        match self.get(id) {
            Some(profile) => profile.clone(),
            None => {
                debug!(
                    opponent = id,
                    roster_size = self.len(),
                    "opponent not in roster, using placeholder"
                );
                OpponentProfile::placeholder(id)
            }
        }
    }
}

impl FromIterator<OpponentProfile> for Roster {
    fn from_iter<I: IntoIterator<Item = OpponentProfile>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for profile in iter {
            roster.insert(profile);
        }
        roster
    }
}
