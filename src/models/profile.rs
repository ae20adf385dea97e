//! Profile metadata and the profile index
//!
//! The index is the single source of truth for which profiles exist and which
//! one is current.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ProfileId;

/// An isolated financial dataset owned by one named identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Create a new profile with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProfileId::new(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at`, never moving it backwards
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

/// Which profiles exist and which one is current
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileIndex {
    #[serde(default)]
    pub current_profile_id: Option<ProfileId>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl ProfileIndex {
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id.as_str() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|p| p.id.as_str() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Case-insensitive lookup by display name
    pub fn find_by_name(&self, name: &str) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Insert or replace a profile, keeping its position if it already exists
    pub fn upsert(&mut self, profile: Profile) {
        match self.get_mut(profile.id.as_str()) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Remove a profile and repair the current pointer
    pub fn remove(&mut self, id: &str) -> Option<Profile> {
        let pos = self.profiles.iter().position(|p| p.id.as_str() == id)?;
        let removed = self.profiles.remove(pos);
        self.repair_current();
        Some(removed)
    }

    /// Point `current_profile_id` at an existing profile, or nothing
    ///
    /// A dangling pointer falls back to the first remaining profile, or `None`
    /// when the index is empty.
    pub fn repair_current(&mut self) {
        let dangling = match &self.current_profile_id {
            Some(id) => !self.contains(id.as_str()),
            None => false,
        };
        if dangling {
            self.current_profile_id = self.profiles.first().map(|p| p.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(names: &[&str]) -> ProfileIndex {
        ProfileIndex {
            current_profile_id: None,
            profiles: names.iter().map(|n| Profile::new(*n)).collect(),
        }
    }

    #[test]
    fn test_remove_current_falls_back_to_first() {
        let mut index = index_with(&["Alice", "Bob", "Carol"]);
        let bob = index.profiles[1].id.clone();
        index.current_profile_id = Some(bob.clone());

        index.remove(bob.as_str());

        assert_eq!(index.current_profile_id, Some(index.profiles[0].id.clone()));
    }

    #[test]
    fn test_remove_last_profile_clears_current() {
        let mut index = index_with(&["Alice"]);
        let alice = index.profiles[0].id.clone();
        index.current_profile_id = Some(alice.clone());

        index.remove(alice.as_str());

        assert!(index.current_profile_id.is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_repair_dangling_pointer() {
        let mut index = index_with(&["Alice"]);
        index.current_profile_id = Some(ProfileId::from("ghost"));
        index.repair_current();
        assert_eq!(index.current_profile_id, Some(index.profiles[0].id.clone()));
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let index = index_with(&["Alice"]);
        assert!(index.find_by_name("alice").is_some());
        assert!(index.find_by_name("bob").is_none());
    }

    #[test]
    fn test_touch_never_goes_backwards() {
        let mut profile = Profile::new("Alice");
        let before = profile.updated_at;
        profile.touch(before - chrono::Duration::seconds(10));
        assert_eq!(profile.updated_at, before);
    }

    #[test]
    fn test_json_shape() {
        let index = index_with(&["Alice"]);
        let json = serde_json::to_value(&index).unwrap();
        assert!(json.get("currentProfileId").is_some());
        assert!(json["profiles"][0].get("createdAt").is_some());
    }
}
