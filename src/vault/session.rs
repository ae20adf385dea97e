//! The one logged-in profile
//!
//! A session holds decrypted data and the key material needed to re-encrypt
//! it. It lives only in process memory and is dropped on logout.

use crate::crypto::SecureString;
use crate::models::{Profile, ProfileDataPayload, ProfileId};

/// Decrypted state of the logged-in profile
#[derive(Debug, Clone)]
pub struct ActiveProfileSession {
    profile: Profile,
    passphrase: SecureString,
    data: ProfileDataPayload,
}

impl ActiveProfileSession {
    pub fn new(profile: Profile, passphrase: SecureString, mut data: ProfileDataPayload) -> Self {
        data.repair_counter();
        Self {
            profile,
            passphrase,
            data,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile.id
    }

    pub fn passphrase(&self) -> &SecureString {
        &self.passphrase
    }

    pub fn data(&self) -> &ProfileDataPayload {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ProfileDataPayload {
        &mut self.data
    }

    pub(crate) fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
    }

    pub(crate) fn set_passphrase(&mut self, passphrase: SecureString) {
        self.passphrase = passphrase;
    }

    pub(crate) fn set_data(&mut self, mut data: ProfileDataPayload) {
        data.repair_counter();
        self.data = data;
    }
}
