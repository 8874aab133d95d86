//! Action variants: the semantic payloads of trustchain blocks.
//!
//! Each variant owns its fields; there is no inheritance, and the nature
//! byte lives in the block header rather than inside the payload.

mod device_creation;
mod device_revocation;
mod key_publish;
mod provisional_identity_claim;
mod trustchain_creation;
mod user_group;

pub use device_creation::{
    delegation_signature_data, DeviceCreation, DeviceCreation1, DeviceCreation3, UserKeyPair,
};
pub use device_revocation::{DeviceRevocation, DeviceRevocation1, DeviceRevocation2};
pub use key_publish::{
    KeyPublish, KeyPublishToDevice, KeyPublishToProvisionalUser, KeyPublishToUser,
    KeyPublishToUserGroup,
};
pub use provisional_identity_claim::ProvisionalIdentityClaim;
pub use trustchain_creation::TrustchainCreation;
pub use user_group::{
    GroupMember2, GroupProvisionalMember2, UserGroupAddition, UserGroupAddition1,
    UserGroupAddition2, UserGroupCreation, UserGroupCreation1, UserGroupCreation2,
};

use crate::error::ChainError;
use crate::nature::Nature;
use crate::ser::{self, Reader, WireDeserialize, WireSerialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TrustchainCreation(TrustchainCreation),
    DeviceCreation(DeviceCreation),
    DeviceRevocation(DeviceRevocation),
    KeyPublish(KeyPublish),
    UserGroupCreation(UserGroupCreation),
    UserGroupAddition(UserGroupAddition),
    ProvisionalIdentityClaim(ProvisionalIdentityClaim),
}

impl Action {
    pub fn nature(&self) -> Nature {
        match self {
            Action::TrustchainCreation(_) => Nature::TrustchainCreation,
            Action::DeviceCreation(a) => a.nature(),
            Action::DeviceRevocation(a) => a.nature(),
            Action::KeyPublish(a) => a.nature(),
            Action::UserGroupCreation(a) => a.nature(),
            Action::UserGroupAddition(a) => a.nature(),
            Action::ProvisionalIdentityClaim(_) => Nature::ProvisionalIdentityClaim,
        }
    }

    /// Canonical payload bytes (what gets hashed and carried on the wire).
    pub fn serialize_payload(&self) -> Vec<u8> {
        match self {
            Action::TrustchainCreation(a) => ser::serialize(a),
            Action::DeviceCreation(DeviceCreation::V1(a)) => ser::serialize(a),
            Action::DeviceCreation(DeviceCreation::V3(a)) => ser::serialize(a),
            Action::DeviceRevocation(DeviceRevocation::V1(a)) => ser::serialize(a),
            Action::DeviceRevocation(DeviceRevocation::V2(a)) => ser::serialize(a),
            Action::KeyPublish(KeyPublish::ToDevice(a)) => ser::serialize(a),
            Action::KeyPublish(KeyPublish::ToUser(a)) => ser::serialize(a),
            Action::KeyPublish(KeyPublish::ToUserGroup(a)) => ser::serialize(a),
            Action::KeyPublish(KeyPublish::ToProvisionalUser(a)) => ser::serialize(a),
            Action::UserGroupCreation(UserGroupCreation::V1(a)) => ser::serialize(a),
            Action::UserGroupCreation(UserGroupCreation::V2(a)) => ser::serialize(a),
            Action::UserGroupAddition(UserGroupAddition::V1(a)) => ser::serialize(a),
            Action::UserGroupAddition(UserGroupAddition::V2(a)) => ser::serialize(a),
            Action::ProvisionalIdentityClaim(a) => ser::serialize(a),
        }
    }

    /// Parse a payload for the given nature. The whole buffer must be
    /// consumed.
    pub fn deserialize_payload(nature: Nature, payload: &[u8]) -> Result<Self, ChainError> {
        fn whole<T: WireDeserialize>(payload: &[u8]) -> Result<T, ChainError> {
            let mut reader = Reader::new(payload);
            let value = T::read(&mut reader)?;
            reader.expect_eof()?;
            Ok(value)
        }

        Ok(match nature {
            Nature::TrustchainCreation => Action::TrustchainCreation(whole(payload)?),
            Nature::DeviceCreation1 => {
                Action::DeviceCreation(DeviceCreation::V1(whole(payload)?))
            }
            Nature::DeviceCreation3 => {
                Action::DeviceCreation(DeviceCreation::V3(whole(payload)?))
            }
            Nature::DeviceRevocation1 => {
                Action::DeviceRevocation(DeviceRevocation::V1(whole(payload)?))
            }
            Nature::DeviceRevocation2 => {
                Action::DeviceRevocation(DeviceRevocation::V2(whole(payload)?))
            }
            Nature::KeyPublishToDevice => {
                Action::KeyPublish(KeyPublish::ToDevice(whole(payload)?))
            }
            Nature::KeyPublishToUser => Action::KeyPublish(KeyPublish::ToUser(whole(payload)?)),
            Nature::KeyPublishToUserGroup => {
                Action::KeyPublish(KeyPublish::ToUserGroup(whole(payload)?))
            }
            Nature::KeyPublishToProvisionalUser => {
                Action::KeyPublish(KeyPublish::ToProvisionalUser(whole(payload)?))
            }
            Nature::UserGroupCreation1 => {
                Action::UserGroupCreation(UserGroupCreation::V1(whole(payload)?))
            }
            Nature::UserGroupCreation2 => {
                Action::UserGroupCreation(UserGroupCreation::V2(whole(payload)?))
            }
            Nature::UserGroupAddition1 => {
                Action::UserGroupAddition(UserGroupAddition::V1(whole(payload)?))
            }
            Nature::UserGroupAddition2 => {
                Action::UserGroupAddition(UserGroupAddition::V2(whole(payload)?))
            }
            Nature::ProvisionalIdentityClaim => Action::ProvisionalIdentityClaim(whole(payload)?),
        })
    }
}
