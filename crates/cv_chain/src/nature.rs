//! Action nature codes.
//!
//! The code is carried in the block header, never inside the payload, and is
//! part of the hashed bytes. Codes are stable forever; gaps are retired
//! formats.

use crate::error::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Nature {
    TrustchainCreation = 1,
    DeviceCreation1 = 2,
    KeyPublishToDevice = 3,
    DeviceRevocation1 = 4,
    DeviceCreation3 = 7,
    KeyPublishToUser = 8,
    DeviceRevocation2 = 9,
    UserGroupCreation1 = 10,
    KeyPublishToUserGroup = 11,
    UserGroupAddition1 = 12,
    KeyPublishToProvisionalUser = 13,
    ProvisionalIdentityClaim = 14,
    UserGroupCreation2 = 15,
    UserGroupAddition2 = 16,
}

impl Nature {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u64> for Nature {
    type Error = ChainError;

    fn try_from(code: u64) -> Result<Self, ChainError> {
        Ok(match code {
            1 => Nature::TrustchainCreation,
            2 => Nature::DeviceCreation1,
            3 => Nature::KeyPublishToDevice,
            4 => Nature::DeviceRevocation1,
            7 => Nature::DeviceCreation3,
            8 => Nature::KeyPublishToUser,
            9 => Nature::DeviceRevocation2,
            10 => Nature::UserGroupCreation1,
            11 => Nature::KeyPublishToUserGroup,
            12 => Nature::UserGroupAddition1,
            13 => Nature::KeyPublishToProvisionalUser,
            14 => Nature::ProvisionalIdentityClaim,
            15 => Nature::UserGroupCreation2,
            16 => Nature::UserGroupAddition2,
            other => return Err(ChainError::UnknownNature(other)),
        })
    }
}

impl std::fmt::Display for Nature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Nature::TrustchainCreation => "TrustchainCreation",
            Nature::DeviceCreation1 => "DeviceCreation1",
            Nature::KeyPublishToDevice => "KeyPublishToDevice",
            Nature::DeviceRevocation1 => "DeviceRevocation1",
            Nature::DeviceCreation3 => "DeviceCreation3",
            Nature::KeyPublishToUser => "KeyPublishToUser",
            Nature::DeviceRevocation2 => "DeviceRevocation2",
            Nature::UserGroupCreation1 => "UserGroupCreation1",
            Nature::KeyPublishToUserGroup => "KeyPublishToUserGroup",
            Nature::UserGroupAddition1 => "UserGroupAddition1",
            Nature::KeyPublishToProvisionalUser => "KeyPublishToProvisionalUser",
            Nature::ProvisionalIdentityClaim => "ProvisionalIdentityClaim",
            Nature::UserGroupCreation2 => "UserGroupCreation2",
            Nature::UserGroupAddition2 => "UserGroupAddition2",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [1u64, 2, 3, 4, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16] {
            let nature = Nature::try_from(code).unwrap();
            assert_eq!(u64::from(nature.code()), code);
        }
    }

    #[test]
    fn retired_and_unknown_codes_fail() {
        for code in [0u64, 5, 6, 17, 255] {
            assert!(Nature::try_from(code).is_err());
        }
    }
}
