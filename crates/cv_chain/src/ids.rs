//! Chain-level identifiers.
//!
//! All of these are plain byte arrays with a meaning attached:
//! - a device id is the hash of the device's creation block;
//! - a group id is the group's public signature key;
//! - a resource id is the AEAD tag produced when the resource was encrypted;
//! - a user id is the Blake2b hash of the application user id and the
//!   trustchain id (clear application ids never appear on the chain).

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use cv_crypto::{hash::generic_hash_parts, CryptoError, Hash, Mac, PublicSignatureKey};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; $size]);

        impl $name {
            pub const SIZE: usize = $size;

            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn to_base64(&self) -> String {
                STANDARD.encode(self.0)
            }

            pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
                let bytes = STANDARD.decode(s)?;
                Self::try_from(bytes.as_slice())
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = CryptoError;

            fn try_from(bytes: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; $size] =
                    bytes.try_into().map_err(|_| CryptoError::InvalidKeySize {
                        name: stringify!($name),
                        expected: $size,
                        got: bytes.len(),
                    })?;
                Ok(Self(arr))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_base64())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_base64())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_base64(&s).map_err(de::Error::custom)
            }
        }

        impl crate::ser::WireSerialize for $name {
            fn serialized_size(&self) -> usize {
                $size
            }
            fn write(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.0);
            }
        }

        impl crate::ser::WireDeserialize for $name {
            fn read(
                reader: &mut crate::ser::Reader<'_>,
            ) -> Result<Self, crate::error::ChainError> {
                let bytes = reader.read_exact($size)?;
                Ok(Self::try_from(bytes)?)
            }
        }
    };
}

id_type!(
    /// Hash of the root block; names one application's chain.
    TrustchainId, 32
);
id_type!(
    /// Obfuscated user identifier.
    UserId, 32
);
id_type!(
    /// Hash of the device's creation block.
    DeviceId, 32
);
id_type!(
    /// The group's public signature key.
    GroupId, 32
);
id_type!(
    /// AEAD tag of the encrypted resource.
    ResourceId, 16
);

impl From<Hash> for TrustchainId {
    fn from(h: Hash) -> Self {
        Self(*h.as_bytes())
    }
}

impl From<Hash> for DeviceId {
    fn from(h: Hash) -> Self {
        Self(*h.as_bytes())
    }
}

impl From<DeviceId> for Hash {
    fn from(id: DeviceId) -> Self {
        Hash::from(id.0)
    }
}

impl From<TrustchainId> for Hash {
    fn from(id: TrustchainId) -> Self {
        Hash::from(id.0)
    }
}

impl From<PublicSignatureKey> for GroupId {
    fn from(key: PublicSignatureKey) -> Self {
        Self(*key.as_bytes())
    }
}

impl From<GroupId> for PublicSignatureKey {
    fn from(id: GroupId) -> Self {
        PublicSignatureKey::from(id.0)
    }
}

impl From<Mac> for ResourceId {
    fn from(mac: Mac) -> Self {
        Self(*mac.as_bytes())
    }
}

impl From<ResourceId> for Mac {
    fn from(id: ResourceId) -> Self {
        Mac::from(id.0)
    }
}

/// Obfuscate an application-supplied user id:
/// `UserId = H(app_user_id ‖ trustchain_id)`.
pub fn obfuscate_user_id(app_user_id: &str, trustchain_id: &TrustchainId) -> UserId {
    let hash = generic_hash_parts(&[app_user_id.as_bytes(), trustchain_id.as_ref()]);
    UserId(*hash.as_bytes())
}
