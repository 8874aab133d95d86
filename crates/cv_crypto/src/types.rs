//! Fixed-size cryptographic types.
//!
//! Every type wraps a `[u8; N]` with bytewise equality and no hidden
//! padding. Key material is printable as standard base64 (that is also how
//! the wire JSON carries it). Secret types zeroize their bytes on drop and
//! keep their `Debug` output redacted.

use std::convert::TryFrom;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Sealed-box overhead: ephemeral X25519 public key (32) + Poly1305 tag (16).
pub const SEAL_OVERHEAD: usize = 48;

macro_rules! bytes_common {
    ($name:ident, $size:expr) => {
        impl $name {
            pub const SIZE: usize = $size;

            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            /// True when every byte is zero (the "null" value used by root
            /// blocks and optional wire fields).
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

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $size])
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
    };
}

macro_rules! public_bytes_type {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) [u8; $size]);

        bytes_common!($name, $size);

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
    };
}

macro_rules! secret_bytes_type {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) [u8; $size]);

        bytes_common!($name, $size);

        impl Drop for $name {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(<secret>)", stringify!($name))
            }
        }
    };
}

public_bytes_type!(
    /// 32-byte Blake2b-256 output. Block hashes, obfuscated user ids and
    /// author references all share this representation.
    Hash, 32
);
public_bytes_type!(
    /// 64-byte Ed25519 signature.
    Signature, 64
);
public_bytes_type!(
    /// 32-byte Ed25519 verifying key.
    PublicSignatureKey, 32
);
public_bytes_type!(
    /// 32-byte X25519 public key.
    PublicEncryptionKey, 32
);
public_bytes_type!(
    /// 24-byte XChaCha20-Poly1305 nonce.
    AeadIv, 24
);
public_bytes_type!(
    /// 16-byte Poly1305 authentication tag. Doubles as the resource id of a
    /// simple-format encrypted buffer.
    Mac, 16
);

secret_bytes_type!(
    /// 64-byte Ed25519 signing key in libsodium layout: seed followed by the
    /// derived public key.
    PrivateSignatureKey, 64
);
secret_bytes_type!(
    /// 32-byte X25519 secret key.
    PrivateEncryptionKey, 32
);
secret_bytes_type!(
    /// 32-byte XChaCha20-Poly1305 key.
    SymmetricKey, 32
);

public_bytes_type!(
    /// A `PrivateEncryptionKey` inside one sealed box.
    SealedPrivateEncryptionKey, 32 + SEAL_OVERHEAD
);
public_bytes_type!(
    /// A `PrivateSignatureKey` inside one sealed box.
    SealedPrivateSignatureKey, 64 + SEAL_OVERHEAD
);
public_bytes_type!(
    /// A `SymmetricKey` inside one sealed box.
    SealedSymmetricKey, 32 + SEAL_OVERHEAD
);
public_bytes_type!(
    /// A `SymmetricKey` inside two stacked sealed boxes (provisional-user
    /// publishes: provider envelope inside the app envelope).
    TwoTimesSealedSymmetricKey, 32 + 2 * SEAL_OVERHEAD
);
public_bytes_type!(
    /// A `PrivateEncryptionKey` inside two stacked sealed boxes (group keys
    /// for provisional members).
    TwoTimesSealedPrivateEncryptionKey, 32 + 2 * SEAL_OVERHEAD
);
public_bytes_type!(
    /// Two concatenated `PrivateEncryptionKey`s (app half then provider
    /// half) inside one sealed box; carried by identity claims.
    SealedPrivateEncryptionKeyPair, 64 + SEAL_OVERHEAD
);

/// Ed25519 keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureKeyPair {
    pub public_key: PublicSignatureKey,
    pub private_key: PrivateSignatureKey,
}

/// X25519 keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyPair {
    pub public_key: PublicEncryptionKey,
    pub private_key: PrivateEncryptionKey,
}
