//! Ed25519 signatures.
//!
//! `PrivateSignatureKey` uses the libsodium 64-byte layout (seed followed by
//! the public key), so signing reconstructs the dalek `SigningKey` from the
//! seed half. Verification never panics: malformed keys or signatures simply
//! fail to verify.

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::types::{PrivateSignatureKey, PublicSignatureKey, Signature, SignatureKeyPair};

/// Generate a fresh Ed25519 keypair.
pub fn make_signature_key_pair() -> SignatureKeyPair {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let signing_key = SigningKey::from_bytes(&seed);
    key_pair_from_signing_key(&signing_key)
}

/// Rebuild the full keypair from a 64-byte private key.
pub fn make_signature_key_pair_from_private(
    private_key: &PrivateSignatureKey,
) -> SignatureKeyPair {
    let signing_key = signing_key_of(private_key);
    key_pair_from_signing_key(&signing_key)
}

fn key_pair_from_signing_key(signing_key: &SigningKey) -> SignatureKeyPair {
    let public = PublicSignatureKey::from(signing_key.verifying_key().to_bytes());
    let mut private = [0u8; 64];
    private[..32].copy_from_slice(&signing_key.to_bytes());
    private[32..].copy_from_slice(public.as_bytes());
    SignatureKeyPair {
        public_key: public,
        private_key: PrivateSignatureKey::from(private),
    }
}

fn signing_key_of(private_key: &PrivateSignatureKey) -> SigningKey {
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&private_key.as_bytes()[..32]);
    SigningKey::from_bytes(&seed)
}

/// Sign `message`, returning a raw 64-byte signature.
pub fn sign(message: &[u8], private_key: &PrivateSignatureKey) -> Signature {
    let sig = signing_key_of(private_key).sign(message);
    Signature::from(sig.to_bytes())
}

/// Verify a signature made by `public_key` over `message`.
pub fn verify(message: &[u8], signature: &Signature, public_key: &PublicSignatureKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key.verify(message, &sig).is_ok()
}
