//! Signed approvals.
//!
//! A vote or invitation endorsement can carry an Ed25519 signature from the
//! founder's registered key, making each approval an individually
//! authenticated act instead of an id in a caller-assembled list.
//!
//! Messages are domain separated and length prefixed so a vote signature can
//! never be replayed as an endorsement (or for another proposal).

use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use zeroize::Zeroizing;

const VOTE_CONTEXT: &[u8] = b"quorate-vote-v1";
const ENDORSE_CONTEXT: &[u8] = b"quorate-endorse-v1";
const ED25519_PUBLIC_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed hex: {0}")]
    Encoding(String),

    #[error("public key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("no public key registered")]
    MissingKey,

    #[error("signature required")]
    MissingSignature,

    #[error("signature does not verify")]
    Mismatch,

    #[error("key generation failed")]
    KeyGeneration,

    #[error("private key rejected: {0}")]
    KeyRejected(String),
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buf.extend_from_slice(field);
}

/// Bytes a founder signs to cast a ballot.
pub fn ballot_message(proposal_id: &str, founder_id: &str, approve: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + proposal_id.len() + founder_id.len());
    push_field(&mut buf, VOTE_CONTEXT);
    push_field(&mut buf, proposal_id.as_bytes());
    push_field(&mut buf, founder_id.as_bytes());
    buf.push(u8::from(approve));
    buf
}

/// Bytes a founder signs to endorse a pending invitation.
pub fn endorsement_message(invitation_id: &str, founder_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + invitation_id.len() + founder_id.len());
    push_field(&mut buf, ENDORSE_CONTEXT);
    push_field(&mut buf, invitation_id.as_bytes());
    push_field(&mut buf, founder_id.as_bytes());
    buf
}

pub fn decode_public_key(public_key_hex: &str) -> Result<Vec<u8>, SignatureError> {
    let bytes =
        hex::decode(public_key_hex.trim()).map_err(|e| SignatureError::Encoding(e.to_string()))?;
    if bytes.len() != ED25519_PUBLIC_KEY_LEN {
        return Err(SignatureError::KeyLength(bytes.len()));
    }
    Ok(bytes)
}

/// Verify a hex signature over `message` against a hex public key.
pub fn verify(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let key = decode_public_key(public_key_hex)?;
    let signature =
        hex::decode(signature_hex.trim()).map_err(|e| SignatureError::Encoding(e.to_string()))?;

    UnparsedPublicKey::new(&ED25519, key)
        .verify(message, &signature)
        .map_err(|_| SignatureError::Mismatch)
}

/// Check an optional signature against an optional registered key.
///
/// With `required` off, an absent signature passes; a present one must still
/// verify.
pub fn check_signature(
    public_key_hex: Option<&str>,
    message: &[u8],
    signature_hex: Option<&str>,
    required: bool,
) -> Result<(), SignatureError> {
    match (signature_hex, public_key_hex) {
        (None, _) if required => Err(SignatureError::MissingSignature),
        (None, _) => Ok(()),
        (Some(_), None) => Err(SignatureError::MissingKey),
        (Some(signature), Some(key)) => verify(key, message, signature),
    }
}

/// A founder's Ed25519 signing key.
pub struct FounderKey {
    pkcs8: Zeroizing<Vec<u8>>,
    pair: Ed25519KeyPair,
}

impl FounderKey {
    pub fn generate() -> Result<Self, SignatureError> {
        let rng = SystemRandom::new();
        let document =
            Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| SignatureError::KeyGeneration)?;
        Self::from_pkcs8(document.as_ref())
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, SignatureError> {
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| SignatureError::KeyRejected(e.to_string()))?;
        Ok(Self {
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
            pair,
        })
    }

    pub fn from_pkcs8_hex(pkcs8_hex: &str) -> Result<Self, SignatureError> {
        let bytes = Zeroizing::new(
            hex::decode(pkcs8_hex.trim()).map_err(|e| SignatureError::Encoding(e.to_string()))?,
        );
        Self::from_pkcs8(&bytes)
    }

    /// Hex PKCS#8 document, for writing to a key file.
    pub fn pkcs8_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.pkcs8.as_slice()))
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.pair.public_key().as_ref())
    }

    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.pair.sign(message).as_ref())
    }

    pub fn sign_ballot(&self, proposal_id: &str, founder_id: &str, approve: bool) -> String {
        self.sign_hex(&ballot_message(proposal_id, founder_id, approve))
    }

    pub fn sign_endorsement(&self, invitation_id: &str, founder_id: &str) -> String {
        self.sign_hex(&endorsement_message(invitation_id, founder_id))
    }
}
