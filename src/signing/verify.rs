//! Signature verification for canonical messages
//!
//! Owner wallets are base58-encoded ed25519 public keys. Signatures arrive as
//! base58 (what browser wallets hand back) or standard base64.

use super::message::{AgentSubmission, CanonicalMessage, MessageVersion};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;
use tracing::debug;

/// Reasons a signed message is not accepted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Unsupported message version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid wallet address: {0}")]
    InvalidPublicKey(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Signature does not match message and wallet")]
    VerificationFailed,
}

/// Decode a base58 wallet address into an ed25519 verifying key
pub fn decode_wallet(wallet: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = bs58::decode(wallet)
        .into_vec()
        .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        SignatureError::InvalidPublicKey(format!("expected 32 bytes, got {}", v.len()))
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))
}

/// Decode a 64-byte signature given as base58 or base64
pub fn decode_signature(encoded: &str) -> Result<Signature, SignatureError> {
    let encoded = encoded.trim();
    let bytes = match bs58::decode(encoded).into_vec() {
        Ok(bytes) if bytes.len() == 64 => bytes,
        _ => STANDARD
            .decode(encoded)
            .map_err(|e| SignatureError::MalformedSignature(e.to_string()))?,
    };
    Signature::from_slice(&bytes).map_err(|e| SignatureError::MalformedSignature(e.to_string()))
}

/// Verify a signature over an already encoded message
///
/// The message must start with a recognised version marker.
pub fn verify_message(
    message: &str,
    signature: &str,
    wallet: &str,
) -> Result<MessageVersion, SignatureError> {
    let version = MessageVersion::detect(message).ok_or_else(|| {
        let marker = message.split('\n').next().unwrap_or_default();
        SignatureError::UnsupportedVersion(marker.to_string())
    })?;
    let key = decode_wallet(wallet)?;
    let signature = decode_signature(signature)?;

    key.verify(message.as_bytes(), &signature)
        .map_err(|_| SignatureError::VerificationFailed)?;

    debug!(version = %version, wallet = %wallet, "Signature verified");
    Ok(version)
}

/// Re-derive the message for a submission and check the owner's signature
pub fn verify_submission(
    submission: &AgentSubmission,
    version: MessageVersion,
    signature: &str,
) -> Result<(), SignatureError> {
    let message = CanonicalMessage::encode(submission, version);
    verify_message(message.as_str(), signature, &submission.owner_wallet).map(|_| ())
}
