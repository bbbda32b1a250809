//! Wallet signing capability
//!
//! A wallet is opaque to the registry: it exposes a public key and signs the
//! bytes it is given. [`KeypairWallet`] is a local ed25519 implementation used
//! by the command line tool and tests.

use super::message::{AgentSubmission, CanonicalMessage, MessageVersion};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use std::path::Path;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Failed to read keypair file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse keypair file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Signature together with the key that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSignature {
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl WalletSignature {
    pub fn signature_base58(&self) -> String {
        bs58::encode(&self.signature).into_string()
    }

    pub fn public_key_base58(&self) -> String {
        bs58::encode(&self.public_key).into_string()
    }
}

/// Capability to sign arbitrary bytes with a wallet key
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Raw public key bytes of the signer
    fn public_key(&self) -> Vec<u8>;

    /// Sign the given bytes
    async fn sign_message(&self, message: &[u8]) -> Result<WalletSignature, WalletError>;

    /// Base58 wallet address
    fn address(&self) -> String {
        bs58::encode(self.public_key()).into_string()
    }
}

/// In-process ed25519 wallet
pub struct KeypairWallet {
    signing_key: SigningKey,
}

impl KeypairWallet {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Build from 64 keypair bytes (secret seed followed by public key)
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let bytes: &[u8; 64] = bytes.try_into().map_err(|_| {
            WalletError::InvalidKeypair(format!("expected 64 bytes, got {}", bytes.len()))
        })?;
        let signing_key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Load a keypair file holding a JSON array of 64 bytes
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let content = std::fs::read_to_string(path)?;
        let bytes: Vec<u8> = serde_json::from_str(&content)?;
        Self::from_keypair_bytes(&bytes)
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<WalletSignature, WalletError> {
        let signature = self.signing_key.sign(message);
        Ok(WalletSignature {
            signature: signature.to_bytes().to_vec(),
            public_key: self.public_key(),
        })
    }
}

/// Encode a submission and have the wallet sign its UTF-8 bytes
pub async fn sign_submission(
    wallet: &dyn WalletSigner,
    submission: &AgentSubmission,
    version: MessageVersion,
) -> Result<(CanonicalMessage, WalletSignature), WalletError> {
    let message = CanonicalMessage::encode(submission, version);
    let signature = wallet.sign_message(message.as_bytes()).await?;
    Ok((message, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::verify::verify_submission;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_signed_submission_verifies() {
        let wallet = KeypairWallet::from_seed([3u8; 32]);
        let submission = AgentSubmission {
            slug: "agent".to_string(),
            owner_wallet: wallet.address(),
            nonce: "n-1".to_string(),
            ..Default::default()
        };

        let (message, signature) = sign_submission(&wallet, &submission, MessageVersion::V1)
            .await
            .unwrap();

        assert!(message.as_str().starts_with("v1\n"));
        assert_eq!(signature.public_key, wallet.public_key());
        assert!(verify_submission(
            &submission,
            MessageVersion::V1,
            &signature.signature_base58()
        )
        .is_ok());
    }

    #[test]
    fn test_load_keypair_file() {
        let wallet = KeypairWallet::from_seed([5u8; 32]);
        let mut bytes = [5u8; 32].to_vec();
        bytes.extend(wallet.public_key());

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&bytes).unwrap()).unwrap();

        let loaded = KeypairWallet::load(file.path()).unwrap();
        assert_eq!(loaded.address(), wallet.address());
    }

    #[test]
    fn test_keypair_length_checked() {
        assert!(matches!(
            KeypairWallet::from_keypair_bytes(&[1u8; 10]),
            Err(WalletError::InvalidKeypair(_))
        ));
    }

    #[test]
    fn test_every_wallet_error_has_a_source() {
        let mut garbage = NamedTempFile::new().unwrap();
        write!(garbage, "not json").unwrap();

        let errors = [
            KeypairWallet::from_keypair_bytes(&[1u8; 10]).err(),
            KeypairWallet::load(Path::new("/nonexistent/keypair.json")).err(),
            KeypairWallet::load(garbage.path()).err(),
        ];
        for error in errors {
            match error {
                Some(WalletError::InvalidKeypair(_)) | Some(WalletError::Io(_)) | Some(WalletError::Json(_)) => {}
                None => panic!("expected a wallet error"),
            }
        }
    }
}
