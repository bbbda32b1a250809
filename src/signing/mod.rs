//! Wallet-signed submission messages
//!
//! Canonical encoding of agent submissions, signature verification, and the
//! wallet signing capability.

pub mod message;
pub mod verify;
pub mod wallet;

pub use message::{
    build_agent_create_message, AgentSubmission, CanonicalMessage, MessageVersion,
    SecondaryInterface,
};
pub use verify::{decode_signature, decode_wallet, verify_message, verify_submission, SignatureError};
pub use wallet::{sign_submission, KeypairWallet, WalletError, WalletSignature, WalletSigner};
