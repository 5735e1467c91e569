//! Client SDK for cross-chain orchestrations: stealth key derivation, EIP-3009 authorizations,
//! module encoding, and the create / fund / notify / poll flow against the orchestration backend.

pub mod amount;
pub mod authorization;
pub mod backend;
pub mod batch;
pub mod chain;
mod clock;
pub mod config;
pub mod deposit;
pub mod errors;
pub mod modules;
pub mod orchestration;
pub mod retry;
pub mod signer;
pub mod stealth;

pub use errors::SdkError;
pub use orchestration_primitives::hash::{RequestId, TransactionHash};
pub use orchestration_primitives::Address;
