//! Error types for the tip session and its collaborators.

use thiserror::Error;

/// EIP-1193: the user rejected the request.
pub const CODE_USER_REJECTED: i64 = 4001;
/// EIP-3326: the requested chain has not been added to the wallet.
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

/// Errors surfaced by [`crate::SessionManager`] operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TipError {
    /// No wallet provider is present in this environment.
    #[error("no wallet provider available")]
    NoProviderAvailable,

    /// The user declined the request in their wallet.
    #[error("request rejected by user")]
    UserRejected,

    /// Recipient is not a 20-byte hex address.
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// Amount is not a positive decimal in display units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Balance does not cover amount plus fee.
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: String, required: String },

    #[error("wallet not connected")]
    NotConnected,

    /// Connected chain differs from the target chain.
    #[error("wrong network: connected to chain {actual}, expected {expected}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("network switch failed: {0}")]
    NetworkSwitchFailed(String),

    /// The provider refused or failed the transaction submission.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Fee estimation failed. Never returned by the manager, only logged.
    #[error("fee estimation failed: {0}")]
    EstimationFailed(String),

    /// The provider failed while establishing the session, or the attempt
    /// was superseded by a disconnect.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors reported by wallet, chain and event collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("user rejected the request")]
    Rejected,

    #[error("unrecognized chain id {0}")]
    UnrecognizedChain(u64),

    /// A JSON-RPC level error with its code.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The transport failed before a response was produced.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction {0} reverted")]
    Reverted(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Classify an EIP-1193 error code.
    pub fn from_code(code: i64, message: impl Into<String>, chain_id: Option<u64>) -> Self {
        match code {
            CODE_USER_REJECTED => ProviderError::Rejected,
            CODE_UNRECOGNIZED_CHAIN => ProviderError::UnrecognizedChain(chain_id.unwrap_or_default()),
            _ => ProviderError::Rpc { code, message: message.into() },
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ProviderError::Rejected)
    }
}
