use cosmwasm_std::{OverflowError, StdError};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("Unauthorized")]
    Unauthorized {},

    #[error("Invalid amount")]
    InvalidAmount {},

    #[error("Deadline exceeded")]
    DeadlineExceeded {},

    #[error("Provider stake is below the minimum required")]
    InsufficientStake {},

    #[error("Provider {provider} not found")]
    ProviderNotFound { provider: String },

    #[error("No active provider matches the requested capabilities")]
    NoProviderAvailable {},

    #[error("Provider is not active")]
    ProviderNotActive {},

    #[error("Provider is still unbonding")]
    StillUnbonding {},

    #[error("Request {request_id} not found")]
    RequestNotFound { request_id: u64 },

    #[error("Request has already reached a terminal state")]
    AlreadyFinalized {},

    #[error("Caller is not the assigned provider for this request")]
    UnauthorizedProvider {},

    #[error("Invalid signature")]
    InvalidSignature {},

    #[error("Invalid merkle proof")]
    InvalidMerkleProof {},

    #[error("Result timestamp is in the future")]
    FutureTimestamp {},

    #[error("Nonce has already been used")]
    ProofReplay {},

    #[error("Caller is not a bonded validator")]
    NotValidator {},

    #[error("Dispute {dispute_id} not found")]
    DisputeNotFound { dispute_id: u64 },

    #[error("Dispute voting window is closed")]
    DisputeWindowClosed {},

    #[error("Dispute is not open for voting")]
    DisputeNotOpen {},

    #[error("Validator has already voted on this dispute")]
    AlreadyVoted {},

    #[error("Reentrant call into a compute mutating handler")]
    Reentrancy {},

    #[error("Provider rate limited")]
    RateLimited {},

    #[error("Failed to migrate the contract")]
    MigrationError {},
}

impl From<OverflowError> for ContractError {
    fn from(o: OverflowError) -> Self {
        StdError::from(o).into()
    }
}
