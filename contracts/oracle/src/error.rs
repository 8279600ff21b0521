use cosmwasm_std::{OverflowError, StdError};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("Unauthorized")]
    Unauthorized {},

    #[error("Not a bonded validator")]
    NotValidator {},

    #[error("Invalid price")]
    InvalidPrice {},

    #[error("Nonce already used")]
    ReplayedNonce {},

    #[error("Submission is an outlier relative to the current window")]
    OutlierDetected {},

    #[error("No aggregated price is available for this asset")]
    OracleDataUnavailable {},

    #[error("Asset circuit breaker is tripped")]
    CircuitBreakerTripped {},

    #[error("Reentrant call into an oracle mutating handler")]
    Reentrancy {},

    #[error("Submission rate limited")]
    RateLimited {},

    #[error("Failed to migrate the contract")]
    MigrationError {},
}

impl From<OverflowError> for ContractError {
    fn from(o: OverflowError) -> Self {
        StdError::from(o).into()
    }
}
