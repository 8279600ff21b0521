use cosmwasm_std::{DivideByZeroError, OverflowError, StdError};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("Unauthorized")]
    Unauthorized {},

    #[error("Invalid amount")]
    InvalidAmount {},

    #[error("Invalid denom: {reason}")]
    InvalidDenom { reason: String },

    #[error("Deadline exceeded")]
    DeadlineExceeded {},

    #[error("A pool for this pair already exists")]
    DuplicatePool {},

    #[error("Maximum number of pools reached")]
    TooManyPools {},

    #[error("Pool {pool_id} not found")]
    PoolNotFound { pool_id: u64 },

    #[error("Limit order {order_id} not found")]
    OrderNotFound { order_id: u64 },

    #[error("Initial liquidity must mint more than the locked minimum liquidity amount")]
    MinimumLiquidityAmountError {},

    #[error("Operation would exceed slippage tolerance")]
    Slippage {},

    #[error("Pool has insufficient liquidity for this operation")]
    InsufficientLiquidity {},

    #[error("Swap output exceeds the maximum pool drain percent")]
    PoolDrain {},

    #[error("Pool circuit breaker is tripped")]
    CircuitBreakerTripped {},

    #[error("Reentrant call into a DEX mutating handler")]
    Reentrancy {},

    #[error("Address is locked out of large swaps on this pool after a flagged flash-loan pattern")]
    FlashLoanLockout {},

    #[error("Failed to migrate the contract")]
    MigrationError {},
}

impl From<OverflowError> for ContractError {
    fn from(o: OverflowError) -> Self {
        StdError::from(o).into()
    }
}

impl From<DivideByZeroError> for ContractError {
    fn from(e: DivideByZeroError) -> Self {
        StdError::from(e).into()
    }
}

