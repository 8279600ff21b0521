//! Named event-type and attribute-key constants (spec.md §6: "Every state
//! transition emits a typed event ... using named constants (never
//! hardcoded strings)").
pub mod ty {
    pub const POOL_CREATED: &str = "pool_created";
    pub const LIQUIDITY_ADDED: &str = "liquidity_added";
    pub const LIQUIDITY_REMOVED: &str = "liquidity_removed";
    pub const SWAP_EXECUTED: &str = "swap_executed";
    pub const LIMIT_ORDER_PLACED: &str = "limit_order_placed";
    pub const LIMIT_ORDER_FILLED: &str = "limit_order_filled";
    pub const LIMIT_ORDER_CANCELLED: &str = "limit_order_cancelled";
    pub const LIMIT_ORDER_EXPIRED: &str = "limit_order_expired";
    pub const CIRCUIT_BREAKER_TRIPPED: &str = "circuit_breaker_tripped";
    pub const CIRCUIT_BREAKER_RESUMED: &str = "circuit_breaker_resumed";
    pub const FLASH_LOAN_DETECTED: &str = "flash_loan_detected";
    pub const REENTRANCY_BLOCKED: &str = "reentrancy_blocked";

    pub const PRICE_SUBMITTED: &str = "price_submitted";
    pub const PRICE_AGGREGATED: &str = "price_aggregated";
    pub const OUTLIER_REJECTED: &str = "outlier_rejected";
    pub const SLASH_APPLIED: &str = "slash_applied";

    pub const PROVIDER_REGISTERED: &str = "provider_registered";
    pub const PROVIDER_JAILED: &str = "provider_jailed";
    pub const REQUEST_CREATED: &str = "request_created";
    pub const REQUEST_COMPLETED: &str = "request_completed";
    pub const REQUEST_TIMED_OUT: &str = "request_timed_out";
    pub const REQUEST_CANCELLED: &str = "request_cancelled";
    pub const DISPUTE_OPENED: &str = "dispute_opened";
    pub const DISPUTE_RESOLVED: &str = "dispute_resolved";
    pub const RATE_LIMITED: &str = "rate_limited";

    pub const IBC_PACKET_PROCESSED: &str = "ibc_packet_processed";
    pub const IBC_PACKET_REFUNDED: &str = "ibc_packet_refunded";
}

pub mod attr {
    pub const ACTION: &str = "action";
    pub const POOL_ID: &str = "pool_id";
    pub const OWNER: &str = "owner";
    pub const DENOM_IN: &str = "denom_in";
    pub const DENOM_OUT: &str = "denom_out";
    pub const AMOUNT_IN: &str = "amount_in";
    pub const AMOUNT_OUT: &str = "amount_out";
    pub const FEE_AMOUNT: &str = "fee_amount";
    pub const REASON: &str = "reason";
    pub const ASSET: &str = "asset";
    pub const PRICE: &str = "price";
    pub const VALIDATOR: &str = "validator";
    pub const SUBMITTER_COUNT: &str = "submitter_count";
    pub const DROPPED_OUTLIERS: &str = "dropped_outliers";
    pub const SLASH_FRACTION: &str = "slash_fraction";
    pub const REQUEST_ID: &str = "request_id";
    pub const PROVIDER: &str = "provider";
    pub const REQUESTER: &str = "requester";
    pub const ESCROW_AMOUNT: &str = "escrow_amount";
    pub const DISPUTE_ID: &str = "dispute_id";
    pub const CHALLENGER: &str = "challenger";
}
