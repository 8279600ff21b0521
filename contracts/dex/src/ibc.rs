//! Inbound IBC packet routing for the DEX (spec.md §4.6). A `RemoteSwapPacket`
//! asks this pool to swap funds that arrived via a companion ICS-20 transfer
//! and already sit in this contract's account, crediting the output to a
//! local recipient. Idempotent under retried delivery; failures are reported
//! through the acknowledgement rather than by trapping the entry point, so
//! the counterparty's transfer module can refund the sender on its own chain
//! (the same pattern ICS-20 relays on an application-level ack error).
#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    from_json, Addr, Binary, DepsMut, Env, Event, IbcBasicResponse, IbcChannelCloseMsg,
    IbcChannelConnectMsg, IbcChannelOpenMsg, IbcChannelOpenResponse, IbcOrder, IbcPacketAckMsg,
    IbcPacketReceiveMsg, IbcPacketTimeoutMsg, IbcReceiveResponse, StdResult, Uint128,
};
use cosmwasm_schema::cw_serde;
use cosmos_sdk_proto::ibc::core::channel::v1::{acknowledgement::Response, Acknowledgement};
use prost::Message;

use paw_common::asset::{Asset, Denom};
use paw_common::event::{attr, ty};
use paw_common::ibc::{ack_is_success, ProcessedPackets};

use crate::defense;
use crate::error::ContractError;
use crate::state::{PoolStatus, PARAMS, POOLS};

pub const IBC_VERSION: &str = "paw-dex-1";

const PROCESSED_PACKETS: ProcessedPackets = ProcessedPackets::new("dex_ibc_processed");

#[cw_serde]
pub struct RemoteSwapPacket {
    pub pool_id: u64,
    pub denom_in: String,
    pub amount_in: Uint128,
    pub min_out: Uint128,
    pub recipient: String,
}

fn success_ack(data: impl Into<Vec<u8>>) -> Binary {
    encode_ack(Response::Result(data.into()))
}

fn error_ack(reason: impl Into<String>) -> Binary {
    encode_ack(Response::Error(reason.into()))
}

fn encode_ack(response: Response) -> Binary {
    let ack = Acknowledgement {
        response: Some(response),
    };
    let mut buf = Vec::new();
    ack.encode(&mut buf)
        .expect("acknowledgement encodes infallibly");
    Binary::from(buf)
}

fn validate_order_and_version(
    order: &IbcOrder,
    version: &str,
    counterparty_version: Option<&str>,
) -> StdResult<()> {
    if *order != IbcOrder::Unordered {
        return Err(cosmwasm_std::StdError::generic_err(
            "dex ibc channels must be unordered",
        ));
    }
    if version != IBC_VERSION {
        return Err(cosmwasm_std::StdError::generic_err(format!(
            "unsupported ibc version: {version}"
        )));
    }
    if let Some(counterparty) = counterparty_version {
        if counterparty != IBC_VERSION {
            return Err(cosmwasm_std::StdError::generic_err(format!(
                "counterparty proposed unsupported ibc version: {counterparty}"
            )));
        }
    }
    Ok(())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_channel_open(
    _deps: DepsMut,
    _env: Env,
    msg: IbcChannelOpenMsg,
) -> StdResult<IbcChannelOpenResponse> {
    let channel = msg.channel();
    validate_order_and_version(&channel.order, &channel.version, msg.counterparty_version())?;
    Ok(Some(cosmwasm_std::Ibc3ChannelOpenResponse {
        version: IBC_VERSION.to_string(),
    }))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_channel_connect(
    _deps: DepsMut,
    _env: Env,
    msg: IbcChannelConnectMsg,
) -> StdResult<IbcBasicResponse> {
    let channel = msg.channel();
    Ok(IbcBasicResponse::new()
        .add_attribute(attr::ACTION, "ibc_channel_connect")
        .add_attribute("channel_id", channel.endpoint.channel_id.clone()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_channel_close(
    _deps: DepsMut,
    _env: Env,
    msg: IbcChannelCloseMsg,
) -> StdResult<IbcBasicResponse> {
    let channel = msg.channel();
    Ok(IbcBasicResponse::new()
        .add_attribute(attr::ACTION, "ibc_channel_close")
        .add_attribute("channel_id", channel.endpoint.channel_id.clone()))
}

/// Applies one `RemoteSwapPacket`, returning the output denom/amount and the
/// validated local recipient to send it to.
fn apply_remote_swap(
    deps: &mut DepsMut,
    env: &Env,
    packet: RemoteSwapPacket,
) -> Result<(Denom, Uint128, Addr, Event), ContractError> {
    let denom_in = Denom::new(packet.denom_in)?;
    let mut pool = POOLS
        .may_load(deps.storage, packet.pool_id)?
        .ok_or(ContractError::PoolNotFound {
            pool_id: packet.pool_id,
        })?;
    if !matches!(pool.status, PoolStatus::Active) {
        return Err(ContractError::CircuitBreakerTripped {});
    }

    let (reserve_in, reserve_out) = pool.reserves_for(&denom_in)?;
    let params = PARAMS.load(deps.storage)?;
    let now = env.block.time.seconds();
    let height = env.block.height;

    defense::assert_breaker_allows_swap(
        deps.storage,
        packet.pool_id,
        &params,
        now,
        packet.amount_in,
        reserve_in,
    )?;

    let result =
        crate::math::compute_swap(reserve_in, reserve_out, packet.amount_in, pool.fee_bps)?;
    if result.amount_out < packet.min_out {
        return Err(ContractError::Slippage {});
    }
    defense::assert_drain_limit(result.amount_out, reserve_out, &params)?;

    let denom_out = if denom_in == pool.token_a {
        pool.token_b.clone()
    } else {
        pool.token_a.clone()
    };

    if denom_in == pool.token_a {
        pool.reserve_a = reserve_in + packet.amount_in;
        pool.reserve_b = reserve_out.checked_sub(result.amount_out)?;
    } else {
        pool.reserve_b = reserve_in + packet.amount_in;
        pool.reserve_a = reserve_out.checked_sub(result.amount_out)?;
    }
    POOLS.save(deps.storage, packet.pool_id, &pool)?;
    defense::record_observation(
        deps.storage,
        packet.pool_id,
        height,
        now,
        pool.reserve_a,
        pool.reserve_b,
    )?;

    let recipient = deps.api.addr_validate(&packet.recipient)?;
    let event = Event::new(ty::IBC_PACKET_PROCESSED)
        .add_attribute(attr::POOL_ID, packet.pool_id.to_string())
        .add_attribute(attr::OWNER, recipient.to_string())
        .add_attribute(attr::AMOUNT_OUT, result.amount_out.to_string());

    Ok((denom_out, result.amount_out, recipient, event))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_packet_receive(
    mut deps: DepsMut,
    env: Env,
    msg: IbcPacketReceiveMsg,
) -> StdResult<IbcReceiveResponse> {
    let channel_id = msg.packet.dest.channel_id.clone();
    let sequence = msg.packet.sequence;

    let is_new = PROCESSED_PACKETS
        .record_if_new(deps.storage, &channel_id, sequence)
        .unwrap_or(false);
    if !is_new {
        return Ok(IbcReceiveResponse::new(success_ack(b"duplicate".to_vec()))
            .add_attribute(attr::ACTION, "ibc_packet_receive_duplicate"));
    }

    let packet: RemoteSwapPacket = match from_json(&msg.packet.data) {
        Ok(p) => p,
        Err(e) => {
            return Ok(IbcReceiveResponse::new(error_ack(format!(
                "invalid packet data: {e}"
            ))))
        }
    };

    match apply_remote_swap(&mut deps, &env, packet) {
        Ok((denom_out, amount_out, recipient, event)) => {
            let msg = Asset::new(denom_out, amount_out).into_msg(recipient);
            Ok(IbcReceiveResponse::new(success_ack(amount_out.to_string()))
                .add_message(msg)
                .add_event(event))
        }
        Err(e) => Ok(IbcReceiveResponse::new(error_ack(e.to_string()))
            .add_attribute(attr::ACTION, "ibc_packet_receive_failed")
            .add_attribute(attr::REASON, e.to_string())),
    }
}

/// DEX originates no outbound packets in this version, so there is no
/// pending state to reconcile here; acknowledgements are only decoded for
/// completeness and logging.
#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_packet_ack(
    _deps: DepsMut,
    _env: Env,
    msg: IbcPacketAckMsg,
) -> StdResult<IbcBasicResponse> {
    let success = ack_is_success(msg.acknowledgement.data.as_slice()).unwrap_or(false);
    Ok(IbcBasicResponse::new()
        .add_attribute(attr::ACTION, "ibc_packet_ack")
        .add_attribute("success", success.to_string()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_packet_timeout(
    _deps: DepsMut,
    _env: Env,
    _msg: IbcPacketTimeoutMsg,
) -> StdResult<IbcBasicResponse> {
    Ok(IbcBasicResponse::new().add_attribute(attr::ACTION, "ibc_packet_timeout"))
}
