//! Inbound IBC packet routing for the oracle (spec.md §4.6): relays a
//! validator's price submission attested on a companion chain into this
//! module's aggregation window. Idempotent under retried delivery; failures
//! are reported through the acknowledgement rather than by trapping the
//! entry point, mirroring the DEX's IBC handler.
#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    from_json, Binary, DepsMut, Env, IbcBasicResponse, IbcChannelCloseMsg, IbcChannelConnectMsg,
    IbcChannelOpenMsg, IbcChannelOpenResponse, IbcOrder, IbcPacketAckMsg, IbcPacketReceiveMsg,
    IbcPacketTimeoutMsg, IbcReceiveResponse, StdResult,
};
use cosmwasm_schema::cw_serde;
use cosmos_sdk_proto::ibc::core::channel::v1::{acknowledgement::Response, Acknowledgement};
use prost::Message;

use paw_common::event::{attr, ty};
use paw_common::ibc::{ack_is_success, ProcessedPackets};
use paw_common::keeper::PawQuery;

use crate::contract::apply_price_submission;

pub const IBC_VERSION: &str = "paw-oracle-1";

const PROCESSED_PACKETS: ProcessedPackets = ProcessedPackets::new("oracle_ibc_processed");

#[cw_serde]
pub struct RemotePriceSubmissionPacket {
    pub asset: String,
    pub price: cosmwasm_std::Decimal,
    pub nonce: String,
    pub validator: String,
    pub geo_region: Option<String>,
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
            "oracle ibc channels must be unordered",
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
    _deps: DepsMut<PawQuery>,
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
    _deps: DepsMut<PawQuery>,
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
    _deps: DepsMut<PawQuery>,
    _env: Env,
    msg: IbcChannelCloseMsg,
) -> StdResult<IbcBasicResponse> {
    let channel = msg.channel();
    Ok(IbcBasicResponse::new()
        .add_attribute(attr::ACTION, "ibc_channel_close")
        .add_attribute("channel_id", channel.endpoint.channel_id.clone()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_packet_receive(
    mut deps: DepsMut<PawQuery>,
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

    let packet: RemotePriceSubmissionPacket = match from_json(&msg.packet.data) {
        Ok(p) => p,
        Err(e) => {
            return Ok(IbcReceiveResponse::new(error_ack(format!(
                "invalid packet data: {e}"
            ))))
        }
    };

    let validator = match deps.api.addr_validate(&packet.validator) {
        Ok(addr) => addr,
        Err(e) => return Ok(IbcReceiveResponse::new(error_ack(e.to_string()))),
    };

    match apply_price_submission(
        deps.branch(),
        &env,
        &validator,
        &packet.asset,
        packet.price,
        &packet.nonce,
        packet.geo_region.as_deref(),
    ) {
        Ok(()) => Ok(IbcReceiveResponse::new(success_ack(b"ok".to_vec()))
            .add_attribute(attr::ACTION, "ibc_packet_receive")
            .add_event(
                cosmwasm_std::Event::new(ty::IBC_PACKET_PROCESSED)
                    .add_attribute(attr::ASSET, packet.asset)
                    .add_attribute(attr::VALIDATOR, validator.to_string()),
            )),
        Err(e) => Ok(IbcReceiveResponse::new(error_ack(e.to_string()))
            .add_attribute(attr::ACTION, "ibc_packet_receive_failed")
            .add_attribute(attr::REASON, e.to_string())),
    }
}

/// The oracle originates no outbound packets in this version, so there is no
/// pending state to reconcile here; acknowledgements are only decoded for
/// completeness and logging, as in the DEX's IBC handler.
#[cfg_attr(not(feature = "library"), entry_point)]
pub fn ibc_packet_ack(
    _deps: DepsMut<PawQuery>,
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
    _deps: DepsMut<PawQuery>,
    _env: Env,
    _msg: IbcPacketTimeoutMsg,
) -> StdResult<IbcBasicResponse> {
    Ok(IbcBasicResponse::new().add_attribute(attr::ACTION, "ibc_packet_timeout"))
}
