//! Inbound IBC packet routing for the Compute module (spec.md §4.6). A
//! `RemoteRequestComputePacket` asks this module to create a compute request
//! on behalf of a remote-chain requester whose payment already arrived via a
//! companion ICS-20 transfer and sits in this contract's account, mirroring
//! the DEX's `RemoteSwapPacket`. Idempotent under retried delivery; on
//! timeout or failure the escrowed transfer is refunded locally rather than
//! released without acknowledgement (spec.md §4.6 (b)).
#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    from_json, Binary, DepsMut, Env, IbcBasicResponse, IbcChannelCloseMsg, IbcChannelConnectMsg,
    IbcChannelOpenMsg, IbcChannelOpenResponse, IbcOrder, IbcPacketAckMsg, IbcPacketReceiveMsg,
    IbcPacketTimeoutMsg, IbcReceiveResponse, StdResult, Uint128,
};
use cosmwasm_schema::cw_serde;
use cosmos_sdk_proto::ibc::core::channel::v1::{acknowledgement::Response, Acknowledgement};
use prost::Message;

use paw_common::asset::Asset;
use paw_common::event::{attr, ty};
use paw_common::ibc::{ack_is_success, ProcessedPackets};
use paw_common::keeper::PawQuery;

use crate::contract::apply_request_compute;
use crate::state::PARAMS;

pub const IBC_VERSION: &str = "paw-compute-1";

const PROCESSED_PACKETS: ProcessedPackets = ProcessedPackets::new("compute_ibc_processed");

#[cw_serde]
pub struct RemoteRequestComputePacket {
    pub requester: String,
    pub payload: Binary,
    pub escrow: Uint128,
    pub deadline: u64,
    pub required_capabilities: u64,
    pub result_commitment: Binary,
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
            "compute ibc channels must be unordered",
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

    let packet: RemoteRequestComputePacket = match from_json(&msg.packet.data) {
        Ok(p) => p,
        Err(e) => {
            return Ok(IbcReceiveResponse::new(error_ack(format!(
                "invalid packet data: {e}"
            ))))
        }
    };

    let requester = match deps.api.addr_validate(&packet.requester) {
        Ok(addr) => addr,
        Err(e) => return Ok(IbcReceiveResponse::new(error_ack(e.to_string()))),
    };

    match apply_request_compute(
        deps.branch(),
        &env,
        &requester,
        packet.payload,
        packet.escrow,
        packet.deadline,
        packet.required_capabilities,
        packet.result_commitment,
    ) {
        Ok((id, provider)) => Ok(IbcReceiveResponse::new(success_ack(b"ok".to_vec()))
            .add_attribute(attr::ACTION, "ibc_packet_receive")
            .add_event(
                cosmwasm_std::Event::new(ty::REQUEST_CREATED)
                    .add_attribute(attr::REQUEST_ID, id.to_string())
                    .add_attribute(attr::PROVIDER, provider.to_string()),
            )),
        Err(e) => {
            // Escrow for this packet arrived via a companion ICS-20 transfer
            // already credited to this contract's account; since the request
            // was never created, refund it to the original requester rather
            // than leaving it stranded (spec.md §4.6 (b)).
            let refund_msg = match PARAMS.load(deps.storage) {
                Ok(params) if !packet.escrow.is_zero() => Some(
                    Asset::new(params.fee_denom, packet.escrow).into_msg(requester.clone()),
                ),
                _ => None,
            };
            let mut response = IbcReceiveResponse::new(error_ack(e.to_string()))
                .add_attribute(attr::ACTION, "ibc_packet_receive_failed")
                .add_attribute(attr::REASON, e.to_string());
            if let Some(refund_msg) = refund_msg {
                response = response.add_message(refund_msg).add_event(
                    cosmwasm_std::Event::new(ty::IBC_PACKET_REFUNDED)
                        .add_attribute(attr::REQUESTER, requester.to_string()),
                );
            }
            Ok(response)
        }
    }
}

/// The compute module originates no outbound packets in this version, so
/// there is no pending state to reconcile here; acknowledgements are only
/// decoded for completeness and logging, as in the DEX/Oracle IBC handlers.
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
