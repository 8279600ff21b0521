//! Shared IBC packet-handling helpers used by every module's `ibc.rs`
//! (spec.md §4.6): canonical acknowledgement decoding ("never via ad-hoc
//! JSON parsing") and the idempotent processed-sequence set a packet-receive
//! handler consults before applying any inbound state change.
use cosmos_sdk_proto::ibc::core::channel::v1::{acknowledgement::Response, Acknowledgement};
use cosmwasm_std::{StdError, StdResult, Storage};
use cw_storage_plus::Map;
use prost::Message;

/// Decodes an IBC `Acknowledgement` from its canonical protobuf wire form
/// and reports whether the counterparty reported success.
pub fn ack_is_success(data: &[u8]) -> StdResult<bool> {
    let ack = Acknowledgement::decode(data)
        .map_err(|e| StdError::generic_err(format!("invalid ibc acknowledgement: {e}")))?;
    Ok(matches!(ack.response, Some(Response::Result(_))))
}

/// Tracks `(channel_id, sequence)` pairs a packet-receive handler has
/// already applied, so retried delivery of the same packet is a no-op
/// (spec.md §4.6(a): "idempotent under retried delivery").
pub struct ProcessedPackets<'a> {
    map: Map<'a, (String, u64), ()>,
}

impl<'a> ProcessedPackets<'a> {
    pub const fn new(namespace: &'a str) -> Self {
        ProcessedPackets {
            map: Map::new(namespace),
        }
    }

    /// Returns `true` and records the packet if it has not been seen
    /// before; `false` without mutating on a retried delivery.
    pub fn record_if_new(
        &self,
        storage: &mut dyn Storage,
        channel_id: &str,
        sequence: u64,
    ) -> StdResult<bool> {
        let key = (channel_id.to_string(), sequence);
        if self.map.has(storage, key.clone()) {
            return Ok(false);
        }
        self.map.save(storage, key, &())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::MockStorage;

    #[test]
    fn replayed_sequence_is_not_reprocessed() {
        let set = ProcessedPackets::new("processed");
        let mut storage = MockStorage::new();
        assert!(set.record_if_new(&mut storage, "channel-0", 1).unwrap());
        assert!(!set.record_if_new(&mut storage, "channel-0", 1).unwrap());
        assert!(set.record_if_new(&mut storage, "channel-1", 1).unwrap());
    }

    #[test]
    fn decodes_success_acknowledgement() {
        let ack = Acknowledgement {
            response: Some(Response::Result(vec![1, 2, 3])),
        };
        let mut buf = Vec::new();
        Message::encode(&ack, &mut buf).unwrap();
        assert!(ack_is_success(&buf).unwrap());
    }

    #[test]
    fn decodes_error_acknowledgement() {
        let ack = Acknowledgement {
            response: Some(Response::Error("failed".to_string())),
        };
        let mut buf = Vec::new();
        Message::encode(&ack, &mut buf).unwrap();
        assert!(!ack_is_success(&buf).unwrap());
    }
}
