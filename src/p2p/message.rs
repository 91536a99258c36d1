//! Wire message framing and payloads.
//!
//! Every message is a 12-byte ASCII command name, zero-padded, followed by
//! one bincode payload. A TCP connection carries exactly one message: the
//! sender writes the frame and closes its write side, the receiver reads
//! to EOF.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::COMMAND_LENGTH;

pub const CMD_VERSION: &str = "version";
pub const CMD_GET_BLOCKS: &str = "getblocks";
pub const CMD_INV: &str = "inv";
pub const CMD_GET_DATA: &str = "getdata";
pub const CMD_BLOCK: &str = "block";
pub const CMD_TX: &str = "tx";
pub const CMD_ADDR: &str = "addr";
pub const CMD_PING: &str = "ping";
pub const CMD_PONG: &str = "pong";

/// Handshake: protocol version plus the sender's best height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMsg {
    pub version: u32,
    pub best_height: i64,
    pub addr_from: String,
}

/// Request for the peer's tip-to-genesis block hash list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlocksMsg {
    pub addr_from: String,
}

/// What an inventory or data request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvKind {
    Block,
    Tx,
}

/// Announcement of available items (block hashes or transaction ids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvMsg {
    pub addr_from: String,
    pub kind: InvKind,
    pub items: Vec<Vec<u8>>,
}

/// Request for one specific item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataMsg {
    pub addr_from: String,
    pub kind: InvKind,
    pub id: Vec<u8>,
}

/// Delivery of one serialized block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMsg {
    pub addr_from: String,
    pub block: Vec<u8>,
}

/// Delivery of one serialized transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxMsg {
    pub addr_from: String,
    pub tx: Vec<u8>,
}

/// Peer list exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrMsg {
    pub addresses: Vec<String>,
}

/// Build a frame: fixed-width command then the bincode payload.
pub fn frame<T: Serialize>(command: &str, payload: &T) -> Vec<u8> {
    let mut bytes = cmd_to_bytes(command).to_vec();
    bytes.extend(bincode::serialize(payload).expect("payload serialization is infallible"));
    bytes
}

/// Frame with no payload (ping/pong).
pub fn frame_empty(command: &str) -> Vec<u8> {
    cmd_to_bytes(command).to_vec()
}

/// Split a received frame into command name and payload bytes. `None`
/// when the frame is shorter than the command field.
pub fn parse_frame(bytes: &[u8]) -> Option<(String, &[u8])> {
    if bytes.len() < COMMAND_LENGTH {
        return None;
    }
    let command = bytes_to_cmd(&bytes[..COMMAND_LENGTH]);
    Some((command, &bytes[COMMAND_LENGTH..]))
}

/// Decode a payload; handlers drop the connection on failure.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

fn cmd_to_bytes(command: &str) -> [u8; COMMAND_LENGTH] {
    let mut bytes = [0u8; COMMAND_LENGTH];
    for (i, byte) in command.bytes().take(COMMAND_LENGTH).enumerate() {
        bytes[i] = byte;
    }
    bytes
}

fn bytes_to_cmd(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_padding_roundtrip() {
        let bytes = cmd_to_bytes(CMD_VERSION);
        assert_eq!(bytes.len(), COMMAND_LENGTH);
        assert_eq!(bytes_to_cmd(&bytes), CMD_VERSION);
    }

    #[test]
    fn test_frame_roundtrip() {
        let msg = VersionMsg {
            version: 1,
            best_height: 42,
            addr_from: "localhost:3000".to_string(),
        };

        let framed = frame(CMD_VERSION, &msg);
        let (command, payload) = parse_frame(&framed).unwrap();

        assert_eq!(command, CMD_VERSION);
        let decoded: VersionMsg = decode_payload(payload).unwrap();
        assert_eq!(decoded.best_height, 42);
        assert_eq!(decoded.addr_from, "localhost:3000");
    }

    #[test]
    fn test_empty_frame_has_no_payload() {
        let framed = frame_empty(CMD_PING);
        let (command, payload) = parse_frame(&framed).unwrap();
        assert_eq!(command, CMD_PING);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(parse_frame(b"inv").is_none());
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let mut framed = frame(
            CMD_GET_BLOCKS,
            &GetBlocksMsg {
                addr_from: "localhost:3001".to_string(),
            },
        );
        framed.truncate(COMMAND_LENGTH + 2);

        let (_, payload) = parse_frame(&framed).unwrap();
        assert!(decode_payload::<GetBlocksMsg>(payload).is_err());
    }

    #[test]
    fn test_inv_kind_distinguished() {
        let msg = InvMsg {
            addr_from: "localhost:3000".to_string(),
            kind: InvKind::Tx,
            items: vec![vec![1, 2, 3]],
        };
        let framed = frame(CMD_INV, &msg);
        let (_, payload) = parse_frame(&framed).unwrap();
        let decoded: InvMsg = decode_payload(payload).unwrap();
        assert_eq!(decoded.kind, InvKind::Tx);
    }
}
