use base64::Engine;
use serde::{Deserialize, Serialize};

/// Client → Server frames (spec §4.6). Binary payloads are base64-encoded
/// so the whole protocol stays valid UTF-8 JSON over a text-opcode
/// WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Stdin { data: String },
    Resize { cols: u16, rows: u16 },
    Ping,
}

/// Server → Client frames (spec §4.6).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Stdout { data: String },
    /// Never emitted today: `docker exec -t` merges stdout/stderr into one
    /// PTY stream, so there is nothing upstream to demux. Kept so a future
    /// exec mode that does separate the streams doesn't need a protocol
    /// change.
    Stderr { data: String },
    Exit { exit_code: i32 },
    Pong,
    Error { message: String },
}

pub fn encode_bytes(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn decode_bytes(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_parse_by_tag() {
        let stdin: ClientFrame = serde_json::from_str(r#"{"type":"stdin","data":"aGk="}"#).unwrap();
        assert!(matches!(stdin, ClientFrame::Stdin { data } if data == "aGk="));

        let resize: ClientFrame =
            serde_json::from_str(r#"{"type":"resize","cols":120,"rows":40}"#).unwrap();
        assert!(matches!(resize, ClientFrame::Resize { cols: 120, rows: 40 }));

        let ping: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, ClientFrame::Ping));
    }

    #[test]
    fn server_frames_serialize_with_tag() {
        let frame = ServerFrame::Stdout { data: encode_bytes(b"hi") };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"stdout""#));
        assert!(json.contains(r#""data":"aGk=""#));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode_bytes("not base64!!").is_err());
    }
}
