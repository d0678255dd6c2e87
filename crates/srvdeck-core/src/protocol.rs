use crate::color::Hsla;
use base64::Engine as _;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Tags the client is prepared to dispatch. Anything else is an unknown command.
pub const SERVER_COMMAND_TYPES: [&str; 6] = [
    "Print",
    "Status",
    "Identity",
    "ForeignCommand",
    "ServerList",
    "ServerLog",
];

/// Wire envelope shared by both directions: `{"type": ..., "body": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    pub fn into_server_command(self) -> Result<ServerCommand, CommandError> {
        if !SERVER_COMMAND_TYPES.contains(&self.kind.as_str()) {
            return Err(CommandError::UnknownType(self.kind));
        }
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(self.kind.clone()));
        if let Some(body) = self.body {
            object.insert("body".to_string(), body);
        }
        serde_json::from_value(Value::Object(object)).map_err(|err| CommandError::InvalidBody {
            kind: self.kind,
            reason: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unexpected command type: {0}")]
    UnknownType(String),
    #[error("malformed {kind} body: {reason}")]
    InvalidBody { kind: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "body")]
pub enum ClientCommand {
    SetServer(String),
    ServerLog,
    Command(CommandLine),
    ListServers,
    CreateServer,
    Status(String),
}

impl ClientCommand {
    pub fn tag(&self) -> &'static str {
        match self {
            ClientCommand::SetServer(_) => "SetServer",
            ClientCommand::ServerLog => "ServerLog",
            ClientCommand::Command(_) => "Command",
            ClientCommand::ListServers => "ListServers",
            ClientCommand::CreateServer => "CreateServer",
            ClientCommand::Status(_) => "Status",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandLine {
    pub id: String,
    pub cmd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "body")]
pub enum ServerCommand {
    Print(String),
    Status(Map<String, Value>),
    Identity(Identity),
    ForeignCommand(ForeignCommand),
    ServerList(Vec<InstanceRecord>),
    ServerLog(ServerLogPage),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub hue: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignCommand {
    /// Participant id, resolved against the `clients` field of the stats model.
    pub id: String,
    pub cmd: String,
    #[serde(default)]
    pub out: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hue: u8,
    #[serde(default, flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerLogPage {
    pub server_id: String,
    pub page_no: u32,
    #[serde(default)]
    pub messages: Vec<LogLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    In,
    Out,
    Meta,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::In => "in",
            LineKind::Out => "out",
            LineKind::Meta => "meta",
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(LineKind::In),
            "out" => Ok(LineKind::Out),
            "meta" => Ok(LineKind::Meta),
            other => Err(format!("Unknown line kind: {other}")),
        }
    }
}

impl Serialize for LineKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LineKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One transcript line. Accepts both `{text, kind}` and the server's
/// `{body, msg_type, timestamp}` spelling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    #[serde(alias = "body")]
    pub text: String,
    #[serde(alias = "msg_type")]
    pub kind: LineKind,
    /// Unix seconds at which the server recorded the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip)]
    pub color: Option<Hsla>,
}

impl LogLine {
    pub fn new(text: impl Into<String>, kind: LineKind, color: Option<Hsla>) -> Self {
        Self {
            text: text.into(),
            kind,
            timestamp: None,
            color,
        }
    }

    pub fn meta(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::Meta, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameEncoding {
    /// JSON in websocket text frames.
    #[default]
    Text,
    /// Base64 of the JSON in binary frames.
    Base64,
}

impl FrameEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameEncoding::Text => "text",
            FrameEncoding::Base64 => "base64",
        }
    }
}

impl FromStr for FrameEncoding {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "text" | "json" => Ok(FrameEncoding::Text),
            "base64" | "binary" => Ok(FrameEncoding::Base64),
            other => Err(format!("Unknown frame encoding: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Command(Envelope),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("binary frame is neither base64 nor utf-8")]
    Utf8,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandCodec {
    encoding: FrameEncoding,
    max_frame_bytes: usize,
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new(FrameEncoding::default(), DEFAULT_MAX_FRAME_BYTES)
    }
}

impl CommandCodec {
    pub fn new(encoding: FrameEncoding, max_frame_bytes: usize) -> Self {
        Self {
            encoding,
            max_frame_bytes,
        }
    }

    pub fn encode(&self, command: &ClientCommand) -> Result<Frame, CodecError> {
        let json =
            serde_json::to_string(command).map_err(|err| CodecError::Encode(err.to_string()))?;
        let frame = match self.encoding {
            FrameEncoding::Text => Frame::Text(json),
            FrameEncoding::Base64 => Frame::Binary(
                base64::engine::general_purpose::STANDARD
                    .encode(json)
                    .into_bytes(),
            ),
        };
        if frame.len() > self.max_frame_bytes {
            return Err(CodecError::OversizedFrame {
                size: frame.len(),
                max: self.max_frame_bytes,
            });
        }
        Ok(frame)
    }

    /// Decodes an inbound frame regardless of the configured outbound encoding.
    /// Text that does not parse as an envelope comes back as `Decoded::Raw`.
    pub fn decode(&self, frame: &Frame) -> Result<Decoded, CodecError> {
        if frame.len() > self.max_frame_bytes {
            return Err(CodecError::OversizedFrame {
                size: frame.len(),
                max: self.max_frame_bytes,
            });
        }
        let text = match frame {
            Frame::Text(text) => text.clone(),
            Frame::Binary(bytes) => binary_payload_text(bytes)?,
        };
        match serde_json::from_str::<Envelope>(text.trim()) {
            Ok(envelope) => Ok(Decoded::Command(envelope)),
            Err(_) => Ok(Decoded::Raw(text)),
        }
    }
}

fn binary_payload_text(bytes: &[u8]) -> Result<String, CodecError> {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    let trimmed = &bytes[start..end];
    if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(trimmed) {
        if let Ok(text) = String::from_utf8(decoded) {
            return Ok(text);
        }
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::Utf8)
}
