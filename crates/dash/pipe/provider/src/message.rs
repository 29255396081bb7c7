use anyhow::{bail, Error, Result};
pub use ark_core_k8s::data::Name;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
pub use serde_json::Value as DynValue;
use strum::{Display, EnumString};

use crate::storage::StorageType;

pub type DynMap = serde_json::Map<String, DynValue>;

/// The wire envelope (spec.md §3 "Envelope", §4.1 Codec).
///
/// `__timestamp` and `__payloads` are reserved top-level keys; every other
/// key of the user value is merged alongside them. If the user value is not
/// itself a mapping, callers should wrap it as `{"value": v}` before
/// constructing a `PipeMessage` (see `crate::model::Model::build_envelope`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipeMessage<Value = DynValue, Payload = Bytes>
where
    Payload: JsonSchema,
{
    #[serde(rename = "__payloads")]
    pub payloads: Vec<PipePayload<Payload>>,
    #[serde(rename = "__timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub value: Value,
}

impl<Value, Payload> PipeMessage<Value, Payload>
where
    Payload: JsonSchema,
{
    pub fn new(value: Value) -> Self {
        Self {
            payloads: Vec::default(),
            timestamp: Utc::now(),
            value,
        }
    }

    pub fn with_payloads(payloads: Vec<PipePayload<Payload>>, value: Value) -> Self {
        Self {
            payloads,
            timestamp: Utc::now(),
            value,
        }
    }

    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encodes this envelope with the given codec (spec.md §4.1 encode
    /// contract). JSON carries no explicit opcode byte -- its leading `{`
    /// or `[` already falls in the ASCII range and doubles as the opcode.
    pub fn to_bytes(&self, codec: Codec) -> Result<Bytes>
    where
        Payload: Serialize,
        Value: Serialize,
    {
        match codec {
            Codec::Json => ::serde_json::to_vec(self)
                .map(Into::into)
                .map_err(Into::into),
            Codec::MessagePack => {
                let mut buf = vec![OpCode::MessagePack as u8];
                ::rmp_serde::encode::write(&mut buf, self)
                    .map(|()| buf.into())
                    .map_err(Into::into)
            }
        }
    }
}

impl<Value, Payload> TryFrom<&[u8]> for PipeMessage<Value, Payload>
where
    Payload: DeserializeOwned + JsonSchema,
    Value: DeserializeOwned,
{
    type Error = Error;

    /// Hard decode: unlike `decode_opt`, any decode failure (malformed body
    /// included) is an error. Used by the request/reply path, where a
    /// single malformed reply has no "next message" to fall through to.
    fn try_from(bytes: &[u8]) -> Result<Self> {
        decode_opt(bytes)?.ok_or_else(|| Error::msg("malformed message body"))
    }
}

impl<Value, Payload> TryFrom<Bytes> for PipeMessage<Value, Payload>
where
    Payload: DeserializeOwned + JsonSchema,
    Value: DeserializeOwned,
{
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self> {
        <&[u8]>::try_into(&bytes)
    }
}

/// Decodes a Codec-opcode-prefixed byte stream (spec.md §4.1 decode
/// contract).
///
/// - Empty input is decode-fatal (`DecodeEmpty`).
/// - A malformed JSON or MessagePack body is a *soft* failure: returns
///   `Ok(None)` so that a subscriber loop can skip the message and keep
///   reading (spec.md §4.5, §7, §8 property 7, scenario S4).
/// - Opcode `0x81` (CBOR) is reserved and never implemented: decoding it is
///   always decode-fatal (spec.md §4.1, §8 boundary 12).
/// - Any other opcode byte is decode-fatal (`DecodeUnknownOpcode`).
pub fn decode_opt<T>(bytes: &[u8]) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(&first) = bytes.first() else {
        bail!("cannot decode an empty message");
    };

    match OpCode::from(first) {
        OpCode::Ascii => Ok(::serde_json::from_slice(bytes).ok()),
        OpCode::MessagePack => Ok(::rmp_serde::from_slice(&bytes[1..]).ok()),
        OpCode::CborReserved => {
            bail!("CBOR decoding (opcode 0x81) is reserved and not implemented")
        }
        OpCode::Unsupported => bail!("cannot infer codec opcode: 0x{first:02x}"),
    }
}

/// A single out-of-band binary side-payload descriptor (spec.md §3 "Payload
/// Descriptor"). `value` is populated only on the receive side, after
/// rehydration (see `crate::channel::ModelChannel`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipePayload<Value = Bytes>
where
    Value: JsonSchema,
{
    pub key: String,
    // NOTE: accept both the canonical `{key, model, path, storage}` shape
    // and older producers that send `key` alone (spec.md §9 open question
    // 1); every field but `key` therefore defaults on decode.
    #[serde(default)]
    pub model: Option<Name>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub storage: Option<StorageType>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl<Value> PipePayload<Value>
where
    Value: JsonSchema,
{
    pub fn new(key: String, value: Option<Value>) -> Self {
        Self {
            key,
            model: None,
            path: None,
            storage: None,
            value,
        }
    }

    pub fn with_location(key: String, model: Name, path: String) -> Self {
        Self {
            key,
            model: Some(model),
            path: Some(path),
            storage: Some(StorageType::S3),
            value: None,
        }
    }

    /// Drops the rehydrated bytes, keeping only the locator fields.
    pub fn as_descriptor<T>(&self) -> PipePayload<T>
    where
        T: JsonSchema,
    {
        PipePayload {
            key: self.key.clone(),
            model: self.model.clone(),
            path: self.path.clone(),
            storage: self.storage,
            value: None,
        }
    }
}

/// Encoding selected for `Model Channel::publish`/`request` (spec.md §4.1).
/// CBOR is intentionally absent: it is a reserved, undecodable opcode, never
/// an encode target.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    EnumString,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum Codec {
    #[default]
    Json,
    MessagePack,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OpCode {
    Unsupported,
    Ascii,
    MessagePack,
    CborReserved,
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value {
            0x00..=0x7F => Self::Ascii,
            0x80 => Self::MessagePack,
            0x81 => Self::CborReserved,
            _ => Self::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_opcode_is_ascii() {
        let message = PipeMessage::<_, Bytes>::new(serde_json::json!({"a": 1}));
        let bytes = message.to_bytes(Codec::Json).unwrap();
        assert!(bytes[0] <= 0x7F);
    }

    #[test]
    fn messagepack_opcode_is_0x80() {
        let message = PipeMessage::<_, Bytes>::new(serde_json::json!({"a": 1}));
        let bytes = message.to_bytes(Codec::MessagePack).unwrap();
        assert_eq!(bytes[0], 0x80);
    }

    #[test]
    fn empty_input_is_decode_fatal() {
        let result = decode_opt::<DynValue>(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn reserved_cbor_opcode_is_decode_fatal() {
        let result = decode_opt::<DynValue>(&[0x81, 0x00]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_opcode_is_decode_fatal() {
        let result = decode_opt::<DynValue>(&[0xAA]);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_json_body_is_soft_none() {
        let result: Result<Option<DynValue>> = decode_opt(b"{");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn malformed_messagepack_body_is_soft_none() {
        let result: Result<Option<DynValue>> = decode_opt(&[0x80, 0xC1]);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn json_messagepack_round_trip_agree() {
        let message = PipeMessage::<_, Bytes>::new(serde_json::json!({"a": 1, "b": "two"}));
        let json = message.to_bytes(Codec::Json).unwrap();
        let msgpack = message.to_bytes(Codec::MessagePack).unwrap();

        let from_json: PipeMessage = json.try_into().unwrap();
        let from_msgpack: PipeMessage = msgpack.try_into().unwrap();
        assert_eq!(from_json.value, from_msgpack.value);
    }
}
