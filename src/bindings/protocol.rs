//! Wire Protocol and Codec
//!
//! This protocol defines the text messages exchanged between the native side
//! and the hosted script context, and the single place where native values
//! are turned into script text.
//!
//! Requests travel script → native, responses travel native-call results
//! script → native. Both are JSON objects:
//!
//! ```text
//! {"seq": 1, "function": "add", "params": [2, 3]}     request ("name" accepted for "function")
//! {"seq": 1, "result": 7}                             response, present defaults to true
//! {"seq": 1, "present": false}                        response for a discarded call
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write;

use crate::core::error::{CodecError, CodecResult};

/// A call from the script side to an exposed native function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub seq: u32,
    #[serde(alias = "name")]
    pub function: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl CallRequest {
    pub fn new(seq: u32, function: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            seq,
            function: function.into(),
            params,
        }
    }
}

/// The outcome of a call, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub seq: u32,
    #[serde(default)]
    pub result: Value,
    /// `false` when the call was discarded rather than resolved with a value
    #[serde(default = "present_by_default")]
    pub present: bool,
}

fn present_by_default() -> bool {
    true
}

impl CallResponse {
    pub fn resolved(seq: u32, result: Value) -> Self {
        Self {
            seq,
            result,
            present: true,
        }
    }

    pub fn discarded(seq: u32) -> Self {
        Self {
            seq,
            result: Value::Null,
            present: false,
        }
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Request(CallRequest),
    Response(CallResponse),
}

/// Serialization rules for the bridge. Stateless.
pub struct Codec;

impl Codec {
    pub fn encode_request(request: &CallRequest) -> CodecResult<String> {
        serde_json::to_string(request).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    pub fn encode_response(response: &CallResponse) -> CodecResult<String> {
        serde_json::to_string(response).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    /// Classify and decode raw inbound text.
    ///
    /// An object carrying `result` or `present` is a response; anything else
    /// must be a well-formed request. Never panics.
    pub fn decode_inbound(text: &str) -> CodecResult<InboundMessage> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(CodecError::NotAnObject);
        };

        let Some(seq) = map.get("seq") else {
            return Err(CodecError::MissingField("seq"));
        };
        if !seq.as_u64().is_some_and(|seq| u32::try_from(seq).is_ok()) {
            return Err(CodecError::InvalidField {
                field: "seq",
                reason: format!("expected an unsigned 32-bit integer, got {seq}"),
            });
        }

        if map.contains_key("result") || map.contains_key("present") {
            Self::from_map::<CallResponse>(map).map(InboundMessage::Response)
        } else {
            if !map.contains_key("function") && !map.contains_key("name") {
                return Err(CodecError::MissingField("function"));
            }
            Self::from_map::<CallRequest>(map).map(InboundMessage::Request)
        }
    }

    fn from_map<T: DeserializeOwned>(map: Map<String, Value>) -> CodecResult<T> {
        serde_json::from_value(Value::Object(map)).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Convert a native value into the wire value model
    pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
        serde_json::to_value(value).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    /// Convert a wire value into a native value
    pub fn decode_value<T: DeserializeOwned>(value: Value) -> CodecResult<T> {
        serde_json::from_value(value).map_err(|e| CodecError::Deserialize(e.to_string()))
    }

    /// Render a value as a script expression.
    ///
    /// JSON is valid script syntax except for the two line terminators JSON
    /// allows raw inside strings.
    pub fn script_literal(value: &Value) -> String {
        escape_line_terminators(value.to_string())
    }

    /// Render text as a double-quoted script string literal.
    ///
    /// The one escaping primitive: quotes, backslashes, newlines, tabs and all
    /// other control characters are escaped so the literal can be embedded in
    /// any generated statement. The output is also a valid JSON string.
    pub fn script_string(text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 2);
        out.push('"');
        for c in text.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\u{2028}' => out.push_str("\\u2028"),
                '\u{2029}' => out.push_str("\\u2029"),
                c if c.is_control() => {
                    let _ = write!(out, "\\u{:04x}", c as u32);
                }
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }
}

fn escape_line_terminators(text: String) -> String {
    if text.contains(['\u{2028}', '\u{2029}']) {
        text.replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029")
    } else {
        text
    }
}
