//! JSON-RPC envelope types.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every envelope this crate produces.
pub const JSONRPC_VERSION: &str = "2.0";

/// Inbound JSON-RPC request.
///
/// `chain_id` is a routing hint for the proxy; it is stripped before the
/// request reaches an upstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcRequest {
    pub id: i64,
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
    #[serde(rename = "chainId", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<i64>,
}

impl RpcRequest {
    pub fn new(id: i64, method: impl Into<String>) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
            chain_id: None,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_chain_id(mut self, chain_id: i64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Decode a request body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encode for the wire. serde_json leaves `<`, `>` and `&` unescaped, so
    /// hex payloads pass through untouched.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Best-effort recovery of a request id from a body that failed to decode.
pub fn recover_id(body: &[u8]) -> i64 {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_i64))
        .unwrap_or(0)
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outcome carried by a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcPayload<T> {
    Result(T),
    Error(RpcError),
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse<T> {
    pub id: i64,
    pub jsonrpc: String,
    pub payload: RpcPayload<T>,
}

impl<T> RpcResponse<T> {
    pub fn result(id: i64, result: T) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            payload: RpcPayload::Result(result),
        }
    }

    pub fn error(id: i64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            payload: RpcPayload::Error(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, RpcPayload::Error(_))
    }

    pub fn into_result(self) -> Result<T, RpcError> {
        match self.payload {
            RpcPayload::Result(result) => Ok(result),
            RpcPayload::Error(error) => Err(error),
        }
    }
}

impl<T: Serialize> Serialize for RpcResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RpcResponse", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("jsonrpc", &self.jsonrpc)?;
        match &self.payload {
            RpcPayload::Result(result) => state.serialize_field("result", result)?,
            RpcPayload::Error(error) => state.serialize_field("error", error)?,
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    jsonrpc: String,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

// Keeps an explicit `"result": null` distinguishable from a missing field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for RpcResponse<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawResponse::deserialize(deserializer)?;
        let payload = match (raw.result, raw.error) {
            (None | Some(Value::Null), Some(error)) => RpcPayload::Error(error),
            (Some(result), None) => {
                RpcPayload::Result(serde_json::from_value(result).map_err(de::Error::custom)?)
            }
            (None, None) => {
                return Err(de::Error::custom("response carries neither result nor error"))
            }
            (Some(_), Some(_)) => {
                return Err(de::Error::custom("response carries both result and error"))
            }
        };
        Ok(Self {
            id: raw.id.unwrap_or_default(),
            jsonrpc: raw.jsonrpc,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_strips_absent_fields() {
        let req = RpcRequest::new(7, "eth_chainId");
        let encoded: Value = serde_json::from_slice(&req.encode().unwrap()).unwrap();
        assert_eq!(encoded, json!({"id": 7, "jsonrpc": "2.0", "method": "eth_chainId"}));
    }

    #[test]
    fn test_request_decode_is_lenient() {
        let req = RpcRequest::decode(br#"{"method":"eth_blockNumber","chainId":1}"#).unwrap();
        assert_eq!(req.id, 0);
        assert_eq!(req.jsonrpc, "");
        assert_eq!(req.chain_id, Some(1));
        assert!(req.params.is_none());

        assert!(RpcRequest::decode(b"").is_err());
        assert!(RpcRequest::decode(b"[1,2]").is_err());
    }

    #[test]
    fn test_encode_does_not_escape_html() {
        let req = RpcRequest::new(1, "eth_call").with_params(vec![json!("<0x&ab>")]);
        let encoded = String::from_utf8(req.encode().unwrap()).unwrap();
        assert!(encoded.contains("<0x&ab>"));
    }

    #[test]
    fn test_recover_id() {
        assert_eq!(recover_id(br#"{"id":5,"params":{"a":1}}"#), 5);
        assert_eq!(recover_id(br#"{"id":"abc"}"#), 0);
        assert_eq!(recover_id(b"garbage"), 0);
    }

    #[test]
    fn test_error_response_serialization() {
        let res = RpcResponse::<Value>::error(3, -32000, "method not allowed");
        let encoded = serde_json::to_value(&res).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": 3,
                "jsonrpc": "2.0",
                "error": {"code": -32000, "message": "method not allowed"}
            })
        );
    }

    #[test]
    fn test_response_deserialization() {
        let res: RpcResponse<String> =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","result":"0x1"}"#).unwrap();
        assert_eq!(res.into_result().unwrap(), "0x1");

        let res: RpcResponse<Option<String>> =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","result":null}"#).unwrap();
        assert_eq!(res.into_result().unwrap(), None);

        let res: RpcResponse<String> = serde_json::from_str(
            r#"{"id":2,"jsonrpc":"2.0","result":null,"error":{"code":-32000,"message":"boom"}}"#,
        )
        .unwrap();
        assert!(res.is_error());
        assert_eq!(res.into_result().unwrap_err().message, "boom");
    }

    #[test]
    fn test_response_requires_exactly_one_payload() {
        assert!(serde_json::from_str::<RpcResponse<Value>>(r#"{"id":1,"jsonrpc":"2.0"}"#).is_err());
        assert!(serde_json::from_str::<RpcResponse<Value>>(
            r#"{"id":1,"jsonrpc":"2.0","result":"0x1","error":{"code":1,"message":"x"}}"#
        )
        .is_err());
    }
}
