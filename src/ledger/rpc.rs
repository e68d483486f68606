//! A [`Ledger`] backed by a smart contract, queried over Ethereum JSON-RPC.
//!
//! The contract exposes a read-only getter `(uint256) -> string` that returns the digest anchored
//! for a key, or an empty string if nothing is anchored. The getter is invoked with `eth_call`
//! against the latest block:
//!
//! ```text
//! data = function_selector (4 bytes) || key (32 bytes, big endian)
//! ```
//!
//! and its return value is decoded as an ABI encoded `string`.

use std::{convert::TryInto, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{AnchoredDigest, Ledger, LedgerResult};
use crate::{proof::OwnerKey, settings::RpcLedgerSettings};

/// The length of an ABI word in bytes.
const WORD: usize = 32;

#[derive(Debug, Error)]
/// Errors of the [`RpcLedger`].
pub enum RpcLedgerError {
    #[error("invalid function selector `{0}`: expected 4 hex encoded bytes")]
    InvalidSelector(String),
    #[error("invalid contract address `{0}`: expected 20 hex encoded bytes")]
    InvalidContractAddress(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("JSON-RPC response has neither a result nor an error")]
    MissingResult,
    #[error("failed to decode the contract return value: {0}")]
    InvalidReturnValue(String),
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Clone)]
/// A client that reads anchored digests from a contract via JSON-RPC.
pub struct RpcLedger {
    /// HTTP client
    client: reqwest::Client,
    /// JSON-RPC endpoint
    url: Arc<String>,
    /// Contract address, `0x` prefixed
    contract_address: Arc<String>,
    /// Selector of the contract getter
    selector: [u8; 4],
}

impl RpcLedger {
    /// Creates a new JSON-RPC ledger client.
    ///
    /// # Errors
    /// Fails if the contract address or the function selector are malformed, or if the HTTP
    /// client can't be built.
    pub fn new(settings: RpcLedgerSettings) -> Result<Self, RpcLedgerError> {
        let selector: [u8; 4] = decode_hex(&settings.function_selector)
            .ok()
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .ok_or_else(|| RpcLedgerError::InvalidSelector(settings.function_selector.clone()))?;

        match decode_hex(&settings.contract_address) {
            Ok(bytes) if bytes.len() == 20 => {}
            _ => {
                return Err(RpcLedgerError::InvalidContractAddress(
                    settings.contract_address,
                ))
            }
        }
        let contract_address = format!(
            "0x{}",
            settings
                .contract_address
                .trim_start_matches("0x")
                .trim_start_matches("0X")
        );

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: Arc::new(settings.url),
            contract_address: Arc::new(contract_address),
            selector,
        })
    }

    /// Builds the `eth_call` data for the given key.
    fn call_data(&self, key: OwnerKey) -> String {
        let mut data = Vec::with_capacity(4 + WORD);
        data.extend_from_slice(&self.selector);
        data.extend_from_slice(&key.to_word());
        format!("0x{}", hex::encode(data))
    }

    /// Sends a JSON-RPC request and returns its result.
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcLedgerError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response: RpcResponse = self
            .client
            .post(self.url.as_str())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response {
            RpcResponse {
                error: Some(RpcErrorObject { code, message }),
                ..
            } => Err(RpcLedgerError::Rpc { code, message }),
            RpcResponse {
                result: Some(result),
                ..
            } => Ok(result),
            _ => Err(RpcLedgerError::MissingResult),
        }
    }

    async fn call_getter(&self, key: OwnerKey) -> Result<Option<AnchoredDigest>, RpcLedgerError> {
        let params = serde_json::json!([
            { "to": self.contract_address.as_str(), "data": self.call_data(key) },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let encoded = result.as_str().ok_or_else(|| {
            RpcLedgerError::InvalidReturnValue(format!("expected a hex string, got {}", result))
        })?;
        let anchored = decode_abi_string(encoded)?;
        debug!("ledger returned {} bytes for key {}", anchored.len(), key);
        Ok(Some(anchored)
            .filter(|digest| !digest.is_empty())
            .map(AnchoredDigest::new))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn anchored_digest(&self, key: OwnerKey) -> LedgerResult<Option<AnchoredDigest>> {
        self.call_getter(key).await.map_err(anyhow::Error::from)
    }

    async fn is_ready(&self) -> LedgerResult<()> {
        self.request("eth_blockNumber", serde_json::json!([]))
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(s)
}

/// Reads an ABI word as an offset or a length.
fn read_usize(bytes: &[u8], at: usize) -> Result<usize, RpcLedgerError> {
    let word = at
        .checked_add(WORD)
        .and_then(|end| bytes.get(at..end))
        .ok_or_else(|| RpcLedgerError::InvalidReturnValue("unexpected end of data".into()))?;
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(RpcLedgerError::InvalidReturnValue(
            "offset or length out of range".into(),
        ));
    }
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(low);
    Ok(u64::from_be_bytes(buf) as usize)
}

/// Decodes the ABI encoding of a single dynamic `string` return value.
///
/// An empty return value (`0x`) is treated like an empty string.
fn decode_abi_string(encoded: &str) -> Result<String, RpcLedgerError> {
    let bytes =
        decode_hex(encoded).map_err(|e| RpcLedgerError::InvalidReturnValue(e.to_string()))?;
    if bytes.is_empty() {
        return Ok(String::new());
    }

    let offset = read_usize(&bytes, 0)?;
    let len = read_usize(&bytes, offset)?;
    let data = offset
        .checked_add(WORD)
        .and_then(|start| Some(start..start.checked_add(len)?))
        .and_then(|range| bytes.get(range))
        .ok_or_else(|| RpcLedgerError::InvalidReturnValue("string exceeds the data".into()))?;
    String::from_utf8(data.to_vec()).map_err(|e| RpcLedgerError::InvalidReturnValue(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Filter;

    fn settings() -> RpcLedgerSettings {
        RpcLedgerSettings {
            url: "http://127.0.0.1:8545".to_string(),
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            function_selector: "0x6b2fafa9".to_string(),
        }
    }

    fn encode_abi_string(s: &str) -> String {
        let mut bytes = vec![0_u8; WORD];
        bytes[WORD - 1] = 0x20;
        let mut len = [0_u8; WORD];
        len[WORD - 8..].copy_from_slice(&(s.len() as u64).to_be_bytes());
        bytes.extend_from_slice(&len);
        bytes.extend_from_slice(s.as_bytes());
        let padding = (WORD - s.len() % WORD) % WORD;
        bytes.extend(std::iter::repeat(0).take(padding));
        format!("0x{}", hex::encode(bytes))
    }

    #[test]
    fn test_new_validates_settings() {
        assert!(RpcLedger::new(settings()).is_ok());

        let mut bad = settings();
        bad.function_selector = "0x6b2faf".to_string();
        assert!(matches!(
            RpcLedger::new(bad),
            Err(RpcLedgerError::InvalidSelector(_))
        ));

        let mut bad = settings();
        bad.contract_address = "0x1234".to_string();
        assert!(matches!(
            RpcLedger::new(bad),
            Err(RpcLedgerError::InvalidContractAddress(_))
        ));
    }

    #[test]
    fn test_call_data() {
        let ledger = RpcLedger::new(settings()).unwrap();
        let data = ledger.call_data(OwnerKey::new(42));
        assert_eq!(data.len(), 2 + 2 * (4 + WORD));
        assert!(data.starts_with("0x6b2fafa9"));
        assert!(data.ends_with("2a"));
    }

    #[test]
    fn test_decode_abi_string() {
        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(decode_abi_string(&encode_abi_string(digest)).unwrap(), digest);
        assert_eq!(decode_abi_string(&encode_abi_string("")).unwrap(), "");
        assert_eq!(decode_abi_string("0x").unwrap(), "");
    }

    #[test]
    fn test_decode_abi_string_truncated() {
        let encoded = encode_abi_string("abc");
        let truncated = &encoded[..2 + 2 * WORD + 10];
        assert!(matches!(
            decode_abi_string(truncated),
            Err(RpcLedgerError::InvalidReturnValue(_))
        ));
        assert!(decode_abi_string("0xzz").is_err());
    }

    /// Serves `reply` to every JSON-RPC request and records the request bodies.
    fn serve_rpc(reply: Value) -> (RpcLedger, Arc<std::sync::Mutex<Vec<Value>>>) {
        let requests = Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = requests.clone();
        let route = warp::post()
            .and(warp::body::json())
            .map(move |body: Value| {
                captured.lock().unwrap().push(body);
                warp::reply::json(&reply)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let mut settings = settings();
        settings.url = format!("http://{}", addr);
        (RpcLedger::new(settings).unwrap(), requests)
    }

    fn rpc_error(err: anyhow::Error) -> RpcLedgerError {
        err.downcast::<RpcLedgerError>().unwrap()
    }

    #[tokio::test]
    async fn test_anchored_digest() {
        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        let (ledger, requests) = serve_rpc(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": encode_abi_string(digest),
        }));

        let anchored = ledger.anchored_digest(OwnerKey::new(42)).await.unwrap();
        assert_eq!(anchored, Some(AnchoredDigest::new(digest)));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "eth_call");
        assert_eq!(
            request["params"][0]["to"],
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert_eq!(
            request["params"][0]["data"],
            format!("0x6b2fafa9{}{:02x}", "00".repeat(WORD - 1), 42)
        );
        assert_eq!(request["params"][1], "latest");
    }

    #[tokio::test]
    async fn test_anchored_digest_not_anchored() {
        let (ledger, _) = serve_rpc(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": encode_abi_string(""),
        }));
        assert_eq!(ledger.anchored_digest(OwnerKey::new(7)).await.unwrap(), None);

        let (ledger, _) =
            serve_rpc(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": "0x" }));
        assert_eq!(ledger.anchored_digest(OwnerKey::new(7)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_anchored_digest_rpc_error() {
        let (ledger, _) = serve_rpc(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" },
        }));
        let err = rpc_error(ledger.anchored_digest(OwnerKey::new(7)).await.unwrap_err());
        assert!(matches!(
            err,
            RpcLedgerError::Rpc { code: -32000, ref message } if message == "execution reverted"
        ));
    }

    #[tokio::test]
    async fn test_anchored_digest_missing_result() {
        let (ledger, _) = serve_rpc(serde_json::json!({ "jsonrpc": "2.0", "id": 1 }));
        let err = rpc_error(ledger.anchored_digest(OwnerKey::new(7)).await.unwrap_err());
        assert!(matches!(err, RpcLedgerError::MissingResult));
    }

    #[tokio::test]
    async fn test_anchored_digest_invalid_result() {
        let (ledger, _) =
            serve_rpc(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": 42 }));
        let err = rpc_error(ledger.anchored_digest(OwnerKey::new(7)).await.unwrap_err());
        assert!(matches!(err, RpcLedgerError::InvalidReturnValue(_)));
    }

    #[tokio::test]
    async fn test_is_ready() {
        let (ledger, requests) =
            serve_rpc(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" }));
        ledger.is_ready().await.unwrap();
        assert_eq!(requests.lock().unwrap()[0]["method"], "eth_blockNumber");
    }

    #[tokio::test]
    async fn test_https_endpoint() {
        let mut settings = settings();
        // nothing listens on port 1, so the TLS connection attempt is refused
        settings.url = "https://127.0.0.1:1".to_string();
        let ledger = RpcLedger::new(settings).unwrap();

        let err = format!("{:#}", ledger.is_ready().await.unwrap_err());
        assert!(err.contains("error trying to connect"));
        assert!(!err.contains("scheme is not http"));
    }
}
