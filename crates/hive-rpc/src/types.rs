//! Wire types for Hive's JSON-RPC surface (`condenser_api` / `network_broadcast_api`).

use serde::{Deserialize, Serialize};

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: P,
    pub id: u64,
}

impl<P> JsonRpcRequest<P> {
    /// Build a request for the given method, params, and request id.
    pub fn new(method: impl Into<String>, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 response envelope. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<R> {
    #[serde(default)]
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorBody>,
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

/// `condenser_api.get_dynamic_global_properties` result (trimmed to the
/// fields the node pool needs).
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u64,
}

/// A single Hive block as returned by `condenser_api.get_block`.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub block_id: String,
    /// Hive timestamps are UTC but carry no `Z`/offset suffix on the wire.
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub transaction_ids: Vec<String>,
}

/// A transaction within a block, carrying its operations as `[name, data]`
/// tuples per Hive's wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub operations: Vec<(String, serde_json::Value)>,
}

/// A decoded `custom_json` operation body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomJsonOperation {
    #[serde(default)]
    pub required_auths: Vec<String>,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    pub id: String,
    pub json: String,
}

/// `condenser_api.get_accounts` result entry (trimmed to existence +
/// resource-credit fields used by the startup prober).
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub name: String,
}

/// Params for `rc_api.find_rcs`.
#[derive(Debug, Clone, Serialize)]
pub struct FindRcsParams {
    pub accounts: Vec<String>,
}

/// `rc_api.find_rcs` result.
#[derive(Debug, Clone, Deserialize)]
pub struct FindRcsResult {
    pub rc_accounts: Vec<RcAccount>,
}

/// One entry of `rc_api.find_rcs`'s `rc_accounts` (trimmed to the mana
/// field the startup prober needs).
#[derive(Debug, Clone, Deserialize)]
pub struct RcAccount {
    pub rc_manabar: RcManabar,
}

/// An account's resource-credit manabar. Hive serializes `current_mana`
/// as a decimal string since it can exceed a JS-safe integer.
#[derive(Debug, Clone, Deserialize)]
pub struct RcManabar {
    pub current_mana: String,
}

/// One entry returned by `condenser_api.get_following`.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowEntry {
    pub following: String,
    pub what: Vec<String>,
}

/// Result of `network_broadcast_api.broadcast_transaction_synchronous`.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastResult {
    pub id: String,
}

/// A signed transaction envelope ready for broadcast. The signing
/// primitive itself (turning an unsigned transaction plus a posting key
/// into this structure) is an external collaborator (spec §1).
#[derive(Debug, Clone, Serialize)]
pub struct SignedTransaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: String,
    pub operations: Vec<(String, serde_json::Value)>,
    pub signatures: Vec<String>,
}

/// A transaction awaiting a signature, as handed to [`crate::signing::Signer`].
#[derive(Debug, Clone, Serialize)]
pub struct UnsignedTransaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: String,
    pub operations: Vec<(String, serde_json::Value)>,
}

impl UnsignedTransaction {
    /// Build an unsigned transaction carrying a single `custom_json`
    /// operation, stamped with a head-relative TaPoS reference and a
    /// 30-second expiration (the convention the reference Hive clients
    /// use to guard against replay on a fork).
    #[must_use]
    pub fn custom_json(
        head_block_number: u64,
        head_block_id: &str,
        now: chrono::DateTime<chrono::Utc>,
        op: &CustomJsonOperation,
    ) -> Self {
        let ref_block_num = (head_block_number & 0xffff) as u16;
        let ref_block_prefix = ref_block_prefix(head_block_id);
        let expiration = (now + chrono::Duration::seconds(30))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        Self {
            ref_block_num,
            ref_block_prefix,
            expiration,
            operations: vec![(
                "custom_json".to_string(),
                serde_json::to_value(op).unwrap_or(serde_json::Value::Null),
            )],
        }
    }
}

/// Derive the TaPoS `ref_block_prefix` from a block id: the second
/// little-endian 32-bit word of the (hex-encoded) block hash.
fn ref_block_prefix(block_id: &str) -> u32 {
    let bytes = (8..16)
        .filter_map(|i| u8::from_str_radix(block_id.get(i * 2..i * 2 + 2)?, 16).ok())
        .collect::<Vec<u8>>();
    if bytes.len() < 4 {
        return 0;
    }
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_block_prefix_matches_second_word() {
        // block_id bytes 8..16 are `cc dd ee ff 00 11 22 33`, little-endian -> 0x33221100
        let prefix = ref_block_prefix("aabbccddeeff0011223344556677");
        assert_eq!(prefix, 0x3322_1100);
    }

    #[test]
    fn custom_json_unsigned_tx_has_one_operation() {
        use chrono::TimeZone;
        let op = CustomJsonOperation {
            required_auths: vec![],
            required_posting_auths: vec!["alice".into()],
            id: "podping".into(),
            json: "{}".into(),
        };
        let now = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let tx = UnsignedTransaction::custom_json(100, "00000064aabbccdd11223344", now, &op);
        assert_eq!(tx.ref_block_num, 100);
        assert_eq!(tx.operations.len(), 1);
        assert_eq!(tx.operations[0].0, "custom_json");
    }

    #[test]
    fn request_carries_jsonrpc_2_0() {
        let req = JsonRpcRequest::new("condenser_api.get_block", [123u64], 1);
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, 1);
    }

    #[test]
    fn response_decodes_result() {
        let json = r#"{"result": {"head_block_number": 42}}"#;
        let resp: JsonRpcResponse<DynamicGlobalProperties> =
            serde_json::from_str(json).expect("parse failed");
        assert_eq!(resp.result.expect("missing result").head_block_number, 42);
        assert!(resp.error.is_none());
    }

    #[test]
    fn response_decodes_error() {
        let json = r#"{"error": {"code": -32000, "message": "boom"}}"#;
        let resp: JsonRpcResponse<DynamicGlobalProperties> =
            serde_json::from_str(json).expect("parse failed");
        assert!(resp.result.is_none());
        assert_eq!(resp.error.expect("missing error").code, -32000);
    }

    #[test]
    fn find_rcs_result_decodes_current_mana() {
        let json = r#"{"rc_accounts": [{"rc_manabar": {"current_mana": "123456789"}}]}"#;
        let result: FindRcsResult = serde_json::from_str(json).expect("parse failed");
        assert_eq!(result.rc_accounts.len(), 1);
        assert_eq!(result.rc_accounts[0].rc_manabar.current_mana, "123456789");
    }

    #[test]
    fn block_decodes_custom_json_operation() {
        let json = r#"{
            "block_id": "0000000a...",
            "timestamp": "2024-01-01T00:00:03",
            "transactions": [
                {"operations": [["custom_json", {"id": "podping", "json": "{}", "required_posting_auths": ["alice"]}]]}
            ]
        }"#;
        let block: Block = serde_json::from_str(json).expect("parse failed");
        assert_eq!(block.transactions.len(), 1);
        let (name, data) = &block.transactions[0].operations[0];
        assert_eq!(name, "custom_json");
        let op: CustomJsonOperation = serde_json::from_value(data.clone()).expect("decode op");
        assert_eq!(op.id, "podping");
    }
}
