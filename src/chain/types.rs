use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A decoded call: pallet (section), call name (method) and its arguments.
/// Arguments are opaque and section-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub section: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<JsonValue>,
}

impl Call {
    pub fn new(section: &str, method: &str, args: Vec<JsonValue>) -> Self {
        Self {
            section: section.to_string(),
            method: method.to_string(),
            args,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&JsonValue> {
        self.args.get(index)
    }

    /// `section.method`, as shown in logs and alert details.
    pub fn path(&self) -> String {
        format!("{}.{}", self.section, self.method)
    }
}

/// A decoded extrinsic as supplied by the chain client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    #[serde(default)]
    pub signer: Option<String>,
    pub method: Call,
}

impl Extrinsic {
    pub fn signed(signer: &str, method: Call) -> Self {
        Self {
            signer: Some(signer.to_string()),
            method,
        }
    }

    pub fn unsigned(method: Call) -> Self {
        Self {
            signer: None,
            method,
        }
    }
}

/// Header notification from the block subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
}

/// A full block body: extrinsics in inclusion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub extrinsics: Vec<Extrinsic>,
}

// ============================================================
// Argument coercion helpers
// ============================================================

/// Interpret an argument as a balance. Accepts JSON integers, decimal strings
/// and `0x` hex strings. Anything else yields `None`.
pub fn arg_as_u128(value: &JsonValue) -> Option<u128> {
    match value {
        JsonValue::Number(n) => n.as_u64().map(u128::from).or_else(|| {
            // Integers past u64::MAX arrive as f64; the cast saturates.
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u128)
        }),
        JsonValue::String(s) => {
            let s = s.trim().replace([',', '_'], "");
            match s.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16).ok(),
                None => s.parse::<u128>().ok(),
            }
        }
        _ => None,
    }
}

/// Stringified form of an argument. Strings are returned without quotes,
/// everything else as compact JSON.
pub fn arg_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arg_as_u128() {
        assert_eq!(arg_as_u128(&json!(42)), Some(42));
        assert_eq!(
            arg_as_u128(&json!("2000000000000")),
            Some(2_000_000_000_000)
        );
        assert_eq!(arg_as_u128(&json!("0xff")), Some(255));
        assert_eq!(arg_as_u128(&json!("1_000")), Some(1000));
        assert_eq!(arg_as_u128(&json!(-1)), None);
        assert_eq!(arg_as_u128(&json!({"amount": 1})), None);
        assert_eq!(arg_as_u128(&json!("not a number")), None);
    }

    #[test]
    fn test_arg_as_u128_beyond_u64() {
        let big: JsonValue = serde_json::from_str("20000000000000000000").unwrap();
        assert_eq!(arg_as_u128(&big), Some(20_000_000_000_000_000_000));
        assert_eq!(arg_as_u128(&json!(1.5)), None);
        assert_eq!(arg_as_u128(&json!(-2e19)), None);
    }

    #[test]
    fn test_arg_to_string() {
        assert_eq!(arg_to_string(&json!("0x6c7369a0")), "0x6c7369a0");
        assert_eq!(arg_to_string(&json!({"aye": true})), r#"{"aye":true}"#);
    }

    #[test]
    fn test_parse_block_json() {
        let raw = r#"{"number": 7, "hash": "0xabc", "extrinsics": [
            {"signer": "alice",
             "method": {"section": "balances", "method": "transfer", "args": ["bob", 10]}},
            {"method": {"section": "timestamp", "method": "set", "args": [1700000000]}}
        ]}"#;
        let block: Block = serde_json::from_str(raw).unwrap();
        assert_eq!(block.number, 7);
        assert_eq!(block.extrinsics.len(), 2);
        assert_eq!(block.extrinsics[0].signer.as_deref(), Some("alice"));
        assert_eq!(block.extrinsics[0].method.path(), "balances.transfer");
        assert!(block.extrinsics[1].signer.is_none());
    }
}
