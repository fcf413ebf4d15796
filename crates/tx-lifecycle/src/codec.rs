//! Conversion between [`TxMeta`] and the persisted JSON document.
//!
//! Field names and encodings are shared with existing wallet stores: the
//! status is stored as its ordinal and every timestamp as a decimal string
//! of microseconds since the UNIX epoch, `"0"` meaning unset.

use crate::{
    error::{
        Error,
        Result,
    },
    types::{
        Timestamp,
        TransactionStatus,
        TxData,
        TxMeta,
        TxReceipt,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

#[derive(Serialize, Deserialize)]
struct StoredTxMeta {
    id: String,
    status: u8,
    from: String,
    created_time: String,
    submitted_time: String,
    confirmed_time: String,
    tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
    chain_id: String,
    #[serde(default)]
    tx: TxData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx_receipt: Option<TxReceipt>,
}

fn encode_time(time: Option<Timestamp>) -> String {
    time.map(|time| time.as_micros()).unwrap_or_default().to_string()
}

fn decode_time(field: &'static str, raw: &str) -> Result<Option<Timestamp>> {
    let micros: u64 = raw
        .parse()
        .map_err(|_| Error::InvalidRecord(format!("`{field}` is not a timestamp")))?;
    Ok((micros != 0).then(|| Timestamp::from_micros(micros)))
}

impl TxMeta {
    pub fn to_value(&self) -> Result<Value> {
        let stored = StoredTxMeta {
            id: self.id.clone(),
            status: self.status.into(),
            from: self.from.clone(),
            created_time: encode_time(self.created_time),
            submitted_time: encode_time(self.submitted_time),
            confirmed_time: encode_time(self.confirmed_time),
            tx_hash: self.tx_hash.clone(),
            origin: self.origin.clone(),
            group_id: self.group_id.clone(),
            chain_id: self.chain_id.clone(),
            tx: self.tx.clone(),
            tx_receipt: self.tx_receipt.clone(),
        };
        serde_json::to_value(stored).map_err(|e| Error::InvalidRecord(e.to_string()))
    }

    /// Decodes a persisted record, failing if a required field is missing
    /// or malformed.
    pub fn from_value(value: &Value) -> Result<Self> {
        let stored = StoredTxMeta::deserialize(value)
            .map_err(|e| Error::InvalidRecord(e.to_string()))?;
        let status = TransactionStatus::try_from(stored.status).map_err(|_| {
            Error::InvalidRecord(format!("unknown status {}", stored.status))
        })?;

        Ok(Self {
            id: stored.id,
            chain_id: stored.chain_id,
            from: stored.from,
            status,
            tx: stored.tx,
            tx_hash: stored.tx_hash,
            created_time: decode_time("created_time", &stored.created_time)?,
            submitted_time: decode_time("submitted_time", &stored.submitted_time)?,
            confirmed_time: decode_time("confirmed_time", &stored.confirmed_time)?,
            origin: stored.origin,
            group_id: stored.group_id,
            tx_receipt: stored.tx_receipt,
        })
    }
}

/// Serde adapter for optional `0x`-prefixed quantities, with the empty
/// string standing for "not assigned".
pub mod hex_quantity {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
        de::Error as _,
    };

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&format!("{value:#x}")),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None)
        }
        let digits = raw
            .strip_prefix("0x")
            .ok_or_else(|| D::Error::custom(format!("`{raw}` is not 0x-prefixed")))?;
        u64::from_str_radix(digits, 16)
            .map(Some)
            .map_err(D::Error::custom)
    }

    /// Parses a `0x`-prefixed quantity wider than a nonce, like a gas price.
    pub fn parse_u128(raw: &str) -> Option<u128> {
        let digits = raw.strip_prefix("0x")?;
        u128::from_str_radix(digits, 16).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxReceipt;
    use serde_json::json;

    fn sample_meta() -> TxMeta {
        let mut meta = TxMeta::new(
            "0x1",
            "0x2f015c60e0be116b1f0cd534704db9c92118fb6a",
            TxData {
                nonce: Some(0x7b),
                to: "0x0d8775f648430679a709e98d2b0cb6250d2887ef".to_string(),
                value: "0x16345785d8a0000".to_string(),
                data: vec![0xa9, 0x05, 0x9c, 0xbb],
                gas_limit: "0x5208".to_string(),
                gas_price: "0x4a817c800".to_string(),
                max_priority_fee_per_gas: None,
                max_fee_per_gas: Some("0x77359400".to_string()),
            },
        );
        meta.status = TransactionStatus::Confirmed;
        meta.tx_hash =
            "0xb903239f8543d04b5dc1ba6579132b143087c68db1b2168786408fcbce568238"
                .to_string();
        meta.submitted_time = Some(Timestamp::from_micros(1_700_000_000_000_001));
        meta.confirmed_time = Some(Timestamp::from_micros(1_700_000_000_500_000));
        meta.origin = Some("https://app.uniswap.org".to_string());
        meta.group_id = Some("swap-group".to_string());
        meta.tx_receipt = Some(TxReceipt {
            transaction_hash: meta.tx_hash.clone(),
            block_number: 11,
            contract_address: "0xb60e8dd61c5d32be8058bb8eb970870f07233155".to_string(),
            status: true,
            ..Default::default()
        });
        meta
    }

    #[test]
    fn persisted_record_decodes_to_the_same_meta() {
        let meta = sample_meta();

        let value = meta.to_value().unwrap();
        let decoded = TxMeta::from_value(&value).unwrap();

        assert_eq!(decoded, meta);
    }

    #[test]
    fn persisted_record_uses_wallet_field_names() {
        let value = sample_meta().to_value().unwrap();

        assert_eq!(value["status"], json!(4));
        assert_eq!(value["submitted_time"], json!("1700000000000001"));
        assert_eq!(value["chain_id"], json!("0x1"));
        assert_eq!(value["tx"]["nonce"], json!("0x7b"));
        assert_eq!(value["tx"]["data"], json!("a9059cbb"));
    }

    #[test]
    fn unset_times_and_nonce_are_encoded_as_empty_markers() {
        let meta = TxMeta::new("0x1", "0xabc", TxData::default());

        let value = meta.to_value().unwrap();

        assert_eq!(value["confirmed_time"], json!("0"));
        assert_eq!(value["tx"]["nonce"], json!(""));
        assert!(value.get("origin").is_none());
        assert_eq!(TxMeta::from_value(&value).unwrap(), meta);
    }

    #[test]
    fn zero_time_is_never_mistaken_for_unset() {
        let mut meta = TxMeta::new("0x1", "0xabc", TxData::default());
        meta.confirmed_time = Some(Timestamp::from_micros(0));

        let value = meta.to_value().unwrap();

        assert_eq!(value["confirmed_time"], json!("1"));
        assert_eq!(
            TxMeta::from_value(&value).unwrap().confirmed_time,
            Some(Timestamp::MIN)
        );
    }

    #[test]
    fn record_without_required_field_is_invalid() {
        let mut value = sample_meta().to_value().unwrap();
        value.as_object_mut().unwrap().remove("chain_id");

        let result = TxMeta::from_value(&value);

        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn record_with_unknown_status_is_invalid() {
        let mut value = sample_meta().to_value().unwrap();
        value["status"] = json!(42);

        let result = TxMeta::from_value(&value);

        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }
}
