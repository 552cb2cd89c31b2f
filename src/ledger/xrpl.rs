//! XRP Ledger JSON-RPC client (`account_tx`).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::{LedgerClient, ObservedTransfer};

/// Seconds between the Unix epoch and the ripple epoch (2000-01-01).
const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

/// Drops per XRP.
const XRP_SCALE: u32 = 6;

/// Transactions requested per page.
const PAGE_LIMIT: u32 = 200;

/// Pages followed per query before giving up on older history.
const MAX_PAGES: u32 = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Reads incoming payments from an XRPL node.
pub struct XrplClient {
    http: reqwest::Client,
    endpoint: String,
}

impl XrplClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LedgerError> {
        let endpoint = endpoint.into();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, endpoint })
    }

    async fn account_tx(&self, params: Value) -> Result<Value, LedgerError> {
        let body = json!({ "method": "account_tx", "params": [params] });
        let request_failed = |e: reqwest::Error| LedgerError::RequestFailed {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        };

        self.http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)
    }
}

#[async_trait]
impl LedgerClient for XrplClient {
    async fn query_transfers(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ObservedTransfer>, LedgerError> {
        let mut transfers = Vec::new();
        let mut marker: Option<Value> = None;
        for page in 1..=MAX_PAGES {
            let mut params = json!({
                "account": recipient,
                "ledger_index_min": -1,
                "ledger_index_max": -1,
                "limit": PAGE_LIMIT,
                "forward": false,
            });
            if let Some(marker) = marker.take() {
                params["marker"] = marker;
            }

            let response = self.account_tx(params).await?;
            transfers.extend(parse_account_tx(&response, recipient, since)?);
            marker = next_marker(&response, since);
            if marker.is_none() {
                break;
            }
            debug!(page, "Following account_tx marker");
        }

        debug!(
            recipient = recipient,
            count = transfers.len(),
            "Fetched incoming transfers"
        );
        Ok(transfers)
    }
}

/// Extract validated, successful incoming payments from an `account_tx` response.
pub fn parse_account_tx(
    response: &Value,
    recipient: &str,
    since: DateTime<Utc>,
) -> Result<Vec<ObservedTransfer>, LedgerError> {
    let result = response
        .get("result")
        .ok_or_else(|| LedgerError::Malformed("missing 'result'".to_string()))?;

    if result.get("status").and_then(|s| s.as_str()) == Some("error") {
        let code = result
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown");
        let message = result
            .get("error_message")
            .and_then(|e| e.as_str())
            .unwrap_or("");
        return Err(LedgerError::Rpc(format!("{code} {message}").trim().to_string()));
    }

    let entries = result
        .get("transactions")
        .and_then(|t| t.as_array())
        .ok_or_else(|| LedgerError::Malformed("missing 'transactions'".to_string()))?;

    Ok(entries
        .iter()
        .filter_map(|entry| parse_entry(entry, recipient))
        .filter(|t| t.timestamp >= since)
        .collect())
}

/// Marker for the next (older) page, if the ledger has one and this page
/// has not already reached transactions older than `since`.
pub fn next_marker(response: &Value, since: DateTime<Utc>) -> Option<Value> {
    let result = response.get("result")?;
    let marker = result.get("marker")?.clone();
    let oldest = result
        .get("transactions")
        .and_then(|t| t.as_array())
        .and_then(|entries| entries.iter().filter_map(entry_time).min());
    oldest.is_none_or(|oldest| oldest >= since).then_some(marker)
}

fn entry_time(entry: &Value) -> Option<DateTime<Utc>> {
    let tx = entry.get("tx").or_else(|| entry.get("tx_json"))?;
    let ripple_date = tx.get("date").and_then(|d| d.as_i64())?;
    DateTime::from_timestamp(ripple_date + RIPPLE_EPOCH_OFFSET, 0)
}

fn parse_entry(entry: &Value, recipient: &str) -> Option<ObservedTransfer> {
    if !entry.get("validated").and_then(|v| v.as_bool()).unwrap_or(false) {
        return None;
    }
    // API v1 nests the transaction under `tx`, v2 under `tx_json`.
    let tx = entry.get("tx").or_else(|| entry.get("tx_json"))?;
    let meta = entry.get("meta")?;

    if tx.get("TransactionType")?.as_str()? != "Payment" {
        return None;
    }
    if meta.get("TransactionResult")?.as_str()? != "tesSUCCESS" {
        return None;
    }
    let destination = tx.get("Destination")?.as_str()?;
    if destination != recipient {
        return None;
    }

    let amount_value = meta
        .get("delivered_amount")
        .or_else(|| meta.get("DeliveredAmount"))
        .or_else(|| tx.get("Amount"))
        .or_else(|| tx.get("DeliverMax"))?;
    let (amount, currency, issuer) = parse_amount(amount_value)?;

    let tx_id = tx
        .get("hash")
        .or_else(|| entry.get("hash"))?
        .as_str()?
        .to_string();
    let ledger_index = tx
        .get("ledger_index")
        .or_else(|| entry.get("ledger_index"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let timestamp = entry_time(entry)?;

    let memos = tx
        .get("Memos")
        .and_then(|m| m.as_array())
        .map(|memos| {
            memos
                .iter()
                .filter_map(|m| decode_hex_utf8(m.get("Memo")?.get("MemoData")?.as_str()?))
                .collect()
        })
        .unwrap_or_default();

    Some(ObservedTransfer {
        tx_id,
        sender: tx.get("Account")?.as_str()?.to_string(),
        recipient: destination.to_string(),
        amount,
        currency,
        issuer,
        memos,
        timestamp,
        ledger_index,
    })
}

/// Parse an XRPL amount: a drops string for XRP, or an issued-currency object.
pub fn parse_amount(value: &Value) -> Option<(Decimal, String, Option<String>)> {
    match value {
        Value::String(drops) => {
            let drops: i128 = drops.parse().ok()?;
            Some((
                Decimal::from_i128_with_scale(drops, XRP_SCALE).normalize(),
                "XRP".to_string(),
                None,
            ))
        }
        Value::Object(obj) => {
            let raw = obj.get("value")?.as_str()?;
            let amount = Decimal::from_str(raw)
                .or_else(|_| Decimal::from_scientific(raw))
                .ok()?;
            let currency = decode_currency(obj.get("currency")?.as_str()?);
            let issuer = obj
                .get("issuer")
                .and_then(|i| i.as_str())
                .map(str::to_string);
            Some((amount, currency, issuer))
        }
        _ => None,
    }
}

/// Non-standard currency codes are 40 hex chars, NUL padded.
fn decode_currency(code: &str) -> String {
    if code.len() == 40
        && let Some(decoded) = decode_hex_utf8(code)
    {
        return decoded.trim_end_matches('\0').to_string();
    }
    code.to_string()
}

fn decode_hex_utf8(hex: &str) -> Option<String> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
