//! Event decoding: turns raw feed logs into typed [`GigEvent`]s.
//!
//! Decoding is pure. A log with an unrecognised event name is skipped; a
//! recognised log with missing or malformed fields is an error, which
//! rejects the whole page so nothing is coerced to a default.

use alloy_primitives::U256;
use chrono::DateTime;
use serde_json::Value;
use tracing::debug;

use crate::errors::{IndexerError, Result};
use crate::events::{EventKind, GigEvent, LogCoordinate};
use crate::rpc::RawLog;

/// Parameter names probed for each field, first match wins.
struct ParamKeys {
    actor: &'static [&'static str],
    amount: &'static [&'static str],
    writer: &'static [&'static str],
}

const GIG_ID_KEYS: &[&str] = &["gigId", "gig_id", "id"];

const fn keys(
    actor: &'static [&'static str],
    amount: &'static [&'static str],
    writer: &'static [&'static str],
) -> ParamKeys {
    ParamKeys {
        actor,
        amount,
        writer,
    }
}

fn param_keys(kind: EventKind) -> ParamKeys {
    match kind {
        EventKind::GigCreated => keys(&["creator"], &["amount"], &[]),
        EventKind::InviteSent => keys(
            &["creator", "sender", "from"],
            &[],
            &["writer", "invitee", "to"],
        ),
        EventKind::InviteAccepted => keys(
            &["writer", "ghostwriter", "acceptor"],
            &[],
            &["writer", "ghostwriter"],
        ),
        EventKind::DraftSubmitted => keys(&["writer", "submitter"], &[], &[]),
        EventKind::DraftRevised => keys(&["writer", "reviser"], &[], &[]),
        EventKind::DraftApproved => keys(&["creator", "approver"], &[], &[]),
        EventKind::DraftRejected => keys(&["creator", "rejecter"], &[], &[]),
        EventKind::PaymentReleased => keys(&["writer", "recipient", "to"], &["amount"], &[]),
        EventKind::PaymentRefunded => keys(&["creator", "recipient", "to"], &["amount"], &[]),
        EventKind::GigExpired => keys(&[], &["refundAmount", "amount"], &[]),
        EventKind::GigCancelled => keys(
            &["creator", "canceller"],
            &["refundAmount", "amount"],
            &[],
        ),
    }
}

/// Decode a page of raw logs, preserving feed order.
pub fn decode_logs(raw: &[RawLog]) -> Result<Vec<GigEvent>> {
    let mut events = Vec::with_capacity(raw.len());
    for log in raw {
        match EventKind::from_signature(&log.event) {
            Some(kind) => events.push(decode_single(log, kind)?),
            None => debug!("Skipping unrecognised log event {:?}", log.event),
        }
    }
    Ok(events)
}

/// Decode one log already known to be of `kind`.
pub fn decode_single(raw: &RawLog, kind: EventKind) -> Result<GigEvent> {
    let context = |field: &str| format!("{} log is missing `{field}`", kind.as_str());

    let gig_id = first_present(&raw.params, GIG_ID_KEYS)
        .ok_or_else(|| IndexerError::EventParse(context("gigId")))
        .and_then(parse_uint)?;

    let timestamp = raw
        .block_timestamp
        .as_ref()
        .ok_or_else(|| IndexerError::EventParse(context("blockTimestamp")))
        .and_then(parse_timestamp)?;

    let coordinate = LogCoordinate {
        block_number: required_int(raw.block_number.as_ref(), || context("blockNumber"))?,
        transaction_index: required_int(raw.transaction_index.as_ref(), || {
            context("transactionIndex")
        })?,
        log_index: required_int(raw.log_index.as_ref(), || context("logIndex"))?,
        transaction_hash: raw.transaction_hash.clone(),
    };

    let keys = param_keys(kind);
    let actor = first_present(&raw.params, keys.actor)
        .map(parse_address)
        .transpose()?;
    let amount = first_present(&raw.params, keys.amount)
        .map(parse_uint)
        .transpose()?;
    let writer = first_present(&raw.params, keys.writer)
        .map(parse_address)
        .transpose()?;

    if kind == EventKind::GigCreated {
        if actor.is_none() {
            return Err(IndexerError::EventParse(context("creator")));
        }
        if amount.is_none() {
            return Err(IndexerError::EventParse(context("amount")));
        }
    }

    Ok(GigEvent {
        kind,
        gig_id,
        actor,
        amount,
        writer,
        timestamp,
        coordinate,
    })
}

fn first_present<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| params.get(key))
        .find(|v| !v.is_null())
}

fn required_int(value: Option<&Value>, missing: impl FnOnce() -> String) -> Result<i64> {
    let value = value.ok_or_else(|| IndexerError::EventParse(missing()))?;
    parse_int(value)
}

/// Parse a non-negative integer that fits in `i64` from a JSON number,
/// decimal string or `0x` hex string.
fn parse_int(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => match strip_hex_prefix(s) {
            Some(hex) if is_digits(hex, 16) => i64::from_str_radix(hex, 16).ok(),
            Some(_) => None,
            None if is_digits(s, 10) => s.parse::<i64>().ok(),
            None => None,
        },
        _ => None,
    };
    parsed
        .filter(|n| *n >= 0)
        .ok_or_else(|| IndexerError::EventParse(format!("invalid integer: {value}")))
}

/// Parse a `uint256` into its canonical decimal string. Accepts a JSON
/// number (kept as its original text), a decimal string or a `0x` hex
/// string. Signs, fractions and exponents are rejected.
fn parse_uint(value: &Value) -> Result<String> {
    let invalid = || IndexerError::EventParse(format!("invalid unsigned integer: {value}"));
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(invalid()),
    };
    let (digits, radix) = match strip_hex_prefix(&text) {
        Some(hex) => (hex, 16),
        None => (text.as_str(), 10),
    };
    if !is_digits(digits, radix) {
        return Err(invalid());
    }
    U256::from_str_radix(digits, radix as u64)
        .map(|n| n.to_string())
        .map_err(|_| invalid())
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Non-empty and made only of digits in `radix`.
fn is_digits(s: &str, radix: u32) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_digit(radix))
}

/// Validate a 20-byte hex address and normalise it to lowercase `0x…`.
fn parse_address(value: &Value) -> Result<String> {
    let invalid = || IndexerError::EventParse(format!("invalid address: {value}"));
    let raw = value.as_str().ok_or_else(invalid)?;
    let digits = strip_hex_prefix(raw).unwrap_or(raw);
    let bytes = hex::decode(digits).map_err(|_| invalid())?;
    if bytes.len() != 20 {
        return Err(invalid());
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Block timestamps arrive as Unix seconds (number, decimal or hex string)
/// or as an RFC 3339 string.
fn parse_timestamp(value: &Value) -> Result<i64> {
    if let Some(s) = value.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.timestamp());
        }
    }
    parse_int(value)
}
