//! Decoding of raw stream entries into realtime items.
//!
//! Entries are positional field lists; the payload field is a
//! zstd-compressed JSON document. Failures fall into two classes, see
//! [`DecodeError::is_defect`]: a violation of the wire contract means
//! the producer and this consumer disagree about the stream layout and
//! continuing would silently mis-read every message, while a bad
//! payload only affects one message and is skipped upstream.

use serde::de::DeserializeOwned;

use crate::domain::{EvaNumber, InvalidEvaNumber, ServiceDate};
use crate::stream::{DecodeFailure, StreamEntry};

use super::types::{IrisChangeItem, IrisChangePayload, IrisPlanItem, IrisPlanPayload};

// Positional layout of plan entries:
// [hash_id, service_date, stop_id, plan_compressed]
const PLAN_FIELD_SERVICE_DATE: usize = 1;
const PLAN_FIELD_STOP_ID: usize = 2;
const PLAN_FIELD_PAYLOAD: usize = 3;

// Positional layout of change entries:
// [service_date, hash_id, change_hash, stop_id, time_crawled, change_compressed]
const CHANGE_FIELD_SERVICE_DATE: usize = 0;
const CHANGE_FIELD_STOP_ID: usize = 3;
const CHANGE_FIELD_PAYLOAD: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("entry has no field at index {index}")]
    MissingEntryField { index: usize },
    #[error("stop id field: {0}")]
    StopId(#[from] InvalidEvaNumber),
    #[error("payload could not be decompressed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("payload is not the expected JSON shape: {0}")]
    Json(#[from] serde_json::Error),
    #[error("item is unusable: {reason}")]
    Item { reason: &'static str },
}

impl DecodeError {
    /// Whether this failure breaks the wire contract. Contract breaks
    /// terminate consumption; anything else affects one message only.
    pub fn is_defect(&self) -> bool {
        match self {
            Self::MissingEntryField { .. } | Self::StopId(_) | Self::Json(_) => true,
            Self::Decompress(_) | Self::Item { .. } => false,
        }
    }
}

impl DecodeFailure for DecodeError {
    fn is_defect(&self) -> bool {
        DecodeError::is_defect(self)
    }
}

pub fn decode_plan_entry(entry: &StreamEntry) -> Result<IrisPlanItem, DecodeError> {
    let service_date = read_service_date(entry, PLAN_FIELD_SERVICE_DATE)?;
    let stop_id = read_stop_id(entry, PLAN_FIELD_STOP_ID)?;
    let plan: IrisPlanPayload = read_payload(entry, PLAN_FIELD_PAYLOAD)?;
    let raw_id = required_raw_id(plan.raw_id.as_deref())?;
    Ok(IrisPlanItem {
        message_id: entry.id.clone(),
        service_date,
        stop_id,
        raw_id,
        plan,
    })
}

pub fn decode_change_entry(entry: &StreamEntry) -> Result<IrisChangeItem, DecodeError> {
    let service_date = read_service_date(entry, CHANGE_FIELD_SERVICE_DATE)?;
    let stop_id = read_stop_id(entry, CHANGE_FIELD_STOP_ID)?;
    let change: IrisChangePayload = read_payload(entry, CHANGE_FIELD_PAYLOAD)?;
    let raw_id = required_raw_id(change.raw_id.as_deref())?;
    Ok(IrisChangeItem {
        message_id: entry.id.clone(),
        service_date,
        stop_id,
        raw_id,
        change,
    })
}

fn field<'a>(entry: &'a StreamEntry, index: usize) -> Result<&'a [u8], DecodeError> {
    entry
        .value_at(index)
        .ok_or(DecodeError::MissingEntryField { index })
}

fn read_service_date(entry: &StreamEntry, index: usize) -> Result<ServiceDate, DecodeError> {
    let raw = String::from_utf8_lossy(field(entry, index)?);
    ServiceDate::parse(&raw).ok_or(DecodeError::Item {
        reason: "service date is not an ISO date",
    })
}

fn read_stop_id(entry: &StreamEntry, index: usize) -> Result<EvaNumber, DecodeError> {
    Ok(EvaNumber::from_be_bytes(field(entry, index)?)?)
}

fn read_payload<T: DeserializeOwned>(entry: &StreamEntry, index: usize) -> Result<T, DecodeError> {
    let compressed = field(entry, index)?;
    let json = zstd::decode_all(compressed).map_err(DecodeError::Decompress)?;
    Ok(serde_json::from_slice(&json)?)
}

fn required_raw_id(raw_id: Option<&str>) -> Result<String, DecodeError> {
    match raw_id {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(DecodeError::Item {
            reason: "payload has no raw_id",
        }),
    }
}
