//! Replays captured realtime messages into a stream.
//!
//! Capture files are JSON arrays of messages with their payloads left
//! uncompressed, which keeps fixtures diffable. Loading compresses each
//! payload and appends a wire-shaped entry, so everything downstream of
//! the stream, the decode boundary included, runs exactly as it does
//! against a live feed.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::stream::InMemoryStream;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("capture file could not be read: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct CapturedPlan {
    service_date: String,
    stop_id: i32,
    plan: Value,
}

#[derive(Debug, Deserialize)]
struct CapturedChange {
    service_date: String,
    stop_id: i32,
    change: Value,
}

/// Loads a plan capture file, appending one entry per message. Returns
/// the number of entries appended.
pub async fn load_plan_entries(path: &Path, stream: &InMemoryStream) -> Result<usize, ReplayError> {
    let text = tokio::fs::read_to_string(path).await?;
    let captured: Vec<CapturedPlan> = serde_json::from_str(&text)?;
    for message in &captured {
        let payload = compress(&message.plan)?;
        stream
            .append(vec![
                ("hash_id".to_string(), Vec::new()),
                (
                    "service_date".to_string(),
                    message.service_date.clone().into_bytes(),
                ),
                ("stop_id".to_string(), message.stop_id.to_be_bytes().to_vec()),
                ("plan_compressed".to_string(), payload),
            ])
            .await;
    }
    Ok(captured.len())
}

/// Loads a change capture file, appending one entry per message.
pub async fn load_change_entries(
    path: &Path,
    stream: &InMemoryStream,
) -> Result<usize, ReplayError> {
    let text = tokio::fs::read_to_string(path).await?;
    let captured: Vec<CapturedChange> = serde_json::from_str(&text)?;
    for message in &captured {
        let payload = compress(&message.change)?;
        stream
            .append(vec![
                (
                    "service_date".to_string(),
                    message.service_date.clone().into_bytes(),
                ),
                ("hash_id".to_string(), Vec::new()),
                ("change_hash".to_string(), Vec::new()),
                ("stop_id".to_string(), message.stop_id.to_be_bytes().to_vec()),
                ("time_crawled".to_string(), Vec::new()),
                ("change_compressed".to_string(), payload),
            ])
            .await;
    }
    Ok(captured.len())
}

fn compress(payload: &Value) -> Result<Vec<u8>, ReplayError> {
    let json = serde_json::to_vec(payload)?;
    Ok(zstd::encode_all(&json[..], 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EvaNumber;
    use crate::iris::decode::{decode_change_entry, decode_plan_entry};
    use crate::stream::{MessageStream, StreamCursor};

    #[tokio::test]
    async fn replayed_plans_decode_like_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");
        tokio::fs::write(
            &path,
            r#"[{
                "service_date": "2025-01-28",
                "stop_id": 8000078,
                "plan": {
                    "raw_id": "2868854051011682435-2501281447-13",
                    "stop_sequence_id": 13,
                    "departure": {"planned_time": "2025-01-28T15:01:00Z", "line": "44"}
                }
            }]"#,
        )
        .await
        .unwrap();

        let stream = InMemoryStream::new();
        let appended = load_plan_entries(&path, &stream).await.unwrap();
        assert_eq!(appended, 1);

        let batch = stream
            .read_batch(&StreamCursor::new("0"), 10)
            .await
            .unwrap();
        let item = decode_plan_entry(&batch[0]).unwrap();
        assert_eq!(item.stop_id, EvaNumber::new(8_000_078));
        assert_eq!(item.raw_id, "2868854051011682435-2501281447-13");
    }

    #[tokio::test]
    async fn replayed_changes_decode_like_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.json");
        tokio::fs::write(
            &path,
            r#"[{
                "service_date": "2025-01-28",
                "stop_id": 8000078,
                "change": {
                    "raw_id": "2868854051011682435-2501281447-13",
                    "departure": {"changed_status": "c"}
                }
            }]"#,
        )
        .await
        .unwrap();

        let stream = InMemoryStream::new();
        load_change_entries(&path, &stream).await.unwrap();

        let batch = stream
            .read_batch(&StreamCursor::new("0"), 10)
            .await
            .unwrap();
        let item = decode_change_entry(&batch[0]).unwrap();
        assert_eq!(item.change.changed_status(), Some("c"));
    }

    #[tokio::test]
    async fn a_broken_capture_file_reports_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let stream = InMemoryStream::new();
        let err = load_plan_entries(&path, &stream).await.unwrap_err();
        assert!(matches!(err, ReplayError::Json(_)));
    }
}
