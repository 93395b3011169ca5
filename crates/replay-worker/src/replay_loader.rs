//! Replay log loading.
//!
//! A replay log is JSON Lines: one object per line with an `offsetMs` and a
//! `snapshot`. Blank lines are skipped. Snapshot fields are read leniently:
//! numbers, numeric strings and booleans are accepted, anything else falls
//! back to the field's default.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::warn;

use replay_models::replay::{COURT_HEIGHT, COURT_WIDTH, DEFAULT_TARGET_SCORE, PADDLE_HEIGHT};
use replay_models::{ReplayEvent, ReplaySequence, Snapshot};

use crate::error::ExportError;

/// Read and parse the replay log at `path`.
pub async fn load_replay(path: Option<&str>) -> Result<ReplaySequence, ExportError> {
    let path = path
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ExportError::invalid_replay_format("inputPath is missing"))?;

    let bytes = match tokio::fs::read(Path::new(path)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExportError::invalid_replay_format(format!(
                "replay log not found: {}",
                path
            )));
        }
        Err(e) => {
            return Err(ExportError::invalid_replay_format(format!(
                "cannot read replay log {}: {}",
                path, e
            )));
        }
    };
    let text = String::from_utf8(bytes)
        .map_err(|_| ExportError::invalid_replay_format("replay log is not valid UTF-8"))?;

    let sequence = parse_replay(&text)?;
    let violations = sequence.ordering_violations();
    if violations > 0 {
        warn!(
            path,
            violations, "Replay offsets are not non-decreasing; frames hold the last event read"
        );
    }
    Ok(sequence)
}

/// Parse JSON Lines text into a sequence.
pub fn parse_replay(text: &str) -> Result<ReplaySequence, ExportError> {
    let mut events = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let value: Value = serde_json::from_str(line).map_err(|e| {
            ExportError::invalid_replay_format(format!("line {}: invalid JSON: {}", line_no, e))
        })?;
        let object = value.as_object().ok_or_else(|| {
            ExportError::invalid_replay_format(format!("line {}: expected an object", line_no))
        })?;
        let snapshot = match object.get("snapshot") {
            Some(Value::Object(raw)) => parse_snapshot(raw),
            Some(Value::Null) | None => {
                return Err(ExportError::invalid_replay_format(format!(
                    "line {}: snapshot is missing",
                    line_no
                )));
            }
            Some(_) => {
                return Err(ExportError::invalid_replay_format(format!(
                    "line {}: snapshot is not an object",
                    line_no
                )));
            }
        };
        let offset_ms = lenient_i64(object.get("offsetMs"), 0).max(0) as u64;
        events.push(ReplayEvent::new(offset_ms, snapshot));
    }

    ReplaySequence::new(events)
        .ok_or_else(|| ExportError::invalid_replay_format("replay log has no events"))
}

fn parse_snapshot(raw: &Map<String, Value>) -> Snapshot {
    let paddle_default = (COURT_HEIGHT - PADDLE_HEIGHT) / 2.0;
    Snapshot {
        ball_x: lenient_f64(raw.get("ballX"), COURT_WIDTH / 2.0),
        ball_y: lenient_f64(raw.get("ballY"), COURT_HEIGHT / 2.0),
        left_paddle_y: lenient_f64(raw.get("leftPaddleY"), paddle_default),
        right_paddle_y: lenient_f64(raw.get("rightPaddleY"), paddle_default),
        left_score: lenient_i64(raw.get("leftScore"), 0),
        right_score: lenient_i64(raw.get("rightScore"), 0),
        target_score: lenient_i64(raw.get("targetScore"), DEFAULT_TARGET_SCORE),
        finished: raw.get("finished").map(truthy).unwrap_or(false),
    }
}

fn lenient_f64(value: Option<&Value>, default: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => default,
    }
}

/// Integers truncate floats; integer strings parse, float strings do not.
fn lenient_i64(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        Some(Value::Bool(b)) => i64::from(*b),
        _ => default,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_models::ErrorCode;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_event() {
        let text = r#"{"offsetMs": 250, "snapshot": {"ballX": 10.5, "ballY": 20, "leftPaddleY": 30, "rightPaddleY": 40, "leftScore": 2, "rightScore": 3, "targetScore": 7, "finished": true}}"#;
        let seq = parse_replay(text).unwrap();
        let event = seq.first();
        assert_eq!(event.offset_ms, 250);
        assert_eq!(event.snapshot.ball_x, 10.5);
        assert_eq!(event.snapshot.right_paddle_y, 40.0);
        assert_eq!(event.snapshot.right_score, 3);
        assert_eq!(event.snapshot.target_score, 7);
        assert!(event.snapshot.finished);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let seq = parse_replay("{\"snapshot\": {}}\n\n").unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.first().offset_ms, 0);
        assert_eq!(seq.first().snapshot, Snapshot::default());
    }

    #[test]
    fn test_lenient_values() {
        let text = r#"{"offsetMs": "-40", "snapshot": {"ballX": "12.5", "ballY": "bad", "leftScore": 2.9, "rightScore": "4", "targetScore": true, "finished": "no"}}"#;
        let seq = parse_replay(text).unwrap();
        let snap = seq.first().snapshot;
        assert_eq!(seq.first().offset_ms, 0);
        assert_eq!(snap.ball_x, 12.5);
        assert_eq!(snap.ball_y, 240.0);
        assert_eq!(snap.left_score, 2);
        assert_eq!(snap.right_score, 4);
        assert_eq!(snap.target_score, 1);
        // non-empty string is truthy
        assert!(snap.finished);
    }

    #[test]
    fn test_format_errors() {
        let cases = [
            "",
            "\n  \n",
            "{not json}",
            "{\"offsetMs\": 0}",
            "{\"offsetMs\": 0, \"snapshot\": null}",
            "{\"offsetMs\": 0, \"snapshot\": 5}",
            "[1, 2]",
        ];
        for text in cases {
            let err = parse_replay(text).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidReplayFormat, "input {:?}", text);
        }
    }

    #[test]
    fn test_out_of_order_offsets_are_kept() {
        let text = "{\"offsetMs\": 100, \"snapshot\": {}}\n{\"offsetMs\": 50, \"snapshot\": {}}";
        let seq = parse_replay(text).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.ordering_violations(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_input() {
        let err = load_replay(None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidReplayFormat);

        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.jsonl");
        let err = load_replay(missing.to_str()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidReplayFormat);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        tokio::fs::write(
            &path,
            "{\"offsetMs\": 0, \"snapshot\": {}}\n{\"offsetMs\": 500, \"snapshot\": {\"leftScore\": 1}}\n",
        )
        .await
        .unwrap();

        let seq = load_replay(path.to_str()).await.unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.last_offset_ms(), 500);
    }
}
