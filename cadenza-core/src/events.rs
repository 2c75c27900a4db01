//! Event types broadcast to embedding applications.
//!
//! Field names serialize camelCase and enums lowercase so the payloads drop
//! straight into a JS/TS front end.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status events
// ---------------------------------------------------------------------------

/// Emitted whenever the player state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatusEvent {
    pub status: PlayerStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// Engine created (or stopped); no device stream, pool empty.
    Idle,
    /// Producer filling, output callback draining.
    Running,
    /// Output emits silence, producer idles; resumable.
    Paused,
    /// Synth reached end of stream and the pool drained out.
    Finished,
    /// Device or startup failure; restart required.
    Error,
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

/// Emitted once per committed frame while playback runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackProgressEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Current synth position in samples.
    pub position: u64,
    /// Approximate total length in samples, when the synth knows it.
    pub total_samples: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = PlayerStatusEvent {
            status: PlayerStatus::Paused,
            detail: Some("user pause".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "paused");
        assert_eq!(json["detail"], "user pause");

        let round_trip: PlayerStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, PlayerStatus::Paused);
        assert_eq!(round_trip.detail.as_deref(), Some("user pause"));
    }

    #[test]
    fn progress_event_serializes_with_camel_case_fields() {
        let event = PlaybackProgressEvent {
            seq: 12,
            position: 40_960,
            total_samples: Some(441_000),
        };

        let json = serde_json::to_value(&event).expect("serialize progress event");
        assert_eq!(json["seq"], 12);
        assert_eq!(json["position"], 40_960);
        assert_eq!(json["totalSamples"], 441_000);

        let round_trip: PlaybackProgressEvent =
            serde_json::from_value(json).expect("deserialize progress event");
        assert_eq!(round_trip.position, 40_960);
        assert_eq!(round_trip.total_samples, Some(441_000));
    }

    #[test]
    fn player_status_rejects_non_lowercase_values() {
        let invalid = r#""Running""#;
        let err = serde_json::from_str::<PlayerStatus>(invalid);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
