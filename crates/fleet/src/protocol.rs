//! Wire types for the dispatch protocol.
//!
//! The claim endpoint answers with either JSON `null` (queue drained) or a
//! job descriptor; result POSTs carry a `state` form field next to the
//! uploaded files.

use ripfleet_config::{Fix, HandbrakeConfig, RipConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job descriptor handed to a worker on claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    /// Job id; also the path segment for all follow-up requests.
    pub name: Uuid,
    /// Title selection policy for this job.
    pub rip_config: RipConfig,
    /// Transcoder settings for this job.
    pub hb_config: HandbrakeConfig,
    /// Active fixes for this job.
    pub fixes: Vec<Fix>,
}

/// Value of the `state` form field in a job POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    /// Heartbeat; the job is still being processed.
    Working,
    /// Terminal report; all result files have been sent.
    Done,
}

impl ReportState {
    /// Wire form of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportState::Working => "WORKING",
            ReportState::Done => "DONE",
        }
    }

    /// Parse the wire form; anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WORKING" => Some(ReportState::Working),
            "DONE" => Some(ReportState::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripfleet_config::SplitSpec;

    fn make_descriptor() -> JobDescriptor {
        JobDescriptor {
            name: Uuid::new_v4(),
            rip_config: RipConfig::default(),
            hb_config: HandbrakeConfig::default(),
            fixes: vec![
                Fix::RemoveDuplicateTracks,
                Fix::SplitEveryChapters(SplitSpec::Every(4)),
            ],
        }
    }

    #[test]
    fn test_descriptor_round_trip() {
        let descriptor = make_descriptor();
        let json = serde_json::to_string(&descriptor).unwrap();
        let parsed: JobDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(descriptor, parsed);
    }

    #[test]
    fn test_descriptor_wire_shape() {
        let descriptor = make_descriptor();
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&descriptor).unwrap()).unwrap();

        assert_eq!(
            value["name"].as_str().unwrap(),
            descriptor.name.to_string()
        );
        assert!(value["rip_config"]["a_lang"].is_array());
        assert_eq!(value["rip_config"]["len_range"], serde_json::json!([15, 50]));
        assert_eq!(value["hb_config"]["h264_preset"], "medium");
        assert_eq!(value["fixes"][0]["name"], "remove_duplicate_tracks");
    }

    #[test]
    fn test_drained_claim_is_null() {
        let none: Option<JobDescriptor> = None;
        assert_eq!(serde_json::to_string(&none).unwrap(), "null");

        let parsed: Option<JobDescriptor> = serde_json::from_str("null").unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_report_state_wire_forms() {
        assert_eq!(ReportState::Working.as_str(), "WORKING");
        assert_eq!(ReportState::Done.as_str(), "DONE");
        assert_eq!(ReportState::parse("WORKING"), Some(ReportState::Working));
        assert_eq!(ReportState::parse("DONE"), Some(ReportState::Done));
        assert_eq!(ReportState::parse("done"), None);
        assert_eq!(ReportState::parse(""), None);
    }
}
