//! HandBrakeCLI integration: title probing and transcoding.

pub mod encode;
pub mod probe;

pub use encode::{build_handbrake_command, encode_titles, plan_chunks, EncodeOptions};
pub use probe::{parse_title_set, scan_image, PROBE_TIMEOUT};

/// Name of the transcoder binary, resolved via PATH.
pub const HANDBRAKE_CLI_BIN: &str = "HandBrakeCLI";
