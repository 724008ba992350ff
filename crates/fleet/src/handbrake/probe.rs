//! Disc image probing via the transcoder's JSON title scan.
//!
//! Runs `HandBrakeCLI --json -i <image> -t 0` and extracts the title-set
//! JSON document from its output. Probing is best-effort: a timeout, a
//! missing marker or malformed JSON all yield an empty title list, so an
//! unreadable image produces a job with no outputs instead of a stuck
//! worker.

use crate::handbrake::HANDBRAKE_CLI_BIN;
use crate::titles::{Chapter, Title, Track};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Hard limit for one probe run. Scans of healthy images finish in seconds.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker preceding the title-set JSON document in the scan output.
const TITLE_SET_MARKER: &str = "JSON Title Set:";

/// Raw title-set JSON structures for parsing.
mod title_set_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct TitleSet {
        #[serde(rename = "TitleList", default)]
        pub title_list: Vec<TitleEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TitleEntry {
        #[serde(rename = "Index")]
        pub index: u32,
        #[serde(rename = "Duration")]
        pub duration: DurationEntry,
        #[serde(rename = "AudioList", default)]
        pub audio_list: Vec<TrackEntry>,
        #[serde(rename = "SubtitleList", default)]
        pub subtitle_list: Vec<TrackEntry>,
        #[serde(rename = "ChapterList", default)]
        pub chapter_list: Vec<ChapterEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct DurationEntry {
        #[serde(rename = "Hours", default)]
        pub hours: u64,
        #[serde(rename = "Minutes", default)]
        pub minutes: u64,
        #[serde(rename = "Seconds", default)]
        pub seconds: u64,
    }

    #[derive(Debug, Deserialize)]
    pub struct TrackEntry {
        #[serde(rename = "LanguageCode", default)]
        pub language_code: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ChapterEntry {
        #[serde(rename = "Duration")]
        pub duration: DurationEntry,
    }
}

/// Scan a disc image for its titles.
///
/// Invokes the transcoder's JSON scan with [`PROBE_TIMEOUT`] applied; the
/// child is killed on timeout. Any failure mode returns an empty list.
pub async fn scan_image(image_path: &Path, use_libdvdread: bool) -> Vec<Title> {
    info!("Scanning {}...", image_path.display());

    let mut cmd = Command::new(HANDBRAKE_CLI_BIN);
    cmd.arg("--json").arg("-i").arg(image_path).arg("-t").arg("0");
    if use_libdvdread {
        cmd.arg("--no-dvdnav");
    }
    cmd.kill_on_drop(true);

    let output = match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Title scan failed to run: {}", e);
            return Vec::new();
        }
        Err(_) => {
            warn!(
                "Title scan of {} timed out after {}s",
                image_path.display(),
                PROBE_TIMEOUT.as_secs()
            );
            return Vec::new();
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    match parse_title_set(&stdout) {
        Some(titles) => titles,
        None => {
            warn!(
                "Title scan of {} produced no title set",
                image_path.display()
            );
            Vec::new()
        }
    }
}

/// Extract and parse the title-set document from scan output.
///
/// Returns `None` when the marker is absent or the JSON after it does not
/// parse. Trailing non-JSON output after the document is tolerated.
pub fn parse_title_set(scan_output: &str) -> Option<Vec<Title>> {
    let start = scan_output.find(TITLE_SET_MARKER)? + TITLE_SET_MARKER.len();
    let document = scan_output[start..].trim_start();

    let mut stream = serde_json::Deserializer::from_str(document)
        .into_iter::<title_set_json::TitleSet>();
    let title_set = stream.next()?.ok()?;

    let titles = title_set
        .title_list
        .into_iter()
        .map(|entry| Title {
            index: entry.index,
            duration: Duration::from_secs(
                entry.duration.hours * 3600 + entry.duration.minutes * 60 + entry.duration.seconds,
            ),
            a_tracks: tracks_from(entry.audio_list),
            s_tracks: tracks_from(entry.subtitle_list),
            chapters: entry
                .chapter_list
                .into_iter()
                .enumerate()
                .map(|(i, chapter)| Chapter {
                    number: i as u32 + 1,
                    length_secs: chapter.duration.hours * 3600
                        + chapter.duration.minutes * 60
                        + chapter.duration.seconds,
                })
                .collect(),
        })
        .collect();

    Some(titles)
}

/// Track indices are 1-based positions in the scan's list order.
fn tracks_from(entries: Vec<title_set_json::TrackEntry>) -> Vec<Track> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| Track {
            index: i as u32 + 1,
            lang: entry.language_code,
        })
        .collect()
}
