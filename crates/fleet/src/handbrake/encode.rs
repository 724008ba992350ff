//! Transcode runner: command construction and title encoding.
//!
//! Builds the transcoder command line for each selected title (or chapter
//! chunk of a title, under the split fix) and runs it. A failed invocation
//! is logged and skipped; the caller uploads whatever output files actually
//! exist afterwards.

use crate::handbrake::HANDBRAKE_CLI_BIN;
use crate::titles::{Title, Track};
use ripfleet_config::{Fix, HandbrakeConfig, SplitSpec};
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

/// Pipeline switches derived from the active fixes.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Re-encode audio to MP3 instead of copying.
    pub reencode_audio: bool,
    /// Select the libdvdread backend.
    pub use_libdvdread: bool,
    /// Chapter split layout, when the split fix is active.
    pub split: Option<SplitSpec>,
}

impl EncodeOptions {
    /// Derive the encode switches from a fix list.
    pub fn from_fixes(fixes: &[Fix]) -> Self {
        let mut opts = Self::default();
        for fix in fixes {
            match fix {
                Fix::ReencodeAudio => opts.reencode_audio = true,
                Fix::UseLibdvdread => opts.use_libdvdread = true,
                Fix::SplitEveryChapters(spec) => opts.split = Some(spec.clone()),
                Fix::RemoveDuplicateTracks => {}
            }
        }
        opts
    }
}

/// Build the transcoder command for one title or chapter chunk.
///
/// The caller is responsible for having validated `hb_config`; the command
/// is assembled verbatim from it.
pub fn build_handbrake_command(
    input: &Path,
    output: &Path,
    title_index: u32,
    a_tracks: &[Track],
    s_tracks: &[Track],
    chapters: Option<(u32, u32)>,
    hb_config: &HandbrakeConfig,
    opts: &EncodeOptions,
) -> Command {
    let mut cmd = Command::new(HANDBRAKE_CLI_BIN);

    cmd.arg("-i").arg(input);
    cmd.arg("-o").arg(output);
    cmd.arg("-t").arg(title_index.to_string());
    cmd.arg("-a").arg(tracks_to_csl(a_tracks));
    cmd.arg("-s").arg(tracks_to_csl(s_tracks));

    if let Some((first, last)) = chapters {
        cmd.arg("-c").arg(format!("{}-{}", first, last));
    }
    if let Some(preset) = &hb_config.preset {
        cmd.arg("-Z").arg(preset);
    }

    cmd.arg("-f").arg("mkv");
    cmd.arg("-m");
    cmd.arg("-e").arg("x264");
    cmd.arg("-q").arg(hb_config.quality.to_string());
    if opts.reencode_audio {
        cmd.arg("-E").arg("mp3");
    } else {
        cmd.arg("-E").arg("copy");
    }
    cmd.arg("--audio-fallback").arg("ffac3");
    cmd.arg("--loose-anamorphic");
    cmd.arg("--modulus").arg("2");
    cmd.arg("--decomb");
    cmd.arg("--x264-preset").arg(&hb_config.h264_preset);
    cmd.arg("--x264-profile").arg(&hb_config.h264_profile);
    cmd.arg("--h264-level").arg(&hb_config.h264_level);

    if opts.use_libdvdread {
        cmd.arg("--no-dvdnav");
    }

    cmd
}

/// Comma-separated track index list for the `-a`/`-s` arguments.
fn tracks_to_csl(tracks: &[Track]) -> String {
    tracks
        .iter()
        .map(|t| t.index.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Plan the chapter ranges for one title under the split fix.
///
/// `Every(n)` steps through the chapters in fixed chunks starting at 1; the
/// final range may extend past the chapter count and is clamped by the
/// transcoder. `Chunks` lays the given chunk lengths out contiguously from
/// chapter 1 and is passed through even when the lengths do not add up to
/// the chapter count.
pub fn plan_chunks(chapter_count: u32, spec: &SplitSpec) -> Vec<(u32, u32)> {
    match spec {
        SplitSpec::Every(n) => (1..=chapter_count)
            .step_by(*n as usize)
            .map(|first| (first, first + n - 1))
            .collect(),
        SplitSpec::Chunks(lengths) => {
            let mut ranges = Vec::with_capacity(lengths.len());
            let mut first = 1;
            for len in lengths {
                ranges.push((first, first + len - 1));
                first += len;
            }
            ranges
        }
    }
}

/// Output file name for one title, or one chunk of it.
fn output_name(source_name: &str, title_index: u32, chapters: Option<(u32, u32)>) -> String {
    match chapters {
        Some((first, _)) => format!("{}.{}.{}.mkv", source_name, title_index, first),
        None => format!("{}.{}.mkv", source_name, title_index),
    }
}

/// Encode all selected titles into `out_dir`.
///
/// Returns the file names of the outputs that exist on disk afterwards.
/// A non-zero transcoder exit is logged but does not abort the job.
pub async fn encode_titles(
    hb_config: &HandbrakeConfig,
    opts: &EncodeOptions,
    titles: &[Title],
    in_path: &Path,
    out_dir: &Path,
) -> Vec<String> {
    info!("Encoding {} title(s)...", titles.len());

    let source_name = in_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut produced = Vec::new();

    for title in titles {
        match &opts.split {
            Some(spec) => {
                if let SplitSpec::Chunks(lengths) = spec {
                    let sum: u32 = lengths.iter().sum();
                    if sum != title.chapters.len() as u32 {
                        warn!(
                            "Chunk lengths sum to {} but title {} has {} chapters",
                            sum,
                            title.index,
                            title.chapters.len()
                        );
                    }
                }
                for chunk in plan_chunks(title.chapters.len() as u32, spec) {
                    if let Some(name) = encode_one(
                        hb_config,
                        opts,
                        title,
                        Some(chunk),
                        in_path,
                        out_dir,
                        &source_name,
                    )
                    .await
                    {
                        produced.push(name);
                    }
                }
            }
            None => {
                if let Some(name) =
                    encode_one(hb_config, opts, title, None, in_path, out_dir, &source_name).await
                {
                    produced.push(name);
                }
            }
        }
    }

    produced
}

/// Run the transcoder for one title/chunk and report the output file name
/// if the file exists afterwards.
async fn encode_one(
    hb_config: &HandbrakeConfig,
    opts: &EncodeOptions,
    title: &Title,
    chapters: Option<(u32, u32)>,
    in_path: &Path,
    out_dir: &Path,
    source_name: &str,
) -> Option<String> {
    match chapters {
        Some((first, last)) => {
            info!("Encoding title {} chapters {}-{}", title.index, first, last)
        }
        None => info!("Encoding title {}", title.index),
    }

    let name = output_name(source_name, title.index, chapters);
    let out_path = out_dir.join(&name);

    let cmd = build_handbrake_command(
        in_path,
        &out_path,
        title.index,
        &title.a_tracks,
        &title.s_tracks,
        chapters,
        hb_config,
        opts,
    );

    match tokio::process::Command::from(cmd).output().await {
        Ok(output) if !output.status.success() => {
            error!(
                "Transcoder exited with {} for title {}",
                output.status, title.index
            );
        }
        Ok(_) => {}
        Err(e) => {
            error!("Failed to run transcoder: {}", e);
        }
    }

    match tokio::fs::metadata(&out_path).await {
        Ok(_) => Some(name),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    /// Helper to check if args contain a flag with a specific value
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    /// Helper to check if args contain a standalone flag
    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }

    fn make_tracks(indices: &[u32]) -> Vec<Track> {
        indices
            .iter()
            .map(|&index| Track {
                index,
                lang: "eng".to_string(),
            })
            .collect()
    }

    fn make_title(index: u32, chapter_count: u32) -> Title {
        Title {
            index,
            duration: Duration::from_secs(85 * 60),
            a_tracks: make_tracks(&[1, 2]),
            s_tracks: make_tracks(&[1]),
            chapters: (1..=chapter_count)
                .map(|number| crate::titles::Chapter {
                    number,
                    length_secs: 300,
                })
                .collect(),
        }
    }

    #[test]
    fn test_tracks_to_csl() {
        assert_eq!(tracks_to_csl(&make_tracks(&[1, 2, 4])), "1,2,4");
        assert_eq!(tracks_to_csl(&[]), "");
    }

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("IMG.iso", 1, None), "IMG.iso.1.mkv");
        assert_eq!(output_name("IMG.iso", 1, Some((5, 8))), "IMG.iso.1.5.mkv");
    }

    #[test]
    fn test_plan_chunks_every() {
        // Final range runs past the chapter count; the transcoder clamps it.
        assert_eq!(
            plan_chunks(10, &SplitSpec::Every(4)),
            vec![(1, 4), (5, 8), (9, 12)]
        );
        assert_eq!(plan_chunks(8, &SplitSpec::Every(4)), vec![(1, 4), (5, 8)]);
        assert_eq!(plan_chunks(3, &SplitSpec::Every(5)), vec![(1, 5)]);
        assert_eq!(plan_chunks(0, &SplitSpec::Every(4)), vec![]);
    }

    #[test]
    fn test_plan_chunks_lengths() {
        assert_eq!(
            plan_chunks(10, &SplitSpec::Chunks(vec![2, 3, 5])),
            vec![(1, 2), (3, 5), (6, 10)]
        );
        // Mismatched sums pass through unchanged
        assert_eq!(
            plan_chunks(4, &SplitSpec::Chunks(vec![2, 3])),
            vec![(1, 2), (3, 5)]
        );
    }

    #[test]
    fn test_chapter_range_argument() {
        let hb_config = HandbrakeConfig::default();
        let opts = EncodeOptions::default();
        let cmd = build_handbrake_command(
            Path::new("/tmp/IMG.iso"),
            Path::new("/tmp/out/IMG.iso.1.5.mkv"),
            1,
            &make_tracks(&[1]),
            &make_tracks(&[1]),
            Some((5, 8)),
            &hb_config,
            &opts,
        );
        let args = get_command_args(&cmd);
        assert!(has_flag_with_value(&args, "-c", "5-8"));
    }

    #[test]
    fn test_libdvdread_flag() {
        let hb_config = HandbrakeConfig::default();
        let opts = EncodeOptions {
            use_libdvdread: true,
            ..Default::default()
        };
        let cmd = build_handbrake_command(
            Path::new("/tmp/IMG.iso"),
            Path::new("/tmp/out/IMG.iso.1.mkv"),
            1,
            &make_tracks(&[1]),
            &[],
            None,
            &hb_config,
            &opts,
        );
        assert!(has_flag(&get_command_args(&cmd), "--no-dvdnav"));
    }

    #[test]
    fn test_encode_options_from_fixes() {
        let fixes = vec![
            Fix::ReencodeAudio,
            Fix::SplitEveryChapters(SplitSpec::Every(4)),
        ];
        let opts = EncodeOptions::from_fixes(&fixes);
        assert!(opts.reencode_audio);
        assert!(!opts.use_libdvdread);
        assert_eq!(opts.split, Some(SplitSpec::Every(4)));

        let opts = EncodeOptions::from_fixes(&[Fix::RemoveDuplicateTracks]);
        assert!(!opts.reencode_audio);
        assert!(opts.split.is_none());
    }

    // Strategy for generating valid path-like strings
    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9_/.-]{1,50}")
            .unwrap()
            .prop_filter("non-empty path", |s| !s.is_empty())
    }

    // *For any* input/output path, title, track set and config, the built
    // command contains every required argument.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_handbrake_command_completeness(
            input_path in path_strategy(),
            output_path in path_strategy(),
            title_index in 1u32..100,
            quality in 0u32..60,
            reencode_audio in any::<bool>(),
        ) {
            let hb_config = HandbrakeConfig {
                preset: None,
                quality,
                h264_preset: "medium".to_string(),
                h264_profile: "high".to_string(),
                h264_level: "4.1".to_string(),
            };
            let opts = EncodeOptions {
                reencode_audio,
                use_libdvdread: false,
                split: None,
            };

            let cmd = build_handbrake_command(
                &PathBuf::from(&input_path),
                &PathBuf::from(&output_path),
                title_index,
                &make_tracks(&[1, 2]),
                &make_tracks(&[1]),
                None,
                &hb_config,
                &opts,
            );
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.get_program(), OsStr::new("HandBrakeCLI"));

            prop_assert!(has_flag_with_value(&args, "-i", &input_path));
            prop_assert!(has_flag_with_value(&args, "-o", &output_path));
            prop_assert!(has_flag_with_value(&args, "-t", &title_index.to_string()));
            prop_assert!(has_flag_with_value(&args, "-a", "1,2"));
            prop_assert!(has_flag_with_value(&args, "-s", "1"));
            prop_assert!(has_flag_with_value(&args, "-f", "mkv"));
            prop_assert!(has_flag(&args, "-m"));
            prop_assert!(has_flag_with_value(&args, "-e", "x264"));
            prop_assert!(has_flag_with_value(&args, "-q", &quality.to_string()));
            if reencode_audio {
                prop_assert!(has_flag_with_value(&args, "-E", "mp3"));
            } else {
                prop_assert!(has_flag_with_value(&args, "-E", "copy"));
            }
            prop_assert!(has_flag_with_value(&args, "--audio-fallback", "ffac3"));
            prop_assert!(has_flag(&args, "--loose-anamorphic"));
            prop_assert!(has_flag_with_value(&args, "--modulus", "2"));
            prop_assert!(has_flag(&args, "--decomb"));
            prop_assert!(has_flag_with_value(&args, "--x264-preset", "medium"));
            prop_assert!(has_flag_with_value(&args, "--x264-profile", "high"));
            prop_assert!(has_flag_with_value(&args, "--h264-level", "4.1"));

            // No chapter range and no backend override were requested
            prop_assert!(!has_flag(&args, "-c"));
            prop_assert!(!has_flag(&args, "--no-dvdnav"));
            prop_assert!(!has_flag(&args, "-Z"));
        }
    }

    // Scenario: a 10 chapter title split every 4 chapters yields three
    // chunk names starting at chapters 1, 5 and 9.
    #[test]
    fn test_split_output_names() {
        let title = make_title(1, 10);
        let names: Vec<String> = plan_chunks(title.chapters.len() as u32, &SplitSpec::Every(4))
            .into_iter()
            .map(|chunk| output_name("img", title.index, Some(chunk)))
            .collect();
        assert_eq!(names, vec!["img.1.1.mkv", "img.1.5.mkv", "img.1.9.mkv"]);
    }
}
