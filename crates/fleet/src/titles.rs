//! Title model and selection logic.
//!
//! A probed disc image yields a list of titles; this module filters them by
//! duration and language policy and removes back-to-back duplicate titles
//! that some discs carry.

use std::time::Duration;

/// One audio or subtitle track of a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// 1-based track index as the transcoder counts them.
    pub index: u32,
    /// ISO 639-2 language code (bibliographic or terminological form).
    pub lang: String,
}

/// One chapter of a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// 1-based chapter number inside the title.
    pub number: u32,
    /// Chapter length in seconds.
    pub length_secs: u64,
}

/// One title of a probed disc image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    /// 1-based title index as the transcoder counts them.
    pub index: u32,
    /// Total playback duration.
    pub duration: Duration,
    /// Audio tracks in probe order.
    pub a_tracks: Vec<Track>,
    /// Subtitle tracks in probe order.
    pub s_tracks: Vec<Track>,
    /// Chapters in probe order.
    pub chapters: Vec<Chapter>,
}

impl Title {
    /// Content equality, ignoring the title index.
    ///
    /// Duplicated titles on a disc get distinct indices, so duplicate
    /// detection compares duration, tracks and chapters only.
    pub fn same_content(&self, other: &Title) -> bool {
        self.duration == other.duration
            && self.a_tracks == other.a_tracks
            && self.s_tracks == other.s_tracks
            && self.chapters == other.chapters
    }
}

impl std::fmt::Display for Title {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let a: Vec<&str> = self.a_tracks.iter().map(|t| t.lang.as_str()).collect();
        let s: Vec<&str> = self.s_tracks.iter().map(|t| t.lang.as_str()).collect();
        write!(
            f,
            "Title: {} - {}s - A: [{}] S: [{}] - {} chapters",
            self.index,
            self.duration.as_secs(),
            a.join(","),
            s.join(","),
            self.chapters.len()
        )
    }
}

/// ISO 639-2 codes that exist in both a bibliographic and a terminological
/// form. Discs use either form, so the language filter accepts both.
const ISO639_ALT: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bod", "tib"),
    ("bur", "mya"),
    ("ces", "cze"),
    ("chi", "zho"),
    ("cym", "wel"),
    ("deu", "ger"),
    ("dut", "nld"),
    ("fas", "per"),
    ("fra", "fre"),
    ("geo", "kat"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("mao", "mri"),
    ("may", "msa"),
    ("ron", "rum"),
    ("slk", "slo"),
];

/// Expand a language list with the alternate forms of each code.
///
/// Codes without an alternate form pass through unchanged; the configured
/// codes keep their position and the aliases are appended.
pub fn expand_langs(langs: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = langs.to_vec();
    for lang in langs {
        for (a, b) in ISO639_ALT {
            let alias = if lang == a {
                Some(*b)
            } else if lang == b {
                Some(*a)
            } else {
                None
            };
            if let Some(alias) = alias {
                if !expanded.iter().any(|e| e == alias) {
                    expanded.push(alias.to_string());
                }
            }
        }
    }
    expanded
}

/// Filter titles by duration range and restrict their tracks to the
/// configured languages.
///
/// A title survives when `min < duration < max` (both bounds exclusive, in
/// minutes). Surviving titles keep only audio and subtitle tracks whose
/// language is in the configured list or is an alternate form of one.
pub fn filter_titles(
    titles: Vec<Title>,
    len_range: (u32, u32),
    a_lang: &[String],
    s_lang: &[String],
) -> Vec<Title> {
    let min = Duration::from_secs(u64::from(len_range.0) * 60);
    let max = Duration::from_secs(u64::from(len_range.1) * 60);

    let a_lang = expand_langs(a_lang);
    let s_lang = expand_langs(s_lang);

    let mut ret = Vec::new();
    for mut title in titles {
        if min < title.duration && title.duration < max {
            title.a_tracks.retain(|t| a_lang.iter().any(|l| *l == t.lang));
            title.s_tracks.retain(|t| s_lang.iter().any(|l| *l == t.lang));
            ret.push(title);
        }
    }
    ret
}

/// Drop titles that are content-identical to the immediately preceding one.
///
/// Workaround for discs that carry identical copies of the same title.
/// Might throw away false positives, since only duration, tracks and
/// chapters are compared. Only detects duplicates directly one after
/// another.
pub fn remove_duplicate_titles(titles: Vec<Title>) -> Vec<Title> {
    let mut ret: Vec<Title> = Vec::with_capacity(titles.len());
    for title in titles {
        let duplicate = ret
            .last()
            .map(|last| last.same_content(&title))
            .unwrap_or(false);
        if !duplicate {
            ret.push(title);
        }
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_title(index: u32, mins: u64, a_langs: &[&str], s_langs: &[&str]) -> Title {
        Title {
            index,
            duration: Duration::from_secs(mins * 60),
            a_tracks: a_langs
                .iter()
                .enumerate()
                .map(|(i, l)| Track {
                    index: i as u32 + 1,
                    lang: l.to_string(),
                })
                .collect(),
            s_tracks: s_langs
                .iter()
                .enumerate()
                .map(|(i, l)| Track {
                    index: i as u32 + 1,
                    lang: l.to_string(),
                })
                .collect(),
            chapters: (1..=10)
                .map(|number| Chapter {
                    number,
                    length_secs: mins * 6,
                })
                .collect(),
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_expand_langs_adds_alternate_forms() {
        let expanded = expand_langs(&langs(&["eng", "ger"]));
        assert_eq!(expanded, langs(&["eng", "ger", "deu"]));

        let expanded = expand_langs(&langs(&["fra", "fre"]));
        assert_eq!(expanded, langs(&["fra", "fre"]));
    }

    #[test]
    fn test_filter_keeps_main_feature_and_aliases_tracks() {
        // Feature title plus a 3 minute menu stub
        let titles = vec![
            make_title(1, 85, &["eng", "deu", "fra"], &["eng"]),
            make_title(2, 3, &["eng"], &[]),
        ];

        let kept = filter_titles(titles, (15, 200), &langs(&["eng", "ger"]), &langs(&["eng"]));

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].index, 1);
        let a: Vec<&str> = kept[0].a_tracks.iter().map(|t| t.lang.as_str()).collect();
        assert_eq!(a, vec!["eng", "deu"]);
        let s: Vec<&str> = kept[0].s_tracks.iter().map(|t| t.lang.as_str()).collect();
        assert_eq!(s, vec!["eng"]);
    }

    #[test]
    fn test_filter_bounds_are_exclusive() {
        let titles = vec![
            make_title(1, 15, &["eng"], &[]),
            make_title(2, 16, &["eng"], &[]),
            make_title(3, 49, &["eng"], &[]),
            make_title(4, 50, &["eng"], &[]),
        ];

        let kept = filter_titles(titles, (15, 50), &langs(&["eng"]), &langs(&["eng"]));
        let indices: Vec<u32> = kept.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![2, 3]);
    }

    #[test]
    fn test_remove_duplicate_titles_contiguous_only() {
        let a = make_title(1, 85, &["eng"], &["eng"]);
        let mut b = a.clone();
        b.index = 2;
        let c = make_title(3, 42, &["eng"], &[]);
        let mut a_again = a.clone();
        a_again.index = 4;

        // Second copy of `a` is dropped, the non-contiguous one survives
        let kept = remove_duplicate_titles(vec![a, b, c, a_again]);
        let indices: Vec<u32> = kept.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![1, 3, 4]);
    }

    #[test]
    fn test_remove_duplicate_titles_idempotent() {
        let a = make_title(1, 85, &["eng"], &["eng"]);
        let mut b = a.clone();
        b.index = 2;
        let c = make_title(3, 42, &["eng"], &[]);

        let once = remove_duplicate_titles(vec![a, b, c]);
        let twice = remove_duplicate_titles(once.clone());
        assert_eq!(once, twice);
    }

    // Strategy for generating titles with a small language pool
    fn title_strategy() -> impl Strategy<Value = Title> {
        (
            1u32..100,
            1u64..240,
            prop::collection::vec(
                prop_oneof![
                    Just("eng".to_string()),
                    Just("deu".to_string()),
                    Just("ger".to_string()),
                    Just("fra".to_string()),
                    Just("jpn".to_string()),
                ],
                0..4,
            ),
            prop::collection::vec(
                prop_oneof![Just("eng".to_string()), Just("deu".to_string())],
                0..3,
            ),
        )
            .prop_map(|(index, mins, a_langs, s_langs)| Title {
                index,
                duration: Duration::from_secs(mins * 60),
                a_tracks: a_langs
                    .into_iter()
                    .enumerate()
                    .map(|(i, lang)| Track {
                        index: i as u32 + 1,
                        lang,
                    })
                    .collect(),
                s_tracks: s_langs
                    .into_iter()
                    .enumerate()
                    .map(|(i, lang)| Track {
                        index: i as u32 + 1,
                        lang,
                    })
                    .collect(),
                chapters: vec![Chapter {
                    number: 1,
                    length_secs: mins * 60,
                }],
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Filtering twice with the same policy equals filtering once.
        #[test]
        fn prop_filter_idempotent(titles in prop::collection::vec(title_strategy(), 0..10)) {
            let a_lang = langs(&["eng", "ger"]);
            let s_lang = langs(&["eng"]);
            let range = (15, 200);

            let once = filter_titles(titles, range, &a_lang, &s_lang);
            let twice = filter_titles(once.clone(), range, &a_lang, &s_lang);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_dedup_idempotent(titles in prop::collection::vec(title_strategy(), 0..10)) {
            let once = remove_duplicate_titles(titles);
            let twice = remove_duplicate_titles(once.clone());
            prop_assert_eq!(once, twice);
        }

        // No adjacent pair in the output is content-identical.
        #[test]
        fn prop_dedup_no_adjacent_duplicates(titles in prop::collection::vec(title_strategy(), 0..10)) {
            let deduped = remove_duplicate_titles(titles);
            for pair in deduped.windows(2) {
                prop_assert!(!pair[0].same_content(&pair[1]));
            }
        }
    }
}
