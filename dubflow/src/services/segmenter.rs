//! Heading-pattern episode segmentation.

use super::{ContentSegmenter, SplitEpisode, SplitOutcome};
use crate::core::Language;
use crate::errors::StageError;
use async_trait::async_trait;
use regex::Regex;

/// Line-anchored heading patterns, tried in order. The first pattern that
/// matches at least [`MIN_HEADINGS`] lines wins.
const HEADING_PATTERNS: [(&str, &str); 7] = [
    ("제N화", r"(?m)^제(\d+)화\s*$"),
    ("第N話", r"(?m)^第(\d+)話\s*$"),
    ("#N화", r"(?m)^#(\d+)화\s*$"),
    ("$N화", r"(?m)^\$(\d+)화\s*$"),
    ("$NNN", r"(?m)^(?:\* \* \*)?\$(\d{3})"),
    ("Episode N", r"(?mi)^episode\s+(\d+)\b.*$"),
    ("N화", r"(?m)^(\d+)화\s*$"),
];

/// A heading pattern needs this many hits to count as a multi-episode source.
const MIN_HEADINGS: usize = 2;

const CONFIDENCE_PATTERN: f64 = 0.9;
const CONFIDENCE_SINGLE: f64 = 0.5;

/// Splits sources on recurring episode heading lines.
///
/// Sources without a recognized recurring heading fall back to a single
/// episode covering the whole text. Pattern detection that needs a language
/// model sits behind the [`ContentSegmenter`] seam instead.
#[derive(Debug)]
pub struct HeadingSegmenter {
    patterns: Vec<(&'static str, Regex)>,
}

impl HeadingSegmenter {
    /// Compiles the heading pattern table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: HEADING_PATTERNS
                .iter()
                .filter_map(|&(name, pattern)| Regex::new(pattern).ok().map(|r| (name, r)))
                .collect(),
        }
    }

    fn best_pattern(&self, text: &str) -> Option<(&'static str, &Regex)> {
        self.patterns
            .iter()
            .enumerate()
            .map(|(idx, (name, regex))| (idx, *name, regex, regex.find_iter(text).count()))
            .filter(|&(_, _, _, hits)| hits >= MIN_HEADINGS)
            .min_by_key(|&(idx, _, _, hits)| (std::cmp::Reverse(hits), idx))
            .map(|(_, name, regex, _)| (name, regex))
    }

    fn split_on(regex: &Regex, text: &str) -> Vec<SplitEpisode> {
        let matches: Vec<(usize, usize, u32)> = regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let number = caps.get(1)?.as_str().parse().ok()?;
                Some((whole.start(), whole.end(), number))
            })
            .collect();

        let mut episodes = Vec::with_capacity(matches.len());
        for (i, &(_, end, number)) in matches.iter().enumerate() {
            let content_end = matches.get(i + 1).map_or(text.len(), |&(start, _, _)| start);
            let content = text[end..content_end].trim().to_string();
            episodes.push(SplitEpisode {
                number,
                title: String::new(),
                content,
            });
        }

        // Duplicate or zero numbers mean the captures were unreliable.
        let mut seen = std::collections::BTreeSet::new();
        let unreliable = episodes
            .iter()
            .any(|e| e.number == 0 || !seen.insert(e.number));
        if unreliable {
            for (i, episode) in episodes.iter_mut().enumerate() {
                episode.number = i as u32 + 1;
            }
        }
        episodes
    }

    fn single_episode(text: &str, file_name: &str) -> Vec<SplitEpisode> {
        let title = std::path::Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name)
            .to_string();
        vec![SplitEpisode {
            number: 1,
            title,
            content: text.trim().to_string(),
        }]
    }
}

impl Default for HeadingSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSegmenter for HeadingSegmenter {
    async fn split_episodes(
        &self,
        text: &str,
        file_name: &str,
        _language: Language,
    ) -> Result<SplitOutcome, StageError> {
        if text.trim().is_empty() {
            return Err(StageError::InvalidInput(
                "cannot split an empty source".to_string(),
            ));
        }
        let outcome = match self.best_pattern(text) {
            Some((name, regex)) => SplitOutcome {
                episodes: Self::split_on(regex, text),
                pattern: name.to_string(),
                confidence: CONFIDENCE_PATTERN,
            },
            None => SplitOutcome {
                episodes: Self::single_episode(text, file_name),
                pattern: "single".to_string(),
                confidence: CONFIDENCE_SINGLE,
            },
        };
        Ok(outcome)
    }
}
