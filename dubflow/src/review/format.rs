//! Markdown shape of review documents.
//!
//! A review export is one merged document plus one file per episode. The
//! episode text sits verbatim between two sentinel lines, so the inverse
//! parse recovers it byte for byte no matter what markdown the reviewer's
//! editor thinks it contains. The document header carries a back-reference
//! to the exported cell and the store fingerprint taken at export time;
//! both are required for reconciliation.
//!
//! ```text
//! # Debt of Love - Translated - KOREAN
//!
//! > Generated: 2024-03-05T12:30:45.000000+00:00
//! > Source: 02_translated/korean
//! > Fingerprint: 3b4f...
//! > Total Episodes: 2
//! > Total Characters: 1,204
//!
//! ## Table of Contents
//!
//! - [Episode 001: 제1화](#episode-001)
//! ...
//! <a id="episode-001"></a>
//!
//! # [Episode 001] 제1화
//!
//! **Characters**: 602
//!
//! <!-- text:begin -->
//! 본문...
//! <!-- text:end -->
//! ```

use crate::core::{EpisodeRecord, Language, StageId, StageScope};
use crate::errors::MalformedReviewError;
use std::fmt::Write as _;
use std::path::Path;

/// File name of the merged document inside a review cell folder.
pub const MERGED_REVIEW_FILE: &str = "__MERGED_REVIEW.md";

/// Subfolder of a review cell holding the per-episode files.
pub const EPISODES_DIR: &str = "episodes";

/// Sentinel line opening the verbatim episode text.
pub const TEXT_BEGIN: &str = "<!-- text:begin -->";

/// Sentinel line closing the verbatim episode text.
pub const TEXT_END: &str = "<!-- text:end -->";

const GENERATED_PREFIX: &str = "> Generated: ";
const SOURCE_PREFIX: &str = "> Source: ";
const FINGERPRINT_PREFIX: &str = "> Fingerprint: ";
const ANCHOR_PREFIX: &str = "<a id=\"episode-";
const ANCHOR_SUFFIX: &str = "\"></a>";
const HEADING_PREFIX: &str = "# [Episode ";

/// Header of a review export, rendered into the merged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewHeader {
    /// Series name, from stage 0 metadata.
    pub series_name: String,
    /// The exported stage.
    pub stage: StageId,
    /// The exported language cell, `None` for series-scoped stages.
    pub language: Option<Language>,
    /// Export timestamp.
    pub generated_at: String,
    /// Store fingerprint of the cell at export time.
    pub fingerprint: String,
    /// Number of episodes in the export.
    pub total_episodes: usize,
    /// Character count summed over all episodes.
    pub total_characters: usize,
}

impl ReviewHeader {
    /// The `> Source:` back-reference of this header.
    #[must_use]
    pub fn source_ref(&self) -> String {
        source_ref(self.stage, self.language)
    }
}

/// Header fields recovered from a merged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// The cell the document was exported from.
    pub stage: StageId,
    /// The language of that cell.
    pub language: Option<Language>,
    /// Fingerprint recorded at export time.
    pub fingerprint: String,
}

/// One episode block recovered from a review document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEpisode {
    /// Episode number from the block heading.
    pub number: u32,
    /// Heading title, empty when the heading carried none.
    pub title: String,
    /// The text between the sentinels, exactly as written.
    pub content: String,
}

/// A fully parsed merged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReview {
    /// Recovered header fields.
    pub header: ParsedHeader,
    /// Episode blocks in document order.
    pub episodes: Vec<ParsedEpisode>,
}

/// Renders the `> Source:` back-reference for a cell
/// (`02_translated/korean`, `01_split`).
#[must_use]
pub fn source_ref(stage: StageId, language: Option<Language>) -> String {
    let dir = stage.dir_name().unwrap_or_default();
    match language {
        Some(lang) => format!("{dir}/{lang}"),
        None => dir.to_string(),
    }
}

/// Resolves a `> Source:` back-reference to its cell.
///
/// Returns `None` for unknown stage directories, unknown languages, and
/// references whose language segment does not fit the stage's scope.
#[must_use]
pub fn parse_source_ref(reference: &str) -> Option<(StageId, Option<Language>)> {
    let reference = reference.trim();
    let (dir, language) = match reference.split_once('/') {
        Some((dir, lang)) => (dir, Some(lang.parse::<Language>().ok()?)),
        None => (reference, None),
    };
    let stage = StageId::ALL.into_iter().find(|s| s.dir_name() == Some(dir))?;
    if (stage.scope() == StageScope::PerLanguage) == language.is_some() {
        Some((stage, language))
    } else {
        None
    }
}

/// Anchor id of one episode (`episode-001`).
#[must_use]
pub fn anchor_id(episode_number: u32) -> String {
    format!("episode-{episode_number:03}")
}

/// File name of one per-episode review file (`episode_001.md`).
#[must_use]
pub fn episode_review_file_name(episode_number: u32) -> String {
    format!("episode_{episode_number:03}.md")
}

/// Parses `episode_NNN.md` file names, returning the episode number.
#[must_use]
pub fn episode_number_from_review_name(name: &str) -> Option<u32> {
    parse_number(name.strip_prefix("episode_")?.strip_suffix(".md")?)
}

/// Formats a count with thousands separators (`12,345`).
#[must_use]
pub fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Renders the merged review document.
#[must_use]
pub fn render_merged(header: &ReviewHeader, episodes: &[EpisodeRecord]) -> String {
    let mut out = String::new();
    let _ = write!(out, "# {} - {}", header.series_name, header.stage.title());
    if let Some(lang) = header.language {
        let _ = write!(out, " - {}", lang.label());
    }
    out.push_str("\n\n");
    let _ = writeln!(out, "{GENERATED_PREFIX}{}", header.generated_at);
    let _ = writeln!(out, "{SOURCE_PREFIX}{}", header.source_ref());
    let _ = writeln!(out, "{FINGERPRINT_PREFIX}{}", header.fingerprint);
    let _ = writeln!(out, "> Total Episodes: {}", header.total_episodes);
    let _ = writeln!(
        out,
        "> Total Characters: {}",
        format_thousands(header.total_characters)
    );
    out.push_str("\n---\n\n## Table of Contents\n\n");
    for episode in episodes {
        let anchor = anchor_id(episode.episode_number);
        if episode.title.is_empty() {
            let _ = writeln!(out, "- [Episode {:03}](#{anchor})", episode.episode_number);
        } else {
            let _ = writeln!(
                out,
                "- [Episode {:03}: {}](#{anchor})",
                episode.episode_number, episode.title
            );
        }
    }
    out.push_str("\n---\n\n");
    for episode in episodes {
        out.push_str(&render_episode_block(episode, true));
        out.push_str("\n---\n\n");
    }
    out
}

/// Renders one episode block. The merged document opens each block with
/// its anchor; the per-episode files omit it.
#[must_use]
pub fn render_episode_block(episode: &EpisodeRecord, with_anchor: bool) -> String {
    let mut out = String::new();
    if with_anchor {
        let _ = writeln!(
            out,
            "{ANCHOR_PREFIX}{:03}{ANCHOR_SUFFIX}",
            episode.episode_number
        );
        out.push('\n');
    }
    if episode.title.is_empty() {
        let _ = writeln!(out, "{HEADING_PREFIX}{:03}]", episode.episode_number);
    } else {
        let _ = writeln!(
            out,
            "{HEADING_PREFIX}{:03}] {}",
            episode.episode_number, episode.title
        );
    }
    out.push('\n');
    let _ = writeln!(
        out,
        "**Characters**: {}",
        format_thousands(episode.char_count())
    );
    out.push('\n');
    let _ = writeln!(out, "{TEXT_BEGIN}");
    let _ = writeln!(out, "{}", episode.content);
    let _ = writeln!(out, "{TEXT_END}");
    out
}

/// Parses the header of a merged document.
pub fn parse_header(text: &str, path: &Path) -> Result<ParsedHeader, MalformedReviewError> {
    let source_line = header_line(text, SOURCE_PREFIX).ok_or_else(|| {
        MalformedReviewError::new(path, "missing '> Source:' header line")
    })?;
    let (stage, language) = parse_source_ref(source_line).ok_or_else(|| {
        MalformedReviewError::new(
            path,
            format!("unknown '> Source:' back-reference '{source_line}'"),
        )
    })?;
    let fingerprint = header_line(text, FINGERPRINT_PREFIX).ok_or_else(|| {
        MalformedReviewError::new(path, "missing '> Fingerprint:' header line")
    })?;
    if fingerprint.len() != 64 || !fingerprint.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MalformedReviewError::new(
            path,
            format!("invalid fingerprint '{fingerprint}'"),
        ));
    }
    Ok(ParsedHeader {
        stage,
        language,
        fingerprint: fingerprint.to_string(),
    })
}

/// Parses a whole merged document: header plus every episode block.
pub fn parse_merged(text: &str, path: &Path) -> Result<ParsedReview, MalformedReviewError> {
    let header = parse_header(text, path)?;
    let anchors = anchor_spans(text);
    if anchors.is_empty() {
        return Err(MalformedReviewError::new(path, "no episode blocks found"));
    }
    let mut episodes = Vec::with_capacity(anchors.len());
    for (i, &(number, block_start)) in anchors.iter().enumerate() {
        let block_end = anchors
            .get(i + 1)
            .map_or(text.len(), |&(_, next_start)| next_start);
        let episode = parse_block(&text[block_start..block_end], number, path)?;
        if episodes
            .iter()
            .any(|e: &ParsedEpisode| e.number == episode.number)
        {
            return Err(MalformedReviewError::new(
                path,
                format!("episode {number:03} appears more than once"),
            ));
        }
        episodes.push(episode);
    }
    Ok(ParsedReview { header, episodes })
}

/// Parses one per-episode review file (the anchorless block form).
pub fn parse_episode_file(text: &str, path: &Path) -> Result<ParsedEpisode, MalformedReviewError> {
    let number = text
        .lines()
        .find_map(heading_parts)
        .map(|(number, _)| number)
        .ok_or_else(|| MalformedReviewError::new(path, "missing episode heading"))?;
    parse_block(text, number, path)
}

/// First header line with the given prefix, trimmed.
fn header_line<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
}

/// `(episode number, block start offset)` of every anchor line, in order.
/// The block starts after the anchor line's newline.
fn anchor_spans(text: &str) -> Vec<(u32, usize)> {
    let mut spans = Vec::new();
    for (at, _) in text.match_indices(ANCHOR_PREFIX) {
        if at > 0 && text.as_bytes()[at - 1] != b'\n' {
            continue;
        }
        let line_end = text[at..]
            .find('\n')
            .map_or(text.len(), |offset| at + offset);
        if let Some(number) = anchor_number(&text[at..line_end]) {
            spans.push((number, (line_end + 1).min(text.len())));
        }
    }
    spans
}

fn anchor_number(line: &str) -> Option<u32> {
    let digits = line
        .trim()
        .strip_prefix(ANCHOR_PREFIX)?
        .strip_suffix(ANCHOR_SUFFIX)?;
    parse_number(digits)
}

/// Splits a `# [Episode NNN] title` heading into number and title.
fn heading_parts(line: &str) -> Option<(u32, String)> {
    let rest = line.trim_end().strip_prefix(HEADING_PREFIX)?;
    let (digits, title) = rest.split_once(']')?;
    Some((parse_number(digits)?, title.trim().to_string()))
}

fn parse_number(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parses one episode block: heading, then the sentinel-delimited text.
fn parse_block(
    block: &str,
    number: u32,
    path: &Path,
) -> Result<ParsedEpisode, MalformedReviewError> {
    let (heading_number, title) = block.lines().find_map(heading_parts).ok_or_else(|| {
        MalformedReviewError::new(path, format!("episode {number:03}: missing block heading"))
    })?;
    if heading_number != number {
        return Err(MalformedReviewError::new(
            path,
            format!("episode {number:03}: heading numbered {heading_number:03} instead"),
        ));
    }
    let begin = block.find(TEXT_BEGIN).ok_or_else(|| {
        MalformedReviewError::new(
            path,
            format!("episode {number:03}: missing '{TEXT_BEGIN}' sentinel"),
        )
    })?;
    let after_begin = block[begin + TEXT_BEGIN.len()..]
        .strip_prefix('\n')
        .ok_or_else(|| {
            MalformedReviewError::new(
                path,
                format!("episode {number:03}: text does not start on its own line"),
            )
        })?;
    let end_marker = format!("\n{TEXT_END}");
    let content_end = after_begin.find(&end_marker).ok_or_else(|| {
        MalformedReviewError::new(
            path,
            format!("episode {number:03}: missing '{TEXT_END}' sentinel"),
        )
    })?;
    Ok(ParsedEpisode {
        number,
        title,
        content: after_begin[..content_end].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header() -> ReviewHeader {
        ReviewHeader {
            series_name: "Debt of Love".to_string(),
            stage: StageId::Translate,
            language: Some(Language::Korean),
            generated_at: "2024-03-05T12:30:45.000000+00:00".to_string(),
            fingerprint: "ab".repeat(32),
            total_episodes: 2,
            total_characters: 11,
        }
    }

    fn episodes() -> Vec<EpisodeRecord> {
        vec![
            EpisodeRecord::new(1, "제1화", "첫 번째 본문"),
            EpisodeRecord::new(2, "", "두 번째"),
        ]
    }

    #[test]
    fn test_merged_document_shape() {
        let text = render_merged(&header(), &episodes());
        assert!(text.starts_with("# Debt of Love - Translated - KOREAN\n"));
        assert!(text.contains("> Source: 02_translated/korean\n"));
        assert!(text.contains(&format!("> Fingerprint: {}\n", "ab".repeat(32))));
        assert!(text.contains("> Total Episodes: 2\n"));
        assert!(text.contains("- [Episode 001: 제1화](#episode-001)\n"));
        assert!(text.contains("- [Episode 002](#episode-002)\n"));
        assert!(text.contains("<a id=\"episode-001\"></a>\n"));
        assert!(text.contains("# [Episode 002]\n"));
    }

    #[test]
    fn test_merged_round_trip_recovers_content_exactly() {
        let tricky = "줄 하나\n\n---\n\n# 마크다운처럼 보이는 줄\n> 인용\n끝";
        let episodes = vec![
            EpisodeRecord::new(1, "제1화", tricky),
            EpisodeRecord::new(2, "둘", "짧은 본문"),
        ];
        let text = render_merged(&header(), &episodes);
        let parsed = parse_merged(&text, Path::new("r.md")).unwrap();
        assert_eq!(parsed.header.stage, StageId::Translate);
        assert_eq!(parsed.header.language, Some(Language::Korean));
        assert_eq!(parsed.episodes.len(), 2);
        assert_eq!(parsed.episodes[0].title, "제1화");
        assert_eq!(parsed.episodes[0].content, tricky);
        assert_eq!(parsed.episodes[1].content, "짧은 본문");
    }

    #[test]
    fn test_episode_file_round_trip() {
        let episode = EpisodeRecord::new(7, "일곱", "본문\n둘째 줄");
        let text = render_episode_block(&episode, false);
        let parsed = parse_episode_file(&text, Path::new("episode_007.md")).unwrap();
        assert_eq!(parsed.number, 7);
        assert_eq!(parsed.title, "일곱");
        assert_eq!(parsed.content, "본문\n둘째 줄");
    }

    #[test]
    fn test_empty_content_round_trips() {
        let episode = EpisodeRecord::new(1, "t", "");
        let text = render_episode_block(&episode, true);
        let parsed = parse_block(&text, 1, Path::new("r.md")).unwrap();
        assert_eq!(parsed.content, "");
    }

    #[test]
    fn test_missing_fingerprint_is_malformed() {
        let text = render_merged(&header(), &episodes())
            .lines()
            .filter(|line| !line.starts_with("> Fingerprint:"))
            .collect::<Vec<_>>()
            .join("\n");
        let err = parse_merged(&text, Path::new("r.md")).unwrap_err();
        assert!(err.detail.contains("Fingerprint"), "{}", err.detail);
    }

    #[test]
    fn test_truncated_fingerprint_is_malformed() {
        let mut h = header();
        h.fingerprint = "abc123".to_string();
        let text = render_merged(&h, &episodes());
        let err = parse_merged(&text, Path::new("r.md")).unwrap_err();
        assert!(err.detail.contains("invalid fingerprint"), "{}", err.detail);
    }

    #[test]
    fn test_damaged_sentinel_names_the_episode() {
        let text = render_merged(&header(), &episodes()).replacen(TEXT_END, "<!-- gone -->", 1);
        let err = parse_merged(&text, Path::new("r.md")).unwrap_err();
        assert!(err.detail.contains("episode 001"), "{}", err.detail);
        assert!(err.detail.contains(TEXT_END), "{}", err.detail);
    }

    #[test]
    fn test_duplicate_episode_is_malformed() {
        let episodes = vec![
            EpisodeRecord::new(1, "a", "x"),
            EpisodeRecord::new(1, "b", "y"),
        ];
        let err = parse_merged(&render_merged(&header(), &episodes), Path::new("r.md"))
            .unwrap_err();
        assert!(err.detail.contains("more than once"), "{}", err.detail);
    }

    #[test]
    fn test_source_ref_round_trip() {
        assert_eq!(
            parse_source_ref("02_translated/korean"),
            Some((StageId::Translate, Some(Language::Korean)))
        );
        assert_eq!(parse_source_ref("01_split"), Some((StageId::Split, None)));
        assert_eq!(parse_source_ref("99_unknown"), None);
        assert_eq!(parse_source_ref("02_translated"), None);
        assert_eq!(parse_source_ref("01_split/korean"), None);
        for stage in StageId::ALL.into_iter().filter(|s| s.dir_name().is_some()) {
            let language =
                (stage.scope() == StageScope::PerLanguage).then_some(Language::Japanese);
            let reference = source_ref(stage, language);
            assert_eq!(parse_source_ref(&reference), Some((stage, language)));
        }
    }

    #[test]
    fn test_episode_number_from_review_name() {
        assert_eq!(episode_number_from_review_name("episode_012.md"), Some(12));
        assert_eq!(episode_number_from_review_name("episode_.md"), None);
        assert_eq!(episode_number_from_review_name("notes.md"), None);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_series_scoped_header_has_no_language() {
        let mut h = header();
        h.stage = StageId::Split;
        h.language = None;
        let text = render_merged(&h, &episodes());
        assert!(text.starts_with("# Debt of Love - Split\n"));
        assert!(text.contains("> Source: 01_split\n"));
    }
}
