//! Stage 2a: read-only quality gate over freshly translated episodes.

use crate::core::{Language, StageId};
use crate::errors::StageError;
use crate::qa::{EpisodeIssues, IssueKind, QaIssue, Severity, TranslationQaFragment};
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::store::{GlossaryEntry, QA_REPORT_FILE};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;

/// Context radius, in characters, around a source-script finding.
const MIXING_CONTEXT: usize = 30;

/// Context radius around a name-variant finding.
const MISMATCH_CONTEXT: usize = 20;

/// Acceptable translated/source character-count ratio.
const LENGTH_RATIO_MIN: f64 = 0.3;
const LENGTH_RATIO_MAX: f64 = 3.0;

/// Korean onomatopoeia and mimetic words that translators sometimes keep
/// verbatim. Finding one is a style note, not a failure.
const KOREAN_ONOMATOPOEIA: &[&str] = &[
    // Sound effects
    "킁킁", "쿵", "쾅", "짝짝", "딩동", "띵동", "뚝뚝", "졸졸", "철썩", "쨍그랑",
    "빵", "펑", "탁", "딱", "쩝쩝", "찍찍", "끽끽", "끼익", "삐걱", "덜컹",
    "쿵쿵", "쾅쾅", "두근두근", "콩닥콩닥",
    // Emotional expressions
    "훗", "흥", "헉", "엉엉", "흑흑", "앙앙", "깔깔", "히히", "호호", "끄덕끄덕",
    "푸하하", "껄껄", "키득키득", "끙끙", "쩝", "푸", "헐", "엥", "에잇",
    // Movement and state
    "살금살금", "후다닥", "뚜벅뚜벅", "터벅터벅", "휘청휘청", "비틀비틀",
    "아장아장", "뒤뚱뒤뚱", "사뿐사뿐",
];

/// Han characters that language models habitually swap for look-alikes in
/// character names, keyed by the correct character.
const SIMILAR_HAN: &[(char, &[char])] = &[
    ('賢', &['炫', '玄', '鉉', '泫', '眩']),
    ('俊', &['浚', '峻', '駿', '濬']),
    ('敏', &['民', '珉', '旻', '玟', '憫']),
    ('趙', &['曹', '兆', '朝']),
    ('輝', &['煇', '暉', '徽', '揮']),
    ('仁', &['寅', '認']),
    ('秀', &['洙', '壽', '修', '守']),
    ('赫', &['爀', '嚇']),
    ('允', &['尹', '潤', '倫']),
    ('濟', &['済', '祭', '制']),
    ('雅', &['亞', '娥', '芽']),
];

/// Examines a language cell's translated episodes and drops a
/// [`TranslationQaFragment`] into the gate's stage dir.
///
/// The gate never rewrites episode records; its verdict travels in the
/// fragment and the consolidated report. A failing verdict does not block
/// downstream stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationQaStage;

#[async_trait]
impl StageUnit for TranslationQaStage {
    fn name(&self) -> &str {
        "translation_qa"
    }

    fn id(&self) -> StageId {
        StageId::TranslationQa
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let meta = ctx.metadata()?;
        let translated = ctx
            .store()
            .read_episodes(StageId::Translate, Some(language))?;
        if translated.is_empty() {
            return Err(StageError::InvalidInput(
                "no translated episodes to examine".to_string(),
            ));
        }

        let fragment = if language == meta.source_language {
            ctx.log("source-language cell, no translation to examine");
            TranslationQaFragment::from_episodes(language, Vec::new())
        } else {
            let source_chars: BTreeMap<u32, usize> = ctx
                .store()
                .read_episodes(StageId::Split, None)?
                .iter()
                .map(|e| (e.episode_number, e.char_count()))
                .collect();
            let checker = TranslationChecker::new(
                meta.source_language,
                ctx.store().read_glossary(language)?,
            );
            let mut episodes = Vec::with_capacity(translated.len());
            for record in &translated {
                let issues = checker.check(
                    &record.content,
                    source_chars.get(&record.episode_number).copied(),
                );
                if !issues.is_empty() {
                    ctx.log(format!(
                        "episode {}: {} errors, {} warnings",
                        record.episode_number,
                        issues.iter().filter(|i| i.is_error()).count(),
                        issues.iter().filter(|i| !i.is_error()).count(),
                    ));
                }
                episodes.push(EpisodeIssues::from_issues(record.episode_number, issues));
            }
            TranslationQaFragment::from_episodes(language, episodes)
        };

        report.note(format!(
            "gate {}: {} errors, {} warnings across {} episodes",
            if fragment.passed { "passed" } else { "failed" },
            fragment.error_count,
            fragment.warning_count,
            translated.len(),
        ));
        ctx.store()
            .write_json(StageId::TranslationQa, Some(language), QA_REPORT_FILE, &fragment)?;
        report.produced_files = 1;
        ctx.store()
            .seal(StageId::TranslationQa, Some(language), Some(1))?;
        Ok(report)
    }
}

/// Validation rules bound to one source language and glossary.
struct TranslationChecker {
    source_script: Option<Regex>,
    korean_source: bool,
    glossary: Vec<GlossaryEntry>,
}

impl TranslationChecker {
    fn new(source: Language, glossary: Vec<GlossaryEntry>) -> Self {
        // Ideographs are shared across CJK, so only hangul and kana runs
        // identify leftover source text reliably.
        let pattern = match source {
            Language::Korean => Some(r"[\u{AC00}-\u{D7AF}]+"),
            Language::Japanese => Some(r"[\u{3040}-\u{309F}\u{30A0}-\u{30FF}]+"),
            Language::Taiwanese => None,
        };
        Self {
            source_script: pattern.and_then(|p| Regex::new(p).ok()),
            korean_source: source == Language::Korean,
            glossary,
        }
    }

    /// Runs every check over one episode's content.
    fn check(&self, content: &str, source_chars: Option<usize>) -> Vec<QaIssue> {
        let mut issues = Vec::new();
        self.check_language_mixing(content, &mut issues);
        self.check_glossary(content, &mut issues);
        check_tag_balance(content, &mut issues);
        if let Some(source_chars) = source_chars {
            check_length_ratio(content.chars().count(), source_chars, &mut issues);
        }
        issues
    }

    fn check_language_mixing(&self, content: &str, issues: &mut Vec<QaIssue>) {
        let Some(regex) = &self.source_script else {
            return;
        };
        for m in regex.find_iter(content) {
            let run = m.as_str();
            let (severity, message) = if self.korean_source && KOREAN_ONOMATOPOEIA.contains(&run) {
                (
                    Severity::Warning,
                    format!("onomatopoeia kept verbatim: \"{run}\""),
                )
            } else {
                (
                    Severity::Error,
                    format!("source-language text remains: \"{run}\""),
                )
            };
            issues.push(
                QaIssue::new(IssueKind::LanguageMixing, severity, run, message)
                    .with_context(surrounding(content, m.start(), m.end(), MIXING_CONTEXT)),
            );
        }
    }

    fn check_glossary(&self, content: &str, issues: &mut Vec<QaIssue>) {
        for entry in &self.glossary {
            if !entry.original.is_empty() && content.contains(&entry.original) {
                issues.push(
                    QaIssue::new(
                        IssueKind::UntranslatedTerm,
                        Severity::Error,
                        &entry.original,
                        format!(
                            "untranslated term: \"{}\" should read \"{}\"",
                            entry.original, entry.translation
                        ),
                    )
                    .with_expected(&entry.translation),
                );
            }
            if entry.category != "character" {
                continue;
            }
            for variant in han_variants(&entry.translation) {
                if let Some(pos) = content.find(&variant) {
                    issues.push(
                        QaIssue::new(
                            IssueKind::GlossaryMismatch,
                            Severity::Error,
                            &variant,
                            format!(
                                "inconsistent name variant: \"{variant}\" should read \"{}\"",
                                entry.translation
                            ),
                        )
                        .with_expected(&entry.translation)
                        .with_context(surrounding(
                            content,
                            pos,
                            pos + variant.len(),
                            MISMATCH_CONTEXT,
                        )),
                    );
                }
            }
        }
    }
}

/// All look-alike spellings of `text` with one Han character substituted.
fn han_variants(text: &str) -> Vec<String> {
    let mut variants = Vec::new();
    for (i, ch) in text.char_indices() {
        let Some((_, alts)) = SIMILAR_HAN.iter().find(|(correct, _)| *correct == ch) else {
            continue;
        };
        for alt in *alts {
            let mut variant = String::with_capacity(text.len());
            variant.push_str(&text[..i]);
            variant.push(*alt);
            variant.push_str(&text[i + ch.len_utf8()..]);
            variants.push(variant);
        }
    }
    variants
}

fn check_tag_balance(content: &str, issues: &mut Vec<QaIssue>) {
    let opens = content.chars().filter(|&c| c == '[').count();
    let closes = content.chars().filter(|&c| c == ']').count();
    if opens != closes {
        issues.push(QaIssue::new(
            IssueKind::TagBalance,
            Severity::Warning,
            if opens > closes { "[" } else { "]" },
            format!("unbalanced square brackets ({opens} opening, {closes} closing)"),
        ));
    }
}

fn check_length_ratio(translated: usize, source: usize, issues: &mut Vec<QaIssue>) {
    if source == 0 {
        return;
    }
    let ratio = translated as f64 / source as f64;
    if !(LENGTH_RATIO_MIN..=LENGTH_RATIO_MAX).contains(&ratio) {
        issues.push(QaIssue::new(
            IssueKind::LengthRatio,
            Severity::Warning,
            format!("{ratio:.2}"),
            format!(
                "translated length is {ratio:.2}x the source, outside {LENGTH_RATIO_MIN}-{LENGTH_RATIO_MAX}"
            ),
        ));
    }
}

/// `radius` characters of context on each side of a byte span.
fn surrounding(text: &str, start: usize, end: usize, radius: usize) -> String {
    let prefix: String = text[..start]
        .chars()
        .rev()
        .take(radius)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let suffix: String = text[end..].chars().take(radius).collect();
    format!("{prefix}{}{suffix}", &text[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EpisodeRecord;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    fn checker(glossary: Vec<GlossaryEntry>) -> TranslationChecker {
        TranslationChecker::new(Language::Korean, glossary)
    }

    #[test]
    fn test_hangul_in_japanese_cell_is_an_error() {
        let issues = checker(Vec::new()).check("彼は「안녕」と言った。", None);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::LanguageMixing);
        assert!(issues[0].is_error());
        assert_eq!(issues[0].text, "안녕");
        assert!(issues[0].context.as_deref().unwrap_or("").contains("言った"));
    }

    #[test]
    fn test_onomatopoeia_downgrades_to_warning() {
        let issues = checker(Vec::new()).check("ドアが쿵と閉まった。", None);
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_error());
    }

    #[test]
    fn test_untranslated_glossary_term_carries_expected() {
        let glossary = vec![GlossaryEntry::new("character", "박민준", "パク・ミンジュン")];
        let issues = checker(glossary).check("박민준は走った。", None);
        // The hangul run and the term check both fire.
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::UntranslatedTerm
                && i.expected.as_deref() == Some("パク・ミンジュン")));
    }

    #[test]
    fn test_han_variant_in_character_name_is_a_mismatch() {
        let glossary = vec![GlossaryEntry::new("character", "김현우", "金賢宇")];
        let issues = checker(glossary).check("金炫宇は頷いた。", None);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::GlossaryMismatch);
        assert_eq!(issues[0].expected.as_deref(), Some("金賢宇"));
    }

    #[test]
    fn test_length_ratio_outside_band_warns() {
        let mut issues = Vec::new();
        check_length_ratio(10, 100, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::LengthRatio);
        issues.clear();
        check_length_ratio(90, 100, &mut issues);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_unbalanced_brackets_warn() {
        let mut issues = Vec::new();
        check_tag_balance("[スキル獲得 の瞬間", &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::TagBalance);
    }

    #[tokio::test]
    async fn test_gate_writes_fragment_and_seals() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_split(&[(1, "", "본문입니다.")]);
        let clean = EpisodeRecord::new(1, "", "Japanese text only.");
        series
            .store
            .write_episode(StageId::Translate, Some(Language::Japanese), &clean)
            .unwrap();
        series
            .store
            .seal(StageId::Translate, Some(Language::Japanese), Some(1))
            .unwrap();
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let report = TranslationQaStage.execute(&ctx).await.unwrap();

        assert_eq!(report.produced_files, 1);
        let fragment: TranslationQaFragment = series
            .store
            .read_json(StageId::TranslationQa, Some(Language::Japanese), QA_REPORT_FILE)
            .unwrap();
        assert!(fragment.passed);
        assert_eq!(fragment.fixed_count, 0);
        assert!(series
            .store
            .descriptor(StageId::TranslationQa, Some(Language::Japanese))
            .is_satisfying());
    }

    #[tokio::test]
    async fn test_source_language_cell_passes_trivially() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_split(&[(1, "", "본문입니다.")]);
        series.seed_stage(
            StageId::Translate,
            Some(Language::Korean),
            &[(1, "", "본문입니다.")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        TranslationQaStage.execute(&ctx).await.unwrap();

        let fragment: TranslationQaFragment = series
            .store
            .read_json(StageId::TranslationQa, Some(Language::Korean), QA_REPORT_FILE)
            .unwrap();
        assert!(fragment.passed);
        assert!(fragment.episodes.is_empty());
    }
}
