//! Stage 3a: classify dialogue speakers and embed inline speaker tags.

use crate::core::{EpisodeRecord, StageId};
use crate::errors::StageError;
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::store::GlossaryEntry;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

/// Tags each formatted episode with inline speaker markers.
///
/// The model emits `[name(role, gender)]:` markers; a rule-based pass then
/// normalizes line breaks, merges consecutive same-speaker lines and maps
/// source-language names in the tags through the glossary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakerTaggingStage;

#[async_trait]
impl StageUnit for SpeakerTaggingStage {
    fn name(&self) -> &str {
        "speaker_tagging"
    }

    fn id(&self) -> StageId {
        StageId::SpeakerTagging
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let episodes = ctx
            .store()
            .read_episodes(StageId::TtsFormat, Some(language))?;
        if episodes.is_empty() {
            return Err(StageError::InvalidInput(
                "no formatted episodes to tag".to_string(),
            ));
        }

        let glossary = ctx.store().read_glossary(language)?;
        let rules = SpeakerRules::new();
        for record in &episodes {
            let tagged = ctx
                .services()
                .model
                .tag_speakers(&record.content, language)
                .await?;
            report.api_calls += 1;
            let cleaned = rules.normalize(&tagged, &glossary);
            if cleaned != tagged {
                debug!(episode = record.episode_number, "normalized speaker tags");
            }
            let out = EpisodeRecord::new(record.episode_number, record.title.clone(), cleaned)
                .with_metadata("speaker_tags_applied", json!(true))
                .with_metadata("speaker_tagging_language", json!(language.to_string()))
                .with_metadata("consolidated", json!(true));
            ctx.store()
                .write_episode(StageId::SpeakerTagging, Some(language), &out)?;
            report.produced_files += 1;
        }
        ctx.store()
            .seal(StageId::SpeakerTagging, Some(language), Some(episodes.len()))?;
        report.note(format!("tagged speakers in {} episodes", episodes.len()));
        Ok(report)
    }
}

/// Rule-based cleanup applied to model output.
struct SpeakerRules {
    /// A speaker tag glued to preceding text on the same line.
    inline_tag: Option<Regex>,
    /// Runs of three or more newlines.
    blank_runs: Option<Regex>,
    /// A full speaker line, tag plus content.
    speaker_line: Option<Regex>,
}

impl SpeakerRules {
    fn new() -> Self {
        Self {
            inline_tag: Regex::new(r"([^\n\[])(\[[^\]]+\]:)").ok(),
            blank_runs: Regex::new(r"\n{3,}").ok(),
            speaker_line: Regex::new(r"^\[([^\]]+)\]:\s*(.*)$").ok(),
        }
    }

    fn normalize(&self, tagged: &str, glossary: &[GlossaryEntry]) -> String {
        let broken = self.break_before_tags(tagged);
        let consolidated = self.consolidate_speakers(&broken);
        translate_tag_names(&consolidated, glossary)
    }

    /// Moves every speaker tag to the start of its own line.
    fn break_before_tags(&self, tagged: &str) -> String {
        let mut text = match &self.inline_tag {
            Some(re) => re.replace_all(tagged, "$1\n\n$2").into_owned(),
            None => tagged.to_string(),
        };
        if let Some(re) = &self.blank_runs {
            text = re.replace_all(&text, "\n\n").into_owned();
        }
        text.trim_start_matches('\n').to_string()
    }

    /// Merges consecutive lines spoken by the same speaker into one line and
    /// keeps a blank line between different speakers.
    fn consolidate_speakers(&self, tagged: &str) -> String {
        let Some(speaker_line) = &self.speaker_line else {
            return tagged.to_string();
        };
        let mut out: Vec<String> = Vec::new();
        let mut current: Option<(String, Vec<String>)> = None;

        for line in tagged.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                flush(&mut out, &mut current);
                if out.last().is_some_and(|l| !l.is_empty()) {
                    out.push(String::new());
                }
                continue;
            }
            match speaker_line.captures(trimmed) {
                Some(caps) => {
                    let tag = format!("[{}]", &caps[1]);
                    let content = caps[2].trim().to_string();
                    if current.as_ref().is_some_and(|(cur, _)| *cur == tag) {
                        if !content.is_empty() {
                            if let Some((_, parts)) = current.as_mut() {
                                parts.push(content);
                            }
                        }
                    } else {
                        if flush(&mut out, &mut current)
                            && out.last().is_some_and(|l| !l.is_empty())
                        {
                            out.push(String::new());
                        }
                        let parts = if content.is_empty() {
                            Vec::new()
                        } else {
                            vec![content]
                        };
                        current = Some((tag, parts));
                    }
                }
                None => {
                    if let Some((_, parts)) = current.as_mut() {
                        parts.push(trimmed.to_string());
                    } else {
                        out.push(trimmed.to_string());
                    }
                }
            }
        }
        flush(&mut out, &mut current);
        out.join("\n")
    }
}

fn flush(out: &mut Vec<String>, current: &mut Option<(String, Vec<String>)>) -> bool {
    if let Some((speaker, parts)) = current.take() {
        if !parts.is_empty() {
            out.push(format!("{speaker}: {}", parts.join(" ")));
            return true;
        }
    }
    false
}

/// Replaces source-language character names inside speaker tags with their
/// glossary translations. Tags like `[민수(MAIN, MAN)]:` keep the role
/// suffix.
fn translate_tag_names(tagged: &str, glossary: &[GlossaryEntry]) -> String {
    let mut text = tagged.to_string();
    for entry in glossary {
        if entry.category != "character"
            || entry.translation.is_empty()
            || entry.translation == entry.original
        {
            continue;
        }
        text = text.replace(
            &format!("[{}]", entry.original),
            &format!("[{}]", entry.translation),
        );
        text = text.replace(
            &format!("[{}(", entry.original),
            &format!("[{}(", entry.translation),
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Language;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    #[test]
    fn test_inline_tags_move_to_their_own_lines() {
        let rules = SpeakerRules::new();
        let cleaned = rules.normalize(
            "[민수(MAIN, MAN)]: \"안녕하세요.\" [NARRATOR]: 그가 인사했다.",
            &[],
        );
        assert_eq!(
            cleaned,
            "[민수(MAIN, MAN)]: \"안녕하세요.\"\n\n[NARRATOR]: 그가 인사했다."
        );
    }

    #[test]
    fn test_consecutive_speaker_lines_merge() {
        let rules = SpeakerRules::new();
        let cleaned = rules.normalize(
            "[NARRATOR]: 첫 문장.\n[NARRATOR]: 둘째 문장.\n\n[민수]: 안녕.",
            &[],
        );
        assert_eq!(cleaned, "[NARRATOR]: 첫 문장. 둘째 문장.\n\n[민수]: 안녕.");
    }

    #[test]
    fn test_untagged_lines_join_the_current_speaker() {
        let rules = SpeakerRules::new();
        let cleaned = rules.normalize("[NARRATOR]: 비가 내렸다.\n그리고 그쳤다.", &[]);
        assert_eq!(cleaned, "[NARRATOR]: 비가 내렸다. 그리고 그쳤다.");
    }

    #[test]
    fn test_character_names_map_through_glossary() {
        let glossary = vec![GlossaryEntry::new("character", "민수", "ミンス")];
        let cleaned = translate_tag_names("[민수(MAIN, MAN)]: こんにちは。\n\n[민수]: また。", &glossary);
        assert_eq!(cleaned, "[ミンス(MAIN, MAN)]: こんにちは。\n\n[ミンス]: また。");
    }

    #[test]
    fn test_location_entries_never_touch_tags() {
        let glossary = vec![GlossaryEntry::new("location", "서울", "ソウル")];
        let cleaned = translate_tag_names("[서울]: ありえない行", &glossary);
        assert_eq!(cleaned, "[서울]: ありえない行");
    }

    #[tokio::test]
    async fn test_tagging_writes_marked_records() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_stage(
            StageId::TtsFormat,
            Some(Language::Japanese),
            &[(1, "題名", "第1話。題名。\n\n本文です。"), (2, "続編", "第2話。続編。\n\n続きです。")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let report = SpeakerTaggingStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 2);
        let records = series
            .store
            .read_episodes(StageId::SpeakerTagging, Some(Language::Japanese))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].content.starts_with("[narrator]\n"));
        assert_eq!(records[0].metadata["speaker_tags_applied"], json!(true));
        assert_eq!(
            records[0].metadata["speaker_tagging_language"],
            json!("japanese")
        );
    }
}
