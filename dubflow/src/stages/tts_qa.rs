//! Stage 6a: verify synthesized chunks against their source text.

use crate::core::StageId;
use crate::errors::StageError;
use crate::qa::{ChunkCheck, EpisodeChecks, TtsQaFragment};
use crate::stages::tts_generation::read_manifests;
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::store::QA_REPORT_FILE;
use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

/// Characters compared between text tail and transcription.
const TAIL_CHARS: usize = 10;

/// Checks that each chunk's audio actually reaches the end of its text.
///
/// Synthesis engines occasionally truncate long chunks mid-sentence. The
/// gate transcribes each chunk and verifies the normalized tail of the
/// source text appears in the transcription. The verdict travels in the
/// fragment; a failing check never aborts the gate itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtsQaStage;

#[async_trait]
impl StageUnit for TtsQaStage {
    fn name(&self) -> &str {
        "tts_qa"
    }

    fn id(&self) -> StageId {
        StageId::TtsQa
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let manifests = read_manifests(ctx.store(), language)?;
        if manifests.is_empty() {
            return Err(StageError::InvalidInput(
                "no synthesized episodes to verify".to_string(),
            ));
        }

        let rules = TailRules::new();
        let mut episodes = Vec::with_capacity(manifests.len());
        for (episode_dir, manifest) in &manifests {
            let mut checks = Vec::with_capacity(manifest.chunks.len());
            for chunk in &manifest.chunks {
                let original_tail = rules.tail(&chunk.text, TAIL_CHARS);
                if original_tail.is_empty() {
                    checks.push(ChunkCheck {
                        chunk_file: chunk.file.clone(),
                        chunk_index: chunk.index,
                        passed: false,
                        original_last_chars: String::new(),
                        transcribed_last_chars: String::new(),
                        contained: false,
                        error: Some("no comparable text in chunk".to_string()),
                    });
                    continue;
                }

                let audio = episode_dir.join(&chunk.file);
                let attempt = ctx.services().speech.transcribe(&audio, language).await;
                report.api_calls += 1;
                let transcript = match attempt {
                    Ok(text) => text,
                    Err(e @ StageError::ServiceNotConfigured { .. }) => return Err(e),
                    Err(e) => {
                        warn!(chunk = %chunk.file, "transcription failed: {e}");
                        checks.push(ChunkCheck {
                            chunk_file: chunk.file.clone(),
                            chunk_index: chunk.index,
                            passed: false,
                            original_last_chars: original_tail,
                            transcribed_last_chars: String::new(),
                            contained: false,
                            error: Some(e.to_string()),
                        });
                        continue;
                    }
                };

                let normalized = rules.normalize(&transcript);
                let contained = normalized.contains(&original_tail);
                checks.push(ChunkCheck {
                    chunk_file: chunk.file.clone(),
                    chunk_index: chunk.index,
                    passed: contained,
                    original_last_chars: original_tail,
                    transcribed_last_chars: last_chars(&normalized, TAIL_CHARS),
                    contained,
                    error: None,
                });
            }
            episodes.push(EpisodeChecks::from_chunks(manifest.episode_number, checks));
        }

        let fragment = TtsQaFragment::from_episodes(language, episodes);
        report.note(format!(
            "speech gate {}: {}/{} chunks passed",
            if fragment.passed() { "passed" } else { "failed" },
            fragment.passed_count,
            fragment.passed_count + fragment.failed_count,
        ));
        ctx.store()
            .write_json(StageId::TtsQa, Some(language), QA_REPORT_FILE, &fragment)?;
        report.produced_files += 1;
        ctx.store().seal(StageId::TtsQa, Some(language), Some(1))?;
        Ok(report)
    }
}

/// Normalization rules shared by text tails and transcriptions.
struct TailRules {
    audio_tags: Option<Regex>,
    parentheticals: Option<Regex>,
    markup: Option<Regex>,
    non_word: Option<Regex>,
}

impl TailRules {
    fn new() -> Self {
        Self {
            audio_tags: Regex::new(r"\[[^\]]+\]").ok(),
            parentheticals: Regex::new(r"\([^)]+\)").ok(),
            markup: Regex::new(r"<[^>]+>").ok(),
            non_word: Regex::new(r"[^\w\u{AC00}-\u{D7AF}\u{3040}-\u{30FF}\u{4E00}-\u{9FFF}]").ok(),
        }
    }

    /// Strips delivery tags, parentheticals, markup and everything that is
    /// not a word or CJK character.
    fn normalize(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for rule in [&self.audio_tags, &self.parentheticals, &self.markup, &self.non_word] {
            if let Some(re) = rule {
                cleaned = re.replace_all(&cleaned, "").into_owned();
            }
        }
        cleaned
    }

    /// The last `n` comparable characters of `text`.
    fn tail(&self, text: &str, n: usize) -> String {
        last_chars(&self.normalize(text), n)
    }
}

fn last_chars(text: &str, n: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars[chars.len().saturating_sub(n)..].iter().collect()
}
