//! End-to-end runs over the scripted service set.

use crate::core::{Language, StageId};
use crate::pipeline::plan::{PlanAction, Planner};
use crate::pipeline::runner::{PipelineRunner, RUN_SUMMARY_FILE};
use crate::pipeline::summary::{CellOutcome, RunSummary};
use crate::qa::TranslationQaFragment;
use crate::services::{CastingPlan, MusicPlan, ServiceSet, SplitEpisode, VoiceAssignment};
use crate::stages::{AudioConfig, EpisodeAudio};
use crate::store::{AUDIO_CONFIG_FILE, CHUNK_MANIFEST_FILE, QA_REPORT_FILE};
use crate::testing::{ScriptedServices, TestSeries};
use std::sync::Arc;
use tempfile::TempDir;

const SOURCE: &str = "제1화\n첫 번째 본문입니다.\n\n제2화\n두 번째 본문입니다.";

async fn run(series: &TestSeries, services: &ServiceSet) -> RunSummary {
    let runner = PipelineRunner::new(
        &series.config,
        &series.paths,
        &series.store,
        services,
        &series.unit,
    );
    let plan = Planner::plan(&series.config, &series.store);
    runner.execute(&plan).await
}

#[tokio::test]
async fn test_text_only_run_settles_every_cell() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Korean])
            .skip_str("5,6,6a,7")
            .unwrap()
            .rate_limit_secs(0.0)
            .unwrap()
    });
    let scripted = Arc::new(ScriptedServices::new().with_source_text(SOURCE));
    let services = ScriptedServices::share(&scripted);

    let summary = run(&series, &services).await;

    assert!(summary.success());
    let counts = summary.counts();
    assert_eq!(counts.succeeded, 7);
    assert_eq!(counts.skipped_requested, 4);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.blocked, 0);
    assert_eq!(summary.api_calls, 9);

    // The audio stages never ran.
    for stage in [
        StageId::AudioSetup,
        StageId::TtsGeneration,
        StageId::TtsQa,
        StageId::AudioMixing,
    ] {
        let record = summary.record(stage, Some(Language::Korean)).unwrap();
        assert_eq!(record.outcome, CellOutcome::SkippedRequested);
    }
    assert_eq!(scripted.call_count("cast_voices"), 0);
    assert_eq!(scripted.call_count("synthesize"), 0);

    // Text artifacts exist through stage 4 and carry both tag markers.
    let tagged = series
        .store
        .read_episodes(StageId::EmotionTagging, Some(Language::Korean))
        .unwrap();
    assert_eq!(tagged.len(), 2);
    assert!(tagged[0].content.starts_with("[calm]\n[narrator]\n"));

    // The translation gate sealed a passing fragment for the identity cell.
    let fragment: Option<TranslationQaFragment> = series
        .store
        .read_json_optional(StageId::TranslationQa, Some(Language::Korean), QA_REPORT_FILE)
        .unwrap();
    assert!(fragment.unwrap().passed);

    assert!(series.paths.logs_dir().join(RUN_SUMMARY_FILE).is_file());
    assert!(series
        .paths
        .logs_dir()
        .join("stage_04_tagged.korean.log")
        .is_file());
}

#[tokio::test]
async fn test_stop_on_error_keeps_the_sibling_cell_that_ran_first() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Korean, Language::Japanese])
            .stop_on_error(true)
            .rate_limit_secs(0.0)
            .unwrap()
    });
    let services = ScriptedServices::new()
        .with_source_text(SOURCE)
        .failing_translation(Language::Japanese)
        .into_services();

    let summary = run(&series, &services).await;

    assert!(!summary.success());
    // Stages 0 and 1 succeeded, the korean translate cell ran first, then
    // the japanese cell failed and the run halted before the next entry.
    assert_eq!(summary.records.len(), 4);
    let halt = summary.halted_at.unwrap();
    assert_eq!(halt.stage, StageId::Translate);
    assert_eq!(halt.language, Some(Language::Japanese));
    assert!(summary
        .record(StageId::TranslationQa, Some(Language::Korean))
        .is_none());

    let korean = summary
        .record(StageId::Translate, Some(Language::Korean))
        .unwrap();
    assert_eq!(korean.outcome, CellOutcome::Succeeded);
    let failed = summary
        .record(StageId::Translate, Some(Language::Japanese))
        .unwrap();
    assert!(matches!(failed.outcome, CellOutcome::Failed { .. }));
    assert!(!failed.log_tail.is_empty());

    // The korean artifact survived the halt and is reused next time.
    let next = Planner::plan(&series.config, &series.store);
    assert_eq!(
        next.entry(StageId::Translate, Some(Language::Korean))
            .unwrap()
            .action,
        PlanAction::SkipSatisfied
    );
    assert_eq!(
        next.entry(StageId::Translate, Some(Language::Japanese))
            .unwrap()
            .action,
        PlanAction::Run
    );
}

#[tokio::test]
async fn test_second_run_reuses_every_artifact() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Korean])
            .skip_str("5,6,6a,7")
            .unwrap()
            .rate_limit_secs(0.0)
            .unwrap()
    });
    let scripted = Arc::new(ScriptedServices::new().with_source_text(SOURCE));
    let services = ScriptedServices::share(&scripted);

    let first = run(&series, &services).await;
    assert!(first.success());
    let calls_after_first = scripted.call_count("format_for_tts");

    let second_plan = Planner::plan(&series.config, &series.store);
    assert_eq!(second_plan.counts().run, 0);
    assert_eq!(second_plan.counts().skip_satisfied, 7);
    assert!(second_plan
        .entries()
        .iter()
        .all(|e| e.action != PlanAction::Run));

    let runner = PipelineRunner::new(
        &series.config,
        &series.paths,
        &series.store,
        &services,
        &series.unit,
    );
    let second = runner.execute(&second_plan).await;

    assert!(second.success());
    assert_eq!(second.counts().skipped_satisfied, 7);
    assert_eq!(second.counts().succeeded, 0);
    assert_eq!(second.api_calls, 0);
    assert_eq!(scripted.call_count("format_for_tts"), calls_after_first);
    for record in &second.records {
        assert!(matches!(
            record.outcome,
            CellOutcome::SkippedSatisfied | CellOutcome::SkippedRequested
        ));
    }
}

#[tokio::test]
async fn test_failed_gate_never_blocks_downstream_text_stages() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Japanese])
            .skip_str("5,6,6a,7")
            .unwrap()
            .rate_limit_secs(0.0)
            .unwrap()
    });
    // The scripted translation keeps the hangul body verbatim behind a
    // "(JP) " prefix, so the gate records language-mixing errors.
    let services = ScriptedServices::new()
        .with_source_text(SOURCE)
        .into_services();

    let summary = run(&series, &services).await;

    let gate = summary
        .record(StageId::TranslationQa, Some(Language::Japanese))
        .unwrap();
    assert_eq!(gate.outcome, CellOutcome::Succeeded);
    let fragment: Option<TranslationQaFragment> = series
        .store
        .read_json_optional(StageId::TranslationQa, Some(Language::Japanese), QA_REPORT_FILE)
        .unwrap();
    assert!(!fragment.unwrap().passed);

    // The failing verdict stayed in the fragment; formatting and tagging
    // still ran to completion.
    for stage in [StageId::TtsFormat, StageId::SpeakerTagging, StageId::EmotionTagging] {
        let record = summary.record(stage, Some(Language::Japanese)).unwrap();
        assert_eq!(record.outcome, CellOutcome::Succeeded, "{stage} did not run");
    }
    assert!(summary.success());
}

#[tokio::test]
async fn test_preset_audio_run_produces_final_mixes() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Korean])
            .rate_limit_secs(0.0)
            .unwrap()
            .use_preset_audio(true)
    });
    let mut meta = series.seed_metadata(Language::Korean);
    meta.default_voice_id = Some("kr-voice".to_string());
    series.store.write_metadata(&meta).unwrap();
    let scripted = Arc::new(ScriptedServices::new().with_source_text(SOURCE));
    let services = ScriptedServices::share(&scripted);

    let summary = run(&series, &services).await;

    assert!(summary.success(), "run failed: {summary}");
    let finals = series
        .store
        .descriptor(StageId::AudioMixing, Some(Language::Korean));
    assert!(finals.is_satisfying());
    assert_eq!(finals.file_count, 2);
    assert!(scripted.call_count("synthesize") > 0);
    assert_eq!(
        scripted.call_count("transcribe"),
        scripted.call_count("synthesize")
    );
}

#[tokio::test]
async fn test_casting_run_carries_the_model_plan_into_synthesis() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Korean]).rate_limit_secs(0.0).unwrap()
    });
    let scripted = Arc::new(
        ScriptedServices::new()
            .with_source_text(SOURCE)
            .with_episodes(vec![SplitEpisode {
                number: 1,
                title: "낭독 특별편".to_string(),
                content: "스크립트로 주입한 본문입니다.".to_string(),
            }])
            .with_casting(CastingPlan {
                series_summary: "Two-voice reading.".to_string(),
                voices: vec![
                    VoiceAssignment {
                        character: "소희".to_string(),
                        voice_id: "girl-3".to_string(),
                    },
                    VoiceAssignment {
                        character: "Narrator".to_string(),
                        voice_id: "nar-9".to_string(),
                    },
                ],
                music: MusicPlan {
                    opening: None,
                    background: None,
                    gain_db: -12.0,
                },
            }),
    );
    let services = ScriptedServices::share(&scripted);

    let summary = run(&series, &services).await;

    assert!(summary.success(), "run failed: {summary}");
    assert_eq!(scripted.call_count("split_episodes"), 1);
    assert_eq!(scripted.call_count("cast_voices"), 1);

    // The scripted segmentation replaced heading detection.
    let split = series.store.read_episodes(StageId::Split, None).unwrap();
    assert_eq!(split.len(), 1);
    assert_eq!(split[0].title, "낭독 특별편");

    // The narrator assignment wins whatever its position in the plan.
    let config: AudioConfig = series
        .store
        .read_json(StageId::AudioSetup, Some(Language::Korean), AUDIO_CONFIG_FILE)
        .unwrap();
    assert_eq!(config.default_voice_id, "nar-9");
    assert_eq!(config.voices.len(), 2);
    assert_eq!(config.music.gain_db, -12.0);

    let manifest_path = series
        .store
        .stage_dir(StageId::TtsGeneration, Some(Language::Korean))
        .join("episode_001")
        .join(CHUNK_MANIFEST_FILE);
    let manifest: EpisodeAudio =
        serde_json::from_slice(&std::fs::read(manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.voice_id, "nar-9");

    // No music configured, so the mastered track becomes the final one.
    assert_eq!(scripted.call_count("mix_music"), 0);
    let finals = series
        .store
        .descriptor(StageId::AudioMixing, Some(Language::Korean));
    assert!(finals.is_satisfying());
    assert_eq!(finals.file_count, 1);
}

#[tokio::test]
async fn test_failed_synthesis_blocks_the_dependent_audio_cells() {
    let tmp = TempDir::new().unwrap();
    let series = TestSeries::at_with(tmp.path(), |b| {
        b.languages([Language::Korean])
            .rate_limit_secs(0.0)
            .unwrap()
            .use_preset_audio(true)
    });
    let mut meta = series.seed_metadata(Language::Korean);
    meta.default_voice_id = Some("kr-voice".to_string());
    series.store.write_metadata(&meta).unwrap();
    let scripted = Arc::new(
        ScriptedServices::new()
            .with_source_text(SOURCE)
            .failing_synthesis(),
    );
    let services = ScriptedServices::share(&scripted);

    let summary = run(&series, &services).await;

    assert!(!summary.success());
    assert!(summary.halted_at.is_none());
    let counts = summary.counts();
    assert_eq!(counts.succeeded, 7);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.blocked, 2);

    let failed = summary
        .record(StageId::TtsGeneration, Some(Language::Korean))
        .unwrap();
    assert!(matches!(failed.outcome, CellOutcome::Failed { .. }));
    assert_eq!(scripted.call_count("synthesize"), 1);

    // Both consumers of the chunk audio settled as blocked, not failed.
    for stage in [StageId::TtsQa, StageId::AudioMixing] {
        let record = summary.record(stage, Some(Language::Korean)).unwrap();
        assert_eq!(
            record.outcome,
            CellOutcome::Blocked {
                missing: StageId::TtsGeneration
            }
        );
    }
    assert_eq!(scripted.call_count("concat"), 0);
}
