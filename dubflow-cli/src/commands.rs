//! Subcommand handlers for the `dubflow` binary.
//!
//! Environment and terminal concerns live here: the library itself never
//! reads process state, so roots, prompts and exit codes are resolved in
//! this module before anything is handed to the engine.

use anyhow::{bail, Context};
use dubflow::config::{
    PipelineConfig, PipelineConfigBuilder, ResumePolicy, SeriesPaths, DEFAULT_PEAK_DB,
    DEFAULT_RMS_DB,
};
use dubflow::core::{clean_series_name, Language, SeriesMetadata, SourceUnit, StageId, StageScope};
use dubflow::pipeline::{ExecutionPlan, PipelineRunner, PlanAction, PlanEntry, Planner};
use dubflow::qa::QaAggregator;
use dubflow::review::{ReviewProjector, ReviewReconciler};
use dubflow::services::ServiceSet;
use dubflow::store::ArtifactStore;
use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{PipelineArgs, PlanArgs, QaCommands, ReviewCommands, RunArgs};

/// The three tree roots the subcommands work under.
#[derive(Debug, Clone)]
pub struct Roots {
    /// Source document tree.
    pub source: PathBuf,
    /// Processed artifact tree.
    pub output: PathBuf,
    /// Review mirror tree.
    pub review: PathBuf,
}

impl Roots {
    /// Resolves flags against environment fallbacks and local defaults.
    ///
    /// Precedence per root: flag, then `SERIES_SOURCE_DIR` /
    /// `SERIES_OUTPUT_DIR` / `SERIES_REVIEW_DIR`, then a folder under the
    /// working directory. An unset review root lands under the output root.
    pub fn resolve(
        source: Option<PathBuf>,
        output: Option<PathBuf>,
        review: Option<PathBuf>,
    ) -> Self {
        Self::assemble(
            pick(source, std::env::var_os("SERIES_SOURCE_DIR")),
            pick(output, std::env::var_os("SERIES_OUTPUT_DIR")),
            pick(review, std::env::var_os("SERIES_REVIEW_DIR")),
        )
    }

    fn assemble(
        source: Option<PathBuf>,
        output: Option<PathBuf>,
        review: Option<PathBuf>,
    ) -> Self {
        let source = source.unwrap_or_else(|| PathBuf::from("origin"));
        let output = output.unwrap_or_else(|| PathBuf::from("processed"));
        let review = review.unwrap_or_else(|| output.join("_review"));
        Self {
            source,
            output,
            review,
        }
    }
}

fn pick(flag: Option<PathBuf>, env: Option<OsString>) -> Option<PathBuf> {
    flag.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
}

/// What the operator chose for one already-satisfied cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the artifact and leave the cell skipped.
    Keep,
    /// Invalidate the artifact and run the stage again.
    Rerun,
    /// Stop before anything is touched.
    Abort,
}

/// Decides what to do with cells the planner marked as already satisfied.
pub trait RunDecider {
    /// Chooses a decision for one satisfied cell.
    fn decide(&mut self, entry: &PlanEntry) -> anyhow::Result<Decision>;
}

/// Decider for `--auto` runs: every satisfied cell is kept.
pub struct AutoDecider;

impl RunDecider for AutoDecider {
    fn decide(&mut self, _entry: &PlanEntry) -> anyhow::Result<Decision> {
        Ok(Decision::Keep)
    }
}

/// Interactive decider reading single-letter answers from the operator.
pub struct PromptDecider<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptDecider<R, W> {
    /// Wraps an input/output pair, typically stdin and stderr.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> RunDecider for PromptDecider<R, W> {
    fn decide(&mut self, entry: &PlanEntry) -> anyhow::Result<Decision> {
        loop {
            write!(
                self.output,
                "stage {} ({}): {}. [k]eep / [r]erun / [a]bort? ",
                entry.stage,
                entry.cell_label(),
                entry.reason,
            )?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                // Closed stdin reads as an abort, never as consent.
                return Ok(Decision::Abort);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "" | "k" | "keep" => return Ok(Decision::Keep),
                "r" | "rerun" => return Ok(Decision::Rerun),
                "a" | "abort" | "q" => return Ok(Decision::Abort),
                other => writeln!(self.output, "unrecognized answer '{other}'")?,
            }
        }
    }
}

/// Walks the satisfied cells through a decider, invalidates the ones chosen
/// for a rerun and re-plans. Nothing is invalidated until every answer is
/// in, so an abort leaves the store exactly as it was.
fn apply_decisions(
    config: &PipelineConfig,
    store: &ArtifactStore,
    plan: ExecutionPlan,
    decider: &mut dyn RunDecider,
) -> anyhow::Result<ExecutionPlan> {
    let mut rerun = Vec::new();
    for entry in plan.entries() {
        if entry.action != PlanAction::SkipSatisfied {
            continue;
        }
        match decider.decide(entry)? {
            Decision::Keep => {}
            Decision::Rerun => rerun.push((entry.stage, entry.language)),
            Decision::Abort => bail!("run aborted before execution"),
        }
    }
    if rerun.is_empty() {
        return Ok(plan);
    }
    for (stage, language) in rerun {
        store.invalidate(stage, language);
    }
    Ok(Planner::plan(config, store))
}

/// Everything a plan or run needs for one series.
struct SeriesTarget {
    unit: SourceUnit,
    paths: SeriesPaths,
    store: ArtifactStore,
}

fn resolve_series(config: &PipelineConfig, source_file: &Path) -> anyhow::Result<SeriesTarget> {
    let path = if source_file.is_absolute() {
        source_file.to_path_buf()
    } else {
        config.source_root.join(source_file)
    };
    if !path.is_file() {
        bail!("source file {} does not exist", path.display());
    }
    let unit = SourceUnit::from_path(&config.source_root, &path);
    // Stage 0 derives the real metadata; this record only fixes the layout.
    let source_language = unit.territory.parse().unwrap_or(Language::Korean);
    let meta = SeriesMetadata::new(clean_series_name(&unit.file_stem), &unit, source_language);
    let paths = config.series_paths(&meta);
    let store = ArtifactStore::open(paths.series_dir.clone());
    Ok(SeriesTarget { unit, paths, store })
}

fn base_builder(roots: &Roots, args: &PipelineArgs) -> anyhow::Result<PipelineConfigBuilder> {
    let mut builder = PipelineConfig::builder()
        .source_root(&roots.source)
        .output_root(&roots.output)
        .review_root(&roots.review);
    if let Some(langs) = &args.langs {
        builder = builder.languages_str(langs)?;
    }
    if let Some(skip) = &args.skip {
        builder = builder.skip_str(skip)?;
    }
    if let Some(cap) = args.max_episodes {
        builder = builder.max_episodes(cap);
    }
    if args.fresh {
        builder = builder.resume(ResumePolicy::RequireFresh);
    }
    Ok(builder)
}

fn run_config(roots: &Roots, args: &RunArgs) -> anyhow::Result<PipelineConfig> {
    let mut builder = base_builder(roots, &args.pipeline)?
        .stop_on_error(args.stop_on_error)
        .use_preset_audio(args.use_preset_audio)
        .mastering(
            args.peak_db.unwrap_or(DEFAULT_PEAK_DB),
            args.rms_db.unwrap_or(DEFAULT_RMS_DB),
        );
    if let Some(secs) = args.rate_limit {
        builder = builder.rate_limit_secs(secs)?;
    }
    Ok(builder.build()?)
}

/// Plans and executes a full pipeline run for one source document.
pub async fn handle_run_command(args: RunArgs, roots: &Roots) -> anyhow::Result<()> {
    let config = run_config(roots, &args)?;
    let target = resolve_series(&config, &args.pipeline.source_file)?;
    let plan = Planner::plan(&config, &target.store);

    let plan = if args.auto {
        let mut decider = AutoDecider;
        apply_decisions(&config, &target.store, plan, &mut decider)?
    } else {
        let stdin = io::stdin();
        let mut decider = PromptDecider::new(stdin.lock(), io::stderr());
        apply_decisions(&config, &target.store, plan, &mut decider)?
    };

    print!("{plan}");
    info!(source = %target.unit.path.display(), "Executing plan");
    let services = ServiceSet::local();
    let runner = PipelineRunner::new(
        &config,
        &target.paths,
        &target.store,
        &services,
        &target.unit,
    );
    let summary = runner.execute(&plan).await;
    print!("{summary}");
    if !summary.success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Prints the execution plan for one source document without running it.
pub fn handle_plan_command(args: PlanArgs, roots: &Roots) -> anyhow::Result<()> {
    let config = base_builder(roots, &args.pipeline)?.build()?;
    let target = resolve_series(&config, &args.pipeline.source_file)?;
    let plan = Planner::plan(&config, &target.store);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{plan}");
        let counts = plan.counts();
        println!(
            "{} to run, {} skipped on request, {} already satisfied",
            counts.run, counts.skip_requested, counts.skip_satisfied,
        );
    }
    Ok(())
}

/// Review mirror operations: export cells for editing, sync edits back.
pub fn handle_review_command(cmd: ReviewCommands, roots: &Roots) -> anyhow::Result<()> {
    match cmd {
        ReviewCommands::Export {
            series_dir,
            stage,
            lang,
        } => {
            let stage: StageId = stage.parse()?;
            let language = match &lang {
                Some(name) => Some(name.parse::<Language>()?),
                None => None,
            };
            match (stage.scope(), language) {
                (StageScope::PerLanguage, None) => {
                    bail!("stage {stage} is per-language; pass --lang")
                }
                (StageScope::Series, Some(_)) => {
                    bail!("stage {stage} is series-scoped; drop --lang")
                }
                _ => {}
            }
            let store = ArtifactStore::open(series_dir);
            let paths = review_paths(roots, &store)?;
            let export = ReviewProjector::new(&store, &paths).project(stage, language)?;
            println!("merged review: {}", export.merged_path.display());
            println!("episode files: {}", export.episode_paths.len());
            if let Some(path) = &export.prompt_path {
                println!("prompt capture: {}", path.display());
            }
            if let Some(path) = &export.glossary_path {
                println!("glossary: {}", path.display());
            }
            Ok(())
        }
        ReviewCommands::Sync { path } => {
            let store = store_for_review_path(roots, &path)?;
            let report = ReviewReconciler::new(&store).reconcile(&path)?;
            let cell = report
                .language
                .map_or_else(|| "series".to_string(), |l| l.to_string());
            println!(
                "reconciled stage {} ({cell}): {} changed, {} unchanged",
                report.stage, report.changed, report.unchanged,
            );
            Ok(())
        }
    }
}

/// Aggregates gate reports and writes the series QA summary.
pub fn handle_qa_command(cmd: QaCommands) -> anyhow::Result<()> {
    match cmd {
        QaCommands::Report { series_dir, langs } => {
            let languages = match &langs {
                Some(list) => parse_languages(list)?,
                None => Language::DEFAULT_TARGETS.to_vec(),
            };
            let store = ArtifactStore::open(series_dir);
            let aggregator = QaAggregator::new(&store);
            let summary = aggregator.aggregate(&languages)?;
            print!("{summary}");
            let (md, json) = aggregator.write_reports(&summary)?;
            println!("reports written: {} and {}", md.display(), json.display());
            Ok(())
        }
    }
}

/// Resolves the per-series folder set for an already-prepared series.
fn review_paths(roots: &Roots, store: &ArtifactStore) -> anyhow::Result<SeriesPaths> {
    let meta = store
        .read_metadata()
        .context("series metadata not found; run stage 0 first")?;
    let relative = Path::new(&meta.language_code)
        .join(&meta.publisher)
        .join(&meta.series_name);
    Ok(SeriesPaths {
        series_dir: store.series_dir().to_path_buf(),
        review_dir: roots.review.join(relative),
    })
}

/// Maps a review-mirror path back onto its canonical series store.
///
/// The mirror repeats the output layout, so the first three components
/// under the review root name the series.
fn store_for_review_path(roots: &Roots, path: &Path) -> anyhow::Result<ArtifactStore> {
    let relative = path.strip_prefix(&roots.review).map_err(|_| {
        anyhow::anyhow!(
            "{} is not under the review root {}",
            path.display(),
            roots.review.display(),
        )
    })?;
    let mut components = relative.components();
    let series: PathBuf = components.by_ref().take(3).collect();
    if series.components().count() < 3 || components.next().is_none() {
        bail!(
            "{} does not end in {{territory}}/{{publisher}}/{{series}}/<cell>",
            path.display(),
        );
    }
    Ok(ArtifactStore::open(roots.output.join(series)))
}

fn parse_languages(list: &str) -> anyhow::Result<Vec<Language>> {
    let mut languages = Vec::new();
    for token in list.split(',').filter(|t| !t.trim().is_empty()) {
        languages.push(token.parse::<Language>()?);
    }
    Ok(languages)
}
