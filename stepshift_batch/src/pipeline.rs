// Conversion pipeline: from a validated config to converted song files.
//
// `RunContext::prepare` does all fallible startup work once: pad loading,
// graph construction (both graphs in parallel when the types differ), and
// fallback loading. Fallbacks are only loaded when the input pad does not
// fit within the output pad; otherwise every technique is expected to be
// available and the performance search runs without them.
//
// Each song file then becomes a `SongJob` for the scheduler. A job reads the
// song, converts every eligible chart, writes the result to the mirrored
// path under the output directory, and copies the song's other files. A
// song is written whenever its output path differs from its input path,
// even with nothing generated, so copied assets always sit next to a song. Chart
// level failures (expression or performance errors) are logged with the
// chart's log id and skipped; only song I/O fails the job.
//
// The copied-directory set is the only state shared between jobs.

use crate::config::{Config, Filters, NonChartFileCopyBehavior};
use crate::error::{BatchError, SongError};
use crate::scheduler::{BatchSummary, SchedulerConfig, WorkUnit, run_batch};
use crate::song::{Chart, Song, is_song_file};
use crate::version;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use stepshift_core::drop_detect::detect_dropped_steps;
use stepshift_core::expressed::ExpressedChart;
use stepshift_core::fallbacks::StepTypeFallbacks;
use stepshift_core::graph::StepGraph;
use stepshift_core::pad::PadData;
use stepshift_core::performed::PerformedChart;
use stepshift_prng::seed_from_bytes;
use tracing::{debug, error, info, warn};

/// Everything shared by the jobs of one run.
pub struct RunContext {
    pub config: Config,
    pub filters: Filters,
    pub input_graph: Arc<StepGraph>,
    pub output_graph: Arc<StepGraph>,
    pub fallbacks: Option<StepTypeFallbacks>,
    /// Song directories whose other files were already copied this run.
    copied_directories: Mutex<HashSet<PathBuf>>,
}

impl RunContext {
    pub fn prepare(config: Config) -> Result<Arc<RunContext>, BatchError> {
        let filters = config.validate()?;
        let pad_dir = config.pad_data_directory.as_deref();
        let input_pad = PadData::load_or_builtin(pad_dir, &config.input_chart_type)?;
        let output_pad = PadData::load_or_builtin(pad_dir, &config.output_chart_type)?;

        let fallbacks = if input_pad.can_fit_within(&output_pad) {
            None
        } else {
            let table = match &config.fallbacks_file {
                Some(path) => StepTypeFallbacks::load(path)?,
                None => StepTypeFallbacks::default_table(),
            };
            info!(
                "{} does not fit within {}; using step type fallbacks",
                config.input_chart_type, config.output_chart_type
            );
            Some(table)
        };

        let (input_graph, output_graph) = if config.input_chart_type == config.output_chart_type {
            let graph = Arc::new(StepGraph::build(input_pad)?);
            (graph.clone(), graph)
        } else {
            let (input, output) = rayon::join(
                || StepGraph::build(input_pad),
                || StepGraph::build(output_pad),
            );
            (Arc::new(input?), Arc::new(output?))
        };
        info!(
            "Built {} graph with {} nodes and {} graph with {} nodes",
            input_graph.steps_type(),
            input_graph.num_nodes(),
            output_graph.steps_type(),
            output_graph.num_nodes()
        );

        Ok(Arc::new(RunContext {
            config,
            filters,
            input_graph,
            output_graph,
            fallbacks,
            copied_directories: Mutex::new(HashSet::new()),
        }))
    }

    /// Record `dir` as copied. Returns false if it already was.
    fn claim_directory(&self, dir: &Path) -> bool {
        match self.copied_directories.lock() {
            Ok(mut set) => set.insert(dir.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().insert(dir.to_path_buf()),
        }
    }
}

/// A song file found under the input directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongFile {
    pub path: PathBuf,
    /// Directory relative to the input directory, empty at the top level.
    pub relative_dir: PathBuf,
    pub size: u64,
}

impl SongFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Find every accepted song file under `root`, in path order. Unreadable
/// directories are logged and skipped.
pub fn discover_songs(root: &Path, filters: &Filters) -> Vec<SongFile> {
    let mut out = Vec::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(relative) = stack.pop() {
        let dir = root.join(&relative);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {e}", dir.display());
                continue;
            }
        };
        let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                warn!("Failed to stat {}", path.display());
                continue;
            };
            if meta.is_dir() {
                stack.push(relative.join(entry.file_name()));
            } else if is_song_file(&path)
                && filters.accepts_file(&entry.file_name().to_string_lossy())
            {
                out.push(SongFile {
                    path,
                    relative_dir: relative.clone(),
                    size: meta.len(),
                });
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Per-file seed: the first eight bytes of the SHA-256 of the file name.
pub fn seed_for_file(file_name: &str) -> u64 {
    seed_from_bytes(&Sha256::digest(file_name.as_bytes()))
}

fn log_id(file: &SongFile, song: &Song, chart: &Chart) -> String {
    let mut rel = file.relative_dir.to_string_lossy().into_owned();
    if !rel.is_empty() {
        rel.push('/');
    }
    format!(
        "[{rel}{} \"{}\" {} {}]",
        file.file_name(),
        song.title,
        chart.chart_type,
        chart.difficulty_type
    )
}

/// Convert every eligible chart of `source` into `target`. Returns the
/// number of charts written into `target`.
pub fn add_charts(ctx: &RunContext, file: &SongFile, source: &Song, target: &mut Song) -> usize {
    let config = &ctx.config;
    let file_name = file.file_name();
    let seed = seed_for_file(&file_name);
    let mut generated = 0;

    for chart in &source.charts {
        if chart.num_players != 1
            || chart.chart_type != config.input_chart_type
            || chart.num_inputs != ctx.input_graph.num_arrows()
            || !ctx.filters.accepts_difficulty(&chart.difficulty_type)
        {
            continue;
        }
        let id = log_id(file, source, chart);

        let existing = target.find_chart(&config.output_chart_type, &chart.difficulty_type);
        if let Some(i) = existing {
            if !version::should_overwrite(config.overwrite_behavior, &target.charts[i]) {
                info!("{id} Output chart exists; not overwriting");
                continue;
            }
        }

        let expression_config =
            config.expression_config_for(&ctx.filters, &file_name, &chart.difficulty_type);
        let expressed = match ExpressedChart::create(
            &chart.events,
            &ctx.input_graph,
            expression_config,
            chart.difficulty_rating,
            &id,
        ) {
            Ok(expressed) => expressed,
            Err(e) => {
                error!("{id} Failed to express chart: {e}");
                continue;
            }
        };

        let performance_config =
            config.performance_config_for(&ctx.filters, &file_name, &chart.difficulty_type);
        let performed = match PerformedChart::create(
            &ctx.output_graph,
            performance_config,
            ctx.output_graph.start_tiers(),
            ctx.fallbacks.as_ref(),
            &expressed,
            seed,
            &id,
        ) {
            Ok(performed) => performed,
            Err(e) => {
                error!("{id} Failed to perform chart: {e}");
                continue;
            }
        };
        let events = performed.create_events(&ctx.output_graph);

        if config.warn_on_dropped_steps {
            let mut source_events = chart.events.clone();
            source_events.sort();
            let report = detect_dropped_steps(&source_events, &events);
            if !report.is_clean() {
                warn!("{id} {report}");
            }
        }

        let new_chart = Chart {
            chart_type: config.output_chart_type.clone(),
            difficulty_type: chart.difficulty_type.clone(),
            difficulty_rating: chart.difficulty_rating,
            num_players: 1,
            num_inputs: ctx.output_graph.num_arrows(),
            author: version::mark(&chart.author),
            description: version::mark(&chart.description),
            events,
            extras: chart.extras.clone(),
        };
        match existing {
            Some(i) => target.charts[i] = new_chart,
            None => target.charts.push(new_chart),
        }
        info!(
            "{id} Generated {} {} chart (bracket parsing {:?}, start tier {})",
            config.output_chart_type,
            chart.difficulty_type,
            expressed.bracket_parsing_method(),
            performed.start_tier()
        );
        generated += 1;
    }
    generated
}

/// Convert one song file. Returns the number of charts generated.
pub fn process_song(ctx: &RunContext, file: &SongFile) -> Result<usize, BatchError> {
    let song = Song::load(&file.path)?;
    let output_dir = ctx.config.output_directory.join(&file.relative_dir);
    let output_path = output_dir.join(file.file_name());

    // Generated charts from earlier runs live in the output file.
    let mut target = if output_path != file.path && output_path.exists() {
        Song::load(&output_path)?
    } else {
        song.clone()
    };

    let generated = add_charts(ctx, file, &song, &mut target);
    if generated > 0 || output_path != file.path {
        std::fs::create_dir_all(&output_dir).map_err(|source| SongError::Write {
            path: output_dir.clone(),
            source,
        })?;
        target.save(&output_path)?;
    }
    copy_non_chart_files(ctx, file);
    Ok(generated)
}

fn is_newer(source: &Path, dest: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source), modified(dest)) {
        (Some(s), Some(d)) => s > d,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

/// Copy the files next to a song (anything that is not a song file) to the
/// output directory, once per directory per run. Failures are warnings.
pub fn copy_non_chart_files(ctx: &RunContext, file: &SongFile) {
    let behavior = ctx.config.non_chart_file_copy_behavior;
    if behavior == NonChartFileCopyBehavior::DoNotCopy {
        return;
    }
    let source_dir = ctx.config.input_directory.join(&file.relative_dir);
    let dest_dir = ctx.config.output_directory.join(&file.relative_dir);
    if source_dir == dest_dir || !ctx.claim_directory(&source_dir) {
        return;
    }
    let entries = match std::fs::read_dir(&source_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {}: {e}", source_dir.display());
            return;
        }
    };
    if let Err(e) = std::fs::create_dir_all(&dest_dir) {
        warn!("Failed to create {}: {e}", dest_dir.display());
        return;
    }
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() || is_song_file(&path) {
            continue;
        }
        let dest = dest_dir.join(entry.file_name());
        if behavior == NonChartFileCopyBehavior::IfNewer && !is_newer(&path, &dest) {
            continue;
        }
        match std::fs::copy(&path, &dest) {
            Ok(_) => debug!("Copied {} to {}", path.display(), dest.display()),
            Err(e) => warn!("Failed to copy {}: {e}", path.display()),
        }
    }
}

struct SongJob {
    ctx: Arc<RunContext>,
    file: SongFile,
}

impl WorkUnit for SongJob {
    fn size(&self) -> u64 {
        self.file.size
    }

    fn label(&self) -> String {
        self.file.path.display().to_string()
    }

    fn run(self) -> Result<usize, BatchError> {
        process_song(&self.ctx, &self.file)
    }
}

/// Convert every song under the configured input directory.
pub fn run(config: Config) -> Result<BatchSummary, BatchError> {
    let scheduler = SchedulerConfig {
        concurrency: config.concurrency(),
        min_delay: config.min_poll_delay(),
        max_delay: config.max_poll_delay(),
    };
    let ctx = RunContext::prepare(config)?;
    let files = discover_songs(&ctx.config.input_directory, &ctx.filters);
    info!(
        "Found {} song files under {}",
        files.len(),
        ctx.config.input_directory.display()
    );
    let jobs: Vec<SongJob> = files
        .into_iter()
        .map(|file| SongJob {
            ctx: ctx.clone(),
            file,
        })
        .collect();
    let summary = run_batch(jobs, &scheduler);
    info!(
        "Processed {} songs and generated {} charts.",
        summary.completed, summary.charts_generated
    );
    if summary.failed > 0 {
        warn!("{} songs failed", summary.failed);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_depends_only_on_the_file_name() {
        assert_eq!(seed_for_file("a.chart.json"), seed_for_file("a.chart.json"));
        assert_ne!(seed_for_file("a.chart.json"), seed_for_file("b.chart.json"));
        let digest = Sha256::digest(b"a.chart.json");
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        assert_eq!(seed_for_file("a.chart.json"), u64::from_le_bytes(first));
    }

    #[test]
    fn discovery_walks_subdirectories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("pack/b")).unwrap();
        std::fs::create_dir_all(root.join("pack/a")).unwrap();
        std::fs::write(root.join("pack/b/song.chart.json"), "{}").unwrap();
        std::fs::write(root.join("pack/a/song.chart.json"), "{}").unwrap();
        std::fs::write(root.join("pack/a/song.ogg"), "audio").unwrap();
        std::fs::write(root.join("top.chart.json"), "{}").unwrap();

        let filters = Config::default().validate().unwrap();
        let found = discover_songs(root, &filters);
        let rel: Vec<_> = found.iter().map(|f| f.relative_dir.clone()).collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("pack/a"),
                PathBuf::from("pack/b"),
                PathBuf::new()
            ]
        );
        assert_eq!(found[0].size, 2);

        let filters = Config {
            input_name_regex: Some("^top".to_string()),
            ..Config::default()
        }
        .validate()
        .unwrap();
        assert_eq!(discover_songs(root, &filters).len(), 1);
    }
}
