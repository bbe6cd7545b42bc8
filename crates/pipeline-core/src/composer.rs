//! Output fan-out: left, right, interleaved artifacts and per-tick metrics
//!
//! ```text
//!                      ┌──> [left writer]
//! [PipelineRun] ──tick─┼──> [right writer]
//!   (producer)         ├──> [interleaved writer]   L, R, L, R, ...
//!                      └──> [metrics]
//! ```
//!
//! Each consumer owns a bounded channel, so a slow writer stalls only its own
//! run. Upstream work happens once per tick regardless of the number of
//! consumers.

use crate::config::PipelineConfig;
use crate::context::ModuleContext;
use crate::error::PipelineError;
use crate::executor::{PipelineRun, TickOutput};
use crate::graph::PipelineGraph;
use crate::module::ModuleImpl;
use crate::request::PipelineResponse;
use crate::writer::{artifact_file_name, Artifact, ArtifactWriter};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};
use uuid::Uuid;
use video_pipeline_common::{MetricRecord, SharedFrame, VideoResource};
use video_pipeline_metrics::compute_metrics;

/// Sink parameter choosing the player side
pub const VIDEO_PLAYER_PARAM: &str = "video_player";

/// Sink parameter prefixing artifact names
pub const PATH_PARAM: &str = "path";

/// Where a player side takes its frames from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// The unprocessed source frame
    Original,
    /// Result node at this index of [`PipelineGraph::sinks`]
    Sink(usize),
}

/// Assignment of lanes to the left and right player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidePlan {
    pub left: Lane,
    pub right: Lane,
}

impl SidePlan {
    /// One result node: original on the left, result on the right. Two result
    /// nodes: by `video_player`, falling back to submission order.
    #[must_use]
    pub fn for_graph(graph: &PipelineGraph) -> Self {
        let sinks = graph.sinks();
        if sinks.len() < 2 {
            return Self {
                left: Lane::Original,
                right: Lane::Sink(0),
            };
        }
        let side = |i: usize| sinks[i].params().get_str(VIDEO_PLAYER_PARAM);
        let in_order = Self {
            left: Lane::Sink(0),
            right: Lane::Sink(1),
        };
        let swapped = Self {
            left: Lane::Sink(1),
            right: Lane::Sink(0),
        };
        match (side(0), side(1)) {
            (Some("left"), Some("right") | None) | (None, Some("right")) => in_order,
            (Some("right"), Some("left") | None) | (None, Some("left")) => swapped,
            (None, None) => {
                debug!("No video_player sides given; using submission order");
                in_order
            }
            (a, b) => {
                warn!(
                    "Result nodes '{}' and '{}' claim sides {:?}/{:?}; using submission order",
                    sinks[0].id(),
                    sinks[1].id(),
                    a,
                    b
                );
                in_order
            }
        }
    }

    /// Frames for the left and right player at one tick
    #[must_use]
    pub fn pick(&self, tick: &TickOutput) -> (SharedFrame, SharedFrame) {
        let lane = |lane: Lane| match lane {
            Lane::Original => Arc::clone(&tick.original),
            Lane::Sink(i) => Arc::clone(&tick.sinks[i]),
        };
        (lane(self.left), lane(self.right))
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub source: VideoResource,
    pub left: Artifact,
    pub right: Artifact,
    /// `None` when frame sizes differed and interleaving was skipped
    pub interleaved: Option<Artifact>,
    pub metrics: Vec<MetricRecord>,
    pub ticks: u64,
}

impl PipelineOutcome {
    #[must_use]
    pub fn interleaved_skipped(&self) -> bool {
        self.interleaved.is_none()
    }

    #[must_use]
    pub fn response(&self) -> PipelineResponse {
        PipelineResponse {
            left: self.left.locator(),
            right: self.right.locator(),
            interleaved: self
                .interleaved
                .as_ref()
                .map(Artifact::locator)
                .unwrap_or_default(),
            metrics: self.metrics.clone(),
        }
    }
}

struct ProducerSummary {
    ticks: u64,
    interleaved_skipped: bool,
}

/// Runs graphs to completion, writing artifacts into the output directory
#[derive(Debug, Clone)]
pub struct Composer {
    output_dir: PathBuf,
    channel_capacity: usize,
    context: ModuleContext,
}

impl Composer {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            channel_capacity: config.channel_capacity.max(1),
            context: config.module_context(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Execute a validated graph and finalize its artifacts
    ///
    /// # Errors
    ///
    /// Returns the first resource, module, process or IO error. Frames written
    /// before a failing tick stay on disk.
    pub fn run(&self, graph: &PipelineGraph) -> Result<PipelineOutcome, PipelineError> {
        let plan = SidePlan::for_graph(graph);
        let run = PipelineRun::start(graph, &self.context)?;
        std::fs::create_dir_all(&self.output_dir)?;

        let source = run.source().clone();
        let left_base = self.artifact_base(graph, plan.left, &source);
        let right_base = self.artifact_base(graph, plan.right, &source);
        let interleaved_base = format!("{}-{}", source.stem(), Uuid::new_v4().simple());

        let cap = self.channel_capacity;
        let (left_tx, left_rx) = bounded::<SharedFrame>(cap);
        let (right_tx, right_rx) = bounded::<SharedFrame>(cap);
        let (inter_tx, inter_rx) = bounded::<(SharedFrame, SharedFrame)>(cap);
        let (metrics_tx, metrics_rx) = bounded::<(SharedFrame, SharedFrame)>(cap);
        let dir = self.output_dir.as_path();

        let (produced, left, right, interleaved, metrics) = thread::scope(|scope| {
            let left = scope.spawn(move || write_frames(left_rx, ArtifactWriter::new(dir, left_base)));
            let right =
                scope.spawn(move || write_frames(right_rx, ArtifactWriter::new(dir, right_base)));
            let interleaved = scope.spawn(move || {
                write_pairs(inter_rx, ArtifactWriter::new(dir, interleaved_base))
            });
            let metrics = scope.spawn(move || {
                metrics_rx
                    .iter()
                    .map(|(a, b)| compute_metrics(&a, &b))
                    .collect::<Vec<_>>()
            });

            let produced = produce(run, plan, left_tx, right_tx, inter_tx, metrics_tx);
            (
                produced,
                joined(left.join()),
                joined(right.join()),
                joined(interleaved.join()),
                metrics.join().map_err(|_| panicked()),
            )
        });

        let summary = produced?;
        let mut left = left?;
        let mut right = right?;
        let metrics = metrics?;
        let interleaved = if summary.interleaved_skipped {
            interleaved?.discard()?;
            None
        } else {
            Some(interleaved?)
        };

        let sinks = graph.sinks();
        for (lane, artifact) in [(plan.left, &mut left), (plan.right, &mut right)] {
            if let Lane::Sink(i) = lane {
                if let Some(processed) = self.finalize_sink(graph, i, artifact, source.fps)? {
                    info!(
                        "Result node '{}' post-processed into {}",
                        sinks[i].id(),
                        processed.path.display()
                    );
                    *artifact = processed;
                }
            }
        }

        info!(
            "Pipeline finished: {} ticks, left={}, right={}, interleaved={}",
            summary.ticks,
            left.locator(),
            right.locator(),
            interleaved
                .as_ref()
                .map_or_else(|| "<skipped>".to_string(), Artifact::locator)
        );
        Ok(PipelineOutcome {
            source,
            left,
            right,
            interleaved,
            metrics,
            ticks: summary.ticks,
        })
    }

    fn artifact_base(&self, graph: &PipelineGraph, lane: Lane, source: &VideoResource) -> String {
        let token = Uuid::new_v4().simple();
        let prefix = match lane {
            Lane::Sink(i) => graph.sinks()[i]
                .params()
                .get_str(PATH_PARAM)
                .filter(|p| !p.is_empty())
                .map(sanitize),
            Lane::Original => None,
        };
        match prefix {
            Some(p) => format!("{p}-{}-{token}", source.stem()),
            None => format!("{}-{token}", source.stem()),
        }
    }

    /// Give a result node the chance to post-process its artifact
    fn finalize_sink(
        &self,
        graph: &PipelineGraph,
        index: usize,
        artifact: &Artifact,
        fps: f64,
    ) -> Result<Option<Artifact>, PipelineError> {
        let node = graph.sinks()[index];
        let ModuleImpl::Sink(sink) = node.module().implementation() else {
            return Ok(None);
        };
        let stem = artifact
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = self.output_dir.join(format!("{stem}-{}.tmp.yuv", node.id()));
        let Some(produced) = sink
            .finalize(node.params(), &artifact.resource(fps), &staging)
            .map_err(|e| PipelineError::from_module(node.id(), e))?
        else {
            return Ok(None);
        };

        let frame_len = u64::from(produced.width) * u64::from(produced.height) * 3 / 2;
        let frames = match std::fs::metadata(&produced.path) {
            Ok(meta) if frame_len > 0 => meta.len() / frame_len,
            _ => 0,
        };
        let final_path = self.output_dir.join(artifact_file_name(
            &format!("{stem}-{}", node.id()),
            produced.width,
            produced.height,
        ));
        std::fs::rename(&produced.path, &final_path)?;
        artifact.clone().discard()?;
        Ok(Some(Artifact {
            path: final_path,
            frames,
            width: produced.width,
            height: produced.height,
        }))
    }
}

/// Keep artifact prefixes to a single safe path component
fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn panicked() -> PipelineError {
    PipelineError::Internal("output consumer thread panicked".to_string())
}

fn joined<T>(
    result: thread::Result<Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    result.map_err(|_| panicked())?
}

/// Push every tick to every consumer; stops at the first failed tick or send
fn produce(
    run: PipelineRun<'_>,
    plan: SidePlan,
    left_tx: Sender<SharedFrame>,
    right_tx: Sender<SharedFrame>,
    inter_tx: Sender<(SharedFrame, SharedFrame)>,
    metrics_tx: Sender<(SharedFrame, SharedFrame)>,
) -> Result<ProducerSummary, PipelineError> {
    let mut inter_tx = Some(inter_tx);
    let mut summary = ProducerSummary {
        ticks: 0,
        interleaved_skipped: false,
    };

    for tick in run {
        let tick = tick?;
        let (left, right) = plan.pick(&tick);

        if inter_tx.is_some() && left.dimensions() != right.dimensions() {
            warn!(
                "Tick {}: left {:?} and right {:?} differ in size; skipping interleaved output",
                tick.index,
                left.dimensions(),
                right.dimensions()
            );
            inter_tx = None;
            summary.interleaved_skipped = true;
        }

        let mut delivered = left_tx.send(Arc::clone(&left)).is_ok();
        delivered &= right_tx.send(Arc::clone(&right)).is_ok();
        delivered &= metrics_tx
            .send((Arc::clone(&left), Arc::clone(&right)))
            .is_ok();
        if let Some(tx) = &inter_tx {
            delivered &= tx.send((left, right)).is_ok();
        }
        if !delivered {
            warn!("Output consumer stopped at tick {}; ending run", tick.index);
            break;
        }
        summary.ticks += 1;
    }
    Ok(summary)
}

fn write_frames(
    rx: Receiver<SharedFrame>,
    mut writer: ArtifactWriter,
) -> Result<Artifact, PipelineError> {
    for frame in rx {
        writer.write(&frame)?;
    }
    writer.finish()
}

fn write_pairs(
    rx: Receiver<(SharedFrame, SharedFrame)>,
    mut writer: ArtifactWriter,
) -> Result<Artifact, PipelineError> {
    for (left, right) in rx {
        writer.write(&left)?;
        writer.write(&right)?;
    }
    writer.finish()
}
