//! Streaming execution of a validated pipeline graph
//!
//! A [`PipelineRun`] opens the source, runs any whole-resource steps up front,
//! then yields one [`TickOutput`] per source frame. Frames are pulled lazily:
//! nothing is read until the run is iterated, and dropping the run releases the
//! source, decoded step outputs and the run's scratch directory.

use crate::cache::FrameCache;
use crate::context::ModuleContext;
use crate::error::{ModuleError, PipelineError};
use crate::graph::PipelineGraph;
use crate::module::{FrameStream, ModuleImpl};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, error, info};
use video_pipeline_codec::{FrameGeometry, PlanarReader};
use video_pipeline_common::{Frame, SharedFrame, VideoResource};

/// Frames produced by one tick
#[derive(Debug, Clone)]
pub struct TickOutput {
    /// Zero-based tick number
    pub index: u64,
    /// The source frame of this tick
    pub original: SharedFrame,
    /// Frame delivered to each result node, aligned with [`PipelineGraph::sinks`]
    pub sinks: Vec<SharedFrame>,
}

/// One execution of a graph
pub struct PipelineRun<'g> {
    graph: &'g PipelineGraph,
    source: VideoResource,
    streams: Vec<(usize, FrameStream)>,
    cache: FrameCache,
    ticks: u64,
    finished: bool,
    started: Instant,
    _scratch: Option<TempDir>,
}

impl<'g> PipelineRun<'g> {
    /// Open the source and run whole-resource steps
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Resource`] if the source cannot be opened, or the
    /// error of the first failing whole-resource step.
    pub fn start(graph: &'g PipelineGraph, ctx: &ModuleContext) -> Result<Self, PipelineError> {
        let started = Instant::now();
        let source_node = graph.source();
        let ModuleImpl::Source(source_module) = source_node.module().implementation() else {
            return Err(PipelineError::Internal(format!(
                "node '{}' is not a source",
                source_node.id()
            )));
        };
        let opened = source_module
            .open(source_node.params(), ctx)
            .map_err(|e| PipelineError::from_module(source_node.id(), e))?;
        info!(
            "Starting pipeline run: source {} ({}x{} @ {} fps), {} frame steps, {} whole-resource steps",
            opened.resource.path.display(),
            opened.resource.width,
            opened.resource.height,
            opened.resource.fps,
            graph.frame_steps().len(),
            graph.resource_steps().len()
        );

        let source = opened.resource.clone();
        let mut streams: Vec<(usize, FrameStream)> = vec![(source_node.slot(), opened.frames)];
        let mut resources: HashMap<usize, VideoResource> = HashMap::new();
        resources.insert(source_node.slot(), source.clone());

        let scratch = if graph.resource_steps().is_empty() {
            None
        } else {
            Some(
                tempfile::Builder::new()
                    .prefix("pipeline-run-")
                    .tempdir()?,
            )
        };

        for &slot in graph.resource_steps() {
            let node = graph.node(slot);
            let ModuleImpl::Resource(step) = node.module().implementation() else {
                continue;
            };
            let (Some(dir), Some(input)) = (
                scratch.as_ref(),
                node.upstream().first().and_then(|u| resources.get(u)),
            ) else {
                return Err(PipelineError::Internal(format!(
                    "no input resource for step '{}'",
                    node.id()
                )));
            };
            let output = dir
                .path()
                .join(format!("{}-{}.yuv", input.stem(), node.id()));
            let step_started = Instant::now();
            let produced = step
                .execute(node.params(), input, &output)
                .map_err(|e| PipelineError::from_module(node.id(), e))?;
            info!(
                "Whole-resource step '{}' produced {} ({}x{}) in {:?}",
                node.id(),
                produced.path.display(),
                produced.width,
                produced.height,
                step_started.elapsed()
            );

            let feeds_frames = graph
                .dependents(slot)
                .iter()
                .any(|&d| !graph.node(d).module().is_resource_step());
            if feeds_frames {
                streams.push((slot, open_stream(&produced, node.id())?));
            }
            resources.insert(slot, produced);
        }

        Ok(Self {
            graph,
            source,
            streams,
            cache: FrameCache::new(graph.nodes().len()),
            ticks: 0,
            finished: false,
            started,
            _scratch: scratch,
        })
    }

    /// Resource handle of the opened source
    #[must_use]
    pub fn source(&self) -> &VideoResource {
        &self.source
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.source.fps
    }

    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn graph(&self) -> &'g PipelineGraph {
        self.graph
    }

    fn advance(&mut self) -> Result<Option<TickOutput>, PipelineError> {
        let graph = self.graph;
        self.cache.reset();

        for (slot, stream) in &mut self.streams {
            match stream.next() {
                Some(Ok(frame)) => self.cache.put(*slot, Arc::new(frame)),
                Some(Err(e)) => return Err(PipelineError::from_module(graph.node(*slot).id(), e)),
                None => return Ok(None),
            }
        }

        for &slot in graph.frame_steps() {
            let node = graph.node(slot);
            let ModuleImpl::Frame(step) = node.module().implementation() else {
                continue;
            };
            let output = {
                let inputs: Vec<&Frame> = node
                    .upstream()
                    .iter()
                    .map(|&u| self.cache.get(u).map(|f| &**f))
                    .collect::<Option<_>>()
                    .ok_or_else(|| missing_input(node.id()))?;
                step.process_frame(&inputs, node.params())
                    .map_err(|e| PipelineError::from_module(node.id(), e))?
            };
            self.cache.put(slot, Arc::new(output));
        }

        let sinks = graph
            .sinks()
            .iter()
            .map(|sink| {
                sink.upstream()
                    .first()
                    .and_then(|&u| self.cache.get(u))
                    .cloned()
                    .ok_or_else(|| missing_input(sink.id()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let original = self
            .cache
            .get(graph.source().slot())
            .cloned()
            .ok_or_else(|| missing_input(graph.source().id()))?;

        let index = self.ticks;
        self.ticks += 1;
        debug!("Tick {} complete ({} slots filled)", index, self.cache.filled());
        Ok(Some(TickOutput {
            index,
            original,
            sinks,
        }))
    }
}

impl Iterator for PipelineRun<'_> {
    type Item = Result<TickOutput, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(tick)) => Some(Ok(tick)),
            Ok(None) => {
                self.finished = true;
                info!(
                    "Pipeline run exhausted after {} ticks in {:?}",
                    self.ticks,
                    self.started.elapsed()
                );
                None
            }
            Err(e) => {
                self.finished = true;
                error!("Pipeline run failed at tick {}: {}", self.ticks, e);
                Some(Err(e))
            }
        }
    }
}

impl Drop for PipelineRun<'_> {
    fn drop(&mut self) {
        debug!(
            "Releasing pipeline run ({} ticks, source {})",
            self.ticks,
            self.source.path.display()
        );
    }
}

fn missing_input(node: &str) -> PipelineError {
    PipelineError::Internal(format!("input of node '{node}' was not computed this tick"))
}

fn open_stream(resource: &VideoResource, node: &str) -> Result<FrameStream, PipelineError> {
    let geometry = FrameGeometry::new(resource.width, resource.height)
        .map_err(|e| PipelineError::from_module(node, e.into()))?;
    let reader = PlanarReader::open(&resource.path, geometry).map_err(|e| {
        PipelineError::Resource(format!("{node}: cannot open {}: {e}", resource.path.display()))
    })?;
    Ok(Box::new(reader.map(|r| r.map_err(ModuleError::from))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ModuleDescriptor, ParameterDefinition, Role};
    use crate::module::{FrameModule, RegisteredModule, SinkModule, SourceModule, SourceStream};
    use crate::params::BoundParams;
    use crate::registry::ModuleRegistry;
    use crate::request::{ModuleSpec, PipelineRequest};
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Yields `frames` solid frames whose red channel is the frame index
    struct CountingSource {
        opened: Arc<AtomicUsize>,
    }

    impl SourceModule for CountingSource {
        fn open(&self, params: &BoundParams, _: &ModuleContext) -> Result<SourceStream, ModuleError> {
            let frames = params.get_int("frames").unwrap_or(3) as u8;
            if frames == 0 {
                return Err(ModuleError::Resource("empty.yuv not found".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(SourceStream {
                resource: VideoResource::new("counting_8x8.yuv", 8, 8, 30.0),
                frames: Box::new(
                    (0..frames).map(|i| Ok::<_, ModuleError>(Frame::from_pixel(8, 8, Rgb([i, 0, 0])))),
                ),
            })
        }
    }

    /// Adds `amount` to the green channel and counts invocations
    struct AddGreen {
        calls: Arc<AtomicUsize>,
    }

    impl FrameModule for AddGreen {
        fn process_frame(&self, inputs: &[&Frame], params: &BoundParams) -> Result<Frame, ModuleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let amount = params.get_int("amount").unwrap_or(1) as u8;
            let fail_at = params.get_int("fail_at");
            let mut out = inputs[0].clone();
            if fail_at == Some(i64::from(out.get_pixel(0, 0)[0])) {
                return Err(ModuleError::ExecutionFailed("boom".into()));
            }
            for px in out.pixels_mut() {
                px[1] = px[1].saturating_add(amount);
            }
            Ok(out)
        }
    }

    struct Out;
    impl SinkModule for Out {}

    struct Fixture {
        registry: ModuleRegistry,
        calls: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let registry = ModuleRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(
            RegisteredModule::new(
                ModuleDescriptor::builder("count", Role::Source)
                    .parameter(ParameterDefinition::int("frames"))
                    .build()
                    .unwrap(),
                ModuleImpl::Source(Arc::new(CountingSource {
                    opened: Arc::new(AtomicUsize::new(0)),
                })),
            )
            .unwrap(),
        );
        registry.register(
            RegisteredModule::new(
                ModuleDescriptor::builder("green", Role::Transform)
                    .parameter(ParameterDefinition::int("amount"))
                    .parameter(ParameterDefinition::int("fail_at"))
                    .build()
                    .unwrap(),
                ModuleImpl::Frame(Arc::new(AddGreen {
                    calls: Arc::clone(&calls),
                })),
            )
            .unwrap(),
        );
        registry.register(
            RegisteredModule::new(
                ModuleDescriptor::builder("out", Role::Sink).build().unwrap(),
                ModuleImpl::Sink(Arc::new(Out)),
            )
            .unwrap(),
        );
        Fixture { registry, calls }
    }

    #[test]
    fn test_shared_upstream_computed_once_per_tick() {
        let fx = fixture();
        let request = PipelineRequest {
            modules: vec![
                ModuleSpec::new("s", "count").param("frames", 4),
                ModuleSpec::new("g", "green").from_nodes(&["s"]).param("amount", 10),
                ModuleSpec::new("a", "out").from_nodes(&["g"]),
                ModuleSpec::new("b", "out").from_nodes(&["g"]),
            ],
        };
        let graph = PipelineGraph::build(&request, &fx.registry).unwrap();
        let ticks: Vec<TickOutput> = PipelineRun::start(&graph, &ModuleContext::default())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(ticks.len(), 4);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 4);
        for (i, tick) in ticks.iter().enumerate() {
            assert_eq!(tick.index, i as u64);
            assert_eq!(tick.original.get_pixel(0, 0)[0], i as u8);
            assert!(Arc::ptr_eq(&tick.sinks[0], &tick.sinks[1]));
            assert_eq!(tick.sinks[0].get_pixel(0, 0).0, [i as u8, 10, 0]);
        }
    }

    #[test]
    fn test_chain_applies_in_order() {
        let fx = fixture();
        let request = PipelineRequest {
            modules: vec![
                ModuleSpec::new("s", "count").param("frames", 1),
                ModuleSpec::new("g1", "green").from_nodes(&["s"]).param("amount", 1),
                ModuleSpec::new("g2", "green").from_nodes(&["g1"]).param("amount", 2),
                ModuleSpec::new("o", "out").from_nodes(&["g2"]),
            ],
        };
        let graph = PipelineGraph::build(&request, &fx.registry).unwrap();
        let mut run = PipelineRun::start(&graph, &ModuleContext::default()).unwrap();
        let tick = run.next().unwrap().unwrap();
        assert_eq!(tick.sinks[0].get_pixel(3, 3).0, [0, 3, 0]);
        assert!(run.next().is_none());
        assert!(run.next().is_none());
        assert_eq!(run.ticks(), 1);
    }

    #[test]
    fn test_failure_stops_at_tick() {
        let fx = fixture();
        let request = PipelineRequest {
            modules: vec![
                ModuleSpec::new("s", "count").param("frames", 5),
                ModuleSpec::new("g", "green").from_nodes(&["s"]).param("fail_at", 2),
                ModuleSpec::new("o", "out").from_nodes(&["g"]),
            ],
        };
        let graph = PipelineGraph::build(&request, &fx.registry).unwrap();
        let results: Vec<_> = PipelineRun::start(&graph, &ModuleContext::default())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(
            &results[2],
            Err(PipelineError::Module { node, .. }) if node == "g"
        ));
    }

    #[test]
    fn test_unopenable_source_is_resource_error() {
        let fx = fixture();
        let request = PipelineRequest {
            modules: vec![
                ModuleSpec::new("s", "count").param("frames", 0),
                ModuleSpec::new("g", "green").from_nodes(&["s"]),
                ModuleSpec::new("o", "out").from_nodes(&["g"]),
            ],
        };
        let graph = PipelineGraph::build(&request, &fx.registry).unwrap();
        let err = PipelineRun::start(&graph, &ModuleContext::default())
            .err()
            .unwrap();
        assert_eq!(err.category(), "resource");
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lazy_pull_stops_when_dropped() {
        let fx = fixture();
        let request = PipelineRequest {
            modules: vec![
                ModuleSpec::new("s", "count").param("frames", 50),
                ModuleSpec::new("g", "green").from_nodes(&["s"]),
                ModuleSpec::new("o", "out").from_nodes(&["g"]),
            ],
        };
        let graph = PipelineGraph::build(&request, &fx.registry).unwrap();
        let run = PipelineRun::start(&graph, &ModuleContext::default()).unwrap();
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        let taken = run.take(2).count();
        assert_eq!(taken, 2);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
    }
}
