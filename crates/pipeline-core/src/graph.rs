//! Pipeline graph validation and topological scheduling
//!
//! A request is turned into a [`PipelineGraph`] in two phases, both before any
//! frame is read:
//! 1. Structure: ids, module classes, references, acyclicity (Kahn's algorithm)
//!    and the source/sink rules. All structural problems are reported together.
//! 2. Parameters: every node's parameters are bound against its descriptor and
//!    all binding problems are reported together.

use crate::descriptor::Role;
use crate::error::{GraphError, ParameterError, PipelineError};
use crate::module::{ModuleImpl, RegisteredModule};
use crate::params::{bind, BoundParams};
use crate::registry::ModuleRegistry;
use crate::request::PipelineRequest;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A validated node; its slot is its position in topological order
#[derive(Debug, Clone)]
pub struct PipelineNode {
    id: String,
    slot: usize,
    module: Arc<RegisteredModule>,
    upstream: Vec<usize>,
    params: BoundParams,
    output_formats: Vec<BTreeMap<String, String>>,
}

impl PipelineNode {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub fn module(&self) -> &RegisteredModule {
        &self.module
    }

    /// Upstream slots in declaration order
    #[must_use]
    pub fn upstream(&self) -> &[usize] {
        &self.upstream
    }

    #[must_use]
    pub fn params(&self) -> &BoundParams {
        &self.params
    }

    /// Output formats with `param:` references resolved
    #[must_use]
    pub fn output_formats(&self) -> &[BTreeMap<String, String>] {
        &self.output_formats
    }
}

/// Validated, topologically ordered pipeline
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    nodes: Vec<PipelineNode>,
    dependents: Vec<Vec<usize>>,
    source: usize,
    sinks: Vec<usize>,
    frame_steps: Vec<usize>,
    resource_steps: Vec<usize>,
}

impl PipelineGraph {
    /// Validate a request against the registry and compute the schedule
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Graph`] with every structural problem, or, for a
    /// structurally sound graph, [`PipelineError::Parameters`] with every
    /// parameter problem.
    pub fn build(
        request: &PipelineRequest,
        registry: &ModuleRegistry,
    ) -> Result<Self, PipelineError> {
        let specs = &request.modules;
        if specs.is_empty() {
            return Err(reject(vec![GraphError::EmptyPipeline]));
        }
        let n = specs.len();
        let mut errors = Vec::new();

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, spec) in specs.iter().enumerate() {
            match index.entry(spec.id.as_str()) {
                Entry::Occupied(_) => errors.push(GraphError::DuplicateNodeId {
                    node: spec.id.clone(),
                }),
                Entry::Vacant(slot) => {
                    slot.insert(i);
                }
            }
        }

        let mut modules: Vec<Option<Arc<RegisteredModule>>> = Vec::with_capacity(n);
        for spec in specs {
            match registry.resolve(&spec.module_class) {
                Ok(module) => modules.push(Some(module)),
                Err(_) => {
                    errors.push(GraphError::UnknownModule {
                        node: spec.id.clone(),
                        module_class: spec.module_class.clone(),
                    });
                    modules.push(None);
                }
            }
        }

        let mut upstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, spec) in specs.iter().enumerate() {
            for up in &spec.source {
                match index.get(up.as_str()) {
                    Some(&u) => {
                        upstream[i].push(u);
                        dependents[u].push(i);
                    }
                    None => errors.push(GraphError::DanglingReference {
                        node: spec.id.clone(),
                        missing: up.clone(),
                    }),
                }
            }
        }

        let role = |i: usize| modules[i].as_ref().map(|m| m.descriptor().role());
        let is_resource = |i: usize| modules[i].as_ref().is_some_and(|m| m.is_resource_step());

        let order = topological_order(&upstream, &dependents, |i| role(i) == Some(Role::Source));
        if order.len() < n {
            let on_cycle = cycle_members(&upstream, &dependents, &order);
            errors.push(GraphError::CycleDetected {
                nodes: on_cycle.iter().map(|&i| specs[i].id.clone()).collect(),
            });
        }

        let sources: Vec<usize> = (0..n).filter(|&i| role(i) == Some(Role::Source)).collect();
        match sources.len() {
            0 => errors.push(GraphError::MissingSource),
            1 => {}
            _ => errors.push(GraphError::MultipleSources {
                nodes: sources.iter().map(|&i| specs[i].id.clone()).collect(),
            }),
        }

        let sinks: Vec<usize> = (0..n).filter(|&i| role(i) == Some(Role::Sink)).collect();
        if sinks.is_empty() {
            errors.push(GraphError::NoSink);
        } else if sinks.len() > 2 {
            errors.push(GraphError::TooManySinks {
                nodes: sinks.iter().map(|&i| specs[i].id.clone()).collect(),
            });
        }

        for (i, spec) in specs.iter().enumerate() {
            let Some(node_role) = role(i) else {
                continue;
            };
            match node_role {
                Role::Source => {
                    if !spec.source.is_empty() {
                        errors.push(GraphError::SourceHasUpstream {
                            node: spec.id.clone(),
                        });
                    }
                }
                Role::Transform | Role::Sink if spec.source.is_empty() => {
                    errors.push(GraphError::MissingUpstream {
                        node: spec.id.clone(),
                    });
                }
                Role::Sink => {
                    if spec.source.len() != 1 {
                        errors.push(GraphError::SinkUpstreamCount {
                            node: spec.id.clone(),
                            count: spec.source.len(),
                        });
                    }
                    if upstream[i].iter().any(|&u| role(u) == Some(Role::Source)) {
                        errors.push(GraphError::SinkReadsSource {
                            node: spec.id.clone(),
                        });
                    }
                }
                Role::Transform if is_resource(i) => {
                    if spec.source.len() != 1 {
                        errors.push(GraphError::ResourceUpstreamCount {
                            node: spec.id.clone(),
                            count: spec.source.len(),
                        });
                    }
                    for &u in &upstream[i] {
                        if role(u) != Some(Role::Source) && !is_resource(u) {
                            errors.push(GraphError::ResourceAfterFrameStep {
                                node: spec.id.clone(),
                                upstream: specs[u].id.clone(),
                            });
                        }
                    }
                }
                Role::Transform => {}
            }
            for &u in &upstream[i] {
                if role(u) == Some(Role::Sink) {
                    errors.push(GraphError::SinkHasDependents {
                        node: specs[u].id.clone(),
                        dependent: spec.id.clone(),
                    });
                }
            }
        }

        if !errors.is_empty() {
            return Err(reject(errors));
        }

        // Structure is sound: every module resolved and the order is complete
        let modules: Vec<Arc<RegisteredModule>> = modules.into_iter().flatten().collect();

        let mut param_errors: Vec<ParameterError> = Vec::new();
        let mut bound: Vec<BoundParams> = vec![BoundParams::default(); n];
        for &i in &order {
            let spec = &specs[i];
            match bind(&spec.id, modules[i].descriptor(), &spec.parameter_pairs()) {
                Ok(params) => bound[i] = params,
                Err(errs) => param_errors.extend(errs),
            }
        }
        if !param_errors.is_empty() {
            warn!(
                "Rejected pipeline parameters ({} problems)",
                param_errors.len()
            );
            return Err(PipelineError::Parameters(param_errors));
        }

        let mut slot_of = vec![0usize; n];
        for (slot, &i) in order.iter().enumerate() {
            slot_of[i] = slot;
        }

        let mut nodes = Vec::with_capacity(n);
        for (slot, &i) in order.iter().enumerate() {
            let module = Arc::clone(&modules[i]);
            let params = std::mem::take(&mut bound[i]);
            let output_formats = module
                .descriptor()
                .output_formats()
                .iter()
                .map(|f| f.resolve(&params))
                .collect();
            nodes.push(PipelineNode {
                id: specs[i].id.clone(),
                slot,
                upstream: upstream[i].iter().map(|&u| slot_of[u]).collect(),
                module,
                params,
                output_formats,
            });
        }

        let dependents: Vec<Vec<usize>> = order
            .iter()
            .map(|&i| dependents[i].iter().map(|&d| slot_of[d]).collect())
            .collect();
        let frame_steps: Vec<usize> = nodes
            .iter()
            .filter(|n| matches!(n.module.implementation(), ModuleImpl::Frame(_)))
            .map(|n| n.slot)
            .collect();
        let resource_steps: Vec<usize> = nodes
            .iter()
            .filter(|n| n.module.is_resource_step())
            .map(|n| n.slot)
            .collect();

        let graph = Self {
            source: slot_of[sources[0]],
            sinks: sinks.iter().map(|&i| slot_of[i]).collect(),
            nodes,
            dependents,
            frame_steps,
            resource_steps,
        };
        info!(
            "Validated pipeline: {} nodes, {} result nodes, order [{}]",
            graph.nodes.len(),
            graph.sinks.len(),
            graph.order_ids().join(" -> ")
        );
        Ok(graph)
    }

    /// Nodes in topological order
    #[must_use]
    pub fn nodes(&self) -> &[PipelineNode] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, slot: usize) -> &PipelineNode {
        &self.nodes[slot]
    }

    #[must_use]
    pub fn node_by_id(&self, id: &str) -> Option<&PipelineNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[must_use]
    pub fn dependents(&self, slot: usize) -> &[usize] {
        &self.dependents[slot]
    }

    #[must_use]
    pub fn source(&self) -> &PipelineNode {
        &self.nodes[self.source]
    }

    /// Result nodes in submission order
    #[must_use]
    pub fn sinks(&self) -> Vec<&PipelineNode> {
        self.sinks.iter().map(|&s| &self.nodes[s]).collect()
    }

    /// Per-frame transforms in execution order
    #[must_use]
    pub fn frame_steps(&self) -> &[usize] {
        &self.frame_steps
    }

    /// Whole-resource transforms in execution order
    #[must_use]
    pub fn resource_steps(&self) -> &[usize] {
        &self.resource_steps
    }

    #[must_use]
    pub fn order_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}

fn reject(errors: Vec<GraphError>) -> PipelineError {
    for e in &errors {
        debug!("Graph rejection: {}", e);
    }
    warn!("Rejected pipeline graph ({} problems)", errors.len());
    PipelineError::Graph(errors)
}

/// Kahn's algorithm; nodes matching `first` are dequeued ahead of other roots
fn topological_order(
    upstream: &[Vec<usize>],
    dependents: &[Vec<usize>],
    first: impl Fn(usize) -> bool,
) -> Vec<usize> {
    let n = upstream.len();
    let mut indegree: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let (roots, rest): (Vec<usize>, Vec<usize>) =
        (0..n).filter(|&i| indegree[i] == 0).partition(|&i| first(i));
    let mut queue: VecDeque<usize> = roots.into_iter().chain(rest).collect();

    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                queue.push_back(d);
            }
        }
    }
    order
}

/// Nodes left over by Kahn's algorithm that lie on a cycle
///
/// Leftovers also include nodes that merely sit downstream of a cycle; those
/// cannot reach themselves and are excluded.
fn cycle_members(upstream: &[Vec<usize>], dependents: &[Vec<usize>], order: &[usize]) -> Vec<usize> {
    let n = upstream.len();
    let mut leftover = vec![true; n];
    for &i in order {
        leftover[i] = false;
    }

    let reaches_itself = |start: usize| {
        let mut seen = vec![false; n];
        let mut stack: Vec<usize> = dependents[start].clone();
        while let Some(v) = stack.pop() {
            if v == start {
                return true;
            }
            if !leftover[v] || seen[v] {
                continue;
            }
            seen[v] = true;
            stack.extend(&dependents[v]);
        }
        false
    };

    (0..n).filter(|&i| leftover[i] && reaches_itself(i)).collect()
}
