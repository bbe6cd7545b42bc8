//! Property tests for graph scheduling

mod common;

use common::{registry, request};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use video_pipeline_core::{GraphError, ModuleSpec, PipelineError, PipelineGraph};

/// For each transform, the indices of earlier nodes it reads (0 = source)
fn dag_shape() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::sample::subsequence((0..=i).collect::<Vec<_>>(), 1..=(i + 1).min(3)))
            .collect::<Vec<_>>()
    })
}

fn node_name(index: usize) -> String {
    if index == 0 {
        "src".to_string()
    } else {
        format!("t{index}")
    }
}

fn specs_for(shape: &[Vec<usize>]) -> Vec<ModuleSpec> {
    let mut specs = vec![ModuleSpec::new("src", "video_source").param("path", "clip_64x48.yuv")];
    for (i, inputs) in shape.iter().enumerate() {
        let upstream: Vec<String> = inputs.iter().map(|&u| node_name(u)).collect();
        let upstream: Vec<&str> = upstream.iter().map(String::as_str).collect();
        specs.push(ModuleSpec::new(&node_name(i + 1), "blur").from_nodes(&upstream));
    }
    let last = node_name(shape.len());
    specs.push(ModuleSpec::new("out", "result").from_nodes(&[last.as_str()]));
    specs
}

proptest! {
    #[test]
    fn prop_order_respects_every_edge(
        shape in dag_shape(),
        seed in any::<u64>(),
    ) {
        let mut specs = specs_for(&shape);
        // Submission order must not matter
        let len = specs.len();
        specs.rotate_left((seed as usize) % len);

        let graph = PipelineGraph::build(&request(specs.clone()), &registry()).unwrap();
        let order = graph.order_ids();
        prop_assert_eq!(order.len(), specs.len());
        prop_assert_eq!(order[0], "src");

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for spec in &specs {
            for up in &spec.source {
                prop_assert!(position[up.as_str()] < position[spec.id.as_str()]);
            }
        }
    }

    #[test]
    fn prop_cycle_reports_exact_members(
        cycle_len in 1usize..6,
        tail_len in 0usize..4,
    ) {
        let ring: Vec<String> = (0..cycle_len).map(|i| format!("c{i}")).collect();
        let mut specs = vec![ModuleSpec::new("src", "video_source").param("path", "clip_64x48.yuv")];
        for i in 0..cycle_len {
            let prev = &ring[(i + cycle_len - 1) % cycle_len];
            specs.push(ModuleSpec::new(&ring[i], "blur").from_nodes(&[prev.as_str()]));
        }
        // Nodes downstream of the ring are blocked but not part of it
        let mut prev = ring[0].clone();
        for i in 0..tail_len {
            let id = format!("d{i}");
            specs.push(ModuleSpec::new(&id, "blur").from_nodes(&[prev.as_str()]));
            prev = id;
        }
        specs.push(ModuleSpec::new("ok", "blur").from_nodes(&["src"]));
        specs.push(ModuleSpec::new("out", "result").from_nodes(&["ok"]));

        let err = PipelineGraph::build(&request(specs), &registry()).unwrap_err();
        let PipelineError::Graph(errors) = err else {
            panic!("expected graph errors");
        };
        let reported: Vec<BTreeSet<String>> = errors
            .iter()
            .filter_map(|e| match e {
                GraphError::CycleDetected { nodes } => Some(nodes.iter().cloned().collect()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(reported, vec![ring.into_iter().collect::<BTreeSet<_>>()]);
    }
}
