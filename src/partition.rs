//! Graph partitioning for distributed execution (§4.8).
//!
//! `partition_by_layer` splits a graph's layers at index `k` into a
//! "first half" (layers `0..k`) and a "second half" (layers `k..`).
//! Producers and consumers are not split — a distributed deployment
//! still has every data source/sink reachable from wherever it's needed,
//! so both halves carry a full copy of the producer/consumer
//! declarations. Only cycle lines that actually cross the k-boundary get
//! rewritten: the crossing arrow is replaced by a synthetic boundary
//! consumer in the half it leaves and a synthetic boundary producer in
//! the half it enters, named `__boundary_<k>`.

use crate::device::DeviceKind;
use crate::ir::{Arrow, CycleLine, Graph, NodeDecl, NodeKind, NodeRef};
use crate::runtime::DeploymentDescriptor;

pub struct Partitioned {
    pub first: Graph,
    pub second: Graph,
    /// Name of the synthetic boundary consumer/producer pair, shared by
    /// both halves so a `Transport` can wire them together (§4.9).
    pub boundary_name: String,
}

/// Partition `g`'s layers at index `k` (layers `0..k` stay in `first`,
/// `k..` move to `second`). Producers/consumers are duplicated into both
/// halves; `k` must be in `1..g.layers.len()` for the split to be
/// meaningful (both halves nonempty).
pub fn partition_by_layer(g: &Graph, k: usize) -> Partitioned {
    partition_by_layer_named(g, k, format!("__boundary_{}", k))
}

/// N-way generalization of `partition_by_layer` driven by
/// `descriptor.partitions` (§4.8): one sub-graph per entry. Layers are
/// distributed as contiguous ranges, split evenly (difference at most 1)
/// when every partition's backend is the same, or proportional to each
/// backend's advertised bandwidth (GPU=3, CPU=1, FPGA/WASM/quantum=1)
/// otherwise. Returns the sub-graphs together with the boundary name
/// shared by each adjacent pair, so a scheduler can wire `N-1` transports.
pub struct AutoPartitioned {
    pub graphs: Vec<Graph>,
    /// `boundary_names[i]` links `graphs[i]` (consumer side) to
    /// `graphs[i + 1]` (producer side).
    pub boundary_names: Vec<String>,
}

pub fn auto_partition(g: &Graph, descriptor: &DeploymentDescriptor) -> AutoPartitioned {
    let n = descriptor.partitions.len().max(1);
    if n <= 1 {
        return AutoPartitioned {
            graphs: vec![g.clone()],
            boundary_names: Vec::new(),
        };
    }

    let counts = bucket_counts(g.layers.len(), &descriptor.partitions);

    let mut graphs = Vec::with_capacity(n);
    let mut boundary_names = Vec::with_capacity(n - 1);
    let mut remaining = g.clone();
    let mut offset = 0;
    for count in &counts[..n - 1] {
        offset += count;
        let boundary_name = format!("__boundary_auto_{}", offset);
        let Partitioned { first, second, .. } = partition_by_layer_named(&remaining, *count, boundary_name.clone());
        graphs.push(first);
        boundary_names.push(boundary_name);
        remaining = second;
    }
    graphs.push(remaining);

    AutoPartitioned {
        graphs,
        boundary_names,
    }
}

/// Bandwidth weight used to proportionally size a partition's layer range
/// (§4.8). GPUs get three times a CPU's share, FPGAs two times; WASM and
/// quantum backends (no advertised bandwidth in the spec) default to CPU's
/// weight.
fn bandwidth_weight(kind: DeviceKind) -> u32 {
    match kind {
        DeviceKind::Gpu => 3,
        DeviceKind::Fpga => 2,
        DeviceKind::Cpu | DeviceKind::Wasm | DeviceKind::Quantum => 1,
    }
}

/// Split `total_layers` across `backends.len()` contiguous buckets. Even
/// split (difference at most 1) when every backend carries the same
/// weight; otherwise proportional to `bandwidth_weight`, using the largest
/// remainder method so the counts still sum to `total_layers` exactly.
fn bucket_counts(total_layers: usize, backends: &[DeviceKind]) -> Vec<usize> {
    let n = backends.len();
    let weights: Vec<u32> = backends.iter().copied().map(bandwidth_weight).collect();

    if weights.iter().all(|w| *w == weights[0]) {
        let base = total_layers / n;
        let rem = total_layers % n;
        return (0..n).map(|i| base + usize::from(i < rem)).collect();
    }

    let total_weight: u32 = weights.iter().sum();
    let mut counts = vec![0usize; n];
    let mut remainders: Vec<(f64, usize)> = Vec::with_capacity(n);
    let mut allocated = 0usize;
    for (i, weight) in weights.iter().enumerate() {
        let exact = total_layers as f64 * *weight as f64 / total_weight as f64;
        counts[i] = exact.floor() as usize;
        allocated += counts[i];
        remainders.push((exact - counts[i] as f64, i));
    }
    remainders.sort_by(|a, b| b.0.partial_cmp(&a.0).expect("fractional remainder is never NaN"));
    let mut leftover = total_layers - allocated;
    for (_, i) in remainders {
        if leftover == 0 {
            break;
        }
        counts[i] += 1;
        leftover -= 1;
    }
    counts
}

fn partition_by_layer_named(g: &Graph, k: usize, boundary_name: String) -> Partitioned {
    let first_layers: Vec<NodeDecl> = g.layers[..k].to_vec();
    let second_layers: Vec<NodeDecl> = g.layers[k..].to_vec();

    let in_first_half = |node: NodeRef| -> bool {
        match node.kind {
            NodeKind::Layer => node.index < k,
            NodeKind::Producer | NodeKind::Consumer => true,
        }
    };

    // Index of a layer node after it's been moved into `second`'s own
    // layer namespace.
    let reindex_in_second = |index: usize| index - k;

    let mut first_cycle = Vec::new();
    let mut second_cycle = Vec::new();

    // Producer/consumer/layer counts are identical across both halves
    // for producers/consumers (duplicated verbatim), so their NodeRefs
    // need no translation. Layer refs pointing into the second half need
    // reindexing when copied into `second`'s own layer list, and vice
    // versa they simply don't appear in `first`.
    for line in &g.cycle {
        let source_in_first = in_first_half(line.source);

        if source_in_first {
            let mut kept_arrows = Vec::new();
            for arrow in &line.arrows {
                if in_first_half(arrow.target) {
                    kept_arrows.push(arrow.clone());
                } else {
                    // Crosses the boundary: replace with a hop onto the
                    // boundary consumer, created on first use.
                    kept_arrows.push(Arrow {
                        target: boundary_consumer_ref(&g.consumers, &boundary_name),
                        backward: arrow.backward,
                        function: arrow.function.clone(),
                    });
                }
            }
            if !kept_arrows.is_empty() {
                first_cycle.push(CycleLine {
                    source: line.source,
                    arrows: kept_arrows,
                    gate: line.gate,
                });
            }
        } else {
            // Source lives in the second half: translate its layer index.
            let translated_source = NodeRef::layer(reindex_in_second(line.source.index));
            let mut kept_arrows = Vec::new();
            for arrow in &line.arrows {
                let target = if arrow.target.kind == NodeKind::Layer {
                    NodeRef::layer(reindex_in_second(arrow.target.index))
                } else {
                    arrow.target
                };
                kept_arrows.push(Arrow {
                    target,
                    backward: arrow.backward,
                    function: arrow.function.clone(),
                });
            }
            second_cycle.push(CycleLine {
                source: translated_source,
                arrows: kept_arrows,
                gate: line.gate,
            });
        }
    }

    // Any line whose source is in the second half but whose boundary
    // producer should feed it is synthesized here: the second half reads
    // from `__boundary_<k>` as an ordinary producer.
    let mut second_producers = g.producers.clone();
    let boundary_idx = second_producers.len();
    second_producers.push(NodeDecl {
        name: boundary_name.clone(),
        declared_width: None,
        ratio: None,
        resolved_width: None,
    });
    // Rewrite any second-half line sourced from a layer that used to
    // receive a cross-boundary arrow in `g` — those arrivals are now
    // modeled as the boundary producer feeding the first second-half
    // layer directly. We detect this by checking which second-half
    // layers were arrow targets of first-half lines in the original graph.
    let mut fed_by_boundary = Vec::new();
    for line in &g.cycle {
        if in_first_half(line.source) {
            for arrow in &line.arrows {
                if !in_first_half(arrow.target) {
                    fed_by_boundary.push(reindex_in_second(arrow.target.index));
                }
            }
        }
    }
    // Boundary-feed lines run before the rest of the second half's cycle
    // so a layer fed across the boundary has its state populated before
    // anything downstream reads it in the same step.
    let mut boundary_feed_lines: Vec<CycleLine> = fed_by_boundary
        .into_iter()
        .map(|layer_idx| CycleLine {
            source: NodeRef::producer(boundary_idx),
            arrows: vec![Arrow {
                target: NodeRef::layer(layer_idx),
                backward: false,
                function: None,
            }],
            gate: None,
        })
        .collect();
    boundary_feed_lines.append(&mut second_cycle);
    let second_cycle = boundary_feed_lines;

    let mut first_consumers = g.consumers.clone();
    first_consumers.push(NodeDecl {
        name: boundary_name.clone(),
        declared_width: None,
        ratio: None,
        resolved_width: None,
    });

    let first = Graph::new(g.producers.clone(), first_consumers, first_layers, first_cycle);
    let second = Graph::new(second_producers, g.consumers.clone(), second_layers, second_cycle);

    Partitioned {
        first,
        second,
        boundary_name,
    }
}

fn boundary_consumer_ref(consumers: &[NodeDecl], boundary_name: &str) -> NodeRef {
    // The boundary consumer is always appended after the real consumers
    // (see `partition_by_layer`), so its index is `consumers.len()`
    // regardless of `boundary_name` — kept as a parameter for clarity at
    // call sites.
    let _ = boundary_name;
    NodeRef::consumer(consumers.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lexer::Lexer;
    use crate::syntax::parser::Parser;

    fn build(src: &str) -> Graph {
        let (tokens, diags) = Lexer::new(src).tokenize();
        assert!(diags.is_empty());
        let ast = Parser::new(tokens).parse_declarations().unwrap();
        crate::ir::builder::build_graph(&ast).unwrap()
    }

    #[test]
    fn producers_and_consumers_are_duplicated() {
        let g = build(
            "producer p {4}; consumer c {4}; layer a; layer b; cycle { p -> a; a -> b; b -> c; }",
        );
        let parts = partition_by_layer(&g, 1);
        assert_eq!(parts.first.producers.len(), 1);
        assert_eq!(parts.second.producers.len(), 2); // + boundary
        assert_eq!(parts.first.consumers.len(), 2); // + boundary
        assert_eq!(parts.second.consumers.len(), 1);
    }

    #[test]
    fn layers_split_at_k() {
        let g = build("producer p; layer a; layer b; layer c; cycle { p -> a; a -> b; b -> c; }");
        let parts = partition_by_layer(&g, 2);
        assert_eq!(parts.first.layers.len(), 2);
        assert_eq!(parts.second.layers.len(), 1);
    }

    #[test]
    fn non_crossing_lines_are_untouched() {
        let g = build("producer p; layer a; layer b; cycle { p -> a; a -> b; }");
        let parts = partition_by_layer(&g, 1);
        assert_eq!(parts.first.cycle.len(), 1);
        // second half gets its translated line plus the boundary feed.
        assert_eq!(parts.second.cycle.len(), 2);
    }

    #[test]
    fn auto_partition_splits_homogeneous_backends_evenly() {
        let g = build(
            "producer p; layer a; layer b; layer c; layer d; layer e; cycle { p -> a; a -> b; b -> c; c -> d; d -> e; }",
        );
        let descriptor = DeploymentDescriptor {
            partitions: vec![DeviceKind::Cpu, DeviceKind::Cpu, DeviceKind::Cpu],
            ..DeploymentDescriptor::default()
        };
        let parts = auto_partition(&g, &descriptor);
        let sizes: Vec<usize> = parts.graphs.iter().map(|g| g.layers.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 5);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
        assert_eq!(parts.boundary_names.len(), 2);
    }

    #[test]
    fn auto_partition_weights_by_bandwidth() {
        let g = build(
            "producer p; layer a; layer b; layer c; layer d; layer e; layer f; cycle { p -> a; a -> b; b -> c; c -> d; d -> e; e -> f; }",
        );
        let descriptor = DeploymentDescriptor {
            partitions: vec![DeviceKind::Gpu, DeviceKind::Cpu],
            ..DeploymentDescriptor::default()
        };
        let parts = auto_partition(&g, &descriptor);
        // weight 3:1 over 6 layers -> 4:2
        assert_eq!(parts.graphs[0].layers.len(), 4);
        assert_eq!(parts.graphs[1].layers.len(), 2);
    }

    #[test]
    fn auto_partition_with_one_partition_is_a_no_op() {
        let g = build("producer p; layer a; cycle { p -> a; }");
        let descriptor = DeploymentDescriptor::default();
        let parts = auto_partition(&g, &descriptor);
        assert_eq!(parts.graphs.len(), 1);
        assert!(parts.boundary_names.is_empty());
    }
}
