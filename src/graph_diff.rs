//! Structural graph diff/merge (§6 `graph-diff`), grounded in the
//! original `graph_diff_tool`'s diff-by-name approach: since two graphs
//! being compared usually come from independently edited source files,
//! nodes are matched by name rather than by `NodeRef` index.

use crate::ir::{Arrow, CycleLine, Graph, NodeDecl};

#[derive(Clone, Debug, PartialEq)]
pub struct FlowDiff {
    pub src: String,
    pub dst: String,
    pub backward: bool,
    pub function: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct GraphDiff {
    pub added_layers: Vec<NodeDecl>,
    pub removed_layers: Vec<String>,
    pub added_flows: Vec<FlowDiff>,
    pub removed_flows: Vec<FlowDiff>,
}

fn flows(g: &Graph) -> Vec<FlowDiff> {
    let mut out = Vec::new();
    for line in &g.cycle {
        let src = g.node_name(line.source).to_string();
        for arrow in &line.arrows {
            out.push(FlowDiff {
                src: src.clone(),
                dst: g.node_name(arrow.target).to_string(),
                backward: arrow.backward,
                function: arrow.function.clone(),
            });
        }
    }
    out
}

/// Changes required to transform `a` into `b`.
pub fn diff_graphs(a: &Graph, b: &Graph) -> GraphDiff {
    let added_layers = b
        .layers
        .iter()
        .filter(|l| !a.layers.iter().any(|al| al.name == l.name))
        .cloned()
        .collect();
    let removed_layers = a
        .layers
        .iter()
        .filter(|l| !b.layers.iter().any(|bl| bl.name == l.name))
        .map(|l| l.name.clone())
        .collect();

    let a_flows = flows(a);
    let b_flows = flows(b);
    let added_flows = b_flows.iter().filter(|f| !a_flows.contains(f)).cloned().collect();
    let removed_flows = a_flows.iter().filter(|f| !b_flows.contains(f)).cloned().collect();

    GraphDiff {
        added_layers,
        removed_layers,
        added_flows,
        removed_flows,
    }
}

/// Apply `diff` to `g` in place: remove/add layers, then remove/add
/// flows. Order matters — flows naming a layer can only resolve once
/// the layer exists.
pub fn apply_diff(g: &mut Graph, diff: &GraphDiff) {
    for name in &diff.removed_layers {
        g.remove_layer(name);
    }
    for decl in &diff.added_layers {
        g.add_layer(decl.clone());
    }

    let names = crate::ir::node_names(g);
    g.cycle.retain_mut(|line| {
        let src_name = names.get(&line.source).cloned().unwrap_or_default();
        line.arrows.retain(|arrow| {
            let dst_name = names.get(&arrow.target).cloned().unwrap_or_default();
            !diff.removed_flows.iter().any(|f| {
                f.src == src_name && f.dst == dst_name && f.backward == arrow.backward && f.function == arrow.function
            })
        });
        !line.arrows.is_empty()
    });

    for flow in &diff.added_flows {
        let Some(source) = g.resolve(&flow.src) else {
            continue;
        };
        let Some(target) = g.resolve(&flow.dst) else {
            continue;
        };
        let arrow = Arrow {
            target,
            backward: flow.backward,
            function: flow.function.clone(),
        };
        if let Some(line) = g.cycle.iter_mut().find(|l| l.source == source && l.gate.is_none()) {
            line.arrows.push(arrow);
        } else {
            g.cycle.push(CycleLine {
                source,
                arrows: vec![arrow],
                gate: None,
            });
        }
    }

    g.revision += 1;
}

/// Apply `b`'s changes relative to their common ancestor onto a clone of
/// `a`, producing a merged graph (§6 `graph-diff merge`).
pub fn merge_graphs(a: &Graph, b: &Graph) -> Graph {
    let diff = diff_graphs(a, b);
    let mut merged = a.clone();
    apply_diff(&mut merged, &diff);
    merged
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
    fn diff_detects_added_layer_and_rewired_flows() {
        let g1 = build("producer p; consumer c; cycle { p -> c; }");
        let g2 = build("producer p; consumer c; layer l; cycle { p -> l; l -> c; }");

        let diff = diff_graphs(&g1, &g2);
        assert_eq!(diff.added_layers.len(), 1);
        assert_eq!(diff.added_layers[0].name, "l");
        assert_eq!(diff.removed_flows.len(), 1);
        assert_eq!(diff.added_flows.len(), 2);
    }

    #[test]
    fn merge_produces_identical_digest() {
        let g1 = build("producer p; consumer c; cycle { p -> c; }");
        let g2 = build("producer p; consumer c; layer l; cycle { p -> l; l -> c; }");

        let merged = merge_graphs(&g1, &g2);
        assert_eq!(merged.digest(), g2.digest());
    }
}
