//! AST → validated IR (§4.3).

use std::collections::HashSet;

use crate::ast::{ArrowAST, CycleAST, CycleStmt, DeclarationsAST, Line, NodeDecl as AstNodeDecl};
use crate::error::{HarmonicsError, Result};
use crate::ir::{Arrow, CycleLine, Graph, NodeDecl, NodeKind, NodeRef};

/// Convert a parsed `DeclarationsAST` into a validated `Graph`.
///
/// Invariants enforced here (§3):
/// 1. all referenced names resolve,
/// 2. names are globally unique,
/// 3. ratios resolve in declaration order,
/// 4. backward arrows target only a producer from a layer; forward
///    arrows never target a producer.
pub fn build_graph(ast: &DeclarationsAST) -> Result<Graph> {
    let mut seen = HashSet::new();
    let producers = lower_decls(&ast.producers, &mut seen)?;
    let consumers = lower_decls(&ast.consumers, &mut seen)?;
    let mut layers = lower_decls(&ast.layers, &mut seen)?;

    resolve_ratios(&producers, &consumers, &mut layers);

    let mut g = Graph::new(producers, consumers, layers, Vec::new());

    let cycle = match &ast.cycle {
        Some(c) => lower_cycle(&g, c)?,
        None => Vec::new(),
    };
    g.cycle = cycle;
    Ok(g)
}

fn lower_decls(decls: &[AstNodeDecl], seen: &mut HashSet<String>) -> Result<Vec<NodeDecl>> {
    let mut out = Vec::with_capacity(decls.len());
    for d in decls {
        if !seen.insert(d.name.node.clone()) {
            return Err(HarmonicsError::DuplicateName(d.name.node.clone()));
        }
        out.push(NodeDecl {
            name: d.name.node.clone(),
            declared_width: d.declared_width,
            ratio: d.ratio.as_ref().map(|r| crate::ir::RatioWidth {
                lhs: r.lhs,
                rhs: r.rhs,
                ref_name: r.ref_name.clone(),
            }),
            resolved_width: None,
        });
    }
    Ok(out)
}

/// Ratio widths resolve deterministically in declaration order (§3
/// invariant 3): `width = lhs/rhs * width(ref)`. Unresolved refs (the
/// referenced name has no known width yet) leave width unset — this is
/// non-fatal (§4.3).
fn resolve_ratios(producers: &[NodeDecl], consumers: &[NodeDecl], layers: &mut [NodeDecl]) {
    // A running table of resolved widths across all three namespaces,
    // filled in as each producer/consumer/layer is processed in order.
    let mut widths: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    for p in producers {
        if let Some(w) = p.declared_width {
            widths.insert(p.name.clone(), w);
        }
    }
    for c in consumers {
        if let Some(w) = c.declared_width {
            widths.insert(c.name.clone(), w);
        }
    }
    for l in layers.iter_mut() {
        let resolved = if let Some(ratio) = &l.ratio {
            widths
                .get(&ratio.ref_name)
                .map(|refw| ratio.lhs * *refw / ratio.rhs)
        } else {
            l.declared_width
        };
        l.resolved_width = resolved;
        if let Some(w) = resolved {
            widths.insert(l.name.clone(), w);
        }
    }
}

fn resolve_name(g: &Graph, name: &str) -> Result<NodeRef> {
    g.resolve(name)
        .ok_or_else(|| HarmonicsError::UnresolvedName(name.to_string()))
}

fn lower_cycle(g: &Graph, cycle: &CycleAST) -> Result<Vec<CycleLine>> {
    let mut lines = Vec::new();
    let mut prev_source: Option<NodeRef> = None;
    lower_stmts(g, &cycle.stmts, &mut prev_source, None, &mut lines)?;
    Ok(lines)
}

fn lower_stmts(
    g: &Graph,
    stmts: &[CycleStmt],
    prev_source: &mut Option<NodeRef>,
    gate: Option<(NodeRef, bool)>,
    out: &mut Vec<CycleLine>,
) -> Result<()> {
    for stmt in stmts {
        match stmt {
            CycleStmt::Line(line) => {
                let source = resolve_line_source(g, line, prev_source)?;
                *prev_source = Some(source);
                out.push(lower_line(g, line, source, gate)?);
            }
            CycleStmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ref = resolve_name(g, &cond.node)?;
                let mut then_prev = *prev_source;
                lower_stmts(g, then_branch, &mut then_prev, Some((cond_ref, true)), out)?;
                let mut else_prev = *prev_source;
                lower_stmts(g, else_branch, &mut else_prev, Some((cond_ref, false)), out)?;
            }
        }
    }
    Ok(())
}

fn resolve_line_source(g: &Graph, line: &Line, prev: &Option<NodeRef>) -> Result<NodeRef> {
    match &line.source {
        Some(spanned) => resolve_name(g, &spanned.node),
        None => prev.ok_or_else(|| {
            HarmonicsError::InvalidArrow(
                "line has no source and no preceding line to inherit from".to_string(),
            )
        }),
    }
}

fn lower_line(
    g: &Graph,
    line: &Line,
    source: NodeRef,
    gate: Option<(NodeRef, bool)>,
) -> Result<CycleLine> {
    let mut arrows = Vec::with_capacity(line.arrows.len());
    for arrow in &line.arrows {
        arrows.push(lower_arrow(g, source, arrow)?);
    }
    Ok(CycleLine {
        source,
        arrows,
        gate,
    })
}

fn lower_arrow(g: &Graph, source: NodeRef, arrow: &ArrowAST) -> Result<Arrow> {
    let target = resolve_name(g, &arrow.target.node)?;

    if arrow.backward {
        // §3 invariant 4: backward arrows may target only a Producer
        // (label) from a Layer source.
        if source.kind != NodeKind::Layer || target.kind != NodeKind::Producer {
            return Err(HarmonicsError::InvalidArrow(format!(
                "backward arrow must run from a layer to a producer label, got {:?} -> {:?}",
                source.kind, target.kind
            )));
        }
        // Open question (§9): a backward arrow without a loss name is
        // illegal (resolved here as "illegal", per the spec's own note).
        if arrow.function.is_none() {
            return Err(HarmonicsError::InvalidArrow(
                "backward arrow requires a loss function name".to_string(),
            ));
        }
    } else if target.kind == NodeKind::Producer {
        // Forward arrows connect any kind to any kind except Producer targets.
        return Err(HarmonicsError::InvalidArrow(format!(
            "forward arrow may not target a producer ('{}')",
            g.node_name(target)
        )));
    }

    Ok(Arrow {
        target,
        backward: arrow.backward,
        function: arrow.function.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lexer::Lexer;
    use crate::syntax::parser::Parser;

    fn build(src: &str) -> Result<Graph> {
        let (tokens, diags) = Lexer::new(src).tokenize();
        assert!(diags.is_empty(), "{:?}", diags);
        let ast = Parser::new(tokens).parse_declarations().expect("parse");
        build_graph(&ast)
    }

    #[test]
    fn s1_dsl_round_trip_node_counts() {
        let g = build("producer p {4}; consumer c {2}; layer l; cycle { p -> l; l -> c; }").unwrap();
        assert_eq!(g.producers.len(), 1);
        assert_eq!(g.consumers.len(), 1);
        assert_eq!(g.layers.len(), 1);
        assert_eq!(g.cycle.len(), 2);
    }

    #[test]
    fn s2_ratio_propagation() {
        let g = build("producer a {8}; layer b 1/2 a; layer c 1/2 b;").unwrap();
        assert_eq!(g.layers[0].width(), Some(4));
        assert_eq!(g.layers[1].width(), Some(2));
    }

    #[test]
    fn unresolved_ratio_ref_leaves_width_unset() {
        let g = build("producer a; layer b 1/2 a;").unwrap();
        assert_eq!(g.layers[0].width(), None);
    }

    #[test]
    fn duplicate_name_fails() {
        let err = build("producer a; consumer a;").unwrap_err();
        assert_eq!(err, HarmonicsError::DuplicateName("a".to_string()));
    }

    #[test]
    fn unresolved_cycle_name_fails() {
        let err = build("producer a; layer l; cycle { a -> missing; }").unwrap_err();
        assert_eq!(err, HarmonicsError::UnresolvedName("missing".to_string()));
    }

    #[test]
    fn branching_continuation_shares_source() {
        let g = build("producer p; layer a; layer b; cycle { p -> a; -> b; }").unwrap();
        assert_eq!(g.cycle.len(), 2);
        assert_eq!(g.cycle[0].source, g.cycle[1].source);
    }

    #[test]
    fn backward_arrow_requires_layer_to_producer() {
        let err =
            build("producer a; consumer b; layer l; cycle { a -> l; l <-(loss)- b; }").unwrap_err();
        assert!(matches!(err, HarmonicsError::InvalidArrow(_)));
    }

    #[test]
    fn backward_arrow_to_producer_label_is_legal() {
        let g = build("producer a; producer lbl; layer l; cycle { a -> l; l <-(loss)- lbl; }")
            .unwrap();
        assert!(g.has_training_taps());
    }

    #[test]
    fn backward_arrow_without_function_is_illegal() {
        let err =
            build("producer a; producer lbl; layer l; cycle { a -> l; l <- lbl; }").unwrap_err();
        assert!(matches!(err, HarmonicsError::InvalidArrow(_)));
    }

    #[test]
    fn forward_arrow_to_producer_is_illegal() {
        let err = build("producer a; producer b; layer l; cycle { l -> b; }").unwrap_err();
        assert!(matches!(err, HarmonicsError::InvalidArrow(_)));
    }
}
