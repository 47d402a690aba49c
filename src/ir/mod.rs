//! The validated graph intermediate representation (§3).
//!
//! Built once by `ir::builder::build_graph` from a parsed
//! `ast::DeclarationsAST`. Immutable after construction except through
//! explicit graph-edit operations (`Graph::add_layer`, `Graph::remove_layer`)
//! which bump `revision` so attached runtimes can detect staleness.

pub mod builder;

use std::collections::HashMap;
use std::sync::Arc;

use crate::tensor::Tensor;

/// Which of the three node namespaces a reference points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Producer,
    Consumer,
    Layer,
}

/// A node identity: kind + index. Cross-references in cycle lines are
/// always this pair, never a name lookup at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub index: usize,
}

impl NodeRef {
    pub fn producer(index: usize) -> Self {
        Self {
            kind: NodeKind::Producer,
            index,
        }
    }
    pub fn consumer(index: usize) -> Self {
        Self {
            kind: NodeKind::Consumer,
            index,
        }
    }
    pub fn layer(index: usize) -> Self {
        Self {
            kind: NodeKind::Layer,
            index,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RatioWidth {
    pub lhs: u64,
    pub rhs: u64,
    pub ref_name: String,
}

/// A declared producer, consumer, or layer.
#[derive(Clone, Debug)]
pub struct NodeDecl {
    pub name: String,
    pub declared_width: Option<u64>,
    pub ratio: Option<RatioWidth>,
    /// Resolved width. For producers/consumers this equals
    /// `declared_width` once resolution runs; for layers it is the
    /// value negotiated by ratio propagation (§4.3).
    pub resolved_width: Option<u64>,
}

impl NodeDecl {
    pub fn width(&self) -> Option<u64> {
        self.resolved_width.or(self.declared_width)
    }
}

/// One arrow in the flattened IR: target + backward flag + optional
/// kernel function name. The enclosing `CycleLine`'s `source` supplies
/// the source for every arrow on that line (§3: arrows fan out from a
/// single per-line source).
#[derive(Clone, Debug)]
pub struct Arrow {
    pub target: NodeRef,
    pub backward: bool,
    pub function: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CycleLine {
    pub source: NodeRef,
    pub arrows: Vec<Arrow>,
    /// Resolves the grammar's `if cond { .. } else { .. }` blocks (§4.2
    /// sketch), which the Data Model (§3) does not otherwise model: a
    /// line nested inside a conditional carries `Some((cond, want_true))`
    /// and only fires when the last-observed tensor at `cond` has a
    /// nonzero first element equal to `want_true`. Top-level lines are
    /// always `None` (always fire), preserving §3/§4.7 for the common case.
    pub gate: Option<(NodeRef, bool)>,
}

/// An external producer binding: a trait object plus the shape it
/// advertised when bound (checked against `declared_width`).
pub trait Producer: Send + Sync {
    /// Pull exactly one sample. An empty (rank-0) tensor signals
    /// end-of-stream.
    fn next(&mut self) -> Tensor;
    /// 0 means unknown/infinite.
    fn size(&self) -> u64 {
        0
    }
}

pub trait Consumer: Send + Sync {
    fn push(&mut self, tensor: Tensor);
}

pub type ProducerBinding = Arc<std::sync::Mutex<dyn Producer>>;
pub type ConsumerBinding = Arc<std::sync::Mutex<dyn Consumer>>;

#[derive(Clone, Default)]
pub struct Graph {
    pub producers: Vec<NodeDecl>,
    pub consumers: Vec<NodeDecl>,
    pub layers: Vec<NodeDecl>,
    pub cycle: Vec<CycleLine>,
    /// Bumped on every graph-edit operation; runtimes compare against
    /// their snapshot to detect staleness and resize/resynchronise.
    pub revision: u64,
    #[allow(clippy::type_complexity)]
    producer_bindings: Vec<Option<ProducerBinding>>,
    consumer_bindings: Vec<Option<ConsumerBinding>>,
}

impl Graph {
    pub fn new(
        producers: Vec<NodeDecl>,
        consumers: Vec<NodeDecl>,
        layers: Vec<NodeDecl>,
        cycle: Vec<CycleLine>,
    ) -> Self {
        let producer_bindings = vec![None; producers.len()];
        let consumer_bindings = vec![None; consumers.len()];
        Self {
            producers,
            consumers,
            layers,
            cycle,
            revision: 0,
            producer_bindings,
            consumer_bindings,
        }
    }

    /// §3 invariant 5: a graph has training taps iff at least one
    /// backward arrow exists.
    pub fn has_training_taps(&self) -> bool {
        self.cycle
            .iter()
            .any(|line| line.arrows.iter().any(|a| a.backward))
    }

    pub fn node_name(&self, node: NodeRef) -> &str {
        let list = match node.kind {
            NodeKind::Producer => &self.producers,
            NodeKind::Consumer => &self.consumers,
            NodeKind::Layer => &self.layers,
        };
        &list[node.index].name
    }

    /// Resolve a name across all three namespaces (names are globally
    /// unique, invariant 2).
    pub fn resolve(&self, name: &str) -> Option<NodeRef> {
        for (i, p) in self.producers.iter().enumerate() {
            if p.name == name {
                return Some(NodeRef::producer(i));
            }
        }
        for (i, c) in self.consumers.iter().enumerate() {
            if c.name == name {
                return Some(NodeRef::consumer(i));
            }
        }
        for (i, l) in self.layers.iter().enumerate() {
            if l.name == name {
                return Some(NodeRef::layer(i));
            }
        }
        None
    }

    /// Bind a producer object to a declared producer by name. Fails if
    /// the advertised shape does not match the declared width (invariant 6).
    pub fn bind_producer(
        &mut self,
        name: &str,
        producer: ProducerBinding,
        advertised_width: Option<u64>,
    ) -> crate::error::Result<()> {
        let idx = self
            .producers
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| crate::error::HarmonicsError::MissingBinding(name.to_string()))?;
        let declared = self.producers[idx].width();
        if let (Some(declared), Some(advertised)) = (declared, advertised_width) {
            if declared != advertised {
                return Err(crate::error::HarmonicsError::ShapeMismatch {
                    name: name.to_string(),
                    declared: Some(declared as u32),
                    bound: vec![advertised as u32],
                });
            }
        }
        self.producer_bindings[idx] = Some(producer);
        Ok(())
    }

    pub fn bind_consumer(&mut self, name: &str, consumer: ConsumerBinding) -> crate::error::Result<()> {
        let idx = self
            .consumers
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| crate::error::HarmonicsError::MissingBinding(name.to_string()))?;
        self.consumer_bindings[idx] = Some(consumer);
        Ok(())
    }

    pub fn producer_binding(&self, idx: usize) -> Option<&ProducerBinding> {
        self.producer_bindings.get(idx).and_then(|b| b.as_ref())
    }

    pub fn consumer_binding(&self, idx: usize) -> Option<&ConsumerBinding> {
        self.consumer_bindings.get(idx).and_then(|b| b.as_ref())
    }

    /// Append a new layer to the graph (graph-edit op). Bumps `revision`.
    pub fn add_layer(&mut self, decl: NodeDecl) -> NodeRef {
        self.layers.push(decl);
        self.revision += 1;
        NodeRef::layer(self.layers.len() - 1)
    }

    /// Remove a layer by name, dropping any cycle lines that reference it
    /// as a source and any arrows that target it. Bumps `revision`.
    pub fn remove_layer(&mut self, name: &str) -> bool {
        let Some(idx) = self.layers.iter().position(|l| l.name == name) else {
            return false;
        };
        self.layers.remove(idx);
        let target = NodeRef::layer(idx);
        self.cycle.retain(|line| line.source != target);
        for line in &mut self.cycle {
            line.arrows.retain(|a| a.target != target);
        }
        // Re-index layer references above the removed one.
        let reindex = |r: &mut NodeRef| {
            if r.kind == NodeKind::Layer && r.index > idx {
                r.index -= 1;
            }
        };
        for line in &mut self.cycle {
            reindex(&mut line.source);
            for a in &mut line.arrows {
                reindex(&mut a.target);
            }
        }
        self.revision += 1;
        true
    }

    /// Deterministic canonical byte encoding used for the graph digest
    /// (§4.10) — identical to the `.hgr` body encoding minus the magic
    /// and version header, so `digest(g)` is stable under save/load.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        crate::serialize::graph::encode_body(self)
    }

    pub fn digest(&self) -> crate::hash::ContentHash {
        crate::hash::ContentHash::of(&self.canonical_bytes())
    }
}

/// A lookup table from (kind, index) to its human-readable name, built
/// once per graph for debugging/CLI output.
pub fn node_names(g: &Graph) -> HashMap<NodeRef, String> {
    let mut map = HashMap::new();
    for (i, p) in g.producers.iter().enumerate() {
        map.insert(NodeRef::producer(i), p.name.clone());
    }
    for (i, c) in g.consumers.iter().enumerate() {
        map.insert(NodeRef::consumer(i), c.name.clone());
    }
    for (i, l) in g.layers.iter().enumerate() {
        map.insert(NodeRef::layer(i), l.name.clone());
    }
    map
}
