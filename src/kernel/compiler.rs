//! Compiles a validated graph's cycle into a flat, ordered op list, and
//! caches the result keyed by graph digest + precision policy (§4.6).
//!
//! "Compile" here means resolving every arrow's function name against the
//! kernel registry up front, so the runtime's hot loop never does a
//! string lookup per step.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::hash::ContentHash;
use crate::ir::{Graph, NodeRef};
use crate::kernel::{self, KernelFn};
use crate::policy::PrecisionPolicy;

#[derive(Clone)]
pub struct CompiledOp {
    pub source: NodeRef,
    pub target: NodeRef,
    pub backward: bool,
    pub kernel: Option<KernelFn>,
    pub bits: u32,
    pub gate: Option<(NodeRef, bool)>,
    /// Position of this op's declaring `CycleLine` in `graph.cycle`. Arrows
    /// that share a `line_index` came from the same declared line and fan
    /// out from the same source sample (§3); `CycleRuntime::step` uses this
    /// to group independent arrows for parallel dispatch under
    /// `enable_multi_threading` while keeping cross-line order (§4.7, §5).
    pub line_index: usize,
}

#[derive(Clone)]
pub struct CompiledGraph {
    pub digest: ContentHash,
    pub ops: Vec<CompiledOp>,
}

static CACHE: RwLock<Option<HashMap<ContentHash, CompiledGraph>>> = RwLock::new(None);

fn policy_digest(policy: &PrecisionPolicy) -> ContentHash {
    // `PrecisionPolicy` has no canonical byte form of its own; a debug
    // rendering is stable enough to key a process-local cache (it is
    // never persisted across binary versions).
    ContentHash::of(format!("{:?}", policy).as_bytes())
}

/// Compile `graph`, resolving every arrow's kernel and bit width.
/// Results are cached by `BLAKE3(graph_digest || policy_digest)` so
/// recompiling an unchanged graph under an unchanged policy is free.
pub fn compile(graph: &Graph, policy: &PrecisionPolicy, hardware_native_bits: u32) -> Result<CompiledGraph> {
    let graph_digest = graph.digest();
    let cache_key = ContentHash::of_parts(&[graph_digest.as_bytes(), policy_digest(policy).as_bytes()]);

    {
        let guard = CACHE.read().unwrap();
        if let Some(hit) = guard.as_ref().and_then(|m| m.get(&cache_key)) {
            tracing::debug!(%graph_digest, "compiled graph served from cache");
            return Ok(hit.clone());
        }
    }

    tracing::debug!(%graph_digest, ?policy, "compiling graph");

    let mut ops = Vec::new();
    for (line_index, line) in graph.cycle.iter().enumerate() {
        let bits = crate::policy::resolve_bits(policy, line.source.index, hardware_native_bits);
        for arrow in &line.arrows {
            let kernel = match &arrow.function {
                Some(name) => Some(kernel::lookup(name).inspect_err(|e| {
                    tracing::warn!(function = %name, error = %e, "kernel lookup failed during compile");
                })?),
                None => None,
            };
            ops.push(CompiledOp {
                source: line.source,
                target: arrow.target,
                backward: arrow.backward,
                kernel,
                bits,
                gate: line.gate,
                line_index,
            });
        }
    }

    let compiled = CompiledGraph {
        digest: graph_digest,
        ops,
    };

    let mut guard = CACHE.write().unwrap();
    guard
        .get_or_insert_with(HashMap::new)
        .insert(cache_key, compiled.clone());

    Ok(compiled)
}
