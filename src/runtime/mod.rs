//! The cycle runtime (§4.7): drives one or more forward passes of a
//! compiled graph against bound producers/consumers.

pub mod checkpoint;
pub mod train;

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::{select_adapter, DeviceAdapter, DeviceKind};
use crate::error::{HarmonicsError, Result};
use crate::hash::ContentHash;
use crate::ir::{Graph, NodeKind, NodeRef};
use crate::kernel::compiler::{self, CompiledGraph, CompiledOp};
use crate::policy::PrecisionPolicy;
use crate::tensor::Tensor;

/// How a `CycleRuntime` should be deployed: which device it targets, what
/// precision policy to compile under, and whether to run in secure mode.
#[derive(Clone)]
pub struct DeploymentDescriptor {
    pub device: DeviceKind,
    pub policy: PrecisionPolicy,
    /// When set, every op execution is folded into a running BLAKE3 chain
    /// hash (§4.7 "secure chain of custody"): tampering with intermediate
    /// state between ops is detectable because the final chain hash no
    /// longer matches what an untampered run would produce.
    pub secure: bool,
    /// One entry per distributed partition, naming the backend each
    /// partition runs on. `DistributedScheduler`/`partition::auto_partition`
    /// read this to decide how many pieces to split a graph into and how
    /// much of it each piece gets (§4.8, §4.9). Empty (the default) means
    /// "not distributed" — a plain `CycleRuntime` ignores this field.
    pub partitions: Vec<DeviceKind>,
}

impl Default for DeploymentDescriptor {
    fn default() -> Self {
        Self {
            device: DeviceKind::Cpu,
            policy: PrecisionPolicy::Auto,
            secure: false,
            partitions: Vec::new(),
        }
    }
}

/// Per-node tensor state, keyed by `NodeRef`. Producers hold their last
/// pulled sample, layers their last computed activation, consumers are
/// write-only (nothing to read back).
pub type CycleState = HashMap<NodeRef, Tensor>;

/// Called after every op execution for observability (§4.7 debug hook).
pub type DebugCallback = Arc<dyn Fn(&CompiledOp, &Tensor) + Send + Sync>;

pub struct CycleRuntime {
    graph: Graph,
    compiled: CompiledGraph,
    adapter: Box<dyn DeviceAdapter>,
    /// The device actually running ops, which may differ from
    /// `descriptor.device` after a silent `BackendUnavailable` downgrade
    /// (§7).
    effective_device: DeviceKind,
    descriptor: DeploymentDescriptor,
    state: CycleState,
    chain_hash: Option<ContentHash>,
    /// Per-op encodings folded into `chain_hash` since the last checkpoint
    /// (`proof()` or `set_chain_start`). `verify_chain` replays these onto
    /// a caller-supplied hash to confirm it's a genuine ancestor of the
    /// current chain (§4.7).
    chain_log: Vec<Vec<u8>>,
    debug_callback: Option<DebugCallback>,
    /// The graph `revision` this runtime was compiled against; a forward
    /// pass against a stale graph is a programming error caught eagerly.
    compiled_revision: u64,
    /// Set by `enable_multi_threading`: dispatches a line's independent
    /// arrows across `rayon`'s worker pool instead of running them one at
    /// a time (§4.7 "Threading", §5).
    multithreaded: bool,
}

impl CycleRuntime {
    pub fn new(graph: Graph, descriptor: DeploymentDescriptor) -> Result<Self> {
        let (adapter, effective_device) = select_adapter(descriptor.device);
        let compiled = compiler::compile(&graph, &descriptor.policy, adapter.native_bits())?;
        let chain_hash = descriptor.secure.then(|| ContentHash::of(b"harmonics-chain-root"));
        let compiled_revision = graph.revision;
        Ok(Self {
            graph,
            compiled,
            adapter,
            effective_device,
            descriptor,
            state: CycleState::new(),
            chain_hash,
            chain_log: Vec::new(),
            debug_callback: None,
            compiled_revision,
            multithreaded: false,
        })
    }

    /// Dispatch independent arrows of a single declared line across
    /// `rayon`'s worker pool. Lines still execute in declaration order and
    /// every arrow on a line still observes the same producer sample
    /// (single-producer-per-line is preserved by pulling before dispatch);
    /// only arrows within one line actually run concurrently (§4.7, §5).
    pub fn enable_multi_threading(&mut self) {
        self.multithreaded = true;
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The device actually executing ops. Differs from
    /// `self.descriptor().device` exactly when that device was
    /// unavailable and the runtime silently downgraded to CPU (§7
    /// `BackendUnavailable`).
    pub fn effective_device(&self) -> DeviceKind {
        self.effective_device
    }

    pub fn descriptor(&self) -> &DeploymentDescriptor {
        &self.descriptor
    }

    pub fn set_debug_callback(&mut self, cb: DebugCallback) {
        self.debug_callback = Some(cb);
    }

    /// The running chain-of-custody digest, if secure mode is on.
    pub fn chain_hash(&self) -> Option<ContentHash> {
        self.chain_hash
    }

    /// The current chain hash's hex encoding (§4.7 `proof`), or `None` if
    /// secure mode is off. Reading a proof commits a checkpoint: it clears
    /// `chain_log`, so a `verify_chain` call made before the next `step()`
    /// trivially succeeds, and one made after it succeeds only if that
    /// step's ops genuinely replay from this proof to the new chain hash.
    pub fn proof(&mut self) -> Option<String> {
        let proof = self.chain_hash.map(|h| h.to_hex());
        self.chain_log.clear();
        proof
    }

    /// Re-derives the chain hash by folding the ops recorded since the
    /// last checkpoint onto `prev`, and checks the result matches the
    /// runtime's current chain hash (§4.7 `verify_chain`). Returns `false`
    /// on a malformed `prev`, a mismatch, or when secure mode is off.
    pub fn verify_chain(&self, prev: &str) -> bool {
        let Some(start) = ContentHash::from_hex(prev) else {
            return false;
        };
        let mut hash = start;
        for encoding in &self.chain_log {
            hash = ContentHash::of_parts(&[hash.as_bytes(), encoding]);
        }
        self.chain_hash == Some(hash)
    }

    /// Reseeds the chain-of-custody state to `prev` and clears
    /// `chain_log`, establishing a fresh checkpoint. Used by
    /// `DistributedScheduler` to continue an upstream partition's proof
    /// rather than starting this partition's chain at zero (§4.9).
    pub fn set_chain_start(&mut self, prev: ContentHash) {
        self.chain_hash = Some(prev);
        self.chain_log.clear();
    }

    /// Recompile against the graph's current `revision` after an edit
    /// (`Graph::add_layer`/`remove_layer`). A stale runtime refuses to
    /// step until this is called (§4.7).
    pub fn recompile(&mut self) -> Result<()> {
        self.compiled = compiler::compile(&self.graph, &self.descriptor.policy, self.adapter.native_bits())?;
        self.compiled_revision = self.graph.revision;
        Ok(())
    }

    fn ensure_fresh(&self) -> Result<()> {
        if self.compiled_revision != self.graph.revision {
            return Err(HarmonicsError::StaleCompilation {
                compiled_revision: self.compiled_revision,
                graph_revision: self.graph.revision,
            });
        }
        Ok(())
    }

    /// One forward pass: pull every producer, run the compiled op list in
    /// order, push every consumer's final value.
    pub fn step(&mut self) -> Result<()> {
        self.ensure_fresh()?;

        for (idx, producer) in self.graph.producers.iter().enumerate() {
            let node = NodeRef::producer(idx);
            if let Some(binding) = self.graph.producer_binding(idx) {
                let mut guard = binding.lock().expect("producer mutex poisoned");
                let sample = guard.next();
                self.state.insert(node, sample);
            } else if !self.state.contains_key(&node) {
                // Unbound producer with no prior state: treat as zeros
                // of its declared width so a partially-wired graph can
                // still be exercised (e.g. under `compile`/`graph-info`).
                let width = producer.width().unwrap_or(0);
                self.state
                    .insert(node, Tensor::zeros(crate::tensor::DType::Float32, vec![width]));
            }
        }

        let ops = self.compiled.ops.clone();
        let mut start = 0;
        while start < ops.len() {
            let line_index = ops[start].line_index;
            let mut end = start;
            while end < ops.len() && ops[end].line_index == line_index {
                end += 1;
            }
            self.run_line(start, &ops[start..end])?;
            start = end;
        }

        Ok(())
    }

    /// Run one declared line's ops: a single gate check, a single producer
    /// pull (every arrow on the line shares the line's source), then every
    /// forward arrow executed either sequentially or, under
    /// `enable_multi_threading`, concurrently via `rayon::scope` — with
    /// side effects (debug hook, chain hash, consumer push, state write)
    /// always applied afterward in declared arrow order, so secure-mode
    /// chain hashing stays deterministic regardless of threading (§4.7, §5).
    fn run_line(&mut self, base_op_index: usize, line_ops: &[CompiledOp]) -> Result<()> {
        let Some(first) = line_ops.first() else {
            return Ok(());
        };
        if !self.gate_open(first)? {
            return Ok(());
        }

        let source = first.source;
        let input = self
            .state
            .get(&source)
            .cloned()
            .ok_or_else(|| HarmonicsError::MissingBinding(self.graph.node_name(source).to_string()))?;

        // Backward (training) taps are handled by `runtime::train`, not
        // the forward step; skip them here but keep their global op index
        // so chain hashing is unaffected by which arrows happen to be
        // backward.
        let forward: Vec<(usize, &CompiledOp)> = line_ops
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.backward)
            .map(|(i, op)| (base_op_index + i, op))
            .collect();
        if forward.is_empty() {
            return Ok(());
        }

        let outputs: Vec<Result<Tensor>> = if self.multithreaded && forward.len() > 1 {
            let adapter = self.adapter.as_ref();
            let mut slots: Vec<Option<Result<Tensor>>> = forward.iter().map(|_| None).collect();
            rayon::scope(|scope| {
                for (slot, (_, op)) in slots.iter_mut().zip(forward.iter()) {
                    let input = &input;
                    scope.spawn(move |_| {
                        *slot = Some(adapter.execute(op, input));
                    });
                }
            });
            slots
                .into_iter()
                .map(|s| s.expect("every slot filled by its spawned task"))
                .collect()
        } else {
            forward.iter().map(|(_, op)| self.adapter.execute(op, &input)).collect()
        };

        for ((op_index, op), output) in forward.into_iter().zip(outputs.into_iter()) {
            let output = output?;

            if let Some(cb) = &self.debug_callback {
                cb(op, &output);
            }
            if let Some(chain) = self.chain_hash {
                let idx_bytes = (op_index as u64).to_le_bytes();
                self.chain_hash = Some(ContentHash::of_parts(&[chain.as_bytes(), &idx_bytes, output.bytes()]));
                let mut encoding = idx_bytes.to_vec();
                encoding.extend_from_slice(output.bytes());
                self.chain_log.push(encoding);
            }

            match op.target.kind {
                NodeKind::Consumer => {
                    if let Some(binding) = self.graph.consumer_binding(op.target.index) {
                        binding
                            .lock()
                            .expect("consumer mutex poisoned")
                            .push(output.clone());
                    }
                    self.state.insert(op.target, output);
                }
                _ => {
                    self.state.insert(op.target, output);
                }
            }
        }

        Ok(())
    }

    fn gate_open(&self, op: &CompiledOp) -> Result<bool> {
        match op.gate {
            None => Ok(true),
            Some((cond, want)) => {
                let tensor = self
                    .state
                    .get(&cond)
                    .ok_or_else(|| HarmonicsError::MissingBinding(self.graph.node_name(cond).to_string()))?;
                let first = tensor.as_f32().first().copied().unwrap_or(0.0);
                Ok((first != 0.0) == want)
            }
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConsumerBinding, Producer, ProducerBinding};
    use crate::syntax::lexer::Lexer;
    use crate::syntax::parser::Parser;
    use std::sync::Mutex;

    fn build(src: &str) -> Graph {
        let (tokens, diags) = Lexer::new(src).tokenize();
        assert!(diags.is_empty());
        let ast = Parser::new(tokens).parse_declarations().unwrap();
        crate::ir::builder::build_graph(&ast).unwrap()
    }

    struct ConstProducer(Tensor);
    impl Producer for ConstProducer {
        fn next(&mut self) -> Tensor {
            self.0.clone()
        }
    }

    struct VecConsumer(Vec<Tensor>);
    impl crate::ir::Consumer for VecConsumer {
        fn push(&mut self, tensor: Tensor) {
            self.0.push(tensor);
        }
    }

    #[test]
    fn forward_step_pulls_pushes_and_runs_kernel() {
        let mut g = build("producer p {2}; consumer c {2}; cycle { p -(relu)-> c; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[-1.0, 3.0]))));
        let consumer = Arc::new(Mutex::new(VecConsumer(Vec::new())));
        g.bind_producer("p", producer, Some(2)).unwrap();
        g.bind_consumer("c", consumer.clone() as ConsumerBinding).unwrap();

        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        rt.step().unwrap();

        let pushed = &consumer.lock().unwrap().0;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].as_f32(), vec![0.0, 3.0]);
    }

    #[test]
    fn secure_mode_chain_hash_advances_each_step() {
        let mut g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();

        let descriptor = DeploymentDescriptor {
            secure: true,
            ..DeploymentDescriptor::default()
        };
        let mut rt = CycleRuntime::new(g, descriptor).unwrap();
        let before = rt.chain_hash();
        rt.step().unwrap();
        let after = rt.chain_hash();
        assert_ne!(before, after);
    }

    #[test]
    fn gated_line_only_fires_when_condition_matches() {
        let mut g = build(
            "producer p {1}; producer gate {1}; consumer yes {1}; consumer no {1}; \
             cycle { if gate { p -> yes; } else { p -> no; } }",
        );
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        let gate_producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        let yes = Arc::new(Mutex::new(VecConsumer(Vec::new())));
        let no = Arc::new(Mutex::new(VecConsumer(Vec::new())));
        g.bind_producer("p", producer, Some(1)).unwrap();
        g.bind_producer("gate", gate_producer, Some(1)).unwrap();
        g.bind_consumer("yes", yes.clone() as ConsumerBinding).unwrap();
        g.bind_consumer("no", no.clone() as ConsumerBinding).unwrap();

        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        rt.step().unwrap();

        assert_eq!(yes.lock().unwrap().0.len(), 1);
        assert_eq!(no.lock().unwrap().0.len(), 0);
    }

    #[test]
    fn unavailable_backend_silently_downgrades_to_cpu() {
        let g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let descriptor = DeploymentDescriptor {
            device: DeviceKind::Fpga,
            ..DeploymentDescriptor::default()
        };
        let rt = CycleRuntime::new(g, descriptor).unwrap();
        assert_eq!(rt.effective_device(), DeviceKind::Cpu);
        assert_eq!(rt.descriptor().device, DeviceKind::Fpga);
    }

    #[test]
    fn stale_runtime_refuses_to_step_after_graph_edit() {
        let g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        rt.graph.add_layer(crate::ir::NodeDecl {
            name: "extra".to_string(),
            declared_width: Some(1),
            ratio: None,
            resolved_width: Some(1),
        });
        let err = rt.step().unwrap_err();
        assert!(matches!(err, HarmonicsError::StaleCompilation { .. }));
        rt.recompile().unwrap();
        assert!(rt.step().is_ok());
    }

    #[test]
    fn verify_chain_succeeds_for_the_proof_that_produced_current_state() {
        let mut g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();

        let descriptor = DeploymentDescriptor {
            secure: true,
            ..DeploymentDescriptor::default()
        };
        let mut rt = CycleRuntime::new(g, descriptor).unwrap();

        rt.step().unwrap();
        let first = rt.proof().unwrap();
        assert_eq!(first.len(), 64);
        assert!(rt.verify_chain(&first));

        rt.step().unwrap();
        let second = rt.proof().unwrap();
        assert_ne!(first, second);
        // Chain continuity: replaying the second pass's ops from `first`
        // still reproduces the new tip, because nothing reset the chain
        // in between.
        assert!(rt.verify_chain(&first));
        assert!(rt.verify_chain(&second));
    }

    #[test]
    fn verify_chain_rejects_an_unrelated_hash() {
        let mut g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();

        let descriptor = DeploymentDescriptor {
            secure: true,
            ..DeploymentDescriptor::default()
        };
        let mut rt = CycleRuntime::new(g, descriptor).unwrap();
        rt.step().unwrap();

        assert!(!rt.verify_chain(&ContentHash::of(b"not-the-real-chain").to_hex()));
        assert!(!rt.verify_chain("not-even-hex"));
    }

    #[test]
    fn multi_threaded_line_produces_same_outputs_as_single_threaded() {
        let mut g = build("producer p {2}; consumer a {2}; consumer b {2}; cycle { p -> a | p -> b; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0, 2.0]))));
        let out_a = Arc::new(Mutex::new(VecConsumer(Vec::new())));
        let out_b = Arc::new(Mutex::new(VecConsumer(Vec::new())));
        g.bind_producer("p", producer, Some(2)).unwrap();
        g.bind_consumer("a", out_a.clone() as ConsumerBinding).unwrap();
        g.bind_consumer("b", out_b.clone() as ConsumerBinding).unwrap();

        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        rt.enable_multi_threading();
        rt.step().unwrap();

        assert_eq!(out_a.lock().unwrap().0[0].as_f32(), vec![1.0, 2.0]);
        assert_eq!(out_b.lock().unwrap().0[0].as_f32(), vec![1.0, 2.0]);
    }
}
