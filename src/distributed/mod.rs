//! Distributed scheduling (§4.9): runs a partitioned graph's pieces as
//! independent `CycleRuntime`s, each wired to its neighbor by a
//! `Transport`.

use std::sync::{Arc, Mutex};

use crate::error::{HarmonicsError, Result};
use crate::hash::ContentHash;
use crate::ir::{Consumer, Producer};
use crate::partition::{auto_partition, AutoPartitioned};
use crate::runtime::{CycleRuntime, DeploymentDescriptor};
use crate::tensor::Tensor;

/// How tensors cross a partition boundary. `InProcessTransport` is the
/// only implementation shipped here (§4.9 Non-goals: no real network
/// wiring); it exists as a trait so an embedder can supply a networked
/// one without touching the scheduler.
pub trait Transport: Send + Sync {
    fn send(&self, tensor: Tensor) -> Result<()>;
    fn recv(&self) -> Result<Tensor>;
}

pub struct InProcessTransport {
    sender: std::sync::mpsc::Sender<Tensor>,
    receiver: Mutex<std::sync::mpsc::Receiver<Tensor>>,
}

impl InProcessTransport {
    pub fn new() -> Arc<Self> {
        let (sender, rx) = std::sync::mpsc::channel();
        Arc::new(Self {
            sender,
            receiver: Mutex::new(rx),
        })
    }
}

impl Transport for InProcessTransport {
    fn send(&self, tensor: Tensor) -> Result<()> {
        self.sender
            .send(tensor)
            .map_err(|e| HarmonicsError::TransportError(e.to_string()))
    }

    fn recv(&self) -> Result<Tensor> {
        self.receiver
            .lock()
            .expect("transport receiver mutex poisoned")
            .recv()
            .map_err(|e| HarmonicsError::TransportError(e.to_string()))
    }
}

/// Exposes the sending side of a `Transport` as a `Consumer`, so it binds
/// directly to the boundary consumer name `partition::auto_partition`
/// synthesizes between adjacent partitions.
struct BoundarySender(Arc<dyn Transport>);

impl Consumer for BoundarySender {
    fn push(&mut self, tensor: Tensor) {
        let _ = self.0.send(tensor);
    }
}

/// Exposes the receiving side of a `Transport` as a `Producer`, bound to
/// the boundary producer name synthesized in the second half.
struct BoundaryReceiver(Arc<dyn Transport>);

impl Producer for BoundaryReceiver {
    fn next(&mut self) -> Tensor {
        self.0
            .recv()
            .unwrap_or_else(|_| Tensor::empty(crate::tensor::DType::Float32))
    }
}

/// Runs a graph split by `descriptor.partitions` as N `CycleRuntime`s,
/// each wired to its neighbor by an `InProcessTransport`.
pub struct DistributedScheduler {
    runtimes: Vec<CycleRuntime>,
    secure: bool,
}

impl DistributedScheduler {
    /// Partition `graph` per `descriptor.partitions` (§4.8) and wire each
    /// adjacent pair together through an in-process transport bound to
    /// their shared synthesized boundary producer/consumer.
    pub fn new(graph: &crate::ir::Graph, descriptor: DeploymentDescriptor) -> Result<Self> {
        let AutoPartitioned {
            mut graphs,
            boundary_names,
        } = auto_partition(graph, &descriptor);

        for (i, boundary_name) in boundary_names.iter().enumerate() {
            let transport: Arc<dyn Transport> = InProcessTransport::new();
            graphs[i].bind_consumer(
                boundary_name,
                Arc::new(Mutex::new(BoundarySender(transport.clone()))) as Arc<Mutex<dyn Consumer>>,
            )?;
            graphs[i + 1].bind_producer(
                boundary_name,
                Arc::new(Mutex::new(BoundaryReceiver(transport))) as Arc<Mutex<dyn Producer>>,
                None,
            )?;
        }

        let secure = descriptor.secure;
        let runtimes = graphs
            .into_iter()
            .map(|g| CycleRuntime::new(g, descriptor.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { runtimes, secure })
    }

    /// Run `epochs` forward steps, one partition after another in
    /// partition order (the boundary transports make the ordering
    /// load-bearing: an upstream partition must produce before the
    /// downstream one consumes).
    ///
    /// In secure mode, each partition after the first is seeded with the
    /// previous partition's `proof()` via `set_chain_start`, then its own
    /// chain is checked with `verify_chain` once its step completes — a
    /// mismatch means state was tampered with in transit or in the
    /// partition itself, and fails the whole pass with `ChainBroken`.
    pub fn fit(&mut self, epochs: u32) -> Result<()> {
        for epoch in 0..epochs {
            let mut incoming_proof: Option<String> = None;
            for (i, rt) in self.runtimes.iter_mut().enumerate() {
                if self.secure {
                    if let Some(prev) = incoming_proof.as_deref().and_then(ContentHash::from_hex) {
                        rt.set_chain_start(prev);
                    }
                }

                tracing::debug!(epoch, partition = i, "distributed step");
                rt.step().inspect_err(|e| {
                    tracing::error!(epoch, partition = i, error = %e, "partition step failed");
                })?;

                if self.secure {
                    if let Some(prev) = &incoming_proof {
                        if !rt.verify_chain(prev) {
                            return Err(HarmonicsError::ChainBroken { op_index: i });
                        }
                    }
                    incoming_proof = rt.proof();
                }
            }
        }
        Ok(())
    }

    pub fn partitions(&self) -> &[CycleRuntime] {
        &self.runtimes
    }

    pub fn partition(&self, i: usize) -> &CycleRuntime {
        &self.runtimes[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ProducerBinding;
    use crate::syntax::lexer::Lexer;
    use crate::syntax::parser::Parser;
    use std::sync::Mutex as StdMutex;

    fn build(src: &str) -> crate::ir::Graph {
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

    #[test]
    fn boundary_feeds_second_half_from_first_half() {
        let mut g = build("producer p {1}; consumer c {1}; layer a; layer b; cycle { p -> a; a -> b; b -> c; }");
        let producer: ProducerBinding = Arc::new(StdMutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();

        let descriptor = DeploymentDescriptor {
            partitions: vec![crate::device::DeviceKind::Cpu, crate::device::DeviceKind::Cpu],
            ..DeploymentDescriptor::default()
        };
        let mut scheduler = DistributedScheduler::new(&g, descriptor).unwrap();
        scheduler.fit(1).unwrap();
    }

    #[test]
    fn secure_mode_verifies_honest_chain_across_partitions() {
        let mut g = build("producer p {1}; consumer c {1}; layer a; layer b; cycle { p -> a; a -> b; b -> c; }");
        let producer: ProducerBinding = Arc::new(StdMutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();

        let descriptor = DeploymentDescriptor {
            secure: true,
            partitions: vec![crate::device::DeviceKind::Cpu, crate::device::DeviceKind::Cpu],
            ..DeploymentDescriptor::default()
        };
        let mut scheduler = DistributedScheduler::new(&g, descriptor).unwrap();
        assert!(scheduler.fit(1).is_ok());
    }

    #[test]
    fn three_way_split_runs_partitions_in_order() {
        let mut g = build(
            "producer p {1}; consumer c {1}; layer a; layer b; layer d; \
             cycle { p -> a; a -> b; b -> d; d -> c; }",
        );
        let producer: ProducerBinding = Arc::new(StdMutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();

        let descriptor = DeploymentDescriptor {
            partitions: vec![
                crate::device::DeviceKind::Cpu,
                crate::device::DeviceKind::Cpu,
                crate::device::DeviceKind::Cpu,
            ],
            ..DeploymentDescriptor::default()
        };
        let mut scheduler = DistributedScheduler::new(&g, descriptor).unwrap();
        scheduler.fit(2).unwrap();
        assert_eq!(scheduler.partitions().len(), 3);
    }
}
