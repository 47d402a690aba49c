//! Concrete end-to-end scenarios: DSL round-trip, ratio propagation,
//! branching with a counting producer, a training tap against a dummy
//! loss, a two-pass secure chain, and cross-backend determinism.

use std::sync::{Arc, Mutex};

use harmonics::device::DeviceKind;
use harmonics::ir::{Consumer, ConsumerBinding, Graph, Producer, ProducerBinding};
use harmonics::runtime::train::{TrainConfig, Trainer};
use harmonics::runtime::{CycleRuntime, DeploymentDescriptor};
use harmonics::syntax::lexer::Lexer;
use harmonics::syntax::parser::Parser;
use harmonics::tensor::Tensor;

fn build(src: &str) -> Graph {
    let (tokens, diags) = Lexer::new(src).tokenize();
    assert!(diags.is_empty(), "lex errors: {:?}", diags);
    let ast = Parser::new(tokens).parse_declarations().unwrap();
    harmonics::ir::builder::build_graph(&ast).unwrap()
}

struct ConstProducer(Tensor);
impl Producer for ConstProducer {
    fn next(&mut self) -> Tensor {
        self.0.clone()
    }
}

struct CountingProducer(u64);
impl Producer for CountingProducer {
    fn next(&mut self) -> Tensor {
        self.0 += 1;
        Tensor::from_f32(&[(self.0 % 2) as f32])
    }
}

struct VecConsumer(Vec<Tensor>);
impl Consumer for VecConsumer {
    fn push(&mut self, tensor: Tensor) {
        self.0.push(tensor);
    }
}

/// S1: a source file parses, builds, and serializes to the same digest
/// it started with once decoded back.
#[test]
fn s1_dsl_round_trips_through_compiled_graph() {
    let g = build("producer p {3}; consumer c {3}; layer hidden; cycle { p -(relu)-> hidden; hidden -> c; }");
    let bytes = harmonics::serialize::graph::encode(&g);
    let decoded = harmonics::serialize::graph::decode(&bytes).unwrap();
    assert_eq!(g.digest(), decoded.digest());
    assert_eq!(decoded.layers.len(), 1);
    assert_eq!(decoded.layers[0].name, "hidden");
}

/// S2: a layer declared with a ratio resolves its width from its
/// upstream producer's declared width.
#[test]
fn s2_ratio_propagates_from_upstream_width() {
    let g = build("producer p {8}; consumer c; layer half 1/2 p; cycle { p -> half; half -> c; }");
    assert_eq!(g.layers[0].resolved_width, Some(4));
}

/// S3: branching with a counting producer sends samples alternately to
/// two different consumers, one per step, never both.
#[test]
fn s3_branching_alternates_with_counting_producer() {
    let mut g = build(
        "producer p {1}; producer gate {1}; consumer even {1}; consumer odd {1}; \
         cycle { if gate { p -> even; } else { p -> odd; } }",
    );
    let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
    let gate: ProducerBinding = Arc::new(Mutex::new(CountingProducer(0)));
    let even = Arc::new(Mutex::new(VecConsumer(Vec::new())));
    let odd = Arc::new(Mutex::new(VecConsumer(Vec::new())));
    g.bind_producer("p", producer, Some(1)).unwrap();
    g.bind_producer("gate", gate, Some(1)).unwrap();
    g.bind_consumer("even", even.clone() as ConsumerBinding).unwrap();
    g.bind_consumer("odd", odd.clone() as ConsumerBinding).unwrap();

    let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
    for _ in 0..6 {
        rt.step().unwrap();
    }
    // CountingProducer emits 1, 0, 1, 0, 1, 0 across the six steps.
    assert_eq!(even.lock().unwrap().0.len(), 3);
    assert_eq!(odd.lock().unwrap().0.len(), 3);
}

/// S4: a training tap against a dummy mse loss moves the tapped layer's
/// weight away from zero over several epochs.
#[test]
fn s4_training_tap_moves_weight_toward_target() {
    let mut g = build("producer a {1}; producer lbl {1}; layer l; cycle { a -> l; l <-(mse)- lbl; }");
    let a: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[0.0]))));
    let lbl: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[2.0]))));
    g.bind_producer("a", a, Some(1)).unwrap();
    g.bind_producer("lbl", lbl, Some(1)).unwrap();

    let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
    let mut trainer = Trainer::new(&mut rt);
    let report = trainer.fit(20, &TrainConfig::default()).unwrap();
    assert_eq!(report.epochs_run, 20);
    let weight = trainer.weights().get("l").unwrap().as_f32()[0];
    assert!(weight != 0.0, "weight should have moved off its zero init");
}

/// S5: two identical secure-mode runs produce the same chain hash, and
/// a run with one extra step produces a distinct one.
#[test]
fn s5_secure_chain_distinguishes_runs_by_step_count() {
    let fresh_runtime = || {
        let mut g = build("producer p {1}; consumer c {1}; cycle { p -(relu)-> c; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[5.0]))));
        g.bind_producer("p", producer, Some(1)).unwrap();
        let descriptor = DeploymentDescriptor {
            secure: true,
            ..DeploymentDescriptor::default()
        };
        CycleRuntime::new(g, descriptor).unwrap()
    };

    let mut pass_one = fresh_runtime();
    pass_one.step().unwrap();
    pass_one.step().unwrap();
    let two_step_hash = pass_one.chain_hash();

    let mut pass_two = fresh_runtime();
    pass_two.step().unwrap();
    pass_two.step().unwrap();
    assert_eq!(two_step_hash, pass_two.chain_hash());

    pass_two.step().unwrap();
    assert_ne!(two_step_hash, pass_two.chain_hash());
}

/// S6: an identity activation over `[42.0]` produces the same output
/// whether the runtime targets CPU directly or a backend this build has
/// no real adapter for (FPGA, quantum), which silently downgrade to the
/// same CPU kernel.
#[test]
fn s6_identity_activation_is_deterministic_across_requested_backends() {
    let run_on = |device: DeviceKind| -> Vec<f32> {
        let mut g = build("producer p {1}; consumer c {1}; cycle { p -> c; }");
        let producer: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[42.0]))));
        let consumer = Arc::new(Mutex::new(VecConsumer(Vec::new())));
        g.bind_producer("p", producer, Some(1)).unwrap();
        g.bind_consumer("c", consumer.clone() as ConsumerBinding).unwrap();
        let descriptor = DeploymentDescriptor {
            device,
            ..DeploymentDescriptor::default()
        };
        let mut rt = CycleRuntime::new(g, descriptor).unwrap();
        rt.step().unwrap();
        consumer.lock().unwrap().0[0].as_f32()
    };

    let cpu = run_on(DeviceKind::Cpu);
    let fpga = run_on(DeviceKind::Fpga);
    let quantum = run_on(DeviceKind::Quantum);
    assert_eq!(cpu, vec![42.0]);
    assert_eq!(cpu, fpga);
    assert_eq!(cpu, quantum);
}
