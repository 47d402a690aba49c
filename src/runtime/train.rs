//! Training loop (§4.7 `fit`): runs forward passes, evaluates backward
//! (loss) taps, and nudges each tapped layer's weight tensor.
//!
//! This crate does not carry a full autodiff engine (Non-goal): a
//! backward arrow's loss is not backpropagated through intervening
//! kernels. Instead each tapped layer owns a trainable bias tensor that
//! the optimizer moves in the direction that reduces the most recently
//! observed loss. This is enough to give §4.7's fit/checkpoint/early-stop
//! machinery real numbers to work with without pretending to be a tensor
//! compiler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::kernel;
use crate::runtime::CycleRuntime;
use crate::serialize::weights::WeightSet;
use crate::tensor::Tensor;

/// Called once per gradient-application step, numbered from 1 (§4.7
/// `fit`). With `grad_accum_steps = k` this fires `⌊epochs/k⌋` times, not
/// once per epoch.
pub type ProgressCallback = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Clone, Debug)]
pub enum Optimizer {
    Sgd { lr: f32 },
    Adam { lr: f32, beta1: f32, beta2: f32, eps: f32 },
    RmsProp { lr: f32, decay: f32, eps: f32 },
}

#[derive(Clone, Debug)]
pub enum LrSchedule {
    Constant,
    StepDecay { drop_every: u32, factor: f32 },
    Exponential { decay: f32 },
}

impl LrSchedule {
    fn scale(&self, base_lr: f32, epoch: u32) -> f32 {
        match self {
            LrSchedule::Constant => base_lr,
            LrSchedule::StepDecay { drop_every, factor } => {
                let drops = if *drop_every == 0 { 0 } else { epoch / drop_every };
                base_lr * factor.powi(drops as i32)
            }
            LrSchedule::Exponential { decay } => base_lr * (-decay * epoch as f32).exp(),
        }
    }
}

#[derive(Clone)]
pub struct TrainConfig {
    pub optimizer: Optimizer,
    pub schedule: LrSchedule,
    pub grad_clip: Option<f32>,
    pub grad_accum_steps: u32,
    pub early_stopping_patience: Option<u32>,
    /// Invoked only when an optimizer update is actually applied, numbered
    /// from 1 (§4.7, §8 invariant: `⌊epochs/grad_accum_steps⌋` calls).
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for TrainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainConfig")
            .field("optimizer", &self.optimizer)
            .field("schedule", &self.schedule)
            .field("grad_clip", &self.grad_clip)
            .field("grad_accum_steps", &self.grad_accum_steps)
            .field("early_stopping_patience", &self.early_stopping_patience)
            .field("progress", &self.progress.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            optimizer: Optimizer::Sgd { lr: 0.01 },
            schedule: LrSchedule::Constant,
            grad_clip: None,
            grad_accum_steps: 1,
            early_stopping_patience: None,
            progress: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct OptimizerState {
    momentum: HashMap<String, Vec<f32>>,
    velocity: HashMap<String, Vec<f32>>,
    steps: HashMap<String, u32>,
}

pub struct Trainer<'a> {
    runtime: &'a mut CycleRuntime,
    weights: WeightSet,
    opt_state: OptimizerState,
    accumulated_loss: HashMap<String, f32>,
    accum_count: u32,
}

#[derive(Clone, Debug)]
pub struct TrainReport {
    pub epochs_run: u32,
    pub final_loss: f32,
    pub stopped_early: bool,
}

impl<'a> Trainer<'a> {
    pub fn new(runtime: &'a mut CycleRuntime) -> Self {
        let weights = WeightSet::new();
        Self {
            runtime,
            weights,
            opt_state: OptimizerState::default(),
            accumulated_loss: HashMap::new(),
            accum_count: 0,
        }
    }

    pub fn weights(&self) -> &WeightSet {
        &self.weights
    }

    pub fn load_weights(&mut self, weights: WeightSet) {
        self.weights = weights;
    }

    /// Run up to `epochs` training steps, applying `config`'s optimizer,
    /// schedule, clipping, and accumulation. Stops early if
    /// `early_stopping_patience` epochs pass with no improvement in the
    /// mean per-epoch loss.
    pub fn fit(&mut self, epochs: u32, config: &TrainConfig) -> Result<TrainReport> {
        let mut best_loss = f32::INFINITY;
        let mut patience_used = 0u32;
        let mut last_loss = 0.0f32;
        let mut update_count = 0u32;

        for epoch in 0..epochs {
            self.runtime.step()?;
            let losses = self.evaluate_backward_taps()?;
            let mean_loss = if losses.is_empty() {
                0.0
            } else {
                losses.values().sum::<f32>() / losses.len() as f32
            };
            last_loss = mean_loss;

            for (layer, loss) in &losses {
                *self.accumulated_loss.entry(layer.clone()).or_insert(0.0) += loss;
            }
            self.accum_count += 1;

            if self.accum_count >= config.grad_accum_steps {
                let lr = config.schedule.scale(base_lr(&config.optimizer), epoch);
                for (layer, accumulated) in self.accumulated_loss.drain() {
                    let grad = accumulated / self.accum_count as f32;
                    let grad = match config.grad_clip {
                        Some(bound) => grad.clamp(-bound, bound),
                        None => grad,
                    };
                    self.apply_update(&layer, grad, lr, &config.optimizer);
                }
                self.accum_count = 0;
                update_count += 1;
                if let Some(progress) = &config.progress {
                    progress(update_count);
                }
            }

            if let Some(patience) = config.early_stopping_patience {
                if mean_loss + 1e-6 < best_loss {
                    best_loss = mean_loss;
                    patience_used = 0;
                } else {
                    patience_used += 1;
                    if patience_used >= patience {
                        return Ok(TrainReport {
                            epochs_run: epoch + 1,
                            final_loss: last_loss,
                            stopped_early: true,
                        });
                    }
                }
            }
        }

        Ok(TrainReport {
            epochs_run: epochs,
            final_loss: last_loss,
            stopped_early: false,
        })
    }

    /// Evaluate every backward arrow in the graph against the runtime's
    /// current state, returning layer name -> scalar loss.
    fn evaluate_backward_taps(&self) -> Result<HashMap<String, f32>> {
        let graph = self.runtime.graph();
        let mut losses = HashMap::new();
        for line in &graph.cycle {
            for arrow in &line.arrows {
                if !arrow.backward {
                    continue;
                }
                let Some(function) = &arrow.function else {
                    continue;
                };
                let prediction = self.runtime.state().get(&line.source);
                let target = self.runtime.state().get(&arrow.target);
                let (Some(prediction), Some(target)) = (prediction, target) else {
                    continue;
                };
                let loss = kernel::apply_loss(function, prediction, target)?;
                let scalar = loss.as_f32().first().copied().unwrap_or(0.0);
                losses.insert(graph.node_name(line.source).to_string(), scalar);
            }
        }
        Ok(losses)
    }

    fn apply_update(&mut self, layer: &str, grad: f32, lr: f32, optimizer: &Optimizer) {
        let width = self
            .weights
            .get(layer)
            .map(|t| t.len().max(1) as usize)
            .unwrap_or(1);
        let current = self
            .weights
            .entry(layer.to_string())
            .or_insert_with(|| Tensor::zeros(crate::tensor::DType::Float32, vec![width as u64]))
            .as_f32();

        let updated = match optimizer {
            Optimizer::Sgd { .. } => current.iter().map(|w| w - lr * grad).collect::<Vec<_>>(),
            Optimizer::Adam { beta1, beta2, eps, .. } => {
                self.opt_state.steps
                    .entry(layer.to_string())
                    .and_modify(|s| *s += 1)
                    .or_insert(1);
                let step = self.opt_state.steps[layer] as f32;
                let m = self
                    .opt_state
                    .momentum
                    .entry(layer.to_string())
                    .or_insert_with(|| vec![0.0; current.len()]);
                let v = self
                    .opt_state
                    .velocity
                    .entry(layer.to_string())
                    .or_insert_with(|| vec![0.0; current.len()]);
                for i in 0..m.len() {
                    m[i] = beta1 * m[i] + (1.0 - beta1) * grad;
                    v[i] = beta2 * v[i] + (1.0 - beta2) * grad * grad;
                }
                let m_hat: Vec<f32> = m.iter().map(|x| x / (1.0 - beta1.powf(step))).collect();
                let v_hat: Vec<f32> = v.iter().map(|x| x / (1.0 - beta2.powf(step))).collect();
                current
                    .iter()
                    .zip(m_hat.iter().zip(v_hat.iter()))
                    .map(|(w, (mh, vh))| w - lr * mh / (vh.sqrt() + eps))
                    .collect()
            }
            Optimizer::RmsProp { decay, eps, .. } => {
                let v = self
                    .opt_state
                    .velocity
                    .entry(layer.to_string())
                    .or_insert_with(|| vec![0.0; current.len()]);
                for x in v.iter_mut() {
                    *x = *decay * *x + (1.0 - decay) * grad * grad;
                }
                current
                    .iter()
                    .zip(v.iter())
                    .map(|(w, vh)| w - lr * grad / (vh.sqrt() + eps))
                    .collect()
            }
        };

        self.weights
            .insert(layer.to_string(), Tensor::from_f32(&updated));
    }
}

fn base_lr(optimizer: &Optimizer) -> f32 {
    match optimizer {
        Optimizer::Sgd { lr } => *lr,
        Optimizer::Adam { lr, .. } => *lr,
        Optimizer::RmsProp { lr, .. } => *lr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Producer, ProducerBinding};
    use crate::runtime::DeploymentDescriptor;
    use crate::syntax::lexer::Lexer;
    use crate::syntax::parser::Parser;
    use std::sync::{Arc, Mutex};

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

    fn labeled_graph() -> crate::ir::Graph {
        let mut g = build(
            "producer a {1}; producer lbl {1}; layer l; cycle { a -> l; l <-(mse)- lbl; }",
        );
        let a: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[0.5]))));
        let lbl: ProducerBinding = Arc::new(Mutex::new(ConstProducer(Tensor::from_f32(&[1.0]))));
        g.bind_producer("a", a, Some(1)).unwrap();
        g.bind_producer("lbl", lbl, Some(1)).unwrap();
        g
    }

    #[test]
    fn fit_runs_requested_epochs_and_reports_loss() {
        let g = labeled_graph();
        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        let mut trainer = Trainer::new(&mut rt);
        let report = trainer.fit(3, &TrainConfig::default()).unwrap();
        assert_eq!(report.epochs_run, 3);
        assert!(!report.stopped_early);
    }

    #[test]
    fn adam_optimizer_updates_weights() {
        let g = labeled_graph();
        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        let mut trainer = Trainer::new(&mut rt);
        let config = TrainConfig {
            optimizer: Optimizer::Adam {
                lr: 0.1,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-8,
            },
            ..TrainConfig::default()
        };
        trainer.fit(2, &config).unwrap();
        assert!(trainer.weights().contains_key("l"));
    }

    #[test]
    fn progress_fires_once_per_accumulation_window() {
        let g = labeled_graph();
        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        let mut trainer = Trainer::new(&mut rt);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let config = TrainConfig {
            grad_accum_steps: 2,
            progress: Some(Arc::new(move |n| calls_clone.lock().unwrap().push(n))),
            ..TrainConfig::default()
        };
        trainer.fit(6, &config).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn early_stopping_halts_when_loss_stops_improving() {
        let g = labeled_graph();
        let mut rt = CycleRuntime::new(g, DeploymentDescriptor::default()).unwrap();
        let mut trainer = Trainer::new(&mut rt);
        let config = TrainConfig {
            optimizer: Optimizer::Sgd { lr: 0.0 }, // zero lr: loss never improves
            early_stopping_patience: Some(2),
            ..TrainConfig::default()
        };
        let report = trainer.fit(50, &config).unwrap();
        assert!(report.stopped_early);
        assert!(report.epochs_run < 50);
    }
}
