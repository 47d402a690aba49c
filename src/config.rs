//! Process-wide tunables for built-in kernels (§4.5 ambient stack).
//!
//! These mirror the teacher's configuration surface: a handful of knobs
//! that built-in kernels read at call time rather than bake into the
//! compiled graph, guarded by a single `RwLock` so the CLI and runtime
//! can both adjust them without plumbing a config object through every
//! kernel call.

use std::sync::RwLock;

#[derive(Clone, Debug, PartialEq)]
pub struct KernelConfig {
    pub conv_kernel_size: u32,
    pub pool_window: u32,
    pub attention_heads: u32,
    pub attention_temperature: f32,
    pub norm_epsilon: f32,
    pub dropout_rate: f32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            conv_kernel_size: 3,
            pool_window: 2,
            attention_heads: 8,
            attention_temperature: 1.0,
            norm_epsilon: 1e-5,
            dropout_rate: 0.1,
        }
    }
}

static CONFIG: RwLock<Option<KernelConfig>> = RwLock::new(None);

/// Read the current config, initializing it to defaults on first use.
pub fn current() -> KernelConfig {
    if let Some(cfg) = CONFIG.read().unwrap().as_ref() {
        return cfg.clone();
    }
    let cfg = KernelConfig::default();
    *CONFIG.write().unwrap() = Some(cfg.clone());
    cfg
}

pub fn set(cfg: KernelConfig) {
    *CONFIG.write().unwrap() = Some(cfg);
}

/// Reset to defaults. Used between test cases that mutate global config.
pub fn reset() {
    *CONFIG.write().unwrap() = Some(KernelConfig::default());
}
