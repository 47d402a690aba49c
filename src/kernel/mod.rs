//! Kernel registry (§4.5): named activation, loss, and layer functions
//! looked up by the string each cycle arrow carries.
//!
//! Deliberately a flat table of tagged function objects, not a trait
//! hierarchy: a kernel is identified by name alone, and "what kind of
//! kernel this is" is data (the `KernelFn` variant), not a type. This
//! keeps adding a kernel a one-line registration rather than a new
//! `impl` block wired into a dispatch hierarchy.

pub mod builtins;
pub mod compiler;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{HarmonicsError, Result};
use crate::tensor::Tensor;

/// An activation kernel: elementwise (or structured) transform of one
/// tensor into another of the same logical shape.
pub type ActivationFn = fn(&Tensor) -> Tensor;

/// A loss kernel: (prediction, target) -> scalar loss tensor.
pub type LossFn = fn(&Tensor, &Tensor) -> Tensor;

/// A layer kernel: input tensor, read against the current
/// `config::KernelConfig` -> output tensor. Used for conv/norm/attention/
/// pooling/dropout, which are parameterized by the ambient config rather
/// than by anything in the graph text.
pub type LayerFn = fn(&Tensor, &crate::config::KernelConfig) -> Tensor;

#[derive(Clone, Copy)]
pub enum KernelFn {
    Activation(ActivationFn),
    Loss(LossFn),
    Layer(LayerFn),
}

static REGISTRY: RwLock<Option<HashMap<String, KernelFn>>> = RwLock::new(None);

fn with_registry<R>(f: impl FnOnce(&HashMap<String, KernelFn>) -> R) -> R {
    {
        let guard = REGISTRY.read().unwrap();
        if let Some(map) = guard.as_ref() {
            return f(map);
        }
    }
    let mut guard = REGISTRY.write().unwrap();
    if guard.is_none() {
        *guard = Some(builtins::default_registry());
    }
    f(guard.as_ref().unwrap())
}

/// Register or overwrite a named kernel. Used by plugin packages (§6
/// `plugin-packager`) to extend the built-in set at runtime.
pub fn register(name: impl Into<String>, kernel: KernelFn) {
    let mut guard = REGISTRY.write().unwrap();
    if guard.is_none() {
        *guard = Some(builtins::default_registry());
    }
    guard.as_mut().unwrap().insert(name.into(), kernel);
}

pub fn lookup(name: &str) -> Result<KernelFn> {
    with_registry(|map| map.get(name).copied())
        .ok_or_else(|| HarmonicsError::UnknownFunction(name.to_string()))
}

pub fn apply_activation(name: &str, input: &Tensor) -> Result<Tensor> {
    match lookup(name)? {
        KernelFn::Activation(f) => Ok(f(input)),
        _ => Err(HarmonicsError::UnknownFunction(format!(
            "'{}' is not an activation kernel",
            name
        ))),
    }
}

pub fn apply_loss(name: &str, prediction: &Tensor, target: &Tensor) -> Result<Tensor> {
    match lookup(name)? {
        KernelFn::Loss(f) => Ok(f(prediction, target)),
        _ => Err(HarmonicsError::UnknownFunction(format!(
            "'{}' is not a loss kernel",
            name
        ))),
    }
}

pub fn apply_layer(name: &str, input: &Tensor, config: &crate::config::KernelConfig) -> Result<Tensor> {
    match lookup(name)? {
        KernelFn::Layer(f) => Ok(f(input, config)),
        _ => Err(HarmonicsError::UnknownFunction(format!(
            "'{}' is not a layer kernel",
            name
        ))),
    }
}
