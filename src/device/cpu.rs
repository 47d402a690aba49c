//! CPU backend: kernels run in-process via `kernel::builtins` (§4.6).

use crate::config;
use crate::error::{HarmonicsError, Result};
use crate::kernel::compiler::CompiledOp;
use crate::kernel::KernelFn;
use crate::tensor::Tensor;

use super::{DeviceAdapter, DeviceKind};

pub struct CpuAdapter;

impl CpuAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpuAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAdapter for CpuAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn native_bits(&self) -> u32 {
        32
    }

    fn execute(&self, op: &CompiledOp, input: &Tensor) -> Result<Tensor> {
        match op.kernel {
            None => Ok(input.clone()),
            Some(KernelFn::Activation(f)) => Ok(f(input)),
            Some(KernelFn::Layer(f)) => Ok(f(input, &config::current())),
            Some(KernelFn::Loss(_)) => Err(HarmonicsError::InvalidArrow(
                "loss kernels run against a training tap, not a forward op".to_string(),
            )),
        }
    }
}
