//! Backend device adapters (§4.6).
//!
//! `DeviceAdapter` is the seam between the runtime's flat op list and
//! wherever tensors actually get computed. Each adapter owns its own
//! notion of "native bit width" so `policy::resolve_bits` can defer to it
//! under `PrecisionPolicy::Hardware`.

pub mod cpu;
pub mod gpu;

use crate::error::Result;
use crate::kernel::compiler::CompiledOp;
use crate::tensor::Tensor;

/// What kind of physical backend a `DeploymentDescriptor` targets (§4.8,
/// §4.9 partition/scheduling decisions read this to place work).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Fpga,
    Wasm,
    Quantum,
}

pub trait DeviceAdapter: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Bits this device computes at natively when no explicit policy
    /// overrides it.
    fn native_bits(&self) -> u32;

    /// Execute a single compiled op against its current input tensor.
    fn execute(&self, op: &CompiledOp, input: &Tensor) -> Result<Tensor>;
}

/// Construct the adapter for a device kind. FPGA/WASM/quantum are
/// intentionally unimplemented stand-ins (§4.6 Non-goals: this crate does
/// not ship real FPGA/quantum backends) that still honor the trait so the
/// scheduler can reason about them uniformly.
pub fn adapter_for(kind: DeviceKind) -> Box<dyn DeviceAdapter> {
    match kind {
        DeviceKind::Cpu => Box::new(cpu::CpuAdapter::new()),
        DeviceKind::Gpu => Box::new(gpu::GpuAdapter::new()),
        DeviceKind::Fpga => Box::new(StubAdapter(DeviceKind::Fpga)),
        DeviceKind::Wasm => Box::new(StubAdapter(DeviceKind::Wasm)),
        DeviceKind::Quantum => Box::new(StubAdapter(DeviceKind::Quantum)),
    }
}

/// Whether `kind` has a real, executable backend in this build. CPU
/// always does; GPU depends on whether a compatible adapter is present;
/// FPGA/WASM/quantum never do (§1: named as external collaborators, not
/// implemented here).
pub fn is_available(kind: DeviceKind) -> bool {
    match kind {
        DeviceKind::Cpu => true,
        DeviceKind::Gpu => gpu::is_available(),
        DeviceKind::Fpga | DeviceKind::Wasm | DeviceKind::Quantum => false,
    }
}

/// Select the adapter to actually run on for `kind`, silently downgrading
/// to CPU when `kind` has no backend available (§7 `BackendUnavailable`:
/// "silent; runtime downgrades to CPU and records the effective
/// backend"). Returns the adapter together with the device kind it
/// actually corresponds to.
pub fn select_adapter(kind: DeviceKind) -> (Box<dyn DeviceAdapter>, DeviceKind) {
    if is_available(kind) {
        (adapter_for(kind), kind)
    } else {
        tracing::warn!(requested = ?kind, "backend unavailable, downgrading to CPU");
        (adapter_for(DeviceKind::Cpu), DeviceKind::Cpu)
    }
}

struct StubAdapter(DeviceKind);

impl DeviceAdapter for StubAdapter {
    fn kind(&self) -> DeviceKind {
        self.0
    }

    fn native_bits(&self) -> u32 {
        32
    }

    fn execute(&self, _op: &CompiledOp, _input: &Tensor) -> Result<Tensor> {
        Err(crate::error::HarmonicsError::TransportError(format!(
            "{:?} backend has no executable implementation in this build",
            self.0
        )))
    }
}
