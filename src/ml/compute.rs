// ============================================================
// Layer 5 — Compute Context
// ============================================================
// Picks the backend/device from the `gpu_num` setting and
// scopes per-topic work. A requested GPU that the wgpu runtime
// cannot open falls back to the CPU with a warning. Tensors
// built while a TopicScope is alive are released back to the
// device allocator when the scope drops, before the next topic
// is encoded.

use burn::{
    backend::{wgpu::WgpuDevice, Wgpu},
    prelude::*,
};
use std::{marker::PhantomData, panic};

/// Where tensors live for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    Cpu,
    Gpu(usize),
}

impl DeviceSpec {
    /// Negative `gpu_num` means CPU.
    pub fn from_gpu_num(gpu_num: i64) -> Self {
        match usize::try_from(gpu_num) {
            Ok(n)  => Self::Gpu(n),
            Err(_) => Self::Cpu,
        }
    }

    /// Like `from_gpu_num`, but a GPU rejected by `available` becomes the CPU.
    pub fn resolve(gpu_num: i64, available: impl FnOnce(usize) -> bool) -> Self {
        match Self::from_gpu_num(gpu_num) {
            Self::Gpu(n) if !available(n) => {
                tracing::warn!("GPU {} is not available, falling back to CPU", n);
                Self::Cpu
            }
            spec => spec,
        }
    }

    /// Device for `gpu_num` on this machine.
    pub fn select(gpu_num: i64) -> Self {
        Self::resolve(gpu_num, wgpu_available)
    }
}

/// Whether discrete adapter `n` can run a wgpu kernel. The runtime
/// panics when the adapter is missing, so the check runs inside
/// `catch_unwind` with the panic hook muted.
pub fn wgpu_available(n: usize) -> bool {
    let device  = WgpuDevice::DiscreteGpu(n);
    let hook    = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let _ = Tensor::<Wgpu, 1>::zeros([1], &device).into_data();
    }));
    panic::set_hook(hook);
    outcome.is_ok()
}

impl std::fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu    => write!(f, "cpu"),
            Self::Gpu(n) => write!(f, "gpu:{n}"),
        }
    }
}

/// The device all tensors of a run are created on.
pub struct ComputeContext<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ComputeContext<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Open the scope of one topic.
    pub fn topic_scope(&self, topic: &str) -> TopicScope<'_, B> {
        tracing::debug!("Entering topic {}", topic);
        TopicScope { device: &self.device, _backend: PhantomData }
    }
}

/// Releases the device's transient allocations on drop.
pub struct TopicScope<'a, B: Backend> {
    device:   &'a B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> Drop for TopicScope<'_, B> {
    fn drop(&mut self) {
        B::memory_cleanup(self.device);
    }
}
