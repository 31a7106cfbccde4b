//! Backend abstraction - Multi-backend support
//!
//! Supports both CUDA (GPU) and NdArray (CPU) backends, selected at compile time.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA (preferred) or NdArray (fallback)
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("At least one backend (cuda or ndarray) must be enabled!");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device type of the selected backend
pub type DefaultDevice = <DefaultBackend as Backend>::Device;

/// Get the default device
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Device for the accelerator at `gpu_index`
///
/// The CPU backend has a single device and ignores the index.
#[allow(unused_variables)]
pub fn device(gpu_index: usize) -> DefaultDevice {
    #[cfg(feature = "cuda")]
    {
        burn_cuda::CudaDevice::new(gpu_index)
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        default_device()
    }
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}
