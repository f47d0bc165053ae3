//! Burn backend the image models run on.

use tracing::info;

#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

pub type InferenceDevice = <InferenceBackend as burn::prelude::Backend>::Device;

/// Initializes the inference device.
///
/// This function only exists to be able to change the device at a single location.
#[must_use]
pub fn init_device() -> InferenceDevice {
    #[cfg(not(feature = "wgpu"))]
    info!("Initializing CPU device...");
    #[cfg(feature = "wgpu")]
    info!("Initializing WGPU device...");

    InferenceDevice::default()
}
