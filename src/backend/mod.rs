// Backend module - the Vulkan side of the reproduction
//
// Design: thin wrappers around ash and the allocator, one type per owned
// resource group

pub mod device;
pub mod handle;
pub mod image;

pub use device::DeviceContext;
pub use handle::ExternalHandle;
pub use image::ExportableImage;
