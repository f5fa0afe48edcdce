// Vulkan device connection - the one-shot setup side of the reproduction
//
// Responsibilities:
// - Instance creation with validation layers
// - Adapter scoring and selection (prefer discrete GPU)
// - Logical device + graphics queue creation, export extensions enabled
// - Allocator setup plus the export-restricted memory pool

use anyhow::{bail, Context, Result};
use ash::vk::Handle;
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, MutexGuard};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::handle::ExternalHandle;
use crate::config::ProbeConfig;

const APP_NAME: &str = "export-handle-probe";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Handle type every exportable allocation pre-declares.
#[cfg(windows)]
pub const EXPORT_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32;
#[cfg(unix)]
pub const EXPORT_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD;

/// Device extensions needed to hand exported memory to another API.
fn export_device_extensions() -> Vec<&'static CStr> {
    #[cfg(windows)]
    {
        vec![ash::extensions::khr::ExternalMemoryWin32::name()]
    }
    #[cfg(unix)]
    {
        vec![ash::extensions::khr::ExternalMemoryFd::name()]
    }
}

/// Transient per-adapter capability snapshot, kept only until selection.
#[derive(Debug, Clone)]
pub struct CapabilityRecord {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub graphics_queue_family: Option<u32>,
    pub has_export_extensions: bool,
    pub supports_buffer_device_address: bool,
    pub supports_sampler_anisotropy: bool,
}

/// Score an adapter for selection.
///
/// Discrete beats integrated; CPU and virtual adapters score zero and are
/// never selected, same as an adapter missing a mandatory capability.
pub fn score_adapter(record: &CapabilityRecord) -> u32 {
    if record.graphics_queue_family.is_none()
        || !record.has_export_extensions
        || !record.supports_buffer_device_address
        || !record.supports_sampler_anisotropy
    {
        return 0;
    }

    match record.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
        _ => 0,
    }
}

/// Memory pool the exportable images allocate from.
///
/// The allocator manages blocks per memory type; restricting every exportable
/// allocation to this single type keeps them together in one set of blocks,
/// with the export handle type declared up front. Small allocations end up
/// sharing a block - deliberately, since that sharing is what the
/// reproduction probes.
pub struct ExportPool {
    pub memory_type_index: u32,
    pub handle_type: vk::ExternalMemoryHandleTypeFlags,
}

impl ExportPool {
    pub fn memory_type_bits(&self) -> u32 {
        1 << self.memory_type_index
    }
}

/// Open connection to the selected adapter.
///
/// Owns every GPU-side resource transitively; Drop releases them in reverse
/// acquisition order.
pub struct DeviceContext {
    allocator: Mutex<ManuallyDrop<Allocator>>,
    export_pool: ExportPool,
    #[cfg(unix)]
    external_memory: ash::extensions::khr::ExternalMemoryFd,
    #[cfg(windows)]
    external_memory: ash::extensions::khr::ExternalMemoryWin32,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    /// Pixel format every probe image uses (from config).
    pub image_format: vk::Format,

    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

/// Everything `connect_adapter` sets up on top of an existing instance.
struct AdapterConnection {
    record: CapabilityRecord,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    #[cfg(unix)]
    external_memory: ash::extensions::khr::ExternalMemoryFd,
    #[cfg(windows)]
    external_memory: ash::extensions::khr::ExternalMemoryWin32,
    allocator: Allocator,
    export_pool: ExportPool,
    image_format: vk::Format,
}

impl DeviceContext {
    /// Open a connection to either the best-scoring adapter or the one pinned
    /// at `selected` (enumeration index), then set up the allocator and the
    /// export pool. Every failure here is fatal to the reproduction, but
    /// already-created objects are still released before the error surfaces;
    /// `Drop` only takes over once `Self` exists.
    pub fn new(config: &ProbeConfig, selected: Option<usize>) -> Result<Arc<Self>> {
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let enable_validation = config.debug.validation_layers;
        let instance = create_instance(&entry, enable_validation)?;

        let debug_utils = if enable_validation {
            match setup_debug_messenger(&entry, &instance) {
                Ok(pair) => Some(pair),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        let connection = match connect_adapter(config, selected, &instance) {
            Ok(connection) => connection,
            Err(err) => {
                unsafe {
                    if let Some((debug_utils, messenger)) = debug_utils {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(err);
            }
        };

        let record = connection.record;
        let context = Arc::new(Self {
            allocator: Mutex::new(ManuallyDrop::new(connection.allocator)),
            export_pool: connection.export_pool,
            external_memory: connection.external_memory,
            device: connection.device,
            physical_device: connection.physical_device,
            instance,
            _entry: entry,
            graphics_queue: connection.graphics_queue,
            graphics_queue_family: connection.graphics_queue_family,
            image_format: connection.image_format,
            debug_utils,
        });

        context.set_debug_name(
            vk::ObjectType::DEVICE,
            context.device.handle().as_raw(),
            &format!("Logical device for {}", record.name),
        );
        context.set_debug_name(
            vk::ObjectType::QUEUE,
            context.graphics_queue.as_raw(),
            "Graphics queue",
        );

        Ok(context)
    }

    /// The allocator under investigation. The lock is held only for the
    /// duration of a single allocate/free call.
    pub fn allocator(&self) -> MutexGuard<'_, ManuallyDrop<Allocator>> {
        self.allocator.lock()
    }

    pub fn export_pool(&self) -> &ExportPool {
        &self.export_pool
    }

    /// Export an OS handle referencing `memory` with the platform call.
    pub fn export_memory_handle(&self, memory: vk::DeviceMemory) -> Result<ExternalHandle> {
        #[cfg(unix)]
        {
            let info = vk::MemoryGetFdInfoKHR::builder()
                .memory(memory)
                .handle_type(self.export_pool.handle_type);
            let fd = unsafe { self.external_memory.get_memory_fd(&info) }
                .context("Failed to export a file descriptor for image memory")?;
            Ok(unsafe { ExternalHandle::from_raw_fd(fd) })
        }
        #[cfg(windows)]
        {
            let info = vk::MemoryGetWin32HandleInfoKHR::builder()
                .memory(memory)
                .handle_type(self.export_pool.handle_type);
            let handle = unsafe { self.external_memory.get_memory_win32_handle(&info) }
                .context("Failed to export a handle for image memory")?;
            Ok(unsafe { ExternalHandle::from_raw_handle(handle) })
        }
    }

    /// Attach a debug-utils name to a Vulkan object. No-op when validation is
    /// off.
    pub fn set_debug_name(&self, object_type: vk::ObjectType, object: u64, name: &str) {
        let Some((debug_utils, _)) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(object_type)
            .object_handle(object)
            .object_name(&name);
        let _ = unsafe { debug_utils.set_debug_utils_object_name(self.device.handle(), &info) };
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying device connection");
        let _ = self.wait_idle();

        unsafe {
            // The allocator frees memory owned by the device, so it has to go
            // first.
            ManuallyDrop::drop(self.allocator.get_mut());

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Adapter names in enumeration order, without opening a device connection.
///
/// A throwaway instance is the only Vulkan object touched, and the order
/// matches what `DeviceContext::new` scores.
pub fn list_adapters() -> Result<Vec<String>> {
    let entry = unsafe { Entry::load() }
        .context("Failed to load Vulkan library. Is Vulkan installed?")?;
    let instance = create_instance(&entry, false)?;

    let names = unsafe { instance.enumerate_physical_devices() }
        .context("Failed to enumerate adapters")
        .map(|adapters| {
            adapters
                .iter()
                .map(|&adapter| {
                    let props = unsafe { instance.get_physical_device_properties(adapter) };
                    adapter_name(&props)
                })
                .collect()
        });

    unsafe { instance.destroy_instance(None) };
    names
}

fn adapter_name(props: &vk::PhysicalDeviceProperties) -> String {
    unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn create_instance(entry: &Entry, enable_validation: bool) -> Result<ash::Instance> {
    if enable_validation && !validation_layer_available(entry)? {
        bail!("Validation layers requested but not available");
    }

    let app_name = CString::new(APP_NAME)?;
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&app_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extensions = Vec::new();
    let mut layers = Vec::new();
    if enable_validation {
        extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .context("Failed to create Vulkan instance")?;

    Ok(instance)
}

fn validation_layer_available(entry: &Entry) -> Result<bool> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .context("Failed to enumerate instance layers")?;

    Ok(layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER))
}

fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .context("Failed to create debug messenger")?;

    Ok((debug_utils, messenger))
}

/// Select an adapter and bring up the device, allocator and export pool.
///
/// The caller owns the instance and releases it if this fails; the logical
/// device created here is destroyed on the spot when a later step fails.
fn connect_adapter(
    config: &ProbeConfig,
    selected: Option<usize>,
    instance: &ash::Instance,
) -> Result<AdapterConnection> {
    let (physical_device, record) = pick_physical_device(instance, selected)?;
    let graphics_queue_family = record
        .graphics_queue_family
        .context("Selected adapter has no graphics queue")?;

    log::info!("Using {}", record.name);

    let (device, graphics_queue) =
        create_logical_device(instance, physical_device, graphics_queue_family)?;

    let device_setup = (|| -> Result<(Allocator, vk::Format, ExportPool)> {
        let allocator = create_allocator(instance, physical_device, &device)?;
        let image_format = config.image_format();
        let export_pool = create_export_pool(instance, physical_device, &device, image_format)?;
        Ok((allocator, image_format, export_pool))
    })();
    let (allocator, image_format, export_pool) = match device_setup {
        Ok(parts) => parts,
        Err(err) => {
            unsafe { device.destroy_device(None) };
            return Err(err);
        }
    };

    log::info!(
        "Export pool bound to memory type {} ({:?})",
        export_pool.memory_type_index,
        export_pool.handle_type
    );

    #[cfg(unix)]
    let external_memory = ash::extensions::khr::ExternalMemoryFd::new(instance, &device);
    #[cfg(windows)]
    let external_memory = ash::extensions::khr::ExternalMemoryWin32::new(instance, &device);

    Ok(AdapterConnection {
        record,
        physical_device,
        device,
        graphics_queue,
        graphics_queue_family,
        external_memory,
        allocator,
        export_pool,
        image_format,
    })
}

/// Snapshot the capabilities of every adapter, in enumeration order.
fn gather_capabilities(
    instance: &ash::Instance,
) -> Result<Vec<(vk::PhysicalDevice, CapabilityRecord)>> {
    let adapters = unsafe { instance.enumerate_physical_devices() }
        .context("Failed to enumerate adapters")?;

    if adapters.is_empty() {
        bail!("No Vulkan-capable adapter found");
    }

    adapters
        .into_iter()
        .map(|adapter| {
            let record = capability_record(instance, adapter)?;
            Ok((adapter, record))
        })
        .collect()
}

fn capability_record(
    instance: &ash::Instance,
    adapter: vk::PhysicalDevice,
) -> Result<CapabilityRecord> {
    let props = unsafe { instance.get_physical_device_properties(adapter) };
    let features = unsafe { instance.get_physical_device_features(adapter) };

    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(adapter) };
    let graphics_queue_family = queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32);

    let has_export_extensions =
        device_extensions_available(instance, adapter, &export_device_extensions())?;

    // bufferDeviceAddress sits behind the features2 query chain.
    let mut bda_features = vk::PhysicalDeviceBufferDeviceAddressFeatures::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::builder()
        .push_next(&mut bda_features)
        .build();
    unsafe { instance.get_physical_device_features2(adapter, &mut features2) };

    Ok(CapabilityRecord {
        name: adapter_name(&props),
        device_type: props.device_type,
        graphics_queue_family,
        has_export_extensions,
        supports_buffer_device_address: bda_features.buffer_device_address == vk::TRUE,
        supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    })
}

fn device_extensions_available(
    instance: &ash::Instance,
    adapter: vk::PhysicalDevice,
    requested: &[&CStr],
) -> Result<bool> {
    let available = unsafe { instance.enumerate_device_extension_properties(adapter) }
        .context("Failed to enumerate device extensions")?;

    Ok(requested.iter().all(|&wanted| {
        available
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == wanted)
    }))
}

fn pick_physical_device(
    instance: &ash::Instance,
    selected: Option<usize>,
) -> Result<(vk::PhysicalDevice, CapabilityRecord)> {
    let candidates = gather_capabilities(instance)?;

    if let Some(index) = selected {
        let Some((adapter, record)) = candidates.get(index) else {
            bail!(
                "Adapter index {index} out of range ({} adapters present)",
                candidates.len()
            );
        };
        if score_adapter(record) == 0 {
            bail!("Adapter '{}' is not a suitable GPU", record.name);
        }
        return Ok((*adapter, record.clone()));
    }

    let best = candidates
        .iter()
        .enumerate()
        .max_by_key(|(_, (_, record))| score_adapter(record))
        .filter(|(_, (_, record))| score_adapter(record) > 0);

    let Some((best_index, (adapter, record))) = best else {
        bail!("No suitable GPU found");
    };

    for (index, (_, other)) in candidates.iter().enumerate() {
        if index == best_index {
            continue;
        }
        if score_adapter(other) > 0 {
            log::info!("Rejected {} due to lower score", other.name);
        } else {
            log::info!("Rejected {} as not a suitable GPU", other.name);
        }
    }

    Ok((*adapter, record.clone()))
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priorities = [1.0];
    let queue_create_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&queue_priorities)
        .build();

    let extensions: Vec<*const std::os::raw::c_char> = export_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    };
    let mut bda_features = vk::PhysicalDeviceBufferDeviceAddressFeatures::builder()
        .buffer_device_address(true)
        .build();
    let mut features2 = vk::PhysicalDeviceFeatures2::builder()
        .features(features)
        .push_next(&mut bda_features)
        .build();

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extensions)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .context("Failed to create logical device")?;

    let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

    Ok((device, graphics_queue))
}

fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
) -> Result<Allocator> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: true,
        allocation_sizes: Default::default(),
    })
    .context("Failed to create the memory allocator")?;

    Ok(allocator)
}

/// Usage the representative pool image is created with; matches what the
/// scenario images request.
const POOL_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::SAMPLED.as_raw(),
);

/// Resolve the single memory type the export pool is restricted to.
///
/// A 1x1 probe image with the export declaration attached stands in for every
/// image the pool will serve; it is destroyed again as soon as its memory
/// requirements are known.
fn create_export_pool(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    format: vk::Format,
) -> Result<ExportPool> {
    let mut external_info = vk::ExternalMemoryImageCreateInfo::builder()
        .handle_types(EXPORT_HANDLE_TYPE)
        .build();
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: 1,
            height: 1,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(POOL_IMAGE_USAGE)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .push_next(&mut external_info);

    let probe = unsafe { device.create_image(&image_info, None) }
        .context("Failed to create the pool probe image")?;
    let requirements = unsafe { device.get_image_memory_requirements(probe) };
    unsafe { device.destroy_image(probe, None) };

    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };
    let memory_type_index = find_memory_type(
        &memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )
    .or_else(|| {
        find_memory_type(
            &memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::empty(),
        )
    })
    .context("No memory type can back exportable images")?;

    Ok(ExportPool {
        memory_type_index,
        handle_type: EXPORT_HANDLE_TYPE,
    })
}

/// First memory type within `type_filter` carrying all of `properties`.
fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        has_type && has_properties
    })
}

// Validation layer output goes through the normal logger.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable_record(device_type: vk::PhysicalDeviceType) -> CapabilityRecord {
        CapabilityRecord {
            name: "test adapter".to_string(),
            device_type,
            graphics_queue_family: Some(0),
            has_export_extensions: true,
            supports_buffer_device_address: true,
            supports_sampler_anisotropy: true,
        }
    }

    #[test]
    fn discrete_outranks_integrated() {
        let discrete = score_adapter(&capable_record(vk::PhysicalDeviceType::DISCRETE_GPU));
        let integrated = score_adapter(&capable_record(vk::PhysicalDeviceType::INTEGRATED_GPU));

        assert!(discrete > integrated);
        assert!(integrated > 0);
    }

    #[test]
    fn software_adapters_are_rejected_even_when_capable() {
        // A CPU or virtual implementation never qualifies, no matter how
        // complete its feature set is.
        for device_type in [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
            vk::PhysicalDeviceType::OTHER,
        ] {
            assert_eq!(score_adapter(&capable_record(device_type)), 0);
        }
    }

    #[test]
    fn missing_mandatory_capability_disqualifies() {
        let base = capable_record(vk::PhysicalDeviceType::DISCRETE_GPU);

        let mut no_queue = base.clone();
        no_queue.graphics_queue_family = None;
        assert_eq!(score_adapter(&no_queue), 0);

        let mut no_export = base.clone();
        no_export.has_export_extensions = false;
        assert_eq!(score_adapter(&no_export), 0);

        let mut no_bda = base.clone();
        no_bda.supports_buffer_device_address = false;
        assert_eq!(score_adapter(&no_bda), 0);

        let mut no_aniso = base;
        no_aniso.supports_sampler_anisotropy = false;
        assert_eq!(score_adapter(&no_aniso), 0);
    }

    #[test]
    fn memory_type_lookup_respects_filter_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = 3;
        props.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE,
            heap_index: 0,
        };
        props.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 1,
        };
        props.memory_types[2] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 1,
        };

        // All types allowed: the first device-local type wins.
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
        // Type 1 filtered out: the next device-local type is taken.
        assert_eq!(
            find_memory_type(&props, 0b101, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(2)
        );
        // Nothing matches.
        assert_eq!(
            find_memory_type(&props, 0b001, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }
}
