// Exportable image - one pooled 2D image whose backing memory is shared out
//
// Creation order: image -> allocation (export pool memory type) -> view ->
// sampler -> exported OS handle. Teardown runs in reverse and tolerates
// partially constructed state, so a failure halfway through construction
// still releases everything that exists.

use anyhow::{Context, Result};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::device::DeviceContext;
use super::handle::ExternalHandle;

pub struct ExportableImage {
    device: Arc<DeviceContext>,
    image: vk::Image,
    view: vk::ImageView,
    sampler: vk::Sampler,
    allocation: Option<Allocation>,
    external_handle: Option<ExternalHandle>,

    label: String,
    width: u32,
    height: u32,
}

impl ExportableImage {
    /// Allocate a `width` x `height` image from the export pool, give it a
    /// default view and sampler, and export the OS handle for its backing
    /// memory.
    pub fn new(
        device: Arc<DeviceContext>,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
        label: &str,
    ) -> Result<Self> {
        let mut image = Self {
            device,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: None,
            external_handle: None,
            label: label.to_string(),
            width,
            height,
        };

        image.create_image(usage)?;
        image.create_view()?;
        image.create_sampler()?;
        image.export_handle()?;

        Ok(image)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Raw value of the exported handle. Distinct backing allocations must
    /// never report the same value - the invariant this program probes.
    pub fn handle_value(&self) -> u64 {
        self.external_handle
            .as_ref()
            .map(ExternalHandle::raw_value)
            .unwrap_or(0)
    }

    fn create_image(&mut self, usage: vk::ImageUsageFlags) -> Result<()> {
        let pool = self.device.export_pool();

        let mut external_info = vk::ExternalMemoryImageCreateInfo::builder()
            .handle_types(pool.handle_type)
            .build();
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.device.image_format)
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .push_next(&mut external_info);

        self.image = unsafe { self.device.device.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create {}x{} image", self.width, self.height))?;
        self.device.set_debug_name(
            vk::ObjectType::IMAGE,
            self.image.as_raw(),
            &format!("{} image", self.label),
        );

        let mut requirements =
            unsafe { self.device.device.get_image_memory_requirements(self.image) };
        // Restricted to the pool's single memory type, so the allocation
        // lands in the pool's shared blocks.
        requirements.memory_type_bits &= pool.memory_type_bits();

        let allocation = self
            .device
            .allocator()
            .allocate(&AllocationCreateDesc {
                name: &self.label,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for {}", self.label))?;

        unsafe {
            self.device.device.bind_image_memory(
                self.image,
                allocation.memory(),
                allocation.offset(),
            )
        }
        .context("Failed to bind image memory")?;

        self.allocation = Some(allocation);
        Ok(())
    }

    fn create_view(&mut self) -> Result<()> {
        // Identity mapping, single mip level, single layer, color aspect.
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.device.image_format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        self.view = unsafe { self.device.device.create_image_view(&view_info, None) }
            .context("Failed to create image view")?;
        self.device.set_debug_name(
            vk::ObjectType::IMAGE_VIEW,
            self.view.as_raw(),
            &format!("{} view", self.label),
        );

        Ok(())
    }

    fn create_sampler(&mut self) -> Result<()> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);

        self.sampler = unsafe { self.device.device.create_sampler(&sampler_info, None) }
            .context("Failed to create sampler")?;
        self.device.set_debug_name(
            vk::ObjectType::SAMPLER,
            self.sampler.as_raw(),
            &format!("{} sampler", self.label),
        );

        Ok(())
    }

    fn export_handle(&mut self) -> Result<()> {
        let allocation = self
            .allocation
            .as_ref()
            .context("Image has no backing allocation")?;
        let memory = unsafe { allocation.memory() };

        let handle = self
            .device
            .export_memory_handle(memory)
            .with_context(|| format!("Failed to export the memory handle of {}", self.label))?;

        log::debug!(
            "{}: external handle {:#x} (device memory {:#x}, offset {})",
            self.label,
            handle.raw_value(),
            memory.as_raw(),
            allocation.offset()
        );

        self.external_handle = Some(handle);
        Ok(())
    }
}

impl Drop for ExportableImage {
    fn drop(&mut self) {
        let device = &self.device.device;

        unsafe {
            if self.sampler != vk::Sampler::null() {
                device.destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
        }

        if let Some(allocation) = self.allocation.take() {
            if let Err(err) = self.device.allocator().free(allocation) {
                log::warn!("Failed to free the allocation of {}: {err}", self.label);
            }
        }

        if self.image != vk::Image::null() {
            unsafe { device.destroy_image(self.image, None) };
        }
    }
}
