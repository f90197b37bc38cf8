use std::sync::Arc;

use ash::vk;
use log::trace;

use crate::*;

/// An image and the layout its contents are believed to be in.
#[derive(Debug)]
pub struct Image {
    device: Arc<Device>,
    inner: vk::Image,
    ty: vk::ImageType,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    usage: vk::ImageUsageFlags,
    tiling: vk::ImageTiling,
    layout: vk::ImageLayout,
    memory: Vec<DeviceMemory>,
}

impl Drop for Image {
    fn drop(&mut self) {
        trace!("Image::drop({:?})", self.inner);
        unsafe { self.device.table().destroy_image(self.inner, None); }
    }
}

pub fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT
            | vk::Format::X8_D24_UNORM_PACK32 =>
            vk::ImageAspectFlags::DEPTH,
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT =>
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// A sensible create info for a single-sampled, optimally tiled 2D
/// image.
pub fn image_2d_info(
    format: vk::Format,
    width: u32,
    height: u32,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo {
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D { width, height, depth: 1 },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}

impl Image {
    pub fn new(
        device: Arc<Device>,
        info: &vk::ImageCreateInfo,
        mem_flags: vk::MemoryPropertyFlags,
    ) -> HarnessResult<Self> {
        let mut image = Self::init_no_mem(device, info)?;
        let reqs = image.memory_requirements();
        let memory = DeviceMemory::for_requirements(
            Arc::clone(&image.device), &reqs, mem_flags)?;
        image.bind_memory(memory, 0)?;
        Ok(image)
    }

    pub fn init_no_mem(device: Arc<Device>, info: &vk::ImageCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_image(info, None)? };
        Ok(Self {
            device,
            inner,
            ty: info.image_type,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            usage: info.usage,
            tiling: info.tiling,
            layout: info.initial_layout,
            memory: Vec::new(),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn handle(&self) -> vk::Image {
        self.inner
    }

    pub fn ty(&self) -> vk::ImageType {
        self.ty
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    pub fn tiling(&self) -> vk::ImageTiling {
        self.tiling
    }

    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe {
            self.device.table().get_image_memory_requirements(self.inner)
        }
    }

    pub fn bind_memory(
        &mut self,
        memory: DeviceMemory,
        offset: vk::DeviceSize,
    ) -> HarnessResult<()> {
        let res = unsafe {
            self.device.table()
                .bind_image_memory(self.inner, memory.handle(), offset)
        };
        self.memory.push(memory);
        Ok(res?)
    }

    pub fn memory(&self) -> Option<&DeviceMemory> {
        self.memory.first()
    }

    /// The layout the image is believed to be in.
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Records a layout change made by means the wrapper can't see.
    pub fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }

    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_mask(self.format),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// A whole-image barrier from the current layout to `new_layout`.
    /// The shadow layout is updated, so the barrier must be recorded.
    pub fn barrier(
        &mut self,
        new_layout: vk::ImageLayout,
        src_access_mask: vk::AccessFlags,
        dst_access_mask: vk::AccessFlags,
    ) -> vk::ImageMemoryBarrier {
        let barrier =
            self.layout_barrier(new_layout, src_access_mask, dst_access_mask);
        self.layout = new_layout;
        barrier
    }

    /// Like `barrier`, but leaves the shadow layout alone.
    pub fn layout_barrier(
        &self,
        new_layout: vk::ImageLayout,
        src_access_mask: vk::AccessFlags,
        dst_access_mask: vk::AccessFlags,
    ) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier {
            src_access_mask,
            dst_access_mask,
            old_layout: self.layout,
            new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.inner,
            subresource_range: self.subresource_range(),
            ..Default::default()
        }
    }

    /// Transitions the image on the pool's queue and waits for it. The
    /// shadow layout changes only once the submission completes.
    pub fn transition_now(
        &mut self,
        pool: &Arc<CommandPool>,
        new_layout: vk::ImageLayout,
    ) -> HarnessResult<()> {
        let barrier = self.layout_barrier(
            new_layout,
            vk::AccessFlags::empty(),
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        );
        let mut cmds = CommandBuffer::new(pool, vk::CommandBufferLevel::PRIMARY)?;
        cmds.begin_with(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        cmds.pipeline_barrier(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &[],
            &[barrier],
        );
        cmds.end()?;
        cmds.submit_and_wait()?;
        self.layout = new_layout;
        Ok(())
    }

    /// A view of the whole image.
    pub fn create_view(&self) -> HarnessResult<ImageView> {
        let view_type = match (self.ty, self.array_layers) {
            (vk::ImageType::TYPE_1D, 1) => vk::ImageViewType::TYPE_1D,
            (vk::ImageType::TYPE_1D, _) => vk::ImageViewType::TYPE_1D_ARRAY,
            (vk::ImageType::TYPE_3D, _) => vk::ImageViewType::TYPE_3D,
            (_, 1) => vk::ImageViewType::TYPE_2D,
            _ => vk::ImageViewType::TYPE_2D_ARRAY,
        };
        let info = vk::ImageViewCreateInfo {
            image: self.inner,
            view_type,
            format: self.format,
            subresource_range: self.subresource_range(),
            ..Default::default()
        };
        ImageView::new(Arc::clone(&self.device), &info)
    }
}

device_object! {
    pub struct ImageView(vk::ImageView) => destroy_image_view;
}

impl ImageView {
    pub fn new(device: Arc<Device>, info: &vk::ImageViewCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_image_view(info, None)? };
        Ok(Self { device, inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspects() {
        assert_eq!(aspect_mask(vk::Format::B8G8R8A8_UNORM),
            vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_mask(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
    }
}
