use std::sync::Arc;

use ash::vk;
use log::trace;

use crate::*;

#[derive(Debug)]
pub struct Buffer {
    device: Arc<Device>,
    inner: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    // Freed after the buffer is destroyed.
    memory: Vec<DeviceMemory>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        trace!("Buffer::drop({:?})", self.inner);
        unsafe { self.device.table().destroy_buffer(self.inner, None); }
    }
}

impl Buffer {
    /// Creates a buffer backed by memory with the given properties.
    pub fn new(
        device: Arc<Device>,
        info: &vk::BufferCreateInfo,
        mem_flags: vk::MemoryPropertyFlags,
    ) -> HarnessResult<Self> {
        let mut buffer = Self::init_no_mem(device, info)?;
        let reqs = buffer.memory_requirements();
        let memory = DeviceMemory::for_requirements(
            Arc::clone(&buffer.device), &reqs, mem_flags)?;
        buffer.bind_memory(memory, 0)?;
        Ok(buffer)
    }

    /// Creates an unbound buffer.
    pub fn init_no_mem(device: Arc<Device>, info: &vk::BufferCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_buffer(info, None)? };
        Ok(Self {
            device,
            inner,
            size: info.size,
            usage: info.usage,
            memory: Vec::new(),
        })
    }

    /// Shorthand for an exclusive, device-local buffer.
    pub fn with_usage(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> HarnessResult<Self> {
        let info = vk::BufferCreateInfo {
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        Self::new(device, &info, Default::default())
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn handle(&self) -> vk::Buffer {
        self.inner
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe {
            self.device.table().get_buffer_memory_requirements(self.inner)
        }
    }

    /// Binds `memory`, taking ownership of it even if binding fails.
    pub fn bind_memory(
        &mut self,
        memory: DeviceMemory,
        offset: vk::DeviceSize,
    ) -> HarnessResult<()> {
        let res = unsafe {
            self.device.table()
                .bind_buffer_memory(self.inner, memory.handle(), offset)
        };
        self.memory.push(memory);
        Ok(res?)
    }

    pub fn memory(&self) -> Option<&DeviceMemory> {
        self.memory.first()
    }

    pub fn descriptor_info(
        &self,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo { buffer: self.inner, offset, range }
    }

    /// A whole-buffer barrier without an ownership transfer.
    pub fn barrier(
        &self,
        src_access_mask: vk::AccessFlags,
        dst_access_mask: vk::AccessFlags,
    ) -> vk::BufferMemoryBarrier {
        vk::BufferMemoryBarrier {
            src_access_mask,
            dst_access_mask,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: self.inner,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        }
    }
}

device_object! {
    pub struct BufferView(vk::BufferView) => destroy_buffer_view;
}

impl BufferView {
    pub fn new(device: Arc<Device>, info: &vk::BufferViewCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_buffer_view(info, None)? };
        Ok(Self { device, inner })
    }
}
