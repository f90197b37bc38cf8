use std::sync::Arc;

use ash::vk;
use log::trace;

use crate::*;

/// Picks the first memory type allowed by `type_bits` that has all of
/// `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    props.memory_types[..props.memory_type_count as usize].iter()
        .enumerate()
        .find(|(idx, ty)| type_bits & (1 << idx) != 0
            && ty.property_flags.contains(flags))
        .map(|(idx, _)| idx as u32)
}

#[derive(Debug)]
pub struct DeviceMemory {
    device: Arc<Device>,
    inner: vk::DeviceMemory,
    size: vk::DeviceSize,
    type_index: u32,
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        trace!("DeviceMemory::drop({:?})", self.inner);
        unsafe { self.device.table().free_memory(self.inner, None); }
    }
}

impl DeviceMemory {
    pub fn allocate(device: Arc<Device>, info: &vk::MemoryAllocateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().allocate_memory(info, None)? };
        Ok(Self {
            device,
            inner,
            size: info.allocation_size,
            type_index: info.memory_type_index,
        })
    }

    /// Allocates memory able to back a resource with the given
    /// requirements.
    pub fn for_requirements(
        device: Arc<Device>,
        reqs: &vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> HarnessResult<Self> {
        let type_index = find_memory_type(
            device.mem_props(), reqs.memory_type_bits, flags)
            .ok_or_else(|| Error::unsupported(format!(
                "no memory type with {:?} in {:#b}",
                flags, reqs.memory_type_bits,
            )))?;
        let info = vk::MemoryAllocateInfo {
            allocation_size: reqs.size,
            memory_type_index: type_index,
            ..Default::default()
        };
        Self::allocate(device, &info)
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn handle(&self) -> vk::DeviceMemory {
        self.inner
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn type_index(&self) -> u32 {
        self.type_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        props.memory_types[0].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;
        props
    }

    #[test]
    fn type_selection() {
        let props = props();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(find_memory_type(&props, 0b11, Default::default()), Some(0));
        assert_eq!(find_memory_type(&props, 0b11, host), Some(1));
        assert_eq!(find_memory_type(&props, 0b01, host), None);
        assert_eq!(find_memory_type(&props, 0b100, Default::default()), None);
    }
}
