use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;
use derivative::Derivative;
use log::trace;

use crate::*;

pub const ACCELERATION_STRUCTURE_EXTENSION: &str =
    "VK_KHR_acceleration_structure";

/// An acceleration structure together with the buffer it lives in. The
/// buffer is destroyed after the structure.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AccelerationStructure {
    #[derivative(Debug = "ignore")]
    loader: khr::AccelerationStructure,
    inner: vk::AccelerationStructureKHR,
    buffer: Buffer,
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        trace!("AccelerationStructure::drop({:?})", self.inner);
        unsafe { self.loader.destroy_acceleration_structure(self.inner, None); }
    }
}

impl AccelerationStructure {
    /// Creates a structure in `buffer`. `info.buffer` is overwritten.
    pub fn new(
        buffer: Buffer,
        info: &vk::AccelerationStructureCreateInfoKHR,
    ) -> HarnessResult<Self> {
        let device = buffer.device();
        if !device.has_extension(ACCELERATION_STRUCTURE_EXTENSION) {
            return Err(Error::unsupported(format!(
                "{} not enabled", ACCELERATION_STRUCTURE_EXTENSION)));
        }
        let loader = khr::AccelerationStructure::new(
            device.instance().table(), device.table());
        let create_info = vk::AccelerationStructureCreateInfoKHR {
            buffer: buffer.handle(),
            ..*info
        };
        let inner = unsafe {
            loader.create_acceleration_structure(&create_info, None)?
        };
        Ok(Self { loader, inner, buffer })
    }

    /// Creates a structure filling a fresh buffer of `size` bytes.
    pub fn with_storage(
        device: Arc<Device>,
        ty: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
    ) -> HarnessResult<Self> {
        let usage = vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        let buffer = Buffer::with_usage(device, size, usage)?;
        let info = vk::AccelerationStructureCreateInfoKHR {
            ty,
            size,
            ..Default::default()
        };
        Self::new(buffer, &info)
    }

    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.inner
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}
