use std::convert::TryFrom;
use std::sync::Arc;

use ash::vk;

use crate::*;

device_object! {
    pub struct Fence(vk::Fence) => destroy_fence;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitResult {
    Success,
    Timeout,
}

impl TryFrom<vk::Result> for WaitResult {
    type Error = vk::Result;
    fn try_from(res: vk::Result) -> Result<Self, Self::Error> {
        match res {
            vk::Result::SUCCESS => Ok(Self::Success),
            vk::Result::TIMEOUT => Ok(Self::Timeout),
            _ => Err(res),
        }
    }
}

impl From<WaitResult> for vk::Result {
    fn from(res: WaitResult) -> Self {
        match res {
            WaitResult::Success => Self::SUCCESS,
            WaitResult::Timeout => Self::TIMEOUT,
        }
    }
}

impl Fence {
    pub fn new(device: Arc<Device>, signaled: bool) -> HarnessResult<Self> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED }
            else { Default::default() };
        let create_info = vk::FenceCreateInfo { flags, ..Default::default() };
        let inner = unsafe { device.table().create_fence(&create_info, None)? };
        Ok(Self { device, inner })
    }

    pub fn wait_timeout(&self, timeout: u64) -> HarnessResult<WaitResult> {
        let res = unsafe {
            self.device.table().wait_for_fences(&[self.inner], false, timeout)
        };
        match res {
            Ok(()) => Ok(WaitResult::Success),
            Err(err) => Ok(WaitResult::try_from(err)?),
        }
    }

    pub fn wait(&self) -> HarnessResult<()> {
        match self.wait_timeout(u64::MAX)? {
            WaitResult::Success => Ok(()),
            WaitResult::Timeout => Err(vk::Result::TIMEOUT.into()),
        }
    }

    pub fn check_signaled(&self) -> HarnessResult<bool> {
        Ok(unsafe { self.device.table().get_fence_status(self.inner)? })
    }

    pub fn reset(&mut self) -> HarnessResult<()> {
        unsafe { self.device.table().reset_fences(&[self.inner])?; }
        Ok(())
    }
}

device_object! {
    pub struct Semaphore(vk::Semaphore) => destroy_semaphore;
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> HarnessResult<Self> {
        let create_info = Default::default();
        let inner =
            unsafe { device.table().create_semaphore(&create_info, None)? };
        Ok(Self { device, inner })
    }
}

device_object! {
    pub struct Event(vk::Event) => destroy_event;
}

impl Event {
    pub fn new(device: Arc<Device>) -> HarnessResult<Self> {
        let create_info = Default::default();
        let inner = unsafe { device.table().create_event(&create_info, None)? };
        Ok(Self { device, inner })
    }
}
