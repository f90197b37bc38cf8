//! Global driver state.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use ash::vk;
use fnv::{FnvHashMap, FnvHashSet};
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};

use super::report::{Callback, Diagnostic};

lazy_static! {
    pub(super) static ref DRIVER: Driver = Default::default();
}

/// Handle tables. Dispatchable children (physical devices, queues and
/// command buffers) map to their owner.
#[derive(Debug, Default)]
pub(super) struct Driver {
    next_handle: AtomicU64,
    instances: RwLock<FnvHashMap<u64, Arc<InstanceState>>>,
    gpus: RwLock<FnvHashMap<u64, Arc<InstanceState>>>,
    devices: RwLock<FnvHashMap<u64, Arc<DeviceState>>>,
    children: RwLock<FnvHashMap<u64, Arc<DeviceState>>>,
}

impl Driver {
    pub(super) fn new_handle(&self) -> u64 {
        0x1000 + self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn instance(&self, handle: u64) -> Option<Arc<InstanceState>> {
        self.instances.read().get(&handle).cloned()
    }

    pub(super) fn gpu(&self, handle: u64) -> Option<Arc<InstanceState>> {
        self.gpus.read().get(&handle).cloned()
    }

    pub(super) fn device(&self, handle: u64) -> Option<Arc<DeviceState>> {
        self.devices.read().get(&handle).cloned()
    }

    /// The device owning a queue or command buffer.
    pub(super) fn owner(&self, handle: u64) -> Option<Arc<DeviceState>> {
        self.children.read().get(&handle).cloned()
    }

    pub(super) fn add_instance(&self, instance: Arc<InstanceState>) {
        self.gpus.write().insert(instance.gpu_handle, Arc::clone(&instance));
        self.instances.write().insert(instance.handle, instance);
    }

    pub(super) fn remove_instance(&self, handle: u64) ->
        Option<Arc<InstanceState>>
    {
        let instance = self.instances.write().remove(&handle)?;
        self.gpus.write().remove(&instance.gpu_handle);
        Some(instance)
    }

    pub(super) fn add_device(&self, device: Arc<DeviceState>) {
        let mut children = self.children.write();
        for queue in device.queues.iter() {
            children.insert(queue.handle, Arc::clone(&device));
        }
        self.devices.write().insert(device.handle, device);
    }

    pub(super) fn remove_device(&self, handle: u64) -> Option<Arc<DeviceState>> {
        let device = self.devices.write().remove(&handle)?;
        self.children.write().retain(|_, owner| owner.handle != handle);
        Some(device)
    }

    pub(super) fn add_children(
        &self,
        device: &Arc<DeviceState>,
        handles: impl IntoIterator<Item = u64>,
    ) {
        let mut children = self.children.write();
        for handle in handles {
            children.insert(handle, Arc::clone(device));
        }
    }

    pub(super) fn remove_children(&self, handles: impl IntoIterator<Item = u64>) {
        let mut children = self.children.write();
        for handle in handles {
            children.remove(&handle);
        }
    }
}

/// The one physical device every instance exposes.
#[derive(Clone, Debug)]
pub(super) struct Gpu {
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub formats: FnvHashMap<vk::Format, vk::FormatProperties>,
    /// Formats as reported before any device-profile override.
    pub original_formats: FnvHashMap<vk::Format, vk::FormatProperties>,
}

impl Gpu {
    pub(super) fn format_properties(&self, format: vk::Format) ->
        vk::FormatProperties
    {
        self.formats.get(&format).copied().unwrap_or_default()
    }

    pub(super) fn family_count(&self) -> u32 {
        self.queue_families.len() as u32
    }
}

#[derive(Debug)]
pub(super) struct InstanceState {
    pub handle: u64,
    pub gpu_handle: u64,
    /// Whether the validation layer is enabled; without it no
    /// diagnostics are produced.
    pub validation: bool,
    pub device_profile: bool,
    pub extensions: Vec<String>,
    pub gpu: RwLock<Gpu>,
    pub callbacks: Mutex<Vec<Callback>>,
    pub devices: Mutex<Vec<u64>>,
}

impl InstanceState {
    pub(super) fn emit(&self, diags: Vec<Diagnostic>) {
        super::report::emit(self, diags);
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct QueueState {
    pub handle: u64,
    pub family: u32,
    pub index: u32,
}

#[derive(Debug)]
pub(super) struct DeviceState {
    pub handle: u64,
    pub instance: Arc<InstanceState>,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<String>,
    /// `VK_KHR_external_memory` widens the legal queue family indices
    /// in barriers.
    pub external_memory: bool,
    pub queues: Vec<QueueState>,
    pub objects: Mutex<Objects>,
    /// Thread currently inside a recording call, per command buffer.
    pub recorders: Mutex<FnvHashMap<u64, ThreadId>>,
}

impl DeviceState {
    pub(super) fn emit(&self, diags: Vec<Diagnostic>) {
        self.instance.emit(diags);
    }

    pub(super) fn gpu(&self) -> parking_lot::RwLockReadGuard<'_, Gpu> {
        self.instance.gpu.read()
    }

    pub(super) fn queue(&self, handle: u64) -> Option<QueueState> {
        self.queues.iter().find(|q| q.handle == handle).copied()
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct BufferState {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub concurrent: bool,
    pub memory: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct ImageState {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    /// Views may use a format other than `format`.
    pub mutable_format: bool,
    pub concurrent: bool,
    pub memory: Option<u64>,
    /// Layout as of the last completed submission.
    pub layout: vk::ImageLayout,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct MemoryState {
    pub size: vk::DeviceSize,
    pub type_index: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct LayoutBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct EntryPoint {
    pub model: u32,
    pub name: String,
}

#[derive(Clone, Debug)]
pub(super) struct RenderPassState {
    pub attachments: u32,
    /// Color attachment count of each subpass.
    pub subpass_colors: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Recording {
    Initial,
    Recording,
    Executable,
}

/// What makes two queue family ownership transfers the same transfer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(super) struct TransferKey {
    pub ty: vk::ObjectType,
    pub resource: u64,
    pub src: u32,
    pub dst: u32,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct LayoutChange {
    pub image: u64,
    pub old: vk::ImageLayout,
    pub new: vk::ImageLayout,
}

#[derive(Clone, Debug)]
pub(super) struct CommandBufferState {
    pub pool: u64,
    pub state: Recording,
    pub transfers: Vec<TransferKey>,
    pub layouts: Vec<LayoutChange>,
}

#[derive(Clone, Debug)]
pub(super) struct CommandPoolState {
    pub family: u32,
    pub flags: vk::CommandPoolCreateFlags,
    pub buffers: Vec<u64>,
}

#[derive(Debug, Default)]
pub(super) struct Objects {
    /// Live non-dispatchable objects and command buffers, in creation
    /// order.
    pub live: Vec<(u64, vk::ObjectType)>,
    pub buffers: FnvHashMap<u64, BufferState>,
    pub buffer_views: FnvHashMap<u64, u64>,
    pub images: FnvHashMap<u64, ImageState>,
    pub memory: FnvHashMap<u64, MemoryState>,
    pub set_layouts: FnvHashMap<u64, Vec<LayoutBinding>>,
    pub descriptor_pools: FnvHashMap<u64, Vec<u64>>,
    pub descriptor_sets: FnvHashMap<u64, u64>,
    pub shaders: FnvHashMap<u64, Vec<EntryPoint>>,
    pub render_passes: FnvHashMap<u64, RenderPassState>,
    pub command_pools: FnvHashMap<u64, CommandPoolState>,
    pub command_buffers: FnvHashMap<u64, CommandBufferState>,
    pub fences: FnvHashMap<u64, bool>,
    /// Releases submitted but not yet acquired.
    pub pending_releases: FnvHashSet<TransferKey>,
}

impl Objects {
    pub(super) fn track(&mut self, ty: vk::ObjectType, handle: u64) {
        self.live.push((handle, ty));
    }

    pub(super) fn untrack(&mut self, handle: u64) {
        self.live.retain(|&(h, _)| h != handle);
    }

    /// Forgets everything about a destroyed buffer or image.
    pub(super) fn forget_resource(&mut self, handle: u64) {
        self.pending_releases.retain(|key| key.resource != handle);
    }
}
