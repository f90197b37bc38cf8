//! Device-level entry points: object creation, destruction and binding.
use ash::vk::{self, Handle};
use log::{debug, trace};

use super::driver::*;
use super::report::Diagnostic;
use super::rules::{self, Violation};
use crate::util::slice;

macro_rules! device_or_return {
    ($device:expr) => {
        device_or_return!($device, ())
    };
    ($device:expr, $ret:expr) => {
        match DRIVER.device($device.as_raw()) {
            Some(device) => device,
            None => return $ret,
        }
    };
}

macro_rules! device_or_fail {
    ($device:expr) => {
        device_or_return!($device, vk::Result::ERROR_DEVICE_LOST)
    };
}

pub(super) fn errors<H: Handle + Copy>(object: H, violations: Vec<Violation>) ->
    Vec<Diagnostic>
{
    violations.into_iter()
        .map(|(id, msg)| Diagnostic::error(id, object, msg))
        .collect()
}

/// Allocates a handle for a new object, records its state and reports
/// its creation.
pub(super) unsafe fn register<T: Handle>(
    device: &DeviceState,
    diags: &mut Vec<Diagnostic>,
    p_handle: *mut T,
    state: impl FnOnce(&mut Objects, u64),
) -> u64 {
    let handle = DRIVER.new_handle();
    {
        let mut objects = device.objects.lock();
        objects.track(T::TYPE, handle);
        state(&mut objects, handle);
    }
    trace!("sim: create {:?} 0x{:x}", T::TYPE, handle);
    diags.push(Diagnostic::tracker("CREATE", T::TYPE, handle));
    *p_handle = T::from_raw(handle);
    handle
}

/// Forgets a destroyed object and reports its destruction. Unknown and
/// null handles are ignored.
pub(super) fn unregister<T: Handle>(
    device: &DeviceState,
    object: T,
    forget: impl FnOnce(&mut Objects, u64),
) {
    let handle = object.as_raw();
    if handle == 0 {
        return;
    }
    {
        let mut objects = device.objects.lock();
        if !objects.live.iter().any(|&(h, _)| h == handle) {
            return;
        }
        objects.untrack(handle);
        forget(&mut objects, handle);
    }
    trace!("sim: destroy {:?} 0x{:x}", T::TYPE, handle);
    device.emit(vec![Diagnostic::tracker("DESTROY", T::TYPE, handle)]);
}

fn stateless(_: &mut Objects, _: u64) {}

pub(super) unsafe extern "system" fn destroy_device(
    device: vk::Device,
    _: *const vk::AllocationCallbacks,
) {
    let state = match DRIVER.remove_device(device.as_raw()) {
        Some(state) => state,
        None => return,
    };
    state.instance.devices.lock().retain(|&d| d != state.handle);
    let leaks = std::mem::take(&mut state.objects.lock().live);
    let diags = leaks.iter().map(|&(handle, ty)| Diagnostic::error(
        "VUID-vkDestroyDevice-device-00378",
        device,
        format!(
            "OBJ ERROR : For VkDevice 0x{:x}, {} 0x{:x} has not been \
             destroyed.",
            state.handle, crate::object_type_name(ty), handle,
        ),
    )).collect();
    state.emit(diags);
    debug!("sim: destroyed device 0x{:x}", state.handle);
}

pub(super) unsafe extern "system" fn get_device_queue(
    device: vk::Device,
    queue_family_index: u32,
    queue_index: u32,
    p_queue: *mut vk::Queue,
) {
    let device = device_or_return!(device);
    let queue = device.queues.iter()
        .find(|q| q.family == queue_family_index && q.index == queue_index);
    *p_queue = match queue {
        Some(queue) => vk::Queue::from_raw(queue.handle),
        None => vk::Queue::null(),
    };
}

pub(super) unsafe extern "system" fn device_wait_idle(device: vk::Device) ->
    vk::Result
{
    device_or_fail!(device);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn allocate_memory(
    device: vk::Device,
    p_allocate_info: *const vk::MemoryAllocateInfo,
    _: *const vk::AllocationCallbacks,
    p_memory: *mut vk::DeviceMemory,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_allocate_info;
    let mut diags = errors(
        vk::Device::from_raw(device.handle),
        rules::allocate_memory(info, &device.gpu()),
    );
    let state = MemoryState {
        size: info.allocation_size,
        type_index: info.memory_type_index,
    };
    register(&device, &mut diags, p_memory, |objects, handle| {
        objects.memory.insert(handle, state);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn free_memory(
    device: vk::Device,
    memory: vk::DeviceMemory,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, memory, |objects, handle| {
        objects.memory.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn create_buffer(
    device: vk::Device,
    p_create_info: *const vk::BufferCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_buffer: *mut vk::Buffer,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_create_info;
    let family_count = device.gpu().family_count();
    let mut diags = errors(
        vk::Device::from_raw(device.handle),
        rules::buffer(info, family_count),
    );
    let state = BufferState {
        size: info.size,
        usage: info.usage,
        concurrent: info.sharing_mode == vk::SharingMode::CONCURRENT,
        memory: None,
    };
    register(&device, &mut diags, p_buffer, |objects, handle| {
        objects.buffers.insert(handle, state);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_buffer(
    device: vk::Device,
    buffer: vk::Buffer,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, buffer, |objects, handle| {
        objects.buffers.remove(&handle);
        objects.forget_resource(handle);
    });
}

pub(super) unsafe extern "system" fn get_buffer_memory_requirements(
    device: vk::Device,
    buffer: vk::Buffer,
    p_requirements: *mut vk::MemoryRequirements,
) {
    let device = device_or_return!(device);
    let state = device.objects.lock().buffers.get(&buffer.as_raw()).copied();
    *p_requirements = state.map(|b| rules::buffer_requirements(&b))
        .unwrap_or_default();
}

const BIND_BUFFER_IDS: [&str; 4] = [
    "VUID-vkBindBufferMemory-buffer-01029",
    "VUID-vkBindBufferMemory-memoryOffset-01036",
    "VUID-vkBindBufferMemory-size-01037",
    "VUID-vkBindBufferMemory-memory-01035",
];

const BIND_IMAGE_IDS: [&str; 4] = [
    "VUID-vkBindImageMemory-image-01044",
    "VUID-vkBindImageMemory-memoryOffset-01048",
    "VUID-vkBindImageMemory-size-01049",
    "VUID-vkBindImageMemory-memory-01047",
];

pub(super) unsafe extern "system" fn bind_buffer_memory(
    device: vk::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    memory_offset: vk::DeviceSize,
) -> vk::Result {
    let device = device_or_fail!(device);
    let violations = {
        let mut objects = device.objects.lock();
        let mem = match objects.memory.get(&memory.as_raw()) {
            Some(&mem) => mem,
            None => return vk::Result::ERROR_UNKNOWN,
        };
        let state = match objects.buffers.get_mut(&buffer.as_raw()) {
            Some(state) => state,
            None => return vk::Result::ERROR_UNKNOWN,
        };
        let violations = rules::bind_memory(
            BIND_BUFFER_IDS,
            "Buffer",
            state.memory.is_some(),
            rules::buffer_requirements(state),
            &mem,
            memory_offset,
        );
        if state.memory.is_none() {
            state.memory = Some(memory.as_raw());
        }
        violations
    };
    device.emit(errors(buffer, violations));
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn create_buffer_view(
    device: vk::Device,
    p_create_info: *const vk::BufferViewCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_view: *mut vk::BufferView,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_create_info;
    let buffer = device.objects.lock().buffers.get(&info.buffer.as_raw())
        .copied();
    let violations = match buffer {
        Some(buffer) => rules::buffer_view(info, &buffer, &device.gpu()),
        None => Vec::new(),
    };
    let mut diags = errors(info.buffer, violations);
    let buffer = info.buffer.as_raw();
    register(&device, &mut diags, p_view, |objects, handle| {
        objects.buffer_views.insert(handle, buffer);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_buffer_view(
    device: vk::Device,
    view: vk::BufferView,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, view, |objects, handle| {
        objects.buffer_views.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn create_image(
    device: vk::Device,
    p_create_info: *const vk::ImageCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_image: *mut vk::Image,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_create_info;
    let violations = rules::image(info, &device.gpu());
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    let state = ImageState {
        format: info.format,
        extent: info.extent,
        mip_levels: info.mip_levels,
        array_layers: info.array_layers,
        tiling: info.tiling,
        usage: info.usage,
        mutable_format: info.flags
            .contains(vk::ImageCreateFlags::MUTABLE_FORMAT),
        concurrent: info.sharing_mode == vk::SharingMode::CONCURRENT,
        memory: None,
        layout: info.initial_layout,
    };
    register(&device, &mut diags, p_image, |objects, handle| {
        objects.images.insert(handle, state);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_image(
    device: vk::Device,
    image: vk::Image,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, image, |objects, handle| {
        objects.images.remove(&handle);
        objects.forget_resource(handle);
    });
}

pub(super) unsafe extern "system" fn get_image_memory_requirements(
    device: vk::Device,
    image: vk::Image,
    p_requirements: *mut vk::MemoryRequirements,
) {
    let device = device_or_return!(device);
    let state = device.objects.lock().images.get(&image.as_raw()).copied();
    *p_requirements = state.map(|i| rules::image_requirements(&i))
        .unwrap_or_default();
}

pub(super) unsafe extern "system" fn bind_image_memory(
    device: vk::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    memory_offset: vk::DeviceSize,
) -> vk::Result {
    let device = device_or_fail!(device);
    let violations = {
        let mut objects = device.objects.lock();
        let mem = match objects.memory.get(&memory.as_raw()) {
            Some(&mem) => mem,
            None => return vk::Result::ERROR_UNKNOWN,
        };
        let state = match objects.images.get_mut(&image.as_raw()) {
            Some(state) => state,
            None => return vk::Result::ERROR_UNKNOWN,
        };
        let violations = rules::bind_memory(
            BIND_IMAGE_IDS,
            "Image",
            state.memory.is_some(),
            rules::image_requirements(state),
            &mem,
            memory_offset,
        );
        if state.memory.is_none() {
            state.memory = Some(memory.as_raw());
        }
        violations
    };
    device.emit(errors(image, violations));
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn create_image_view(
    device: vk::Device,
    p_create_info: *const vk::ImageViewCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_view: *mut vk::ImageView,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_create_info;
    let image = device.objects.lock().images.get(&info.image.as_raw()).copied();
    let violations = match image {
        Some(image) => rules::image_view(info, &image, &device.gpu()),
        None => Vec::new(),
    };
    let mut diags = errors(info.image, violations);
    register(&device, &mut diags, p_view, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_image_view(
    device: vk::Device,
    view: vk::ImageView,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, view, stateless);
}

pub(super) unsafe extern "system" fn create_sampler(
    device: vk::Device,
    p_create_info: *const vk::SamplerCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_sampler: *mut vk::Sampler,
) -> vk::Result {
    let device = device_or_fail!(device);
    let violations = rules::sampler(
        &*p_create_info,
        &device.features,
        &device.gpu().properties.limits,
    );
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_sampler, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_sampler(
    device: vk::Device,
    sampler: vk::Sampler,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, sampler, stateless);
}

pub(super) unsafe extern "system" fn create_descriptor_set_layout(
    device: vk::Device,
    p_create_info: *const vk::DescriptorSetLayoutCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_layout: *mut vk::DescriptorSetLayout,
) -> vk::Result {
    let device = device_or_fail!(device);
    let (bindings, violations) = rules::descriptor_set_layout(&*p_create_info);
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_layout, |objects, handle| {
        objects.set_layouts.insert(handle, bindings);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_descriptor_set_layout(
    device: vk::Device,
    layout: vk::DescriptorSetLayout,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, layout, |objects, handle| {
        objects.set_layouts.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn create_descriptor_pool(
    device: vk::Device,
    p_create_info: *const vk::DescriptorPoolCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_pool: *mut vk::DescriptorPool,
) -> vk::Result {
    let device = device_or_fail!(device);
    let violations = rules::descriptor_pool(&*p_create_info);
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_pool, |objects, handle| {
        objects.descriptor_pools.insert(handle, Vec::new());
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

/// Frees every set allocated from `pool`, reporting each destruction.
fn release_pool_sets(device: &DeviceState, pool: u64) {
    let sets = match device.objects.lock().descriptor_pools.get_mut(&pool) {
        Some(sets) => std::mem::take(sets),
        None => return,
    };
    for &set in sets.iter().rev() {
        unregister(device, vk::DescriptorSet::from_raw(set), |objects, handle| {
            objects.descriptor_sets.remove(&handle);
        });
    }
}

pub(super) unsafe extern "system" fn destroy_descriptor_pool(
    device: vk::Device,
    pool: vk::DescriptorPool,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    release_pool_sets(&device, pool.as_raw());
    unregister(&device, pool, |objects, handle| {
        objects.descriptor_pools.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn reset_descriptor_pool(
    device: vk::Device,
    pool: vk::DescriptorPool,
    _: vk::DescriptorPoolResetFlags,
) -> vk::Result {
    let device = device_or_fail!(device);
    release_pool_sets(&device, pool.as_raw());
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn allocate_descriptor_sets(
    device: vk::Device,
    p_allocate_info: *const vk::DescriptorSetAllocateInfo,
    p_sets: *mut vk::DescriptorSet,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_allocate_info;
    let pool = info.descriptor_pool.as_raw();
    if !device.objects.lock().descriptor_pools.contains_key(&pool) {
        return vk::Result::ERROR_UNKNOWN;
    }
    let layouts = slice(info.p_set_layouts, info.descriptor_set_count);
    let mut diags = Vec::new();
    for (i, layout) in layouts.iter().enumerate() {
        let layout = layout.as_raw();
        register(&device, &mut diags, p_sets.add(i), |objects, handle| {
            objects.descriptor_sets.insert(handle, layout);
            if let Some(sets) = objects.descriptor_pools.get_mut(&pool) {
                sets.push(handle);
            }
        });
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn free_descriptor_sets(
    device: vk::Device,
    pool: vk::DescriptorPool,
    count: u32,
    p_sets: *const vk::DescriptorSet,
) -> vk::Result {
    let device = device_or_fail!(device);
    for &set in slice(p_sets, count) {
        unregister(&device, set, |objects, handle| {
            objects.descriptor_sets.remove(&handle);
            if let Some(sets) = objects.descriptor_pools.get_mut(&pool.as_raw()) {
                sets.retain(|&s| s != handle);
            }
        });
    }
    vk::Result::SUCCESS
}

fn is_uniform(ty: vk::DescriptorType) -> bool {
    ty == vk::DescriptorType::UNIFORM_BUFFER
        || ty == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
}

fn is_storage(ty: vk::DescriptorType) -> bool {
    ty == vk::DescriptorType::STORAGE_BUFFER
        || ty == vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
}

unsafe fn check_write(
    write: &vk::WriteDescriptorSet,
    objects: &Objects,
    limits: &vk::PhysicalDeviceLimits,
) -> Vec<Violation> {
    let mut out: Vec<Violation> = Vec::new();
    let layout = objects.descriptor_sets.get(&write.dst_set.as_raw())
        .and_then(|layout| objects.set_layouts.get(layout));
    let bindings = match layout {
        Some(bindings) => bindings,
        None => return out,
    };
    let binding = match bindings.iter().find(|b| b.binding == write.dst_binding) {
        Some(binding) => binding,
        None => {
            out.push((
                "VUID-VkWriteDescriptorSet-dstBinding-00315",
                format!(
                    "vkUpdateDescriptorSets(): descriptor set 0x{:x} does not \
                     have binding {}.",
                    write.dst_set.as_raw(), write.dst_binding,
                ),
            ));
            return out;
        },
    };
    let ty = write.descriptor_type;
    if binding.ty != ty {
        out.push((
            "VUID-VkWriteDescriptorSet-descriptorType-00319",
            format!(
                "vkUpdateDescriptorSets(): write type {:?} does not match \
                 binding {} of type {:?}.",
                ty, binding.binding, binding.ty,
            ),
        ));
        return out;
    }

    if is_uniform(ty) || is_storage(ty) {
        let (usage, usage_id, align, align_id) = if is_uniform(ty) {
            (
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "VUID-VkWriteDescriptorSet-descriptorType-00330",
                limits.min_uniform_buffer_offset_alignment,
                "VUID-VkWriteDescriptorSet-descriptorType-00327",
            )
        } else {
            (
                vk::BufferUsageFlags::STORAGE_BUFFER,
                "VUID-VkWriteDescriptorSet-descriptorType-00331",
                limits.min_storage_buffer_offset_alignment,
                "VUID-VkWriteDescriptorSet-descriptorType-00328",
            )
        };
        for info in slice(write.p_buffer_info, write.descriptor_count) {
            let buffer = match objects.buffers.get(&info.buffer.as_raw()) {
                Some(buffer) => buffer,
                None => continue,
            };
            if !buffer.usage.contains(usage) {
                out.push((usage_id, format!(
                    "vkUpdateDescriptorSets(): buffer 0x{:x} lacks {:?} usage \
                     required by {:?} descriptors.",
                    info.buffer.as_raw(), usage, ty,
                )));
            }
            if align != 0 && info.offset % align != 0 {
                out.push((align_id, format!(
                    "vkUpdateDescriptorSets(): offset ({}) is not a multiple \
                     of the minimum offset alignment ({}).",
                    info.offset, align,
                )));
            }
            if info.offset >= buffer.size {
                out.push(("VUID-VkDescriptorBufferInfo-offset-00340", format!(
                    "vkUpdateDescriptorSets(): offset ({}) is not less than \
                     the buffer size ({}).",
                    info.offset, buffer.size,
                )));
            }
            if info.range != vk::WHOLE_SIZE {
                if info.range == 0 {
                    out.push(("VUID-VkDescriptorBufferInfo-range-00341",
                        "vkUpdateDescriptorSets(): range must be greater \
                         than 0.".to_owned()));
                } else if info.offset.saturating_add(info.range) > buffer.size {
                    out.push(("VUID-VkDescriptorBufferInfo-range-00342", format!(
                        "vkUpdateDescriptorSets(): offset ({}) plus range ({}) \
                         exceeds the buffer size ({}).",
                        info.offset, info.range, buffer.size,
                    )));
                }
            }
        }
    }

    let texel = [
        (
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
            "VUID-VkWriteDescriptorSet-descriptorType-00334",
        ),
        (
            vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
            "VUID-VkWriteDescriptorSet-descriptorType-00335",
        ),
    ];
    for &(texel_ty, usage, id) in texel.iter() {
        if ty != texel_ty {
            continue;
        }
        for view in slice(write.p_texel_buffer_view, write.descriptor_count) {
            let usage_ok = objects.buffer_views.get(&view.as_raw())
                .and_then(|buffer| objects.buffers.get(buffer))
                .map_or(true, |buffer| buffer.usage.contains(usage));
            if !usage_ok {
                out.push((id, format!(
                    "vkUpdateDescriptorSets(): buffer view 0x{:x} was created \
                     on a buffer without {:?} usage.",
                    view.as_raw(), usage,
                )));
            }
        }
    }
    out
}

pub(super) unsafe extern "system" fn update_descriptor_sets(
    device: vk::Device,
    write_count: u32,
    p_writes: *const vk::WriteDescriptorSet,
    _copy_count: u32,
    _p_copies: *const vk::CopyDescriptorSet,
) {
    let device = device_or_return!(device);
    let limits = device.gpu().properties.limits;
    let mut diags = Vec::new();
    {
        let objects = device.objects.lock();
        for write in slice(p_writes, write_count) {
            diags.extend(errors(write.dst_set, check_write(write, &objects, &limits)));
        }
    }
    device.emit(diags);
}

pub(super) unsafe extern "system" fn create_pipeline_layout(
    device: vk::Device,
    p_create_info: *const vk::PipelineLayoutCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_layout: *mut vk::PipelineLayout,
) -> vk::Result {
    let device = device_or_fail!(device);
    let violations = rules::pipeline_layout(
        &*p_create_info,
        &device.gpu().properties.limits,
    );
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_layout, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_pipeline_layout(
    device: vk::Device,
    layout: vk::PipelineLayout,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, layout, stateless);
}

pub(super) unsafe extern "system" fn create_shader_module(
    device: vk::Device,
    p_create_info: *const vk::ShaderModuleCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_module: *mut vk::ShaderModule,
) -> vk::Result {
    let device = device_or_fail!(device);
    let (points, violations) = rules::shader_module(&*p_create_info);
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_module, |objects, handle| {
        objects.shaders.insert(handle, points);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_shader_module(
    device: vk::Device,
    module: vk::ShaderModule,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, module, |objects, handle| {
        objects.shaders.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn create_pipeline_cache(
    device: vk::Device,
    _: *const vk::PipelineCacheCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_cache: *mut vk::PipelineCache,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut diags = Vec::new();
    register(&device, &mut diags, p_cache, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_pipeline_cache(
    device: vk::Device,
    cache: vk::PipelineCache,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, cache, stateless);
}

pub(super) unsafe extern "system" fn create_graphics_pipelines(
    device: vk::Device,
    _: vk::PipelineCache,
    count: u32,
    p_create_infos: *const vk::GraphicsPipelineCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_pipelines: *mut vk::Pipeline,
) -> vk::Result {
    let device = device_or_fail!(device);
    let limits = device.gpu().properties.limits;
    let mut diags = Vec::new();
    for (i, info) in slice(p_create_infos, count).iter().enumerate() {
        let violations = {
            let objects = device.objects.lock();
            rules::graphics_pipeline(info, &device.features, &limits, &objects)
        };
        diags.extend(errors(vk::Device::from_raw(device.handle), violations));
        register(&device, &mut diags, p_pipelines.add(i), stateless);
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn create_compute_pipelines(
    device: vk::Device,
    _: vk::PipelineCache,
    count: u32,
    p_create_infos: *const vk::ComputePipelineCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_pipelines: *mut vk::Pipeline,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut diags = Vec::new();
    for (i, info) in slice(p_create_infos, count).iter().enumerate() {
        let violations = {
            let objects = device.objects.lock();
            rules::compute_pipeline(info, &objects)
        };
        diags.extend(errors(vk::Device::from_raw(device.handle), violations));
        register(&device, &mut diags, p_pipelines.add(i), stateless);
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn create_ray_tracing_pipelines(
    device: vk::Device,
    _: vk::DeferredOperationKHR,
    _: vk::PipelineCache,
    count: u32,
    p_create_infos: *const vk::RayTracingPipelineCreateInfoKHR,
    _: *const vk::AllocationCallbacks,
    p_pipelines: *mut vk::Pipeline,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut diags = Vec::new();
    for (i, info) in slice(p_create_infos, count).iter().enumerate() {
        let violations = {
            let objects = device.objects.lock();
            rules::ray_tracing_pipeline(info, &objects)
        };
        diags.extend(errors(vk::Device::from_raw(device.handle), violations));
        register(&device, &mut diags, p_pipelines.add(i), stateless);
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_pipeline(
    device: vk::Device,
    pipeline: vk::Pipeline,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, pipeline, stateless);
}

pub(super) unsafe extern "system" fn create_render_pass(
    device: vk::Device,
    p_create_info: *const vk::RenderPassCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_pass: *mut vk::RenderPass,
) -> vk::Result {
    let device = device_or_fail!(device);
    let (state, violations) = rules::render_pass(&*p_create_info);
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_pass, |objects, handle| {
        objects.render_passes.insert(handle, state);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_render_pass(
    device: vk::Device,
    pass: vk::RenderPass,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, pass, |objects, handle| {
        objects.render_passes.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn create_framebuffer(
    device: vk::Device,
    p_create_info: *const vk::FramebufferCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_framebuffer: *mut vk::Framebuffer,
) -> vk::Result {
    let device = device_or_fail!(device);
    let violations = {
        let objects = device.objects.lock();
        rules::framebuffer(&*p_create_info, &objects)
    };
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_framebuffer, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_framebuffer(
    device: vk::Device,
    framebuffer: vk::Framebuffer,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, framebuffer, stateless);
}

pub(super) unsafe extern "system" fn create_fence(
    device: vk::Device,
    p_create_info: *const vk::FenceCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_fence: *mut vk::Fence,
) -> vk::Result {
    let device = device_or_fail!(device);
    let signaled = (*p_create_info).flags.contains(vk::FenceCreateFlags::SIGNALED);
    let mut diags = Vec::new();
    register(&device, &mut diags, p_fence, |objects, handle| {
        objects.fences.insert(handle, signaled);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_fence(
    device: vk::Device,
    fence: vk::Fence,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, fence, |objects, handle| {
        objects.fences.remove(&handle);
    });
}

pub(super) unsafe extern "system" fn reset_fences(
    device: vk::Device,
    count: u32,
    p_fences: *const vk::Fence,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut objects = device.objects.lock();
    for fence in slice(p_fences, count) {
        if let Some(signaled) = objects.fences.get_mut(&fence.as_raw()) {
            *signaled = false;
        }
    }
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn get_fence_status(
    device: vk::Device,
    fence: vk::Fence,
) -> vk::Result {
    let device = device_or_fail!(device);
    let objects = device.objects.lock();
    match objects.fences.get(&fence.as_raw()) {
        Some(true) => vk::Result::SUCCESS,
        Some(false) => vk::Result::NOT_READY,
        None => vk::Result::ERROR_UNKNOWN,
    }
}

pub(super) unsafe extern "system" fn wait_for_fences(
    device: vk::Device,
    count: u32,
    p_fences: *const vk::Fence,
    wait_all: vk::Bool32,
    _timeout: u64,
) -> vk::Result {
    let device = device_or_fail!(device);
    let objects = device.objects.lock();
    let mut states = slice(p_fences, count).iter()
        .map(|f| objects.fences.get(&f.as_raw()).copied().unwrap_or(false));
    let done = if wait_all == vk::TRUE {
        states.all(|s| s)
    } else {
        states.any(|s| s)
    };
    // Nothing is ever in flight, so an unsignaled fence never signals.
    if done { vk::Result::SUCCESS } else { vk::Result::TIMEOUT }
}

pub(super) unsafe extern "system" fn create_semaphore(
    device: vk::Device,
    _: *const vk::SemaphoreCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_semaphore: *mut vk::Semaphore,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut diags = Vec::new();
    register(&device, &mut diags, p_semaphore, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_semaphore(
    device: vk::Device,
    semaphore: vk::Semaphore,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, semaphore, stateless);
}

pub(super) unsafe extern "system" fn create_event(
    device: vk::Device,
    _: *const vk::EventCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_event: *mut vk::Event,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut diags = Vec::new();
    register(&device, &mut diags, p_event, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_event(
    device: vk::Device,
    event: vk::Event,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, event, stateless);
}

pub(super) unsafe extern "system" fn create_acceleration_structure(
    device: vk::Device,
    p_create_info: *const vk::AccelerationStructureCreateInfoKHR,
    _: *const vk::AllocationCallbacks,
    p_accel: *mut vk::AccelerationStructureKHR,
) -> vk::Result {
    let device = device_or_fail!(device);
    if !device.extensions.iter().any(|e| e == "VK_KHR_acceleration_structure") {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    }
    let info = &*p_create_info;
    let buffer = device.objects.lock().buffers.get(&info.buffer.as_raw())
        .copied();
    let violations = rules::acceleration_structure(info, buffer.as_ref());
    let mut diags = errors(vk::Device::from_raw(device.handle), violations);
    register(&device, &mut diags, p_accel, stateless);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_acceleration_structure(
    device: vk::Device,
    accel: vk::AccelerationStructureKHR,
    _: *const vk::AllocationCallbacks,
) {
    let device = device_or_return!(device);
    unregister(&device, accel, stateless);
}
