//! Command pools, command buffers and queue submission.
use std::thread::{self, ThreadId};

use ash::vk::{self, Handle};
use log::trace;

use super::device::{errors, register, unregister};
use super::driver::*;
use super::report::Diagnostic;
use super::rules::{self, FamilyRules};
use crate::util::slice;

const THREADING_ID: &str = "UNASSIGNED-Threading-MultipleThreads";
const DOUBLE_RELEASE_ID: &str = "BarrierDoubleRelease";
const INVALID_FAMILY_ID: &str =
    "UNASSIGNED-CoreValidation-DrawState-InvalidQueueFamily";
const INVALID_LAYOUT_ID: &str =
    "UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout";

macro_rules! owner_or_return {
    ($handle:expr, $ret:expr) => {
        match DRIVER.owner($handle.as_raw()) {
            Some(device) => device,
            None => return $ret,
        }
    };
}

macro_rules! device_or_fail {
    ($device:expr) => {
        match DRIVER.device($device.as_raw()) {
            Some(device) => device,
            None => return vk::Result::ERROR_DEVICE_LOST,
        }
    };
}

pub(super) unsafe extern "system" fn create_command_pool(
    device: vk::Device,
    p_create_info: *const vk::CommandPoolCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_pool: *mut vk::CommandPool,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_create_info;
    let state = CommandPoolState {
        family: info.queue_family_index,
        flags: info.flags,
        buffers: Vec::new(),
    };
    let mut diags = Vec::new();
    register(&device, &mut diags, p_pool, |objects, handle| {
        objects.command_pools.insert(handle, state);
    });
    device.emit(diags);
    vk::Result::SUCCESS
}

fn free_buffers(device: &DeviceState, pool: u64, buffers: &[u64]) {
    for &cb in buffers.iter().rev() {
        unregister(device, vk::CommandBuffer::from_raw(cb), |objects, handle| {
            objects.command_buffers.remove(&handle);
            if let Some(state) = objects.command_pools.get_mut(&pool) {
                state.buffers.retain(|&b| b != handle);
            }
        });
        device.recorders.lock().remove(&cb);
    }
    DRIVER.remove_children(buffers.iter().copied());
}

pub(super) unsafe extern "system" fn destroy_command_pool(
    device: vk::Device,
    pool: vk::CommandPool,
    _: *const vk::AllocationCallbacks,
) {
    let device = match DRIVER.device(device.as_raw()) {
        Some(device) => device,
        None => return,
    };
    let buffers = device.objects.lock().command_pools.get(&pool.as_raw())
        .map(|pool| pool.buffers.clone())
        .unwrap_or_default();
    free_buffers(&device, pool.as_raw(), &buffers);
    unregister(&device, pool, |objects, handle| {
        objects.command_pools.remove(&handle);
    });
}

fn reset_buffer(state: &mut CommandBufferState) {
    state.state = Recording::Initial;
    state.transfers.clear();
    state.layouts.clear();
}

pub(super) unsafe extern "system" fn reset_command_pool(
    device: vk::Device,
    pool: vk::CommandPool,
    _: vk::CommandPoolResetFlags,
) -> vk::Result {
    let device = device_or_fail!(device);
    let mut objects = device.objects.lock();
    let buffers = match objects.command_pools.get(&pool.as_raw()) {
        Some(pool) => pool.buffers.clone(),
        None => return vk::Result::ERROR_UNKNOWN,
    };
    for cb in buffers {
        if let Some(state) = objects.command_buffers.get_mut(&cb) {
            reset_buffer(state);
        }
    }
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn allocate_command_buffers(
    device: vk::Device,
    p_allocate_info: *const vk::CommandBufferAllocateInfo,
    p_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    let device = device_or_fail!(device);
    let info = &*p_allocate_info;
    let pool = info.command_pool.as_raw();
    if !device.objects.lock().command_pools.contains_key(&pool) {
        return vk::Result::ERROR_UNKNOWN;
    }
    let mut diags = Vec::new();
    let mut handles = Vec::new();
    for i in 0..info.command_buffer_count as usize {
        let handle = register(&device, &mut diags, p_buffers.add(i), |objects, handle| {
            objects.command_buffers.insert(handle, CommandBufferState {
                pool,
                state: Recording::Initial,
                transfers: Vec::new(),
                layouts: Vec::new(),
            });
            if let Some(state) = objects.command_pools.get_mut(&pool) {
                state.buffers.push(handle);
            }
        });
        handles.push(handle);
    }
    DRIVER.add_children(&device, handles);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn free_command_buffers(
    device: vk::Device,
    pool: vk::CommandPool,
    count: u32,
    p_buffers: *const vk::CommandBuffer,
) {
    let device = match DRIVER.device(device.as_raw()) {
        Some(device) => device,
        None => return,
    };
    let buffers: Vec<u64> = slice(p_buffers, count).iter()
        .map(|cb| cb.as_raw())
        .filter(|&cb| cb != 0)
        .collect();
    free_buffers(&device, pool.as_raw(), &buffers);
}

fn pool_flags(objects: &Objects, cb: &CommandBufferState) ->
    vk::CommandPoolCreateFlags
{
    objects.command_pools.get(&cb.pool).map(|p| p.flags).unwrap_or_default()
}

pub(super) unsafe extern "system" fn begin_command_buffer(
    command_buffer: vk::CommandBuffer,
    _: *const vk::CommandBufferBeginInfo,
) -> vk::Result {
    let device = owner_or_return!(command_buffer, vk::Result::ERROR_DEVICE_LOST);
    let mut diags = Vec::new();
    {
        let mut objects = device.objects.lock();
        let flags = match objects.command_buffers.get(&command_buffer.as_raw()) {
            Some(state) => pool_flags(&objects, state),
            None => return vk::Result::ERROR_UNKNOWN,
        };
        let state = match objects.command_buffers.get_mut(&command_buffer.as_raw()) {
            Some(state) => state,
            None => return vk::Result::ERROR_UNKNOWN,
        };
        match state.state {
            Recording::Recording => diags.push(Diagnostic::error(
                "VUID-vkBeginCommandBuffer-commandBuffer-00049",
                command_buffer,
                "Calling vkBeginCommandBuffer() on active command buffer \
                 before it has completed. You must check command buffer \
                 fence before this call.",
            )),
            Recording::Executable
                if !flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER) =>
            {
                diags.push(Diagnostic::error(
                    "VUID-vkBeginCommandBuffer-commandBuffer-00050",
                    command_buffer,
                    "Call to vkBeginCommandBuffer() on command buffer \
                     attempts to implicitly reset cmdBuffer created from a \
                     command pool that does not have the \
                     VK_COMMAND_POOL_CREATE_RESET_COMMAND_BUFFER_BIT bit set.",
                ))
            },
            _ => {},
        }
        reset_buffer(state);
        state.state = Recording::Recording;
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn end_command_buffer(
    command_buffer: vk::CommandBuffer,
) -> vk::Result {
    let device = owner_or_return!(command_buffer, vk::Result::ERROR_DEVICE_LOST);
    let mut diags = Vec::new();
    {
        let mut objects = device.objects.lock();
        let state = match objects.command_buffers.get_mut(&command_buffer.as_raw()) {
            Some(state) => state,
            None => return vk::Result::ERROR_UNKNOWN,
        };
        if state.state != Recording::Recording {
            diags.push(Diagnostic::error(
                "VUID-vkEndCommandBuffer-commandBuffer-00059",
                command_buffer,
                "vkEndCommandBuffer(): command buffer is not in the recording \
                 state.",
            ));
        }
        state.state = Recording::Executable;
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn reset_command_buffer(
    command_buffer: vk::CommandBuffer,
    _: vk::CommandBufferResetFlags,
) -> vk::Result {
    let device = owner_or_return!(command_buffer, vk::Result::ERROR_DEVICE_LOST);
    let mut diags = Vec::new();
    {
        let mut objects = device.objects.lock();
        let flags = match objects.command_buffers.get(&command_buffer.as_raw()) {
            Some(state) => pool_flags(&objects, state),
            None => return vk::Result::ERROR_UNKNOWN,
        };
        if !flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER) {
            diags.push(Diagnostic::error(
                "VUID-vkResetCommandBuffer-commandBuffer-00046",
                command_buffer,
                "Attempt to reset command buffer created from a command pool \
                 without VK_COMMAND_POOL_CREATE_RESET_COMMAND_BUFFER_BIT set.",
            ));
        }
        if let Some(state) = objects.command_buffers.get_mut(&command_buffer.as_raw()) {
            reset_buffer(state);
        }
    }
    device.emit(diags);
    vk::Result::SUCCESS
}

/// Marks the calling thread as the one recording into a command buffer
/// for the duration of a recording call.
struct RecordGuard<'a> {
    device: &'a DeviceState,
    cb: u64,
    owned: bool,
}

impl<'a> RecordGuard<'a> {
    fn enter(device: &'a DeviceState, cb: u64, diags: &mut Vec<Diagnostic>) ->
        Self
    {
        let me = thread::current().id();
        let other: Option<ThreadId> = {
            let mut recorders = device.recorders.lock();
            match recorders.get(&cb) {
                Some(&thread) => Some(thread),
                None => {
                    recorders.insert(cb, me);
                    None
                },
            }
        };
        let owned = other.is_none();
        if let Some(other) = other.filter(|&other| other != me) {
            diags.push(Diagnostic::error(
                THREADING_ID,
                vk::CommandBuffer::from_raw(cb),
                format!(
                    "THREADING ERROR : object of type VkCommandBuffer is \
                     simultaneously used in thread {:?} and thread {:?}",
                    other, me,
                ),
            ));
        }
        Self { device, cb, owned }
    }
}

impl<'a> Drop for RecordGuard<'a> {
    fn drop(&mut self) {
        if self.owned {
            self.device.recorders.lock().remove(&self.cb);
        }
    }
}

fn check_recording(
    objects: &Objects,
    command_buffer: vk::CommandBuffer,
    id: &'static str,
    call: &str,
    diags: &mut Vec<Diagnostic>,
) {
    let state = objects.command_buffers.get(&command_buffer.as_raw())
        .map(|cb| cb.state);
    if state != Some(Recording::Recording) {
        diags.push(Diagnostic::error(id, command_buffer, format!(
            "{}(): command buffer 0x{:x} is not in the recording state. You \
             must call vkBeginCommandBuffer() before this call.",
            call, command_buffer.as_raw(),
        )));
    }
}

pub(super) unsafe extern "system" fn cmd_set_event(
    command_buffer: vk::CommandBuffer,
    _event: vk::Event,
    _stage_mask: vk::PipelineStageFlags,
) {
    let device = owner_or_return!(command_buffer, ());
    let mut diags = Vec::new();
    let guard = RecordGuard::enter(&device, command_buffer.as_raw(), &mut diags);
    thread::yield_now();
    check_recording(
        &device.objects.lock(),
        command_buffer,
        "VUID-vkCmdSetEvent-commandBuffer-recording",
        "vkCmdSetEvent",
        &mut diags,
    );
    drop(guard);
    device.emit(diags);
}

fn is_transfer(concurrent: bool, src: u32, dst: u32) -> bool {
    !concurrent
        && src != dst
        && src != vk::QUEUE_FAMILY_IGNORED
        && dst != vk::QUEUE_FAMILY_IGNORED
}

fn type_name(ty: vk::ObjectType) -> &'static str {
    if ty == vk::ObjectType::IMAGE { "Image" } else { "Buffer" }
}

pub(super) unsafe extern "system" fn cmd_pipeline_barrier(
    command_buffer: vk::CommandBuffer,
    _src_stage_mask: vk::PipelineStageFlags,
    _dst_stage_mask: vk::PipelineStageFlags,
    _dependency_flags: vk::DependencyFlags,
    _memory_barrier_count: u32,
    _p_memory_barriers: *const vk::MemoryBarrier,
    buffer_memory_barrier_count: u32,
    p_buffer_memory_barriers: *const vk::BufferMemoryBarrier,
    image_memory_barrier_count: u32,
    p_image_memory_barriers: *const vk::ImageMemoryBarrier,
) {
    let device = owner_or_return!(command_buffer, ());
    let cb = command_buffer.as_raw();
    let mut diags = Vec::new();
    let guard = RecordGuard::enter(&device, cb, &mut diags);
    thread::yield_now();

    let family_rules = FamilyRules {
        family_count: device.gpu().family_count(),
        external_memory: device.external_memory,
    };
    let buffer_barriers =
        slice(p_buffer_memory_barriers, buffer_memory_barrier_count);
    let image_barriers = slice(p_image_memory_barriers, image_memory_barrier_count);
    {
        let mut objects = device.objects.lock();
        check_recording(
            &objects,
            command_buffer,
            "VUID-vkCmdPipelineBarrier-commandBuffer-recording",
            "vkCmdPipelineBarrier",
            &mut diags,
        );

        let mut transfers = Vec::new();
        let mut layouts = Vec::new();
        for barrier in buffer_barriers {
            let (src, dst) = (
                barrier.src_queue_family_index,
                barrier.dst_queue_family_index,
            );
            let state = match objects.buffers.get(&barrier.buffer.as_raw()) {
                Some(state) => *state,
                None => continue,
            };
            diags.extend(errors(barrier.buffer, rules::barrier_families(
                rules::BUFFER_BARRIER_IDS,
                "buffer",
                state.concurrent,
                src,
                dst,
                family_rules,
            )));
            if is_transfer(state.concurrent, src, dst) {
                transfers.push(TransferKey {
                    ty: vk::ObjectType::BUFFER,
                    resource: barrier.buffer.as_raw(),
                    src,
                    dst,
                });
            }
        }
        for barrier in image_barriers {
            let (src, dst) = (
                barrier.src_queue_family_index,
                barrier.dst_queue_family_index,
            );
            let state = match objects.images.get(&barrier.image.as_raw()) {
                Some(state) => *state,
                None => continue,
            };
            diags.extend(errors(barrier.image, rules::barrier_families(
                rules::IMAGE_BARRIER_IDS,
                "image",
                state.concurrent,
                src,
                dst,
                family_rules,
            )));
            if barrier.new_layout == vk::ImageLayout::UNDEFINED
                || barrier.new_layout == vk::ImageLayout::PREINITIALIZED
            {
                diags.push(Diagnostic::error(
                    "VUID-VkImageMemoryBarrier-newLayout-01198",
                    barrier.image,
                    format!(
                        "vkCmdPipelineBarrier(): image barrier newLayout is \
                         {:?}.",
                        barrier.new_layout,
                    ),
                ));
            }
            if is_transfer(state.concurrent, src, dst) {
                transfers.push(TransferKey {
                    ty: vk::ObjectType::IMAGE,
                    resource: barrier.image.as_raw(),
                    src,
                    dst,
                });
            }
            layouts.push(LayoutChange {
                image: barrier.image.as_raw(),
                old: barrier.old_layout,
                new: barrier.new_layout,
            });
        }

        if let Some(state) = objects.command_buffers.get_mut(&cb) {
            for key in transfers {
                if state.transfers.contains(&key) {
                    let (id, what) = if key.ty == vk::ObjectType::IMAGE {
                        ("UNASSIGNED-VkImageMemoryBarrier-image-00001", "image")
                    } else {
                        ("UNASSIGNED-VkBufferMemoryBarrier-buffer-00001", "buffer")
                    };
                    diags.push(Diagnostic::warning(id, command_buffer, format!(
                        "vkCmdPipelineBarrier(): {} 0x{:x} has a duplicate \
                         queue family ownership transfer ({} -> {}) \
                         recorded in this command buffer.",
                        what, key.resource, key.src, key.dst,
                    )));
                } else {
                    state.transfers.push(key);
                }
            }
            state.layouts.extend(layouts);
        }
    }
    drop(guard);
    device.emit(diags);
}

/// Applies the ownership transfers and layout changes of one command
/// buffer executed on `family`.
fn execute(
    objects: &mut Objects,
    command_buffer: vk::CommandBuffer,
    family: u32,
    diags: &mut Vec<Diagnostic>,
) {
    let (transfers, layouts) = match objects.command_buffers
        .get(&command_buffer.as_raw())
    {
        Some(cb) => (cb.transfers.clone(), cb.layouts.clone()),
        None => return,
    };
    for key in transfers {
        if family == key.src {
            if !objects.pending_releases.insert(key) {
                diags.push(Diagnostic::error(
                    DOUBLE_RELEASE_ID,
                    command_buffer,
                    format!(
                        "{} 0x{:x} has a queue family ownership release \
                         ({} -> {}) submitted while a previous release is \
                         still pending.",
                        type_name(key.ty), key.resource, key.src, key.dst,
                    ),
                ));
            }
        } else if family == key.dst {
            if !objects.pending_releases.remove(&key) {
                let id = if key.ty == vk::ObjectType::IMAGE {
                    "UNASSIGNED-VkImageMemoryBarrier-image-00004"
                } else {
                    "UNASSIGNED-VkBufferMemoryBarrier-buffer-00004"
                };
                diags.push(Diagnostic::warning(id, command_buffer, format!(
                    "{} 0x{:x} has a queue family ownership acquire ({} -> \
                     {}) with no matching release operation.",
                    type_name(key.ty), key.resource, key.src, key.dst,
                )));
            }
        } else {
            diags.push(Diagnostic::error(
                INVALID_FAMILY_ID,
                command_buffer,
                format!(
                    "{} 0x{:x} ownership transfer ({} -> {}) submitted on a \
                     queue of family {}, which is neither the source nor the \
                     destination.",
                    type_name(key.ty), key.resource, key.src, key.dst, family,
                ),
            ));
        }
    }
    for change in layouts {
        let image = match objects.images.get_mut(&change.image) {
            Some(image) => image,
            None => continue,
        };
        let mismatch = change.old != vk::ImageLayout::UNDEFINED
            && change.old != image.layout
            && change.new != image.layout;
        if mismatch {
            diags.push(Diagnostic::error(
                INVALID_LAYOUT_ID,
                command_buffer,
                format!(
                    "Submitted command buffer expects image 0x{:x} to be in \
                     layout {:?}--instead, current layout is {:?}.",
                    change.image, change.old, image.layout,
                ),
            ));
        }
        image.layout = change.new;
    }
}

pub(super) unsafe extern "system" fn queue_submit(
    queue: vk::Queue,
    submit_count: u32,
    p_submits: *const vk::SubmitInfo,
    fence: vk::Fence,
) -> vk::Result {
    let device = owner_or_return!(queue, vk::Result::ERROR_DEVICE_LOST);
    let family = match device.queue(queue.as_raw()) {
        Some(queue) => queue.family,
        None => return vk::Result::ERROR_DEVICE_LOST,
    };
    let mut diags = Vec::new();
    {
        let mut objects = device.objects.lock();
        if objects.fences.get(&fence.as_raw()) == Some(&true) {
            diags.push(Diagnostic::error(
                "VUID-vkQueueSubmit-fence-00063",
                fence,
                format!(
                    "vkQueueSubmit(): fence 0x{:x} is already in use by \
                     another submission or is signaled.",
                    fence.as_raw(),
                ),
            ));
        }
        for submit in slice(p_submits, submit_count) {
            for &cb in slice(submit.p_command_buffers, submit.command_buffer_count) {
                let state = objects.command_buffers.get(&cb.as_raw())
                    .map(|state| state.state);
                if state != Some(Recording::Executable) {
                    diags.push(Diagnostic::error(
                        "VUID-vkQueueSubmit-pCommandBuffers-00072",
                        cb,
                        format!(
                            "vkQueueSubmit(): command buffer 0x{:x} is not \
                             in the executable state.",
                            cb.as_raw(),
                        ),
                    ));
                    continue;
                }
                let pool_family = objects.command_buffers.get(&cb.as_raw())
                    .and_then(|state| objects.command_pools.get(&state.pool))
                    .map(|pool| pool.family);
                if pool_family.map_or(false, |f| f != family) {
                    diags.push(Diagnostic::error(
                        "VUID-vkQueueSubmit-pCommandBuffers-00074",
                        cb,
                        format!(
                            "vkQueueSubmit(): command buffer 0x{:x} was \
                             allocated from a pool for queue family {}, but \
                             is submitted on a queue of family {}.",
                            cb.as_raw(), pool_family.unwrap_or_default(), family,
                        ),
                    ));
                }
                execute(&mut objects, cb, family, &mut diags);
            }
        }
        if let Some(signaled) = objects.fences.get_mut(&fence.as_raw()) {
            *signaled = true;
        }
    }
    trace!("sim: submitted {} batch(es) on family {}", submit_count, family);
    device.emit(diags);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn queue_wait_idle(queue: vk::Queue) ->
    vk::Result
{
    owner_or_return!(queue, vk::Result::ERROR_DEVICE_LOST);
    vk::Result::SUCCESS
}
