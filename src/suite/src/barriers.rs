use std::sync::Arc;

use ash::vk;
use harness::*;
use unit::TestStatus;

use crate::{expect_clean, expect_error};

const EXTERNAL_MEMORY_EXTENSION: &str = "VK_KHR_external_memory";

const INVALID_FAMILY: &str =
    "UNASSIGNED-CoreValidation-DrawState-InvalidQueueFamily";

fn release_then_acquire(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut context = BarrierContext::new(fw, &[0, 1])?;
    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        src: 0,
        dst: 1,
        positive: true,
        queue_family: Some(0),
        ..Default::default()
    })?;
    helper.run(Transfer {
        src: 0,
        dst: 1,
        positive: true,
        queue_family: Some(1),
        ..Default::default()
    })?;
    Ok(())
}

fn double_release(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut context = BarrierContext::new(fw, &[0, 1])?;
    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        img_err: Some("BarrierDoubleRelease"),
        buf_err: Some("BarrierDoubleRelease"),
        src: 0,
        dst: 1,
        queue_family: Some(0),
        policy: Policy::DoubleCommandBuffer,
        ..Default::default()
    })?;
    Ok(())
}

fn duplicate_transfer_in_command_buffer(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut context = BarrierContext::new(fw, &[0, 1])?;
    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        img_err: Some("UNASSIGNED-VkImageMemoryBarrier-image-00001"),
        buf_err: Some("UNASSIGNED-VkBufferMemoryBarrier-buffer-00001"),
        src: 0,
        dst: 1,
        policy: Policy::DoubleRecord,
        ..Default::default()
    })?;
    Ok(())
}

fn acquire_without_release(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut context = BarrierContext::new(fw, &[0, 1])?;
    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        img_err: Some("UNASSIGNED-VkImageMemoryBarrier-image-00004"),
        buf_err: Some("UNASSIGNED-VkBufferMemoryBarrier-buffer-00004"),
        src: 0,
        dst: 1,
        queue_family: Some(1),
        ..Default::default()
    })?;
    Ok(())
}

fn transfer_on_unrelated_family(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut context = BarrierContext::new(fw, &[0, 1, 2])?;
    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        img_err: Some(INVALID_FAMILY),
        buf_err: Some(INVALID_FAMILY),
        src: 0,
        dst: 1,
        queue_family: Some(2),
        ..Default::default()
    })?;
    Ok(())
}

fn concurrent_with_family_indices(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let families = [0, 1];
    let mut context = BarrierContext::new(fw, &families)?;
    let mut helper = BarrierQueueFamilyHelper::init(
        &mut context, Some(&families), true, true)?;
    helper.run(Transfer {
        img_err: Some("VUID-VkImageMemoryBarrier-image-01199"),
        buf_err: Some("VUID-VkBufferMemoryBarrier-buffer-01190"),
        src: 0,
        dst: 1,
        ..Default::default()
    })?;
    Ok(())
}

fn exclusive_with_invalid_family(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut context = BarrierContext::new(fw, &[0])?;
    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        img_err: Some("VUID-VkImageMemoryBarrier-image-01200"),
        buf_err: Some("VUID-VkBufferMemoryBarrier-buffer-01192"),
        src: 0,
        dst: 7,
        ..Default::default()
    })?;
    Ok(())
}

/// Brings up a device with external memory enabled.
fn init_external_memory(fw: &mut Framework) -> HarnessResult<()> {
    fw.init_framework()?;
    if !fw.device_extension_supported(fw.gpu(), None, EXTERNAL_MEMORY_EXTENSION) {
        return Err(Error::unsupported(format!(
            "{} not supported", EXTERNAL_MEMORY_EXTENSION)));
    }
    fw.add_device_extension(EXTERNAL_MEMORY_EXTENSION)?;
    fw.init_state(Default::default())
}

fn external_memory_invalid_family(fw: &mut Framework) -> TestStatus {
    init_external_memory(fw)?;
    let families = [0, 1];
    let mut context = BarrierContext::new(fw, &families)?;

    let mut helper = BarrierQueueFamilyHelper::init(&mut context, None, true, true)?;
    helper.run(Transfer {
        img_err: Some("VUID-VkImageMemoryBarrier-image-01201"),
        buf_err: Some("VUID-VkBufferMemoryBarrier-buffer-01193"),
        src: 0,
        dst: 7,
        ..Default::default()
    })?;
    drop(helper);

    let mut helper = BarrierQueueFamilyHelper::init(
        &mut context, Some(&families), true, true)?;
    helper.run(Transfer {
        img_err: Some("VUID-VkImageMemoryBarrier-image-01381"),
        buf_err: Some("VUID-VkBufferMemoryBarrier-buffer-01763"),
        src: 0,
        dst: 1,
        ..Default::default()
    })?;
    Ok(())
}

fn barrier_to_undefined_layout(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let mut image =
        Image::new(device, &default_image_info(), Default::default())?;
    let barrier = image.barrier(
        vk::ImageLayout::UNDEFINED,
        vk::AccessFlags::empty(),
        vk::AccessFlags::empty(),
    );
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;
    expect_error(&monitor, "VUID-VkImageMemoryBarrier-newLayout-01198", || {
        cmds.pipeline_barrier(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            &[],
            &[barrier],
        );
        Ok(())
    });
    cmds.end()?;
    Ok(())
}

fn barrier_from_wrong_layout(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let pool = Arc::clone(fw.command_pool()?);
    let mut image =
        Image::new(device, &default_image_info(), Default::default())?;
    image.transition_now(&pool, vk::ImageLayout::GENERAL)?;

    let barrier = vk::ImageMemoryBarrier {
        old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ..image.barrier(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        )
    };
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;
    cmds.pipeline_barrier(
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        &[],
        &[barrier],
    );
    cmds.end()?;
    expect_error(&monitor,
        "UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout",
        || cmds.submit_and_wait());
    Ok(())
}

fn transfer_between_pools(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    if fw.queues().len() < 2 {
        unit::skip!("only one queue family");
    }
    let flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
    let level = vk::CommandBufferLevel::PRIMARY;
    let from_pool = CommandPool::new(Arc::clone(&fw.queues()[0]), flags)?;
    let to_pool = CommandPool::new(Arc::clone(&fw.queues()[1]), flags)?;
    let mut from = CommandBuffer::new(&from_pool, level)?;
    let mut to = CommandBuffer::new(&to_pool, level)?;

    let device = Arc::clone(fw.device()?);
    let buffer = Buffer::with_usage(
        Arc::clone(&device), 256, vk::BufferUsageFlags::TRANSFER_SRC)?;
    let buffer_barrier = vk::BufferMemoryBarrier {
        src_queue_family_index: from.pool().family(),
        dst_queue_family_index: to.pool().family(),
        ..buffer.barrier(vk::AccessFlags::TRANSFER_READ, Default::default())
    };
    let mut image = Image::new(device, &default_image_info(), Default::default())?;
    image.transition_now(&from_pool, vk::ImageLayout::GENERAL)?;
    let image_barrier = vk::ImageMemoryBarrier {
        src_queue_family_index: from.pool().family(),
        dst_queue_family_index: to.pool().family(),
        ..image.barrier(
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::TRANSFER_READ,
            Default::default(),
        )
    };

    valid_ownership_transfer(
        fw.monitor(),
        &mut from,
        &mut to,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::TRANSFER,
        Some(&buffer_barrier),
        Some(&image_barrier),
    )?;
    Ok(())
}

fn concurrent_without_transfer(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let families = [0, 1];
    let mut context = BarrierContext::new(fw, &families)?;
    let mut helper = BarrierQueueFamilyHelper::init(
        &mut context, Some(&families), true, true)?;
    helper.run(Transfer {
        positive: true,
        queue_family: Some(1),
        ..Default::default()
    })?;
    Ok(())
}

fn external_memory_release(fw: &mut Framework) -> TestStatus {
    init_external_memory(fw)?;
    let families = [0, 1];
    let mut context = BarrierContext::new(fw, &families)?;
    let mut helper = BarrierQueueFamilyHelper::init(
        &mut context, Some(&families), true, true)?;
    helper.run(Transfer {
        src: vk::QUEUE_FAMILY_IGNORED,
        dst: vk::QUEUE_FAMILY_EXTERNAL,
        positive: true,
        queue_family: Some(0),
        ..Default::default()
    })?;
    Ok(())
}

fn same_family_barrier(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let family = fw.queue_family_index()?;
    let device = Arc::clone(fw.device()?);
    let buffer = Buffer::with_usage(
        device, 256, vk::BufferUsageFlags::TRANSFER_DST)?;
    let barrier = vk::BufferMemoryBarrier {
        src_queue_family_index: family,
        dst_queue_family_index: family,
        ..buffer.barrier(
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        )
    };
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    expect_clean(&monitor, || {
        cmds.begin()?;
        cmds.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            &[barrier],
            &[],
        );
        cmds.end()?;
        cmds.submit_and_wait()
    })?;
    Ok(())
}

unit::declare_tests![
    "LayerTest" => [
        double_release,
        duplicate_transfer_in_command_buffer,
        acquire_without_release,
        transfer_on_unrelated_family,
        concurrent_with_family_indices,
        exclusive_with_invalid_family,
        external_memory_invalid_family,
        barrier_to_undefined_layout,
        barrier_from_wrong_layout,
    ],
    "PositiveLayerTest" => [
        release_then_acquire,
        transfer_between_pools,
        concurrent_without_transfer,
        external_memory_release,
        same_family_barrier,
    ],
];
