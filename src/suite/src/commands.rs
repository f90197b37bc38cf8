use std::sync::Arc;

use ash::vk;
use harness::*;
use unit::TestStatus;

use crate::{expect_clean, expect_error};

fn pool_without_reset(fw: &Framework) -> HarnessResult<Arc<CommandPool>> {
    CommandPool::new(Arc::clone(fw.queue()?), vk::CommandPoolCreateFlags::empty())
}

fn primary(pool: &Arc<CommandPool>) -> HarnessResult<CommandBuffer> {
    CommandBuffer::new(pool, vk::CommandBufferLevel::PRIMARY)
}

fn begin_while_recording(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;
    expect_error(&monitor, "VUID-vkBeginCommandBuffer-commandBuffer-00049",
        || cmds.begin());
    cmds.end()?;
    Ok(())
}

fn implicit_reset_without_flag(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let pool = pool_without_reset(fw)?;
    let mut cmds = primary(&pool)?;
    cmds.begin()?;
    cmds.end()?;
    expect_error(fw.monitor(), "VUID-vkBeginCommandBuffer-commandBuffer-00050",
        || cmds.begin());
    Ok(())
}

fn end_without_begin(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    expect_error(&monitor, "VUID-vkEndCommandBuffer-commandBuffer-00059",
        || cmds.end());
    Ok(())
}

fn reset_without_flag(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let pool = pool_without_reset(fw)?;
    let mut cmds = primary(&pool)?;
    expect_error(fw.monitor(), "VUID-vkResetCommandBuffer-commandBuffer-00046",
        || cmds.reset());
    Ok(())
}

fn record_outside_begin(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let event = Event::new(Arc::clone(fw.device()?))?;
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    expect_error(&monitor, "VUID-vkCmdSetEvent-commandBuffer-recording", || {
        cmds.set_event(&event, vk::PipelineStageFlags::TRANSFER);
        Ok(())
    });
    Ok(())
}

fn submit_initial_command_buffer(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let queue = Arc::clone(fw.queue()?);
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    expect_error(&monitor, "VUID-vkQueueSubmit-pCommandBuffers-00072",
        || cmds.submit_to(&queue, vk::Fence::null()));
    queue.wait_idle()?;
    Ok(())
}

fn submit_to_wrong_family(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let family = fw.queue_family_index()?;
    let other = fw.queues().iter()
        .find(|queue| queue.family() != family)
        .cloned();
    let other = match other {
        Some(queue) => queue,
        None => unit::skip!("only one queue family"),
    };
    let pool = CommandPool::new(
        other, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)?;
    let mut cmds = primary(&pool)?;
    cmds.begin()?;
    cmds.end()?;
    let queue = Arc::clone(fw.queue()?);
    expect_error(fw.monitor(), "VUID-vkQueueSubmit-pCommandBuffers-00074",
        || cmds.submit_to(&queue, vk::Fence::null()));
    queue.wait_idle()?;
    Ok(())
}

fn submit_with_signaled_fence(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let fence = Fence::new(Arc::clone(fw.device()?), true)?;
    let queue = Arc::clone(fw.queue()?);
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;
    cmds.end()?;
    expect_error(&monitor, "VUID-vkQueueSubmit-fence-00063",
        || cmds.submit_to(&queue, fence.handle()));
    queue.wait_idle()?;
    Ok(())
}

fn rerecord_executable(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    expect_clean(&monitor, || {
        cmds.begin()?;
        cmds.end()?;
        cmds.submit_and_wait()?;
        cmds.begin()?;
        cmds.end()?;
        cmds.submit_and_wait()?;
        cmds.reset()
    })?;
    Ok(())
}

fn fence_reuse_after_reset(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut fence = Fence::new(Arc::clone(fw.device()?), true)?;
    let queue = Arc::clone(fw.queue()?);
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;
    cmds.end()?;
    expect_clean(&monitor, || {
        fence.reset()?;
        cmds.submit_to(&queue, fence.handle())?;
        fence.wait()
    })?;
    unit::assert_true!(fence.check_signaled()?);
    Ok(())
}

fn image_layout_transition(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let mut image =
        Image::new(device, &default_image_info(), Default::default())?;
    let pool = Arc::clone(fw.command_pool()?);
    expect_clean(fw.monitor(), || {
        image.transition_now(&pool, vk::ImageLayout::GENERAL)?;
        image.transition_now(&pool, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    })?;
    unit::assert_true!(
        image.layout() == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    Ok(())
}

unit::declare_tests![
    "LayerTest" => [
        begin_while_recording,
        implicit_reset_without_flag,
        end_without_begin,
        reset_without_flag,
        record_outside_begin,
        submit_initial_command_buffer,
        submit_to_wrong_family,
        submit_with_signaled_fence,
    ],
    "PositiveLayerTest" => [
        rerecord_executable,
        fence_reuse_after_reset,
        image_layout_transition,
    ],
];
