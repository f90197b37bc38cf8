use std::sync::Arc;

use ash::vk;
use derivative::Derivative;
use log::trace;

use crate::*;

/// A command pool bound to one queue, which its command buffers are
/// submitted to.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandPool {
    #[derivative(Debug = "ignore")]
    device: Arc<Device>,
    queue: Arc<Queue>,
    inner: vk::CommandPool,
    flags: vk::CommandPoolCreateFlags,
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        trace!("CommandPool::drop({:?})", self.inner);
        unsafe { self.device.table().destroy_command_pool(self.inner, None); }
    }
}

impl CommandPool {
    pub fn new(queue: Arc<Queue>, flags: vk::CommandPoolCreateFlags) ->
        HarnessResult<Arc<Self>>
    {
        let device = Arc::clone(queue.device());
        let create_info = vk::CommandPoolCreateInfo {
            flags,
            queue_family_index: queue.family(),
            ..Default::default()
        };
        let inner = unsafe {
            device.table().create_command_pool(&create_info, None)?
        };
        Ok(Arc::new(Self { device, queue, inner, flags }))
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn family(&self) -> u32 {
        self.queue.family()
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.inner
    }

    pub fn flags(&self) -> vk::CommandPoolCreateFlags {
        self.flags
    }

    /// Returns every command buffer of the pool to the initial state.
    pub fn reset(&self) -> HarnessResult<()> {
        unsafe {
            self.device.table().reset_command_pool(
                self.inner, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CommandBuffer {
    pool: Arc<CommandPool>,
    inner: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        trace!("CommandBuffer::drop({:?})", self.inner);
        unsafe {
            self.device().table()
                .free_command_buffers(self.pool.inner, &[self.inner]);
        }
    }
}

impl CommandBuffer {
    pub fn new(pool: &Arc<CommandPool>, level: vk::CommandBufferLevel) ->
        HarnessResult<Self>
    {
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: pool.inner,
            level,
            command_buffer_count: 1,
            ..Default::default()
        };
        let buffers = unsafe {
            pool.device.table().allocate_command_buffers(&alloc_info)?
        };
        let inner = buffers.into_iter().next()
            .ok_or_else(|| err_msg!("no command buffer allocated"))?;
        Ok(Self { pool: Arc::clone(pool), inner, level })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.pool.device
    }

    pub fn pool(&self) -> &Arc<CommandPool> {
        &self.pool
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.inner
    }

    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    pub fn begin(&mut self) -> HarnessResult<()> {
        self.begin_with(Default::default())
    }

    pub fn begin_with(&mut self, flags: vk::CommandBufferUsageFlags) ->
        HarnessResult<()>
    {
        let inheritance = vk::CommandBufferInheritanceInfo::default();
        let secondary = self.level == vk::CommandBufferLevel::SECONDARY;
        let begin_info = vk::CommandBufferBeginInfo {
            flags,
            p_inheritance_info: if secondary { &inheritance }
                else { std::ptr::null() },
            ..Default::default()
        };
        unsafe {
            self.device().table()
                .begin_command_buffer(self.inner, &begin_info)?;
        }
        Ok(())
    }

    pub fn end(&mut self) -> HarnessResult<()> {
        unsafe { self.device().table().end_command_buffer(self.inner)?; }
        Ok(())
    }

    pub fn reset(&mut self) -> HarnessResult<()> {
        unsafe {
            self.device().table().reset_command_buffer(
                self.inner, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    pub fn pipeline_barrier(
        &mut self,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device().table().cmd_pipeline_barrier(
                self.inner,
                src_stage_mask,
                dst_stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                image_barriers,
            );
        }
    }

    pub fn set_event(&mut self, event: &Event, stage: vk::PipelineStageFlags) {
        unsafe {
            self.device().table()
                .cmd_set_event(self.inner, event.handle(), stage);
        }
    }

    /// Submits to `queue`, which need not be the pool's.
    pub fn submit_to(&self, queue: &Queue, fence: vk::Fence) ->
        HarnessResult<()>
    {
        let cmds = [self.inner];
        let submit_info = vk::SubmitInfo {
            command_buffer_count: cmds.len() as _,
            p_command_buffers: cmds.as_ptr(),
            ..Default::default()
        };
        unsafe { queue.submit(&[submit_info], fence) }
    }

    /// Submits to the pool's queue and blocks until execution finishes.
    pub fn submit_and_wait(&self) -> HarnessResult<()> {
        let fence = Fence::new(Arc::clone(self.device()), false)?;
        self.submit_to(self.pool.queue(), fence.handle())?;
        fence.wait()?;
        self.pool.queue().wait_idle()
    }
}
