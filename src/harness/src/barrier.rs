//! Queue family ownership transfer tests reduced to one call each.
use std::sync::Arc;

use ash::vk;
use derivative::Derivative;
use log::debug;

use crate::*;

/// The queue, pool and two command buffers used on one queue family.
#[derive(Debug)]
pub struct FamilyObjects {
    index: u32,
    queue: Arc<Queue>,
    command_buffer: CommandBuffer,
    command_buffer2: CommandBuffer,
    pool: Arc<CommandPool>,
}

impl FamilyObjects {
    fn new(queue: Arc<Queue>) -> HarnessResult<Self> {
        let pool = CommandPool::new(
            Arc::clone(&queue),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let level = vk::CommandBufferLevel::PRIMARY;
        Ok(Self {
            index: queue.family(),
            command_buffer: CommandBuffer::new(&pool, level)?,
            command_buffer2: CommandBuffer::new(&pool, level)?,
            queue,
            pool,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<CommandPool> {
        &self.pool
    }

    pub fn command_buffers(&mut self) ->
        (&mut CommandBuffer, &mut CommandBuffer)
    {
        (&mut self.command_buffer, &mut self.command_buffer2)
    }
}

/// Per-family command objects shared by every transfer in a test. The
/// first family listed is the default.
#[derive(Debug)]
pub struct BarrierContext {
    monitor: Arc<Monitor>,
    device: Arc<Device>,
    families: Vec<FamilyObjects>,
}

impl BarrierContext {
    pub fn new(fw: &Framework, families: &[u32]) -> HarnessResult<Self> {
        if families.is_empty() {
            return Err("barrier context needs at least one queue family".into());
        }
        let device = Arc::clone(fw.device()?);
        let mut objects = Vec::with_capacity(families.len());
        for &index in families {
            let queue = fw.queues().iter()
                .find(|queue| queue.family() == index)
                .ok_or_else(|| Error::unsupported(format!(
                    "no queue for family {}", index)))?;
            objects.push(FamilyObjects::new(Arc::clone(queue))?);
        }
        let mut context = Self {
            monitor: Arc::clone(fw.monitor()),
            device,
            families: objects,
        };
        context.reset()?;
        Ok(context)
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Waits for the device, then resets every pool.
    pub fn reset(&mut self) -> HarnessResult<()> {
        self.device.wait_idle()?;
        for family in self.families.iter() {
            family.pool.reset()?;
        }
        Ok(())
    }

    pub fn default_family(&mut self) -> &mut FamilyObjects {
        &mut self.families[0]
    }

    /// The objects of family `index`, or of the default family if
    /// `index` is not part of the context.
    pub fn family(&mut self, index: u32) -> &mut FamilyObjects {
        let i = match self.families.iter().position(|f| f.index == index) {
            Some(i) => i,
            None => {
                debug!("family {} is not in the barrier context; using {}",
                    index, self.families[0].index);
                0
            },
        };
        &mut self.families[i]
    }
}

/// How the barrier pair is recorded.
#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub enum Policy {
    /// Once, in one command buffer.
    #[derivative(Default)]
    Single,
    /// Twice in the same command buffer.
    DoubleRecord,
    /// Once in each of two command buffers submitted together.
    DoubleCommandBuffer,
}

/// One invocation of `BarrierQueueFamilyHelper::run`.
#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Default)]
pub struct Transfer<'a> {
    /// Expected identifier for the image barrier.
    pub img_err: Option<&'a str>,
    /// Expected identifier for the buffer barrier.
    pub buf_err: Option<&'a str>,
    #[derivative(Default(value = "vk::QUEUE_FAMILY_IGNORED"))]
    pub src: u32,
    #[derivative(Default(value = "vk::QUEUE_FAMILY_IGNORED"))]
    pub dst: u32,
    /// Expect silence instead of the identifiers above.
    pub positive: bool,
    /// The family to submit on. `None` records without submitting.
    pub queue_family: Option<u32>,
    pub policy: Policy,
}

/// An image and a buffer, with barrier templates for both, whose queue
/// family indices are filled in per transfer.
#[derive(Debug)]
pub struct BarrierQueueFamilyHelper<'ctx> {
    context: &'ctx mut BarrierContext,
    image: Image,
    image_barrier: vk::ImageMemoryBarrier,
    buffer: Buffer,
    buffer_barrier: vk::BufferMemoryBarrier,
}

impl<'ctx> BarrierQueueFamilyHelper<'ctx> {
    /// Creates the resources, shared concurrently across `families` if
    /// given and exclusive otherwise.
    pub fn init(
        context: &'ctx mut BarrierContext,
        families: Option<&[u32]>,
        image_memory: bool,
        buffer_memory: bool,
    ) -> HarnessResult<Self> {
        let device = Arc::clone(&context.device);
        let (sharing_mode, indices) = match families {
            Some(families) => (vk::SharingMode::CONCURRENT, families),
            None => (vk::SharingMode::EXCLUSIVE, &[][..]),
        };

        let image_info = vk::ImageCreateInfo {
            sharing_mode,
            queue_family_index_count: indices.len() as _,
            p_queue_family_indices: indices.c_ptr(),
            ..image_2d_info(
                vk::Format::B8G8R8A8_UNORM,
                32,
                32,
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
            )
        };
        let mut image = if image_memory {
            let mut image =
                Image::new(Arc::clone(&device), &image_info, Default::default())?;
            image.transition_now(context.default_family().pool(),
                vk::ImageLayout::GENERAL)?;
            image
        } else {
            Image::init_no_mem(Arc::clone(&device), &image_info)?
        };
        let image_barrier = image.barrier(
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::TRANSFER_READ,
        );

        let buffer_info = vk::BufferCreateInfo {
            size: 256,
            usage: vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST,
            sharing_mode,
            queue_family_index_count: indices.len() as _,
            p_queue_family_indices: indices.c_ptr(),
            ..Default::default()
        };
        let buffer = if buffer_memory {
            Buffer::new(device, &buffer_info, Default::default())?
        } else {
            Buffer::init_no_mem(device, &buffer_info)?
        };
        let buffer_barrier = buffer.barrier(
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::TRANSFER_READ,
        );

        Ok(Self { context, image, image_barrier, buffer, buffer_barrier })
    }

    pub fn context(&mut self) -> &mut BarrierContext {
        self.context
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn image_barrier(&self) -> &vk::ImageMemoryBarrier {
        &self.image_barrier
    }

    pub fn buffer_barrier(&self) -> &vk::BufferMemoryBarrier {
        &self.buffer_barrier
    }

    /// Records (and optionally submits) the barrier pair with the given
    /// family indices, then verifies the expectations.
    pub fn run(&mut self, transfer: Transfer<'_>) -> HarnessResult<bool> {
        let monitor = Arc::clone(&self.context.monitor);
        let filter = Severities::ERROR | Severities::WARNING;
        if let Some(id) = transfer.img_err {
            monitor.set_desired_failure_msg(filter, id);
        }
        if let Some(id) = transfer.buf_err {
            monitor.set_desired_failure_msg(filter, id);
        }
        if transfer.positive {
            monitor.expect_success();
        }

        self.image_barrier.src_queue_family_index = transfer.src;
        self.image_barrier.dst_queue_family_index = transfer.dst;
        self.buffer_barrier.src_queue_family_index = transfer.src;
        self.buffer_barrier.dst_queue_family_index = transfer.dst;
        let image_barriers = [self.image_barrier];
        let buffer_barriers = [self.buffer_barrier];
        debug!("ownership barrier {} -> {} ({:?})",
            transfer.src as i32, transfer.dst as i32, transfer.policy);

        let family = match transfer.queue_family {
            Some(index) => self.context.family(index),
            None => self.context.default_family(),
        };
        let (cb_count, record_count) = match transfer.policy {
            Policy::Single => (1, 1),
            Policy::DoubleRecord => (1, 2),
            Policy::DoubleCommandBuffer => (2, 1),
        };
        let (cb, cb2) = family.command_buffers();
        for cmds in [cb, cb2].iter_mut().take(cb_count) {
            cmds.begin()?;
            for _ in 0..record_count {
                cmds.pipeline_barrier(
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    &buffer_barriers,
                    &image_barriers,
                );
            }
            cmds.end()?;
        }

        if transfer.queue_family.is_some() {
            let handles = [
                family.command_buffer.handle(),
                family.command_buffer2.handle(),
            ];
            let submit_info = vk::SubmitInfo {
                command_buffer_count: cb_count as _,
                p_command_buffers: handles.as_ptr(),
                ..Default::default()
            };
            unsafe { family.queue.submit(&[submit_info], vk::Fence::null())?; }
            family.queue.wait_idle()?;
        }

        let ok = if transfer.positive {
            monitor.verify_not_found()
        } else {
            monitor.verify_found()
        };
        self.context.reset()?;
        Ok(ok)
    }
}

fn ownership_transfer_op(
    monitor: &Monitor,
    cmds: &mut CommandBuffer,
    src_stages: vk::PipelineStageFlags,
    dst_stages: vk::PipelineStageFlags,
    buffer_barrier: Option<&vk::BufferMemoryBarrier>,
    image_barrier: Option<&vk::ImageMemoryBarrier>,
) -> HarnessResult<bool> {
    monitor.expect_success();
    cmds.begin()?;
    cmds.pipeline_barrier(
        src_stages,
        dst_stages,
        buffer_barrier.map_or(&[][..], std::slice::from_ref),
        image_barrier.map_or(&[][..], std::slice::from_ref),
    );
    cmds.end()?;
    cmds.submit_and_wait()?;
    Ok(monitor.verify_not_found())
}

/// Releases on `from`'s family and acquires on `to`'s, expecting both
/// halves to be silent. Each command buffer is submitted to its own
/// pool's queue.
pub fn valid_ownership_transfer(
    monitor: &Monitor,
    from: &mut CommandBuffer,
    to: &mut CommandBuffer,
    src_stages: vk::PipelineStageFlags,
    dst_stages: vk::PipelineStageFlags,
    buffer_barrier: Option<&vk::BufferMemoryBarrier>,
    image_barrier: Option<&vk::ImageMemoryBarrier>,
) -> HarnessResult<bool> {
    let released = ownership_transfer_op(
        monitor,
        from,
        src_stages,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        buffer_barrier,
        image_barrier,
    )?;
    let acquired = ownership_transfer_op(
        monitor,
        to,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stages,
        buffer_barrier,
        image_barrier,
    )?;
    Ok(released && acquired)
}
