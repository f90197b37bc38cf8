//! Sane defaults for create infos, and one-call drivers that create an
//! object under a single expectation.
use std::sync::Arc;

use ash::vk;
use log::debug;

use crate::*;

mod pipeline;

pub use pipeline::*;

pub fn default_buffer_info() -> vk::BufferCreateInfo {
    vk::BufferCreateInfo {
        size: 256,
        usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    }
}

pub fn default_image_info() -> vk::ImageCreateInfo {
    image_2d_info(
        vk::Format::R8G8B8A8_UNORM,
        32,
        32,
        vk::ImageUsageFlags::SAMPLED,
    )
}

/// A view covering every level and layer of `image`.
pub fn default_image_view_info(image: &Image) -> vk::ImageViewCreateInfo {
    let view_type = match image.ty() {
        vk::ImageType::TYPE_1D => vk::ImageViewType::TYPE_1D,
        vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
        _ => vk::ImageViewType::TYPE_2D,
    };
    vk::ImageViewCreateInfo {
        image: image.handle(),
        view_type,
        format: image.format(),
        subresource_range: image.subresource_range(),
        ..Default::default()
    }
}

pub fn default_buffer_view_info(buffer: &Buffer) -> vk::BufferViewCreateInfo {
    vk::BufferViewCreateInfo {
        buffer: buffer.handle(),
        format: vk::Format::R32_SFLOAT,
        offset: 0,
        range: vk::WHOLE_SIZE,
        ..Default::default()
    }
}

pub fn default_dsl_info(bindings: &[vk::DescriptorSetLayoutBinding]) ->
    vk::DescriptorSetLayoutCreateInfo
{
    vk::DescriptorSetLayoutCreateInfo {
        binding_count: bindings.len() as _,
        p_bindings: bindings.c_ptr(),
        ..Default::default()
    }
}

/// A bottom-level structure at the start of its buffer. `buffer` is
/// filled in at creation.
pub fn default_accel_info() -> vk::AccelerationStructureCreateInfoKHR {
    vk::AccelerationStructureCreateInfoKHR {
        offset: 0,
        size: 4096,
        ty: vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
        ..Default::default()
    }
}

/// Creates one object while expecting `id`, or nothing at all when
/// `id` is `None`. The object is destroyed after verification.
fn create_test<T>(
    monitor: &Monitor,
    id: Option<&str>,
    create: impl FnOnce() -> HarnessResult<T>,
) -> bool {
    match id {
        Some(id) => monitor.set_desired_failure_msg(
            Severities::ERROR | Severities::WARNING, id),
        None => monitor.expect_success(),
    }
    let res = create();
    let ok = match id {
        Some(_) => monitor.verify_found(),
        None => monitor.verify_not_found(),
    };
    if let Err(ref e) = res {
        debug!("creation returned {}", e);
    }
    ok
}

pub fn create_sampler_test(
    fw: &Framework,
    info: &vk::SamplerCreateInfo,
    id: Option<&str>,
) -> HarnessResult<bool> {
    let device = fw.device()?;
    Ok(create_test(fw.monitor(), id, || {
        Sampler::new(Arc::clone(device), info)
    }))
}

pub fn create_buffer_test(
    fw: &Framework,
    info: &vk::BufferCreateInfo,
    id: Option<&str>,
) -> HarnessResult<bool> {
    let device = fw.device()?;
    Ok(create_test(fw.monitor(), id, || {
        Buffer::init_no_mem(Arc::clone(device), info)
    }))
}

pub fn create_image_test(
    fw: &Framework,
    info: &vk::ImageCreateInfo,
    id: Option<&str>,
) -> HarnessResult<bool> {
    let device = fw.device()?;
    Ok(create_test(fw.monitor(), id, || {
        Image::init_no_mem(Arc::clone(device), info)
    }))
}

pub fn create_image_view_test(
    fw: &Framework,
    info: &vk::ImageViewCreateInfo,
    id: Option<&str>,
) -> HarnessResult<bool> {
    let device = fw.device()?;
    Ok(create_test(fw.monitor(), id, || {
        ImageView::new(Arc::clone(device), info)
    }))
}

pub fn create_buffer_view_test(
    fw: &Framework,
    info: &vk::BufferViewCreateInfo,
    id: Option<&str>,
) -> HarnessResult<bool> {
    let device = fw.device()?;
    Ok(create_test(fw.monitor(), id, || {
        BufferView::new(Arc::clone(device), info)
    }))
}

/// Builds a pipeline with `H`'s defaults, applies `mutate`, and creates
/// it while expecting every identifier in `ids`. An empty list expects
/// a clean creation instead.
pub fn oneshot_test<H, F>(
    fw: &Framework,
    mutate: F,
    filter: Severities,
    ids: &[&str],
) -> HarnessResult<bool>
where
    H: PipelineHelper,
    F: FnOnce(&mut H),
{
    let monitor = fw.monitor();
    let mut helper = H::new(fw)?;
    mutate(&mut helper);
    helper.init_state()?;
    if ids.is_empty() {
        monitor.expect_success();
    }
    for &id in ids {
        monitor.set_desired_failure_msg(filter, id);
    }
    if let Err(e) = helper.create_pipeline() {
        debug!("pipeline creation returned {}", e);
    }
    Ok(if ids.is_empty() {
        monitor.verify_not_found()
    } else {
        monitor.verify_found()
    })
}
