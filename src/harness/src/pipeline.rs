use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;

use crate::*;

device_object! {
    pub struct PipelineLayout(vk::PipelineLayout) => destroy_pipeline_layout;
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[&DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> HarnessResult<Self> {
        let set_layouts: Vec<_> =
            set_layouts.iter().map(|layout| layout.handle()).collect();
        let create_info = vk::PipelineLayoutCreateInfo {
            set_layout_count: set_layouts.len() as _,
            p_set_layouts: set_layouts.c_ptr(),
            push_constant_range_count: push_constant_ranges.len() as _,
            p_push_constant_ranges: push_constant_ranges.c_ptr(),
            ..Default::default()
        };
        Self::from_info(device, &create_info)
    }

    pub fn from_info(
        device: Arc<Device>,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> HarnessResult<Self> {
        let inner =
            unsafe { device.table().create_pipeline_layout(info, None)? };
        Ok(Self { device, inner })
    }
}

device_object! {
    pub struct PipelineCache(vk::PipelineCache) => destroy_pipeline_cache;
}

impl PipelineCache {
    pub fn new(device: Arc<Device>) -> HarnessResult<Self> {
        let create_info = Default::default();
        let inner = unsafe {
            device.table().create_pipeline_cache(&create_info, None)?
        };
        Ok(Self { device, inner })
    }
}

device_object! {
    pub struct Pipeline(vk::Pipeline) => destroy_pipeline;
}

/// Keeps the first pipeline of a batch and destroys the rest.
fn first_pipeline(
    device: Arc<Device>,
    res: Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>,
) -> HarnessResult<Pipeline> {
    let (pipelines, err) = match res {
        Ok(pipelines) => (pipelines, None),
        Err((pipelines, err)) => (pipelines, Some(err)),
    };
    let mut pipelines = pipelines.into_iter()
        .filter(|&p| p != vk::Pipeline::null());
    let first = pipelines.next();
    for rest in pipelines {
        unsafe { device.table().destroy_pipeline(rest, None); }
    }
    match (first, err) {
        (Some(inner), None) => Ok(Pipeline { device, inner }),
        (Some(inner), Some(err)) => {
            unsafe { device.table().destroy_pipeline(inner, None); }
            Err(err.into())
        },
        (None, err) => Err(err.unwrap_or(vk::Result::ERROR_UNKNOWN).into()),
    }
}

impl Pipeline {
    pub fn new_graphics(
        device: Arc<Device>,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> HarnessResult<Self> {
        let res = unsafe {
            device.table().create_graphics_pipelines(
                cache, std::slice::from_ref(info), None)
        };
        first_pipeline(device, res)
    }

    pub fn new_compute(
        device: Arc<Device>,
        cache: vk::PipelineCache,
        info: &vk::ComputePipelineCreateInfo,
    ) -> HarnessResult<Self> {
        let res = unsafe {
            device.table().create_compute_pipelines(
                cache, std::slice::from_ref(info), None)
        };
        first_pipeline(device, res)
    }

    /// Needs `VK_KHR_ray_tracing_pipeline` on the device.
    pub fn new_ray_tracing(
        device: Arc<Device>,
        cache: vk::PipelineCache,
        info: &vk::RayTracingPipelineCreateInfoKHR,
    ) -> HarnessResult<Self> {
        let loader = khr::RayTracingPipeline::new(
            device.instance().table(), device.table());
        let res = unsafe {
            loader.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                cache,
                std::slice::from_ref(info),
                None,
            )
        };
        first_pipeline(device, res.map_err(|err| (Vec::new(), err)))
    }
}
