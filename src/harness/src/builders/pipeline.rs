use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use crate::*;

const MAIN: &[u8] = b"main\0";

fn main_name() -> &'static CStr {
    unsafe { CStr::from_bytes_with_nul_unchecked(MAIN) }
}

fn stage_info(stage: vk::ShaderStageFlags, module: &ShaderModule) ->
    vk::PipelineShaderStageCreateInfo
{
    vk::PipelineShaderStageCreateInfo {
        stage,
        module: module.handle(),
        p_name: main_name().as_ptr(),
        ..Default::default()
    }
}

fn default_dsl_bindings() -> Vec<vk::DescriptorSetLayoutBinding> {
    crate::bindings! { (0, UNIFORM_BUFFER) }.to_vec()
}

/// Grows `items` with copies of its last element (or `fill`) until it
/// holds `count` elements, so that counts raised by a test never read
/// past the end.
fn pad<T: Copy>(items: &mut Vec<T>, count: u32, fill: T) {
    while items.len() < count as usize {
        let last = items.last().copied().unwrap_or(fill);
        items.push(last);
    }
}

/// A pipeline under construction. `oneshot_test` drives implementors
/// through the same steps as a hand-written test.
pub trait PipelineHelper: Sized {
    /// Fills in legal defaults and builds the shader modules.
    fn new(fw: &Framework) -> HarnessResult<Self>;

    /// Builds the descriptor set layout, pipeline layout and cache from
    /// the (possibly modified) info.
    fn init_state(&mut self) -> HarnessResult<()>;

    fn create_pipeline(&mut self) -> HarnessResult<()>;

    fn pipeline(&self) -> Option<&Pipeline>;
}

/// Builds a graphics pipeline for the framework's render pass. Every
/// field starts out legal; tests change one before creating.
#[derive(Debug)]
pub struct CreatePipelineHelper {
    device: Arc<Device>,
    pipeline: Option<Pipeline>,
    pipeline_cache: Option<PipelineCache>,
    pipeline_layout: Option<PipelineLayout>,
    descriptor_set: Option<OneOffDescriptorSet>,
    shaders: Vec<ShaderModule>,

    pub dsl_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub shader_stages: Vec<vk::PipelineShaderStageCreateInfo>,
    pub vi_ci: vk::PipelineVertexInputStateCreateInfo,
    pub ia_ci: vk::PipelineInputAssemblyStateCreateInfo,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub vp_state_ci: vk::PipelineViewportStateCreateInfo,
    pub rs_state_ci: vk::PipelineRasterizationStateCreateInfo,
    pub ms_ci: vk::PipelineMultisampleStateCreateInfo,
    pub cb_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub cb_ci: vk::PipelineColorBlendStateCreateInfo,
    pub dyn_states: Vec<vk::DynamicState>,
    dyn_state_ci: vk::PipelineDynamicStateCreateInfo,
    pub gp_ci: vk::GraphicsPipelineCreateInfo,
}

impl CreatePipelineHelper {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn descriptor_set(&self) -> Option<&OneOffDescriptorSet> {
        self.descriptor_set.as_ref()
    }

    pub fn pipeline_layout(&self) -> Option<&PipelineLayout> {
        self.pipeline_layout.as_ref()
    }

    /// Points the create info at the helper's own sub-structures. Run
    /// right before creation because the helper may have moved.
    fn late_bind(&mut self) {
        let default_viewport = vk::Viewport {
            width: 64.0,
            height: 64.0,
            max_depth: 1.0,
            ..Default::default()
        };
        pad(&mut self.viewports, self.vp_state_ci.viewport_count,
            default_viewport);
        pad(&mut self.scissors, self.vp_state_ci.scissor_count,
            Default::default());
        self.vp_state_ci.p_viewports = self.viewports.c_ptr();
        self.vp_state_ci.p_scissors = self.scissors.c_ptr();

        pad(&mut self.cb_attachments, self.cb_ci.attachment_count,
            Default::default());
        self.cb_ci.p_attachments = self.cb_attachments.c_ptr();

        self.dyn_state_ci = vk::PipelineDynamicStateCreateInfo {
            dynamic_state_count: self.dyn_states.len() as _,
            p_dynamic_states: self.dyn_states.c_ptr(),
            ..Default::default()
        };

        let gp = &mut self.gp_ci;
        gp.stage_count = self.shader_stages.len() as _;
        gp.p_stages = self.shader_stages.c_ptr();
        gp.p_vertex_input_state = &self.vi_ci;
        gp.p_input_assembly_state = &self.ia_ci;
        gp.p_viewport_state = &self.vp_state_ci;
        gp.p_rasterization_state = &self.rs_state_ci;
        gp.p_multisample_state = &self.ms_ci;
        gp.p_color_blend_state = &self.cb_ci;
        gp.p_dynamic_state = if self.dyn_states.is_empty() {
            std::ptr::null()
        } else {
            &self.dyn_state_ci
        };
        if let Some(ref layout) = self.pipeline_layout {
            gp.layout = layout.handle();
        }
    }
}

impl PipelineHelper for CreatePipelineHelper {
    fn new(fw: &Framework) -> HarnessResult<Self> {
        let device = Arc::clone(fw.device()?);
        let render_pass = fw.render_pass()?;

        let vs = ShaderModule::new(Arc::clone(&device), &vertex_spirv())?;
        let fs = ShaderModule::new(Arc::clone(&device), &fragment_spirv())?;
        let shader_stages = vec![
            stage_info(vk::ShaderStageFlags::VERTEX, &vs),
            stage_info(vk::ShaderStageFlags::FRAGMENT, &fs),
        ];

        let viewports = vec![vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: 64.0,
            height: 64.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = vec![vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: 64, height: 64 },
        }];
        let cb_attachments = vec![vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        }];

        Ok(Self {
            device,
            pipeline: None,
            pipeline_cache: None,
            pipeline_layout: None,
            descriptor_set: None,
            shaders: vec![vs, fs],
            dsl_bindings: default_dsl_bindings(),
            push_constant_ranges: Vec::new(),
            shader_stages,
            vi_ci: Default::default(),
            ia_ci: vk::PipelineInputAssemblyStateCreateInfo {
                topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
                ..Default::default()
            },
            viewports,
            scissors,
            vp_state_ci: vk::PipelineViewportStateCreateInfo {
                viewport_count: 1,
                scissor_count: 1,
                ..Default::default()
            },
            rs_state_ci: vk::PipelineRasterizationStateCreateInfo {
                depth_clamp_enable: vk::FALSE,
                rasterizer_discard_enable: vk::FALSE,
                polygon_mode: vk::PolygonMode::FILL,
                cull_mode: vk::CullModeFlags::BACK,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth_bias_enable: vk::FALSE,
                line_width: 1.0,
                ..Default::default()
            },
            ms_ci: vk::PipelineMultisampleStateCreateInfo {
                rasterization_samples: vk::SampleCountFlags::TYPE_1,
                sample_shading_enable: vk::FALSE,
                min_sample_shading: 1.0,
                ..Default::default()
            },
            cb_attachments,
            cb_ci: vk::PipelineColorBlendStateCreateInfo {
                logic_op_enable: vk::FALSE,
                logic_op: vk::LogicOp::COPY,
                attachment_count: 1,
                blend_constants: [1.0, 0.0, 0.0, 0.0],
                ..Default::default()
            },
            dyn_states: Vec::new(),
            dyn_state_ci: Default::default(),
            gp_ci: vk::GraphicsPipelineCreateInfo {
                flags: vk::PipelineCreateFlags::DISABLE_OPTIMIZATION,
                render_pass,
                subpass: 0,
                ..Default::default()
            },
        })
    }

    fn init_state(&mut self) -> HarnessResult<()> {
        let set = OneOffDescriptorSet::new(
            Arc::clone(&self.device), &self.dsl_bindings)?;
        let layout = PipelineLayout::new(
            Arc::clone(&self.device),
            &[set.layout()],
            &self.push_constant_ranges,
        )?;
        self.descriptor_set = Some(set);
        self.pipeline_layout = Some(layout);
        self.pipeline_cache = Some(PipelineCache::new(Arc::clone(&self.device))?);
        Ok(())
    }

    fn create_pipeline(&mut self) -> HarnessResult<()> {
        self.late_bind();
        self.pipeline.take();
        let cache = self.pipeline_cache.as_ref()
            .map_or(vk::PipelineCache::null(), |c| c.handle());
        self.pipeline = Some(Pipeline::new_graphics(
            Arc::clone(&self.device), cache, &self.gp_ci)?);
        Ok(())
    }

    fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }
}

/// The compute counterpart of `CreatePipelineHelper`.
#[derive(Debug)]
pub struct CreateComputePipelineHelper {
    device: Arc<Device>,
    pipeline: Option<Pipeline>,
    pipeline_cache: Option<PipelineCache>,
    pipeline_layout: Option<PipelineLayout>,
    descriptor_set: Option<OneOffDescriptorSet>,
    shader: ShaderModule,

    pub dsl_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub cp_ci: vk::ComputePipelineCreateInfo,
}

impl CreateComputePipelineHelper {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn descriptor_set(&self) -> Option<&OneOffDescriptorSet> {
        self.descriptor_set.as_ref()
    }

    pub fn shader(&self) -> &ShaderModule {
        &self.shader
    }
}

impl PipelineHelper for CreateComputePipelineHelper {
    fn new(fw: &Framework) -> HarnessResult<Self> {
        let device = Arc::clone(fw.device()?);
        let shader = ShaderModule::new(Arc::clone(&device), &compute_spirv())?;
        let cp_ci = vk::ComputePipelineCreateInfo {
            stage: stage_info(vk::ShaderStageFlags::COMPUTE, &shader),
            ..Default::default()
        };
        Ok(Self {
            device,
            pipeline: None,
            pipeline_cache: None,
            pipeline_layout: None,
            descriptor_set: None,
            shader,
            dsl_bindings: default_dsl_bindings(),
            push_constant_ranges: Vec::new(),
            cp_ci,
        })
    }

    fn init_state(&mut self) -> HarnessResult<()> {
        let set = OneOffDescriptorSet::new(
            Arc::clone(&self.device), &self.dsl_bindings)?;
        let layout = PipelineLayout::new(
            Arc::clone(&self.device),
            &[set.layout()],
            &self.push_constant_ranges,
        )?;
        self.descriptor_set = Some(set);
        self.pipeline_layout = Some(layout);
        self.pipeline_cache = Some(PipelineCache::new(Arc::clone(&self.device))?);
        Ok(())
    }

    fn create_pipeline(&mut self) -> HarnessResult<()> {
        if let Some(ref layout) = self.pipeline_layout {
            self.cp_ci.layout = layout.handle();
        }
        self.pipeline.take();
        let cache = self.pipeline_cache.as_ref()
            .map_or(vk::PipelineCache::null(), |c| c.handle());
        self.pipeline = Some(Pipeline::new_compute(
            Arc::clone(&self.device), cache, &self.cp_ci)?);
        Ok(())
    }

    fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }
}

pub const RAY_TRACING_PIPELINE_EXTENSION: &str = "VK_KHR_ray_tracing_pipeline";

fn general_group(index: u32) -> vk::RayTracingShaderGroupCreateInfoKHR {
    vk::RayTracingShaderGroupCreateInfoKHR {
        ty: vk::RayTracingShaderGroupTypeKHR::GENERAL,
        general_shader: index,
        closest_hit_shader: vk::SHADER_UNUSED_KHR,
        any_hit_shader: vk::SHADER_UNUSED_KHR,
        intersection_shader: vk::SHADER_UNUSED_KHR,
        ..Default::default()
    }
}

/// The ray tracing counterpart of `CreatePipelineHelper`: one raygen
/// and one miss shader, each in a general group.
#[derive(Debug)]
pub struct CreateRayTracingPipelineHelper {
    device: Arc<Device>,
    pipeline: Option<Pipeline>,
    pipeline_cache: Option<PipelineCache>,
    pipeline_layout: Option<PipelineLayout>,
    descriptor_set: Option<OneOffDescriptorSet>,
    shaders: Vec<ShaderModule>,

    pub dsl_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub shader_stages: Vec<vk::PipelineShaderStageCreateInfo>,
    pub groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR>,
    pub rp_ci: vk::RayTracingPipelineCreateInfoKHR,
}

impl CreateRayTracingPipelineHelper {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn descriptor_set(&self) -> Option<&OneOffDescriptorSet> {
        self.descriptor_set.as_ref()
    }

    fn late_bind(&mut self) {
        let rp = &mut self.rp_ci;
        rp.stage_count = self.shader_stages.len() as _;
        rp.p_stages = self.shader_stages.c_ptr();
        rp.group_count = self.groups.len() as _;
        rp.p_groups = self.groups.c_ptr();
        if let Some(ref layout) = self.pipeline_layout {
            rp.layout = layout.handle();
        }
    }
}

impl PipelineHelper for CreateRayTracingPipelineHelper {
    fn new(fw: &Framework) -> HarnessResult<Self> {
        let device = Arc::clone(fw.device()?);
        if !device.has_extension(RAY_TRACING_PIPELINE_EXTENSION) {
            return Err(Error::unsupported(format!(
                "{} not enabled", RAY_TRACING_PIPELINE_EXTENSION)));
        }
        let raygen = ShaderModule::new(Arc::clone(&device), &raygen_spirv())?;
        let miss = ShaderModule::new(Arc::clone(&device), &miss_spirv())?;
        let shader_stages = vec![
            stage_info(vk::ShaderStageFlags::RAYGEN_KHR, &raygen),
            stage_info(vk::ShaderStageFlags::MISS_KHR, &miss),
        ];
        Ok(Self {
            device,
            pipeline: None,
            pipeline_cache: None,
            pipeline_layout: None,
            descriptor_set: None,
            shaders: vec![raygen, miss],
            dsl_bindings: default_dsl_bindings(),
            push_constant_ranges: Vec::new(),
            shader_stages,
            groups: vec![general_group(0), general_group(1)],
            rp_ci: vk::RayTracingPipelineCreateInfoKHR {
                max_pipeline_ray_recursion_depth: 1,
                base_pipeline_index: -1,
                ..Default::default()
            },
        })
    }

    fn init_state(&mut self) -> HarnessResult<()> {
        let set = OneOffDescriptorSet::new(
            Arc::clone(&self.device), &self.dsl_bindings)?;
        let layout = PipelineLayout::new(
            Arc::clone(&self.device),
            &[set.layout()],
            &self.push_constant_ranges,
        )?;
        self.descriptor_set = Some(set);
        self.pipeline_layout = Some(layout);
        self.pipeline_cache = Some(PipelineCache::new(Arc::clone(&self.device))?);
        Ok(())
    }

    fn create_pipeline(&mut self) -> HarnessResult<()> {
        self.late_bind();
        self.pipeline.take();
        let cache = self.pipeline_cache.as_ref()
            .map_or(vk::PipelineCache::null(), |c| c.handle());
        self.pipeline = Some(Pipeline::new_ray_tracing(
            Arc::clone(&self.device), cache, &self.rp_ci)?);
        Ok(())
    }

    fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding() {
        let mut items = vec![3];
        pad(&mut items, 3, 0);
        assert_eq!(items, [3, 3, 3]);
        let mut empty: Vec<u32> = Vec::new();
        pad(&mut empty, 2, 7);
        assert_eq!(empty, [7, 7]);
        pad(&mut empty, 1, 0);
        assert_eq!(empty.len(), 2);
    }
}
