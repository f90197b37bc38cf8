//! Creation-time validity rules. Each function inspects a create info
//! against the device model and returns every rule it breaks.
use ash::vk::{self, Handle};

use super::driver::*;
use crate::shader::{execution_model, SPIRV_MAGIC};
use crate::util::slice;

pub(super) type Violation = (&'static str, String);

macro_rules! check {
    ($out:expr, $ok:expr, $id:expr, $($fmt:tt)+) => {
        if !$ok {
            $out.push(($id, format!($($fmt)+)));
        }
    };
}

fn valid_families(indices: &[u32], family_count: u32) -> bool {
    indices.iter().all(|&i| i < family_count)
}

pub(super) unsafe fn buffer(
    info: &vk::BufferCreateInfo,
    family_count: u32,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check!(out, info.size > 0, "VUID-VkBufferCreateInfo-size-00912",
        "vkCreateBuffer(): pCreateInfo->size must be greater than 0.");
    check!(out, !info.usage.is_empty(),
        "VUID-VkBufferCreateInfo-usage-requiredbitmask",
        "vkCreateBuffer: value of pCreateInfo->usage must not be 0.");
    if info.sharing_mode == vk::SharingMode::CONCURRENT {
        let families = slice(
            info.p_queue_family_indices,
            info.queue_family_index_count,
        );
        check!(out, families.len() >= 2,
            "VUID-VkBufferCreateInfo-sharingMode-00914",
            "vkCreateBuffer(): if sharingMode is VK_SHARING_MODE_CONCURRENT, \
             queueFamilyIndexCount must be greater than 1.");
        check!(out, valid_families(families, family_count),
            "VUID-VkBufferCreateInfo-sharingMode-01419",
            "vkCreateBuffer(): pCreateInfo->pQueueFamilyIndices contains an \
             index not less than the queue family count ({}).",
            family_count);
    }
    out
}

fn max_dimension(limits: &vk::PhysicalDeviceLimits, ty: vk::ImageType) -> u32 {
    match ty {
        vk::ImageType::TYPE_1D => limits.max_image_dimension1_d,
        vk::ImageType::TYPE_3D => limits.max_image_dimension3_d,
        _ => limits.max_image_dimension2_d,
    }
}

pub(super) fn mip_count(extent: vk::Extent3D) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth).max(1);
    32 - largest.leading_zeros()
}

pub(super) unsafe fn image(info: &vk::ImageCreateInfo, gpu: &Gpu) ->
    Vec<Violation>
{
    let mut out = Vec::new();
    let extent = info.extent;
    check!(out, extent.width > 0, "VUID-VkImageCreateInfo-extent-00944",
        "vkCreateImage(): pCreateInfo->extent.width must be greater than 0.");
    check!(out, extent.height > 0, "VUID-VkImageCreateInfo-extent-00945",
        "vkCreateImage(): pCreateInfo->extent.height must be greater than 0.");
    check!(out, extent.depth > 0, "VUID-VkImageCreateInfo-extent-00946",
        "vkCreateImage(): pCreateInfo->extent.depth must be greater than 0.");
    check!(out, info.mip_levels > 0, "VUID-VkImageCreateInfo-mipLevels-00947",
        "vkCreateImage(): pCreateInfo->mipLevels must be greater than 0.");
    check!(out, info.array_layers > 0,
        "VUID-VkImageCreateInfo-arrayLayers-00948",
        "vkCreateImage(): pCreateInfo->arrayLayers must be greater than 0.");
    if extent.width > 0 && extent.height > 0 && extent.depth > 0 {
        let max_mips = mip_count(extent);
        check!(out, info.mip_levels <= max_mips,
            "VUID-VkImageCreateInfo-mipLevels-00958",
            "vkCreateImage(): pCreateInfo->mipLevels ({}) is greater than the \
             number of levels in a complete mipmap chain ({}).",
            info.mip_levels, max_mips);
    }
    let max = max_dimension(&gpu.properties.limits, info.image_type);
    check!(out, extent.width <= max && extent.height <= max,
        "VUID-VkImageCreateInfo-extent-02252",
        "vkCreateImage(): pCreateInfo->extent ({}x{}) exceeds the maximum \
         image dimension ({}).",
        extent.width, extent.height, max);
    if info.image_type == vk::ImageType::TYPE_1D {
        check!(out, extent.height == 1 && extent.depth == 1,
            "VUID-VkImageCreateInfo-imageType-00956",
            "vkCreateImage(): a 1D image must have height and depth of 1.");
    } else if info.image_type == vk::ImageType::TYPE_2D {
        check!(out, extent.depth == 1,
            "VUID-VkImageCreateInfo-imageType-00957",
            "vkCreateImage(): a 2D image must have a depth of 1.");
    }
    if info.sharing_mode == vk::SharingMode::CONCURRENT {
        let families = slice(
            info.p_queue_family_indices,
            info.queue_family_index_count,
        );
        check!(out, families.len() >= 2,
            "VUID-VkImageCreateInfo-sharingMode-00942",
            "vkCreateImage(): if sharingMode is VK_SHARING_MODE_CONCURRENT, \
             queueFamilyIndexCount must be greater than 1.");
        check!(out, valid_families(families, gpu.family_count()),
            "VUID-VkImageCreateInfo-sharingMode-01420",
            "vkCreateImage(): pCreateInfo->pQueueFamilyIndices contains an \
             index not less than the queue family count ({}).",
            gpu.family_count());
    }
    check!(out, !info.usage.is_empty(),
        "VUID-VkImageCreateInfo-usage-requiredbitmask",
        "vkCreateImage: value of pCreateInfo->usage must not be 0.");
    check!(out, info.initial_layout == vk::ImageLayout::UNDEFINED
            || info.initial_layout == vk::ImageLayout::PREINITIALIZED,
        "VUID-VkImageCreateInfo-initialLayout-00993",
        "vkCreateImage(): initialLayout is {:?}; it must be UNDEFINED or \
         PREINITIALIZED.",
        info.initial_layout);
    out
}

/// Format features an image usage requires for the given tiling.
fn required_features(usage: vk::ImageUsageFlags) -> vk::FormatFeatureFlags {
    let mut features = vk::FormatFeatureFlags::empty();
    if usage.contains(vk::ImageUsageFlags::SAMPLED) {
        features |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    if usage.contains(vk::ImageUsageFlags::STORAGE) {
        features |= vk::FormatFeatureFlags::STORAGE_IMAGE;
    }
    if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        features |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        features |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    features
}

pub(super) fn image_view(
    info: &vk::ImageViewCreateInfo,
    image: &ImageState,
    gpu: &Gpu,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check!(out, image.memory.is_some(),
        "VUID-VkImageViewCreateInfo-image-01020",
        "vkCreateImageView(): image 0x{:x} used without first calling \
         vkBindImageMemory.",
        info.image.as_raw());
    check!(out, image.mutable_format || info.format == image.format,
        "VUID-VkImageViewCreateInfo-image-01762",
        "vkCreateImageView(): format {:?} differs from the image's format {:?} \
         but the image was not created with VK_IMAGE_CREATE_MUTABLE_FORMAT_BIT.",
        info.format, image.format);
    let range = info.subresource_range;
    check!(out, range.level_count != 0,
        "VUID-VkImageSubresourceRange-levelCount-01720",
        "vkCreateImageView(): subresourceRange.levelCount is 0.");
    check!(out, range.layer_count != 0,
        "VUID-VkImageSubresourceRange-layerCount-01721",
        "vkCreateImageView(): subresourceRange.layerCount is 0.");
    let levels = if range.level_count == vk::REMAINING_MIP_LEVELS {
        image.mip_levels.saturating_sub(range.base_mip_level).max(1)
    } else {
        range.level_count
    };
    check!(out, range.base_mip_level < image.mip_levels
            && range.base_mip_level.saturating_add(levels) <= image.mip_levels,
        "VUID-VkImageViewCreateInfo-subresourceRange-01478",
        "vkCreateImageView(): mip levels [{}, {}) exceed the image's {} \
         level(s).",
        range.base_mip_level, range.base_mip_level.saturating_add(levels), image.mip_levels);
    let layers = if range.layer_count == vk::REMAINING_ARRAY_LAYERS {
        image.array_layers.saturating_sub(range.base_array_layer).max(1)
    } else {
        range.layer_count
    };
    check!(out, range.base_array_layer < image.array_layers
            && range.base_array_layer.saturating_add(layers) <= image.array_layers,
        "VUID-VkImageViewCreateInfo-subresourceRange-01480",
        "vkCreateImageView(): array layers [{}, {}) exceed the image's {} \
         layer(s).",
        range.base_array_layer, range.base_array_layer.saturating_add(layers),
        image.array_layers);

    let props = gpu.format_properties(info.format);
    let (available, id) = if image.tiling == vk::ImageTiling::LINEAR {
        (props.linear_tiling_features, "VUID-VkImageViewCreateInfo-usage-02274")
    } else {
        (props.optimal_tiling_features, "VUID-VkImageViewCreateInfo-usage-02275")
    };
    let required = required_features(image.usage);
    check!(out, available.contains(required), id,
        "vkCreateImageView(): format {:?} with tiling {:?} does not support \
         usage {:?} (supported features: {:?}).",
        info.format, image.tiling, image.usage, available);
    out
}

pub(super) fn buffer_view(
    info: &vk::BufferViewCreateInfo,
    buffer: &BufferState,
    gpu: &Gpu,
) -> Vec<Violation> {
    let mut out = Vec::new();
    let limits = &gpu.properties.limits;
    check!(out, buffer.memory.is_some(),
        "VUID-VkBufferViewCreateInfo-buffer-00935",
        "vkCreateBufferView(): buffer 0x{:x} used without first calling \
         vkBindBufferMemory.",
        info.buffer.as_raw());
    check!(out, info.offset < buffer.size,
        "VUID-VkBufferViewCreateInfo-offset-00925",
        "vkCreateBufferView(): offset ({}) must be less than the buffer size \
         ({}).",
        info.offset, buffer.size);
    check!(out, info.offset % limits.min_texel_buffer_offset_alignment == 0,
        "VUID-VkBufferViewCreateInfo-offset-00926",
        "vkCreateBufferView(): offset ({}) must be a multiple of \
         minTexelBufferOffsetAlignment ({}).",
        info.offset, limits.min_texel_buffer_offset_alignment);
    let texel = vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER
        | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
    check!(out, buffer.usage.intersects(texel),
        "VUID-VkBufferViewCreateInfo-buffer-00932",
        "vkCreateBufferView(): buffer was created with usage {:?}, which \
         lacks both texel buffer usages.",
        buffer.usage);
    if info.range != vk::WHOLE_SIZE {
        check!(out, info.range > 0, "VUID-VkBufferViewCreateInfo-range-00928",
            "vkCreateBufferView(): range must be greater than 0.");
        check!(out, info.offset.saturating_add(info.range) <= buffer.size,
            "VUID-VkBufferViewCreateInfo-range-00930",
            "vkCreateBufferView(): offset ({}) plus range ({}) exceeds the \
             buffer size ({}).",
            info.offset, info.range, buffer.size);
    }
    let features = gpu.format_properties(info.format).buffer_features;
    if buffer.usage.contains(vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER) {
        check!(out,
            features.contains(vk::FormatFeatureFlags::UNIFORM_TEXEL_BUFFER),
            "VUID-VkBufferViewCreateInfo-buffer-00933",
            "vkCreateBufferView(): format {:?} does not support uniform texel \
             buffers.",
            info.format);
    }
    if buffer.usage.contains(vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER) {
        check!(out,
            features.contains(vk::FormatFeatureFlags::STORAGE_TEXEL_BUFFER),
            "VUID-VkBufferViewCreateInfo-buffer-00934",
            "vkCreateBufferView(): format {:?} does not support storage texel \
             buffers.",
            info.format);
    }
    out
}

pub(super) fn sampler(
    info: &vk::SamplerCreateInfo,
    features: &vk::PhysicalDeviceFeatures,
    limits: &vk::PhysicalDeviceLimits,
) -> Vec<Violation> {
    let mut out = Vec::new();
    if info.anisotropy_enable == vk::TRUE {
        check!(out, features.sampler_anisotropy == vk::TRUE,
            "VUID-VkSamplerCreateInfo-anisotropyEnable-01070",
            "vkCreateSampler(): anisotropic sampling requires the \
             samplerAnisotropy feature.");
        check!(out, info.max_anisotropy >= 1.0
                && info.max_anisotropy <= limits.max_sampler_anisotropy,
            "VUID-VkSamplerCreateInfo-anisotropyEnable-01071",
            "vkCreateSampler(): maxAnisotropy ({}) must be in [1.0, {}].",
            info.max_anisotropy, limits.max_sampler_anisotropy);
    }
    check!(out, info.max_lod >= info.min_lod,
        "VUID-VkSamplerCreateInfo-maxLod-01973",
        "vkCreateSampler(): maxLod ({}) is less than minLod ({}).",
        info.max_lod, info.min_lod);
    check!(out, info.mip_lod_bias.abs() <= limits.max_sampler_lod_bias,
        "VUID-VkSamplerCreateInfo-mipLodBias-01069",
        "vkCreateSampler(): mipLodBias ({}) exceeds maxSamplerLodBias ({}).",
        info.mip_lod_bias, limits.max_sampler_lod_bias);
    if info.unnormalized_coordinates == vk::TRUE {
        check!(out, info.min_filter == info.mag_filter,
            "VUID-VkSamplerCreateInfo-unnormalizedCoordinates-01072",
            "vkCreateSampler(): with unnormalizedCoordinates, minFilter and \
             magFilter must be equal.");
        check!(out, info.mipmap_mode == vk::SamplerMipmapMode::NEAREST,
            "VUID-VkSamplerCreateInfo-unnormalizedCoordinates-01073",
            "vkCreateSampler(): with unnormalizedCoordinates, mipmapMode must \
             be NEAREST.");
        check!(out, info.anisotropy_enable == vk::FALSE,
            "VUID-VkSamplerCreateInfo-unnormalizedCoordinates-01076",
            "vkCreateSampler(): with unnormalizedCoordinates, \
             anisotropyEnable must be VK_FALSE.");
    }
    out
}

pub(super) unsafe fn descriptor_set_layout(
    info: &vk::DescriptorSetLayoutCreateInfo,
) -> (Vec<LayoutBinding>, Vec<Violation>) {
    let mut out = Vec::new();
    let mut bindings: Vec<LayoutBinding> = Vec::new();
    for b in slice(info.p_bindings, info.binding_count) {
        check!(out, !bindings.iter().any(|x| x.binding == b.binding),
            "VUID-VkDescriptorSetLayoutCreateInfo-binding-00279",
            "vkCreateDescriptorSetLayout(): duplicated binding number in \
             pBindings ({}).",
            b.binding);
        bindings.push(LayoutBinding {
            binding: b.binding,
            ty: b.descriptor_type,
            count: b.descriptor_count,
        });
    }
    (bindings, out)
}

pub(super) unsafe fn descriptor_pool(info: &vk::DescriptorPoolCreateInfo) ->
    Vec<Violation>
{
    let mut out = Vec::new();
    check!(out, info.max_sets > 0,
        "VUID-VkDescriptorPoolCreateInfo-maxSets-00301",
        "vkCreateDescriptorPool(): maxSets must be greater than 0.");
    for size in slice(info.p_pool_sizes, info.pool_size_count) {
        check!(out, size.descriptor_count > 0,
            "VUID-VkDescriptorPoolSize-descriptorCount-00302",
            "vkCreateDescriptorPool(): descriptorCount for {:?} must be \
             greater than 0.",
            size.ty);
    }
    out
}

pub(super) unsafe fn pipeline_layout(
    info: &vk::PipelineLayoutCreateInfo,
    limits: &vk::PhysicalDeviceLimits,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check!(out, info.set_layout_count <= limits.max_bound_descriptor_sets,
        "VUID-VkPipelineLayoutCreateInfo-setLayoutCount-00286",
        "vkCreatePipelineLayout(): setLayoutCount ({}) exceeds \
         maxBoundDescriptorSets ({}).",
        info.set_layout_count, limits.max_bound_descriptor_sets);
    out
}

const OP_ENTRY_POINT: u32 = 15;

/// Reads the entry points out of a SPIR-V module.
pub(super) fn entry_points(words: &[u32]) -> Vec<EntryPoint> {
    let mut points = Vec::new();
    let mut i = 5;
    while i < words.len() {
        let count = (words[i] >> 16) as usize;
        let opcode = words[i] & 0xffff;
        if count == 0 || i + count > words.len() {
            break;
        }
        if opcode == OP_ENTRY_POINT && count >= 4 {
            let bytes: Vec<u8> = words[i + 3..i + count].iter()
                .flat_map(|w| w.to_le_bytes().to_vec())
                .take_while(|&b| b != 0)
                .collect();
            points.push(EntryPoint {
                model: words[i + 1],
                name: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        i += count;
    }
    points
}

pub(super) unsafe fn shader_module(info: &vk::ShaderModuleCreateInfo) ->
    (Vec<EntryPoint>, Vec<Violation>)
{
    let mut out = Vec::new();
    let size = info.code_size;
    check!(out, size > 0 && size % 4 == 0,
        "VUID-VkShaderModuleCreateInfo-codeSize-01085",
        "vkCreateShaderModule(): codeSize ({}) must be a non-zero multiple \
         of 4.",
        size);
    if !out.is_empty() || info.p_code.is_null() {
        return (Vec::new(), out);
    }
    let words = std::slice::from_raw_parts(info.p_code, size / 4);
    check!(out, words.len() >= 5 && words[0] == SPIRV_MAGIC,
        "VUID-VkShaderModuleCreateInfo-pCode-01376",
        "vkCreateShaderModule(): pCode is not a SPIR-V module (bad magic \
         number).");
    if !out.is_empty() {
        return (Vec::new(), out);
    }
    (entry_points(words), out)
}

unsafe fn shader_stage(
    out: &mut Vec<Violation>,
    stage: &vk::PipelineShaderStageCreateInfo,
    objects: &Objects,
) {
    let name = crate::util::string_from_ptr(stage.p_name);
    let points = match objects.shaders.get(&stage.module.as_raw()) {
        Some(points) => points,
        None => return,
    };
    let model = execution_model(stage.stage);
    check!(out, points.iter().any(|p| Some(p.model) == model && p.name == name),
        "VUID-VkPipelineShaderStageCreateInfo-pName-00707",
        "vkCreatePipeline(): no entry point matching \"{}\" for stage {:?} in \
         module 0x{:x}.",
        name, stage.stage, stage.module.as_raw());
}

pub(super) unsafe fn graphics_pipeline(
    info: &vk::GraphicsPipelineCreateInfo,
    features: &vk::PhysicalDeviceFeatures,
    limits: &vk::PhysicalDeviceLimits,
    objects: &Objects,
) -> Vec<Violation> {
    let mut out = Vec::new();

    let stages = slice(info.p_stages, info.stage_count);
    check!(out,
        stages.iter().any(|s| s.stage == vk::ShaderStageFlags::VERTEX),
        "VUID-VkGraphicsPipelineCreateInfo-stage-00727",
        "vkCreateGraphicsPipelines(): no vertex shader stage.");
    for (i, stage) in stages.iter().enumerate() {
        check!(out, !stages[..i].iter().any(|s| s.stage == stage.stage),
            "VUID-VkGraphicsPipelineCreateInfo-stage-00726",
            "vkCreateGraphicsPipelines(): stage {:?} appears more than once.",
            stage.stage);
        shader_stage(&mut out, stage, objects);
    }

    let dynamic: Vec<vk::DynamicState> = if info.p_dynamic_state.is_null() {
        Vec::new()
    } else {
        let dyn_info = &*info.p_dynamic_state;
        slice(dyn_info.p_dynamic_states, dyn_info.dynamic_state_count).to_vec()
    };
    for (i, state) in dynamic.iter().enumerate() {
        check!(out, !dynamic[..i].contains(state),
            "VUID-VkPipelineDynamicStateCreateInfo-pDynamicStates-01442",
            "vkCreateGraphicsPipelines(): {:?} is listed more than once in \
             pDynamicStates.",
            state);
    }

    if !info.p_input_assembly_state.is_null() {
        let ia = &*info.p_input_assembly_state;
        let list = [
            vk::PrimitiveTopology::POINT_LIST,
            vk::PrimitiveTopology::LINE_LIST,
            vk::PrimitiveTopology::TRIANGLE_LIST,
            vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY,
            vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY,
            vk::PrimitiveTopology::PATCH_LIST,
        ];
        if ia.primitive_restart_enable == vk::TRUE {
            check!(out, !list.contains(&ia.topology),
                "VUID-VkPipelineInputAssemblyStateCreateInfo-topology-00428",
                "vkCreateGraphicsPipelines(): primitive restart is not allowed \
                 with topology {:?}.",
                ia.topology);
        }
    }

    let raster_discard = !info.p_rasterization_state.is_null()
        && (*info.p_rasterization_state).rasterizer_discard_enable == vk::TRUE;

    if !info.p_viewport_state.is_null() && !raster_discard {
        let vp = &*info.p_viewport_state;
        if features.multi_viewport == vk::FALSE {
            check!(out, vp.viewport_count <= 1,
                "VUID-VkPipelineViewportStateCreateInfo-viewportCount-01216",
                "vkCreateGraphicsPipelines(): viewportCount ({}) must be 1 \
                 without the multiViewport feature.",
                vp.viewport_count);
            check!(out, vp.scissor_count <= 1,
                "VUID-VkPipelineViewportStateCreateInfo-scissorCount-01217",
                "vkCreateGraphicsPipelines(): scissorCount ({}) must be 1 \
                 without the multiViewport feature.",
                vp.scissor_count);
        }
        check!(out, vp.viewport_count <= limits.max_viewports,
            "VUID-VkPipelineViewportStateCreateInfo-viewportCount-01218",
            "vkCreateGraphicsPipelines(): viewportCount ({}) exceeds \
             maxViewports ({}).",
            vp.viewport_count, limits.max_viewports);
        check!(out, vp.scissor_count == vp.viewport_count,
            "VUID-VkPipelineViewportStateCreateInfo-scissorCount-01220",
            "vkCreateGraphicsPipelines(): scissorCount ({}) and viewportCount \
             ({}) are not identical.",
            vp.scissor_count, vp.viewport_count);
    }

    if !info.p_rasterization_state.is_null() {
        let rs = &*info.p_rasterization_state;
        if rs.depth_clamp_enable == vk::TRUE {
            check!(out, features.depth_clamp == vk::TRUE,
                "VUID-VkPipelineRasterizationStateCreateInfo-depthClampEnable-00782",
                "vkCreateGraphicsPipelines(): depthClampEnable requires the \
                 depthClamp feature.");
        }
        if !dynamic.contains(&vk::DynamicState::LINE_WIDTH)
            && features.wide_lines == vk::FALSE
        {
            check!(out, rs.line_width == 1.0,
                "VUID-VkGraphicsPipelineCreateInfo-pDynamicStates-00749",
                "vkCreateGraphicsPipelines(): lineWidth is {} but the \
                 wideLines feature is not enabled.",
                rs.line_width);
        }
    }

    if !info.p_multisample_state.is_null() && !raster_discard {
        let ms = &*info.p_multisample_state;
        if ms.sample_shading_enable == vk::TRUE {
            check!(out, features.sample_rate_shading == vk::TRUE,
                "VUID-VkPipelineMultisampleStateCreateInfo-sampleShadingEnable-00784",
                "vkCreateGraphicsPipelines(): sampleShadingEnable requires the \
                 sampleRateShading feature.");
            check!(out, ms.min_sample_shading >= 0.0 && ms.min_sample_shading <= 1.0,
                "VUID-VkPipelineMultisampleStateCreateInfo-minSampleShading-00786",
                "vkCreateGraphicsPipelines(): minSampleShading ({}) must be in \
                 [0.0, 1.0].",
                ms.min_sample_shading);
        }
    }

    let pass = objects.render_passes.get(&info.render_pass.as_raw());
    if let Some(pass) = pass {
        match pass.subpass_colors.get(info.subpass as usize) {
            None => out.push((
                "VUID-VkGraphicsPipelineCreateInfo-subpass-00759",
                format!(
                    "vkCreateGraphicsPipelines(): subpass {} is out of range \
                     for a render pass with {} subpass(es).",
                    info.subpass, pass.subpass_colors.len(),
                ),
            )),
            Some(&colors) if !info.p_color_blend_state.is_null()
                && !raster_discard =>
            {
                let blend = &*info.p_color_blend_state;
                check!(out, blend.attachment_count == colors,
                    "VUID-VkGraphicsPipelineCreateInfo-attachmentCount-00746",
                    "vkCreateGraphicsPipelines(): attachmentCount ({}) does \
                     not match the subpass color attachment count ({}).",
                    blend.attachment_count, colors);
            },
            Some(_) => {},
        }
    }
    out
}

pub(super) unsafe fn compute_pipeline(
    info: &vk::ComputePipelineCreateInfo,
    objects: &Objects,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check!(out, info.stage.stage == vk::ShaderStageFlags::COMPUTE,
        "VUID-VkComputePipelineCreateInfo-stage-00701",
        "vkCreateComputePipelines(): stage is {:?}; it must be \
         VK_SHADER_STAGE_COMPUTE_BIT.",
        info.stage.stage);
    if info.stage.stage == vk::ShaderStageFlags::COMPUTE {
        shader_stage(&mut out, &info.stage, objects);
    }
    out
}

/// `maxRayRecursionDepth` of the simulated device.
pub(super) const MAX_RAY_RECURSION_DEPTH: u32 = 31;

fn general_stage(stage: vk::ShaderStageFlags) -> bool {
    [
        vk::ShaderStageFlags::RAYGEN_KHR,
        vk::ShaderStageFlags::MISS_KHR,
        vk::ShaderStageFlags::CALLABLE_KHR,
    ].contains(&stage)
}

pub(super) unsafe fn ray_tracing_pipeline(
    info: &vk::RayTracingPipelineCreateInfoKHR,
    objects: &Objects,
) -> Vec<Violation> {
    let mut out = Vec::new();
    let stages = slice(info.p_stages, info.stage_count);
    let library = info.flags.contains(vk::PipelineCreateFlags::LIBRARY_KHR);
    check!(out,
        library || stages.iter().any(|s| s.stage == vk::ShaderStageFlags::RAYGEN_KHR),
        "VUID-VkRayTracingPipelineCreateInfoKHR-stage-03425",
        "vkCreateRayTracingPipelinesKHR(): pStages contains no \
         VK_SHADER_STAGE_RAYGEN_BIT_KHR stage.");
    check!(out, info.max_pipeline_ray_recursion_depth <= MAX_RAY_RECURSION_DEPTH,
        "VUID-VkRayTracingPipelineCreateInfoKHR-maxPipelineRayRecursionDepth-03589",
        "vkCreateRayTracingPipelinesKHR(): maxPipelineRayRecursionDepth ({}) \
         exceeds maxRayRecursionDepth ({}).",
        info.max_pipeline_ray_recursion_depth, MAX_RAY_RECURSION_DEPTH);

    for (i, group) in slice(info.p_groups, info.group_count).iter().enumerate() {
        if group.ty != vk::RayTracingShaderGroupTypeKHR::GENERAL {
            continue;
        }
        let general = stages.get(group.general_shader as usize);
        check!(out, general.map_or(false, |s| general_stage(s.stage)),
            "VUID-VkRayTracingShaderGroupCreateInfoKHR-type-03474",
            "vkCreateRayTracingPipelinesKHR(): pGroups[{}].generalShader ({}) \
             does not name a raygen, miss or callable stage.",
            i, group.general_shader);
        let unused = [
            group.closest_hit_shader,
            group.any_hit_shader,
            group.intersection_shader,
        ].iter().all(|&index| index == vk::SHADER_UNUSED_KHR);
        check!(out, unused,
            "VUID-VkRayTracingShaderGroupCreateInfoKHR-type-03475",
            "vkCreateRayTracingPipelinesKHR(): pGroups[{}] is a general group \
             but names a hit or intersection shader.", i);
    }

    for stage in stages.iter() {
        shader_stage(&mut out, stage, objects);
    }
    out
}

pub(super) fn allocate_memory(info: &vk::MemoryAllocateInfo, gpu: &Gpu) ->
    Vec<Violation>
{
    let mut out = Vec::new();
    check!(out, info.memory_type_index < gpu.memory.memory_type_count,
        "VUID-vkAllocateMemory-pAllocateInfo-01714",
        "vkAllocateMemory(): memoryTypeIndex ({}) is not less than the \
         memory type count ({}).",
        info.memory_type_index, gpu.memory.memory_type_count);
    check!(out, info.allocation_size > 0,
        "VUID-VkMemoryAllocateInfo-allocationSize-00638",
        "vkAllocateMemory(): allocationSize must be greater than 0.");
    out
}

pub(super) fn buffer_requirements(buffer: &BufferState) ->
    vk::MemoryRequirements
{
    let wide = vk::BufferUsageFlags::UNIFORM_BUFFER
        | vk::BufferUsageFlags::STORAGE_BUFFER
        | vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER
        | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER
        | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR;
    let alignment = if buffer.usage.intersects(wide) { 256 } else { 16 };
    vk::MemoryRequirements {
        size: crate::util::align(alignment, buffer.size.max(1)),
        alignment,
        memory_type_bits: 0b11,
    }
}

pub(super) fn image_requirements(image: &ImageState) -> vk::MemoryRequirements {
    let vk::Extent3D { width, height, depth } = image.extent;
    let mut size = 0u64;
    for level in 0..image.mip_levels.min(32) {
        let w = (width >> level).max(1) as u64;
        let h = (height >> level).max(1) as u64;
        let d = (depth >> level).max(1) as u64;
        size += w * h * d * 4;
    }
    size *= image.array_layers.max(1) as u64;
    let alignment = 1024;
    vk::MemoryRequirements {
        size: crate::util::align(alignment, size.max(1)),
        alignment,
        memory_type_bits: 0b11,
    }
}

/// Binding rules shared by buffers and images.
pub(super) fn bind_memory(
    ids: [&'static str; 4],
    what: &str,
    already_bound: bool,
    reqs: vk::MemoryRequirements,
    memory: &MemoryState,
    offset: vk::DeviceSize,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check!(out, !already_bound, ids[0],
        "vkBind{}Memory(): {} already has memory bound.", what, what);
    check!(out, offset % reqs.alignment == 0, ids[1],
        "vkBind{}Memory(): memoryOffset ({}) is not a multiple of the \
         required alignment ({}).",
        what, offset, reqs.alignment);
    check!(out, offset < memory.size && memory.size - offset >= reqs.size,
        ids[2],
        "vkBind{}Memory(): memory size ({}) minus memoryOffset ({}) is less \
         than the required size ({}).",
        what, memory.size, offset, reqs.size);
    check!(out, reqs.memory_type_bits & (1 << memory.type_index.min(31)) != 0,
        ids[3],
        "vkBind{}Memory(): memory type {} is not allowed by memoryTypeBits \
         (0x{:x}).",
        what, memory.type_index, reqs.memory_type_bits);
    out
}

pub(super) unsafe fn render_pass(info: &vk::RenderPassCreateInfo) ->
    (RenderPassState, Vec<Violation>)
{
    let mut out = Vec::new();
    let count = info.attachment_count;
    let subpasses = slice(info.p_subpasses, info.subpass_count);
    for (i, subpass) in subpasses.iter().enumerate() {
        let colors = slice(
            subpass.p_color_attachments,
            subpass.color_attachment_count,
        );
        let inputs = slice(
            subpass.p_input_attachments,
            subpass.input_attachment_count,
        );
        let depth = if subpass.p_depth_stencil_attachment.is_null() {
            &[][..]
        } else {
            std::slice::from_raw_parts(subpass.p_depth_stencil_attachment, 1)
        };
        for reference in colors.iter().chain(inputs).chain(depth) {
            let a = reference.attachment;
            check!(out, a == vk::ATTACHMENT_UNUSED || a < count,
                "VUID-VkRenderPassCreateInfo-attachment-00834",
                "vkCreateRenderPass(): subpass {} references attachment {}, \
                 which is not less than attachmentCount ({}).",
                i, a, count);
        }
    }
    let state = RenderPassState {
        attachments: count,
        subpass_colors: subpasses.iter()
            .map(|s| s.color_attachment_count)
            .collect(),
    };
    (state, out)
}

pub(super) fn framebuffer(
    info: &vk::FramebufferCreateInfo,
    objects: &Objects,
) -> Vec<Violation> {
    let mut out = Vec::new();
    if let Some(pass) = objects.render_passes.get(&info.render_pass.as_raw()) {
        check!(out, info.attachment_count == pass.attachments,
            "VUID-VkFramebufferCreateInfo-attachmentCount-00876",
            "vkCreateFramebuffer(): attachmentCount ({}) does not match the \
             render pass attachment count ({}).",
            info.attachment_count, pass.attachments);
    }
    check!(out, info.width > 0, "VUID-VkFramebufferCreateInfo-width-00885",
        "vkCreateFramebuffer(): width must be greater than 0.");
    check!(out, info.height > 0, "VUID-VkFramebufferCreateInfo-height-00887",
        "vkCreateFramebuffer(): height must be greater than 0.");
    check!(out, info.layers > 0, "VUID-VkFramebufferCreateInfo-layers-00889",
        "vkCreateFramebuffer(): layers must be greater than 0.");
    out
}

pub(super) fn acceleration_structure(
    info: &vk::AccelerationStructureCreateInfoKHR,
    buffer: Option<&BufferState>,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check!(out, info.offset % 256 == 0,
        "VUID-VkAccelerationStructureCreateInfoKHR-offset-03734",
        "vkCreateAccelerationStructureKHR(): offset ({}) must be a multiple \
         of 256 bytes.",
        info.offset);
    if let Some(buffer) = buffer {
        check!(out, buffer.usage.contains(
                vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR),
            "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03614",
            "vkCreateAccelerationStructureKHR(): buffer was created with \
             usage {:?}, which lacks \
             VK_BUFFER_USAGE_ACCELERATION_STRUCTURE_STORAGE_BIT_KHR.",
            buffer.usage);
        check!(out, buffer.memory.is_some(),
            "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03615",
            "vkCreateAccelerationStructureKHR(): buffer is not bound to \
             memory.");
        check!(out, info.offset.saturating_add(info.size) <= buffer.size,
            "VUID-VkAccelerationStructureCreateInfoKHR-offset-03616",
            "vkCreateAccelerationStructureKHR(): offset ({}) plus size ({}) \
             exceeds the buffer size ({}).",
            info.offset, info.size, buffer.size);
    }
    out
}

/// Which family indices a barrier may name.
#[derive(Clone, Copy, Debug)]
pub(super) struct FamilyRules {
    pub family_count: u32,
    pub external_memory: bool,
}

impl FamilyRules {
    fn is_valid(&self, index: u32) -> bool {
        index < self.family_count
    }

    fn is_special(&self, index: u32) -> bool {
        index == vk::QUEUE_FAMILY_EXTERNAL || index == vk::QUEUE_FAMILY_FOREIGN_EXT
    }
}

/// Queue family index rules for one buffer or image barrier.
/// `ids` are the concurrent, concurrent-external, exclusive and
/// exclusive-external identifiers.
pub(super) fn barrier_families(
    ids: [&'static str; 4],
    what: &str,
    concurrent: bool,
    src: u32,
    dst: u32,
    rules: FamilyRules,
) -> Vec<Violation> {
    let mut out = Vec::new();
    let ignored = vk::QUEUE_FAMILY_IGNORED;
    if src == dst {
        return out;
    }
    if concurrent {
        if !rules.external_memory {
            check!(out, src == ignored && dst == ignored, ids[0],
                "vkCmdPipelineBarrier(): {} was created with \
                 VK_SHARING_MODE_CONCURRENT; srcQueueFamilyIndex ({}) and \
                 dstQueueFamilyIndex ({}) must both be \
                 VK_QUEUE_FAMILY_IGNORED.",
                what, src as i32, dst as i32);
        } else {
            let ok = (src == ignored || rules.is_special(src))
                && (dst == ignored || rules.is_special(dst));
            check!(out, ok, ids[1],
                "vkCmdPipelineBarrier(): {} was created with \
                 VK_SHARING_MODE_CONCURRENT; srcQueueFamilyIndex ({}) and \
                 dstQueueFamilyIndex ({}) must each be \
                 VK_QUEUE_FAMILY_IGNORED or VK_QUEUE_FAMILY_EXTERNAL.",
                what, src as i32, dst as i32);
        }
    } else if !rules.external_memory {
        check!(out, rules.is_valid(src) && rules.is_valid(dst), ids[2],
            "vkCmdPipelineBarrier(): {} was created with \
             VK_SHARING_MODE_EXCLUSIVE; srcQueueFamilyIndex ({}) and \
             dstQueueFamilyIndex ({}) must both be valid queue families.",
            what, src as i32, dst as i32);
    } else {
        let both_ignored = src == ignored && dst == ignored;
        let usable = |i| rules.is_valid(i) || rules.is_special(i);
        check!(out, both_ignored || (usable(src) && usable(dst)), ids[3],
            "vkCmdPipelineBarrier(): {} was created with \
             VK_SHARING_MODE_EXCLUSIVE; srcQueueFamilyIndex ({}) and \
             dstQueueFamilyIndex ({}) must both be VK_QUEUE_FAMILY_IGNORED \
             or both be valid, external or foreign queue families.",
            what, src as i32, dst as i32);
    }
    out
}

pub(super) const BUFFER_BARRIER_IDS: [&str; 4] = [
    "VUID-VkBufferMemoryBarrier-buffer-01190",
    "VUID-VkBufferMemoryBarrier-buffer-01763",
    "VUID-VkBufferMemoryBarrier-buffer-01192",
    "VUID-VkBufferMemoryBarrier-buffer-01193",
];

pub(super) const IMAGE_BARRIER_IDS: [&str; 4] = [
    "VUID-VkImageMemoryBarrier-image-01199",
    "VUID-VkImageMemoryBarrier-image-01381",
    "VUID-VkImageMemoryBarrier-image-01200",
    "VUID-VkImageMemoryBarrier-image-01201",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(violations: &[Violation]) -> Vec<&'static str> {
        violations.iter().map(|&(id, _)| id).collect()
    }

    #[test]
    fn mip_chain_length() {
        let extent = |width, height| vk::Extent3D { width, height, depth: 1 };
        assert_eq!(mip_count(extent(1, 1)), 1);
        assert_eq!(mip_count(extent(32, 32)), 6);
        assert_eq!(mip_count(extent(64, 16)), 7);
    }

    #[test]
    fn parses_entry_points() {
        let words = crate::shader::fragment_spirv();
        let points = entry_points(&words);
        assert_eq!(points, vec![EntryPoint { model: 4, name: "main".into() }]);
        assert!(entry_points(&words[..5]).is_empty());

        let points = entry_points(&crate::shader::miss_spirv());
        assert_eq!(points, vec![EntryPoint { model: 5317, name: "main".into() }]);
    }

    #[test]
    fn concurrent_barrier_families() {
        let rules = FamilyRules { family_count: 3, external_memory: false };
        let ignored = vk::QUEUE_FAMILY_IGNORED;
        let v = barrier_families(BUFFER_BARRIER_IDS, "buffer", true, 0, 1, rules);
        assert_eq!(ids(&v), ["VUID-VkBufferMemoryBarrier-buffer-01190"]);
        let v = barrier_families(
            BUFFER_BARRIER_IDS, "buffer", true, ignored, ignored, rules);
        assert!(v.is_empty());

        let rules = FamilyRules { external_memory: true, ..rules };
        let v = barrier_families(
            IMAGE_BARRIER_IDS, "image", true, ignored, 1, rules);
        assert_eq!(ids(&v), ["VUID-VkImageMemoryBarrier-image-01381"]);
        let v = barrier_families(IMAGE_BARRIER_IDS, "image", true, ignored,
            vk::QUEUE_FAMILY_EXTERNAL, rules);
        assert!(v.is_empty());
    }

    #[test]
    fn exclusive_barrier_families() {
        let rules = FamilyRules { family_count: 3, external_memory: false };
        let v = barrier_families(BUFFER_BARRIER_IDS, "buffer", false, 0, 3, rules);
        assert_eq!(ids(&v), ["VUID-VkBufferMemoryBarrier-buffer-01192"]);
        assert!(barrier_families(
            BUFFER_BARRIER_IDS, "buffer", false, 0, 2, rules).is_empty());

        let rules = FamilyRules { external_memory: true, ..rules };
        let v = barrier_families(IMAGE_BARRIER_IDS, "image", false,
            vk::QUEUE_FAMILY_IGNORED, 1, rules);
        assert_eq!(ids(&v), ["VUID-VkImageMemoryBarrier-image-01201"]);
        assert!(barrier_families(IMAGE_BARRIER_IDS, "image", false, 0,
            vk::QUEUE_FAMILY_EXTERNAL, rules).is_empty());
    }

    #[test]
    fn sampler_limits() {
        let features = vk::PhysicalDeviceFeatures::default();
        let limits = vk::PhysicalDeviceLimits {
            max_sampler_anisotropy: 16.0,
            max_sampler_lod_bias: 15.0,
            ..Default::default()
        };
        let info = vk::SamplerCreateInfo {
            anisotropy_enable: vk::TRUE,
            max_anisotropy: 32.0,
            min_lod: 1.0,
            max_lod: 0.5,
            ..Default::default()
        };
        assert_eq!(ids(&sampler(&info, &features, &limits)), [
            "VUID-VkSamplerCreateInfo-anisotropyEnable-01070",
            "VUID-VkSamplerCreateInfo-anisotropyEnable-01071",
            "VUID-VkSamplerCreateInfo-maxLod-01973",
        ]);
    }

    #[test]
    fn memory_requirements_alignment() {
        let buffer = BufferState {
            size: 100,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            concurrent: false,
            memory: None,
        };
        let reqs = buffer_requirements(&buffer);
        assert_eq!((reqs.size, reqs.alignment), (256, 256));

        let memory = MemoryState { size: 512, type_index: 0 };
        let ids_ = ["a", "b", "c", "d"];
        assert!(bind_memory(ids_, "Buffer", false, reqs, &memory, 256).is_empty());
        assert_eq!(ids(&bind_memory(ids_, "Buffer", true, reqs, &memory, 300)),
            ["a", "b", "c"]);
    }
}
