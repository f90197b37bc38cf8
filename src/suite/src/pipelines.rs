use ash::vk;
use harness::*;
use unit::TestStatus;

const BAD_ENTRY: &[u8] = b"not_main\0";

fn graphics(
    fw: &Framework,
    mutate: impl FnOnce(&mut CreatePipelineHelper),
    ids: &[&str],
) -> HarnessResult<bool> {
    oneshot_test(fw, mutate, Severities::ERROR, ids)
}

fn viewport_scissor_count_mismatch(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| helper.vp_state_ci.viewport_count = 2,
        &["VUID-VkPipelineViewportStateCreateInfo-scissorCount-01220"])?;
    Ok(())
}

fn multi_viewport_disabled(fw: &mut Framework) -> TestStatus {
    fw.init_framework()?;
    let features = vk::PhysicalDeviceFeatures {
        multi_viewport: vk::FALSE,
        ..fw.available_features()?
    };
    fw.init_state(StateOptions {
        features: Some(features),
        ..Default::default()
    })?;
    fw.init_render_target()?;

    graphics(fw, |helper| helper.vp_state_ci.viewport_count = 2, &[
        "VUID-VkPipelineViewportStateCreateInfo-viewportCount-01216",
        "VUID-VkPipelineViewportStateCreateInfo-scissorCount-01220",
    ])?;
    graphics(fw, |helper| {
        helper.vp_state_ci.viewport_count = 2;
        helper.vp_state_ci.scissor_count = 2;
    }, &[
        "VUID-VkPipelineViewportStateCreateInfo-viewportCount-01216",
        "VUID-VkPipelineViewportStateCreateInfo-scissorCount-01217",
    ])?;
    Ok(())
}

fn multi_viewport_disabled_in_features2(fw: &mut Framework) -> TestStatus {
    fw.init_framework()?;
    let features = vk::PhysicalDeviceFeatures {
        multi_viewport: vk::FALSE,
        ..fw.available_features()?
    };
    let mut chain = ExtensionChain::new();
    chain.push(vk::PhysicalDeviceFeatures2 { features, ..Default::default() });
    fw.init_state(StateOptions { chain, ..Default::default() })?;
    fw.init_render_target()?;
    unit::assert_true!(fw.device()?.features().multi_viewport == vk::FALSE);

    graphics(fw, |helper| {
        helper.vp_state_ci.viewport_count = 2;
        helper.vp_state_ci.scissor_count = 2;
    }, &[
        "VUID-VkPipelineViewportStateCreateInfo-viewportCount-01216",
        "VUID-VkPipelineViewportStateCreateInfo-scissorCount-01217",
    ])?;
    Ok(())
}

fn too_many_viewports(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let max = fw.physical_device_properties()?.limits.max_viewports;
    graphics(fw, |helper| {
        helper.vp_state_ci.viewport_count = max + 1;
        helper.vp_state_ci.scissor_count = max + 1;
    }, &["VUID-VkPipelineViewportStateCreateInfo-viewportCount-01218"])?;
    Ok(())
}

fn wide_line_without_feature(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    if fw.available_features()?.wide_lines == vk::TRUE {
        unit::skip!("wideLines is supported");
    }
    graphics(fw, |helper| helper.rs_state_ci.line_width = 2.0,
        &["VUID-VkGraphicsPipelineCreateInfo-pDynamicStates-00749"])?;
    Ok(())
}

fn depth_clamp_disabled(fw: &mut Framework) -> TestStatus {
    fw.init_framework()?;
    let features = vk::PhysicalDeviceFeatures {
        depth_clamp: vk::FALSE,
        ..fw.available_features()?
    };
    fw.init_state(StateOptions {
        features: Some(features),
        ..Default::default()
    })?;
    fw.init_render_target()?;
    graphics(fw, |helper| helper.rs_state_ci.depth_clamp_enable = vk::TRUE,
        &["VUID-VkPipelineRasterizationStateCreateInfo-depthClampEnable-00782"])?;
    Ok(())
}

fn missing_vertex_stage(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| { helper.shader_stages.remove(0); },
        &["VUID-VkGraphicsPipelineCreateInfo-stage-00727"])?;
    Ok(())
}

fn duplicate_stage(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| {
        let fs = helper.shader_stages[1];
        helper.shader_stages.push(fs);
    }, &["VUID-VkGraphicsPipelineCreateInfo-stage-00726"])?;
    Ok(())
}

fn bad_entry_point(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| {
        helper.shader_stages[0].p_name = BAD_ENTRY.as_ptr() as _;
    }, &["VUID-VkPipelineShaderStageCreateInfo-pName-00707"])?;
    Ok(())
}

fn min_sample_shading_out_of_range(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| {
        helper.ms_ci.sample_shading_enable = vk::TRUE;
        helper.ms_ci.min_sample_shading = 1.5;
    }, &["VUID-VkPipelineMultisampleStateCreateInfo-minSampleShading-00786"])?;
    Ok(())
}

fn primitive_restart_on_list(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| {
        helper.ia_ci.topology = vk::PrimitiveTopology::TRIANGLE_LIST;
        helper.ia_ci.primitive_restart_enable = vk::TRUE;
    }, &["VUID-VkPipelineInputAssemblyStateCreateInfo-topology-00428"])?;
    Ok(())
}

fn duplicate_dynamic_state(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| {
        helper.dyn_states = vec![
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::VIEWPORT,
        ];
    }, &["VUID-VkPipelineDynamicStateCreateInfo-pDynamicStates-01442"])?;
    Ok(())
}

fn subpass_out_of_range(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| helper.gp_ci.subpass = 4,
        &["VUID-VkGraphicsPipelineCreateInfo-subpass-00759"])?;
    Ok(())
}

fn blend_attachment_count_mismatch(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| helper.cb_ci.attachment_count = 2,
        &["VUID-VkGraphicsPipelineCreateInfo-attachmentCount-00746"])?;
    Ok(())
}

fn compute_stage_not_compute(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    oneshot_test::<CreateComputePipelineHelper, _>(fw, |helper| {
        helper.cp_ci.stage.stage = vk::ShaderStageFlags::VERTEX;
    }, Severities::ERROR, &["VUID-VkComputePipelineCreateInfo-stage-00701"])?;
    Ok(())
}

fn init_ray_tracing(fw: &mut Framework) -> HarnessResult<()> {
    fw.init_framework()?;
    let gpu = fw.gpu();
    let mut chain = ExtensionChain::new();
    chain.add(ACCELERATION_STRUCTURE_EXTENSION,
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR {
            acceleration_structure: vk::TRUE,
            ..Default::default()
        },
        |name| fw.device_extension_supported(gpu, None, name));
    chain.add(RAY_TRACING_PIPELINE_EXTENSION,
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR {
            ray_tracing_pipeline: vk::TRUE,
            ..Default::default()
        },
        |name| fw.device_extension_supported(gpu, None, name));
    fw.init_state(StateOptions { chain, ..Default::default() })
}

fn ray_tracing(
    fw: &Framework,
    mutate: impl FnOnce(&mut CreateRayTracingPipelineHelper),
    ids: &[&str],
) -> HarnessResult<bool> {
    oneshot_test(fw, mutate, Severities::ERROR, ids)
}

fn ray_tracing_without_raygen(fw: &mut Framework) -> TestStatus {
    init_ray_tracing(fw)?;
    ray_tracing(fw, |helper| {
        helper.shader_stages.remove(0);
        helper.groups.truncate(1);
    }, &["VUID-VkRayTracingPipelineCreateInfoKHR-stage-03425"])?;
    Ok(())
}

fn ray_tracing_recursion_too_deep(fw: &mut Framework) -> TestStatus {
    init_ray_tracing(fw)?;
    ray_tracing(fw, |helper| {
        helper.rp_ci.max_pipeline_ray_recursion_depth = 32;
    }, &["VUID-VkRayTracingPipelineCreateInfoKHR-maxPipelineRayRecursionDepth-03589"])?;
    Ok(())
}

fn ray_tracing_general_shader_out_of_range(fw: &mut Framework) -> TestStatus {
    init_ray_tracing(fw)?;
    ray_tracing(fw, |helper| helper.groups[1].general_shader = 5,
        &["VUID-VkRayTracingShaderGroupCreateInfoKHR-type-03474"])?;
    ray_tracing(fw, |helper| {
        helper.groups[1].closest_hit_shader = 0;
    }, &["VUID-VkRayTracingShaderGroupCreateInfoKHR-type-03475"])?;
    Ok(())
}

fn ray_tracing_needs_extension(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    match CreateRayTracingPipelineHelper::new(fw) {
        Ok(_) => unit::assert_true!(false,
            "helper built without {}", RAY_TRACING_PIPELINE_EXTENSION),
        Err(err) => unit::assert_true!(err.is_unsupported()),
    }
    Ok(())
}

fn default_ray_tracing_pipeline(fw: &mut Framework) -> TestStatus {
    init_ray_tracing(fw)?;
    ray_tracing(fw, |_| {}, &[])?;
    Ok(())
}

fn default_graphics_pipeline(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |_| {}, &[])?;
    Ok(())
}

fn default_compute_pipeline(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    oneshot_test::<CreateComputePipelineHelper, _>(
        fw, |_| {}, Severities::ERROR, &[])?;
    Ok(())
}

fn dynamic_line_width(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    graphics(fw, |helper| {
        helper.rs_state_ci.line_width = 2.0;
        helper.dyn_states.push(vk::DynamicState::LINE_WIDTH);
    }, &[])?;
    Ok(())
}

fn multiple_viewports(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    if fw.available_features()?.multi_viewport == vk::FALSE {
        unit::skip!("multiViewport is not supported");
    }
    graphics(fw, |helper| {
        helper.vp_state_ci.viewport_count = 4;
        helper.vp_state_ci.scissor_count = 4;
    }, &[])?;
    Ok(())
}

unit::declare_tests![
    "LayerTest" => [
        viewport_scissor_count_mismatch,
        multi_viewport_disabled,
        too_many_viewports,
        wide_line_without_feature,
        depth_clamp_disabled,
        missing_vertex_stage,
        duplicate_stage,
        bad_entry_point,
        min_sample_shading_out_of_range,
        primitive_restart_on_list,
        duplicate_dynamic_state,
        subpass_out_of_range,
        blend_attachment_count_mismatch,
        compute_stage_not_compute,
        multi_viewport_disabled_in_features2,
        ray_tracing_without_raygen,
        ray_tracing_recursion_too_deep,
        ray_tracing_general_shader_out_of_range,
        ray_tracing_needs_extension,
    ],
    "PositiveLayerTest" => [
        default_graphics_pipeline,
        default_compute_pipeline,
        dynamic_line_width,
        multiple_viewports,
        default_ray_tracing_pipeline,
    ],
];
