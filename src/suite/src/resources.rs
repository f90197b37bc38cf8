use std::sync::Arc;

use ash::vk;
use harness::*;
use unit::TestStatus;

use crate::{expect_clean, expect_error};

fn sampler_lod_range_inverted(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::SamplerCreateInfo {
        min_lod: 4.0,
        max_lod: 1.0,
        ..safe_sampler_info()
    };
    create_sampler_test(fw, &info, Some("VUID-VkSamplerCreateInfo-maxLod-01973"))?;
    Ok(())
}

fn sampler_anisotropy_out_of_range(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::SamplerCreateInfo {
        anisotropy_enable: vk::TRUE,
        max_anisotropy: 0.5,
        ..safe_sampler_info()
    };
    create_sampler_test(fw, &info,
        Some("VUID-VkSamplerCreateInfo-anisotropyEnable-01071"))?;

    let limit = fw.physical_device_properties()?.limits.max_sampler_anisotropy;
    let info = vk::SamplerCreateInfo { max_anisotropy: limit + 1.0, ..info };
    create_sampler_test(fw, &info,
        Some("VUID-VkSamplerCreateInfo-anisotropyEnable-01071"))?;
    Ok(())
}

fn sampler_anisotropy_disabled(fw: &mut Framework) -> TestStatus {
    fw.init_framework()?;
    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::FALSE,
        ..fw.available_features()?
    };
    fw.init_state(StateOptions {
        features: Some(features),
        ..Default::default()
    })?;
    let info = vk::SamplerCreateInfo {
        anisotropy_enable: vk::TRUE,
        max_anisotropy: 1.0,
        ..safe_sampler_info()
    };
    create_sampler_test(fw, &info,
        Some("VUID-VkSamplerCreateInfo-anisotropyEnable-01070"))?;
    Ok(())
}

fn sampler_unnormalized_filters(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::SamplerCreateInfo {
        unnormalized_coordinates: vk::TRUE,
        min_filter: vk::Filter::LINEAR,
        mag_filter: vk::Filter::NEAREST,
        ..safe_sampler_info()
    };
    create_sampler_test(fw, &info,
        Some("VUID-VkSamplerCreateInfo-unnormalizedCoordinates-01072"))?;
    Ok(())
}

fn sampler_lod_bias(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let limit = fw.physical_device_properties()?.limits.max_sampler_lod_bias;
    let info = vk::SamplerCreateInfo {
        mip_lod_bias: limit + 1.0,
        ..safe_sampler_info()
    };
    create_sampler_test(fw, &info,
        Some("VUID-VkSamplerCreateInfo-mipLodBias-01069"))?;
    Ok(())
}

fn buffer_zero_size(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::BufferCreateInfo { size: 0, ..default_buffer_info() };
    create_buffer_test(fw, &info, Some("VUID-VkBufferCreateInfo-size-00912"))?;
    Ok(())
}

fn buffer_no_usage(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::BufferCreateInfo {
        usage: vk::BufferUsageFlags::empty(),
        ..default_buffer_info()
    };
    create_buffer_test(fw, &info,
        Some("VUID-VkBufferCreateInfo-usage-requiredbitmask"))?;
    Ok(())
}

fn buffer_concurrent_single_family(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let families = [0];
    let info = vk::BufferCreateInfo {
        sharing_mode: vk::SharingMode::CONCURRENT,
        queue_family_index_count: families.len() as _,
        p_queue_family_indices: families.as_ptr(),
        ..default_buffer_info()
    };
    create_buffer_test(fw, &info,
        Some("VUID-VkBufferCreateInfo-sharingMode-00914"))?;

    let families = [0, 9];
    let info = vk::BufferCreateInfo {
        queue_family_index_count: families.len() as _,
        p_queue_family_indices: families.as_ptr(),
        ..info
    };
    create_buffer_test(fw, &info,
        Some("VUID-VkBufferCreateInfo-sharingMode-01419"))?;
    Ok(())
}

fn image_initial_layout(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::ImageCreateInfo {
        initial_layout: vk::ImageLayout::GENERAL,
        ..default_image_info()
    };
    create_image_test(fw, &info,
        Some("VUID-VkImageCreateInfo-initialLayout-00993"))?;
    Ok(())
}

fn image_zero_extent(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut info = default_image_info();
    info.extent.width = 0;
    create_image_test(fw, &info, Some("VUID-VkImageCreateInfo-extent-00944"))?;
    let mut info = default_image_info();
    info.extent.height = 0;
    create_image_test(fw, &info, Some("VUID-VkImageCreateInfo-extent-00945"))?;
    Ok(())
}

fn image_mip_chain_too_long(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    // 32x32 has six levels.
    let info = vk::ImageCreateInfo { mip_levels: 7, ..default_image_info() };
    create_image_test(fw, &info,
        Some("VUID-VkImageCreateInfo-mipLevels-00958"))?;
    Ok(())
}

fn image_2d_with_depth(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let mut info = default_image_info();
    info.extent.depth = 2;
    create_image_test(fw, &info,
        Some("VUID-VkImageCreateInfo-imageType-00957"))?;
    Ok(())
}

fn image_view_unbound(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let image = Image::init_no_mem(device, &default_image_info())?;
    create_image_view_test(fw, &default_image_view_info(&image),
        Some("VUID-VkImageViewCreateInfo-image-01020"))?;
    Ok(())
}

fn image_view_empty_range(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let image = Image::new(device, &default_image_info(), Default::default())?;
    let mut info = default_image_view_info(&image);
    info.subresource_range.level_count = 0;
    create_image_view_test(fw, &info,
        Some("VUID-VkImageSubresourceRange-levelCount-01720"))?;

    let mut info = default_image_view_info(&image);
    info.subresource_range.base_array_layer = 1;
    create_image_view_test(fw, &info,
        Some("VUID-VkImageViewCreateInfo-subresourceRange-01480"))?;
    Ok(())
}

fn image_view_format_mismatch(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let image = Image::new(device, &default_image_info(), Default::default())?;
    let info = vk::ImageViewCreateInfo {
        format: vk::Format::R8G8B8A8_SRGB,
        ..default_image_view_info(&image)
    };
    create_image_view_test(fw, &info,
        Some("VUID-VkImageViewCreateInfo-image-01762"))?;
    Ok(())
}

fn image_view_format_features(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let profile = fw.load_device_profile_layer()?;
    let format = vk::Format::R8G8B8A8_UNORM;
    let original = profile.original_format_properties(format);
    unit::assert_true!(original.optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE));
    profile.set_format_properties(format, vk::FormatProperties {
        optimal_tiling_features: vk::FormatFeatureFlags::empty(),
        ..original
    });
    unit::assert_false!(fw.image_format_and_features_supported(
        format, vk::ImageTiling::OPTIMAL, vk::FormatFeatureFlags::SAMPLED_IMAGE)?);

    let device = Arc::clone(fw.device()?);
    let image = Image::new(device, &default_image_info(), Default::default())?;
    create_image_view_test(fw, &default_image_view_info(&image),
        Some("VUID-VkImageViewCreateInfo-usage-02275"))?;
    Ok(())
}

fn depth_stencil_view(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let format = fw.find_supported_depth_stencil_format()?;
    unit::assert_true!(fw.image_format_and_features_supported(format,
        vk::ImageTiling::OPTIMAL, vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)?);
    let device = Arc::clone(fw.device()?);
    let info = image_2d_info(format, 32, 32,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
    let image = Image::new(device, &info, Default::default())?;
    let view = default_image_view_info(&image);
    unit::assert_true!(view.subresource_range.aspect_mask
        == vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
    create_image_view_test(fw, &view, None)?;
    Ok(())
}

fn buffer_view_misaligned_offset(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let buffer = Buffer::with_usage(
        device, 1024, vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER)?;
    let info = vk::BufferViewCreateInfo {
        offset: 7,
        ..default_buffer_view_info(&buffer)
    };
    create_buffer_view_test(fw, &info,
        Some("VUID-VkBufferViewCreateInfo-offset-00926"))?;
    Ok(())
}

fn buffer_view_without_texel_usage(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let buffer = Buffer::with_usage(
        device, 1024, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
    create_buffer_view_test(fw, &default_buffer_view_info(&buffer),
        Some("VUID-VkBufferViewCreateInfo-buffer-00932"))?;
    Ok(())
}

fn buffer_view_range_overflow(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let buffer = Buffer::with_usage(
        device, 1024, vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER)?;
    let info = vk::BufferViewCreateInfo {
        offset: 512,
        range: 1024,
        ..default_buffer_view_info(&buffer)
    };
    create_buffer_view_test(fw, &info,
        Some("VUID-VkBufferViewCreateInfo-range-00930"))?;
    Ok(())
}

fn duplicate_layout_binding(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let bindings = harness::bindings! {
        (0, UNIFORM_BUFFER),
        (0, SAMPLER),
    };
    expect_error(fw.monitor(),
        "VUID-VkDescriptorSetLayoutCreateInfo-binding-00279",
        || DescriptorSetLayout::from_bindings(device, &bindings));
    Ok(())
}

fn descriptor_pool_without_sets(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let sizes = pool_sizes(&harness::bindings! { (0, UNIFORM_BUFFER) });
    let info = vk::DescriptorPoolCreateInfo {
        max_sets: 0,
        pool_size_count: sizes.len() as _,
        p_pool_sizes: sizes.as_ptr(),
        ..Default::default()
    };
    expect_error(fw.monitor(), "VUID-VkDescriptorPoolCreateInfo-maxSets-00301",
        || DescriptorPool::new(device, &info));
    Ok(())
}

/// Updates binding 0 of a uniform buffer set with a single write.
fn write_uniform(
    fw: &Framework,
    id: &str,
    binding: u32,
    usage: vk::BufferUsageFlags,
    offset: vk::DeviceSize,
    ty: vk::DescriptorType,
) -> HarnessResult<()> {
    let device = fw.device()?;
    let buffer = Buffer::with_usage(Arc::clone(device), 1024, usage)?;
    let mut set = OneOffDescriptorSet::new(
        Arc::clone(device), &harness::bindings! { (0, UNIFORM_BUFFER) })?;
    set.write_buffer(binding, buffer.handle(), offset, vk::WHOLE_SIZE, ty);
    expect_error(fw.monitor(), id, || {
        set.update();
        Ok(())
    });
    Ok(())
}

fn descriptor_write_missing_binding(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    write_uniform(fw, "VUID-VkWriteDescriptorSet-dstBinding-00315", 3,
        vk::BufferUsageFlags::UNIFORM_BUFFER, 0,
        vk::DescriptorType::UNIFORM_BUFFER)?;
    Ok(())
}

fn descriptor_write_type_mismatch(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    write_uniform(fw, "VUID-VkWriteDescriptorSet-descriptorType-00319", 0,
        vk::BufferUsageFlags::STORAGE_BUFFER, 0,
        vk::DescriptorType::STORAGE_BUFFER)?;
    Ok(())
}

fn descriptor_write_buffer_usage(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    write_uniform(fw, "VUID-VkWriteDescriptorSet-descriptorType-00330", 0,
        vk::BufferUsageFlags::STORAGE_BUFFER, 0,
        vk::DescriptorType::UNIFORM_BUFFER)?;
    Ok(())
}

fn descriptor_write_misaligned_offset(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    write_uniform(fw, "VUID-VkWriteDescriptorSet-descriptorType-00327", 0,
        vk::BufferUsageFlags::UNIFORM_BUFFER, 64,
        vk::DescriptorType::UNIFORM_BUFFER)?;
    Ok(())
}

fn bind_buffer_memory_twice(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let mut buffer = Buffer::with_usage(
        Arc::clone(&device), 256, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
    let reqs = buffer.memory_requirements();
    let memory = DeviceMemory::for_requirements(device, &reqs, Default::default())?;
    expect_error(fw.monitor(), "VUID-vkBindBufferMemory-buffer-01029",
        || buffer.bind_memory(memory, 0));
    Ok(())
}

fn bind_buffer_memory_bad_offset(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let allocate = |size| DeviceMemory::allocate(Arc::clone(&device),
        &vk::MemoryAllocateInfo {
            allocation_size: size,
            memory_type_index: 0,
            ..Default::default()
        });

    let mut buffer = Buffer::init_no_mem(
        Arc::clone(&device), &default_buffer_info())?;
    let memory = allocate(1024)?;
    expect_error(fw.monitor(), "VUID-vkBindBufferMemory-memoryOffset-01036",
        || buffer.bind_memory(memory, 16));

    let mut buffer = Buffer::init_no_mem(
        Arc::clone(&device), &default_buffer_info())?;
    let memory = allocate(128)?;
    expect_error(fw.monitor(), "VUID-vkBindBufferMemory-size-01037",
        || buffer.bind_memory(memory, 0));
    Ok(())
}

/// Brings up a device with acceleration structures enabled.
fn init_accel(fw: &mut Framework) -> HarnessResult<()> {
    fw.init_framework()?;
    let name = ACCELERATION_STRUCTURE_EXTENSION;
    if !fw.device_extension_supported(fw.gpu(), None, name) {
        return Err(Error::unsupported(format!("{} not supported", name)));
    }
    fw.add_device_extension(name)?;
    fw.init_state(Default::default())
}

fn accel_buffer_usage(fw: &mut Framework) -> TestStatus {
    init_accel(fw)?;
    let device = Arc::clone(fw.device()?);
    let buffer = Buffer::with_usage(
        device, 4096, vk::BufferUsageFlags::STORAGE_BUFFER)?;
    expect_error(fw.monitor(),
        "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03614",
        || AccelerationStructure::new(buffer, &default_accel_info()));
    Ok(())
}

fn accel_unbound_buffer(fw: &mut Framework) -> TestStatus {
    init_accel(fw)?;
    let device = Arc::clone(fw.device()?);
    let info = vk::BufferCreateInfo {
        size: 4096,
        usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
        ..Default::default()
    };
    let buffer = Buffer::init_no_mem(device, &info)?;
    expect_error(fw.monitor(),
        "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03615",
        || AccelerationStructure::new(buffer, &default_accel_info()));
    Ok(())
}

fn accel_offset(fw: &mut Framework) -> TestStatus {
    init_accel(fw)?;
    let device = Arc::clone(fw.device()?);
    let usage = vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR;

    let buffer = Buffer::with_usage(Arc::clone(&device), 8192, usage)?;
    let info = vk::AccelerationStructureCreateInfoKHR {
        offset: 16,
        ..default_accel_info()
    };
    expect_error(fw.monitor(),
        "VUID-VkAccelerationStructureCreateInfoKHR-offset-03734",
        || AccelerationStructure::new(buffer, &info));

    let buffer = Buffer::with_usage(device, 4096, usage)?;
    let info = vk::AccelerationStructureCreateInfoKHR {
        offset: 256,
        ..default_accel_info()
    };
    expect_error(fw.monitor(),
        "VUID-VkAccelerationStructureCreateInfoKHR-offset-03616",
        || AccelerationStructure::new(buffer, &info));
    Ok(())
}

fn object_outlives_device(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let info = vk::SemaphoreCreateInfo::default();
    // Never destroyed, so the device reports it on the way out.
    unsafe { fw.device()?.table().create_semaphore(&info, None) }
        .map_err(Error::from)?;
    fw.monitor().set_desired_failure_msg(
        Severities::ERROR, "VUID-vkDestroyDevice-device-00378");
    Ok(())
}

fn default_objects(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    create_sampler_test(fw, &safe_sampler_info(), None)?;
    create_buffer_test(fw, &default_buffer_info(), None)?;
    create_image_test(fw, &default_image_info(), None)?;

    let device = Arc::clone(fw.device()?);
    let image = Image::new(
        Arc::clone(&device), &default_image_info(), Default::default())?;
    create_image_view_test(fw, &default_image_view_info(&image), None)?;
    let buffer = Buffer::with_usage(
        device, 1024, vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER)?;
    create_buffer_view_test(fw, &default_buffer_view_info(&buffer), None)?;
    Ok(())
}

fn concurrent_resources(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    if fw.queues().len() < 2 {
        unit::skip!("only one queue family");
    }
    let families = [0, 1];
    let buffer_info = vk::BufferCreateInfo {
        sharing_mode: vk::SharingMode::CONCURRENT,
        queue_family_index_count: families.len() as _,
        p_queue_family_indices: families.as_ptr(),
        ..default_buffer_info()
    };
    create_buffer_test(fw, &buffer_info, None)?;
    let image_info = vk::ImageCreateInfo {
        sharing_mode: vk::SharingMode::CONCURRENT,
        queue_family_index_count: families.len() as _,
        p_queue_family_indices: families.as_ptr(),
        ..default_image_info()
    };
    create_image_test(fw, &image_info, None)?;
    Ok(())
}

fn descriptor_update(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let uniform = Buffer::with_usage(
        Arc::clone(&device), 1024, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
    let texel = Buffer::with_usage(
        Arc::clone(&device), 1024, vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER)?;
    let view = BufferView::new(
        Arc::clone(&device), &default_buffer_view_info(&texel))?;
    let mut set = OneOffDescriptorSet::new(device, &harness::bindings! {
        (0, UNIFORM_BUFFER),
        (1, UNIFORM_TEXEL_BUFFER),
    })?;
    set.write_buffer(0, uniform.handle(), 256, 512,
        vk::DescriptorType::UNIFORM_BUFFER);
    set.write_buffer_view(1, view.handle(),
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER);
    expect_clean(fw.monitor(), || {
        set.update();
        Ok(())
    })?;
    Ok(())
}

fn acceleration_structure(fw: &mut Framework) -> TestStatus {
    init_accel(fw)?;
    let device = Arc::clone(fw.device()?);
    let accel = expect_clean(fw.monitor(), || AccelerationStructure::with_storage(
        device, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL, 4096))?;
    unit::assert_true!(accel.handle() != vk::AccelerationStructureKHR::null());
    Ok(())
}

fn mutable_format_view(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let info = vk::ImageCreateInfo {
        flags: vk::ImageCreateFlags::MUTABLE_FORMAT,
        ..default_image_info()
    };
    let image = Image::new(device, &info, Default::default())?;
    let info = vk::ImageViewCreateInfo {
        format: vk::Format::R8G8B8A8_SRGB,
        ..default_image_view_info(&image)
    };
    create_image_view_test(fw, &info, None)?;
    Ok(())
}

unit::declare_tests![
    "LayerTest" => [
        sampler_lod_range_inverted,
        sampler_anisotropy_out_of_range,
        sampler_anisotropy_disabled,
        sampler_unnormalized_filters,
        sampler_lod_bias,
        buffer_zero_size,
        buffer_no_usage,
        buffer_concurrent_single_family,
        image_initial_layout,
        image_zero_extent,
        image_mip_chain_too_long,
        image_2d_with_depth,
        image_view_unbound,
        image_view_empty_range,
        image_view_format_mismatch,
        (#[requires_device_profile] image_view_format_features),
        buffer_view_misaligned_offset,
        buffer_view_without_texel_usage,
        buffer_view_range_overflow,
        duplicate_layout_binding,
        descriptor_pool_without_sets,
        descriptor_write_missing_binding,
        descriptor_write_type_mismatch,
        descriptor_write_buffer_usage,
        descriptor_write_misaligned_offset,
        bind_buffer_memory_twice,
        bind_buffer_memory_bad_offset,
        accel_buffer_usage,
        accel_unbound_buffer,
        accel_offset,
        object_outlives_device,
    ],
    "PositiveLayerTest" => [
        default_objects,
        concurrent_resources,
        descriptor_update,
        acceleration_structure,
        mutable_format_view,
        depth_stencil_view,
    ],
];
