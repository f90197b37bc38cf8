//! Global and instance-level entry points.
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use ash::vk::{self, Handle};
use fnv::FnvHashMap;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use super::driver::*;
use super::report::{Callback, Diagnostic};
use super::{DEVICE_PROFILE_LAYER, VALIDATION_LAYER, API_VERSION};
use crate::util::{fixed_str, slice, write_fixed_str};

const INSTANCE_EXTENSIONS: &[&str] = &[
    "VK_EXT_debug_report",
    "VK_EXT_debug_utils",
    "VK_KHR_get_physical_device_properties2",
    "VK_KHR_external_memory_capabilities",
    "VK_KHR_external_semaphore_capabilities",
    "VK_KHR_external_fence_capabilities",
];

const VALIDATION_INSTANCE_EXTENSIONS: &[&str] = &[
    "VK_EXT_debug_report",
    "VK_EXT_debug_utils",
    "VK_EXT_validation_features",
];

pub(super) const DEVICE_EXTENSIONS: &[&str] = &[
    "VK_KHR_maintenance1",
    "VK_KHR_external_memory",
    "VK_KHR_buffer_device_address",
    "VK_KHR_deferred_host_operations",
    "VK_EXT_descriptor_indexing",
    "VK_KHR_acceleration_structure",
    "VK_KHR_ray_tracing_pipeline",
];

pub(super) const VALIDATION_DEVICE_EXTENSIONS: &[&str] = &[
    "VK_EXT_debug_marker",
    "VK_EXT_validation_cache",
    "VK_EXT_tooling_info",
];

/// Writes `items` using the usual two-call enumeration protocol.
pub(super) unsafe fn fill<T: Copy>(
    items: &[T],
    p_count: *mut u32,
    p_items: *mut T,
) -> vk::Result {
    if p_count.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    if p_items.is_null() {
        *p_count = items.len() as u32;
        return vk::Result::SUCCESS;
    }
    let n = (*p_count as usize).min(items.len());
    ptr::copy_nonoverlapping(items.as_ptr(), p_items, n);
    *p_count = n as u32;
    if n < items.len() { vk::Result::INCOMPLETE } else { vk::Result::SUCCESS }
}

fn extension_properties(names: &[&str]) -> Vec<vk::ExtensionProperties> {
    names.iter().map(|name| {
        let mut props = vk::ExtensionProperties {
            spec_version: 1,
            ..Default::default()
        };
        write_fixed_str(&mut props.extension_name, name);
        props
    }).collect()
}

fn layer_properties() -> Vec<vk::LayerProperties> {
    [
        (VALIDATION_LAYER, "Khronos validation layer model"),
        (DEVICE_PROFILE_LAYER, "Device profile simulation layer"),
    ].iter().map(|&(name, description)| {
        let mut props = vk::LayerProperties {
            spec_version: API_VERSION,
            implementation_version: 1,
            ..Default::default()
        };
        write_fixed_str(&mut props.layer_name, name);
        write_fixed_str(&mut props.description, description);
        props
    }).collect()
}

fn format_properties(
    formats: &[vk::Format],
    optimal: vk::FormatFeatureFlags,
    buffer: vk::FormatFeatureFlags,
) -> impl Iterator<Item = (vk::Format, vk::FormatProperties)> + '_ {
    let linear = optimal & !(vk::FormatFeatureFlags::COLOR_ATTACHMENT
        | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND
        | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT);
    formats.iter().map(move |&format| (format, vk::FormatProperties {
        linear_tiling_features: linear,
        optimal_tiling_features: optimal,
        buffer_features: buffer,
    }))
}

impl Gpu {
    pub(super) fn new() -> Self {
        let mut properties = vk::PhysicalDeviceProperties {
            api_version: API_VERSION,
            driver_version: 1,
            vendor_id: 0x10005,
            device_id: 1,
            device_type: vk::PhysicalDeviceType::CPU,
            ..Default::default()
        };
        write_fixed_str(&mut properties.device_name, "layercheck software device");
        let limits = &mut properties.limits;
        limits.max_image_dimension1_d = 4096;
        limits.max_image_dimension2_d = 4096;
        limits.max_image_dimension3_d = 256;
        limits.max_image_dimension_cube = 4096;
        limits.max_image_array_layers = 256;
        limits.max_uniform_buffer_range = 65536;
        limits.max_storage_buffer_range = 1 << 27;
        limits.max_memory_allocation_count = 4096;
        limits.buffer_image_granularity = 1024;
        limits.max_bound_descriptor_sets = 8;
        limits.max_per_stage_descriptor_uniform_buffers = 15;
        limits.max_descriptor_set_uniform_buffers = 90;
        limits.max_sampler_lod_bias = 15.0;
        limits.max_sampler_anisotropy = 16.0;
        limits.max_viewports = 16;
        limits.max_viewport_dimensions = [4096, 4096];
        limits.viewport_bounds_range = [-8192.0, 8191.0];
        limits.max_framebuffer_width = 4096;
        limits.max_framebuffer_height = 4096;
        limits.max_framebuffer_layers = 256;
        limits.max_color_attachments = 8;
        limits.framebuffer_color_sample_counts =
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4;
        limits.min_uniform_buffer_offset_alignment = 256;
        limits.min_storage_buffer_offset_alignment = 256;
        limits.min_texel_buffer_offset_alignment = 256;
        limits.non_coherent_atom_size = 64;
        limits.line_width_range = [1.0, 1.0];
        limits.point_size_range = [1.0, 64.0];
        limits.max_compute_work_group_count = [65535; 3];
        limits.max_compute_work_group_size = [1024, 1024, 64];
        limits.max_compute_work_group_invocations = 1024;

        let t = vk::TRUE;
        let features = vk::PhysicalDeviceFeatures {
            robust_buffer_access: t,
            full_draw_index_uint32: t,
            image_cube_array: t,
            independent_blend: t,
            geometry_shader: t,
            tessellation_shader: t,
            sample_rate_shading: t,
            dual_src_blend: t,
            logic_op: t,
            multi_draw_indirect: t,
            depth_clamp: t,
            depth_bias_clamp: t,
            fill_mode_non_solid: t,
            large_points: t,
            multi_viewport: t,
            sampler_anisotropy: t,
            texture_compression_bc: t,
            fragment_stores_and_atomics: t,
            shader_storage_image_extended_formats: t,
            shader_float64: t,
            shader_int64: t,
            ..Default::default()
        };

        let queue_families = vec![
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER,
                queue_count: 1,
                timestamp_valid_bits: 64,
                min_image_transfer_granularity: vk::Extent3D {
                    width: 1, height: 1, depth: 1,
                },
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                queue_count: 1,
                timestamp_valid_bits: 64,
                min_image_transfer_granularity: vk::Extent3D {
                    width: 1, height: 1, depth: 1,
                },
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::TRANSFER,
                queue_count: 1,
                timestamp_valid_bits: 64,
                min_image_transfer_granularity: vk::Extent3D {
                    width: 16, height: 16, depth: 1,
                },
            },
        ];

        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 2,
            ..Default::default()
        };
        memory.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        memory.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 1 << 30,
            flags: Default::default(),
        };

        use vk::FormatFeatureFlags as F;
        let color = F::COLOR_ATTACHMENT | F::COLOR_ATTACHMENT_BLEND
            | F::SAMPLED_IMAGE | F::SAMPLED_IMAGE_FILTER_LINEAR
            | F::STORAGE_IMAGE | F::TRANSFER_SRC | F::TRANSFER_DST
            | F::BLIT_SRC | F::BLIT_DST;
        let texel = F::UNIFORM_TEXEL_BUFFER | F::STORAGE_TEXEL_BUFFER
            | F::VERTEX_BUFFER;
        let depth = F::DEPTH_STENCIL_ATTACHMENT | F::SAMPLED_IMAGE
            | F::TRANSFER_SRC | F::TRANSFER_DST;
        let formats: FnvHashMap<_, _> = format_properties(&[
                vk::Format::B8G8R8A8_UNORM,
                vk::Format::B8G8R8A8_SRGB,
                vk::Format::R8G8B8A8_UNORM,
                vk::Format::R8G8B8A8_SRGB,
                vk::Format::R32_SFLOAT,
                vk::Format::R32_UINT,
                vk::Format::R32G32B32A32_SFLOAT,
            ], color, texel)
            .chain(format_properties(&[
                vk::Format::D32_SFLOAT,
                vk::Format::D24_UNORM_S8_UINT,
            ], depth, F::empty()))
            .collect();

        Self {
            properties,
            features,
            queue_families,
            memory,
            original_formats: formats.clone(),
            formats,
        }
    }
}

pub(super) unsafe extern "system" fn enumerate_instance_version(
    p_api_version: *mut u32,
) -> vk::Result {
    *p_api_version = API_VERSION;
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn enumerate_instance_layer_properties(
    p_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    fill(&layer_properties(), p_count, p_properties)
}

pub(super) unsafe extern "system" fn enumerate_instance_extension_properties(
    p_layer_name: *const c_char,
    p_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    let names = if p_layer_name.is_null() {
        INSTANCE_EXTENSIONS
    } else {
        match CStr::from_ptr(p_layer_name).to_str() {
            Ok(VALIDATION_LAYER) => VALIDATION_INSTANCE_EXTENSIONS,
            Ok(DEVICE_PROFILE_LAYER) => &[],
            _ => return vk::Result::ERROR_LAYER_NOT_PRESENT,
        }
    };
    fill(&extension_properties(names), p_count, p_properties)
}

unsafe fn c_strs(ptrs: *const *const c_char, count: u32) -> Vec<String> {
    slice(ptrs, count).iter()
        .map(|&p| crate::util::string_from_ptr(p))
        .collect()
}

pub(super) unsafe extern "system" fn create_instance(
    p_create_info: *const vk::InstanceCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    let info = &*p_create_info;
    let layers = c_strs(info.pp_enabled_layer_names, info.enabled_layer_count);
    for layer in layers.iter() {
        if layer != VALIDATION_LAYER && layer != DEVICE_PROFILE_LAYER {
            return vk::Result::ERROR_LAYER_NOT_PRESENT;
        }
    }
    let validation = layers.iter().any(|l| l == VALIDATION_LAYER);
    let device_profile = layers.iter().any(|l| l == DEVICE_PROFILE_LAYER);

    let extensions = c_strs(
        info.pp_enabled_extension_names,
        info.enabled_extension_count,
    );
    for ext in extensions.iter() {
        let known = INSTANCE_EXTENSIONS.contains(&&ext[..])
            || (validation && VALIDATION_INSTANCE_EXTENSIONS.contains(&&ext[..]));
        if !known {
            return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
        }
    }

    let state = Arc::new(InstanceState {
        handle: DRIVER.new_handle(),
        gpu_handle: DRIVER.new_handle(),
        validation,
        device_profile,
        extensions,
        gpu: RwLock::new(Gpu::new()),
        callbacks: Mutex::new(Vec::new()),
        devices: Mutex::new(Vec::new()),
    });
    debug!(
        "sim: created instance 0x{:x} (validation: {}, device profile: {})",
        state.handle, validation, device_profile,
    );
    *p_instance = vk::Instance::from_raw(state.handle);
    DRIVER.add_instance(state);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_instance(
    instance: vk::Instance,
    _: *const vk::AllocationCallbacks,
) {
    let state = match DRIVER.remove_instance(instance.as_raw()) {
        Some(state) => state,
        None => return,
    };
    let devices = state.devices.lock().clone();
    let diags = devices.iter().map(|&device| Diagnostic::error(
        "VUID-vkDestroyInstance-instance-00629",
        vk::Device::from_raw(device),
        format!(
            "OBJ ERROR : For VkInstance 0x{:x}, VkDevice 0x{:x} has not been \
             destroyed.",
            state.handle, device,
        ),
    )).collect();
    state.emit(diags);
    trace!("sim: destroyed instance 0x{:x}", state.handle);
}

macro_rules! gpu_or_return {
    ($pdev:expr) => {
        match DRIVER.gpu($pdev.as_raw()) {
            Some(instance) => instance,
            None => return,
        }
    }
}

pub(super) unsafe extern "system" fn enumerate_physical_devices(
    instance: vk::Instance,
    p_count: *mut u32,
    p_devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    let state = match DRIVER.instance(instance.as_raw()) {
        Some(state) => state,
        None => return vk::Result::ERROR_INITIALIZATION_FAILED,
    };
    fill(&[vk::PhysicalDevice::from_raw(state.gpu_handle)], p_count, p_devices)
}

pub(super) unsafe extern "system" fn get_physical_device_features(
    physical_device: vk::PhysicalDevice,
    p_features: *mut vk::PhysicalDeviceFeatures,
) {
    let instance = gpu_or_return!(physical_device);
    *p_features = instance.gpu.read().features;
}

pub(super) unsafe extern "system" fn get_physical_device_features2(
    physical_device: vk::PhysicalDevice,
    p_features: *mut vk::PhysicalDeviceFeatures2,
) {
    let instance = gpu_or_return!(physical_device);
    (*p_features).features = instance.gpu.read().features;
}

pub(super) unsafe extern "system" fn get_physical_device_properties(
    physical_device: vk::PhysicalDevice,
    p_properties: *mut vk::PhysicalDeviceProperties,
) {
    let instance = gpu_or_return!(physical_device);
    *p_properties = instance.gpu.read().properties;
}

pub(super) unsafe extern "system" fn get_physical_device_queue_family_properties(
    physical_device: vk::PhysicalDevice,
    p_count: *mut u32,
    p_properties: *mut vk::QueueFamilyProperties,
) {
    let instance = gpu_or_return!(physical_device);
    let families = instance.gpu.read().queue_families.clone();
    let _ = fill(&families, p_count, p_properties);
}

pub(super) unsafe extern "system" fn get_physical_device_memory_properties(
    physical_device: vk::PhysicalDevice,
    p_properties: *mut vk::PhysicalDeviceMemoryProperties,
) {
    let instance = gpu_or_return!(physical_device);
    *p_properties = instance.gpu.read().memory;
}

pub(super) unsafe extern "system" fn get_physical_device_format_properties(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    p_properties: *mut vk::FormatProperties,
) {
    let instance = gpu_or_return!(physical_device);
    *p_properties = instance.gpu.read().format_properties(format);
}

pub(super) unsafe extern "system" fn set_physical_device_format_properties(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    new_properties: vk::FormatProperties,
) {
    let instance = gpu_or_return!(physical_device);
    debug!("sim: overriding properties of {:?}", format);
    instance.gpu.write().formats.insert(format, new_properties);
}

pub(super) unsafe extern "system" fn get_original_physical_device_format_properties(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    p_properties: *mut vk::FormatProperties,
) {
    let instance = gpu_or_return!(physical_device);
    *p_properties = instance.gpu.read().original_formats.get(&format)
        .copied().unwrap_or_default();
}

pub(super) unsafe extern "system" fn enumerate_device_extension_properties(
    physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    let instance = match DRIVER.gpu(physical_device.as_raw()) {
        Some(instance) => instance,
        None => return vk::Result::ERROR_INITIALIZATION_FAILED,
    };
    let names = if p_layer_name.is_null() {
        DEVICE_EXTENSIONS
    } else {
        match CStr::from_ptr(p_layer_name).to_str() {
            Ok(VALIDATION_LAYER) if instance.validation =>
                VALIDATION_DEVICE_EXTENSIONS,
            Ok(DEVICE_PROFILE_LAYER) if instance.device_profile => &[],
            _ => return vk::Result::ERROR_LAYER_NOT_PRESENT,
        }
    };
    fill(&extension_properties(names), p_count, p_properties)
}

pub(super) unsafe extern "system" fn enumerate_device_layer_properties(
    physical_device: vk::PhysicalDevice,
    p_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    let instance = match DRIVER.gpu(physical_device.as_raw()) {
        Some(instance) => instance,
        None => return vk::Result::ERROR_INITIALIZATION_FAILED,
    };
    let layers: Vec<_> = layer_properties().into_iter()
        .filter(|props| match fixed_str(&props.layer_name) {
            VALIDATION_LAYER => instance.validation,
            _ => instance.device_profile,
        })
        .collect();
    fill(&layers, p_count, p_properties)
}

pub(super) unsafe extern "system" fn create_debug_utils_messenger(
    instance: vk::Instance,
    p_create_info: *const vk::DebugUtilsMessengerCreateInfoEXT,
    _: *const vk::AllocationCallbacks,
    p_messenger: *mut vk::DebugUtilsMessengerEXT,
) -> vk::Result {
    let state = match DRIVER.instance(instance.as_raw()) {
        Some(state) => state,
        None => return vk::Result::ERROR_INITIALIZATION_FAILED,
    };
    if !state.extensions.iter().any(|e| e == "VK_EXT_debug_utils") {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    }
    let info = &*p_create_info;
    let handle = DRIVER.new_handle();
    state.callbacks.lock().push(Callback::Utils {
        handle,
        severity: info.message_severity,
        types: info.message_type,
        pfn: info.pfn_user_callback,
        user_data: info.p_user_data as usize,
    });
    *p_messenger = vk::DebugUtilsMessengerEXT::from_raw(handle);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_debug_utils_messenger(
    instance: vk::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    _: *const vk::AllocationCallbacks,
) {
    if let Some(state) = DRIVER.instance(instance.as_raw()) {
        state.callbacks.lock().retain(|cb| cb.handle() != messenger.as_raw());
    }
}

pub(super) unsafe extern "system" fn create_debug_report_callback(
    instance: vk::Instance,
    p_create_info: *const vk::DebugReportCallbackCreateInfoEXT,
    _: *const vk::AllocationCallbacks,
    p_callback: *mut vk::DebugReportCallbackEXT,
) -> vk::Result {
    let state = match DRIVER.instance(instance.as_raw()) {
        Some(state) => state,
        None => return vk::Result::ERROR_INITIALIZATION_FAILED,
    };
    if !state.extensions.iter().any(|e| e == "VK_EXT_debug_report") {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    }
    let info = &*p_create_info;
    let handle = DRIVER.new_handle();
    state.callbacks.lock().push(Callback::Report {
        handle,
        flags: info.flags,
        pfn: info.pfn_callback,
        user_data: info.p_user_data as usize,
    });
    *p_callback = vk::DebugReportCallbackEXT::from_raw(handle);
    vk::Result::SUCCESS
}

pub(super) unsafe extern "system" fn destroy_debug_report_callback(
    instance: vk::Instance,
    callback: vk::DebugReportCallbackEXT,
    _: *const vk::AllocationCallbacks,
) {
    if let Some(state) = DRIVER.instance(instance.as_raw()) {
        state.callbacks.lock().retain(|cb| cb.handle() != callback.as_raw());
    }
}

/// Finds the first structure of type `ty` in a `pNext` chain.
pub(super) unsafe fn find_in_chain(
    mut next: *const c_void,
    ty: vk::StructureType,
) -> Option<*const vk::BaseInStructure> {
    while !next.is_null() {
        let base = next as *const vk::BaseInStructure;
        if (*base).s_type == ty {
            return Some(base);
        }
        next = (*base).p_next as *const c_void;
    }
    None
}

pub(super) unsafe extern "system" fn create_device(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo,
    _: *const vk::AllocationCallbacks,
    p_device: *mut vk::Device,
) -> vk::Result {
    let instance = match DRIVER.gpu(physical_device.as_raw()) {
        Some(instance) => instance,
        None => return vk::Result::ERROR_INITIALIZATION_FAILED,
    };
    let info = &*p_create_info;

    let features = if !info.p_enabled_features.is_null() {
        *info.p_enabled_features
    } else if let Some(base) = find_in_chain(
        info.p_next,
        vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
    ) {
        (*(base as *const vk::PhysicalDeviceFeatures2)).features
    } else {
        Default::default()
    };
    let (available, family_count) = {
        let gpu = instance.gpu.read();
        (gpu.features, gpu.family_count())
    };
    if !crate::util::features_satisfied(&available, &features) {
        return vk::Result::ERROR_FEATURE_NOT_PRESENT;
    }

    let extensions = c_strs(
        info.pp_enabled_extension_names,
        info.enabled_extension_count,
    );
    for ext in extensions.iter() {
        let known = DEVICE_EXTENSIONS.contains(&&ext[..])
            || (instance.validation
                && VALIDATION_DEVICE_EXTENSIONS.contains(&&ext[..]));
        if !known {
            return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
        }
    }
    let external_memory = extensions.iter()
        .any(|e| e == "VK_KHR_external_memory");

    let mut queues = Vec::new();
    for queue_info in slice(info.p_queue_create_infos, info.queue_create_info_count) {
        if queue_info.queue_family_index >= family_count {
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        }
        for index in 0..queue_info.queue_count {
            queues.push(QueueState {
                handle: DRIVER.new_handle(),
                family: queue_info.queue_family_index,
                index,
            });
        }
    }

    let device = Arc::new(DeviceState {
        handle: DRIVER.new_handle(),
        instance: Arc::clone(&instance),
        features,
        extensions,
        external_memory,
        queues,
        objects: Default::default(),
        recorders: Default::default(),
    });
    debug!(
        "sim: created device 0x{:x} with {} queue(s)",
        device.handle, device.queues.len(),
    );
    *p_device = vk::Device::from_raw(device.handle);
    instance.devices.lock().push(device.handle);
    DRIVER.add_device(device);
    vk::Result::SUCCESS
}
