//! Entry point lookup.
#![allow(non_camel_case_types)]

use std::ffi::CStr;
use std::mem;
use std::os::raw::c_char;

use ash::vk::{self, Handle};

use super::commands::*;
use super::device::*;
use super::driver::DRIVER;
use super::instance::*;

pub type PFN_vkSetPhysicalDeviceFormatPropertiesEXT = unsafe extern "system" fn(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    new_properties: vk::FormatProperties,
);

pub type PFN_vkGetOriginalPhysicalDeviceFormatPropertiesEXT =
    unsafe extern "system" fn(
        physical_device: vk::PhysicalDevice,
        format: vk::Format,
        properties: *mut vk::FormatProperties,
    );

macro_rules! proc_table {
    (
        global { $($gname:literal => $gfn:path,)* }
        device_profile { $($pname:literal => $pfn:path,)* }
        other { $($name:literal => $fn:path,)* }
    ) => {
        fn lookup_global(name: &str) -> vk::PFN_vkVoidFunction {
            unsafe {
                match name {
                    $($gname => Some(mem::transmute::<
                        *const (),
                        unsafe extern "system" fn(),
                    >($gfn as *const ())),)*
                    _ => None,
                }
            }
        }

        fn lookup_device_profile(name: &str) -> vk::PFN_vkVoidFunction {
            unsafe {
                match name {
                    $($pname => Some(mem::transmute::<
                        *const (),
                        unsafe extern "system" fn(),
                    >($pfn as *const ())),)*
                    _ => None,
                }
            }
        }

        fn lookup(name: &str) -> vk::PFN_vkVoidFunction {
            unsafe {
                match name {
                    $($name => Some(mem::transmute::<
                        *const (),
                        unsafe extern "system" fn(),
                    >($fn as *const ())),)*
                    _ => lookup_global(name),
                }
            }
        }
    }
}

proc_table! {
    global {
        "vkGetInstanceProcAddr" => get_instance_proc_addr,
        "vkCreateInstance" => create_instance,
        "vkEnumerateInstanceVersion" => enumerate_instance_version,
        "vkEnumerateInstanceExtensionProperties" =>
            enumerate_instance_extension_properties,
        "vkEnumerateInstanceLayerProperties" =>
            enumerate_instance_layer_properties,
    }
    device_profile {
        "vkSetPhysicalDeviceFormatPropertiesEXT" =>
            set_physical_device_format_properties,
        "vkGetOriginalPhysicalDeviceFormatPropertiesEXT" =>
            get_original_physical_device_format_properties,
    }
    other {
        "vkDestroyInstance" => destroy_instance,
        "vkEnumeratePhysicalDevices" => enumerate_physical_devices,
        "vkGetPhysicalDeviceFeatures" => get_physical_device_features,
        "vkGetPhysicalDeviceFeatures2" => get_physical_device_features2,
        "vkGetPhysicalDeviceFeatures2KHR" => get_physical_device_features2,
        "vkGetPhysicalDeviceProperties" => get_physical_device_properties,
        "vkGetPhysicalDeviceQueueFamilyProperties" =>
            get_physical_device_queue_family_properties,
        "vkGetPhysicalDeviceMemoryProperties" =>
            get_physical_device_memory_properties,
        "vkGetPhysicalDeviceFormatProperties" =>
            get_physical_device_format_properties,
        "vkEnumerateDeviceExtensionProperties" =>
            enumerate_device_extension_properties,
        "vkEnumerateDeviceLayerProperties" => enumerate_device_layer_properties,
        "vkCreateDebugUtilsMessengerEXT" => create_debug_utils_messenger,
        "vkDestroyDebugUtilsMessengerEXT" => destroy_debug_utils_messenger,
        "vkCreateDebugReportCallbackEXT" => create_debug_report_callback,
        "vkDestroyDebugReportCallbackEXT" => destroy_debug_report_callback,
        "vkCreateDevice" => create_device,
        "vkGetDeviceProcAddr" => get_device_proc_addr,

        "vkDestroyDevice" => destroy_device,
        "vkGetDeviceQueue" => get_device_queue,
        "vkDeviceWaitIdle" => device_wait_idle,
        "vkAllocateMemory" => allocate_memory,
        "vkFreeMemory" => free_memory,
        "vkCreateBuffer" => create_buffer,
        "vkDestroyBuffer" => destroy_buffer,
        "vkGetBufferMemoryRequirements" => get_buffer_memory_requirements,
        "vkBindBufferMemory" => bind_buffer_memory,
        "vkCreateBufferView" => create_buffer_view,
        "vkDestroyBufferView" => destroy_buffer_view,
        "vkCreateImage" => create_image,
        "vkDestroyImage" => destroy_image,
        "vkGetImageMemoryRequirements" => get_image_memory_requirements,
        "vkBindImageMemory" => bind_image_memory,
        "vkCreateImageView" => create_image_view,
        "vkDestroyImageView" => destroy_image_view,
        "vkCreateSampler" => create_sampler,
        "vkDestroySampler" => destroy_sampler,
        "vkCreateDescriptorSetLayout" => create_descriptor_set_layout,
        "vkDestroyDescriptorSetLayout" => destroy_descriptor_set_layout,
        "vkCreateDescriptorPool" => create_descriptor_pool,
        "vkDestroyDescriptorPool" => destroy_descriptor_pool,
        "vkResetDescriptorPool" => reset_descriptor_pool,
        "vkAllocateDescriptorSets" => allocate_descriptor_sets,
        "vkFreeDescriptorSets" => free_descriptor_sets,
        "vkUpdateDescriptorSets" => update_descriptor_sets,
        "vkCreatePipelineLayout" => create_pipeline_layout,
        "vkDestroyPipelineLayout" => destroy_pipeline_layout,
        "vkCreateShaderModule" => create_shader_module,
        "vkDestroyShaderModule" => destroy_shader_module,
        "vkCreatePipelineCache" => create_pipeline_cache,
        "vkDestroyPipelineCache" => destroy_pipeline_cache,
        "vkCreateGraphicsPipelines" => create_graphics_pipelines,
        "vkCreateComputePipelines" => create_compute_pipelines,
        "vkCreateRayTracingPipelinesKHR" => create_ray_tracing_pipelines,
        "vkDestroyPipeline" => destroy_pipeline,
        "vkCreateRenderPass" => create_render_pass,
        "vkDestroyRenderPass" => destroy_render_pass,
        "vkCreateFramebuffer" => create_framebuffer,
        "vkDestroyFramebuffer" => destroy_framebuffer,
        "vkCreateFence" => create_fence,
        "vkDestroyFence" => destroy_fence,
        "vkResetFences" => reset_fences,
        "vkGetFenceStatus" => get_fence_status,
        "vkWaitForFences" => wait_for_fences,
        "vkCreateSemaphore" => create_semaphore,
        "vkDestroySemaphore" => destroy_semaphore,
        "vkCreateEvent" => create_event,
        "vkDestroyEvent" => destroy_event,
        "vkCreateAccelerationStructureKHR" => create_acceleration_structure,
        "vkDestroyAccelerationStructureKHR" => destroy_acceleration_structure,

        "vkCreateCommandPool" => create_command_pool,
        "vkDestroyCommandPool" => destroy_command_pool,
        "vkResetCommandPool" => reset_command_pool,
        "vkAllocateCommandBuffers" => allocate_command_buffers,
        "vkFreeCommandBuffers" => free_command_buffers,
        "vkBeginCommandBuffer" => begin_command_buffer,
        "vkEndCommandBuffer" => end_command_buffer,
        "vkResetCommandBuffer" => reset_command_buffer,
        "vkCmdPipelineBarrier" => cmd_pipeline_barrier,
        "vkCmdSetEvent" => cmd_set_event,
        "vkQueueSubmit" => queue_submit,
        "vkQueueWaitIdle" => queue_wait_idle,
    }
}

unsafe fn name_str<'a>(p_name: *const c_char) -> Option<&'a str> {
    if p_name.is_null() {
        return None;
    }
    CStr::from_ptr(p_name).to_str().ok()
}

pub(super) unsafe extern "system" fn get_instance_proc_addr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = name_str(p_name)?;
    if instance == vk::Instance::null() {
        return lookup_global(name);
    }
    let state = DRIVER.instance(instance.as_raw())?;
    if state.device_profile {
        if let Some(pfn) = lookup_device_profile(name) {
            return Some(pfn);
        }
    }
    lookup(name)
}

pub(super) unsafe extern "system" fn get_device_proc_addr(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = name_str(p_name)?;
    DRIVER.device(device.as_raw())?;
    lookup(name)
}
