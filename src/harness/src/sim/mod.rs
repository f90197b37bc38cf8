//! An in-process software driver.
//!
//! `entry()` returns an `ash::Entry` whose `vkGetInstanceProcAddr`
//! resolves to the functions in this module, so the harness reaches it
//! through exactly the same code paths as a real loader. The driver
//! models one physical device with three queue families and bundles two
//! layers:
//!
//! - `VK_LAYER_KHRONOS_validation`, a model of the validation layer
//!   covering a focused rule set, which reports through registered
//!   debug-utils messengers and debug-report callbacks, and
//! - `VK_LAYER_LUNARG_device_simulation`, which lets tests override the
//!   format properties the device reports.
//!
//! Nothing is executed: submissions complete immediately.
use ash::vk;

mod commands;
mod device;
mod driver;
mod instance;
mod proc;
mod report;
mod rules;

pub use proc::{
    PFN_vkGetOriginalPhysicalDeviceFormatPropertiesEXT,
    PFN_vkSetPhysicalDeviceFormatPropertiesEXT,
};

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEVICE_PROFILE_LAYER: &str = "VK_LAYER_LUNARG_device_simulation";

/// The API version reported by the driver.
pub const API_VERSION: u32 = vk::make_api_version(0, 1, 2, 182);

/// Identifier of the informational records the object tracker emits on
/// every object creation and destruction.
pub const OBJECT_TRACKER_INFO: &str = "UNASSIGNED-ObjectTracker-Info";

pub fn entry() -> ash::Entry {
    let static_fn = vk::StaticFn {
        get_instance_proc_addr: proc::get_instance_proc_addr,
    };
    unsafe { ash::Entry::from_static_fn(static_fn) }
}
