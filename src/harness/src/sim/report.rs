//! Delivery of diagnostics to the application's debug callbacks.
use std::ffi::{c_void, CString};
use std::hash::Hasher;

use ash::vk::{self, Handle};
use fnv::FnvHasher;
use log::trace;

use super::driver::InstanceState;
use crate::Severity;

#[derive(Clone, Copy, Debug)]
pub(super) enum Callback {
    Utils {
        handle: u64,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        types: vk::DebugUtilsMessageTypeFlagsEXT,
        pfn: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
        user_data: usize,
    },
    Report {
        handle: u64,
        flags: vk::DebugReportFlagsEXT,
        pfn: vk::PFN_vkDebugReportCallbackEXT,
        user_data: usize,
    },
}

impl Callback {
    pub(super) fn handle(&self) -> u64 {
        match *self {
            Callback::Utils { handle, .. } => handle,
            Callback::Report { handle, .. } => handle,
        }
    }
}

#[derive(Clone, Debug)]
pub(super) struct Diagnostic {
    pub severity: Severity,
    pub id: &'static str,
    pub object: (vk::ObjectType, u64),
    pub message: String,
}

impl Diagnostic {
    pub(super) fn new(
        severity: Severity,
        id: &'static str,
        object: impl Handle,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            id,
            object: (object_type(&object), object.as_raw()),
            message: message.into(),
        }
    }

    pub(super) fn error(
        id: &'static str,
        object: impl Handle,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Error, id, object, message)
    }

    pub(super) fn warning(
        id: &'static str,
        object: impl Handle,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, id, object, message)
    }

    /// An object tracker notice such as `CREATE` or `DESTROY`.
    pub(super) fn tracker(
        what: &str,
        ty: vk::ObjectType,
        handle: u64,
    ) -> Self {
        Self {
            severity: Severity::Info,
            id: super::OBJECT_TRACKER_INFO,
            object: (ty, handle),
            message: format!(
                "OBJ[0x{:x}] : {} {} object 0x{:x}",
                handle, what, crate::object_type_name(ty), handle,
            ),
        }
    }

    fn message_id(&self) -> i32 {
        let mut hasher = FnvHasher::default();
        hasher.write(self.id.as_bytes());
        hasher.finish() as u32 as i32
    }

    fn text(&self) -> String {
        let prefix = match self.severity {
            Severity::Error => "Validation Error",
            Severity::Warning => "Validation Warning",
            Severity::Performance => "Validation Performance Warning",
            Severity::Info => "Validation Information",
            Severity::Verbose => "Validation Verbose",
        };
        format!(
            "{}: [ {} ] Object 0: handle = 0x{:x}, type = VK_OBJECT_TYPE_{:?}; \
             | MessageID = 0x{:08x} | {}",
            prefix,
            self.id,
            self.object.1,
            self.object.0,
            self.message_id() as u32,
            self.message,
        )
    }
}

fn object_type<T: Handle>(_: &T) -> vk::ObjectType {
    T::TYPE
}

fn c_string(s: impl Into<Vec<u8>>) -> CString {
    CString::new(s).unwrap_or_default()
}

/// Calls every registered callback interested in each diagnostic. Must
/// not be called with any driver lock held; callbacks may re-enter.
pub(super) fn emit(instance: &InstanceState, diags: Vec<Diagnostic>) {
    if !instance.validation || diags.is_empty() {
        return;
    }
    let callbacks = instance.callbacks.lock().clone();
    let layer_prefix = c_string("Validation");
    for diag in diags {
        let text = diag.text();
        trace!("sim: {}", text);
        let id = c_string(diag.id);
        let message = c_string(text);
        let message_id = diag.message_id();
        let (ty, handle) = diag.object;
        for callback in callbacks.iter() {
            match *callback {
                Callback::Utils { severity, types, pfn, user_data, .. } => {
                    let (sev, ty_bits) = diag.severity.to_utils();
                    if !severity.contains(sev) || !types.intersects(ty_bits) {
                        continue;
                    }
                    let objects = [vk::DebugUtilsObjectNameInfoEXT {
                        object_type: ty,
                        object_handle: handle,
                        ..Default::default()
                    }];
                    let data = vk::DebugUtilsMessengerCallbackDataEXT {
                        p_message_id_name: id.as_ptr(),
                        message_id_number: message_id,
                        p_message: message.as_ptr(),
                        object_count: objects.len() as u32,
                        p_objects: objects.as_ptr(),
                        ..Default::default()
                    };
                    if let Some(pfn) = pfn {
                        unsafe { pfn(sev, ty_bits, &data, user_data as *mut c_void); }
                    }
                },
                Callback::Report { flags, pfn, user_data, .. } => {
                    let bit = diag.severity.to_report();
                    if !flags.contains(bit) {
                        continue;
                    }
                    if let Some(pfn) = pfn {
                        unsafe {
                            pfn(
                                bit,
                                vk::DebugReportObjectTypeEXT::from_raw(ty.as_raw()),
                                handle,
                                0,
                                message_id,
                                layer_prefix.as_ptr(),
                                message.as_ptr(),
                                user_data as *mut c_void,
                            );
                        }
                    }
                },
            }
        }
    }
}
