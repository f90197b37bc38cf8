use std::ffi::c_void;
use std::fmt;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ash::extensions::ext::{DebugReport, DebugUtils};
use ash::prelude::VkResult;
use ash::vk;
use derivative::Derivative;

use crate::*;

/// Consumer of the diagnostics delivered to a debug callback. Called
/// from whatever thread is inside the offending API call.
pub trait DiagnosticSink: fmt::Debug + Send + Sync {
    fn receive(&self, record: Record);
}

/// A debug-utils messenger forwarding every message to a sink.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DebugMessenger {
    #[derivative(Debug = "ignore")]
    loader: DebugUtils,
    inner: vk::DebugUtilsMessengerEXT,
    sink: Box<Arc<dyn DiagnosticSink>>,
}

impl DebugMessenger {
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: Arc<dyn DiagnosticSink>,
    ) -> VkResult<Self> {
        let loader = DebugUtils::new(entry, instance);
        let sink = Box::new(sink);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT {
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_utils_callback),
            p_user_data: &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void,
            ..Default::default()
        };
        let inner = loader.create_debug_utils_messenger(&create_info, None)?;
        Ok(Self { loader, inner, sink })
    }

    pub fn handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.inner
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.inner, None); }
    }
}

unsafe extern "system" fn debug_utils_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }
    let sink = &*(p_user_data as *const Arc<dyn DiagnosticSink>);
    // Unwinding into the driver is undefined behavior.
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        let record = Record::from_utils(severity, types, &*p_callback_data);
        sink.receive(record);
    }));
    vk::FALSE
}

/// The older debug-report callback, for drivers without debug-utils.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DebugReportCallback {
    #[derivative(Debug = "ignore")]
    loader: DebugReport,
    inner: vk::DebugReportCallbackEXT,
    sink: Box<Arc<dyn DiagnosticSink>>,
}

impl DebugReportCallback {
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: Arc<dyn DiagnosticSink>,
    ) -> VkResult<Self> {
        let loader = DebugReport::new(entry, instance);
        let sink = Box::new(sink);
        let create_info = vk::DebugReportCallbackCreateInfoEXT {
            flags: vk::DebugReportFlagsEXT::ERROR
                | vk::DebugReportFlagsEXT::WARNING
                | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING
                | vk::DebugReportFlagsEXT::INFORMATION
                | vk::DebugReportFlagsEXT::DEBUG,
            pfn_callback: Some(debug_report_callback),
            p_user_data: &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void,
            ..Default::default()
        };
        let inner = loader.create_debug_report_callback(&create_info, None)?;
        Ok(Self { loader, inner, sink })
    }

    pub fn handle(&self) -> vk::DebugReportCallbackEXT {
        self.inner
    }
}

impl Drop for DebugReportCallback {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_debug_report_callback(self.inner, None); }
    }
}

unsafe extern "system" fn debug_report_callback(
    flags: vk::DebugReportFlagsEXT,
    object_type: vk::DebugReportObjectTypeEXT,
    object: u64,
    _location: usize,
    _message_code: i32,
    _p_layer_prefix: *const c_char,
    p_message: *const c_char,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_user_data.is_null() {
        return vk::FALSE;
    }
    let sink = &*(p_user_data as *const Arc<dyn DiagnosticSink>);
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        let message = crate::util::string_from_ptr(p_message);
        let record = Record::from_report(flags, object_type, object, message);
        sink.receive(record);
    }));
    vk::FALSE
}

/// Either flavor of installed callback.
#[derive(Debug)]
pub enum DebugCallback {
    Utils(DebugMessenger),
    Report(DebugReportCallback),
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Collect(Mutex<Vec<Record>>);

    impl DiagnosticSink for Collect {
        fn receive(&self, record: Record) {
            self.0.lock().push(record);
        }
    }

    #[derive(Debug)]
    struct Explode;

    impl DiagnosticSink for Explode {
        fn receive(&self, _: Record) {
            panic!("sink exploded");
        }
    }

    #[test]
    fn report_callback_classifies() {
        let collect = Arc::new(Collect::default());
        let sink: Arc<dyn DiagnosticSink> = Arc::clone(&collect) as _;
        let user_data = &sink as *const Arc<dyn DiagnosticSink> as *mut c_void;
        let prefix = CString::new("Validation").unwrap();
        let message = CString::new(
            "Validation Error: [ VUID-VkSamplerCreateInfo-maxLod-01973 ] x",
        ).unwrap();
        let res = unsafe { debug_report_callback(
            vk::DebugReportFlagsEXT::ERROR,
            vk::DebugReportObjectTypeEXT::SAMPLER,
            7,
            0,
            0,
            prefix.as_ptr(),
            message.as_ptr(),
            user_data,
        ) };
        assert_eq!(res, vk::FALSE);
        let records = collect.0.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "VUID-VkSamplerCreateInfo-maxLod-01973");
        assert_eq!(records[0].objects[0].ty, vk::ObjectType::SAMPLER);
    }

    #[test]
    fn panics_stay_inside_callback() {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(Explode);
        let user_data = &sink as *const Arc<dyn DiagnosticSink> as *mut c_void;
        let message = CString::new("boom").unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: message.as_ptr(),
            ..Default::default()
        };
        let res = unsafe { debug_utils_callback(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            &data,
            user_data,
        ) };
        assert_eq!(res, vk::FALSE);
    }
}
