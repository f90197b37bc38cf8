use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::extensions::ext::{DebugReport, DebugUtils};
use ash::vk;
use derivative::Derivative;
use itertools::Itertools;
use log::{debug, info, trace};

use crate::*;

#[derive(Clone, Debug, Default)]
pub struct InstanceDesc {
    pub app_name: String,
    pub api_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    /// Install a debug-report callback even if debug-utils is enabled.
    pub prefer_debug_report: bool,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Instance {
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    #[derivative(Debug = "ignore")]
    table: ash::Instance,
    api_version: u32,
    layers: Vec<String>,
    extensions: Vec<String>,
    callback: Option<DebugCallback>,
}

impl Drop for Instance {
    fn drop(&mut self) {
        // The callback must go first or it would outlive its instance.
        self.callback.take();
        trace!("Instance::drop()");
        unsafe { self.table.destroy_instance(None); }
    }
}

fn to_cstrings(names: &[String]) -> HarnessResult<Vec<CString>> {
    names.iter()
        .map(|name| CString::new(name.as_str())
            .map_err(|_| err_msg!("invalid name: {:?}", name)))
        .collect()
}

/// Names of the layers the loader or driver exposes.
pub fn instance_layers(entry: &ash::Entry) -> HarnessResult<Vec<String>> {
    let props = entry.enumerate_instance_layer_properties()?;
    Ok(props.iter().map(|p| fixed_str(&p.layer_name).to_owned()).collect())
}

/// Names of the instance extensions, either implemented by the driver
/// or, given a layer name, by that layer.
pub fn instance_extensions(entry: &ash::Entry, layer: Option<&str>) ->
    HarnessResult<Vec<String>>
{
    let layer = layer.map(CString::new).transpose()
        .map_err(|_| err_msg!("invalid layer name"))?;
    let props = entry
        .enumerate_instance_extension_properties(layer.as_deref())?;
    Ok(props.iter()
        .map(|p| fixed_str(&p.extension_name).to_owned())
        .collect())
}

/// The highest API version the loader supports.
pub fn loader_api_version(entry: &ash::Entry) -> HarnessResult<u32> {
    Ok(entry.try_enumerate_instance_version()?
        .unwrap_or(vk::API_VERSION_1_0))
}

impl Instance {
    /// Creates an instance and, if a debug extension is enabled, routes
    /// its messages to `sink`.
    pub fn new(
        entry: ash::Entry,
        desc: &InstanceDesc,
        sink: Arc<dyn DiagnosticSink>,
    ) -> HarnessResult<Self> {
        let app_name = CString::new(desc.app_name.as_str())
            .map_err(|_| err_msg!("invalid app name"))?;
        let app_info = vk::ApplicationInfo {
            p_application_name: app_name.as_ptr(),
            application_version: vk::make_api_version(0, 0, 1, 0),
            p_engine_name: app_name.as_ptr(),
            api_version: desc.api_version,
            ..Default::default()
        };

        let layers = to_cstrings(&desc.layers)?;
        let extensions = to_cstrings(&desc.extensions)?;
        let layer_ptrs: Vec<_> = layers.iter().map(|s| s.as_ptr()).collect();
        let extension_ptrs: Vec<_> =
            extensions.iter().map(|s| s.as_ptr()).collect();

        info!("enabled layers: [{}]", desc.layers.iter().join(", "));
        info!("enabled instance extensions: [{}]",
            desc.extensions.iter().join(", "));

        let create_info = vk::InstanceCreateInfo {
            p_application_info: &app_info,
            enabled_layer_count: layer_ptrs.len() as _,
            pp_enabled_layer_names: layer_ptrs.c_ptr(),
            enabled_extension_count: extension_ptrs.len() as _,
            pp_enabled_extension_names: extension_ptrs.c_ptr(),
            ..Default::default()
        };
        let table = unsafe { entry.create_instance(&create_info, None)? };
        debug!("created instance, API {}", version_string(desc.api_version));

        let mut instance = Instance {
            entry,
            table,
            api_version: desc.api_version,
            layers: desc.layers.clone(),
            extensions: desc.extensions.clone(),
            callback: None,
        };
        instance.callback = instance.install_callback(
            desc.prefer_debug_report, sink)?;
        Ok(instance)
    }

    fn install_callback(
        &self,
        prefer_report: bool,
        sink: Arc<dyn DiagnosticSink>,
    ) -> HarnessResult<Option<DebugCallback>> {
        let utils = self.has_extension(DebugUtils::name());
        let report = self.has_extension(DebugReport::name());
        let callback = unsafe {
            if report && (prefer_report || !utils) {
                debug!("installing debug report callback");
                Some(DebugCallback::Report(
                    DebugReportCallback::new(&self.entry, &self.table, sink)?))
            } else if utils {
                debug!("installing debug messenger");
                Some(DebugCallback::Utils(
                    DebugMessenger::new(&self.entry, &self.table, sink)?))
            } else {
                None
            }
        };
        Ok(callback)
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn table(&self) -> &ash::Instance {
        &self.table
    }

    pub fn handle(&self) -> vk::Instance {
        self.table.handle()
    }

    /// The API version the instance was created with.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l == name)
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        let name = name.to_string_lossy();
        self.extensions.iter().any(|e| *e == name)
    }

    pub fn debug_callback(&self) -> Option<&DebugCallback> {
        self.callback.as_ref()
    }

    pub fn physical_devices(&self) -> HarnessResult<Vec<vk::PhysicalDevice>> {
        Ok(unsafe { self.table.enumerate_physical_devices()? })
    }

    /// Device extensions implemented by the driver or, given a layer
    /// name, by that layer.
    pub fn device_extensions(
        &self,
        pdev: vk::PhysicalDevice,
        layer: Option<&str>,
    ) -> HarnessResult<Vec<String>> {
        let props = match layer {
            None => unsafe {
                self.table.enumerate_device_extension_properties(pdev)?
            },
            Some(layer) => {
                let layer = CString::new(layer)
                    .map_err(|_| err_msg!("invalid layer name"))?;
                enumerate_layer_device_extensions(&self.table, pdev, &layer)?
            },
        };
        Ok(props.iter()
            .map(|p| fixed_str(&p.extension_name).to_owned())
            .collect())
    }

    pub fn features(&self, pdev: vk::PhysicalDevice) ->
        vk::PhysicalDeviceFeatures
    {
        unsafe { self.table.get_physical_device_features(pdev) }
    }

    pub fn properties(&self, pdev: vk::PhysicalDevice) ->
        vk::PhysicalDeviceProperties
    {
        unsafe { self.table.get_physical_device_properties(pdev) }
    }

    pub fn format_properties(
        &self,
        pdev: vk::PhysicalDevice,
        format: vk::Format,
    ) -> vk::FormatProperties {
        unsafe {
            self.table.get_physical_device_format_properties(pdev, format)
        }
    }

    pub fn queue_families(&self, pdev: vk::PhysicalDevice) ->
        Vec<vk::QueueFamilyProperties>
    {
        unsafe {
            self.table.get_physical_device_queue_family_properties(pdev)
        }
    }
}

/// `ash` only wraps the layer-less form of this query.
fn enumerate_layer_device_extensions(
    table: &ash::Instance,
    pdev: vk::PhysicalDevice,
    layer: &CStr,
) -> HarnessResult<Vec<vk::ExtensionProperties>> {
    let enumerate = table.fp_v1_0().enumerate_device_extension_properties;
    unsafe {
        let mut count = 0;
        enumerate(pdev, layer.as_ptr(), &mut count, std::ptr::null_mut())
            .result()?;
        let mut props = vec![Default::default(); count as usize];
        enumerate(pdev, layer.as_ptr(), &mut count, props.as_mut_ptr())
            .result()?;
        props.truncate(count as usize);
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_layers_and_extensions() {
        let entry = sim::entry();
        let layers = instance_layers(&entry).unwrap();
        assert!(layers.iter().any(|l| l == sim::VALIDATION_LAYER));

        let exts = instance_extensions(&entry, None).unwrap();
        assert!(exts.iter().any(|e| e == "VK_EXT_debug_utils"));
        let exts = instance_extensions(&entry, Some(sim::VALIDATION_LAYER))
            .unwrap();
        assert!(exts.iter().any(|e| e == "VK_EXT_validation_features"));
    }

    #[test]
    fn callback_selection() {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(Monitor::new());
        let desc = InstanceDesc {
            app_name: "callback_selection".to_owned(),
            api_version: vk::API_VERSION_1_1,
            extensions: vec![
                "VK_EXT_debug_utils".to_owned(),
                "VK_EXT_debug_report".to_owned(),
            ],
            ..Default::default()
        };
        let instance = Instance::new(sim::entry(), &desc, Arc::clone(&sink))
            .unwrap();
        assert!(matches!(
            instance.debug_callback(),
            Some(DebugCallback::Utils(_)),
        ));

        let desc = InstanceDesc { prefer_debug_report: true, ..desc };
        let instance = Instance::new(sim::entry(), &desc, sink).unwrap();
        assert!(matches!(
            instance.debug_callback(),
            Some(DebugCallback::Report(_)),
        ));
    }
}
