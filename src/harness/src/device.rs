use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use derivative::Derivative;
use itertools::Itertools;
use log::{info, trace};
use parking_lot::Mutex;

use crate::*;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Device {
    #[derivative(Debug = "ignore")]
    table: ash::Device,
    instance: Arc<Instance>,
    pdev: vk::PhysicalDevice,
    #[derivative(Debug = "ignore")]
    props: Box<vk::PhysicalDeviceProperties>,
    #[derivative(Debug = "ignore")]
    mem_props: Box<vk::PhysicalDeviceMemoryProperties>,
    #[derivative(Debug = "ignore")]
    features: vk::PhysicalDeviceFeatures,
    queue_families: Vec<vk::QueueFamilyProperties>,
    extensions: Vec<String>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Queue {
    #[derivative(Debug = "ignore")]
    device: Arc<Device>,
    inner: vk::Queue,
    family: u32,
    flags: vk::QueueFlags,
    mutex: Mutex<()>,
}

/// What to enable on a new device.
#[derive(Clone, Debug, Default)]
pub struct DeviceDesc {
    /// Features for `pEnabledFeatures`. Ignored when `chain` carries a
    /// `VkPhysicalDeviceFeatures2`.
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<String>,
    /// Extension structures for the create info's `pNext`.
    pub chain: ExtensionChain,
}

impl Drop for Device {
    fn drop(&mut self) {
        trace!("Device::drop()");
        unsafe { self.table.destroy_device(None); }
    }
}


impl Device {
    /// Creates a device with one queue from every queue family. Queues
    /// are returned in family order.
    pub unsafe fn new(
        instance: Arc<Instance>,
        pdev: vk::PhysicalDevice,
        desc: &DeviceDesc,
    ) -> HarnessResult<(Arc<Self>, Vec<Arc<Queue>>)> {
        let it = instance.table();
        let queue_families =
            it.get_physical_device_queue_family_properties(pdev);
        let priorities = [1.0f32];
        let queue_infos: Vec<_> = (0..queue_families.len() as u32)
            .map(|family| vk::DeviceQueueCreateInfo {
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let extensions: Vec<String> = desc.extensions.iter()
            .map(String::as_str)
            .chain(desc.chain.extensions())
            .unique()
            .map(str::to_owned)
            .collect();
        let exts: Vec<_> = extensions.iter()
            .map(|ext| CString::new(ext.as_str())
                .map_err(|_| err_msg!("invalid extension name: {:?}", ext)))
            .collect::<Result<_, _>>()?;
        let ext_ptrs: Vec<_> = exts.iter().map(|ext| ext.as_ptr()).collect();
        info!("enabled device extensions: [{}]", extensions.iter().join(", "));

        let features2 = desc.chain.get::<vk::PhysicalDeviceFeatures2>()
            .map(|f| f.features);
        let mut chain = desc.chain.clone();
        let create_info = vk::DeviceCreateInfo {
            p_next: chain.head(),
            queue_create_info_count: queue_infos.len() as _,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as _,
            pp_enabled_extension_names: ext_ptrs.c_ptr(),
            p_enabled_features: if features2.is_some() { std::ptr::null() }
                else { &desc.features },
            ..Default::default()
        };
        let table = it.create_device(pdev, &create_info, None)?;

        let features = features2.unwrap_or(desc.features);

        let props = Box::new(it.get_physical_device_properties(pdev));
        let mem_props =
            Box::new(it.get_physical_device_memory_properties(pdev));

        let device = Arc::new(Device {
            table,
            instance,
            pdev,
            props,
            mem_props,
            features,
            queue_families,
            extensions,
        });

        let queues = device.queue_families.iter().enumerate()
            .map(|(family, props)| {
                let family = family as u32;
                Arc::new(Queue {
                    device: Arc::clone(&device),
                    inner: device.table.get_device_queue(family, 0),
                    family,
                    flags: props.queue_flags,
                    mutex: Mutex::new(()),
                })
            })
            .collect();

        Ok((device, queues))
    }

    pub fn table(&self) -> &ash::Device {
        &self.table
    }

    pub fn handle(&self) -> vk::Device {
        self.table.handle()
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn pdev(&self) -> vk::PhysicalDevice {
        self.pdev
    }

    pub fn props(&self) -> &vk::PhysicalDeviceProperties {
        &self.props
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.props.limits
    }

    pub fn mem_props(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.mem_props
    }

    /// Features enabled at creation.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_families
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    /// Queue family ownership may be transferred to and from the
    /// external and foreign families.
    pub fn external_memory(&self) -> bool {
        self.has_extension("VK_KHR_external_memory")
    }

    pub fn format_properties(&self, format: vk::Format) ->
        vk::FormatProperties
    {
        self.instance.format_properties(self.pdev, format)
    }

    pub fn wait_idle(&self) -> HarnessResult<()> {
        unsafe { self.table.device_wait_idle()?; }
        Ok(())
    }
}

impl Queue {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn inner(&self) -> vk::Queue {
        self.inner
    }

    pub fn family(&self) -> u32 {
        self.family
    }

    pub fn flags(&self) -> vk::QueueFlags {
        self.flags
    }

    pub unsafe fn submit(
        &self,
        submissions: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> HarnessResult<()> {
        let _lock = self.mutex.lock();
        self.device.table.queue_submit(self.inner, submissions, fence)?;
        Ok(())
    }

    pub fn wait_idle(&self) -> HarnessResult<()> {
        let _lock = self.mutex.lock();
        unsafe { self.device.table.queue_wait_idle(self.inner)?; }
        Ok(())
    }
}
