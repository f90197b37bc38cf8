use std::ffi::CString;
use std::sync::Arc;

use ash::extensions::ext::{DebugReport, DebugUtils};
use ash::vk;
use derivative::Derivative;
use log::{debug, info, warn};

use crate::*;

/// Options for `Framework::init_state`.
#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct StateOptions {
    /// Features to enable. Every feature the device has when `None`.
    pub features: Option<vk::PhysicalDeviceFeatures>,
    /// Extension structures for the device. A chained
    /// `VkPhysicalDeviceFeatures2` takes the place of `features`.
    pub chain: ExtensionChain,
    #[derivative(Default(
        value = "vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER"))]
    pub pool_flags: vk::CommandPoolCreateFlags,
    /// The default queue comes from the first family with these flags.
    #[derivative(Default(value = "vk::QueueFlags::GRAPHICS"))]
    pub queue_flags: vk::QueueFlags,
}

/// The per-test fixture. Objects are created in stages and destroyed in
/// reverse order by `teardown`, which also runs on drop.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Framework {
    config: Config,
    monitor: Arc<Monitor>,
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    target_api_version: u32,
    instance_extensions: Vec<String>,
    device_extensions: Vec<String>,
    instance: Option<Arc<Instance>>,
    gpu: vk::PhysicalDevice,
    device: Option<Arc<Device>>,
    queues: Vec<Arc<Queue>>,
    queue: Option<Arc<Queue>>,
    pool: Option<Arc<CommandPool>>,
    cmd: Option<CommandBuffer>,
    render_target: Option<RenderTarget>,
}

impl Drop for Framework {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn major_minor(version: u32) -> u32 {
    vk::make_api_version(
        0, vk::api_version_major(version), vk::api_version_minor(version), 0)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|s| s == name) {
        list.push(name.to_owned());
    }
}

impl Framework {
    pub fn new(config: Config, monitor: Arc<Monitor>) -> HarnessResult<Self> {
        let entry = config.backend.entry()?;
        Ok(Self {
            target_api_version: config.target_api_version,
            config,
            monitor,
            entry,
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
            instance: None,
            gpu: vk::PhysicalDevice::null(),
            device: None,
            queues: Vec::new(),
            queue: None,
            pool: None,
            cmd: None,
            render_target: None,
        })
    }

    /// Runs one test body in a fresh framework. The monitor is cleared
    /// first. After teardown, a body that returned `Ok` is failed for
    /// anything still pending or unaccounted; after an abort the
    /// monitor is only cleared.
    pub fn run_test(
        config: &Config,
        monitor: &Arc<Monitor>,
        body: impl FnOnce(&mut Framework) -> unit::TestStatus,
    ) -> unit::TestStatus {
        monitor.clear();
        let mut fw = Framework::new(config.clone(), Arc::clone(monitor))?;
        let status = body(&mut fw);
        fw.teardown();
        if let Err(abort) = status {
            debug!("test aborted: {}", abort);
            monitor.clear();
            return Err(abort);
        }
        for record in monitor.seen() {
            debug!("seen {}", record.label());
        }
        monitor.finish();
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Must be called before `init_framework`.
    pub fn set_target_api_version(&mut self, version: u32) {
        self.target_api_version = version;
    }

    pub fn target_api_version(&self) -> u32 {
        self.target_api_version
    }

    pub fn instance_layer_supported(&self, name: &str) -> bool {
        instance_layers(&self.entry)
            .map(|layers| layers.iter().any(|l| l == name))
            .unwrap_or(false)
    }

    /// True if the driver or a layer the framework will enable provides
    /// the extension.
    pub fn instance_extension_supported(&self, name: &str) -> bool {
        let has = |layer| instance_extensions(&self.entry, layer)
            .map(|exts| exts.iter().any(|e| e == name))
            .unwrap_or(false);
        has(None) || self.layers_to_enable().iter()
            .any(|layer| has(Some(layer.as_str())))
    }

    pub fn add_instance_extension(&mut self, name: &str) -> HarnessResult<()> {
        if self.instance.is_some() {
            return Err(err_msg!(
                "instance extension {} added after init_framework", name));
        }
        push_unique(&mut self.instance_extensions, name);
        Ok(())
    }

    pub fn device_extension_supported(
        &self,
        gpu: vk::PhysicalDevice,
        layer: Option<&str>,
        name: &str,
    ) -> bool {
        let instance = match self.instance {
            Some(ref instance) => instance,
            None => return false,
        };
        instance.device_extensions(gpu, layer)
            .map(|exts| exts.iter().any(|e| e == name))
            .unwrap_or(false)
    }

    /// Device extensions are added between `init_framework` and
    /// `init_state`.
    pub fn add_device_extension(&mut self, name: &str) -> HarnessResult<()> {
        if self.instance.is_none() || self.device.is_some() {
            return Err(err_msg!(
                "device extension {} must be added between init_framework \
                 and init_state", name));
        }
        push_unique(&mut self.device_extensions, name);
        Ok(())
    }

    fn layers_to_enable(&self) -> Vec<String> {
        let available = instance_layers(&self.entry).unwrap_or_default();
        let mut layers = Vec::new();
        if available.iter().any(|l| l == sim::VALIDATION_LAYER) {
            layers.push(sim::VALIDATION_LAYER.to_owned());
        }
        if self.config.device_profile
            && available.iter().any(|l| l == sim::DEVICE_PROFILE_LAYER)
        {
            layers.push(sim::DEVICE_PROFILE_LAYER.to_owned());
        }
        layers
    }

    /// Creates the instance, installs the debug callback and picks a
    /// physical device.
    pub fn init_framework(&mut self) -> HarnessResult<()> {
        if self.instance.is_some() {
            return Ok(());
        }

        let layers = self.layers_to_enable();
        if !layers.iter().any(|l| l == sim::VALIDATION_LAYER) {
            if self.config.require_validation {
                return Err(Error::unsupported(format!(
                    "{} not available", sim::VALIDATION_LAYER)));
            }
            warn!("running without {}", sim::VALIDATION_LAYER);
        }
        if self.config.device_profile
            && !layers.iter().any(|l| l == sim::DEVICE_PROFILE_LAYER)
        {
            warn!("{} not available", sim::DEVICE_PROFILE_LAYER);
        }

        let utils = DebugUtils::name().to_string_lossy().into_owned();
        let report = DebugReport::name().to_string_lossy().into_owned();
        let mut extensions = Vec::new();
        let has_utils = self.instance_extension_supported(&utils);
        let has_report = self.instance_extension_supported(&report);
        if has_utils && !self.config.debug_report {
            extensions.push(utils);
        } else if has_report {
            extensions.push(report);
        }
        for ext in self.instance_extensions.iter() {
            push_unique(&mut extensions, ext);
        }

        let desc = InstanceDesc {
            app_name: self.config.app_name.clone(),
            api_version: self.target_api_version,
            layers,
            extensions: extensions.clone(),
            prefer_debug_report: self.config.debug_report,
        };
        let sink: Arc<dyn DiagnosticSink> = Arc::clone(&self.monitor) as _;
        let instance = Arc::new(Instance::new(self.entry.clone(), &desc, sink)?);
        self.instance_extensions = extensions;

        let required = &self.config.required_features;
        let gpu = instance.physical_devices()?.into_iter()
            .find(|&pd| features_satisfied(&instance.features(pd), required))
            .ok_or_else(|| Error::unsupported(
                "no physical device with the required features"))?;
        let props = instance.properties(gpu);
        info!(
            "physical device: {} (API {})",
            fixed_str(&props.device_name),
            version_string(props.api_version),
        );

        self.gpu = gpu;
        self.instance = Some(instance);
        Ok(())
    }

    /// Creates the device, picks the default queue and creates the
    /// default command pool and buffer.
    pub fn init_state(&mut self, options: StateOptions) -> HarnessResult<()> {
        let instance = Arc::clone(self.instance()?);
        if self.device.is_some() {
            return Err(err_msg!("init_state called twice"));
        }

        let families = instance.queue_families(self.gpu);
        let family = families.iter()
            .position(|f| f.queue_flags.contains(options.queue_flags))
            .ok_or_else(|| Error::unsupported(format!(
                "no queue family supports {:?}", options.queue_flags)))?;
        debug!("queue families: {:?}",
            families.iter().map(|f| f.queue_flags).collect::<Vec<_>>());
        debug!("default queue family: {}", family);

        for name in options.chain.extensions() {
            push_unique(&mut self.device_extensions, name);
        }
        let features = options.features
            .unwrap_or_else(|| instance.features(self.gpu));
        let desc = DeviceDesc {
            features,
            extensions: self.device_extensions.clone(),
            chain: options.chain,
        };
        let (device, queues) = unsafe { Device::new(instance, self.gpu, &desc)? };
        let queue = Arc::clone(&queues[family]);
        let pool = CommandPool::new(Arc::clone(&queue), options.pool_flags)?;
        let cmd = CommandBuffer::new(&pool, vk::CommandBufferLevel::PRIMARY)?;

        self.device = Some(device);
        self.queues = queues;
        self.queue = Some(queue);
        self.pool = Some(pool);
        self.cmd = Some(cmd);
        Ok(())
    }

    pub fn init(&mut self, options: StateOptions) -> HarnessResult<()> {
        self.init_framework()?;
        self.init_state(options)
    }

    /// Creates a 256x256 color target with a render pass and framebuffer.
    pub fn init_render_target(&mut self) -> HarnessResult<()> {
        let device = Arc::clone(self.device()?);
        self.render_target = Some(RenderTarget::new(device, 256, 256)?);
        Ok(())
    }

    /// Destroys everything in reverse creation order. A device still
    /// referenced by another wrapper is a leak and fails the test.
    pub fn teardown(&mut self) {
        self.render_target.take();
        self.cmd.take();
        self.pool.take();
        self.queue.take();
        self.queues.clear();
        if let Some(device) = self.device.take() {
            let holders = Arc::strong_count(&device) - 1;
            if holders > 0 {
                unit::add_failure(format!(
                    "resource leak: {} object(s) outlived the framework",
                    holders,
                ));
            }
        }
        self.instance.take();
    }

    /// The lowest of the target, loader, instance and device API
    /// versions, ignoring patch numbers.
    pub fn device_validation_version(&self) -> u32 {
        let loader = loader_api_version(&self.entry)
            .unwrap_or(vk::API_VERSION_1_0);
        let mut version = major_minor(self.target_api_version)
            .min(major_minor(loader));
        if let Some(ref instance) = self.instance {
            version = version.min(major_minor(instance.api_version()));
            let device = instance.properties(self.gpu).api_version;
            version = version.min(major_minor(device));
        }
        version
    }

    pub fn load_device_profile_layer(&self) -> HarnessResult<DeviceProfile> {
        let instance = self.instance()?;
        if !instance.has_layer(sim::DEVICE_PROFILE_LAYER) {
            return Err(Error::unsupported(format!(
                "{} not loaded", sim::DEVICE_PROFILE_LAYER)));
        }
        DeviceProfile::load(&self.entry, instance, self.gpu)
    }

    pub fn instance(&self) -> HarnessResult<&Arc<Instance>> {
        self.instance.as_ref()
            .ok_or_else(|| err_msg!("init_framework has not been called"))
    }

    pub fn gpu(&self) -> vk::PhysicalDevice {
        self.gpu
    }

    /// Every feature the physical device supports.
    pub fn available_features(&self) -> HarnessResult<vk::PhysicalDeviceFeatures> {
        Ok(self.instance()?.features(self.gpu))
    }

    pub fn physical_device_properties(&self) ->
        HarnessResult<vk::PhysicalDeviceProperties>
    {
        Ok(self.instance()?.properties(self.gpu))
    }

    pub fn format_properties(&self, format: vk::Format) ->
        HarnessResult<vk::FormatProperties>
    {
        Ok(self.instance()?.format_properties(self.gpu, format))
    }

    /// True if `format` offers every bit of `features` with `tiling`.
    pub fn image_format_and_features_supported(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> HarnessResult<bool> {
        let props = self.format_properties(format)?;
        let available = match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features,
            _ => props.optimal_tiling_features,
        };
        Ok(available.contains(features))
    }

    /// The first combined depth/stencil format usable as an optimally
    /// tiled attachment.
    pub fn find_supported_depth_stencil_format(&self) ->
        HarnessResult<vk::Format>
    {
        const CANDIDATES: [vk::Format; 3] = [
            vk::Format::D16_UNORM_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D32_SFLOAT_S8_UINT,
        ];
        for &format in CANDIDATES.iter() {
            if self.image_format_and_features_supported(
                format,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            )? {
                return Ok(format);
            }
        }
        Err(Error::unsupported("no depth/stencil attachment format"))
    }

    pub fn instance_extensions(&self) -> &[String] {
        &self.instance_extensions
    }

    pub fn device_extensions(&self) -> &[String] {
        &self.device_extensions
    }

    pub fn device(&self) -> HarnessResult<&Arc<Device>> {
        self.device.as_ref()
            .ok_or_else(|| err_msg!("init_state has not been called"))
    }

    /// One queue per family, in family order.
    pub fn queues(&self) -> &[Arc<Queue>] {
        &self.queues
    }

    pub fn queue(&self) -> HarnessResult<&Arc<Queue>> {
        self.queue.as_ref()
            .ok_or_else(|| err_msg!("init_state has not been called"))
    }

    pub fn queue_family_index(&self) -> HarnessResult<u32> {
        Ok(self.queue()?.family())
    }

    pub fn command_pool(&self) -> HarnessResult<&Arc<CommandPool>> {
        self.pool.as_ref()
            .ok_or_else(|| err_msg!("init_state has not been called"))
    }

    pub fn command_buffer(&mut self) -> HarnessResult<&mut CommandBuffer> {
        self.cmd.as_mut()
            .ok_or_else(|| err_msg!("init_state has not been called"))
    }

    pub fn render_target(&self) -> HarnessResult<&RenderTarget> {
        self.render_target.as_ref()
            .ok_or_else(|| err_msg!("init_render_target has not been called"))
    }

    pub fn render_pass(&self) -> HarnessResult<vk::RenderPass> {
        Ok(self.render_target()?.render_pass().handle())
    }

    pub fn framebuffer(&self) -> HarnessResult<vk::Framebuffer> {
        Ok(self.render_target()?.framebuffer().handle())
    }
}

/// Entry points of the device-profile layer, which overrides what the
/// physical device reports.
#[derive(Clone, Copy, Derivative)]
#[derivative(Debug)]
pub struct DeviceProfile {
    gpu: vk::PhysicalDevice,
    #[derivative(Debug = "ignore")]
    set_format_properties: sim::PFN_vkSetPhysicalDeviceFormatPropertiesEXT,
    #[derivative(Debug = "ignore")]
    original_format_properties:
        sim::PFN_vkGetOriginalPhysicalDeviceFormatPropertiesEXT,
}

impl DeviceProfile {
    fn load(
        entry: &ash::Entry,
        instance: &Instance,
        gpu: vk::PhysicalDevice,
    ) -> HarnessResult<Self> {
        let lookup = |name: &str| -> HarnessResult<unsafe extern "system" fn()> {
            let cname = CString::new(name)
                .map_err(|_| err_msg!("invalid name: {}", name))?;
            unsafe { entry.get_instance_proc_addr(instance.handle(), cname.as_ptr()) }
                .ok_or_else(|| Error::unsupported(format!("{} not found", name)))
        };
        let set = lookup("vkSetPhysicalDeviceFormatPropertiesEXT")?;
        let get = lookup("vkGetOriginalPhysicalDeviceFormatPropertiesEXT")?;
        unsafe {
            Ok(Self {
                gpu,
                set_format_properties: std::mem::transmute(set),
                original_format_properties: std::mem::transmute(get),
            })
        }
    }

    /// Makes the device report `props` for `format` from now on.
    pub fn set_format_properties(
        &self,
        format: vk::Format,
        props: vk::FormatProperties,
    ) {
        unsafe { (self.set_format_properties)(self.gpu, format, props); }
    }

    /// What the device reported for `format` before any override.
    pub fn original_format_properties(&self, format: vk::Format) ->
        vk::FormatProperties
    {
        let mut props = Default::default();
        unsafe { (self.original_format_properties)(self.gpu, format, &mut props); }
        props
    }
}
