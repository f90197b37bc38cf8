//! Owned `pNext` chains for `VkDeviceCreateInfo`.
use std::any::Any;
use std::fmt;
use std::os::raw::c_void;

use ash::vk;

/// A structure that may be linked into a device create info.
pub trait DeviceChainLink: fmt::Debug {
    fn clone_link(&self) -> Box<dyn DeviceChainLink>;

    fn header(&mut self) -> *mut vk::BaseOutStructure;

    fn as_any(&self) -> &dyn Any;
}

impl<T> DeviceChainLink for T
    where T: vk::ExtendsDeviceCreateInfo + Copy + fmt::Debug + 'static
{
    fn clone_link(&self) -> Box<dyn DeviceChainLink> {
        Box::new(*self)
    }

    fn header(&mut self) -> *mut vk::BaseOutStructure {
        self as *mut T as *mut vk::BaseOutStructure
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct Link {
    extension: Option<String>,
    value: Box<dyn DeviceChainLink>,
}

impl Clone for Link {
    fn clone(&self) -> Self {
        Link {
            extension: self.extension.clone(),
            value: self.value.clone_link(),
        }
    }
}

/// Extension structures for a new device, each tied to the extension
/// that defines it. A structure whose extension is unavailable is left
/// out, so tests can ask for optional features without checking first.
#[derive(Clone, Debug, Default)]
pub struct ExtensionChain {
    links: Vec<Link>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a core structure unconditionally.
    pub fn push<T>(&mut self, value: T) -> &mut Self
        where T: vk::ExtendsDeviceCreateInfo + Copy + fmt::Debug + 'static
    {
        self.links.push(Link { extension: None, value: Box::new(value) });
        self
    }

    /// Adds `value` if `add_if(extension)` holds, recording the
    /// extension as one to enable. Returns whether it was added.
    pub fn add<T>(
        &mut self,
        extension: &str,
        value: T,
        add_if: impl FnOnce(&str) -> bool,
    ) -> bool
        where T: vk::ExtendsDeviceCreateInfo + Copy + fmt::Debug + 'static
    {
        if !add_if(extension) {
            return false;
        }
        self.links.push(Link {
            extension: Some(extension.to_owned()),
            value: Box::new(value),
        });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Extensions whose structures made it into the chain.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.links.iter().filter_map(|link| link.extension.as_deref())
    }

    /// The first linked structure of type `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.links.iter().find_map(|link| link.value.as_any().downcast_ref())
    }

    /// Links the structures in insertion order and returns the head,
    /// or null if the chain is empty. The pointers stay valid until the
    /// chain is next modified or dropped.
    pub fn head(&mut self) -> *const c_void {
        let mut next: *mut vk::BaseOutStructure = std::ptr::null_mut();
        for link in self.links.iter_mut().rev() {
            let header = link.value.header();
            unsafe { (*header).p_next = next; }
            next = header;
        }
        next as *const c_void
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RT_PIPELINE: &str = "VK_KHR_ray_tracing_pipeline";
    const ACCEL: &str = "VK_KHR_acceleration_structure";

    #[test]
    fn unavailable_extensions_are_left_out() {
        let mut chain = ExtensionChain::new();
        let available = |name: &str| name == ACCEL;
        assert!(!chain.add(RT_PIPELINE,
            vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default(), available));
        assert!(chain.add(ACCEL,
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default(), available));
        assert_eq!(chain.extensions().collect::<Vec<_>>(), [ACCEL]);
        assert!(chain.get::<vk::PhysicalDeviceRayTracingPipelineFeaturesKHR>()
            .is_none());
    }

    #[test]
    fn head_links_in_order() {
        let mut chain = ExtensionChain::new();
        assert!(chain.head().is_null());

        let features = vk::PhysicalDeviceFeatures {
            multi_viewport: vk::TRUE,
            ..Default::default()
        };
        chain.push(vk::PhysicalDeviceFeatures2 { features, ..Default::default() });
        chain.add(ACCEL, vk::PhysicalDeviceAccelerationStructureFeaturesKHR {
            acceleration_structure: vk::TRUE,
            ..Default::default()
        }, |_| true);

        let head = chain.head();
        unsafe {
            let first = &*(head as *const vk::BaseOutStructure);
            assert_eq!(first.s_type, vk::StructureType::PHYSICAL_DEVICE_FEATURES_2);
            let second = &*first.p_next;
            assert_eq!(second.s_type,
                vk::StructureType::PHYSICAL_DEVICE_ACCELERATION_STRUCTURE_FEATURES_KHR);
            assert!(second.p_next.is_null());
        }

        let copy = chain.clone();
        let features2 = copy.get::<vk::PhysicalDeviceFeatures2>().unwrap();
        assert_eq!(features2.features.multi_viewport, vk::TRUE);
    }
}
