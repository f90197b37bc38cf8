use std::sync::Arc;

use ash::vk;
use fnv::FnvHashMap;
use log::trace;

use crate::*;

/// Shorthand for a list of layout bindings:
///
/// ```ignore
/// bindings! {
///     (0, UNIFORM_BUFFER),
///     (1, COMBINED_IMAGE_SAMPLER[4], FRAGMENT),
/// }
/// ```
#[macro_export]
macro_rules! bindings {
    ($(($($binding:tt)*)),* $(,)?) => {
        [$($crate::bindings!(@binding $($binding)*),)*]
    };
    (@binding $binding:expr, $type:ident$([$count:expr])?
        $(, $($stages:ident)|+)?) =>
    {
        $crate::__ash::vk::DescriptorSetLayoutBinding {
            binding: $binding,
            descriptor_type: $crate::__ash::vk::DescriptorType::$type,
            descriptor_count: $crate::bindings!(@count $($count)?),
            stage_flags: $crate::bindings!(@stages $($($stages)|+)?),
            ..Default::default()
        }
    };
    (@count) => { 1 };
    (@count $count:expr) => { $count };
    (@stages) => { $crate::__ash::vk::ShaderStageFlags::ALL };
    (@stages $($stages:ident)|+) => {
        $crate::__ash::vk::ShaderStageFlags::empty()
            $(| $crate::__ash::vk::ShaderStageFlags::$stages)+
    };
}

#[derive(Debug)]
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    inner: vk::DescriptorSetLayout,
    bindings: Box<[vk::DescriptorSetLayoutBinding]>,
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        trace!("DescriptorSetLayout::drop({:?})", self.inner);
        unsafe {
            self.device.table()
                .destroy_descriptor_set_layout(self.inner, None);
        }
    }
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> HarnessResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo {
            flags,
            binding_count: bindings.len() as _,
            p_bindings: bindings.c_ptr(),
            ..Default::default()
        };
        let inner = unsafe {
            device.table().create_descriptor_set_layout(&create_info, None)?
        };
        Ok(Self { device, inner, bindings: bindings.into() })
    }

    pub fn from_bindings(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> HarnessResult<Self> {
        Self::new(device, Default::default(), bindings)
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.inner
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

/// Pool sizes that fit one set with the given bindings. Empty bindings
/// still reserve one descriptor.
pub fn pool_sizes(bindings: &[vk::DescriptorSetLayoutBinding]) ->
    Vec<vk::DescriptorPoolSize>
{
    let mut counts: FnvHashMap<vk::DescriptorType, u32> = Default::default();
    for binding in bindings.iter() {
        *counts.entry(binding.descriptor_type).or_default() +=
            binding.descriptor_count.max(1);
    }
    let mut sizes: Vec<_> = counts.into_iter()
        .map(|(ty, descriptor_count)|
            vk::DescriptorPoolSize { ty, descriptor_count })
        .collect();
    sizes.sort_by_key(|size| size.ty.as_raw());
    sizes
}

device_object! {
    pub struct DescriptorPool(vk::DescriptorPool) => destroy_descriptor_pool;
}

impl DescriptorPool {
    pub fn new(device: Arc<Device>, info: &vk::DescriptorPoolCreateInfo) ->
        HarnessResult<Self>
    {
        let inner =
            unsafe { device.table().create_descriptor_pool(info, None)? };
        Ok(Self { device, inner })
    }

    pub fn allocate(&self, layout: &DescriptorSetLayout) ->
        HarnessResult<vk::DescriptorSet>
    {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: self.inner,
            descriptor_set_count: layouts.len() as _,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let sets = unsafe {
            self.device.table().allocate_descriptor_sets(&alloc_info)?
        };
        sets.into_iter().next()
            .ok_or_else(|| err_msg!("no descriptor set allocated"))
    }
}

#[derive(Clone, Copy, Debug)]
enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
    TexelBuffer(vk::BufferView),
}

#[derive(Clone, Copy, Debug)]
struct PendingWrite {
    binding: u32,
    array_element: u32,
    ty: vk::DescriptorType,
    info: WriteInfo,
}

/// A layout, a pool sized for one set, and that set. Writes are queued
/// and applied together by `update`.
#[derive(Debug)]
pub struct OneOffDescriptorSet {
    set: vk::DescriptorSet,
    // The pool frees the set; it must be destroyed before the layout.
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    writes: Vec<PendingWrite>,
}

impl OneOffDescriptorSet {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> HarnessResult<Self> {
        Self::with_flags(device, bindings, Default::default(),
            Default::default())
    }

    pub fn with_flags(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        layout_flags: vk::DescriptorSetLayoutCreateFlags,
        pool_flags: vk::DescriptorPoolCreateFlags,
    ) -> HarnessResult<Self> {
        let layout = DescriptorSetLayout::new(
            Arc::clone(&device), layout_flags, bindings)?;
        let sizes = pool_sizes(bindings);
        let pool_info = vk::DescriptorPoolCreateInfo {
            flags: pool_flags,
            max_sets: 1,
            pool_size_count: sizes.len() as _,
            p_pool_sizes: sizes.c_ptr(),
            ..Default::default()
        };
        let pool = DescriptorPool::new(device, &pool_info)?;
        let set = pool.allocate(&layout)?;
        Ok(Self { set, pool, layout, writes: Vec::new() })
    }

    pub fn device(&self) -> &Arc<Device> {
        self.layout.device()
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    fn push(&mut self, binding: u32, ty: vk::DescriptorType, info: WriteInfo) {
        self.writes.push(PendingWrite {
            binding,
            array_element: 0,
            ty,
            info,
        });
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        ty: vk::DescriptorType,
    ) {
        let info = vk::DescriptorBufferInfo { buffer, offset, range };
        self.push(binding, ty, WriteInfo::Buffer(info));
    }

    pub fn write_buffer_view(
        &mut self,
        binding: u32,
        view: vk::BufferView,
        ty: vk::DescriptorType,
    ) {
        self.push(binding, ty, WriteInfo::TexelBuffer(view));
    }

    pub fn write_image(
        &mut self,
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        image_layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view,
            image_layout,
        };
        self.push(binding, ty, WriteInfo::Image(info));
    }

    /// Applies and clears the queued writes.
    pub fn update(&mut self) {
        let writes: Vec<_> = self.writes.iter().map(|write| {
            let mut vk_write = vk::WriteDescriptorSet {
                dst_set: self.set,
                dst_binding: write.binding,
                dst_array_element: write.array_element,
                descriptor_count: 1,
                descriptor_type: write.ty,
                ..Default::default()
            };
            match &write.info {
                WriteInfo::Buffer(info) => vk_write.p_buffer_info = info,
                WriteInfo::Image(info) => vk_write.p_image_info = info,
                WriteInfo::TexelBuffer(view) =>
                    vk_write.p_texel_buffer_view = view,
            }
            vk_write
        }).collect();
        unsafe { self.device().table().update_descriptor_sets(&writes, &[]); }
        self.writes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_macro() {
        let bindings = bindings! {
            (0, UNIFORM_BUFFER),
            (1, COMBINED_IMAGE_SAMPLER[4], FRAGMENT),
            (2, STORAGE_BUFFER, VERTEX | COMPUTE),
        };
        assert_eq!(bindings[0].descriptor_count, 1);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::ALL);
        assert_eq!(bindings[1].descriptor_count, 4);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[2].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn sizes() {
        let bindings = bindings! {
            (0, UNIFORM_BUFFER),
            (1, UNIFORM_BUFFER[2]),
            (2, SAMPLER[0]),
        };
        let sizes = pool_sizes(&bindings);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 1);
        assert_eq!(sizes[1].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }
}
