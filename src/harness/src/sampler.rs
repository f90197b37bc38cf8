use std::sync::Arc;

use ash::vk;

use crate::*;

device_object! {
    pub struct Sampler(vk::Sampler) => destroy_sampler;
}

/// A create info that passes validation on any device.
pub fn safe_sampler_info() -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo {
        mag_filter: vk::Filter::NEAREST,
        min_filter: vk::Filter::NEAREST,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        mip_lod_bias: 0.0,
        anisotropy_enable: vk::FALSE,
        max_anisotropy: 1.0,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::NEVER,
        min_lod: 0.0,
        max_lod: 16.0,
        border_color: vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        unnormalized_coordinates: vk::FALSE,
        ..Default::default()
    }
}

impl Sampler {
    pub fn new(device: Arc<Device>, info: &vk::SamplerCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_sampler(info, None)? };
        Ok(Self { device, inner })
    }
}
