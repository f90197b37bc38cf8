use std::sync::Arc;

use ash::vk;

use crate::*;

device_object! {
    pub struct RenderPass(vk::RenderPass) => destroy_render_pass;
}

impl RenderPass {
    pub fn new(device: Arc<Device>, info: &vk::RenderPassCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_render_pass(info, None)? };
        Ok(Self { device, inner })
    }

    /// A single-subpass pass writing one color attachment.
    pub fn simple_color(device: Arc<Device>, format: vk::Format) ->
        HarnessResult<Self>
    {
        let attachments = [vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ..Default::default()
        }];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: color_refs.len() as _,
            p_color_attachments: color_refs.as_ptr(),
            ..Default::default()
        }];
        let create_info = vk::RenderPassCreateInfo {
            attachment_count: attachments.len() as _,
            p_attachments: attachments.as_ptr(),
            subpass_count: subpasses.len() as _,
            p_subpasses: subpasses.as_ptr(),
            ..Default::default()
        };
        Self::new(device, &create_info)
    }
}

device_object! {
    pub struct Framebuffer(vk::Framebuffer) => destroy_framebuffer;
}

impl Framebuffer {
    pub fn new(device: Arc<Device>, info: &vk::FramebufferCreateInfo) ->
        HarnessResult<Self>
    {
        let inner = unsafe { device.table().create_framebuffer(info, None)? };
        Ok(Self { device, inner })
    }
}

/// The framework's color target: an image, a view of it, a render
/// pass drawing to it, and a framebuffer binding the two. Fields drop
/// in reverse creation order.
#[derive(Debug)]
pub struct RenderTarget {
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    view: ImageView,
    image: Image,
}

impl RenderTarget {
    pub const FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

    pub fn new(device: Arc<Device>, width: u32, height: u32) ->
        HarnessResult<Self>
    {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_SRC;
        let info = image_2d_info(Self::FORMAT, width, height, usage);
        let image = Image::new(Arc::clone(&device), &info, Default::default())?;
        let view = image.create_view()?;
        let render_pass =
            RenderPass::simple_color(Arc::clone(&device), Self::FORMAT)?;
        let attachments = [view.handle()];
        let fb_info = vk::FramebufferCreateInfo {
            render_pass: render_pass.handle(),
            attachment_count: attachments.len() as _,
            p_attachments: attachments.as_ptr(),
            width,
            height,
            layers: 1,
            ..Default::default()
        };
        let framebuffer = Framebuffer::new(device, &fb_info)?;
        Ok(Self { framebuffer, render_pass, view, image })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn view(&self) -> &ImageView {
        &self.view
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }
}
