//! Fixtures for the crate's own tests, and end-to-end tests of the
//! harness against the software driver.
use std::sync::{Arc, Once};

use ash::vk;

use crate::*;

static LOGGER: Once = Once::new();

pub(crate) fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub(crate) fn sim_framework() -> (Arc<Monitor>, Framework) {
    init_logging();
    let monitor = Arc::new(Monitor::new());
    let config = Config { backend: Backend::Sim, ..Default::default() };
    let fw = Framework::new(config, Arc::clone(&monitor)).unwrap();
    (monitor, fw)
}

/// A framework with a device and render target, using `options`.
pub(crate) fn sim_device_with(options: StateOptions) ->
    (Arc<Monitor>, Framework)
{
    let (monitor, mut fw) = sim_framework();
    fw.init(options).unwrap();
    fw.init_render_target().unwrap();
    (monitor, fw)
}

pub(crate) fn sim_device() -> (Arc<Monitor>, Framework) {
    sim_device_with(Default::default())
}

fn messages(failures: Vec<unit::Failure>) -> Vec<String> {
    failures.into_iter().map(|f| f.message).collect()
}

mod tests {
    use unit::record_failures;

    use super::*;

    fn pipeline_test(
        fw: &Framework,
        mutate: impl FnOnce(&mut CreatePipelineHelper),
        ids: &[&str],
    ) -> bool {
        let (ok, failures) = record_failures(|| {
            oneshot_test(fw, mutate, Severities::ERROR, ids).unwrap()
        });
        assert!(ok, "{:?}", messages(failures));
        ok
    }

    #[test]
    fn default_pipelines_are_clean() {
        let (_, fw) = sim_device();
        pipeline_test(&fw, |_| {}, &[]);
        let (ok, failures) = record_failures(|| {
            oneshot_test::<CreateComputePipelineHelper, _>(
                &fw, |_| {}, Severities::ERROR, &[]).unwrap()
        });
        assert!(ok, "{:?}", messages(failures));
    }

    #[test]
    fn viewport_scissor_mismatch() {
        let (_, fw) = sim_device();
        pipeline_test(&fw, |helper| helper.vp_state_ci.viewport_count = 2,
            &["VUID-VkPipelineViewportStateCreateInfo-scissorCount-01220"]);
    }

    #[test]
    fn viewport_count_without_multi_viewport() {
        let options = StateOptions {
            features: Some(Default::default()),
            ..Default::default()
        };
        let (_, fw) = sim_device_with(options);
        pipeline_test(&fw, |helper| helper.vp_state_ci.viewport_count = 2, &[
            "VUID-VkPipelineViewportStateCreateInfo-viewportCount-01216",
            "VUID-VkPipelineViewportStateCreateInfo-scissorCount-01220",
        ]);
    }

    #[test]
    fn line_width() {
        let (_, fw) = sim_device();
        pipeline_test(&fw, |helper| helper.rs_state_ci.line_width = 2.0,
            &["VUID-VkGraphicsPipelineCreateInfo-pDynamicStates-00749"]);
        pipeline_test(&fw, |helper| {
            helper.rs_state_ci.line_width = 2.0;
            helper.dyn_states.push(vk::DynamicState::LINE_WIDTH);
        }, &[]);
    }

    #[test]
    fn shader_stages() {
        let (_, fw) = sim_device();
        pipeline_test(&fw, |helper| { helper.shader_stages.remove(0); },
            &["VUID-VkGraphicsPipelineCreateInfo-stage-00727"]);
        pipeline_test(&fw, |helper| {
            let vs = helper.shader_stages[0];
            helper.shader_stages.push(vs);
        }, &["VUID-VkGraphicsPipelineCreateInfo-stage-00726"]);
    }

    #[test]
    fn blend_attachment_count() {
        let (_, fw) = sim_device();
        pipeline_test(&fw, |helper| helper.cb_ci.attachment_count = 2,
            &["VUID-VkGraphicsPipelineCreateInfo-attachmentCount-00746"]);
    }

    #[test]
    fn create_helpers() {
        let (_, fw) = sim_device();
        let check = |res: HarnessResult<bool>| {
            let (ok, failures) = record_failures(|| res.unwrap());
            assert!(ok, "{:?}", messages(failures));
        };

        check(create_sampler_test(&fw, &safe_sampler_info(), None));
        let info = vk::SamplerCreateInfo {
            min_lod: 4.0,
            max_lod: 1.0,
            ..safe_sampler_info()
        };
        check(create_sampler_test(&fw, &info,
            Some("VUID-VkSamplerCreateInfo-maxLod-01973")));

        check(create_buffer_test(&fw, &default_buffer_info(), None));
        let info = vk::BufferCreateInfo { size: 0, ..default_buffer_info() };
        check(create_buffer_test(&fw, &info,
            Some("VUID-VkBufferCreateInfo-size-00912")));

        check(create_image_test(&fw, &default_image_info(), None));
        let info = vk::ImageCreateInfo {
            initial_layout: vk::ImageLayout::GENERAL,
            ..default_image_info()
        };
        check(create_image_test(&fw, &info,
            Some("VUID-VkImageCreateInfo-initialLayout-00993")));
    }

    #[test]
    fn view_helpers() {
        let (_, fw) = sim_device();
        let device = fw.device().unwrap();
        let check = |res: HarnessResult<bool>| {
            let (ok, failures) = record_failures(|| res.unwrap());
            assert!(ok, "{:?}", messages(failures));
        };

        let image = Image::new(
            Arc::clone(device), &default_image_info(), Default::default())
            .unwrap();
        check(create_image_view_test(
            &fw, &default_image_view_info(&image), None));
        let unbound =
            Image::init_no_mem(Arc::clone(device), &default_image_info())
            .unwrap();
        check(create_image_view_test(&fw, &default_image_view_info(&unbound),
            Some("VUID-VkImageViewCreateInfo-image-01020")));

        let buffer = Buffer::with_usage(
            Arc::clone(device), 1024, vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER)
            .unwrap();
        check(create_buffer_view_test(
            &fw, &default_buffer_view_info(&buffer), None));
        let info = vk::BufferViewCreateInfo {
            offset: 7,
            ..default_buffer_view_info(&buffer)
        };
        check(create_buffer_view_test(&fw, &info,
            Some("VUID-VkBufferViewCreateInfo-offset-00926")));
    }

    #[test]
    fn descriptor_writes() {
        let (monitor, fw) = sim_device();
        let device = fw.device().unwrap();
        let uniform = Buffer::with_usage(
            Arc::clone(device), 256, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .unwrap();
        let storage = Buffer::with_usage(
            Arc::clone(device), 256, vk::BufferUsageFlags::STORAGE_BUFFER)
            .unwrap();
        let mut set = OneOffDescriptorSet::new(
            Arc::clone(device), &bindings! { (0, UNIFORM_BUFFER) }).unwrap();

        monitor.expect_success();
        set.write_buffer(0, uniform.handle(), 0, vk::WHOLE_SIZE,
            vk::DescriptorType::UNIFORM_BUFFER);
        set.update();
        let (ok, _) = record_failures(|| monitor.verify_not_found());
        assert!(ok);

        monitor.set_desired_failure_msg(Severities::ERROR,
            "VUID-VkWriteDescriptorSet-descriptorType-00330");
        set.write_buffer(0, storage.handle(), 0, vk::WHOLE_SIZE,
            vk::DescriptorType::UNIFORM_BUFFER);
        set.update();
        let (ok, failures) = record_failures(|| monitor.verify_found());
        assert!(ok, "{:?}", messages(failures));
    }

    #[test]
    fn acceleration_structures() {
        let (_, fw) = sim_device();
        let device = Arc::clone(fw.device().unwrap());
        let err = AccelerationStructure::with_storage(
            device, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL, 4096)
            .unwrap_err();
        assert!(err.is_unsupported());

        let (monitor, mut fw) = sim_framework();
        fw.init_framework().unwrap();
        fw.add_device_extension(ACCELERATION_STRUCTURE_EXTENSION).unwrap();
        fw.init_state(Default::default()).unwrap();
        let device = fw.device().unwrap();

        monitor.expect_success();
        let accel = AccelerationStructure::with_storage(
            Arc::clone(device),
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            4096,
        ).unwrap();
        let (ok, _) = record_failures(|| monitor.verify_not_found());
        assert!(ok);
        drop(accel);

        let info = vk::BufferCreateInfo {
            size: 4096,
            usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
            ..Default::default()
        };
        let unbound = Buffer::init_no_mem(Arc::clone(device), &info).unwrap();
        monitor.set_desired_failure_msg(Severities::ERROR,
            "VUID-VkAccelerationStructureCreateInfoKHR-buffer-03615");
        let res = AccelerationStructure::new(unbound, &default_accel_info());
        let (ok, failures) = record_failures(|| monitor.verify_found());
        assert!(ok, "{:?}", messages(failures));
        drop(res);
    }

    #[test]
    fn queue_family_transfer() {
        let (_, fw) = sim_device();
        let mut context = BarrierContext::new(&fw, &[0, 1]).unwrap();
        let mut helper =
            BarrierQueueFamilyHelper::init(&mut context, None, true, true)
            .unwrap();
        let mut run = |transfer| {
            let (ok, failures) = record_failures(|| helper.run(transfer).unwrap());
            assert!(ok, "{:?}", messages(failures));
        };

        // Release on 0, then acquire on 1
        run(Transfer {
            src: 0,
            dst: 1,
            positive: true,
            queue_family: Some(0),
            ..Default::default()
        });
        run(Transfer {
            src: 0,
            dst: 1,
            positive: true,
            queue_family: Some(1),
            ..Default::default()
        });

        run(Transfer {
            img_err: Some("BarrierDoubleRelease"),
            buf_err: Some("BarrierDoubleRelease"),
            src: 0,
            dst: 1,
            queue_family: Some(0),
            policy: Policy::DoubleCommandBuffer,
            ..Default::default()
        });
    }

    #[test]
    fn duplicate_transfer_in_one_command_buffer() {
        let (_, fw) = sim_device();
        let mut context = BarrierContext::new(&fw, &[0, 1]).unwrap();
        let mut helper =
            BarrierQueueFamilyHelper::init(&mut context, None, true, true)
            .unwrap();
        let (ok, failures) = record_failures(|| helper.run(Transfer {
            img_err: Some("UNASSIGNED-VkImageMemoryBarrier-image-00001"),
            buf_err: Some("UNASSIGNED-VkBufferMemoryBarrier-buffer-00001"),
            src: 0,
            dst: 1,
            policy: Policy::DoubleRecord,
            ..Default::default()
        }).unwrap());
        assert!(ok, "{:?}", messages(failures));
    }

    #[test]
    fn concurrent_resources_reject_transfers() {
        let (_, fw) = sim_device();
        let families = [0, 1];
        let mut context = BarrierContext::new(&fw, &families).unwrap();
        let mut helper = BarrierQueueFamilyHelper::init(
            &mut context, Some(&families), true, true).unwrap();
        let (ok, failures) = record_failures(|| helper.run(Transfer {
            img_err: Some("VUID-VkImageMemoryBarrier-image-01199"),
            buf_err: Some("VUID-VkBufferMemoryBarrier-buffer-01190"),
            src: 0,
            dst: 1,
            ..Default::default()
        }).unwrap());
        assert!(ok, "{:?}", messages(failures));

        let (ok, failures) = record_failures(|| helper.run(Transfer {
            positive: true,
            queue_family: Some(0),
            ..Default::default()
        }).unwrap());
        assert!(ok, "{:?}", messages(failures));
    }

    #[test]
    fn valid_transfer_between_pools() {
        let (monitor, fw) = sim_device();
        let flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        let level = vk::CommandBufferLevel::PRIMARY;
        let pool0 = CommandPool::new(Arc::clone(&fw.queues()[0]), flags).unwrap();
        let pool1 = CommandPool::new(Arc::clone(&fw.queues()[1]), flags).unwrap();
        let mut from = CommandBuffer::new(&pool0, level).unwrap();
        let mut to = CommandBuffer::new(&pool1, level).unwrap();

        let buffer = Buffer::with_usage(
            Arc::clone(fw.device().unwrap()),
            256,
            vk::BufferUsageFlags::TRANSFER_SRC,
        ).unwrap();
        let barrier = vk::BufferMemoryBarrier {
            src_queue_family_index: 0,
            dst_queue_family_index: 1,
            ..buffer.barrier(vk::AccessFlags::TRANSFER_READ, Default::default())
        };
        let (ok, failures) = record_failures(|| valid_ownership_transfer(
            &monitor,
            &mut from,
            &mut to,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            Some(&barrier),
            None,
        ).unwrap());
        assert!(ok, "{:?}", messages(failures));
    }

    #[test]
    fn image_layout_follows_completed_transitions() {
        let (monitor, fw) = sim_device();
        let info = image_2d_info(
            vk::Format::R8G8B8A8_UNORM, 16, 16,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );
        let mut image = Image::new(
            Arc::clone(fw.device().unwrap()),
            &info,
            Default::default(),
        ).unwrap();

        let barrier = image.layout_barrier(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Default::default(),
            vk::AccessFlags::TRANSFER_WRITE,
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(image.layout(), vk::ImageLayout::UNDEFINED);

        let pool = fw.command_pool().unwrap();
        image.transition_now(pool, vk::ImageLayout::GENERAL).unwrap();
        assert_eq!(image.layout(), vk::ImageLayout::GENERAL);
        image.transition_now(pool, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .unwrap();
        assert_eq!(image.layout(), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert!(monitor.unexpected().is_empty(), "{:?}", monitor.unexpected());
    }

    fn run_sim_test(
        body: impl FnOnce(&mut Framework) -> unit::TestStatus,
    ) -> (unit::TestStatus, Vec<String>, Arc<Monitor>) {
        init_logging();
        let monitor = Arc::new(Monitor::new());
        let config = Config { backend: Backend::Sim, ..Default::default() };
        let (status, failures) =
            record_failures(|| Framework::run_test(&config, &monitor, body));
        (status, messages(failures), monitor)
    }

    fn zero_sized_buffer(fw: &Framework) -> HarnessResult<()> {
        let info = vk::BufferCreateInfo {
            size: 0,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            ..Default::default()
        };
        Buffer::init_no_mem(Arc::clone(fw.device()?), &info)?;
        Ok(())
    }

    #[test]
    fn run_test_accounts_for_expected_errors() {
        let (status, failures, monitor) = run_sim_test(|fw| {
            fw.init(Default::default())?;
            fw.monitor().set_desired_failure_msg(
                Severities::ERROR, "VUID-VkBufferCreateInfo-size-00912");
            zero_sized_buffer(fw)?;
            fw.monitor().verify_found();
            Ok(())
        });
        assert_eq!(status, Ok(()));
        assert!(failures.is_empty(), "{:?}", failures);
        assert!(monitor.seen().is_empty());
    }

    #[test]
    fn run_test_fails_leftover_diagnostics() {
        let (status, failures, _) = run_sim_test(|fw| {
            fw.init(Default::default())?;
            fw.monitor().set_desired_failure_msg(
                Severities::ERROR, "VUID-VkSamplerCreateInfo-maxLod-01973");
            zero_sized_buffer(fw)?;
            Ok(())
        });
        assert_eq!(status, Ok(()));
        assert_eq!(failures.len(), 2, "{:?}", failures);
        assert_eq!(failures[0],
            "expected VUID-VkSamplerCreateInfo-maxLod-01973 not seen.");
        assert!(failures[1].contains("VUID-VkBufferCreateInfo-size-00912"));
    }

    #[test]
    fn run_test_clears_after_abort() {
        let (status, failures, monitor) = run_sim_test(|fw| {
            fw.init(Default::default())?;
            fw.monitor().set_desired_failure_msg(
                Severities::ERROR, "VUID-VkSamplerCreateInfo-maxLod-01973");
            Err(Error::unsupported("no samplers today").into())
        });
        assert_eq!(status, Err(unit::Abort::skip("no samplers today")));
        assert!(failures.is_empty(), "{:?}", failures);
        assert!(monitor.pending().is_empty());
    }

    fn tracker_events(monitor: &Monitor) -> Vec<(bool, vk::ObjectType, u64)> {
        monitor.seen().into_iter()
            .filter(|r| r.identifier == sim::OBJECT_TRACKER_INFO)
            .filter_map(|r| {
                let created = r.message.contains(" CREATE ");
                r.objects.first().map(|obj| (created, obj.ty, obj.handle))
            })
            .collect()
    }

    #[test]
    fn teardown_is_ordered_and_clean() {
        let (monitor, mut fw) = sim_device();
        let (_, failures) = record_failures(|| fw.teardown());
        assert!(failures.is_empty(), "{:?}", messages(failures));

        let events = tracker_events(&monitor);
        assert!(events.iter().any(|&(created, _, _)| !created));
        let mut live: Vec<(vk::ObjectType, u64)> = Vec::new();
        for (created, ty, handle) in events {
            if created {
                live.push((ty, handle));
                continue;
            }
            if ty == vk::ObjectType::DEVICE_MEMORY {
                live.retain(|&(_, h)| h != handle);
                continue;
            }
            let newest = live.iter()
                .rposition(|&(ty, _)| ty != vk::ObjectType::DEVICE_MEMORY);
            let newest = newest.map(|i| live.remove(i));
            assert_eq!(newest, Some((ty, handle)));
        }
        assert!(live.is_empty(), "{:?}", live);

        assert!(monitor.seen().iter().all(|r| r.severity != Severity::Error));
        assert!(monitor.finish());
    }

    #[test]
    fn teardown_reports_leaks() {
        let (_, mut fw) = sim_device();
        let buffer = Buffer::init_no_mem(
            Arc::clone(fw.device().unwrap()), &default_buffer_info()).unwrap();
        let (_, failures) = record_failures(|| fw.teardown());
        assert_eq!(messages(failures),
            ["resource leak: 1 object(s) outlived the framework"]);
        drop(buffer);
    }

    #[test]
    fn device_extensions_after_init_state() {
        let (_, mut fw) = sim_device();
        assert!(fw.add_device_extension(ACCELERATION_STRUCTURE_EXTENSION)
            .is_err());
        assert!(fw.add_instance_extension("VK_EXT_debug_report").is_err());
    }

    #[test]
    fn validation_version_is_capped_by_target() {
        let (_, mut fw) = sim_device();
        let version = fw.device_validation_version();
        more_asserts::assert_ge!(version, vk::API_VERSION_1_0);
        more_asserts::assert_le!(version, fw.target_api_version());
        fw.set_target_api_version(vk::API_VERSION_1_0);
        assert_eq!(fw.device_validation_version(), vk::API_VERSION_1_0);
    }
}
