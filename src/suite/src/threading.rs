use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use harness::*;
use log::debug;
use unit::{Abort, TestStatus};

const THREADING_ERROR: &str = "UNASSIGNED-Threading-MultipleThreads";

/// Calls made by each worker before giving up on a collision.
const CALL_LIMIT: u32 = 80_000;

/// Records into one command buffer from two threads at once until the
/// layer notices.
fn command_buffer_collision(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let device = Arc::clone(fw.device()?);
    let event = Event::new(Arc::clone(&device))?;
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;

    let bailout = Arc::new(AtomicBool::new(false));
    monitor.set_desired_failure_msg(Severities::ERROR, THREADING_ERROR);
    monitor.set_bailout(Arc::clone(&bailout));

    let (cb, ev) = (cmds.handle(), event.handle());
    let (tx, rx) = crossbeam::channel::unbounded();
    crossbeam::scope(|s| {
        for _ in 0..2 {
            let (tx, device, bailout) = (tx.clone(), &device, &bailout);
            s.spawn(move |_| {
                let mut calls = 0;
                while calls < CALL_LIMIT && !bailout.load(Ordering::Acquire) {
                    unsafe {
                        device.table().cmd_set_event(
                            cb, ev, vk::PipelineStageFlags::TOP_OF_PIPE);
                    }
                    calls += 1;
                }
                let _ = tx.send(calls);
            });
        }
    }).map_err(|_| Abort::fatal("recording thread panicked"))?;
    drop(tx);

    let calls: u32 = rx.iter().sum();
    debug!("{} call(s) recorded before bailing out", calls);
    monitor.verify_found();
    cmds.end()?;
    Ok(())
}

fn single_thread_recording(fw: &mut Framework) -> TestStatus {
    crate::init(fw)?;
    let event = Event::new(Arc::clone(fw.device()?))?;
    let monitor = Arc::clone(fw.monitor());
    let cmds = fw.command_buffer()?;
    cmds.begin()?;
    monitor.expect_success();
    for _ in 0..64 {
        cmds.set_event(&event, vk::PipelineStageFlags::TOP_OF_PIPE);
    }
    monitor.verify_not_found();
    cmds.end()?;
    Ok(())
}

unit::declare_tests![
    "LayerTest" => [command_buffer_collision],
    "PositiveLayerTest" => [single_thread_recording],
];
