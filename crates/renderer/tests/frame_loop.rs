//! Frame slot protocol and presentation sequencing, driven through mocks.

mod common;

use ash::vk;
use ash::vk::Handle;

use common::{
    Event, MockBackend, RecordingEncoder, SequenceRecorder, acquired, clear, completed_submit,
    events, mock_ring, new_log,
};

use framekit_renderer::RendererError;
use framekit_renderer::backend::{AcquireOutcome, FrameBackend};
use framekit_renderer::frame_ring::SlotState;
use framekit_renderer::pass::PassSequence;
use framekit_renderer::sequencer::{FrameOutcome, PresentationSequencer};
use framekit_renderer::target::RenderTargets;
use framekit_rhi::RhiError;
use framekit_rhi::barrier::{ResourceState, SubresourceSpan};

fn sequencer(
    log: &common::EventLog,
    backend: MockBackend,
    slots: usize,
) -> PresentationSequencer<MockBackend> {
    PresentationSequencer::new(backend, mock_ring(log, slots)).expect("ring matches images")
}

#[test]
fn test_frame_protocol_order_per_slot() {
    let log = new_log();
    let backend = MockBackend::new(&log, 2, 800, 600).with_script([acquired(0), acquired(1), acquired(0)]);
    let mut sequencer = sequencer(&log, backend, 2);
    let mut scene = SequenceRecorder::empty(&log);

    for _ in 0..3 {
        let outcome = sequencer.render_frame(&mut scene).expect("frame");
        assert_eq!(outcome, FrameOutcome::Presented { suboptimal: false });
    }

    let frame = |slot: usize| {
        vec![
            Event::Acquire,
            Event::FenceWait(slot),
            Event::UpdateUniforms(slot),
            Event::Reset(slot),
            Event::Begin(slot),
            Event::End(slot),
            Event::FenceReset(slot),
            Event::Submit {
                image_index: slot as u32,
                encoder: slot,
            },
            Event::Present(slot as u32),
        ]
    };
    let expected: Vec<Event> = [0, 1, 0].into_iter().flat_map(frame).collect();
    assert_eq!(events(&log), expected);
    assert_eq!(sequencer.frame_number(), 3);
}

#[test]
fn test_out_of_date_acquire_has_no_side_effects() {
    let log = new_log();
    let backend = MockBackend::new(&log, 2, 800, 600).with_script([AcquireOutcome::OutOfDate]);
    let mut sequencer = sequencer(&log, backend, 2);
    let mut scene = SequenceRecorder::empty(&log);

    let outcome = sequencer.render_frame(&mut scene).expect("frame");
    assert_eq!(outcome, FrameOutcome::Skipped);
    assert_eq!(events(&log), vec![Event::Acquire]);
    assert_eq!(sequencer.frame_number(), 0);
    assert_eq!(sequencer.ring().slot(0).expect("slot").state(), SlotState::Idle);
}

#[test]
fn test_one_fence_reset_and_submit_per_presented_frame() {
    let log = new_log();
    let backend = MockBackend::new(&log, 3, 800, 600).with_script([
        acquired(0),
        AcquireOutcome::OutOfDate,
        acquired(1),
        acquired(2),
        AcquireOutcome::OutOfDate,
        acquired(0),
    ]);
    let mut sequencer = sequencer(&log, backend, 3);
    let mut scene = SequenceRecorder::empty(&log);

    let presented = (0..6)
        .map(|_| sequencer.render_frame(&mut scene).expect("frame"))
        .filter(|outcome| matches!(outcome, FrameOutcome::Presented { .. }))
        .count();
    assert_eq!(presented, 4);

    let log = events(&log);
    let resets = log.iter().filter(|e| matches!(e, Event::FenceReset(_))).count();
    let submits = log.iter().filter(|e| matches!(e, Event::Submit { .. })).count();
    let presents = log.iter().filter(|e| matches!(e, Event::Present(_))).count();
    assert_eq!((resets, submits, presents), (4, 4, 4));
}

#[test]
fn test_suboptimal_acquire_is_reported() {
    let log = new_log();
    let backend = MockBackend::new(&log, 2, 800, 600).with_script([AcquireOutcome::Acquired {
        image_index: 1,
        suboptimal: true,
    }]);
    let mut sequencer = sequencer(&log, backend, 2);
    let mut scene = SequenceRecorder::empty(&log);

    let outcome = sequencer.render_frame(&mut scene).expect("frame");
    assert_eq!(outcome, FrameOutcome::Presented { suboptimal: true });
}

#[test]
fn test_begin_recording_requires_idle_slot() {
    let log = new_log();
    let mut ring = mock_ring(&log, 2);

    ring.begin_recording(0).expect("idle slot");
    let err = ring.begin_recording(0).err().expect("recording slot");
    assert!(matches!(
        err,
        RendererError::SlotProtocol {
            slot: 0,
            actual: SlotState::Recording,
            expected: SlotState::Idle,
        }
    ));

    ring.submit_slot(0, completed_submit).expect("submit");
    let err = ring.begin_recording(0).err().expect("submitted slot");
    assert!(matches!(
        err,
        RendererError::SlotProtocol {
            actual: SlotState::Submitted,
            ..
        }
    ));

    // Waiting returns it to Idle.
    ring.wait_for_slot(0).expect("wait");
    assert!(ring.begin_recording(0).is_ok());
}

#[test]
fn test_submit_requires_recording_slot() {
    let log = new_log();
    let mut ring = mock_ring(&log, 1);

    let err = ring.submit_slot(0, |_, _| Ok(())).err().expect("idle slot");
    assert!(matches!(
        err,
        RendererError::SlotProtocol {
            actual: SlotState::Idle,
            expected: SlotState::Recording,
            ..
        }
    ));
    // Nothing touched the fence.
    assert!(events(&log).is_empty());

    let err = ring.wait_for_slot(4).err().expect("out of range");
    assert!(matches!(err, RendererError::SlotOutOfRange { slot: 4, len: 1 }));
}

#[test]
fn test_abandoned_recording_recovers_on_next_wait() {
    let log = new_log();
    let mut ring = mock_ring(&log, 1);

    ring.begin_recording(0).expect("begin");
    ring.wait_for_slot(0).expect("wait");
    assert_eq!(ring.slot(0).expect("slot").state(), SlotState::Idle);
    assert!(ring.begin_recording(0).is_ok());
}

#[test]
fn test_resize_rebuilds_attachments() {
    let log = new_log();
    let backend = MockBackend::new(&log, 2, 800, 600);
    let mut sequencer = sequencer(&log, backend, 2);
    let mut scene = SequenceRecorder::empty(&log);

    sequencer.render_frame(&mut scene).expect("frame");
    let depth_before = sequencer.backend().depth_image();
    clear(&log);

    sequencer.on_resize(1024, 768).expect("resize");

    let extent = sequencer.backend().extent();
    assert_eq!((extent.width, extent.height), (1024, 768));
    assert_ne!(sequencer.backend().depth_image(), depth_before);
    // The submitted slot is drained before anything is rebuilt.
    assert_eq!(events(&log), vec![Event::FenceWait(0), Event::Recreate(1024, 768)]);

    let outcome = sequencer.render_frame(&mut scene).expect("frame after resize");
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
}

#[test]
fn test_zero_size_pauses_until_restored() {
    let log = new_log();
    let backend = MockBackend::new(&log, 2, 800, 600);
    let mut sequencer = sequencer(&log, backend, 2);
    let mut scene = SequenceRecorder::empty(&log);

    sequencer.on_resize(0, 0).expect("minimize");
    assert!(sequencer.is_paused());
    assert_eq!(sequencer.render_frame(&mut scene).expect("frame"), FrameOutcome::Skipped);
    assert!(events(&log).is_empty());

    sequencer.on_resize(640, 480).expect("restore");
    assert!(!sequencer.is_paused());
    assert_eq!(events(&log), vec![Event::Recreate(640, 480)]);
    assert!(matches!(
        sequencer.render_frame(&mut scene).expect("frame"),
        FrameOutcome::Presented { .. }
    ));
}

#[test]
fn test_image_count_change_is_an_error() {
    let log = new_log();
    let mut backend = MockBackend::new(&log, 2, 800, 600);
    backend.image_count_after_recreate = Some(3);
    let mut sequencer = sequencer(&log, backend, 2);

    let err = sequencer.on_resize(1024, 768).err().expect("count changed");
    assert!(matches!(
        err,
        RendererError::ImageCountChanged {
            before: 2,
            after: 3
        }
    ));
}

#[test]
fn test_ring_must_match_image_count() {
    let log = new_log();
    let backend = MockBackend::new(&log, 3, 800, 600);
    let ring = mock_ring(&log, 2);

    let result = PresentationSequencer::new(backend, ring);
    assert!(matches!(
        result,
        Err(RendererError::ImageCountChanged {
            before: 2,
            after: 3
        })
    ));
}

#[test]
fn test_ring_slots_own_their_encoders() {
    let log = new_log();
    let ring = mock_ring(&log, 3);
    let ids: Vec<usize> = (0..3)
        .map(|i| {
            let encoder: &RecordingEncoder = ring.slot(i).expect("slot").encoder();
            encoder.id
        })
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_failed_submit_releases_acquire_and_next_wait_returns() {
    let log = new_log();
    let mut backend = MockBackend::new(&log, 2, 800, 600).with_script([acquired(0), acquired(0)]);
    backend.fail_next_submit = true;
    let mut sequencer = sequencer(&log, backend, 2);
    let mut scene = SequenceRecorder::empty(&log);

    let err = sequencer.render_frame(&mut scene).err().expect("submit fails");
    assert!(matches!(
        err,
        RendererError::Rhi(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
    ));
    // The empty batch took over the reset fence.
    assert_eq!(
        events(&log).last(),
        Some(&Event::ReleaseAcquire {
            signals_fence: true
        })
    );
    assert_eq!(sequencer.ring().slot(0).expect("slot").state(), SlotState::Submitted);
    assert_eq!(sequencer.frame_number(), 0);
    clear(&log);

    let outcome = sequencer.render_frame(&mut scene).expect("frame after failure");
    assert_eq!(outcome, FrameOutcome::Presented { suboptimal: false });
    assert_eq!(events(&log)[..2], [Event::Acquire, Event::FenceWait(0)]);
}

#[test]
fn test_unrecovered_slot_refuses_to_wait() {
    let log = new_log();
    let mut backend = MockBackend::new(&log, 1, 800, 600);
    backend.fail_next_submit = true;
    backend.fail_next_release = true;
    let mut sequencer = sequencer(&log, backend, 1);
    let mut scene = SequenceRecorder::empty(&log);

    assert!(sequencer.render_frame(&mut scene).is_err());
    assert_eq!(sequencer.ring().slot(0).expect("slot").state(), SlotState::Failed);
    clear(&log);

    // The retry through the abandon path signals the fence again.
    let err = sequencer.render_frame(&mut scene).err().expect("slot failed");
    assert!(matches!(err, RendererError::SlotFailed { slot: 0 }));
    assert!(!events(&log).contains(&Event::FenceWait(0)));
    assert_eq!(sequencer.ring().slot(0).expect("slot").state(), SlotState::Submitted);

    let outcome = sequencer.render_frame(&mut scene).expect("recovered");
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
}

#[test]
fn test_ring_failed_submit_marks_slot() {
    let log = new_log();
    let mut ring = mock_ring(&log, 1);

    ring.begin_recording(0).expect("begin");
    let err = ring
        .submit_slot(0, |_, _| Err(vk::Result::ERROR_DEVICE_LOST.into()))
        .err()
        .expect("submit fails");
    assert!(matches!(err, RendererError::Rhi(_)));
    assert_eq!(ring.slot(0).expect("slot").state(), SlotState::Failed);

    assert!(matches!(
        ring.wait_for_slot(0),
        Err(RendererError::SlotFailed { slot: 0 })
    ));
    // wait_all leaves it for the owner to recover.
    ring.wait_all().expect("nothing submitted");

    ring.recover_slot(0, |fence| {
        fence.signal();
        Ok(())
    })
    .expect("recover");
    ring.wait_for_slot(0).expect("wait");
    assert!(ring.begin_recording(0).is_ok());
}

#[test]
fn test_recover_requires_failed_slot() {
    let log = new_log();
    let mut ring = mock_ring(&log, 1);

    let err = ring.recover_slot(0, |_| Ok(())).err().expect("idle slot");
    assert!(matches!(
        err,
        RendererError::SlotProtocol {
            actual: SlotState::Idle,
            expected: SlotState::Failed,
            ..
        }
    ));
}

#[test]
fn test_failed_record_rolls_back_target_states() {
    let log = new_log();
    let backend = MockBackend::new(&log, 2, 800, 600).with_script([acquired(0), acquired(1)]);
    let mut sequencer = sequencer(&log, backend, 2);

    let mut targets = RenderTargets::new();
    let offscreen = targets.track(
        vk::Image::from_raw(0xC0BE),
        SubresourceSpan::color_layers(1),
        ResourceState::ColorAttachment,
    );
    // Recording leaves the image in ShaderRead, then fails.
    let sequence =
        PassSequence::new("sample offscreen").transition(&[offscreen], ResourceState::ShaderRead);
    let mut scene = SequenceRecorder::new(&log, sequence, targets);
    scene.fail_next_record = true;
    assert!(sequencer.render_frame(&mut scene).is_err());
    assert_eq!(
        scene.targets.state(offscreen).ok(),
        Some(ResourceState::ColorAttachment)
    );
    assert!(events(&log).contains(&Event::ReleaseAcquire {
        signals_fence: false
    }));
    clear(&log);

    scene.sequence = PassSequence::new("sample offscreen")
        .transition(&[offscreen], ResourceState::ShaderRead)
        .transition(&[offscreen], ResourceState::ColorAttachment);
    sequencer.render_frame(&mut scene).expect("frame");

    let barriers: Vec<(vk::ImageLayout, vk::ImageLayout)> = events(&log)
        .iter()
        .filter_map(|event| match event {
            Event::Barrier(records) => Some((records[0].old_layout, records[0].new_layout)),
            _ => None,
        })
        .collect();
    assert_eq!(
        barriers,
        vec![
            (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            ),
            (
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            ),
        ]
    );
}
