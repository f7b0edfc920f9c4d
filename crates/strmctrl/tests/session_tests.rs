//! Session behaviour against the in-memory panel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::RecvTimeoutError;
use strmctrl::image::{DynamicImage, Rgb, RgbImage};
use strmctrl::mock::{MockBus, MockDevice, MockOp, WriteFault};
use strmctrl::{
    Action, Control, Event, PreparedImage, Session, SessionConfig, SessionState, StrmCtrlError,
    TransportError, list_devices_with,
};
use strmctrl_protocol::ProtocolError;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const TIMEOUT: Duration = Duration::from_secs(1);

fn init_test_environment() {
    tracing_subscriber::fmt()
        .with_env_filter("strmctrl=debug,strmctrl_protocol=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn open_session(device: &MockDevice) -> Result<Session, StrmCtrlError> {
    open_with_config(device, SessionConfig::default())
}

fn open_with_config(device: &MockDevice, config: SessionConfig) -> Result<Session, StrmCtrlError> {
    init_test_environment();
    let bus = MockBus::new().with_device(device.clone());
    Session::open_with(Arc::new(bus), "", config)
}

fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Commands written after the open handshake.
fn commands_after_open(device: &MockDevice) -> Vec<String> {
    device.written_commands().into_iter().skip(2).collect()
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

#[test]
fn test_open_performs_setup_and_handshake() -> TestResult {
    let device = MockDevice::new(1, 4, "SN1");
    let session = open_session(&device)?;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(
        device.ops().into_iter().take(4).collect::<Vec<_>>(),
        vec![
            MockOp::SetAutoDetach(true),
            MockOp::Reset,
            MockOp::SetConfiguration(1),
            MockOp::ClaimInterface {
                interface: 0,
                alt_setting: 0
            },
        ]
    );
    assert_eq!(device.written_commands(), vec!["DIS", "CONNECT"]);
    Ok(())
}

#[test]
fn test_packets_padded_to_endpoint_size() -> TestResult {
    let device = MockDevice::new(1, 4, "SN1").with_packet_sizes(64, 16);
    let session = open_session(&device)?;
    session.set_brightness(50, TIMEOUT)?;
    session.clear(TIMEOUT)?;

    let writes = device.writes();
    assert_eq!(writes.len(), 5);
    assert!(writes.iter().all(|w| w.len() == 16));
    Ok(())
}

#[test]
fn test_descriptor_and_info() -> TestResult {
    let device = MockDevice::new(1, 4, "SN1");
    let session = open_session(&device)?;
    assert_eq!(session.descriptor(), "Bus 001 Device 004 Serial: SN1");
    assert_eq!(session.info().serial, "SN1");
    assert_eq!(session.info().bus, 1);
    assert_eq!(session.info().address, 4);
    Ok(())
}

#[test]
fn test_open_by_serial_closes_other_candidates() -> TestResult {
    init_test_environment();
    let first = MockDevice::new(1, 2, "AAA");
    let second = MockDevice::new(1, 3, "BBB");
    let bus = MockBus::new()
        .with_device(first.clone())
        .with_device(second.clone());

    let session = Session::open_with(Arc::new(bus), "BBB", SessionConfig::default())?;
    assert_eq!(session.info().serial, "BBB");
    assert!(first.is_closed());
    assert_eq!(first.ops(), vec![MockOp::Close]);
    assert!(!second.is_closed());
    Ok(())
}

#[test]
fn test_open_empty_serial_takes_first() -> TestResult {
    init_test_environment();
    let first = MockDevice::new(1, 2, "AAA");
    let second = MockDevice::new(1, 3, "BBB");
    let bus = MockBus::new()
        .with_device(first.clone())
        .with_device(second.clone());

    let session = Session::open_with(Arc::new(bus), "", SessionConfig::default())?;
    assert_eq!(session.info().serial, "AAA");
    assert!(second.is_closed());
    Ok(())
}

#[test]
fn test_open_unknown_serial_is_not_found() {
    init_test_environment();
    let first = MockDevice::new(1, 2, "AAA");
    let second = MockDevice::new(1, 3, "BBB");
    let bus = MockBus::new()
        .with_device(first.clone())
        .with_device(second.clone());

    let result = Session::open_with(Arc::new(bus), "ZZZ", SessionConfig::default());
    assert!(matches!(
        result,
        Err(StrmCtrlError::DeviceNotFound { ref serial }) if serial == "ZZZ"
    ));
    assert!(first.is_closed());
    assert!(second.is_closed());
}

#[test]
fn test_open_ignores_other_products() {
    let other = MockDevice::new(1, 2, "AAA").with_ids(0x1500, 0x3002);
    let result = open_session(&other);
    assert!(matches!(result, Err(StrmCtrlError::DeviceNotFound { .. })));
    assert!(other.ops().is_empty());
}

#[test]
fn test_reset_failure_releases_device() {
    let device = MockDevice::new(1, 2, "AAA");
    device.fail_reset();

    let result = open_session(&device);
    assert!(matches!(result, Err(StrmCtrlError::ResetFailed(_))));
    assert!(device.is_closed());
    assert_eq!(device.count_ops(&MockOp::SetConfiguration(1)), 0);
    assert_eq!(device.write_count(), 0);
}

#[test]
fn test_claim_failure_releases_configuration() {
    let device = MockDevice::new(1, 2, "AAA");
    device.fail_claim();

    let result = open_session(&device);
    assert!(matches!(result, Err(StrmCtrlError::EndpointSetupFailed(_))));
    assert_eq!(
        device.ops().into_iter().skip(2).collect::<Vec<_>>(),
        vec![
            MockOp::SetConfiguration(1),
            MockOp::ClaimInterface {
                interface: 0,
                alt_setting: 0
            },
            MockOp::ReleaseConfiguration,
            MockOp::Close,
        ]
    );
    assert_eq!(device.write_count(), 0);
}

#[test]
fn test_handshake_failure_is_init_failed() {
    let device = MockDevice::new(1, 2, "AAA");
    device.fail_write_at(1, WriteFault::Fail);

    let result = open_session(&device);
    assert!(matches!(
        result,
        Err(StrmCtrlError::InitFailed(ref inner))
            if matches!(**inner, StrmCtrlError::TransferFailed(TransportError::Usb(_)))
    ));
    assert!(device.is_closed());
    assert_eq!(device.count_ops(&MockOp::ReleaseInterface), 1);
    assert_eq!(
        device.written_commands(),
        vec!["DIS", "CONNECT", "CLE 00 FF", "STP"]
    );
}

#[test]
fn test_handshake_short_write_is_init_failed() {
    let device = MockDevice::new(1, 2, "AAA");
    device.fail_write_at(0, WriteFault::Short(3));

    let result = open_session(&device);
    assert!(matches!(
        result,
        Err(StrmCtrlError::InitFailed(ref inner))
            if matches!(**inner, StrmCtrlError::ShortWrite { written: 3, expected: 512 })
    ));
    assert_eq!(device.written_commands(), vec!["DIS", "CLE 00 FF", "STP"]);
    assert!(device.is_closed());
}

#[test]
fn test_undersized_endpoint_fails_handshake() {
    let device = MockDevice::new(1, 2, "AAA").with_packet_sizes(64, 8);
    let result = open_session(&device);
    assert!(matches!(
        result,
        Err(StrmCtrlError::InitFailed(ref inner))
            if matches!(**inner, StrmCtrlError::Protocol(ProtocolError::CommandTooLarge { .. }))
    ));
    assert!(device.is_closed());
}

#[test]
fn test_zero_size_endpoint_rejected() {
    let device = MockDevice::new(1, 2, "AAA").with_packet_sizes(64, 0);
    let result = open_session(&device);
    assert!(matches!(
        result,
        Err(StrmCtrlError::EndpointSetupFailed(TransportError::ZeroPacketSize { .. }))
    ));
    assert!(device.is_closed());
    assert_eq!(device.count_ops(&MockOp::ReleaseInterface), 1);
    assert_eq!(device.write_count(), 0);
}

#[test]
fn test_zero_size_inbound_endpoint_rejected() {
    let device = MockDevice::new(1, 2, "AAA").with_packet_sizes(0, 64);
    let result = open_session(&device);
    assert!(matches!(
        result,
        Err(StrmCtrlError::EndpointSetupFailed(TransportError::ZeroPacketSize { .. }))
    ));
    assert!(device.is_closed());
}

#[test]
fn test_list_devices_closes_handles() -> TestResult {
    let first = MockDevice::new(1, 2, "AAA");
    let second = MockDevice::new(3, 7, "BBB");
    let bus = MockBus::new()
        .with_device(first.clone())
        .with_device(second.clone());

    let infos = list_devices_with(&bus)?;
    let lines: Vec<String> = infos.iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        vec!["Bus 001 Device 002: Serial AAA", "Bus 003 Device 007: Serial BBB"]
    );
    assert!(first.is_closed());
    assert!(second.is_closed());
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[test]
fn test_brightness_clamped() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    session.set_brightness(150, TIMEOUT)?;
    session.set_brightness(0, TIMEOUT)?;
    session.set_brightness(42, TIMEOUT)?;
    assert_eq!(commands_after_open(&device), vec!["LIG 64", "LIG 00", "LIG 2A"]);
    Ok(())
}

#[test]
fn test_clear_sends_clear_then_commit() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    session.clear(TIMEOUT)?;
    assert_eq!(commands_after_open(&device), vec!["CLE 00 FF", "STP"]);
    Ok(())
}

#[test]
fn test_set_image_uploads_and_commits() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let image = solid(64, 64, [255, 0, 0]);
    session.set_image(Control::DisplayBottomRight, &image, TIMEOUT)?;

    let expected = PreparedImage::new(6, &image)?;
    assert_eq!(
        commands_after_open(&device),
        vec![
            expected.header().to_string(),
            format!("payload:{}", expected.payload().len()),
            "STP".to_string(),
        ]
    );
    let writes = device.writes();
    assert_eq!(writes.get(3).map(Vec::as_slice), Some(expected.payload()));
    Ok(())
}

#[test]
fn test_set_image_rejects_wrong_size_without_io() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let result = session.set_image(Control::DisplayTopLeft, &solid(32, 32, [0, 0, 0]), TIMEOUT);
    assert!(matches!(
        result,
        Err(StrmCtrlError::InvalidImageSize {
            width: 32,
            height: 32
        })
    ));
    assert_eq!(device.write_count(), 2);
    Ok(())
}

#[test]
fn test_set_image_rejects_non_display() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let result = session.set_image(Control::KnobTop, &solid(64, 64, [0, 0, 0]), TIMEOUT);
    assert!(matches!(
        result,
        Err(StrmCtrlError::NotADisplay(Control::KnobTop))
    ));
    assert_eq!(device.write_count(), 2);
    Ok(())
}

#[test]
fn test_set_images_skips_empty_slots() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let red = solid(64, 64, [255, 0, 0]);
    let blue = solid(64, 64, [0, 0, 255]);
    session.set_images([Some(&red), None, Some(&blue), None, None, None], TIMEOUT)?;

    let first = PreparedImage::new(1, &red)?;
    let third = PreparedImage::new(3, &blue)?;
    assert_eq!(
        commands_after_open(&device),
        vec![
            "CLE 00 FF".to_string(),
            first.header().to_string(),
            format!("payload:{}", first.payload().len()),
            third.header().to_string(),
            format!("payload:{}", third.payload().len()),
            "STP".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_set_images_validates_before_sending() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let good = solid(64, 64, [255, 255, 255]);
    let bad = solid(64, 48, [255, 255, 255]);
    let result = session.set_images([Some(&good), None, None, None, Some(&bad), None], TIMEOUT);
    assert!(matches!(
        result,
        Err(StrmCtrlError::InvalidImageSize {
            width: 64,
            height: 48
        })
    ));
    assert_eq!(device.write_count(), 2);
    Ok(())
}

#[test]
fn test_set_images_all_empty_clears_and_commits() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    session.set_images([None; 6], TIMEOUT)?;
    assert_eq!(commands_after_open(&device), vec!["CLE 00 FF", "STP"]);
    Ok(())
}

#[test]
fn test_short_header_write_aborts_upload() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    device.fail_next_write(WriteFault::Short(10));

    let result = session.set_image(Control::DisplayTopLeft, &solid(64, 64, [9, 9, 9]), TIMEOUT);
    assert!(matches!(
        result,
        Err(StrmCtrlError::ShortWrite {
            written: 10,
            expected: 512
        })
    ));
    let commands = commands_after_open(&device);
    assert_eq!(commands.len(), 1);
    assert!(commands.iter().all(|c| c.starts_with("BAT")));
    Ok(())
}

#[test]
fn test_short_payload_write_skips_commit() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let image = solid(64, 64, [1, 2, 3]);
    let prepared = PreparedImage::new(2, &image)?;
    device.fail_write_at(device.write_count() + 1, WriteFault::Short(5));

    let result = session.set_image(Control::DisplayTopCenter, &image, TIMEOUT);
    assert!(matches!(
        result,
        Err(StrmCtrlError::ShortWrite { written: 5, expected }) if expected == prepared.payload().len()
    ));
    assert_eq!(
        commands_after_open(&device),
        vec![
            prepared.header().to_string(),
            format!("payload:{}", prepared.payload().len()),
        ]
    );
    Ok(())
}

#[test]
fn test_short_clear_skips_commit() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    device.fail_next_write(WriteFault::Short(0));

    assert!(matches!(
        session.clear(TIMEOUT),
        Err(StrmCtrlError::ShortWrite { written: 0, .. })
    ));
    assert_eq!(commands_after_open(&device), vec!["CLE 00 FF"]);
    Ok(())
}

#[test]
fn test_transfer_failure_keeps_session_open() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    device.fail_next_write(WriteFault::Fail);

    assert!(matches!(
        session.set_brightness(10, TIMEOUT),
        Err(StrmCtrlError::TransferFailed(_))
    ));
    assert_eq!(session.state(), SessionState::Ready);
    session.set_brightness(20, TIMEOUT)?;
    assert_eq!(commands_after_open(&device), vec!["LIG 0A", "LIG 14"]);
    Ok(())
}

#[test]
fn test_expired_timeout_sends_nothing() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    assert!(matches!(
        session.set_brightness(10, Duration::ZERO),
        Err(StrmCtrlError::Timeout)
    ));
    assert_eq!(device.write_count(), 2);
    Ok(())
}

#[test]
fn test_concurrent_uploads_are_not_interleaved() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let config = SessionConfig {
        keep_alive_interval_ms: 1,
        ..SessionConfig::default()
    };
    let session = open_with_config(&device, config)?;
    let image = solid(64, 64, [10, 200, 30]);

    thread::scope(|scope| {
        for display in [Control::DisplayTopLeft, Control::DisplayBottomCenter, Control::DisplayTopRight] {
            let session = &session;
            let image = &image;
            scope.spawn(move || {
                for _ in 0..5 {
                    session.set_image(display, image, TIMEOUT).ok();
                }
            });
        }
    });
    session.close();

    let commands = device.written_commands();
    for (i, command) in commands.iter().enumerate() {
        if command.starts_with("payload:") {
            let previous = i.checked_sub(1).and_then(|p| commands.get(p));
            assert!(
                previous.is_some_and(|p| p.starts_with("BAT")),
                "payload at {i} not preceded by BAT: {commands:?}"
            );
        }
        if command.starts_with("BAT") {
            let next = commands.get(i + 1);
            assert!(
                next.is_some_and(|n| n.starts_with("payload:")),
                "BAT at {i} not followed by payload: {commands:?}"
            );
        }
    }
    assert_eq!(commands.iter().filter(|c| c.starts_with("BAT")).count(), 15);
    Ok(())
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

#[test]
fn test_keep_alive_sends_connect() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let config = SessionConfig {
        keep_alive_interval_ms: 10,
        ..SessionConfig::default()
    };
    let session = open_with_config(&device, config)?;

    let sent = wait_until(Duration::from_secs(5), || {
        device
            .written_commands()
            .iter()
            .filter(|c| c.as_str() == "CONNECT")
            .count()
            >= 3
    });
    assert!(sent, "keep-alive never fired: {:?}", device.written_commands());
    session.close();
    Ok(())
}

#[test]
fn test_keep_alive_failure_is_swallowed() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    device.fail_write_at(2, WriteFault::Fail);
    let config = SessionConfig {
        keep_alive_interval_ms: 10,
        ..SessionConfig::default()
    };
    let session = open_with_config(&device, config)?;

    assert!(wait_until(Duration::from_secs(5), || device.write_count() >= 4));
    assert_eq!(session.state(), SessionState::Ready);
    session.set_brightness(30, TIMEOUT)?;
    Ok(())
}

#[test]
fn test_events_decoded_in_order() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;

    device.queue_control(0x01, 0x01);
    device.queue_control(0x01, 0x00);
    device.queue_report(vec![0u8; 5]);
    device.queue_control(0x51, 0x00);
    device.queue_control(0x7F, 0x01);
    device.queue_control(0x90, 0x01);
    device.queue_control(0x25, 0x01);

    let events = session.read_events(Duration::from_millis(20))?;
    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(events.recv_timeout(Duration::from_secs(5))?);
    }
    assert_eq!(
        received,
        vec![
            Event::new(Control::DisplayTopLeft, Action::Pressed),
            Event::new(Control::DisplayTopLeft, Action::Released),
            Event::new(Control::KnobTop, Action::TurnedClockwise),
            Event::new(Control::KnobBottomLeft, Action::TurnedCounterClockwise),
            Event::new(Control::ButtonLeft, Action::Pressed),
        ]
    );
    assert!(received.last().is_some_and(|e| e.is(Control::ButtonLeft, Action::Pressed)));
    assert!(received.get(2).is_some_and(|e| e.is_rotation_of(Control::KnobTop)));
    Ok(())
}

#[test]
fn test_truncated_report_decodes_present_bytes() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;

    // Byte 9 present, state byte missing: read as zero.
    let mut truncated = vec![0u8; 10];
    if let Some(code) = truncated.get_mut(9) {
        *code = 0x01;
    }
    device.queue_report(truncated);
    device.queue_control(0x02, 0x01);

    let events = session.read_events(Duration::from_millis(20))?;
    let first = events.recv_timeout(Duration::from_secs(5))?;
    let second = events.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(first, Event::new(Control::DisplayTopLeft, Action::Released));
    assert_eq!(second, Event::new(Control::DisplayTopCenter, Action::Pressed));
    Ok(())
}

#[test]
fn test_close_interrupts_long_read() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let events = session.read_events(Duration::from_secs(3))?;
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    session.close();
    assert!(start.elapsed() < Duration::from_millis(800));
    assert_eq!(
        events.recv_timeout(Duration::from_millis(100)),
        Err(RecvTimeoutError::Disconnected)
    );
    Ok(())
}

#[test]
fn test_read_events_only_once() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let _events = session.read_events(Duration::from_millis(10))?;
    assert!(matches!(
        session.read_events(Duration::from_millis(10)),
        Err(StrmCtrlError::EventsAlreadyStarted)
    ));
    Ok(())
}

#[test]
fn test_event_stream_ends_on_close() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let events = session.read_events(Duration::from_millis(10))?;
    session.close();
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)),
        Err(RecvTimeoutError::Disconnected)
    );
    Ok(())
}

#[test]
fn test_close_does_not_wait_for_idle_consumer() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let events = session.read_events(Duration::from_millis(10))?;
    device.queue_control(0x03, 0x01);
    device.queue_control(0x04, 0x01);
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    session.close();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Closed);
    drop(events);
    Ok(())
}

#[test]
fn test_dropped_receiver_stops_poller() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let events = session.read_events(Duration::from_millis(10))?;
    drop(events);
    device.queue_control(0x05, 0x01);
    thread::sleep(Duration::from_millis(50));
    session.set_brightness(70, TIMEOUT)?;
    session.close();
    assert!(device.is_closed());
    Ok(())
}

// ---------------------------------------------------------------------------
// Closing
// ---------------------------------------------------------------------------

#[test]
fn test_close_twice_tears_down_once() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    session.close();
    session.close();

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        device.written_commands(),
        vec!["DIS", "CONNECT", "CLE 00 FF", "STP"]
    );
    let ops = device.ops();
    assert_eq!(
        ops.iter().rev().take(3).rev().cloned().collect::<Vec<_>>(),
        vec![
            MockOp::ReleaseInterface,
            MockOp::ReleaseConfiguration,
            MockOp::Close
        ]
    );
    assert_eq!(device.count_ops(&MockOp::Close), 1);
    drop(session);
    assert_eq!(device.count_ops(&MockOp::Close), 1);
    Ok(())
}

#[test]
fn test_concurrent_close() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    let _events = session.read_events(Duration::from_millis(5))?;

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| session.close());
        }
    });
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(device.count_ops(&MockOp::ReleaseInterface), 1);
    assert_eq!(device.count_ops(&MockOp::Close), 1);
    Ok(())
}

#[test]
fn test_operations_after_close_fail() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    let session = open_session(&device)?;
    session.close();

    assert!(matches!(
        session.set_brightness(10, TIMEOUT),
        Err(StrmCtrlError::Closed)
    ));
    assert!(matches!(session.clear(TIMEOUT), Err(StrmCtrlError::Closed)));
    assert!(matches!(
        session.read_events(TIMEOUT),
        Err(StrmCtrlError::Closed)
    ));
    assert_eq!(device.write_count(), 4);
    Ok(())
}

#[test]
fn test_drop_closes_session() -> TestResult {
    let device = MockDevice::new(1, 2, "AAA");
    {
        let _session = open_session(&device)?;
    }
    assert!(device.is_closed());
    assert_eq!(
        device.written_commands(),
        vec!["DIS", "CONNECT", "CLE 00 FF", "STP"]
    );
    Ok(())
}
