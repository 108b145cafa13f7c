//! Integration tests for the client over the in-memory transport
//!
//! A [`SimulatedDevice`] plays the device side of each conversation.

use std::borrow::Cow;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use eyre::Result;
use tracing_subscriber::EnvFilter;
use transport::testing::SimulatedDevice;
use transport::{
    ANY_EVENT, Anomaly, Client, ClientConfig, Command, ConnectionState, DecodeError, DeviceError,
    Error, Event, Grammar, InMemoryTransport, Message, OverlapPolicy, Value,
};

/// `Vol<nnn>` is a volume change; `E<nn>` an error code.
struct VolumeGrammar;

impl Grammar for VolumeGrammar {
    fn decode_event(&self, message: &Message) -> Option<Event> {
        let level = message.text().strip_prefix("Vol")?.parse().ok()?;
        Some(Event::value_change(
            "volume",
            message.clone(),
            Value::Int(level),
            None,
        ))
    }

    fn decode_error(&self, message: &Message) -> Option<DeviceError> {
        let code = message.text().strip_prefix('E')?.parse().ok()?;
        Some(DeviceError {
            code,
            description: Cow::Borrowed("test error"),
        })
    }
}

fn lines(lines: &[&str]) -> Option<Vec<String>> {
    Some(lines.iter().map(|l| l.to_string()).collect())
}

fn firmware() -> Command<String> {
    Command::text("Q", |reply| reply.text().contains('.'))
}

fn set_volume(level: i64) -> Command<i64> {
    let echo = format!("Vol{level:03}");
    Command::new(
        format!("{level}V"),
        move |reply| reply.text() == echo,
        |reply| {
            reply.text()[3..]
                .parse()
                .map_err(|e: std::num::ParseIntError| DecodeError::new(e.to_string()))
        },
    )
}

/// Answers `Q` with a firmware version and `<n>V` with `Vol<nnn>`.
fn simple_device(transport: InMemoryTransport) -> SimulatedDevice {
    SimulatedDevice::builder()
        .respond(|request| {
            let request = std::str::from_utf8(request).ok()?;
            if request == "Q" {
                return lines(&["1.02"]);
            }
            let level: i64 = request.strip_suffix('V')?.parse().ok()?;
            Some(vec![format!("Vol{level:03}")])
        })
        .spawn(transport)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn event_log(client: &Client, name: &str) -> Arc<Mutex<Vec<String>>> {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&log);
    client.add_event_listener(name, move |event| {
        sink.lock().unwrap().push(event.payload().text().to_owned());
        Ok(())
    });
    log
}

#[test]
fn request_reply_without_spurious_events() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let events = event_log(&client, ANY_EVENT);
    let session = client.open(client_transport)?;

    assert_eq!(session.send(firmware())?, "1.02");
    assert_eq!(session.send(set_volume(7))?, 7);

    assert!(events.lock().unwrap().is_empty());
    assert!(client.anomalies().try_recv().is_err());
    session.close();
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[test]
fn unsolicited_volume_is_delivered_before_the_reply() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = SimulatedDevice::builder()
        .respond(|request| (request == b"32V").then(|| vec!["Vol045".into(), "Vol032".into()]))
        .spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&order);
    client.add_event_listener("volume", move |event| {
        let level = event.value().and_then(Value::as_int).unwrap_or_default();
        sink.lock().unwrap().push(format!("event:{level}"));
        Ok(())
    });
    let session = client.open(client_transport)?;

    let level = session.send(set_volume(32))?;
    order.lock().unwrap().push(format!("reply:{level}"));

    assert_eq!(*order.lock().unwrap(), vec!["event:45", "reply:32"]);
    Ok(())
}

#[test]
fn interleaved_events_keep_stream_order() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = SimulatedDevice::builder()
        .respond(|request| {
            (request == b"Q").then(|| vec!["Vol001".into(), "1.02".into(), "Vol002".into()])
        })
        .spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let events = event_log(&client, "volume");
    let session = client.open(client_transport)?;

    assert_eq!(session.send(firmware())?, "1.02");
    wait_until(|| events.lock().unwrap().len() == 2);
    assert_eq!(*events.lock().unwrap(), vec!["Vol001", "Vol002"]);
    Ok(())
}

#[test]
fn late_reply_after_timeout_is_unrecognized() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = SimulatedDevice::builder()
        .respond(|request| match request {
            b"V" => {
                thread::sleep(Duration::from_millis(200));
                lines(&["32"])
            }
            b"Q" => lines(&["1.02"]),
            _ => None,
        })
        .spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let session = client.open(client_transport)?;

    let query = Command::new(
        "V",
        |reply| reply.text().parse::<i64>().is_ok(),
        |reply| {
            reply
                .text()
                .parse::<i64>()
                .map_err(|e| DecodeError::new(e.to_string()))
        },
    )
    .with_timeout(Duration::from_millis(50));

    let err = session.send(query).unwrap_err();
    assert!(matches!(err, Error::Timeout(t) if t == Duration::from_millis(50)));

    let anomaly = client.anomalies().recv_timeout(Duration::from_secs(5))?;
    assert!(matches!(anomaly, Anomaly::Unrecognized(ref m) if m.text() == "32"));

    // the connection is unaffected
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(session.send(firmware())?, "1.02");
    Ok(())
}

#[test]
fn device_error_answers_the_request() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = SimulatedDevice::builder()
        .respond(|_| lines(&["E13"]))
        .spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let session = client.open(client_transport)?;

    let err = session.send(set_volume(99)).unwrap_err();
    assert!(matches!(err, Error::Device(DeviceError { code: 13, .. })));
    assert_eq!(client.state(), ConnectionState::Open);
    Ok(())
}

#[test]
fn decode_failure_stays_with_the_caller() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let session = client.open(client_transport)?;

    let broken = Command::new(
        "Q",
        |reply| reply.text().contains('.'),
        |_| Err::<u32, _>(DecodeError::new("not a number")),
    );
    let err = session.send(broken).unwrap_err();
    match err {
        Error::Decode { reply, source } => {
            assert_eq!(reply, "1.02");
            assert_eq!(source.reason(), "not a number");
        }
        other => panic!("expected decode error, got {other:?}"),
    }

    assert_eq!(session.send(firmware())?, "1.02");
    Ok(())
}

#[test]
fn io_failure_while_waiting_faults_the_connection() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = SimulatedDevice::builder().spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let session = client.open(client_transport)?;

    let result = thread::scope(|s| {
        let waiter =
            s.spawn(|| session.send(firmware().with_timeout(Duration::from_secs(10))));
        wait_until(|| !device.requests().is_empty());
        device
            .inject_error(io::ErrorKind::BrokenPipe, "cable pulled")
            .unwrap();
        waiter.join().unwrap()
    });

    assert!(matches!(result, Err(Error::ConnectionLost(ref reason)) if reason.contains("cable pulled")));
    assert_eq!(client.state(), ConnectionState::Faulted);
    assert!(matches!(
        session.send(firmware()),
        Err(Error::NotConnected(ConnectionState::Faulted))
    ));

    let faulted = client
        .anomalies()
        .try_iter()
        .any(|a| matches!(a, Anomaly::ConnectionFaulted(_)));
    assert!(faulted);
    Ok(())
}

#[test]
fn peer_disconnect_faults_the_connection() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = simple_device(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let session = client.open(client_transport)?;
    assert_eq!(session.send(firmware())?, "1.02");

    device.disconnect();
    wait_until(|| client.state() == ConnectionState::Faulted);
    Ok(())
}

#[test]
fn framing_overflow_faults_the_connection() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = simple_device(device_transport);

    let config = ClientConfig {
        max_frame_len: 16,
        ..ClientConfig::default()
    };
    let client = Client::new(VolumeGrammar, config);
    let _session = client.open(client_transport)?;

    device.push_raw(&[b'x'; 64])?;
    wait_until(|| client.state() == ConnectionState::Faulted);
    Ok(())
}

#[test]
fn framing_overflow_fails_the_pending_request() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = SimulatedDevice::builder().spawn(device_transport);

    let config = ClientConfig {
        max_frame_len: 16,
        ..ClientConfig::default()
    };
    let client = Client::new(VolumeGrammar, config);
    let session = client.open(client_transport)?;

    let result = thread::scope(|s| {
        let waiter =
            s.spawn(|| session.send(firmware().with_timeout(Duration::from_secs(10))));
        wait_until(|| !device.requests().is_empty());
        device.push_raw(&[b'x'; 64]).unwrap();
        waiter.join().unwrap()
    });

    assert!(matches!(result, Err(Error::ConnectionLost(_))));
    assert_eq!(client.state(), ConnectionState::Faulted);
    Ok(())
}

#[test]
fn nothing_is_delivered_after_a_write_failure() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let (device_rx, mut device_tx) = device_transport.into_split();
    drop(device_rx);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let events = event_log(&client, ANY_EVENT);
    let _session = client.open(client_transport)?;

    let err = client.send(firmware()).unwrap_err();
    assert!(matches!(err, Error::ConnectionLost(ref reason) if reason.starts_with("write failed")));
    assert_eq!(client.state(), ConnectionState::Faulted);

    // fails once the reader has stopped, which drops the line just the same
    let _ = device_tx.write_all(b"Vol010\r\n");
    thread::sleep(Duration::from_millis(100));
    assert!(events.lock().unwrap().is_empty());

    let faulted = client
        .anomalies()
        .try_iter()
        .any(|a| matches!(a, Anomaly::ConnectionFaulted(_)));
    assert!(faulted);
    Ok(())
}

#[test]
fn panicking_matcher_faults_the_connection() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let session = client.open(client_transport)?;

    let broken = Command::text("Q", |_| panic!("matcher bug"))
        .with_timeout(Duration::from_secs(10));
    let err = session.send(broken).unwrap_err();
    assert!(matches!(err, Error::ConnectionLost(ref reason) if reason.contains("matcher bug")));
    assert_eq!(client.state(), ConnectionState::Faulted);

    // the client can be reopened afterwards
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);
    let session = client.open(client_transport)?;
    assert_eq!(session.send(firmware())?, "1.02");
    Ok(())
}

#[test]
fn listener_can_close_while_a_faulted_client_reopens() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let (device_rx, mut device_tx) = device_transport.into_split();

    let client = Arc::new(Client::new(VolumeGrammar, ClientConfig::default()));
    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let (resume_tx, resume_rx) = crossbeam_channel::bounded::<()>(1);
    let weak = Arc::downgrade(&client);
    client.add_event_listener("volume", move |_| {
        let _ = entered_tx.send(());
        let _ = resume_rx.recv();
        if let Some(client) = weak.upgrade() {
            client.close();
        }
        Ok(())
    });
    client.open(client_transport)?.detach();

    // park the reader thread inside the listener
    device_tx.write_all(b"Vol010\r\n")?;
    entered_rx.recv_timeout(Duration::from_secs(5))?;

    drop(device_rx);
    assert!(matches!(client.send(firmware()), Err(Error::ConnectionLost(_))));
    assert_eq!(client.state(), ConnectionState::Faulted);

    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);
    let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);
    let opener = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let result = client.open(client_transport).map(|session| session.detach());
            let _ = opened_tx.send(result);
        })
    };

    resume_tx.send(())?;
    opened_rx.recv_timeout(Duration::from_secs(5))??;
    opener.join().unwrap();

    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(client.send(firmware())?, "1.02");
    client.close();
    Ok(())
}

#[test]
fn reopen_after_fault() -> Result<()> {
    let client = Client::new(VolumeGrammar, ClientConfig::default());

    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = simple_device(device_transport);
    client.open(client_transport)?.detach();
    device.disconnect();
    wait_until(|| client.state() == ConnectionState::Faulted);

    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);
    let session = client.open(client_transport)?;
    assert_eq!(session.send(firmware())?, "1.02");
    Ok(())
}

#[test]
fn lifecycle_errors() -> Result<()> {
    let client = Client::new(VolumeGrammar, ClientConfig::default());
    assert!(matches!(
        client.send(firmware()),
        Err(Error::NotConnected(ConnectionState::Closed))
    ));

    let (client_transport, device_transport) = InMemoryTransport::pair();
    let _device = simple_device(device_transport);
    let session = client.open(client_transport)?;

    let (second, _other_device) = InMemoryTransport::pair();
    assert!(matches!(client.open(second), Err(Error::AlreadyOpen)));

    drop(session);
    assert_eq!(client.state(), ConnectionState::Closed);
    client.close();
    client.close();
    Ok(())
}

#[test]
fn close_cancels_the_pending_request() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = SimulatedDevice::builder().spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    client.open(client_transport)?.detach();

    let result = thread::scope(|s| {
        let waiter = s.spawn(|| client.send(firmware().with_timeout(Duration::from_secs(10))));
        wait_until(|| !device.requests().is_empty());
        client.close();
        waiter.join().unwrap()
    });

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(client.state(), ConnectionState::Closed);
    Ok(())
}

#[test]
fn removing_listeners_is_idempotent() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = simple_device(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let removed: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&removed);
    let handle = client.add_event_listener("volume", move |event| {
        sink.lock().unwrap().push(event.payload().text().to_owned());
        Ok(())
    });
    let kept = event_log(&client, "volume");
    let session = client.open(client_transport)?;

    client.remove_event_listener(handle);
    client.remove_event_listener(handle);

    device.push("Vol010")?;
    wait_until(|| !kept.lock().unwrap().is_empty());
    assert!(removed.lock().unwrap().is_empty());

    session.close();
    client.remove_event_listener(handle);
    Ok(())
}

#[test]
fn failing_listener_is_reported_and_isolated() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = simple_device(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let failing = client.add_event_listener("volume", |_| Err("listener broke".into()));
    let kept = event_log(&client, "volume");
    let _session = client.open(client_transport)?;

    device.push("Vol010")?;
    wait_until(|| !kept.lock().unwrap().is_empty());

    match client.anomalies().recv_timeout(Duration::from_secs(5))? {
        Anomaly::ListenerFailed(failure) => {
            assert_eq!(failure.handle, failing);
            assert_eq!(failure.event, "volume");
            assert_eq!(failure.reason, "listener broke");
        }
        other => panic!("expected listener failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn fail_fast_rejects_overlapping_sends() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = SimulatedDevice::builder().spawn(device_transport);

    let config = ClientConfig {
        overlap: OverlapPolicy::FailFast,
        ..ClientConfig::default()
    };
    let client = Client::new(VolumeGrammar, config);
    client.open(client_transport)?.detach();

    let (first, second) = thread::scope(|s| {
        let waiter = s.spawn(|| client.send(firmware().with_timeout(Duration::from_secs(10))));
        wait_until(|| !device.requests().is_empty());
        let second = client.send(firmware());
        client.close();
        (waiter.join().unwrap(), second)
    });

    assert!(matches!(second, Err(Error::RequestInProgress)));
    assert!(matches!(first, Err(Error::Cancelled)));
    assert_eq!(device.requests().len(), 1);
    Ok(())
}

#[test]
fn queued_sends_each_get_their_own_reply() -> Result<()> {
    let (client_transport, device_transport) = InMemoryTransport::pair();
    let device = SimulatedDevice::builder()
        .respond(|request| {
            thread::sleep(Duration::from_millis(10));
            let level: i64 = std::str::from_utf8(request).ok()?.strip_suffix('V')?.parse().ok()?;
            Some(vec![format!("Vol{level:03}")])
        })
        .spawn(device_transport);

    let client = Client::new(VolumeGrammar, ClientConfig::default());
    let _session = client.open(client_transport)?;

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (1..=4)
            .map(|level| {
                let client = &client;
                s.spawn(move || client.send(set_volume(level)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (level, result) in (1..=4).zip(results) {
        assert_eq!(result?, level);
    }
    assert_eq!(device.requests().len(), 4);
    assert!(client.anomalies().try_recv().is_err());
    Ok(())
}

#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}
