//! Session lifecycle tests against the scripted mock connector.

use setu::link::{LinkEvent, LinkManager, LinkSettings, LinkState, Subscription};
use setu::projection::StateProjection;
use setu::transport::{MockConnector, MockPeer};
use setu::{Command, Direction};
use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);
const OPENING: Duration = Duration::from_millis(50);

fn next_event(events: &Subscription) -> LinkEvent {
    events
        .recv_timeout(WAIT)
        .expect("expected a link event within timeout")
}

/// Events that arrive within a short quiet period
fn settle(events: &Subscription) -> Vec<LinkEvent> {
    thread::sleep(QUIET);
    events.drain()
}

fn telemetry_lines(events: &[LinkEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Telemetry(t) => Some(t.text()),
            _ => None,
        })
        .collect()
}

fn connected(
    connector: &MockConnector,
    peer: &str,
) -> (LinkManager<MockConnector>, Subscription, MockPeer) {
    let handle = connector.accept(peer);
    let manager = LinkManager::new(connector.clone(), LinkSettings::default());
    let events = manager.subscribe();
    manager.connect(peer.to_string());
    assert_eq!(next_event(&events), LinkEvent::Connected(true));
    (manager, events, handle)
}

#[test]
fn test_never_two_transports_open() {
    let connector = MockConnector::new();
    let first_a = connector.accept_after("a", Duration::from_millis(250));
    let _b = connector.accept("b");
    let _c = connector.accept("c");
    let second_a = connector.accept("a");

    let manager = LinkManager::new(connector.clone(), LinkSettings::default());
    let events = manager.subscribe();

    manager.connect("a".to_string());
    // Let the first open start before superseding it
    thread::sleep(OPENING);
    manager.connect("b".to_string());
    manager.disconnect();
    manager.connect("c".to_string());

    assert_eq!(next_event(&events), LinkEvent::Connected(false));
    assert_eq!(next_event(&events), LinkEvent::Connected(true));
    assert!(first_a.is_closed());

    manager.connect("a".to_string());
    assert_eq!(next_event(&events), LinkEvent::Connected(false));
    assert_eq!(next_event(&events), LinkEvent::Connected(true));
    assert!(!second_a.is_closed());

    // "b" was superseded before its open started
    assert_eq!(connector.open_count(), 3);
    assert_eq!(connector.max_concurrent_open(), 1);
    assert_eq!(connector.currently_open(), 1);
}

#[test]
fn test_disconnect_when_idle() {
    let connector = MockConnector::new();
    let manager = LinkManager::new(connector.clone(), LinkSettings::default());
    let events = manager.subscribe();

    manager.disconnect();

    assert_eq!(settle(&events), vec![LinkEvent::Connected(false)]);
    assert_eq!(manager.state(), LinkState::Idle);
    assert_eq!(connector.open_count(), 0);
}

#[test]
fn test_repeated_disconnect_reports_each_call() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");

    manager.disconnect();
    manager.disconnect();

    assert_eq!(
        settle(&events),
        vec![LinkEvent::Connected(false), LinkEvent::Connected(false)]
    );
    assert_eq!(peer.close_calls(), 1);
}

#[test]
fn test_send_while_not_connected() {
    let connector = MockConnector::new();
    let peer = connector.accept_after("bot", Duration::from_millis(300));
    let manager = LinkManager::new(connector, LinkSettings::default());

    assert!(!manager.send(&Command::Stop));

    manager.connect("bot".to_string());
    assert_eq!(manager.state(), LinkState::Connecting);
    assert!(!manager.send(&Command::Stop));

    assert_eq!(peer.write_attempts(), 0);
}

#[test]
fn test_write_failure_tears_down_once() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");

    peer.fail_writes(true);
    assert!(!manager.send(&Command::drive(Direction::Forward, 100)));
    assert_eq!(manager.state(), LinkState::Idle);
    assert!(peer.is_closed());

    // Bytes still queued on the torn-down link must not surface
    peer.send(b"BAT:11.0\n");
    assert_eq!(settle(&events), vec![LinkEvent::Connected(false)]);

    peer.fail_writes(false);
    assert!(!manager.send(&Command::Stop));
}

#[test]
fn test_line_split_across_reads() {
    let connector = MockConnector::new();
    let (_manager, events, peer) = connected(&connector, "bot");

    peer.send(b"FORW");
    thread::sleep(Duration::from_millis(20));
    peer.send(b"ARD:100\n");

    assert_eq!(telemetry_lines(&settle(&events)), vec!["FORWARD:100"]);
}

#[test]
fn test_many_lines_in_one_read() {
    let connector = MockConnector::new();
    let (_manager, events, peer) = connected(&connector, "bot");

    peer.send(b"BAT:12.0\r\nMODE:AUTO\r\nUS:1");
    peer.send(b"0,20\r\n");

    assert_eq!(
        telemetry_lines(&settle(&events)),
        vec!["BAT:12.0", "MODE:AUTO", "US:10,20"]
    );
}

#[test]
fn test_command_log_keeps_twenty_newest() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");
    let projection = StateProjection::new(20);

    for speed in 0..25 {
        assert!(manager.send(&Command::drive(Direction::Forward, speed)));
    }
    for event in settle(&events) {
        projection.apply(&event);
    }

    let history = projection.command_history();
    assert_eq!(history.len(), 20);
    let expected: Vec<String> = (5..25).rev().map(|s| format!("FORWARD:{}", s)).collect();
    let tokens: Vec<String> = history.iter().map(|r| r.token.clone()).collect();
    assert_eq!(tokens, expected);
    assert!(history.windows(2).all(|w| w[0].issued_at_us >= w[1].issued_at_us));
    assert_eq!(peer.written_lines().len(), 25);
}

#[test]
fn test_send_then_read_error() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "deviceA");

    assert!(manager.send_token("FORWARD:128"));
    match next_event(&events) {
        LinkEvent::CommandSent(record) => assert_eq!(record.token, "FORWARD:128"),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(peer.written(), b"FORWARD:128\n");

    peer.fail_read(ErrorKind::ConnectionReset);

    assert_eq!(settle(&events), vec![LinkEvent::Connected(false)]);
    assert!(!manager.send_token("FORWARD:128"));
    assert_eq!(peer.write_attempts(), 1);
}

#[test]
fn test_second_connect_supersedes_first() {
    let connector = MockConnector::new();
    let slow = connector.accept_after("deviceA", Duration::from_millis(250));
    let fast = connector.accept("deviceB");
    let manager = LinkManager::new(connector.clone(), LinkSettings::default());
    let events = manager.subscribe();

    manager.connect("deviceA".to_string());
    thread::sleep(OPENING);
    manager.connect("deviceB".to_string());

    assert_eq!(next_event(&events), LinkEvent::Connected(true));
    assert!(settle(&events).is_empty());
    assert!(slow.is_closed());
    assert!(!fast.is_closed());
    assert_eq!(connector.max_concurrent_open(), 1);

    assert!(manager.send(&Command::RequestStatus));
    assert_eq!(fast.written_lines(), vec!["REQUEST_STATUS"]);
    assert!(slow.written().is_empty());
}

#[test]
fn test_rapid_double_connect_reports_once() {
    let connector = MockConnector::new();
    let first = connector.accept_after("deviceA", Duration::from_millis(100));
    let second = connector.accept("deviceA");
    let manager = LinkManager::new(connector.clone(), LinkSettings::default());
    let events = manager.subscribe();

    manager.connect("deviceA".to_string());
    manager.connect("deviceA".to_string());

    assert_eq!(next_event(&events), LinkEvent::Connected(true));
    assert!(settle(&events).is_empty());
    assert_eq!(connector.currently_open(), 1);
    assert_eq!(connector.max_concurrent_open(), 1);

    assert!(manager.send(&Command::RequestStatus));
    let mut written = first.written_lines();
    written.extend(second.written_lines());
    assert_eq!(written, vec!["REQUEST_STATUS"]);
}

#[test]
fn test_superseded_refusal_is_silent() {
    let connector = MockConnector::new();
    connector.refuse_after("bot", Duration::from_millis(150));
    let _peer = connector.accept("bot");
    let manager = LinkManager::new(connector, LinkSettings::default());
    let events = manager.subscribe();

    manager.connect("bot".to_string());
    thread::sleep(OPENING);
    manager.connect("bot".to_string());

    assert_eq!(next_event(&events), LinkEvent::Connected(true));
    assert!(settle(&events).is_empty());
}

#[test]
fn test_disconnect_while_connecting() {
    let connector = MockConnector::new();
    let peer = connector.accept_after("bot", Duration::from_millis(150));
    let manager = LinkManager::new(connector.clone(), LinkSettings::default());
    let events = manager.subscribe();

    manager.connect("bot".to_string());
    thread::sleep(OPENING);
    manager.disconnect();
    assert_eq!(manager.state(), LinkState::Idle);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(settle(&events), vec![LinkEvent::Connected(false)]);
    assert!(peer.is_closed());
    assert_eq!(connector.currently_open(), 0);
}

#[test]
fn test_no_telemetry_after_disconnect() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");

    peer.send(b"MODE:AUTO\n");
    assert!(matches!(next_event(&events), LinkEvent::Telemetry(_)));

    manager.disconnect();
    peer.send(b"MODE:IDLE\n");

    assert_eq!(settle(&events), vec![LinkEvent::Connected(false)]);
}

#[test]
fn test_slow_subscriber_does_not_stall_reader() {
    let connector = MockConnector::new();
    let peer = connector.accept("bot");
    let settings = LinkSettings {
        subscriber_backlog: 4,
        ..LinkSettings::default()
    };
    let manager = LinkManager::new(connector, settings);
    let stalled = manager.subscribe();
    let events = manager.subscribe();

    manager.connect("bot".to_string());
    assert_eq!(next_event(&events), LinkEvent::Connected(true));

    let mut burst = Vec::new();
    for i in 0..50 {
        burst.extend_from_slice(format!("US:{},{}\n", i, i).as_bytes());
    }
    peer.send(&burst);
    settle(&events);

    // The reader is still live: commands go out and new lines arrive
    assert!(manager.send(&Command::Stop));
    peer.send(b"MODE:AUTO\n");
    let after = settle(&events);
    assert!(matches!(&after[0], LinkEvent::CommandSent(r) if r.token == "STOP"));
    assert_eq!(telemetry_lines(&after), vec!["MODE:AUTO"]);

    let backlog = stalled.drain();
    assert_eq!(backlog[0], LinkEvent::Connected(true));
    assert_eq!(telemetry_lines(&backlog).len(), 4);
    assert!(matches!(backlog.last(), Some(LinkEvent::CommandSent(_))));
    assert_eq!(stalled.dropped_telemetry(), 47);
}

#[test]
fn test_oversized_lines_are_dropped() {
    let connector = MockConnector::new();
    let peer = connector.accept("bot");
    let settings = LinkSettings {
        max_line_len: 16,
        ..LinkSettings::default()
    };
    let manager = LinkManager::new(connector, settings);
    let events = manager.subscribe();
    manager.connect("bot".to_string());
    assert_eq!(next_event(&events), LinkEvent::Connected(true));

    peer.send(&[b'X'; 100]);
    peer.send(b"\nBAT:11.0\n");

    assert_eq!(telemetry_lines(&settle(&events)), vec!["BAT:11.0"]);
    assert!(manager.is_connected());
}

#[test]
fn test_reconnect_after_failure() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");

    peer.fail_read(ErrorKind::UnexpectedEof);
    assert_eq!(next_event(&events), LinkEvent::Connected(false));

    let fresh = connector.accept("bot");
    manager.connect("bot".to_string());
    assert_eq!(next_event(&events), LinkEvent::Connected(true));

    assert!(manager.send(&Command::Reset));
    assert_eq!(fresh.written_lines(), vec!["RESET"]);
    assert_eq!(connector.max_concurrent_open(), 1);
}

#[test]
fn test_failed_close_still_reaches_idle_on_disconnect() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");
    peer.fail_close(true);

    manager.disconnect();

    assert_eq!(manager.state(), LinkState::Idle);
    assert_eq!(settle(&events), vec![LinkEvent::Connected(false)]);
    assert_eq!(peer.close_calls(), 1);
    assert_eq!(connector.currently_open(), 0);
}

#[test]
fn test_failed_close_still_reaches_idle_on_read_error() {
    let connector = MockConnector::new();
    let (manager, events, peer) = connected(&connector, "bot");
    peer.fail_close(true);

    peer.fail_read(ErrorKind::ConnectionAborted);

    assert_eq!(next_event(&events), LinkEvent::Connected(false));
    assert!(settle(&events).is_empty());
    assert_eq!(manager.state(), LinkState::Idle);
    assert_eq!(peer.close_calls(), 1);
    assert!(!manager.send(&Command::Stop));
}
