//! End-to-end link over loopback TCP, with the listener playing the robot.

use approx::assert_relative_eq;
use setu::config::ConnectionConfig;
use setu::link::{LinkEvent, LinkManager, LinkSettings};
use setu::projection::{StateProjection, spawn_projection};
use setu::{Command, Direction, PeerAddr, StreamConnector};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

fn connector() -> StreamConnector {
    StreamConnector::new(ConnectionConfig {
        connect_timeout_ms: 1000,
        ..ConnectionConfig::default()
    })
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_robot_session_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let robot = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"POS:1.5,-2.0,90.0;BAT:11.").unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        stream.write_all(b"5\nMODE:AUTO\n").unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        // Returning drops the stream, which the client sees as end of stream
        line
    });

    let manager = LinkManager::new(connector(), LinkSettings::default());
    let events = manager.subscribe();
    let projection = Arc::new(StateProjection::new(20));
    let projection_thread = spawn_projection(Arc::clone(&projection), manager.subscribe()).unwrap();

    manager.connect(PeerAddr::Tcp(addr.to_string()));
    assert_eq!(events.recv_timeout(WAIT).unwrap(), LinkEvent::Connected(true));

    assert!(wait_until(|| projection.robot_state().mode == "AUTO"));
    let state = projection.robot_state();
    assert_relative_eq!(state.position_x, 1.5);
    assert_relative_eq!(state.position_y, -2.0);
    assert_relative_eq!(state.orientation, 90.0);
    assert_relative_eq!(state.battery_level, 11.5);

    assert!(manager.send(&Command::drive(Direction::Forward, 128)));
    assert_eq!(robot.join().unwrap(), "FORWARD:128\n");

    // Peer hung up
    assert!(wait_until(|| !manager.is_connected()));
    assert!(wait_until(|| !projection.is_connected()));
    assert_eq!(projection.command_history()[0].token, "FORWARD:128");

    drop(manager);
    projection_thread.join().unwrap();
}

#[test]
fn test_refused_tcp_peer_reports_false() {
    // Bind then drop to get a port nobody listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let manager = LinkManager::new(connector(), LinkSettings::default());
    let events = manager.subscribe();
    manager.connect(PeerAddr::Tcp(addr.to_string()));

    assert_eq!(events.recv_timeout(WAIT).unwrap(), LinkEvent::Connected(false));
    assert!(!manager.is_connected());
    assert!(!manager.send(&Command::Stop));
}

#[test]
fn test_disconnect_releases_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let manager = LinkManager::new(connector(), LinkSettings::default());
    let events = manager.subscribe();
    manager.connect(PeerAddr::Tcp(addr.to_string()));
    assert_eq!(events.recv_timeout(WAIT).unwrap(), LinkEvent::Connected(true));

    let (stream, _) = listener.accept().unwrap();
    manager.disconnect();
    assert_eq!(events.recv_timeout(WAIT).unwrap(), LinkEvent::Connected(false));

    // The robot side sees end of stream once the client shuts down
    let mut line = String::new();
    let read = BufReader::new(stream).read_line(&mut line).unwrap();
    assert_eq!(read, 0);
}
