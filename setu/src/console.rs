//! Interactive console: stdin lines become robot commands.
//!
//! Anything that parses as a wire token (`FORWARD:120`, `stop`,
//! `target:1.5,2`) is sent as-is. A few words are handled locally; see `HELP`.

use setu::link::{LinkEvent, LinkManager, LinkSettings, Subscription};
use setu::projection::{StateProjection, spawn_projection};
use setu::{Command, PeerAddr, Result, SetuConfig, SetuError, StreamConnector};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

const HELP: &str = "\
commands: FORWARD|BACKWARD|LEFT|RIGHT:<0-255>  STOP  EMERGENCY_STOP  TARGET:<x>,<y>
          START_AUTO  STOP_AUTO  START_FIGURE8  STOP_FIGURE8  REQUEST_STATUS  RESET
console:  status  history  connect  disconnect  help  quit";

pub fn run(config: SetuConfig, peer: Option<String>) -> Result<()> {
    let peer: PeerAddr = peer
        .or_else(|| config.connection.peer.clone())
        .ok_or_else(|| SetuError::Config("no peer given and [connection] peer unset".into()))?
        .parse()?;

    let manager = LinkManager::new(
        StreamConnector::new(config.connection.clone()),
        LinkSettings::from(&config.link),
    );

    let projection = Arc::new(StateProjection::new(config.history.capacity));
    let projection_handle = spawn_projection(Arc::clone(&projection), manager.subscribe())?;
    let printer_handle = spawn_printer(manager.subscribe())?;

    manager.connect(peer.clone());
    println!("{}", HELP);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "help" => println!("{}", HELP),
            "connect" => manager.connect(peer.clone()),
            "disconnect" => manager.disconnect(),
            "status" => print_status(&manager, &projection),
            "history" => {
                for record in projection.command_history() {
                    println!("{}: {}", record.issued_at_us / 1000, record.token);
                }
            }
            _ => match input.parse::<Command>() {
                Ok(command) => {
                    if !manager.send(&command) {
                        println!("! {} not sent (link is {:?})", command, manager.state());
                    }
                }
                Err(e) => println!("! {}", e),
            },
        }
    }

    info!("Shutting down...");
    // Dropping the manager ends both subscriptions
    drop(manager);
    if projection_handle.join().is_err() || printer_handle.join().is_err() {
        warn!("Console worker thread panicked");
    }
    Ok(())
}

fn spawn_printer(events: Subscription) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("printer".into())
        .spawn(move || {
            while let Ok(event) = events.recv() {
                match event {
                    LinkEvent::Connected(true) => println!("* connected"),
                    LinkEvent::Connected(false) => println!("* disconnected"),
                    LinkEvent::CommandSent(record) => println!("> {}", record.token),
                    LinkEvent::Telemetry(telemetry) => println!("< {}", telemetry.text()),
                }
            }
            if events.dropped_telemetry() > 0 {
                warn!(
                    "Console fell behind; {} status lines not shown",
                    events.dropped_telemetry()
                );
            }
        })?;
    Ok(handle)
}

fn print_status(manager: &LinkManager<StreamConnector>, projection: &StateProjection) {
    let robot = projection.robot_state();
    println!("link:       {:?}", manager.state());
    println!(
        "position:   ({:.2}, {:.2}) heading {:.1}",
        robot.position_x, robot.position_y, robot.orientation
    );
    println!("battery:    {:.2} V", robot.battery_level);
    println!(
        "ultrasonic: left {} right {}",
        robot.left_ultrasonic, robot.right_ultrasonic
    );
    println!("infrared:   {:?}", robot.ir_sensors);
    println!("mode:       {}", robot.mode);
    println!(
        "lines:      {} received, {} unparsed",
        projection.telemetry_lines(),
        projection.parse_errors()
    );
}
