//! ASV driver: serial telemetry ingestion and rudder command forwarding

pub mod link;
pub mod protocol;

use crate::battery::BatterySimulator;
use crate::config::SerialConfig;
use crate::core::types::TelemetryRecord;
use crate::error::Result;
use crate::state::TeamStateStore;
use crate::streaming::hub::{HubEvent, HubSender};
use crate::transport::Transport;
use link::{LineCallback, SerialLink};
use std::sync::Arc;

/// Result of forwarding an operator command to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command line was written to the serial link
    Sent,
    /// The command was not forwarded; the reason is logged
    Rejected(&'static str),
}

/// Driver for the serial-attached vehicle
pub struct AsvDriver {
    link: SerialLink,
}

impl AsvDriver {
    pub fn new(
        config: &SerialConfig,
        store: Arc<TeamStateStore>,
        hub: HubSender,
        battery: Arc<BatterySimulator>,
    ) -> Self {
        let on_line = ingestion_callback(store, hub, battery);
        Self {
            link: SerialLink::new(&config.port, config.baud_rate, on_line),
        }
    }

    /// Open the serial link if it is not open yet
    pub fn ensure_link_open(&self) -> Result<()> {
        self.link.ensure_open()
    }

    /// Open the link over a caller-supplied transport (tests)
    pub fn open_link_with(&self, transport: Box<dyn Transport>) -> Result<()> {
        self.link.open_with(transport)
    }

    pub fn is_link_open(&self) -> bool {
        self.link.is_open()
    }

    /// Forward a rudder centering command
    pub fn send_center(&self, value: f64) -> CommandOutcome {
        self.send_command(protocol::format_center(value))
    }

    /// Forward a rudder angle command
    pub fn send_rudder(&self, value: f64) -> CommandOutcome {
        self.send_command(protocol::format_rudder(value))
    }

    fn send_command(&self, line: String) -> CommandOutcome {
        if !self.link.is_open() {
            log::warn!("Command dropped, serial link closed: {}", line.trim_end());
            return CommandOutcome::Rejected("serial link closed");
        }
        match self.link.write_line(&line) {
            Ok(()) => {
                log::debug!("Forwarded command: {}", line.trim_end());
                CommandOutcome::Sent
            }
            Err(e) => {
                log::warn!("Command write failed: {}", e);
                CommandOutcome::Rejected("serial write failed")
            }
        }
    }

    /// Close the serial link
    pub fn close(&self) {
        self.link.close();
    }
}

/// Build the serial ingestion callback: parse, store, then broadcast.
///
/// The store update happens before the broadcast so a viewer that
/// snapshots while an event is in flight never sees the event without
/// its record.
fn ingestion_callback(
    store: Arc<TeamStateStore>,
    hub: HubSender,
    battery: Arc<BatterySimulator>,
) -> LineCallback {
    Arc::new(move |line: &str| {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        log::debug!("Serial: {}", line);

        let Some(fix) = protocol::parse_line(line) else {
            log::debug!("Unparsed serial line: {}", line);
            return;
        };

        let record = TelemetryRecord::from_fix(
            fix.lat,
            fix.lon,
            fix.sog,
            fix.cog,
            battery.reported_level(),
        );
        store.upsert(record.clone());
        hub.publish(HubEvent::Telemetry(record));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transport::MockTransport;
    use crossbeam_queue::ArrayQueue;
    use std::time::Duration;

    type Parts = (
        Arc<TeamStateStore>,
        HubSender,
        Arc<BatterySimulator>,
        Arc<ArrayQueue<HubEvent>>,
    );

    fn driver_parts() -> Parts {
        let queue = Arc::new(ArrayQueue::new(16));
        (
            Arc::new(TeamStateStore::new()),
            HubSender::new(Arc::clone(&queue)),
            Arc::new(BatterySimulator::new(100.0, Duration::from_secs(60))),
            queue,
        )
    }

    #[test]
    fn test_ingestion_updates_store_and_publishes() {
        let (store, hub, battery, queue) = driver_parts();
        let on_line = ingestion_callback(Arc::clone(&store), hub, battery);

        on_line("LAT:-6.129765,LON:106.834950,SOG:2.53,COG:87.41");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        let record = &snapshot[0].1;
        assert_eq!(record.team_id, "TEAM_ASV_01");
        assert_eq!(record.position.lat, -6.129765);
        assert_eq!(record.position.lng, 106.834950);
        assert_eq!(record.sog, 2.53);
        assert_eq!(record.cog, 87.41);
        assert_eq!(record.battery, 100.0);
        assert_eq!(record.mission, "Navigation");

        match queue.pop() {
            Some(HubEvent::Telemetry(published)) => assert_eq!(&published, record),
            _ => panic!("expected telemetry event"),
        }
    }

    #[test]
    fn test_ingestion_skips_noise_lines() {
        let (store, hub, battery, queue) = driver_parts();
        let on_line = ingestion_callback(Arc::clone(&store), hub, battery);

        on_line("");
        on_line("   ");
        on_line("GPS ready");

        assert!(store.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_commands_rejected_while_link_closed() {
        let (store, hub, battery, _queue) = driver_parts();
        let config = AppConfig::asv_defaults().serial;
        let driver = AsvDriver::new(&config, store, hub, battery);

        assert_eq!(
            driver.send_rudder(45.0),
            CommandOutcome::Rejected("serial link closed")
        );
    }

    #[test]
    fn test_commands_reach_open_link() {
        let (store, hub, battery, _queue) = driver_parts();
        let config = AppConfig::asv_defaults().serial;
        let driver = AsvDriver::new(&config, store, hub, battery);

        let mock = MockTransport::new();
        driver.open_link_with(Box::new(mock.clone())).unwrap();

        assert_eq!(driver.send_rudder(45.0), CommandOutcome::Sent);
        assert_eq!(driver.send_center(90.0), CommandOutcome::Sent);
        assert_eq!(mock.get_written(), b"RUDDER:45\nCENTER:90\n");
    }
}
