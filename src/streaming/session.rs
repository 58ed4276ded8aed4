//! Per-viewer receive session
//!
//! Each connected viewer gets a receiver thread that decodes inbound
//! frames and dispatches them: telemetry merges, camera frames, link
//! triggers and rudder commands. Connection accounting runs exactly
//! once per viewer no matter whether the read side or the write side
//! notices the disconnect first.

use crate::battery::BatterySimulator;
use crate::core::types::{ImageFrame, DEFAULT_TEAM_ID};
use crate::devices::asv::AsvDriver;
use crate::error::Error;
use crate::state::TeamStateStore;
use crate::streaming::hub::{ConnectionLedger, HubEvent, HubSender};
use crate::streaming::limiter::FrameRateLimiter;
use crate::streaming::messages::{
    CenterPayload, ImageStreamPayload, RudderPayload, TOPIC_CAMERA_READY, TOPIC_IMAGE_STREAM,
    TOPIC_RUDDER_CENTER, TOPIC_RUDDER_COMMAND, TOPIC_TELEMETRY_DATA,
};
use crate::streaming::wire::{read_frame, Frame, Serializer};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared services a viewer session dispatches into
pub struct ViewerContext {
    pub store: Arc<TeamStateStore>,
    pub limiter: FrameRateLimiter,
    pub driver: Arc<AsvDriver>,
    pub hub: HubSender,
    pub battery: Arc<BatterySimulator>,
    pub ledger: ConnectionLedger,
}

impl ViewerContext {
    /// Run disconnect accounting for one viewer, exactly once.
    ///
    /// The alive flag is the guard: whichever side flips it first does
    /// the ledger update and battery notification.
    pub fn teardown(&self, alive: &AtomicBool) {
        if alive.swap(false, Ordering::SeqCst) {
            let count = self.ledger.disconnect();
            self.battery.viewer_disconnected(count);
            log::info!("Viewer disconnected ({} remaining)", count);
        }
    }
}

/// Receive loop for one connected viewer
pub fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ViewerContext>,
    serializer: Serializer,
    alive: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    log::debug!("Viewer session started: {}", peer);

    // Read timeout so shutdown flags are polled between frames
    if let Err(e) = stream.set_read_timeout(Some(std::time::Duration::from_millis(500))) {
        log::warn!("Failed to set read timeout for {}: {}", peer, e);
    }

    loop {
        if !running.load(Ordering::Relaxed) || !alive.load(Ordering::Relaxed) {
            break;
        }

        match read_frame(&mut stream) {
            Ok(Some(frame)) => handle_event(&frame, peer, &ctx, &serializer),
            Ok(None) => {
                // Timeout, poll flags again
            }
            Err(e) => {
                if let Error::Io(ref io_err) = e {
                    if io_err.kind() == std::io::ErrorKind::UnexpectedEof
                        || io_err.kind() == std::io::ErrorKind::ConnectionReset
                    {
                        log::debug!("Viewer {} closed the connection", peer);
                    } else {
                        log::warn!("Read error from viewer {}: {}", peer, e);
                    }
                } else {
                    log::warn!("Bad frame from viewer {}: {}", peer, e);
                }
                break;
            }
        }
    }

    ctx.teardown(&alive);
    let _ = stream.shutdown(Shutdown::Both);
    log::debug!("Viewer session stopped: {}", peer);
}

/// Dispatch one decoded frame from a viewer
fn handle_event(frame: &Frame, peer: SocketAddr, ctx: &ViewerContext, serializer: &Serializer) {
    match frame.topic.as_str() {
        TOPIC_TELEMETRY_DATA => {
            let patch = match serializer.deserialize(&frame.payload) {
                Ok(patch) => patch,
                Err(e) => {
                    log::warn!("Malformed telemetry-data from {}: {}", peer, e);
                    return;
                }
            };
            handle_telemetry_data(patch, ctx);
        }
        TOPIC_IMAGE_STREAM => {
            // Camera publishers run next to the daemon; remote viewers
            // must not inject frames
            if !peer.ip().is_loopback() {
                log::warn!("Rejected image-stream from non-loopback peer {}", peer);
                return;
            }
            let payload = match serializer.deserialize(&frame.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Malformed image-stream from {}: {}", peer, e);
                    return;
                }
            };
            handle_image_stream(payload, ctx);
        }
        TOPIC_CAMERA_READY => {
            if let Err(e) = ctx.driver.ensure_link_open() {
                log::warn!("camera_ready could not open serial link: {}", e);
            }
        }
        TOPIC_RUDDER_CENTER => {
            let payload: CenterPayload = match serializer.deserialize(&frame.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Malformed rudder-center from {}: {}", peer, e);
                    return;
                }
            };
            match payload.center {
                Some(value) => {
                    ctx.driver.send_center(value);
                }
                None => log::debug!("rudder-center without a center value, ignored"),
            }
        }
        TOPIC_RUDDER_COMMAND => {
            let payload: RudderPayload = match serializer.deserialize(&frame.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Malformed rudder-command from {}: {}", peer, e);
                    return;
                }
            };
            match payload.rudder {
                Some(value) => {
                    ctx.driver.send_rudder(value);
                }
                None => log::debug!("rudder-command without a rudder value, ignored"),
            }
        }
        other => log::debug!("Unknown topic from {}: {}", peer, other),
    }
}

fn handle_telemetry_data(patch: crate::core::types::TelemetryPatch, ctx: &ViewerContext) {
    if patch.team_id.is_empty() {
        log::warn!("telemetry-data without teamId, dropped");
        return;
    }
    let record = ctx.store.merge(patch);
    ctx.hub.publish(HubEvent::Telemetry(record));
}

fn handle_image_stream(payload: ImageStreamPayload, ctx: &ViewerContext) {
    let image = match payload.image {
        Some(image) if !image.is_empty() => image,
        _ => {
            log::debug!("image-stream without image bytes, dropped");
            return;
        }
    };
    let team_id = payload
        .team_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_TEAM_ID.to_string());

    if ctx.limiter.admit(&team_id) {
        ctx.hub.publish(HubEvent::Image(ImageFrame { team_id, image }));
    }
}
