//! Broadcast hub for dashboard viewers
//!
//! A dedicated publisher thread owns the TCP listener. Ingestion paths
//! push events onto a lock-free queue; the publisher drains it in
//! batches and fans each event out to every connected viewer. A new
//! viewer receives a full state snapshot before it joins the broadcast
//! set, so it never observes a live update for a team it has not seen.

use crate::error::Result;
use crate::streaming::messages::{
    image_topic, TimeUpdate, TOPIC_REAL_TIME_UPDATE, TOPIC_TIME_UPDATE,
};
use crate::streaming::session::{run_session, ViewerContext};
use crate::streaming::wire::{encode_frame, Serializer};
use crate::core::types::{geotime_now, ImageFrame, TelemetryRecord};
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Queue depth for broadcast events. Telemetry arrives at a few Hz and
/// images are rate limited, so this is minutes of headroom.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Maximum events drained per loop iteration
const EVENT_BATCH_LIMIT: usize = 50;

/// One broadcastable event
#[derive(Debug, Clone)]
pub enum HubEvent {
    Telemetry(TelemetryRecord),
    Image(ImageFrame),
}

/// Handle for pushing events into the hub queue.
///
/// `publish` never blocks; when the queue is full the event is dropped
/// and counted, favoring fresh data over backlog.
#[derive(Clone)]
pub struct HubSender {
    queue: Arc<ArrayQueue<HubEvent>>,
}

impl HubSender {
    pub fn new(queue: Arc<ArrayQueue<HubEvent>>) -> Self {
        Self { queue }
    }

    /// Create the shared event queue at the default capacity
    pub fn new_queue() -> Arc<ArrayQueue<HubEvent>> {
        Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY))
    }

    pub fn publish(&self, event: HubEvent) {
        if self.queue.push(event).is_err() {
            warn!("Event queue full, dropping event");
        }
    }
}

/// Connected-viewer counter shared between the hub and sessions
#[derive(Default)]
pub struct ConnectionLedger {
    viewers: AtomicUsize,
}

impl ConnectionLedger {
    /// Record a connect, returning the new viewer count
    pub fn connect(&self) -> usize {
        self.viewers.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a disconnect, returning the new viewer count
    pub fn disconnect(&self) -> usize {
        self.viewers.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn viewers(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }
}

struct ViewerHandle {
    stream: TcpStream,
    alive: Arc<AtomicBool>,
    addr: SocketAddr,
}

/// TCP broadcast hub
pub struct BroadcastHub {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    publisher_thread: Option<JoinHandle<()>>,
}

impl BroadcastHub {
    /// Bind the listener and start the publisher thread
    pub fn start(
        bind_address: &str,
        serializer: Serializer,
        ctx: Arc<ViewerContext>,
        queue: Arc<ArrayQueue<HubEvent>>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let publisher_thread = thread::Builder::new()
            .name("hub-publisher".to_string())
            .spawn(move || {
                Self::publisher_loop(listener, serializer, ctx, queue, shutdown_clone);
            })?;

        info!("Broadcast hub listening on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown,
            publisher_thread: Some(publisher_thread),
        })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Request publisher shutdown
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn publisher_loop(
        listener: TcpListener,
        serializer: Serializer,
        ctx: Arc<ViewerContext>,
        queue: Arc<ArrayQueue<HubEvent>>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut viewers: Vec<ViewerHandle> = Vec::new();
        let mut frame_buffer = Vec::with_capacity(4096);
        let mut last_tick = Instant::now();
        let mut broadcast_count = 0u64;

        while !shutdown.load(Ordering::Relaxed) {
            // Accept new viewers (non-blocking)
            match listener.accept() {
                Ok((stream, addr)) => {
                    Self::admit_viewer(
                        stream,
                        addr,
                        &serializer,
                        &ctx,
                        &shutdown,
                        &mut viewers,
                        &mut frame_buffer,
                    );
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No new connections
                }
                Err(e) => {
                    error!("Error accepting viewer connection: {}", e);
                }
            }

            // Drop viewers whose session thread already tore them down
            viewers.retain(|viewer| viewer.alive.load(Ordering::Relaxed));

            // 1Hz wall-clock heartbeat
            if last_tick.elapsed() >= Duration::from_secs(1) {
                last_tick = Instant::now();
                let tick = TimeUpdate {
                    geotime: geotime_now(),
                };
                match serializer.serialize(&tick) {
                    Ok(payload) => Self::broadcast(
                        &mut viewers,
                        &ctx,
                        TOPIC_TIME_UPDATE,
                        &payload,
                        &mut frame_buffer,
                    ),
                    Err(e) => debug!("Failed to serialize time update: {}", e),
                }
            }

            // Batch drain broadcast events
            let mut batch = 0;
            while let Some(event) = queue.pop() {
                let (topic, payload) = match &event {
                    HubEvent::Telemetry(record) => {
                        (TOPIC_REAL_TIME_UPDATE.to_string(), serializer.serialize(record))
                    }
                    HubEvent::Image(frame) => {
                        (image_topic(&frame.team_id), serializer.serialize(frame))
                    }
                };
                match payload {
                    Ok(payload) => {
                        Self::broadcast(&mut viewers, &ctx, &topic, &payload, &mut frame_buffer);
                        broadcast_count += 1;
                        if broadcast_count % 1000 == 0 {
                            debug!("Broadcast {} events", broadcast_count);
                        }
                    }
                    Err(e) => debug!("Failed to serialize event: {}", e),
                }

                batch += 1;
                if batch >= EVENT_BATCH_LIMIT {
                    break; // Limit batch size to keep accepts responsive
                }
            }

            if queue.is_empty() {
                thread::sleep(Duration::from_millis(10));
            }
        }

        // Shutdown: tear down remaining viewers
        for viewer in &viewers {
            ctx.teardown(&viewer.alive);
            let _ = viewer.stream.shutdown(Shutdown::Both);
        }
        info!("Broadcast hub stopped ({} events broadcast)", broadcast_count);
    }

    /// Register a viewer: account the connection, replay the snapshot,
    /// then spawn its receive session and add it to the broadcast set.
    fn admit_viewer(
        mut stream: TcpStream,
        addr: SocketAddr,
        serializer: &Serializer,
        ctx: &Arc<ViewerContext>,
        shutdown: &Arc<AtomicBool>,
        viewers: &mut Vec<ViewerHandle>,
        frame_buffer: &mut Vec<u8>,
    ) {
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Failed to set blocking mode for viewer {}: {}", addr, e);
            return;
        }

        let count = ctx.ledger.connect();
        ctx.battery.viewer_connected(count);
        info!("Viewer connected: {} ({} total)", addr, count);

        let alive = Arc::new(AtomicBool::new(true));

        // Snapshot replay happens before the viewer joins the broadcast
        // set, so no live event can be observed ahead of its record.
        for (_, record) in ctx.store.snapshot() {
            let payload = match serializer.serialize(&record) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!("Failed to serialize snapshot record: {}", e);
                    continue;
                }
            };
            encode_frame(TOPIC_REAL_TIME_UPDATE, &payload, frame_buffer);
            if let Err(e) = stream.write_all(frame_buffer) {
                debug!("Viewer {} dropped during snapshot replay: {}", addr, e);
                ctx.teardown(&alive);
                let _ = stream.shutdown(Shutdown::Both);
                return;
            }
        }

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                error!("Failed to clone viewer stream {}: {}", addr, e);
                ctx.teardown(&alive);
                let _ = stream.shutdown(Shutdown::Both);
                return;
            }
        };

        let session_ctx = Arc::clone(ctx);
        let session_serializer = serializer.clone();
        let session_alive = Arc::clone(&alive);
        let session_shutdown = Arc::clone(shutdown);
        let spawn_result = thread::Builder::new()
            .name("viewer-session".to_string())
            .spawn(move || {
                run_session(
                    reader,
                    addr,
                    session_ctx,
                    session_serializer,
                    session_alive,
                    session_shutdown,
                );
            });

        match spawn_result {
            Ok(_) => viewers.push(ViewerHandle {
                stream,
                alive,
                addr,
            }),
            Err(e) => {
                error!("Failed to spawn viewer session for {}: {}", addr, e);
                ctx.teardown(&alive);
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    /// Send one framed event to every viewer, dropping dead ones
    fn broadcast(
        viewers: &mut Vec<ViewerHandle>,
        ctx: &Arc<ViewerContext>,
        topic: &str,
        payload: &[u8],
        frame_buffer: &mut Vec<u8>,
    ) {
        encode_frame(topic, payload, frame_buffer);
        viewers.retain_mut(|viewer| match viewer.stream.write_all(frame_buffer) {
            Ok(_) => true,
            Err(e) => {
                debug!("Viewer {} disconnected: {}", viewer.addr, e);
                ctx.teardown(&viewer.alive);
                let _ = viewer.stream.shutdown(Shutdown::Both);
                false
            }
        });
    }
}

impl Drop for BroadcastHub {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.publisher_thread.take() {
            let _ = thread.join();
        }
    }
}
