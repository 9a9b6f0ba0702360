pub mod protocol;
pub mod types;

pub use types::*;

use anyhow::{bail, Result};
use arpose_config::NetConfig;
use protocol::{Frame, FrameParser};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Socket read size. Camera frames span many reads.
const READ_CHUNK: usize = 64 * 1024;

/// Source of per-frame pose and plane readings.
///
/// Every method is non-blocking: a fetch that has nothing new returns `None`
/// and the caller tries again on its next tick.
pub trait PoseSource {
    /// Start connecting. Returns immediately.
    fn connect(&mut self) -> Result<()>;
    /// Current link status.
    fn link_state(&mut self) -> LinkState;
    /// Latest camera reading received since the previous call.
    fn try_camera(&mut self) -> Option<CameraReading>;
    /// Latest plane reading received since the previous call.
    fn try_plane(&mut self) -> Option<PlaneReading>;
    /// Forget any plane reading received or requested so far.
    fn discard_plane(&mut self);
}

/// Messages from the link task to the client.
#[derive(Debug)]
enum LinkEvent {
    State(LinkState),
    Camera(CameraReading),
    Plane(PlaneReading),
    /// The server answered with nothing usable for this kind.
    NoData(MessageKind),
}

struct LinkChannels {
    request_tx: mpsc::UnboundedSender<MessageKind>,
    event_rx: mpsc::UnboundedReceiver<LinkEvent>,
    task: tokio::task::JoinHandle<()>,
}

/// Client for the vision server.
///
/// Socket I/O runs on a background task. Requests go out over one channel and
/// decoded readings come back over another, so callers never wait on the network.
pub struct PoseClient {
    config: NetConfig,
    runtime: Handle,
    link: LinkState,
    channels: Option<LinkChannels>,
    camera_pending: bool,
    plane_pending: bool,
    /// The outstanding plane reply was discarded before it arrived.
    plane_stale: bool,
    camera: Option<CameraReading>,
    plane: Option<PlaneReading>,
}

impl PoseClient {
    /// Create an unconnected client. The link task is spawned on `runtime`
    /// when `connect` is called.
    pub fn new(config: NetConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            link: LinkState::Idle,
            channels: None,
            camera_pending: false,
            plane_pending: false,
            plane_stale: false,
            camera: None,
            plane: None,
        }
    }

    /// Whether the server is currently connected (non-blocking).
    pub fn is_connected(&mut self) -> bool {
        self.poll();
        self.link == LinkState::Connected
    }

    /// Queue a request unless one of the same kind is already outstanding.
    pub fn request(&mut self, kind: MessageKind) {
        if self.link != LinkState::Connected {
            return;
        }
        let Some(channels) = &self.channels else {
            return;
        };
        let pending = match kind {
            MessageKind::Camera => &mut self.camera_pending,
            MessageKind::Plane => &mut self.plane_pending,
        };
        if *pending {
            return;
        }
        if channels.request_tx.send(kind).is_ok() {
            *pending = true;
        } else {
            debug!(?kind, "Link task gone, request dropped");
        }
    }

    /// Drain everything the link task has delivered so far.
    pub fn poll(&mut self) {
        let Some(channels) = &mut self.channels else {
            return;
        };
        while let Ok(event) = channels.event_rx.try_recv() {
            match event {
                LinkEvent::State(state) => {
                    if state != LinkState::Connected {
                        self.camera_pending = false;
                        self.plane_pending = false;
                        self.plane_stale = false;
                    }
                    self.link = state;
                }
                LinkEvent::Camera(reading) => {
                    self.camera_pending = false;
                    self.camera = Some(reading);
                }
                LinkEvent::Plane(reading) => {
                    self.plane_pending = false;
                    if std::mem::take(&mut self.plane_stale) {
                        trace!("Dropping discarded plane reply");
                    } else {
                        self.plane = Some(reading);
                    }
                }
                LinkEvent::NoData(MessageKind::Camera) => self.camera_pending = false,
                LinkEvent::NoData(MessageKind::Plane) => {
                    self.plane_pending = false;
                    self.plane_stale = false;
                }
            }
        }
    }
}

impl PoseSource for PoseClient {
    fn connect(&mut self) -> Result<()> {
        if self.channels.is_some() {
            return Ok(());
        }
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = self
            .runtime
            .spawn(link_loop(self.config.clone(), request_rx, event_tx));

        self.link = LinkState::Connecting;
        self.channels = Some(LinkChannels {
            request_tx,
            event_rx,
            task,
        });
        Ok(())
    }

    fn link_state(&mut self) -> LinkState {
        self.poll();
        self.link.clone()
    }

    fn try_camera(&mut self) -> Option<CameraReading> {
        self.poll();
        let reading = self.camera.take();
        self.request(MessageKind::Camera);
        reading
    }

    fn try_plane(&mut self) -> Option<PlaneReading> {
        self.poll();
        let reading = self.plane.take();
        self.request(MessageKind::Plane);
        reading
    }

    fn discard_plane(&mut self) {
        self.poll();
        self.plane = None;
        self.plane_stale = self.plane_pending;
    }
}

impl Drop for PoseClient {
    fn drop(&mut self) {
        if let Some(channels) = &self.channels {
            channels.task.abort();
        }
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// The client dropped its request channel.
    Shutdown,
    PeerClosed,
}

/// Background task: connect, serve requests, reconnect when the peer drops.
async fn link_loop(
    config: NetConfig,
    mut request_rx: mpsc::UnboundedReceiver<MessageKind>,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        let _ = event_tx.send(LinkEvent::State(LinkState::Connecting));

        let stream = match connect_with_retry(&config).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(?e, "Giving up on vision server");
                let _ = event_tx.send(LinkEvent::State(LinkState::Failed(e.to_string())));
                return;
            }
        };

        // Requests queued while disconnected refer to a dead session.
        while request_rx.try_recv().is_ok() {}
        let _ = event_tx.send(LinkEvent::State(LinkState::Connected));

        match serve(stream, &mut request_rx, &event_tx).await {
            Ok(SessionEnd::Shutdown) => {
                debug!("Pose client dropped, link task exiting");
                return;
            }
            Ok(SessionEnd::PeerClosed) => warn!("Vision server closed the connection"),
            Err(e) => warn!(?e, "Vision server link error"),
        }
        let _ = event_tx.send(LinkEvent::State(LinkState::Disconnected));
    }
}

/// Keep trying to reach the server until it accepts or the timeout elapses.
async fn connect_with_retry(config: &NetConfig) -> Result<TcpStream> {
    let addr = config.addr();
    let retry = Duration::from_millis(config.retry_interval_ms.max(1));
    let timeout = config.connect_timeout_secs.map(Duration::from_secs);
    let started = Instant::now();
    let mut attempts: u64 = 0;

    info!(%addr, ?timeout, "Connecting to vision server");
    loop {
        attempts += 1;
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                info!(%addr, attempts, "Connected to vision server");
                return Ok(stream);
            }
            Err(e) => {
                if attempts % 20 == 1 {
                    debug!(%addr, attempts, error = %e, "Vision server not reachable yet");
                }
                if let Some(limit) = timeout {
                    if started.elapsed() >= limit {
                        bail!("No vision server at {addr} after {attempts} attempts: {e}");
                    }
                }
                tokio::time::sleep(retry).await;
            }
        }
    }
}

/// Serve one connected session: write queued requests, read and decode responses.
async fn serve(
    stream: TcpStream,
    request_rx: &mut mpsc::UnboundedReceiver<MessageKind>,
    event_tx: &mpsc::UnboundedSender<LinkEvent>,
) -> Result<SessionEnd> {
    let (mut reader, mut writer) = stream.into_split();
    let mut parser = FrameParser::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            request = request_rx.recv() => {
                let Some(kind) = request else {
                    return Ok(SessionEnd::Shutdown);
                };
                trace!(?kind, "Sending request");
                writer.write_all(&protocol::encode_request(kind)).await?;
            }
            result = reader.read(&mut buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(SessionEnd::PeerClosed);
                }
                parser.push_data(&buf[..n]);

                while let Some(frame) = parser.next_frame() {
                    // A framing error means the byte stream is out of sync.
                    let frame = frame?;
                    let _ = event_tx.send(decode_frame(frame));
                }
            }
        }
    }
}

/// Turn a response frame into an event. The frame is consumed here, so its
/// payload is released as soon as the decoded values are copied out.
fn decode_frame(frame: Frame) -> LinkEvent {
    let kind = frame.kind;
    if frame.payload.is_empty() {
        trace!(?kind, "No new data");
        return LinkEvent::NoData(kind);
    }

    let decoded = match kind {
        MessageKind::Camera => protocol::decode_camera(&frame.payload).map(LinkEvent::Camera),
        MessageKind::Plane => protocol::decode_plane(&frame.payload).map(LinkEvent::Plane),
    };
    match decoded {
        Ok(event) => {
            trace!(?kind, len = frame.payload.len(), "Received response");
            event
        }
        Err(e) => {
            warn!(?e, "Discarding malformed response");
            LinkEvent::NoData(kind)
        }
    }
}
