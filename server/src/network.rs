//! Match context and the UDP ingress/egress loops

use crate::config::MatchConfig;
use crate::error::EngineError;
use crate::game::MatchState;
use log::{debug, error, info, warn};
use photon_shared::{decode, encode_ack, encode_control, HitEvent, MAX_DATAGRAM, STOP_CODE};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::time::{sleep, timeout};

/// The remote generator expects the stop code this many times.
pub const STOP_REPEAT: usize = 3;

/// Socket pair owned by a running match
pub(crate) struct Sockets {
    pub recv: Arc<UdpSocket>,
    pub send: Arc<UdpSocket>,
}

impl Sockets {
    /// Binds the hit listener on `bind_addr` and an ephemeral sender able to
    /// reach `destination`.
    pub async fn bind(bind_addr: SocketAddr, destination: SocketAddr) -> Result<Self, EngineError> {
        let recv = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| EngineError::Bind {
                addr: bind_addr,
                source,
            })?;

        let send_addr = match destination.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let send = UdpSocket::bind(send_addr)
            .await
            .map_err(|source| EngineError::Bind {
                addr: send_addr,
                source,
            })?;
        if let Err(e) = send.set_broadcast(true) {
            warn!("Could not enable broadcast on send socket: {}", e);
        }

        info!("Listening for hits on {:?}", recv.local_addr());

        Ok(Self {
            recv: Arc::new(recv),
            send: Arc::new(send),
        })
    }
}

/// State shared by the controller and every background task of a match
pub(crate) struct MatchContext {
    pub config: MatchConfig,
    pub state: RwLock<MatchState>,
    destination: RwLock<SocketAddr>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    running: watch::Sender<bool>,
    sockets: Mutex<Option<Sockets>>,
}

impl MatchContext {
    pub fn new(config: MatchConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (running, _) = watch::channel(false);

        Self {
            state: RwLock::new(MatchState::new(config.duration)),
            destination: RwLock::new(config.destination),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
            running,
            sockets: Mutex::new(None),
            config,
        }
    }

    /// Queues a line for the egress loop
    pub fn enqueue(&self, line: String) {
        if let Err(e) = self.outbound_tx.send(line) {
            error!("Failed to queue outbound message: {}", e);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub fn set_running(&self, running: bool) {
        self.running.send_replace(running);
    }

    pub async fn destination(&self) -> SocketAddr {
        *self.destination.read().await
    }

    pub async fn set_destination(&self, destination: SocketAddr) {
        *self.destination.write().await = destination;
    }

    pub async fn install_sockets(&self, sockets: Sockets) {
        *self.sockets.lock().await = Some(sockets);
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.sockets
            .lock()
            .await
            .as_ref()
            .and_then(|sockets| sockets.recv.local_addr().ok())
    }

    /// Runs the stop sequence once per match
    ///
    /// Queues the stop code `STOP_REPEAT` times, marks the match stopped,
    /// signals the loops, waits the stop grace and releases the sockets.
    /// Returns false if the match was not running, which makes concurrent
    /// callers (an external stop racing the clock) safe.
    pub async fn finish_match(&self) -> bool {
        {
            let mut state = self.state.write().await;
            if !state.is_running() {
                return false;
            }
            for _ in 0..STOP_REPEAT {
                self.enqueue(encode_control(STOP_CODE));
            }
            state.finish();
        }

        self.set_running(false);
        sleep(self.config.stop_grace).await;

        // Loops still holding a handle keep their socket until they exit.
        if self.sockets.lock().await.take().is_some() {
            info!("Match sockets released");
        }
        true
    }

    #[cfg(test)]
    pub async fn outbound_queue(
        &self,
    ) -> tokio::sync::MutexGuard<'_, mpsc::UnboundedReceiver<String>> {
        self.outbound_rx.lock().await
    }

    /// Decodes one datagram; returns false once the event queue is gone
    fn handle_datagram(
        &self,
        data: &[u8],
        addr: SocketAddr,
        events: &mpsc::UnboundedSender<HitEvent>,
    ) -> bool {
        match decode(data) {
            Ok(event) => {
                debug!("Hit {} from {}", event, addr);
                if events.send(event).is_err() {
                    error!("Event queue closed, dropping hit from {}", addr);
                    return false;
                }
            }
            Err(e) => {
                // Answer anyway so the sender does not wait on us.
                warn!("Discarding datagram from {}: {}", addr, e);
                self.enqueue(encode_ack(None));
            }
        }
        true
    }

    async fn transmit(&self, socket: &UdpSocket, line: &str) {
        let destination = self.destination().await;
        match socket.send_to(line.as_bytes(), destination).await {
            Ok(_) => debug!("Sent {:?} to {}", line, destination),
            Err(e) => error!("Failed to send {:?} to {}: {}", line, destination, e),
        }
    }
}

/// Receives hit datagrams until the match stops
///
/// Each receive is bounded by `recv_timeout` so the loop keeps observing
/// the running flag even when the wire is quiet.
pub(crate) async fn run_ingress(
    ctx: Arc<MatchContext>,
    socket: Arc<UdpSocket>,
    events: mpsc::UnboundedSender<HitEvent>,
    mut running: watch::Receiver<bool>,
) {
    let mut buffer = [0u8; MAX_DATAGRAM];

    while *running.borrow() {
        tokio::select! {
            changed = running.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            received = timeout(ctx.config.recv_timeout, socket.recv_from(&mut buffer)) => {
                match received {
                    Err(_) => continue,
                    Ok(Ok((len, addr))) => {
                        if !ctx.handle_datagram(&buffer[..len], addr, &events) {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        if !*running.borrow() {
                            break;
                        }
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    }

    debug!("Hit listener stopped");
}

/// Sends queued lines to the current destination
///
/// Keeps draining after the running flag clears and only returns once the
/// flag is clear and the queue is empty, so final acknowledgements and stop
/// codes still go out.
pub(crate) async fn run_egress(
    ctx: Arc<MatchContext>,
    socket: Arc<UdpSocket>,
    running: watch::Receiver<bool>,
) {
    let mut queue = ctx.outbound_rx.lock().await;

    loop {
        match timeout(ctx.config.send_timeout, queue.recv()).await {
            Ok(Some(line)) => ctx.transmit(&socket, &line).await,
            Ok(None) => break,
            Err(_) => {
                if !*running.borrow() {
                    while let Ok(line) = queue.try_recv() {
                        ctx.transmit(&socket, &line).await;
                    }
                    break;
                }
            }
        }
    }

    debug!("Sender stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Phase;

    fn test_config() -> MatchConfig {
        MatchConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            destination: "127.0.0.1:9".parse().unwrap(),
            stop_grace: Duration::from_millis(10),
            recv_timeout: Duration::from_millis(100),
            send_timeout: Duration::from_millis(50),
            ..MatchConfig::default()
        }
    }

    async fn drain_outbound(ctx: &MatchContext) -> Vec<String> {
        let mut queue = ctx.outbound_queue().await;
        let mut lines = Vec::new();
        while let Ok(line) = queue.try_recv() {
            lines.push(line);
        }
        lines
    }

    async fn recv_line(socket: &UdpSocket) -> String {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    #[tokio::test]
    async fn test_finish_match_queues_three_stop_codes() {
        let ctx = MatchContext::new(test_config());
        ctx.state.write().await.begin();
        ctx.set_running(true);

        assert!(ctx.finish_match().await);

        assert_eq!(drain_outbound(&ctx).await, vec!["221", "221", "221"]);
        assert_eq!(ctx.state.read().await.phase(), Phase::Stopped);
        assert!(!*ctx.subscribe().borrow());
    }

    #[tokio::test]
    async fn test_finish_match_is_idempotent() {
        let ctx = MatchContext::new(test_config());
        assert!(!ctx.finish_match().await);

        ctx.state.write().await.begin();
        assert!(ctx.finish_match().await);
        assert!(!ctx.finish_match().await);

        assert_eq!(drain_outbound(&ctx).await.len(), STOP_REPEAT);
    }

    #[tokio::test]
    async fn test_handle_datagram_acks_garbage() {
        let ctx = MatchContext::new(test_config());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let addr = "127.0.0.1:7501".parse().unwrap();

        assert!(ctx.handle_datagram(b"garbage", addr, &events_tx));
        assert!(ctx.handle_datagram(b"", addr, &events_tx));
        assert!(ctx.handle_datagram(b"hw01:hw02", addr, &events_tx));

        assert_eq!(drain_outbound(&ctx).await, vec!["OK", "OK"]);
        assert_eq!(events_rx.try_recv().unwrap(), HitEvent::new("hw01", "hw02"));
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_datagram_reports_closed_queue() {
        let ctx = MatchContext::new(test_config());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);

        let addr = "127.0.0.1:7501".parse().unwrap();
        assert!(!ctx.handle_datagram(b"hw01:hw02", addr, &events_tx));
    }

    #[tokio::test]
    async fn test_ingress_queues_events_in_arrival_order() {
        let ctx = Arc::new(MatchContext::new(test_config()));
        let sockets = Sockets::bind(ctx.config.bind_addr, ctx.config.destination)
            .await
            .unwrap();
        let listen_addr = sockets.recv.local_addr().unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        ctx.set_running(true);
        let handle = tokio::spawn(run_ingress(
            Arc::clone(&ctx),
            Arc::clone(&sockets.recv),
            events_tx,
            ctx.subscribe(),
        ));

        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        device.send_to(b"hw01:hw02", listen_addr).await.unwrap();
        device.send_to(b"hw03 : 43", listen_addr).await.unwrap();

        let first = timeout(Duration::from_secs(2), events_rx.recv()).await.unwrap();
        let second = timeout(Duration::from_secs(2), events_rx.recv()).await.unwrap();
        assert_eq!(first, Some(HitEvent::new("hw01", "hw02")));
        assert_eq!(second, Some(HitEvent::new("hw03", "43")));

        ctx.set_running(false);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_egress_drains_queue_after_stop() {
        let generator = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = MatchConfig {
            destination: generator.local_addr().unwrap(),
            ..test_config()
        };
        let ctx = Arc::new(MatchContext::new(config));
        let sockets = Sockets::bind(ctx.config.bind_addr, ctx.config.destination)
            .await
            .unwrap();

        ctx.enqueue("first".to_string());
        ctx.enqueue("second".to_string());
        ctx.enqueue("third".to_string());

        // The flag is already clear; queued lines must still be sent.
        let handle = tokio::spawn(run_egress(
            Arc::clone(&ctx),
            Arc::clone(&sockets.send),
            ctx.subscribe(),
        ));

        assert_eq!(recv_line(&generator).await, "first");
        assert_eq!(recv_line(&generator).await, "second");
        assert_eq!(recv_line(&generator).await, "third");

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("sender did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_egress_follows_destination_changes() {
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = MatchConfig {
            destination: first.local_addr().unwrap(),
            ..test_config()
        };
        let ctx = Arc::new(MatchContext::new(config));
        let sockets = Sockets::bind(ctx.config.bind_addr, ctx.config.destination)
            .await
            .unwrap();

        ctx.set_running(true);
        let handle = tokio::spawn(run_egress(
            Arc::clone(&ctx),
            Arc::clone(&sockets.send),
            ctx.subscribe(),
        ));

        ctx.enqueue("one".to_string());
        assert_eq!(recv_line(&first).await, "one");

        ctx.set_destination(second.local_addr().unwrap()).await;
        ctx.enqueue("two".to_string());
        assert_eq!(recv_line(&second).await, "two");

        ctx.set_running(false);
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result = Sockets::bind(addr, "127.0.0.1:9".parse().unwrap()).await;

        match result {
            Err(EngineError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Bound an address that is already in use"),
        }
    }
}
