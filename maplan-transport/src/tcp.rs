use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use env_param::EnvParam;
use maplan_message::{AgentId, Message};
use tracing::{debug, warn};

use crate::{Transport, TransportError};

/// Maximal time allowed for the full mesh of TCP connections to come up.
static ESTABLISH_TIMEOUT_MS: EnvParam<u64> = EnvParam::new("MAPLAN_TCP_ESTABLISH_TIMEOUT_MS", "10000");
/// Maximal time to wait for peers to close their write half during shutdown.
static SHUTDOWN_TIMEOUT_MS: EnvParam<u64> = EnvParam::new("MAPLAN_TCP_SHUTDOWN_TIMEOUT_MS", "10000");
/// Delay between retries while a connect attempt's peer isn't listening yet.
static CONNECT_RETRY_MS: EnvParam<u64> = EnvParam::new("MAPLAN_TCP_CONNECT_RETRY_MS", "100");

fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(payload.len() as u32).to_le_bytes())?;
    stream.write_all(payload)?;
    Ok(())
}

/// Reads one length-prefixed frame. `Ok(None)` means the peer closed its
/// write half cleanly (EOF exactly at a frame boundary).
fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut len_buf) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(Some(payload))
}

fn send_greeting(stream: &mut TcpStream, node_id: AgentId) -> std::io::Result<()> {
    stream.write_all(&(node_id as u16).to_le_bytes())
}

fn recv_greeting(stream: &mut TcpStream) -> std::io::Result<AgentId> {
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf) as AgentId)
}

/// TCP transport: one outbound connection per peer (used only for writing)
/// and one inbound connection per peer accepted on our listener (used only
/// for reading). Since accepted sockets arrive in whatever order peers
/// happened to connect, each carries a 2-byte greeting naming its sender so
/// we can route it to the right logical peer (spec §4.F "greeting").
pub struct TcpTransport {
    node_id: AgentId,
    node_size: usize,
    send_socks: Vec<Option<Mutex<TcpStream>>>,
    recv_socks: Vec<Option<TcpStream>>,
    closed_flags: Arc<Vec<AtomicBool>>,
    reader_handles: Vec<thread::JoinHandle<()>>,
    inbox_rx: crossbeam_channel::Receiver<Message>,
}

impl TcpTransport {
    /// `addrs[i]` is the `"host:port"` every agent listens on as agent `i`.
    pub fn connect(node_id: AgentId, addrs: Vec<String>) -> Result<Self, TransportError> {
        let node_size = addrs.len();
        let listener = TcpListener::bind(&addrs[node_id as usize])?;
        let deadline = Instant::now() + Duration::from_millis(ESTABLISH_TIMEOUT_MS.get());

        let peers: Vec<AgentId> = (0..node_size as AgentId).filter(|&i| i != node_id).collect();

        let connector_addrs = addrs.clone();
        let connector_peers = peers.clone();
        let connector = thread::spawn(move || -> std::io::Result<Vec<(AgentId, TcpStream)>> {
            let mut socks = Vec::with_capacity(connector_peers.len());
            for &peer in &connector_peers {
                let mut stream = loop {
                    match TcpStream::connect(&connector_addrs[peer as usize]) {
                        Ok(s) => break s,
                        Err(_) if Instant::now() < deadline => {
                            thread::sleep(Duration::from_millis(CONNECT_RETRY_MS.get()));
                        }
                        Err(e) => return Err(e),
                    }
                };
                stream.set_nodelay(true)?;
                send_greeting(&mut stream, node_id)?;
                socks.push((peer, stream));
            }
            Ok(socks)
        });

        let mut recv_socks: Vec<Option<TcpStream>> = (0..node_size).map(|_| None).collect();
        listener.set_nonblocking(false)?;
        for _ in 0..peers.len() {
            let (mut stream, _) = listener.accept()?;
            let sender = recv_greeting(&mut stream)?;
            recv_socks[sender as usize] = Some(stream);
        }

        let connected = connector
            .join()
            .map_err(|_| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "connector thread panicked",
                ))
            })??;
        let mut send_socks: Vec<Option<Mutex<TcpStream>>> = (0..node_size).map(|_| None).collect();
        for (peer, stream) in connected {
            send_socks[peer as usize] = Some(Mutex::new(stream));
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let closed_flags: Arc<Vec<AtomicBool>> = Arc::new((0..node_size).map(|_| AtomicBool::new(false)).collect());
        // Our own slot has no reader thread to close it; mark it closed up
        // front so `close()`'s all-peers-closed check isn't permanently
        // stuck waiting on ourselves.
        closed_flags[node_id as usize].store(true, Ordering::SeqCst);
        let mut reader_handles = Vec::new();
        for peer in peers {
            let mut stream = recv_socks[peer as usize]
                .as_ref()
                .expect("accepted above")
                .try_clone()?;
            let tx = tx.clone();
            let flags = closed_flags.clone();
            reader_handles.push(thread::spawn(move || loop {
                match read_frame(&mut stream) {
                    Ok(Some(payload)) => match Message::decode(&payload) {
                        Ok(msg) => {
                            if tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(?e, peer, "dropping malformed message");
                        }
                    },
                    Ok(None) => {
                        debug!(peer, "peer closed its write half");
                        flags[peer as usize].store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        warn!(?e, peer, "read error, treating peer as closed");
                        flags[peer as usize].store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }));
        }

        Ok(TcpTransport {
            node_id,
            node_size,
            send_socks,
            recv_socks,
            closed_flags,
            reader_handles,
            inbox_rx: rx,
        })
    }
}

impl Transport for TcpTransport {
    fn node_id(&self) -> AgentId {
        self.node_id
    }

    fn node_size(&self) -> usize {
        self.node_size
    }

    fn send(&self, to: AgentId, msg: Message) -> Result<(), TransportError> {
        let sock = self
            .send_socks
            .get(to as usize)
            .and_then(|s| s.as_ref())
            .ok_or(TransportError::UnknownPeer(to))?;
        let mut sock = sock.lock().expect("send socket mutex poisoned");
        write_frame(&mut sock, &msg.encode())?;
        Ok(())
    }

    fn recv(&self) -> Result<Message, TransportError> {
        self.inbox_rx.recv().map_err(|_| TransportError::Closed)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Message, TransportError> {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(m) => Ok(m),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(TransportError::TimedOut),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        for sock in self.send_socks.iter().flatten() {
            let sock = sock.lock().expect("send socket mutex poisoned");
            let _ = sock.shutdown(Shutdown::Write);
        }

        let deadline = Instant::now() + Duration::from_millis(SHUTDOWN_TIMEOUT_MS.get());
        while Instant::now() < deadline {
            if self.closed_flags.iter().all(|f| f.load(Ordering::SeqCst)) {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        for sock in self.recv_socks.iter().flatten() {
            let _ = sock.shutdown(Shutdown::Both);
        }
        for handle in self.reader_handles.drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }
}
