//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::{GameState, Outgoing};
use crate::ServerConfig;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{now_secs, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let clients = ClientManager::new(
            config.max_clients,
            config.client_timeout,
            config.sync_interval,
        );

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(clients)),
            game_state: GameState::new(config.map_seed),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Address actually bound, useful when binding to port 0.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the once-a-second liveness sweep
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> ServerResult<()> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Hands the game's outgoing packets to the sender task.
    async fn route(&self, outgoing: Vec<Outgoing>) {
        for message in outgoing {
            match message {
                Outgoing::ToClient { client_id, packet } => {
                    let addr = {
                        let clients = self.clients.read().await;
                        clients.addr_of(client_id)
                    };
                    match addr {
                        Some(addr) => self.send_packet(packet, addr),
                        None => debug!("Dropping packet for departed client {}", client_id),
                    }
                }
                Outgoing::Broadcast { packet, exclude } => self.broadcast_packet(packet, exclude),
            }
        }
    }

    async fn disconnect_client(&mut self, client_id: u32) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        let outgoing = self.game_state.remove_participant(client_id);
        self.route(outgoing).await;
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!(
                "Rejecting {}: client version {} != {}",
                addr, client_version, PROTOCOL_VERSION
            );
            self.send_packet(
                Packet::Disconnected {
                    reason: format!("Unsupported client version {}", client_version),
                },
                addr,
            );
            return;
        }

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.disconnect_client(existing_id).await;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };
        let Some(client_id) = client_id else {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        match self.game_state.add_participant(client_id) {
            Some(outgoing) => self.route(outgoing).await,
            None => {
                warn!("No free spawn cell for client {}", client_id);
                {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
                self.send_packet(
                    Packet::Disconnected {
                        reason: "No free spawn cell".to_string(),
                    },
                    addr,
                );
            }
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let id = clients.find_client_by_addr(addr);
            if let Some(id) = id {
                clients.touch(id);
            }
            id
        };
        let Some(client_id) = client_id else {
            debug!("Ignoring packet from unknown address {}", addr);
            return;
        };

        let now = now_secs();
        let outgoing = match packet {
            Packet::Move { direction } => {
                let dashing = self
                    .game_state
                    .participant(client_id)
                    .map(|p| p.is_dashing(now))
                    .unwrap_or(false);
                let admitted = {
                    let mut clients = self.clients.write().await;
                    match clients.get_mut(client_id) {
                        Some(conn) => conn.gate.check_move(now, dashing),
                        None => return,
                    }
                };
                match admitted {
                    Ok(()) => self.game_state.handle_move(client_id, direction, now),
                    Err(e) => {
                        debug!("Move from {} dropped by gate: {}", client_id, e);
                        self.game_state.reject_rate_limited(client_id)
                    }
                }
            }

            Packet::Dash { direction } => {
                let admitted = {
                    let mut clients = self.clients.write().await;
                    match clients.get_mut(client_id) {
                        Some(conn) => conn.gate.check_dash(now),
                        None => return,
                    }
                };
                match admitted {
                    Ok(()) => self.game_state.handle_dash(client_id, direction, now),
                    Err(e) => {
                        debug!("Dash from {} dropped by gate: {}", client_id, e);
                        self.game_state.reject_dash_rate_limited(client_id)
                    }
                }
            }

            Packet::CastHeal => self.game_state.handle_cast(client_id, now),

            Packet::DebugSetHealth { value } => {
                self.game_state.debug_set_health(client_id, value, now)
            }

            Packet::Heartbeat => Vec::new(),

            Packet::Disconnect => {
                self.disconnect_client(client_id).await;
                Vec::new()
            }

            other => {
                warn!("Unexpected packet {:?} from client at {}", other, addr);
                Vec::new()
            }
        };

        self.route(outgoing).await;
    }

    /// Sends a `StateDelta` to every connection whose sync is due.
    async fn sync_observers(&mut self, now: f64) {
        let mut clients = self.clients.write().await;
        for observer_id in clients.take_due_syncs(Instant::now()) {
            let Some(conn) = clients.get_mut(observer_id) else {
                continue;
            };
            let deltas = conn
                .snapshot
                .encode(observer_id, self.game_state.registry().iter(), now);
            if deltas.is_empty() {
                continue;
            }
            let addr = conn.addr;
            self.send_packet(Packet::StateDelta { deltas }, addr);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> ServerResult<()> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            let outgoing = self.game_state.remove_participant(client_id);
                            self.route(outgoing).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = now_secs();
                    let outgoing = self.game_state.update(now);
                    self.route(outgoing).await;
                    self.sync_observers(now).await;

                    if self.game_state.tick % 1000 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} pending events",
                                self.game_state.tick,
                                client_count,
                                self.game_state.pending_events()
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
