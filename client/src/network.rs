use crate::game::ClientMirrorState;
use crate::input::{ClientCommand, InputEvent, InputManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{now_secs, ClockTranslator, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    running: bool,

    game_state: ClientMirrorState,
    input_manager: InputManager,

    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(server_addr: &str, fake_ping_ms: u64) -> ClientResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            running: true,
            game_state: ClientMirrorState::new(),
            input_manager: InputManager::new(),
            fake_ping_ms,
        })
    }

    pub fn game_state(&self) -> &ClientMirrorState {
        &self.game_state
    }

    async fn connect(&mut self) -> ClientResult<()> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> ClientResult<()> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_all(&self, packets: Vec<Packet>) {
        for packet in packets {
            if let Err(e) = self.send_packet(&packet).await {
                error!("Error sending {:?}: {}", packet, e);
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Disconnected { reason } => {
                match self.game_state.client_id() {
                    Some(id) => warn!("Client {} disconnected: {}", id, reason),
                    None => warn!("Disconnected: {}", reason),
                }
                self.connected = false;
                self.running = false;
            }

            packet => {
                if let Packet::InitialState { client_id, .. } = &packet {
                    info!("Connected! Client ID: {}", client_id);
                    self.connected = true;
                }
                // Built fresh per message so drift never accumulates.
                let clock = ClockTranslator::at(now_secs());
                self.game_state.apply_server_packet(packet, &clock);
            }
        }
    }

    async fn handle_input(&mut self, event: InputEvent) {
        debug!("Input #{}: {:?}", event.sequence, event.command);
        let packet = match event.command {
            ClientCommand::Quit => {
                self.running = false;
                return;
            }
            _ if !self.connected => {
                warn!("Not connected yet, ignoring input");
                return;
            }
            ClientCommand::SetHealth(value) => Some(Packet::DebugSetHealth { value }),
            ClientCommand::Game(command) => self.game_state.issue(command, now_secs()),
        };

        if let Some(packet) = packet {
            if let Err(e) = self.send_packet(&packet).await {
                error!("Error sending input: {}", e);
            }
        }
    }

    pub async fn run(&mut self) -> ClientResult<()> {
        self.connect().await?;

        let mut frame_interval = interval(FRAME_INTERVAL);
        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut last_frame = Instant::now();

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        info!("{}", InputManager::help());

        while self.running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) => match self.input_manager.parse_line(&line) {
                            Some(event) => self.handle_input(event).await,
                            None => info!("{}", InputManager::help()),
                        },
                        Ok(None) => {
                            debug!("stdin closed");
                            stdin_open = false;
                        }
                        Err(e) => {
                            error!("Error reading stdin: {}", e);
                            stdin_open = false;
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    let dt = last_frame.elapsed().as_secs_f32();
                    last_frame = Instant::now();
                    let packets = self.game_state.update(now_secs(), dt);
                    self.send_all(packets).await;
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                        debug!("{}", self.game_state.summary(now_secs()));
                    }
                },
            }
        }

        if self.connected {
            if let Err(e) = self.send_packet(&Packet::Disconnect).await {
                error!("Error sending disconnect: {}", e);
            }
        }

        Ok(())
    }
}
