//! Connection tracking for the authoritative server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - The per-connection Command Gate
//! - The per-connection snapshot cache used for delta encoding
//! - Each connection's independent sync schedule
//!
//! Participant state itself lives in the game's registry; a connection only
//! carries what is needed to talk to one client.

use crate::delta::ObserverSnapshotCache;
use log::info;
use shared::CommandGate;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client
#[derive(Debug)]
pub struct Connection {
    /// Unique id, shared with the participant record
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Authoritative rate limiter for this client's commands
    pub gate: CommandGate,
    /// What this client was last told about everyone else
    pub snapshot: ObserverSnapshotCache,
    /// When this connection's next state delta is due
    pub next_sync_at: Instant,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            last_seen: now,
            gate: CommandGate::default(),
            snapshot: ObserverSnapshotCache::new(),
            next_sync_at: now,
        }
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
pub struct ClientManager {
    clients: HashMap<u32, Connection>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
    sync_interval: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration, sync_interval: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
            sync_interval,
        }
    }

    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Connection::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client; this also cancels its sync schedule. Returns false if
    /// the client was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            for other in self.clients.values_mut() {
                other.snapshot.forget(*client_id);
            }
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Connection> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Connection> {
        self.clients.get_mut(&client_id)
    }

    /// Refreshes the liveness timestamp.
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|c| c.addr)
    }

    /// Ids of connections whose sync is due at `now`; advances their schedule.
    pub fn take_due_syncs(&mut self, now: Instant) -> Vec<u32> {
        let mut due = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            if client.next_sync_at <= now {
                client.next_sync_at += self.sync_interval;
                // Skip missed intervals instead of bursting to catch up.
                if client.next_sync_at <= now {
                    client.next_sync_at = now + self.sync_interval;
                }
                due.push(*id);
            }
        }
        due.sort_unstable();
        due
    }

    /// Removes clients that have been silent for longer than the timeout and
    /// returns their ids.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
