//! Connection hub: multiplexes many websocket peers over one pair of queues.
//!
//! ```text
//!                         ┌── lane(A) ──► Connection A ──► peer A
//! Outgoing ──► router ────┼── lane(B) ──► Connection B ──► peer B
//!                         └── miss: counted, logged, dropped
//!
//! peer A ──► Connection A ──► aggregate(A) ──┐
//! peer B ──► Connection B ──► aggregate(B) ──┴──► Incoming
//! ```
//!
//! # Isolation
//!
//! The router never waits on a connection.  Each registered CID has a
//! bounded delivery lane drained by its own task, which performs the
//! (possibly blocking) push onto that connection's bounded outbound queue.
//! A stalled peer backs up only its own lane, and per-CID order is preserved.
//! A peer whose lane overflows is treated as stalled: it is unregistered and
//! its connection closed, so memory stays bounded.
//!
//! # Registry
//!
//! The CID → route map sits behind a `tokio::sync::RwLock`.  Registration
//! and removal take the write lock; routing lookups take the read lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wsbridge_core::{ConnectionId, Envelope};

use crate::application::shutdown::Shutdown;
use crate::domain::Frame;
use crate::infrastructure::connection::Connection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no connection registered for CID {0}")]
    UnknownCid(ConnectionId),

    #[error("envelope has no routable CID")]
    MissingCid,

    #[error("delivery lane for CID {0} overflowed; peer closed as stalled")]
    PeerStalled(ConnectionId),
}

/// The driver-facing ends of the hub's two bridging queues.
pub struct HubQueues {
    /// Envelopes received from peers, tagged with their CID.
    pub incoming: mpsc::Receiver<Envelope>,
    /// Envelopes to route to peers by CID.
    pub outgoing: mpsc::Sender<Envelope>,
}

struct Route {
    connection: Arc<Connection>,
    lane: mpsc::Sender<Frame>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Hub {
    routes: RwLock<HashMap<ConnectionId, Route>>,
    incoming: mpsc::Sender<Envelope>,
    outgoing: Mutex<Option<mpsc::Receiver<Envelope>>>,
    lane_capacity: usize,
    routing_misses: AtomicU64,
    closing: AtomicBool,
    shutdown: Shutdown,
}

impl Hub {
    /// Creates a hub whose `Incoming` and `Outgoing` queues, and every
    /// per-peer delivery lane, hold `capacity` items each.
    pub fn new(capacity: usize, shutdown: Shutdown) -> (Arc<Self>, HubQueues) {
        let (incoming_tx, incoming_rx) = mpsc::channel(capacity.max(1));
        let (outgoing_tx, outgoing_rx) = mpsc::channel(capacity.max(1));
        let hub = Arc::new(Self {
            routes: RwLock::new(HashMap::new()),
            incoming: incoming_tx,
            outgoing: Mutex::new(Some(outgoing_rx)),
            lane_capacity: capacity.max(1),
            routing_misses: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            shutdown,
        });
        let queues = HubQueues {
            incoming: incoming_rx,
            outgoing: outgoing_tx,
        };
        (hub, queues)
    }

    /// Registers a connection and starts its delivery lane and inbound
    /// aggregation.  Returns its CID.
    ///
    /// A connection registered after [`Hub::shutdown`] began is closed
    /// instead.
    pub async fn register(self: &Arc<Self>, connection: Connection) -> ConnectionId {
        let cid = connection.id();
        let connection = Arc::new(connection);

        let mut routes = self.routes.write().await;
        if self.closing.load(Ordering::Acquire) {
            drop(routes);
            debug!(%cid, "hub is closing; rejecting connection");
            connection.close().await;
            return cid;
        }

        let (lane, lane_rx) = mpsc::channel(self.lane_capacity);
        let mut tasks = vec![tokio::spawn(deliver_lane(Arc::clone(&connection), lane_rx))];
        match connection.take_inbound() {
            Some(inbound) => tasks.push(tokio::spawn(Arc::clone(self).aggregate(cid, inbound))),
            None => warn!(%cid, "inbound queue already taken; peer data will not be forwarded"),
        }

        routes.insert(
            cid,
            Route {
                connection,
                lane,
                tasks,
            },
        );
        info!(%cid, active = routes.len(), "connection registered");
        cid
    }

    /// Removes a CID.  Envelopes addressed to it afterwards are routing
    /// misses.  Returns the connection so the caller can close it.
    pub async fn unregister(&self, cid: ConnectionId) -> Option<Arc<Connection>> {
        let mut routes = self.routes.write().await;
        let route = routes.remove(&cid)?;
        info!(%cid, active = routes.len(), "connection unregistered");
        Some(route.connection)
    }

    /// Hands one envelope to its CID's delivery lane.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::MissingCid`] or [`RoutingError::UnknownCid`]
    /// when the envelope cannot be addressed; both count as routing misses.
    /// Returns [`RoutingError::PeerStalled`] when the CID's lane is full, after
    /// retiring that peer.
    pub async fn route(&self, envelope: Envelope) -> Result<(), RoutingError> {
        let Some(cid) = envelope.cid else {
            self.routing_misses.fetch_add(1, Ordering::Relaxed);
            return Err(RoutingError::MissingCid);
        };
        let frame = Frame::from_payload(envelope.payload);

        let sent = {
            let routes = self.routes.read().await;
            routes.get(&cid).map(|route| route.lane.try_send(frame))
        };
        match sent {
            Some(Ok(())) => Ok(()),
            Some(Err(TrySendError::Full(_))) => {
                warn!(%cid, capacity = self.lane_capacity, "delivery lane full; closing stalled peer");
                if let Some(connection) = self.unregister(cid).await {
                    tokio::spawn(async move { connection.close().await });
                }
                Err(RoutingError::PeerStalled(cid))
            }
            Some(Err(TrySendError::Closed(_))) | None => {
                self.routing_misses.fetch_add(1, Ordering::Relaxed);
                Err(RoutingError::UnknownCid(cid))
            }
        }
    }

    /// Consumes `Outgoing` until shutdown, routing each envelope by CID.
    pub async fn run_router(self: Arc<Self>) {
        let taken = self
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut outgoing) = taken else {
            warn!("hub router is already running");
            return;
        };

        loop {
            let next = tokio::select! {
                _ = self.shutdown.triggered() => break,
                next = outgoing.recv() => next,
            };
            let Some(envelope) = next else { break };
            if let Err(e) = self.route(envelope).await {
                warn!("dropping outgoing envelope: {e}");
            }
        }
        debug!("hub router stopped");
    }

    /// Closes every registered connection and joins their tasks.
    pub async fn shutdown(&self, limit: Duration) {
        self.closing.store(true, Ordering::Release);
        let routes: Vec<Route> = self
            .routes
            .write()
            .await
            .drain()
            .map(|(_, route)| route)
            .collect();
        info!("closing {} websocket connection(s)", routes.len());

        let mut tasks = Vec::new();
        let mut connections = Vec::new();
        for Route {
            connection,
            tasks: route_tasks,
            ..
        } in routes
        {
            connections.push(connection);
            tasks.extend(route_tasks);
        }

        join_all(connections.iter().map(|connection| connection.close())).await;

        let deadline = tokio::time::Instant::now() + limit;
        for mut task in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn contains(&self, cid: ConnectionId) -> bool {
        self.routes.read().await.contains_key(&cid)
    }

    /// Envelopes dropped because they had no CID or their CID was not
    /// registered.
    pub fn routing_misses(&self) -> u64 {
        self.routing_misses.load(Ordering::Relaxed)
    }

    /// Drains one connection's inbound queue into `Incoming`, then retires
    /// the connection.
    async fn aggregate(self: Arc<Self>, cid: ConnectionId, mut inbound: mpsc::Receiver<Frame>) {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.triggered() => break,
                next = inbound.recv() => next,
            };
            let Some(frame) = next else { break };
            debug!(%cid, bytes = frame.len(), "frame from peer");

            let envelope = Envelope {
                cid: Some(cid),
                payload: frame.into_payload(),
            };
            let sent = tokio::select! {
                _ = self.shutdown.triggered() => break,
                sent = self.incoming.send(envelope) => sent,
            };
            if sent.is_err() {
                break;
            }
        }

        if let Some(connection) = self.unregister(cid).await {
            connection.close().await;
        }
    }
}

/// Feeds one connection from its lane, in order.
async fn deliver_lane(connection: Arc<Connection>, mut lane: mpsc::Receiver<Frame>) {
    while let Some(frame) = lane.recv().await {
        if let Err(e) = connection.send(frame).await {
            debug!("{e}; discarding lane backlog");
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
