use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::broker::{Broker, Outbound, RelayPolicy};
use crate::signaling::{ClientMessage, ConnectionId, PresenceProfile, RoomSummary};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("signaling hub is not running")]
    Closed,
}

/// Work items processed by the hub task, one at a time
#[derive(Debug)]
pub enum Command {
    Connect {
        tx: Outbound,
        reply: oneshot::Sender<ConnectionId>,
    },
    Message {
        id: ConnectionId,
        message: ClientMessage,
    },
    Disconnect {
        id: ConnectionId,
    },
    Rooms {
        reply: oneshot::Sender<Vec<RoomSummary>>,
    },
    Roster {
        room_id: String,
        reply: oneshot::Sender<Option<Vec<PresenceProfile>>>,
    },
}

/// Cloneable front door to the task that owns the [`Broker`]
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    /// Spawn the hub task on the current runtime
    pub fn spawn(policy: RelayPolicy) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(Broker::new(policy), rx));
        (Self { commands }, task)
    }

    pub async fn connect(&self, tx: Outbound) -> Result<ConnectionId, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Connect { tx, reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub fn message(&self, id: &ConnectionId, message: ClientMessage) -> Result<(), HubError> {
        self.submit(Command::Message {
            id: id.clone(),
            message,
        })
    }

    pub fn disconnect(&self, id: &ConnectionId) -> Result<(), HubError> {
        self.submit(Command::Disconnect { id: id.clone() })
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Rooms { reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub async fn roster(&self, room_id: &str) -> Result<Option<Vec<PresenceProfile>>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Roster {
            room_id: room_id.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    fn submit(&self, command: Command) -> Result<(), HubError> {
        self.commands.send(command).map_err(|_| HubError::Closed)
    }
}

async fn run(mut broker: Broker, mut commands: mpsc::UnboundedReceiver<Command>) {
    debug!("signaling hub started");
    while let Some(command) = commands.recv().await {
        match command {
            Command::Connect { tx, reply } => {
                let id = broker.connect(tx);
                if reply.send(id.clone()).is_err() {
                    // Caller went away before learning its id.
                    broker.disconnect(&id);
                }
            }
            Command::Message { id, message } => broker.handle(&id, message),
            Command::Disconnect { id } => {
                broker.disconnect(&id);
            }
            Command::Rooms { reply } => {
                let _ = reply.send(broker.rooms());
            }
            Command::Roster { room_id, reply } => {
                let _ = reply.send(broker.roster(&room_id));
            }
        }
    }
    info!(
        connections = broker.connection_count(),
        "signaling hub stopped"
    );
}
