//! The manager task and its handle.
//!
//! One Tokio task owns the [`GameManager`] and a [`PollScheduler`]. It
//! `select!`s between commands from [`ManagerHandle`]s and the poll tick,
//! so local intents and inbound envelopes are applied one at a time on
//! the same task. Polling is paused while the manager is idle.
//!
//! ```text
//! ManagerHandle ──Command──▶ ┌────────────── manager task ──────────────┐
//!                            │ select! {                                │
//!                            │   command     => manager.<operation>()   │
//!                            │   poll tick   => manager.poll()          │
//!                            │ }                                        │
//!                            └──────────────────────────────────────────┘
//! watch::Receiver<ObservedGame> ◀── published after every change
//! ```

use std::net::SocketAddr;

use kaunwho_game::PhotoId;
use kaunwho_tick::{PollConfig, PollScheduler};
use kaunwho_transport::{PeerId, TransportState};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{GameManager, KaunWhoError, ManagerConfig, ObservedGame};

const COMMAND_BUFFER: usize = 64;

enum Command {
    CreateGame {
        name: String,
        reply: oneshot::Sender<()>,
    },
    JoinGame {
        name: String,
        host: PeerId,
        reply: oneshot::Sender<()>,
    },
    JoinGameAt {
        name: String,
        addr: SocketAddr,
        reply: oneshot::Sender<()>,
    },
    StartDiscovery {
        reply: oneshot::Sender<()>,
    },
    StopDiscovery {
        reply: oneshot::Sender<()>,
    },
    AddPhoto {
        image_data: Vec<u8>,
        reply: oneshot::Sender<Option<PhotoId>>,
    },
    RemovePhoto {
        photo_id: PhotoId,
        reply: oneshot::Sender<bool>,
    },
    StartGame {
        reply: oneshot::Sender<bool>,
    },
    EliminatePhoto {
        photo_id: PhotoId,
        reply: oneshot::Sender<bool>,
    },
    MakeGuess {
        photo_id: PhotoId,
        reply: oneshot::Sender<bool>,
    },
    EndTurn {
        reply: oneshot::Sender<bool>,
    },
    ResetGame {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Spawns a manager built from `config` on the current Tokio runtime.
pub fn spawn_manager(config: ManagerConfig) -> ManagerHandle {
    let poll = config.poll.clone();
    spawn_with(GameManager::new(&config), poll)
}

/// Spawns an already built manager. A disabled poll config means inbound
/// envelopes are never applied.
pub fn spawn_with(manager: GameManager, poll: PollConfig) -> ManagerHandle {
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = ManagerHandle {
        commands,
        observed: manager.subscribe(),
        transport: manager.transport_state(),
        local_peer: manager.local_peer().clone(),
    };
    tokio::spawn(run(manager, rx, PollScheduler::new(poll)));
    handle
}

async fn run(mut manager: GameManager, mut commands: mpsc::Receiver<Command>, mut poll: PollScheduler) {
    tracing::info!(peer = %manager.local_peer(), "game manager started");
    follow_activity(&manager, &mut poll);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    manager.shutdown();
                    let _ = reply.send(());
                    break;
                }
                Some(command) => apply(&mut manager, command).await,
                None => break,
            },
            _ = poll.wait_for_poll() => {
                manager.poll();
                poll.record_dispatch_end();
            }
        }
        follow_activity(&manager, &mut poll);
    }

    manager.shutdown();
    tracing::info!(
        peer = %manager.local_peer(),
        polls = poll.poll_count(),
        slow = poll.metrics().slow_dispatches,
        "game manager stopped"
    );
}

/// Polls only while a game is hosted, joined or being browsed for.
fn follow_activity(manager: &GameManager, poll: &mut PollScheduler) {
    if manager.is_idle() {
        poll.pause();
    } else {
        poll.resume();
    }
}

async fn apply(manager: &mut GameManager, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::CreateGame { name, reply } => {
            manager.create_game(&name).await;
            let _ = reply.send(());
        }
        Command::JoinGame { name, host, reply } => {
            manager.join_game(&name, &host);
            let _ = reply.send(());
        }
        Command::JoinGameAt { name, addr, reply } => {
            manager.join_game_at(&name, addr);
            let _ = reply.send(());
        }
        Command::StartDiscovery { reply } => {
            manager.start_discovery().await;
            let _ = reply.send(());
        }
        Command::StopDiscovery { reply } => {
            manager.stop_discovery();
            let _ = reply.send(());
        }
        Command::AddPhoto { image_data, reply } => {
            let _ = reply.send(manager.add_photo(image_data));
        }
        Command::RemovePhoto { photo_id, reply } => {
            let _ = reply.send(manager.remove_photo(photo_id));
        }
        Command::StartGame { reply } => {
            let _ = reply.send(manager.start_game());
        }
        Command::EliminatePhoto { photo_id, reply } => {
            let _ = reply.send(manager.eliminate_photo(photo_id));
        }
        Command::MakeGuess { photo_id, reply } => {
            let _ = reply.send(manager.make_guess(photo_id));
        }
        Command::EndTurn { reply } => {
            let _ = reply.send(manager.end_turn());
        }
        Command::ResetGame { reply } => {
            manager.reset_game();
            let _ = reply.send(());
        }
        Command::Shutdown { reply } => {
            let _ = reply.send(());
        }
    }
}

/// Cloneable front end for the manager task.
///
/// Game operations mirror [`GameManager`]. They return
/// [`KaunWhoError::ManagerUnavailable`] only if the task is gone; a
/// rejected move is reported as `false`/`None`, never as an error.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
    observed: watch::Receiver<ObservedGame>,
    transport: watch::Receiver<TransportState>,
    local_peer: PeerId,
}

impl ManagerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, KaunWhoError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| KaunWhoError::ManagerUnavailable)?;
        rx.await.map_err(|_| KaunWhoError::ManagerUnavailable)
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    pub fn subscribe(&self) -> watch::Receiver<ObservedGame> {
        self.observed.clone()
    }

    /// The latest published game state.
    pub fn observed(&self) -> ObservedGame {
        self.observed.borrow().clone()
    }

    pub fn transport(&self) -> watch::Receiver<TransportState> {
        self.transport.clone()
    }

    /// Waits until the observed game satisfies `condition` and returns
    /// that value.
    pub async fn wait_until(
        &self,
        condition: impl FnMut(&ObservedGame) -> bool,
    ) -> Result<ObservedGame, KaunWhoError> {
        let mut rx = self.observed.clone();
        let observed = rx
            .wait_for(condition)
            .await
            .map_err(|_| KaunWhoError::ManagerUnavailable)?;
        Ok(observed.clone())
    }

    pub async fn create_game(&self, player_name: impl Into<String>) -> Result<(), KaunWhoError> {
        let name = player_name.into();
        self.request(|reply| Command::CreateGame { name, reply }).await
    }

    pub async fn join_game(&self, player_name: impl Into<String>, host: PeerId) -> Result<(), KaunWhoError> {
        let name = player_name.into();
        self.request(|reply| Command::JoinGame { name, host, reply }).await
    }

    pub async fn join_game_at(&self, player_name: impl Into<String>, addr: SocketAddr) -> Result<(), KaunWhoError> {
        let name = player_name.into();
        self.request(|reply| Command::JoinGameAt { name, addr, reply }).await
    }

    pub async fn start_discovery(&self) -> Result<(), KaunWhoError> {
        self.request(|reply| Command::StartDiscovery { reply }).await
    }

    pub async fn stop_discovery(&self) -> Result<(), KaunWhoError> {
        self.request(|reply| Command::StopDiscovery { reply }).await
    }

    pub async fn add_photo(&self, image_data: Vec<u8>) -> Result<Option<PhotoId>, KaunWhoError> {
        self.request(|reply| Command::AddPhoto { image_data, reply }).await
    }

    pub async fn remove_photo(&self, photo_id: PhotoId) -> Result<bool, KaunWhoError> {
        self.request(|reply| Command::RemovePhoto { photo_id, reply }).await
    }

    pub async fn start_game(&self) -> Result<bool, KaunWhoError> {
        self.request(|reply| Command::StartGame { reply }).await
    }

    pub async fn eliminate_photo(&self, photo_id: PhotoId) -> Result<bool, KaunWhoError> {
        self.request(|reply| Command::EliminatePhoto { photo_id, reply }).await
    }

    pub async fn make_guess(&self, photo_id: PhotoId) -> Result<bool, KaunWhoError> {
        self.request(|reply| Command::MakeGuess { photo_id, reply }).await
    }

    pub async fn end_turn(&self) -> Result<bool, KaunWhoError> {
        self.request(|reply| Command::EndTurn { reply }).await
    }

    pub async fn reset_game(&self) -> Result<(), KaunWhoError> {
        self.request(|reply| Command::ResetGame { reply }).await
    }

    /// Disconnects and stops the manager task. Later calls on any clone
    /// return [`KaunWhoError::ManagerUnavailable`].
    pub async fn shutdown(&self) -> Result<(), KaunWhoError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
