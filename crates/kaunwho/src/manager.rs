//! The synchronization controller.
//!
//! [`GameManager`] owns this peer's [`GameStore`] and [`PeerTransport`] and
//! is the only code that touches either. Every local mutation that
//! changes shared truth is followed by a full `gameStateUpdate` snapshot;
//! every received snapshot replaces the local session outright. There is
//! no merge and no ordering check: the last snapshot delivered wins.
//!
//! Failures never reach the caller. A precondition miss is logged at
//! debug level and the operation does nothing; a transport or codec
//! failure is logged at warn level and the envelope is dropped.
//!
//! The manager is not thread-safe on its own. [`spawn_manager`] runs it on
//! one task together with the poll scheduler, which is what gives the
//! single-writer guarantee.
//!
//! [`spawn_manager`]: crate::spawn_manager

use std::net::SocketAddr;

use kaunwho_game::{
    GameError, GameRules, GameSession, GameState, GameStore, Photo, PhotoId, Player, PlayerRole,
    SelectionCountdown,
};
use kaunwho_protocol::{Envelope, MessageType, WireFormat};
use kaunwho_transport::{PeerChange, PeerId, PeerTransport, Recipient, TransportState};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::watch;

use crate::ManagerConfig;
use crate::messages::{EliminationDelta, GameOverDelta, JoinRejection};

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// What the presentation layer observes.
///
/// Published through a `watch` channel; a new value is sent only when
/// something in it actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedGame {
    pub session: Option<GameSession>,
    pub my_role: Option<PlayerRole>,
    pub my_player: Option<Player>,
    pub opponent: Option<Player>,
    pub game_state: GameState,
    pub current_turn: Option<PlayerRole>,
    pub winner: Option<PlayerRole>,
    /// Whole seconds left in photo selection while the countdown runs.
    pub selection_secs_left: Option<u64>,
}

impl ObservedGame {
    pub fn is_my_turn(&self) -> bool {
        self.my_role.is_some() && self.current_turn == self.my_role
    }

    /// `Some(true)` if this peer won, `Some(false)` if it lost.
    pub fn i_won(&self) -> Option<bool> {
        Some(self.winner? == self.my_role?)
    }
}

// ---------------------------------------------------------------------------
// GameManager
// ---------------------------------------------------------------------------

pub struct GameManager {
    store: GameStore,
    transport: PeerTransport,
    codec: WireFormat,
    rng: StdRng,
    my_role: Option<PlayerRole>,
    /// The player this peer created; the guest has no session until the
    /// host's first snapshot arrives.
    local_player: Option<Player>,
    /// Mirrors the session state, except that a payload-less `gameOver`
    /// can move it ahead of the session.
    game_state: GameState,
    countdown: SelectionCountdown,
    observed: watch::Sender<ObservedGame>,
}

impl GameManager {
    pub fn new(config: &ManagerConfig) -> Self {
        let transport = PeerTransport::new(config.transport.clone(), PeerId::generate(&config.device_name));
        Self::with_parts(transport, config.rules.clone(), StdRng::from_os_rng())
    }

    /// Builds a manager around an existing transport, with an explicit
    /// random source for board shuffling and turn picks.
    pub fn with_parts(transport: PeerTransport, rules: GameRules, rng: StdRng) -> Self {
        let (observed, _) = watch::channel(ObservedGame::default());
        Self {
            codec: transport.config().wire_format,
            countdown: SelectionCountdown::new(rules.photo_selection_time()),
            store: GameStore::new(rules),
            transport,
            rng,
            my_role: None,
            local_player: None,
            game_state: GameState::WaitingForPlayers,
            observed,
        }
    }

    // -- Accessors --

    pub fn subscribe(&self) -> watch::Receiver<ObservedGame> {
        self.observed.subscribe()
    }

    pub fn observed(&self) -> ObservedGame {
        self.observed.borrow().clone()
    }

    pub fn transport_state(&self) -> watch::Receiver<TransportState> {
        self.transport.subscribe()
    }

    pub fn local_peer(&self) -> &PeerId {
        self.transport.local_peer()
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.store.session()
    }

    pub fn my_role(&self) -> Option<PlayerRole> {
        self.my_role
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn countdown(&self) -> &SelectionCountdown {
        &self.countdown
    }

    /// No game in progress or being joined, and not browsing for hosts:
    /// nothing can arrive that needs a poll.
    pub fn is_idle(&self) -> bool {
        self.my_role.is_none() && !self.transport.is_discovering()
    }

    // -- Lobby --

    /// Starts a new session as host and begins advertising.
    pub async fn create_game(&mut self, player_name: &str) {
        let player = Player::new(player_name);
        tracing::info!(player = %player.id, name = player_name, "creating game");

        self.countdown.stop();
        self.my_role = Some(PlayerRole::Host);
        self.local_player = Some(player.clone());
        self.store.create_session(player);
        self.adopt_session_state();

        if let Err(e) = self.transport.start_advertising().await {
            tracing::warn!(error = %e, "could not start advertising");
        }
        self.publish();
    }

    /// Joins a host found by discovery. The join request goes out once
    /// the session is up.
    pub fn join_game(&mut self, player_name: &str, host: &PeerId) {
        self.prepare_guest(player_name);
        if let Err(e) = self.transport.connect(host) {
            tracing::warn!(%host, error = %e, "cannot join");
        }
        self.publish();
    }

    /// Joins a host at a known session address, skipping discovery.
    pub fn join_game_at(&mut self, player_name: &str, addr: SocketAddr) {
        self.prepare_guest(player_name);
        self.transport.connect_addr(addr);
        self.publish();
    }

    /// A retry under the same name keeps the guest's player id, so a host
    /// that still holds the seat treats it as a rejoin.
    fn prepare_guest(&mut self, player_name: &str) {
        let player = match self.local_player.take() {
            Some(previous) if self.my_role == Some(PlayerRole::Guest) && previous.name == player_name => previous,
            _ => Player::new(player_name),
        };
        tracing::info!(player = %player.id, name = player_name, "joining game");

        self.countdown.stop();
        self.store.reset();
        self.my_role = Some(PlayerRole::Guest);
        self.local_player = Some(player);
        self.adopt_session_state();
    }

    pub async fn start_discovery(&mut self) {
        if let Err(e) = self.transport.start_discovery().await {
            tracing::warn!(error = %e, "could not start discovery");
        }
    }

    pub fn stop_discovery(&mut self) {
        self.transport.stop_discovery();
    }

    // -- Photo selection --

    /// Adds a photo to this peer's own list. Returns its id if it was
    /// added.
    pub fn add_photo(&mut self, image_data: Vec<u8>) -> Option<PhotoId> {
        let result = self
            .role()
            .and_then(|role| self.store.add_photo(role, Photo::new(image_data)));
        match result {
            Ok(id) => {
                tracing::debug!(photo = %id, "photo added");
                self.commit();
                Some(id)
            }
            Err(e) => {
                absorbed("add_photo", &e);
                None
            }
        }
    }

    pub fn remove_photo(&mut self, photo_id: PhotoId) -> bool {
        let result = self.role().and_then(|role| self.store.remove_photo(role, photo_id));
        match result {
            Ok(_) => {
                tracing::debug!(photo = %photo_id, "photo removed");
                self.commit();
                true
            }
            Err(e) => {
                absorbed("remove_photo", &e);
                false
            }
        }
    }

    // -- Play --

    /// Builds the board, assigns mystery faces and picks the first turn.
    /// Does nothing unless both players have enough photos.
    pub fn start_game(&mut self) -> bool {
        match self.store.start_game(&mut self.rng) {
            Ok(()) => {
                self.countdown.stop();
                self.commit();
                true
            }
            Err(e) => {
                absorbed("start_game", &e);
                false
            }
        }
    }

    pub fn eliminate_photo(&mut self, photo_id: PhotoId) -> bool {
        match self.store.eliminate(photo_id) {
            Ok(newly) => {
                tracing::debug!(photo = %photo_id, newly, "photo eliminated");
                self.send_payload(MessageType::EliminationUpdate, &EliminationDelta { photo_id });
                self.commit();
                true
            }
            Err(e) => {
                absorbed("eliminate_photo", &e);
                false
            }
        }
    }

    /// Guesses this peer's own mystery face. Returns whether the guess
    /// was right; either way the game ends.
    pub fn make_guess(&mut self, photo_id: PhotoId) -> bool {
        let result = self.role().and_then(|role| self.store.guess(role, photo_id));
        match result {
            Ok(correct) => {
                if let Some(winner) = self.store.session().and_then(|s| s.winner) {
                    self.send_payload(MessageType::GameOver, &GameOverDelta { winner });
                }
                self.commit();
                correct
            }
            Err(e) => {
                absorbed("make_guess", &e);
                false
            }
        }
    }

    pub fn end_turn(&mut self) -> bool {
        match self.store.end_turn() {
            Ok(()) => {
                self.commit();
                true
            }
            Err(e) => {
                absorbed("end_turn", &e);
                false
            }
        }
    }

    /// Back to the pre-game baseline: no session, no role, and the
    /// transport fully torn down.
    pub fn reset_game(&mut self) {
        tracing::info!("resetting game");
        self.store.reset();
        self.my_role = None;
        self.local_player = None;
        self.countdown.stop();
        self.game_state = GameState::WaitingForPlayers;
        self.transport.disconnect();
        self.publish();
    }

    /// Tears down the transport without touching the session.
    pub fn shutdown(&mut self) {
        self.transport.disconnect();
        self.publish();
    }

    // -- Inbound --

    /// One poll: applies transport events, then dispatches the waiting
    /// envelope, if any.
    pub fn poll(&mut self) {
        for change in self.transport.pump() {
            self.on_peer_change(change);
        }
        if let Some(envelope) = self.transport.take_inbound() {
            self.dispatch(envelope);
        }
        self.publish();
    }

    /// Applies one received envelope.
    pub fn dispatch(&mut self, envelope: Envelope) {
        tracing::debug!(kind = %envelope.kind, "dispatching envelope");
        match envelope.kind {
            MessageType::JoinRequest => self.on_join_request(&envelope),
            MessageType::JoinAccepted => tracing::info!("join accepted"),
            MessageType::JoinRejected => self.on_join_rejected(&envelope),
            MessageType::GameStateUpdate => self.on_snapshot(&envelope),
            MessageType::EliminationUpdate => self.on_elimination(&envelope),
            MessageType::GameOver => self.on_game_over(&envelope),
            MessageType::PhotoUpdate | MessageType::GuessAttempt => {
                tracing::debug!(kind = %envelope.kind, "envelope ignored");
            }
        }
        self.publish();
    }

    fn on_peer_change(&mut self, change: PeerChange) {
        match change {
            PeerChange::Connected(peer) => {
                if self.my_role != Some(PlayerRole::Guest) || self.store.session().is_some() {
                    return;
                }
                if let Some(player) = &self.local_player {
                    tracing::info!(host = %peer, "requesting to join");
                    self.send_payload(MessageType::JoinRequest, player);
                }
            }
            PeerChange::Disconnected(peer) => {
                tracing::info!(%peer, state = %self.game_state, "opponent left");
                if self.my_role != Some(PlayerRole::Host) {
                    return;
                }
                match self.store.release_guest() {
                    Ok(_) => {
                        self.countdown.stop();
                        self.adopt_session_state();
                    }
                    Err(e) => absorbed("release_guest", &e),
                }
            }
        }
    }

    fn on_join_request(&mut self, envelope: &Envelope) {
        if self.my_role != Some(PlayerRole::Host) {
            tracing::debug!("join request ignored, not hosting");
            return;
        }
        let guest: Player = match envelope.payload(&self.codec) {
            Ok(guest) => guest,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable join request dropped");
                return;
            }
        };

        let name = guest.name.clone();
        match self.store.accept_guest(guest) {
            Ok(()) => {
                self.adopt_session_state();
                if self.game_state == GameState::PhotoSelection {
                    self.start_countdown();
                }
                tracing::info!(guest = %name, "guest joined");
                self.send(Envelope::signal(MessageType::JoinAccepted));
                self.broadcast_snapshot();
            }
            Err(e) => {
                tracing::info!(guest = %name, reason = %e, "join rejected");
                self.send_payload(MessageType::JoinRejected, &JoinRejection { reason: e.to_string() });
            }
        }
    }

    fn on_join_rejected(&mut self, envelope: &Envelope) {
        let reason = envelope
            .payload::<JoinRejection, _>(&self.codec)
            .map(|r| r.reason)
            .unwrap_or_else(|_| "no reason given".into());
        tracing::warn!(%reason, "host rejected join");

        self.store.reset();
        self.my_role = None;
        self.local_player = None;
        self.countdown.stop();
        self.adopt_session_state();
        self.transport.disconnect();
    }

    fn on_snapshot(&mut self, envelope: &Envelope) {
        let session: GameSession = match envelope.payload(&self.codec) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable game state dropped");
                return;
            }
        };

        tracing::debug!(session = %session.id, state = %session.state, "snapshot applied");
        self.store.replace(session);
        self.adopt_session_state();

        match self.game_state {
            GameState::PhotoSelection => self.start_countdown(),
            GameState::PhotoSelection => {}
            _ => self.countdown.stop(),
        }
    }

    fn on_elimination(&mut self, envelope: &Envelope) {
        if !envelope.has_payload() {
            tracing::debug!("elimination without payload, waiting for snapshot");
            return;
        }
        match envelope.payload::<EliminationDelta, _>(&self.codec) {
            Ok(delta) => {
                if let Err(e) = self.store.eliminate(delta.photo_id) {
                    absorbed("elimination delta", &e);
                }
            }
            Err(e) => tracing::warn!(error = %e, "undecodable elimination dropped"),
        }
    }

    fn on_game_over(&mut self, envelope: &Envelope) {
        if !envelope.has_payload() {
            self.game_state = GameState::GameOver;
            return;
        }
        match envelope.payload::<GameOverDelta, _>(&self.codec) {
            Ok(delta) => match self.store.record_winner(delta.winner) {
                Ok(()) => self.adopt_session_state(),
                Err(e) => {
                    absorbed("game over delta", &e);
                    self.game_state = GameState::GameOver;
                }
            },
            Err(e) => tracing::warn!(error = %e, "undecodable game over dropped"),
        }
    }

    // -- Outbound --

    fn role(&self) -> Result<PlayerRole, GameError> {
        self.my_role.ok_or(GameError::NoSession)
    }

    /// After a local mutation: follow the session state, snapshot to the
    /// opponent, publish.
    fn commit(&mut self) {
        self.adopt_session_state();
        self.broadcast_snapshot();
        self.publish();
    }

    fn broadcast_snapshot(&self) {
        if let Some(session) = self.store.session() {
            self.send_payload(MessageType::GameStateUpdate, session);
        }
    }

    fn send_payload<T: Serialize>(&self, kind: MessageType, payload: &T) {
        match Envelope::with_payload(kind, payload, &self.codec) {
            Ok(envelope) => self.send(envelope),
            Err(e) => tracing::warn!(%kind, error = %e, "envelope encode failed"),
        }
    }

    fn send(&self, envelope: Envelope) {
        if !self.transport.is_connected() {
            tracing::trace!(kind = %envelope.kind, "no opponent connected, not sending");
            return;
        }
        self.transport.send(&envelope, &Recipient::AllConnected);
    }

    fn start_countdown(&mut self) {
        if self.countdown.is_started() {
            return;
        }
        let started = now();
        self.countdown.start(started);
        tracing::info!(left = %self.countdown.display(started), "photo selection started");
    }

    // -- Observation --

    fn adopt_session_state(&mut self) {
        self.game_state = self
            .store
            .session()
            .map_or(GameState::WaitingForPlayers, |s| s.state);
    }

    fn snapshot_observed(&self) -> ObservedGame {
        let session = self.store.session();
        let player_for = |role: Option<PlayerRole>| session.zip(role).and_then(|(s, r)| s.player(r).cloned());

        ObservedGame {
            session: session.cloned(),
            my_role: self.my_role,
            my_player: player_for(self.my_role).or_else(|| self.local_player.clone()),
            opponent: player_for(self.my_role.map(PlayerRole::opposite)),
            game_state: self.game_state,
            current_turn: session.and_then(|s| s.current_turn),
            winner: session.and_then(|s| s.winner),
            selection_secs_left: self
                .countdown
                .is_active(now())
                .then(|| self.countdown.secs_left(now())),
        }
    }

    fn publish(&self) {
        let next = self.snapshot_observed();
        self.observed.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Clock for the selection countdown. Follows Tokio's clock so paused
/// test time applies.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

fn absorbed(op: &'static str, error: &GameError) {
    tracing::debug!(op, %error, "operation had no effect");
}
