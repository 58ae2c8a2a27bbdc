//! The local session holder.

use rand::Rng;

use crate::{GameError, GameRules, GameSession, Photo, PhotoId, Player, PlayerRole, rules};

/// Holds this peer's copy of the session.
///
/// The store has no notion of "my role" or of the network. It applies
/// transitions to whatever session it holds and reports failures as
/// [`GameError`]; on error the session is left exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct GameStore {
    session: Option<GameSession>,
    rules: GameRules,
}

impl GameStore {
    pub fn new(rules: GameRules) -> Self {
        Self {
            session: None,
            rules,
        }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    fn session_mut(&mut self) -> Result<&mut GameSession, GameError> {
        self.session.as_mut().ok_or(GameError::NoSession)
    }

    /// Starts a new session hosted by `host`, discarding any previous one.
    pub fn create_session(&mut self, host: Player) -> &GameSession {
        self.session.insert(GameSession::new(host))
    }

    /// Replaces the local session wholesale with a received snapshot.
    pub fn replace(&mut self, session: GameSession) {
        self.session = Some(session);
    }

    /// Drops the session, back to the pre-game baseline.
    pub fn reset(&mut self) {
        self.session = None;
    }

    // -- Photo selection --

    /// Adds a photo to `role`'s list.
    pub fn add_photo(&mut self, role: PlayerRole, photo: Photo) -> Result<PhotoId, GameError> {
        let session = self.session_mut()?;
        if !session.state.is_selecting() {
            return Err(GameError::WrongState(session.state));
        }
        let player = session
            .player_mut(role)
            .ok_or(GameError::MissingPlayer(role))?;
        Ok(player.add_photo(photo))
    }

    /// Removes a photo from `role`'s list.
    pub fn remove_photo(&mut self, role: PlayerRole, id: PhotoId) -> Result<Photo, GameError> {
        let session = self.session_mut()?;
        if !session.state.is_selecting() {
            return Err(GameError::WrongState(session.state));
        }
        let player = session
            .player_mut(role)
            .ok_or(GameError::MissingPlayer(role))?;
        player.remove_photo(id).ok_or(GameError::UnknownPhoto(id))
    }

    // -- Transitions --

    pub fn accept_guest(&mut self, guest: Player) -> Result<(), GameError> {
        rules::accept_guest(self.session_mut()?, guest)
    }

    pub fn release_guest(&mut self) -> Result<Player, GameError> {
        rules::release_guest(self.session_mut()?)
    }

    pub fn start_game<R: Rng>(&mut self, rng: &mut R) -> Result<(), GameError> {
        let rules = self.rules.clone();
        rules::start_game(self.session_mut()?, &rules, rng)
    }

    pub fn eliminate(&mut self, photo_id: PhotoId) -> Result<bool, GameError> {
        rules::eliminate(self.session_mut()?, photo_id)
    }

    pub fn guess(&mut self, guesser: PlayerRole, photo_id: PhotoId) -> Result<bool, GameError> {
        rules::guess(self.session_mut()?, guesser, photo_id)
    }

    pub fn end_turn(&mut self) -> Result<(), GameError> {
        rules::end_turn(self.session_mut()?);
        Ok(())
    }

    pub fn record_winner(&mut self, winner: PlayerRole) -> Result<(), GameError> {
        rules::record_winner(self.session_mut()?, winner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GameState;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn store_with_guest() -> GameStore {
        let mut store = GameStore::default();
        store.create_session(Player::new("Ava"));
        store.accept_guest(Player::new("Ben")).unwrap();
        store
    }

    #[test]
    fn test_operations_without_session_return_no_session() {
        let mut store = GameStore::default();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(store.end_turn(), Err(GameError::NoSession));
        assert_eq!(store.start_game(&mut rng), Err(GameError::NoSession));
        assert_eq!(
            store.add_photo(PlayerRole::Host, Photo::new(vec![1])),
            Err(GameError::NoSession)
        );
    }

    #[test]
    fn test_add_photo_to_missing_guest_returns_missing_player() {
        let mut store = GameStore::default();
        store.create_session(Player::new("Ava"));
        let result = store.add_photo(PlayerRole::Guest, Photo::new(vec![1]));
        assert_eq!(result, Err(GameError::MissingPlayer(PlayerRole::Guest)));
    }

    #[test]
    fn test_add_and_remove_photo_updates_seat() {
        let mut store = store_with_guest();
        let id = store.add_photo(PlayerRole::Guest, Photo::new(vec![9])).unwrap();
        assert_eq!(store.session().unwrap().guest_player.as_ref().unwrap().photo_count(), 1);

        let removed = store.remove_photo(PlayerRole::Guest, id).unwrap();
        assert_eq!(removed.image_data, vec![9]);
        assert_eq!(store.session().unwrap().guest_player.as_ref().unwrap().photo_count(), 0);
    }

    #[test]
    fn test_add_photo_after_start_returns_wrong_state() {
        let mut store = store_with_guest();
        for i in 0..8 {
            store.add_photo(PlayerRole::Host, Photo::new(vec![i])).unwrap();
            store.add_photo(PlayerRole::Guest, Photo::new(vec![i])).unwrap();
        }
        store.start_game(&mut StdRng::seed_from_u64(2)).unwrap();

        let result = store.add_photo(PlayerRole::Host, Photo::new(vec![0]));
        assert_eq!(result, Err(GameError::WrongState(GameState::Playing)));
    }

    #[test]
    fn test_reset_clears_session() {
        let mut store = store_with_guest();
        store.reset();
        assert!(store.session().is_none());
    }

    #[test]
    fn test_replace_swaps_whole_session() {
        let mut store = store_with_guest();
        let other = GameSession::new(Player::new("Zed"));
        store.replace(other.clone());
        assert_eq!(store.session(), Some(&other));
    }
}
