//! Session transitions.
//!
//! Each function checks its precondition and returns a [`GameError`]
//! without touching the session when it fails. On success the session
//! satisfies the invariants documented on [`GameSession`].

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::{GameError, GameRules, GameSession, GameState, PhotoId, Player, PlayerRole};

/// Seats `guest` in the session and opens photo selection.
///
/// Accepted while the session is still selecting and the guest slot is
/// empty or already holds a player with the same id (a rejoin replaces
/// the stale record).
pub fn accept_guest(session: &mut GameSession, guest: Player) -> Result<(), GameError> {
    if !session.state.is_selecting() {
        return Err(GameError::WrongState(session.state));
    }
    if let Some(existing) = &session.guest_player {
        if existing.id != guest.id {
            return Err(GameError::GuestSlotTaken(existing.id));
        }
    }

    tracing::info!(session = %session.id, guest = %guest.id, name = %guest.name, "guest seated");
    session.guest_player = Some(guest);
    if session.state == GameState::WaitingForPlayers {
        session.state = GameState::PhotoSelection;
    }
    Ok(())
}

/// Empties the guest seat after the guest's session dropped, so another
/// guest can join. Only before play starts; the guest's photos go with it.
pub fn release_guest(session: &mut GameSession) -> Result<Player, GameError> {
    if !session.state.is_selecting() {
        return Err(GameError::WrongState(session.state));
    }
    let guest = session
        .guest_player
        .take()
        .ok_or(GameError::MissingPlayer(PlayerRole::Guest))?;

    tracing::info!(session = %session.id, guest = %guest.id, "guest seat released");
    session.state = GameState::WaitingForPlayers;
    Ok(guest)
}

/// Builds the shared board and starts play.
///
/// Pools every photo from both players, shuffles, keeps the first
/// `rules.board_size`, draws the host's mystery face from the board and
/// the guest's from the rest, and picks the first turn uniformly.
///
/// # Errors
/// - [`GameError::WrongState`] once setup has already happened.
/// - [`GameError::NotReady`] if the guest is missing or either player has
///   fewer than `rules.min_photos_per_player` photos.
pub fn start_game<R: Rng>(
    session: &mut GameSession,
    rules: &GameRules,
    rng: &mut R,
) -> Result<(), GameError> {
    if !session.state.is_selecting() {
        return Err(GameError::WrongState(session.state));
    }
    if !session.is_ready_to_start(rules) {
        return Err(GameError::NotReady {
            host: session.host_player.photo_count(),
            guest: session.guest_player.as_ref().map(Player::photo_count),
        });
    }

    let mut board: Vec<_> = session
        .players()
        .flat_map(|p| p.photos.iter().cloned())
        .collect();
    board.shuffle(rng);
    board.truncate(rules.board_size);
    for photo in &mut board {
        photo.is_eliminated = false;
    }

    let host_mystery = board.choose(rng).map(|p| p.id);
    let remaining: Vec<_> = board
        .iter()
        .filter(|p| Some(p.id) != host_mystery)
        .collect();
    let guest_mystery = remaining.choose(rng).map(|p| p.id);

    session.state = GameState::GameSetup;
    session.shared_board = board;
    session.host_player.mystery_face = host_mystery;
    if let Some(guest) = session.guest_player.as_mut() {
        guest.mystery_face = guest_mystery;
    }
    session.current_turn = Some(if rng.random_bool(0.5) {
        PlayerRole::Host
    } else {
        PlayerRole::Guest
    });
    session.winner = None;
    session.state = GameState::Playing;

    tracing::info!(
        session = %session.id,
        board = session.shared_board.len(),
        first_turn = ?session.current_turn,
        "game started"
    );
    Ok(())
}

/// Marks a board photo as eliminated.
///
/// Returns `Ok(true)` if the photo was newly eliminated and `Ok(false)` if
/// it already was, so repeating an elimination changes nothing.
pub fn eliminate(session: &mut GameSession, photo_id: PhotoId) -> Result<bool, GameError> {
    if session.state != GameState::Playing {
        return Err(GameError::WrongState(session.state));
    }
    let photo = session
        .shared_board
        .iter_mut()
        .find(|p| p.id == photo_id)
        .ok_or(GameError::UnknownPhoto(photo_id))?;

    let newly = !photo.is_eliminated;
    photo.is_eliminated = true;
    Ok(newly)
}

/// Resolves a guess by `guesser` and ends the game.
///
/// The guess is correct iff `photo_id` is the guesser's own mystery face.
/// A correct guess wins for the guesser, a wrong one for the opponent.
/// `current_turn` is left as it was.
pub fn guess(
    session: &mut GameSession,
    guesser: PlayerRole,
    photo_id: PhotoId,
) -> Result<bool, GameError> {
    if session.state != GameState::Playing {
        return Err(GameError::WrongState(session.state));
    }
    let player = session
        .player(guesser)
        .ok_or(GameError::MissingPlayer(guesser))?;

    let correct = player.mystery_face == Some(photo_id);
    let winner = if correct { guesser } else { guesser.opposite() };
    record_winner(session, winner);

    tracing::info!(session = %session.id, %guesser, correct, %winner, "guess resolved");
    Ok(correct)
}

/// Hands the turn to the other player. Without a current turn there is
/// nothing to flip.
pub fn end_turn(session: &mut GameSession) {
    session.current_turn = session.current_turn.map(PlayerRole::opposite);
}

/// Ends the game with `winner`. Applying the same outcome twice is a
/// no-op.
pub fn record_winner(session: &mut GameSession, winner: PlayerRole) {
    session.winner = Some(winner);
    session.state = GameState::GameOver;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Photo;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn player_with(name: &str, photos: usize) -> Player {
        let mut player = Player::new(name);
        for i in 0..photos {
            player.add_photo(Photo::new(vec![i as u8]));
        }
        player
    }

    fn ready_session(host_photos: usize, guest_photos: usize) -> GameSession {
        let mut session = GameSession::new(player_with("Ava", host_photos));
        accept_guest(&mut session, player_with("Ben", guest_photos)).unwrap();
        session
    }

    fn playing_session(seed: u64) -> GameSession {
        let mut session = ready_session(8, 8);
        let mut rng = StdRng::seed_from_u64(seed);
        start_game(&mut session, &GameRules::default(), &mut rng).unwrap();
        session
    }

    // =====================================================================
    // accept_guest
    // =====================================================================

    #[test]
    fn test_accept_guest_moves_to_photo_selection() {
        let mut session = GameSession::new(Player::new("Ava"));
        accept_guest(&mut session, Player::new("Ben")).unwrap();
        assert_eq!(session.state, GameState::PhotoSelection);
        assert_eq!(session.guest_player.unwrap().name, "Ben");
    }

    #[test]
    fn test_accept_guest_same_id_rejoins() {
        let mut session = GameSession::new(Player::new("Ava"));
        let mut guest = Player::new("Ben");
        accept_guest(&mut session, guest.clone()).unwrap();

        guest.name = "Benny".into();
        accept_guest(&mut session, guest).unwrap();
        assert_eq!(session.guest_player.unwrap().name, "Benny");
    }

    #[test]
    fn test_accept_guest_other_id_returns_slot_taken() {
        let mut session = GameSession::new(Player::new("Ava"));
        accept_guest(&mut session, Player::new("Ben")).unwrap();
        let result = accept_guest(&mut session, Player::new("Cleo"));
        assert!(matches!(result, Err(GameError::GuestSlotTaken(_))));
    }

    #[test]
    fn test_accept_guest_while_playing_returns_wrong_state() {
        let mut session = playing_session(1);
        let result = accept_guest(&mut session, Player::new("Cleo"));
        assert_eq!(result, Err(GameError::WrongState(GameState::Playing)));
    }

    #[test]
    fn test_release_guest_reopens_seat_for_another_guest() {
        let mut session = ready_session(8, 8);
        let released = release_guest(&mut session).unwrap();
        assert_eq!(released.name, "Ben");
        assert_eq!(session.state, GameState::WaitingForPlayers);
        assert_eq!(session.guest_player, None);

        accept_guest(&mut session, Player::new("Cleo")).unwrap();
        assert_eq!(session.guest_player.unwrap().name, "Cleo");
    }

    #[test]
    fn test_release_guest_with_empty_seat_returns_missing_player() {
        let mut session = GameSession::new(Player::new("Ava"));
        let result = release_guest(&mut session);
        assert_eq!(result, Err(GameError::MissingPlayer(PlayerRole::Guest)));
    }

    #[test]
    fn test_release_guest_while_playing_keeps_seat() {
        let mut session = playing_session(3);
        let result = release_guest(&mut session);
        assert_eq!(result, Err(GameError::WrongState(GameState::Playing)));
        assert!(session.guest_player.is_some());
    }

    // =====================================================================
    // start_game
    // =====================================================================

    #[test]
    fn test_start_game_not_ready_leaves_session_unchanged() {
        let mut rng = StdRng::seed_from_u64(7);
        for (host, guest) in [(7, 8), (8, 7), (0, 0), (7, 7)] {
            let mut session = ready_session(host, guest);
            let before = session.clone();
            let result = start_game(&mut session, &GameRules::default(), &mut rng);
            assert!(matches!(result, Err(GameError::NotReady { .. })));
            assert_eq!(session, before);
        }
    }

    #[test]
    fn test_start_game_without_guest_returns_not_ready() {
        let mut session = GameSession::new(player_with("Ava", 10));
        let mut rng = StdRng::seed_from_u64(7);
        let result = start_game(&mut session, &GameRules::default(), &mut rng);
        assert_eq!(result, Err(GameError::NotReady { host: 10, guest: None }));
    }

    #[test]
    fn test_start_game_builds_board_of_fifteen() {
        let session = playing_session(42);
        assert_eq!(session.state, GameState::Playing);
        assert_eq!(session.shared_board.len(), 15);
        assert!(session.current_turn.is_some());
        assert!(session.winner.is_none());
        assert!(session.shared_board.iter().all(|p| !p.is_eliminated));
    }

    #[test]
    fn test_start_game_small_pool_takes_whole_pool() {
        let rules = GameRules {
            min_photos_per_player: 3,
            ..GameRules::default()
        };
        let mut session = ready_session(3, 4);
        let mut rng = StdRng::seed_from_u64(3);
        start_game(&mut session, &rules, &mut rng).unwrap();
        assert_eq!(session.shared_board.len(), 7);
    }

    #[test]
    fn test_start_game_mystery_faces_distinct_and_on_board() {
        for seed in 0..64 {
            let session = playing_session(seed);
            let host = session.mystery_face(PlayerRole::Host).unwrap().id;
            let guest = session.mystery_face(PlayerRole::Guest).unwrap().id;
            assert_ne!(host, guest, "seed {seed}");
        }
    }

    #[test]
    fn test_start_game_board_ids_are_player_photo_ids() {
        let session = playing_session(9);
        let pool: Vec<_> = session
            .players()
            .flat_map(|p| p.photos.iter().map(|ph| ph.id))
            .collect();
        assert!(session.shared_board.iter().all(|p| pool.contains(&p.id)));
    }

    #[test]
    fn test_start_game_picks_both_first_turns_over_seeds() {
        let turns: Vec<_> = (0..32)
            .map(|seed| playing_session(seed).current_turn.unwrap())
            .collect();
        assert!(turns.contains(&PlayerRole::Host));
        assert!(turns.contains(&PlayerRole::Guest));
    }

    #[test]
    fn test_start_game_twice_returns_wrong_state() {
        let mut session = playing_session(5);
        let mut rng = StdRng::seed_from_u64(5);
        let result = start_game(&mut session, &GameRules::default(), &mut rng);
        assert_eq!(result, Err(GameError::WrongState(GameState::Playing)));
    }

    // =====================================================================
    // eliminate
    // =====================================================================

    #[test]
    fn test_eliminate_marks_board_entry() {
        let mut session = playing_session(11);
        let target = session.shared_board[3].id;

        assert_eq!(eliminate(&mut session, target), Ok(true));
        assert!(session.board_photo(target).unwrap().is_eliminated);
        assert_eq!(session.state, GameState::Playing);
    }

    #[test]
    fn test_eliminate_twice_is_idempotent() {
        let mut session = playing_session(11);
        let target = session.shared_board[0].id;

        eliminate(&mut session, target).unwrap();
        let once = session.clone();
        assert_eq!(eliminate(&mut session, target), Ok(false));
        assert_eq!(session, once);
    }

    #[test]
    fn test_eliminate_unknown_id_leaves_board() {
        let mut session = playing_session(11);
        let before = session.clone();
        let missing = PhotoId::new();
        assert_eq!(
            eliminate(&mut session, missing),
            Err(GameError::UnknownPhoto(missing))
        );
        assert_eq!(session, before);
    }

    #[test]
    fn test_eliminate_outside_playing_returns_wrong_state() {
        let mut session = ready_session(8, 8);
        let photo = session.host_player.photos[0].id;
        assert_eq!(
            eliminate(&mut session, photo),
            Err(GameError::WrongState(GameState::PhotoSelection))
        );
    }

    // =====================================================================
    // guess
    // =====================================================================

    #[test]
    fn test_guess_own_mystery_wins_for_guesser() {
        for role in [PlayerRole::Host, PlayerRole::Guest] {
            let mut session = playing_session(21);
            let turn = session.current_turn;
            let target = session.mystery_face(role).unwrap().id;

            assert_eq!(guess(&mut session, role, target), Ok(true));
            assert_eq!(session.winner, Some(role));
            assert_eq!(session.state, GameState::GameOver);
            assert_eq!(session.current_turn, turn);
        }
    }

    #[test]
    fn test_guess_wrong_photo_wins_for_opponent() {
        for role in [PlayerRole::Host, PlayerRole::Guest] {
            let mut session = playing_session(22);
            let turn = session.current_turn;
            let mine = session.mystery_face(role).unwrap().id;
            let wrong = session
                .shared_board
                .iter()
                .find(|p| p.id != mine)
                .unwrap()
                .id;

            assert_eq!(guess(&mut session, role, wrong), Ok(false));
            assert_eq!(session.winner, Some(role.opposite()));
            assert_eq!(session.state, GameState::GameOver);
            assert_eq!(session.current_turn, turn);
        }
    }

    #[test]
    fn test_guess_after_game_over_returns_wrong_state() {
        let mut session = playing_session(23);
        let target = session.mystery_face(PlayerRole::Host).unwrap().id;
        guess(&mut session, PlayerRole::Host, target).unwrap();

        let result = guess(&mut session, PlayerRole::Guest, target);
        assert_eq!(result, Err(GameError::WrongState(GameState::GameOver)));
        assert_eq!(session.winner, Some(PlayerRole::Host));
    }

    // =====================================================================
    // end_turn
    // =====================================================================

    #[test]
    fn test_end_turn_host_yields_guest() {
        let mut session = playing_session(31);
        session.current_turn = Some(PlayerRole::Host);
        end_turn(&mut session);
        assert_eq!(session.current_turn, Some(PlayerRole::Guest));
    }

    #[test]
    fn test_end_turn_twice_restores_turn() {
        let mut session = playing_session(32);
        let original = session.current_turn;
        end_turn(&mut session);
        end_turn(&mut session);
        assert_eq!(session.current_turn, original);
    }

    #[test]
    fn test_end_turn_without_turn_stays_unset() {
        let mut session = ready_session(8, 8);
        end_turn(&mut session);
        assert_eq!(session.current_turn, None);
    }
}
