//! Full matches between two managers over loopback sessions.
//!
//! Both peers run their own manager task. Steps are sequenced so only one
//! side mutates at a time, which is how the UI is expected to drive the
//! game; concurrent snapshots would race (last one delivered wins).

use std::time::Duration;

use kaunwho::prelude::*;

const WAIT: Duration = Duration::from_secs(5);

fn config(name: &str) -> ManagerConfig {
    ManagerConfig {
        poll: PollConfig::with_interval(10),
        ..ManagerConfig::loopback(name)
    }
}

async fn wait(handle: &ManagerHandle, what: &str, condition: impl FnMut(&ObservedGame) -> bool) -> ObservedGame {
    tokio::time::timeout(WAIT, handle.wait_until(condition))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap()
}

fn opponent_photos(game: &ObservedGame) -> usize {
    game.opponent.as_ref().map_or(0, |p| p.photos.len())
}

/// Host "Ava" and guest "Ben", joined by address, both in photo selection.
async fn joined_pair() -> (ManagerHandle, ManagerHandle) {
    let host = spawn_manager(config("Ava"));
    let guest = spawn_manager(config("Ben"));

    host.create_game("Ava").await.unwrap();
    let addr = host.transport().borrow().listen_addr.expect("host is listening");
    guest.join_game_at("Ben", addr).await.unwrap();

    wait(&host, "guest seated", |g| g.game_state == GameState::PhotoSelection && g.opponent.is_some()).await;
    wait(&guest, "first snapshot", |g| g.session.is_some() && g.game_state == GameState::PhotoSelection).await;
    (host, guest)
}

async fn add_photos(handle: &ManagerHandle, base: u8) {
    for i in 0..8 {
        assert!(handle.add_photo(vec![base, i]).await.unwrap().is_some());
    }
}

/// Both players have eight photos and the host has started the game.
async fn playing_pair() -> (ManagerHandle, ManagerHandle) {
    let (host, guest) = joined_pair().await;

    add_photos(&host, 1).await;
    wait(&guest, "host photos", |g| opponent_photos(g) == 8).await;
    add_photos(&guest, 2).await;
    wait(&host, "guest photos", |g| opponent_photos(g) == 8).await;

    assert!(host.start_game().await.unwrap());
    wait(&guest, "game start", |g| g.game_state == GameState::Playing).await;
    (host, guest)
}

// =========================================================================
// Lobby
// =========================================================================

#[tokio::test]
async fn test_join_by_address_seats_guest_on_both_sides() {
    let (host, guest) = joined_pair().await;

    let h = host.observed();
    let g = guest.observed();
    assert_eq!(h.my_role, Some(PlayerRole::Host));
    assert_eq!(g.my_role, Some(PlayerRole::Guest));
    assert_eq!(h.opponent.as_ref().unwrap().name, "Ben");
    assert_eq!(g.opponent.as_ref().unwrap().name, "Ava");
    assert_eq!(h.session.as_ref().unwrap().id, g.session.as_ref().unwrap().id);
    assert!(g.selection_secs_left.is_some());

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_join_through_discovery() {
    let port = std::net::UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let beacons = format!("127.0.0.1:{port}");

    let mut host_config = config("Ava");
    host_config.transport.discovery_target = beacons.clone();
    host_config.transport.beacon_interval_ms = 50;
    let mut guest_config = config("Ben");
    guest_config.transport.discovery_bind = beacons;

    let host = spawn_manager(host_config);
    let guest = spawn_manager(guest_config);
    guest.start_discovery().await.unwrap();
    host.create_game("Ava").await.unwrap();

    let host_peer = host.local_peer().clone();
    let mut transport = guest.transport();
    tokio::time::timeout(WAIT, transport.wait_for(|s| s.discovered_peers.contains(&host_peer)))
        .await
        .expect("host never discovered")
        .unwrap();

    guest.join_game("Ben", host_peer).await.unwrap();
    let g = wait(&guest, "first snapshot", |g| g.session.is_some()).await;
    assert_eq!(g.opponent.unwrap().name, "Ava");

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

// =========================================================================
// Photo selection and start
// =========================================================================

#[tokio::test]
async fn test_start_game_needs_both_players_ready() {
    let (host, guest) = joined_pair().await;
    add_photos(&host, 1).await;
    wait(&guest, "host photos", |g| opponent_photos(g) == 8).await;

    assert!(!host.start_game().await.unwrap());
    assert_eq!(host.observed().game_state, GameState::PhotoSelection);

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_game_gives_both_peers_the_same_board() {
    let (host, guest) = playing_pair().await;

    let h = host.observed();
    let g = wait(&guest, "same session", |g| g.session == h.session).await;
    let session = g.session.as_ref().unwrap();

    assert_eq!(session.shared_board.len(), 15);
    let host_mystery = session.host_player.mystery_face.unwrap();
    let guest_mystery = session.guest_player.as_ref().unwrap().mystery_face.unwrap();
    assert_ne!(host_mystery, guest_mystery);
    assert_eq!(h.current_turn, g.current_turn);
    assert!(h.is_my_turn() != g.is_my_turn());
    assert_eq!(h.selection_secs_left, None);

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

// =========================================================================
// Play
// =========================================================================

#[tokio::test]
async fn test_full_match_guest_guesses_own_mystery() {
    let (host, guest) = playing_pair().await;

    let session = host.observed().session.unwrap();
    let host_mystery = session.host_player.mystery_face.unwrap();
    let guest_mystery = session.guest_player.as_ref().unwrap().mystery_face.unwrap();
    let target = session
        .shared_board
        .iter()
        .map(|p| p.id)
        .find(|id| *id != host_mystery && *id != guest_mystery)
        .unwrap();

    // Whoever holds the turn eliminates a photo and passes.
    let (active, waiting) = if host.observed().is_my_turn() {
        (&host, &guest)
    } else {
        (&guest, &host)
    };
    let turn = active.observed().current_turn;

    assert!(active.eliminate_photo(target).await.unwrap());
    wait(waiting, "elimination", |g| {
        g.session
            .as_ref()
            .and_then(|s| s.board_photo(target))
            .is_some_and(|p| p.is_eliminated)
    })
    .await;

    assert!(active.end_turn().await.unwrap());
    let w = wait(waiting, "turn handover", |g| g.current_turn != turn).await;
    assert!(w.is_my_turn());

    assert!(guest.make_guess(guest_mystery).await.unwrap());
    let h = wait(&host, "game over", |g| g.game_state == GameState::GameOver).await;
    assert_eq!(h.winner, Some(PlayerRole::Guest));
    assert_eq!(h.i_won(), Some(false));
    assert_eq!(guest.observed().i_won(), Some(true));

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_guess_hands_win_to_opponent() {
    let (host, guest) = playing_pair().await;
    let session = host.observed().session.unwrap();
    let host_mystery = session.host_player.mystery_face.unwrap();
    let wrong = session.shared_board.iter().map(|p| p.id).find(|id| *id != host_mystery).unwrap();

    assert!(!host.make_guess(wrong).await.unwrap());
    let g = wait(&guest, "game over", |g| g.game_state == GameState::GameOver).await;
    assert_eq!(g.winner, Some(PlayerRole::Guest));
    assert_eq!(g.i_won(), Some(true));

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_reset_clears_host_and_drops_guest_session_link() {
    let (host, guest) = joined_pair().await;
    host.reset_game().await.unwrap();

    assert_eq!(host.observed(), ObservedGame::default());
    let mut transport = guest.transport();
    tokio::time::timeout(WAIT, transport.wait_for(|s| !s.is_connected()))
        .await
        .expect("guest still connected")
        .unwrap();
    // The guest keeps its last snapshot until it resets too.
    assert!(guest.observed().session.is_some());

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_guest_leaving_selection_lets_another_guest_join() {
    let (host, guest) = joined_pair().await;
    let addr = host.transport().borrow().listen_addr.expect("host is listening");

    guest.reset_game().await.unwrap();
    let h = wait(&host, "seat released", |g| g.opponent.is_none()).await;
    assert_eq!(h.game_state, GameState::WaitingForPlayers);

    let cleo = spawn_manager(config("Cleo"));
    cleo.join_game_at("Cleo", addr).await.unwrap();
    let h = wait(&host, "second guest seated", |g| g.opponent.is_some()).await;
    assert_eq!(h.opponent.unwrap().name, "Cleo");
    wait(&cleo, "first snapshot", |g| g.session.is_some()).await;

    host.shutdown().await.unwrap();
    guest.shutdown().await.unwrap();
    cleo.shutdown().await.unwrap();
}
