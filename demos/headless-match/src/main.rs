//! A bot match without a UI.
//!
//! ```text
//! headless-match host  [config.toml]
//! headless-match guest [config.toml]
//! headless-match guest-at <host:port> [config.toml]
//! ```
//!
//! The host creates a game and waits; the guest discovers it (or dials
//! the given address), both pick eight generated "photos", and the bots
//! play until someone guesses. A bot guesses its own mystery face once a
//! quarter of the board is gone.

use std::net::SocketAddr;
use std::time::Duration;

use kaunwho::prelude::*;
use rand::seq::IndexedRandom;

const PHOTOS_PER_BOT: u8 = 8;
const TURN_PAUSE: Duration = Duration::from_millis(400);

enum Role {
    Host,
    Guest,
    GuestAt(SocketAddr),
}

fn parse_args() -> Result<(Role, Option<String>), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let role = match args.next().as_deref() {
        Some("host") => Role::Host,
        Some("guest") => Role::Guest,
        Some("guest-at") => {
            let addr = args.next().ok_or("guest-at needs an address")?;
            Role::GuestAt(addr.parse()?)
        }
        _ => return Err("usage: headless-match host|guest|guest-at <addr> [config.toml]".into()),
    };
    Ok((role, args.next()))
}

fn load_config(path: Option<&str>) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ManagerConfig::from_toml_str(&std::fs::read_to_string(path)?)?),
        None => Ok(ManagerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info,kaunwho=debug");

    let (role, config_path) = parse_args()?;
    let mut config = load_config(config_path.as_deref())?;
    let name = match role {
        Role::Host => "Ava",
        Role::Guest | Role::GuestAt(_) => "Ben",
    };
    config.device_name = name.into();
    let handle = spawn_manager(config);

    match role {
        Role::Host => {
            handle.create_game(name).await?;
            let listen_addr = handle.transport().borrow().listen_addr;
            if let Some(addr) = listen_addr {
                tracing::info!(%addr, peer = %handle.local_peer(), "waiting for a guest");
            }
        }
        Role::Guest => {
            handle.start_discovery().await?;
            let mut transport = handle.transport();
            let host = transport
                .wait_for(|s| !s.discovered_peers.is_empty())
                .await
                .map_err(|_| KaunWhoError::ManagerUnavailable)?
                .discovered_peers[0]
                .clone();
            tracing::info!(%host, "found a game");
            handle.join_game(name, host).await?;
        }
        Role::GuestAt(addr) => handle.join_game_at(name, addr).await?,
    }

    handle
        .wait_until(|g| g.game_state == GameState::PhotoSelection && g.opponent.is_some())
        .await?;
    let seed = u8::from(matches!(role, Role::Host));
    for i in 0..PHOTOS_PER_BOT {
        handle.add_photo(vec![seed, i]).await?;
    }

    if matches!(role, Role::Host) {
        handle
            .wait_until(|g| g.opponent.as_ref().is_some_and(|p| p.photos.len() >= usize::from(PHOTOS_PER_BOT)))
            .await?;
        handle.start_game().await?;
    }

    let outcome = play(&handle).await?;
    match outcome.i_won() {
        Some(true) => tracing::info!("we won"),
        Some(false) => tracing::info!("we lost"),
        None => tracing::info!("no winner recorded"),
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown().await?;
    Ok(())
}

/// Plays turns until the game is over and returns the final state.
async fn play(handle: &ManagerHandle) -> Result<ObservedGame, KaunWhoError> {
    loop {
        let game = handle
            .wait_until(|g| g.game_state == GameState::GameOver || (g.game_state == GameState::Playing && g.is_my_turn()))
            .await?;
        if game.game_state == GameState::GameOver {
            return Ok(game);
        }
        tokio::time::sleep(TURN_PAUSE).await;

        let (Some(session), Some(me)) = (game.session.as_ref(), game.my_player.as_ref()) else {
            continue;
        };
        let mystery = me.mystery_face;
        let standing: Vec<PhotoId> = session
            .shared_board
            .iter()
            .filter(|p| !p.is_eliminated && Some(p.id) != mystery)
            .map(|p| p.id)
            .collect();
        let eliminated = session.shared_board.iter().filter(|p| p.is_eliminated).count();

        match (mystery, eliminated * 4 >= session.shared_board.len()) {
            (Some(mystery), true) => {
                let correct = handle.make_guess(mystery).await?;
                tracing::info!(correct, "guessed");
            }
            _ => {
                if let Some(photo) = standing.choose(&mut rand::rng()) {
                    handle.eliminate_photo(*photo).await?;
                    tracing::info!(%photo, left = standing.len() - 1, "eliminated");
                }
                handle.end_turn().await?;
            }
        }
    }
}
