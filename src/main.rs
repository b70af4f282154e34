mod app_context;
mod audio_engine;
mod backends;
mod config;
mod config_persistence;
mod connection;
mod db_manager;
mod integration_keyring;
mod library_manager;
mod media;
mod media_controls_manager;
mod now_playing;
mod player_state;
mod protocol;
mod queue;
mod queue_persistence;
mod stream_url;

use std::io::{BufRead, Write as _};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{error, info, warn};
use tokio::sync::broadcast;

use app_context::{AppContext, PersistencePaths};
use audio_engine::AudioEngine;
use backends::plex::PlexAdapter;
use db_manager::DbManager;
use library_manager::LibraryManager;
use media::cpal_element::CpalMediaElement;
use media_controls_manager::MediaControlsManager;
use now_playing::NowPlayingManager;
use protocol::{LibraryMessage, Message, PlaybackMessage, QueueMessage, QueuedTrack};

#[derive(Debug, Clone, PartialEq)]
enum CliCommand {
    Help,
    Servers,
    UseServer(usize),
    Playlists,
    OpenPlaylist { index: usize, start: usize },
    PlayPause,
    Next,
    Previous,
    PlayIndex(usize),
    Seek(f64),
    Volume(f32),
    Mute,
    Shuffle,
    Repeat,
    Remove(usize),
    Rate(f32),
    TopRated(f32),
    NewPlaylist(String),
    SetToken(String),
    Logout,
    Quit,
}

fn parse_command(line: &str) -> Option<CliCommand> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    match command {
        "help" | "?" => Some(CliCommand::Help),
        "servers" => Some(CliCommand::Servers),
        "use" => parts.next()?.parse().ok().map(CliCommand::UseServer),
        "playlists" | "pl" => Some(CliCommand::Playlists),
        "open" => {
            let index = parts.next()?.parse().ok()?;
            let start = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            Some(CliCommand::OpenPlaylist { index, start })
        }
        "play" | "pause" | "p" => Some(CliCommand::PlayPause),
        "next" | "n" => Some(CliCommand::Next),
        "prev" | "previous" => Some(CliCommand::Previous),
        "goto" => parts.next()?.parse().ok().map(CliCommand::PlayIndex),
        "seek" => parts.next()?.parse().ok().map(CliCommand::Seek),
        "vol" | "volume" => parts.next()?.parse().ok().map(CliCommand::Volume),
        "mute" => Some(CliCommand::Mute),
        "shuffle" => Some(CliCommand::Shuffle),
        "repeat" => Some(CliCommand::Repeat),
        "rm" | "remove" => parts.next()?.parse().ok().map(CliCommand::Remove),
        "rate" => parts.next()?.parse().ok().map(CliCommand::Rate),
        "top" => {
            let min = parts.next().and_then(|s| s.parse().ok()).unwrap_or(7.0);
            Some(CliCommand::TopRated(min))
        }
        "newpl" => {
            let title = parts.collect::<Vec<_>>().join(" ");
            if title.is_empty() {
                None
            } else {
                Some(CliCommand::NewPlaylist(title))
            }
        }
        "token" => parts.next().map(|t| CliCommand::SetToken(t.to_string())),
        "logout" => Some(CliCommand::Logout),
        "quit" | "exit" | "q" => Some(CliCommand::Quit),
        _ => None,
    }
}

const HELP_TEXT: &str = "\
commands:
  servers              list discovered servers
  use N                select server N and pick its best connection
  playlists            list audio playlists on the selected server
  open N [START]       queue playlist N, optionally starting at track START
  play | pause         toggle playback
  next | prev          transport
  goto N               jump to queue index N
  seek SECONDS         absolute seek
  vol 0.0-1.0          set volume
  mute                 toggle mute
  shuffle              toggle shuffle
  repeat               cycle repeat (off -> playlist -> track)
  rm N                 remove queue index N
  rate 0-10            rate the current track
  top [MIN]            list top-rated tracks (default minimum 7)
  newpl TITLE          create a playlist
  token VALUE          store the API token in the OS keyring
  logout               drop session state and the stored token
  quit";

/// Derives the numeric rating key from a metadata key.
fn rating_key_of(track: &QueuedTrack) -> String {
    track
        .key
        .rsplit('/')
        .next()
        .unwrap_or(track.key.as_str())
        .to_string()
}

fn resolve_auth_token(config: &config::Config) -> String {
    if !config.server.auth_token.is_empty() {
        return config.server.auth_token.clone();
    }
    match integration_keyring::get_auth_token(&config.server.client_identifier) {
        Ok(Some(token)) => return token,
        Ok(None) => {}
        Err(err) => warn!("Failed to read token from keyring: {}", err),
    }
    std::env::var("PLEXTUNE_TOKEN").unwrap_or_default()
}

fn spawn_background_services(context: &AppContext, auth_token: String) {
    let config = context.config();

    let engine_receiver = context.bus_sender.subscribe();
    let engine_sender = context.bus_sender.clone();
    let engine_client_id = config.server.client_identifier.clone();
    let engine_volume = config.playback.volume;
    thread::Builder::new()
        .name("audio-engine".to_string())
        .spawn(move || {
            let element = Box::new(CpalMediaElement::new(engine_sender.clone(), engine_volume));
            let mut engine = AudioEngine::new(
                engine_receiver,
                engine_sender,
                element,
                engine_client_id,
                engine_volume,
            );
            engine.run();
        })
        .expect("failed to spawn audio engine thread");

    let now_playing_receiver = context.bus_sender.subscribe();
    let now_playing_sender = context.bus_sender.clone();
    let now_playing_config = config.clone();
    thread::Builder::new()
        .name("now-playing".to_string())
        .spawn(move || {
            let db = match DbManager::new() {
                Ok(db) => db,
                Err(err) => {
                    error!("Falling back to in-memory queue store: {}", err);
                    DbManager::new_in_memory().expect("in-memory store must open")
                }
            };
            let mut manager = NowPlayingManager::new(
                now_playing_receiver,
                now_playing_sender,
                db,
                &now_playing_config,
            );
            manager.run();
        })
        .expect("failed to spawn now-playing thread");

    let library_receiver = context.bus_sender.subscribe();
    let library_sender = context.bus_sender.clone();
    let library_config = config.clone();
    thread::Builder::new()
        .name("library".to_string())
        .spawn(move || {
            let adapter = Box::new(PlexAdapter::new());
            let mut manager = LibraryManager::new(
                library_receiver,
                library_sender,
                adapter,
                &library_config,
                auth_token,
            );
            manager.run();
        })
        .expect("failed to spawn library thread");

    let controls_receiver = context.bus_sender.subscribe();
    let controls_sender = context.bus_sender.clone();
    thread::Builder::new()
        .name("media-controls".to_string())
        .spawn(move || {
            let mut manager = MediaControlsManager::new(controls_receiver, controls_sender);
            manager.run();
        })
        .expect("failed to spawn media controls thread");
}

/// Prints bus notifications for the interactive session and tracks the
/// current queue entry so CLI commands can reference it.
fn spawn_notification_printer(
    context: &AppContext,
    current_track: Arc<Mutex<Option<QueuedTrack>>>,
) {
    let mut receiver = context.bus_sender.subscribe();
    thread::Builder::new()
        .name("notifications".to_string())
        .spawn(move || {
            let mut last_error: Option<String> = None;
            loop {
                match receiver.blocking_recv() {
                    Ok(Message::Server(protocol::ServerMessage::ServersDiscovered(servers))) => {
                        for (index, server) in servers.iter().enumerate() {
                            println!(
                                "  [{}] {} ({} connection(s))",
                                index,
                                server.name,
                                server.connections.len()
                            );
                        }
                    }
                    Ok(Message::Server(protocol::ServerMessage::ConnectionSelected {
                        server_name,
                        server_uri,
                        ..
                    })) => println!("connected to {server_name} via {server_uri}"),
                    Ok(Message::Library(LibraryMessage::PlaylistsResult(playlists))) => {
                        for (index, playlist) in playlists.iter().enumerate() {
                            println!(
                                "  [{}] {} ({} tracks){}",
                                index,
                                playlist.title,
                                playlist.track_count,
                                if playlist.smart { " [smart]" } else { "" }
                            );
                        }
                    }
                    Ok(Message::Library(LibraryMessage::TopRatedResult(tracks))) => {
                        for track in &tracks {
                            println!(
                                "  {} - {}",
                                track.artist.as_deref().unwrap_or("?"),
                                track.title
                            );
                        }
                    }
                    Ok(Message::Library(LibraryMessage::RatingSaved { rating, .. })) => {
                        println!("rated {rating}/10");
                    }
                    Ok(Message::Library(LibraryMessage::PlaylistCreated { title, .. })) => {
                        println!("created playlist '{title}'");
                    }
                    Ok(Message::Library(LibraryMessage::LibraryError(message))) => {
                        println!("error: {message}");
                    }
                    Ok(Message::Queue(QueueMessage::QueueChanged {
                        len,
                        current_index,
                        current,
                        shuffle,
                        repeat,
                    })) => {
                        if let Some(track) = &current {
                            println!(
                                "now queued: {} - {} [{}/{}] shuffle={} repeat={:?}",
                                track.artist.as_deref().unwrap_or("?"),
                                track.title,
                                current_index.map(|i| i + 1).unwrap_or(0),
                                len,
                                shuffle,
                                repeat
                            );
                        }
                        match current_track.lock() {
                            Ok(mut slot) => *slot = current,
                            Err(poisoned) => *poisoned.into_inner() = current,
                        }
                    }
                    Ok(Message::Playback(PlaybackMessage::StateChanged(state))) => {
                        if state.error != last_error {
                            if let Some(message) = &state.error {
                                println!("playback error: {message}");
                            }
                            last_error = state.error.clone();
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .expect("failed to spawn notification thread");
}

fn main() {
    colog::init();

    let persistence_paths = PersistencePaths::from_platform_dirs();
    let mut config = config_persistence::load_config_file(&persistence_paths.config_file);
    if config.server.client_identifier.is_empty() {
        config.server.client_identifier = uuid::Uuid::new_v4().to_string();
        config_persistence::persist_config_file(&config, &persistence_paths.config_file);
        info!(
            "Generated client identifier {}",
            config.server.client_identifier
        );
    }

    let auth_token = resolve_auth_token(&config);
    if auth_token.is_empty() {
        warn!("No API token configured; run `token <value>` before connecting");
    }

    let (bus_sender, _) = broadcast::channel::<Message>(4096);
    let context = AppContext::new(bus_sender, config.clone(), persistence_paths);

    spawn_background_services(&context, auth_token.clone());
    let current_track: Arc<Mutex<Option<QueuedTrack>>> = Arc::new(Mutex::new(None));
    spawn_notification_printer(&context, Arc::clone(&current_track));

    if !auth_token.is_empty() {
        let _ = context
            .bus_sender
            .send(Message::Library(LibraryMessage::RequestServers));
    }

    println!("plextune {} - type 'help' for commands", env!("CARGO_PKG_VERSION"));
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                error!("Failed to read input: {}", err);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match parse_command(line) {
            Some(command) => command,
            None => {
                println!("unrecognized command; type 'help'");
                continue;
            }
        };

        let send = |message: Message| {
            let _ = context.bus_sender.send(message);
        };
        match command {
            CliCommand::Help => println!("{HELP_TEXT}"),
            CliCommand::Servers => send(Message::Library(LibraryMessage::RequestServers)),
            CliCommand::UseServer(index) => {
                send(Message::Library(LibraryMessage::SelectServer(index)))
            }
            CliCommand::Playlists => send(Message::Library(LibraryMessage::RequestPlaylists)),
            CliCommand::OpenPlaylist { index, start } => {
                send(Message::Library(LibraryMessage::OpenPlaylist {
                    playlist_index: index,
                    start_index: start,
                }))
            }
            CliCommand::PlayPause => send(Message::Playback(PlaybackMessage::TogglePlayPause)),
            CliCommand::Next => send(Message::Playback(PlaybackMessage::Next)),
            CliCommand::Previous => send(Message::Playback(PlaybackMessage::Previous)),
            CliCommand::PlayIndex(index) => {
                send(Message::Playback(PlaybackMessage::PlayTrackAtIndex(index)))
            }
            CliCommand::Seek(position) => send(Message::Playback(PlaybackMessage::Seek(position))),
            CliCommand::Volume(volume) => {
                send(Message::Playback(PlaybackMessage::SetVolume(volume)))
            }
            CliCommand::Mute => send(Message::Playback(PlaybackMessage::ToggleMute)),
            CliCommand::Shuffle => send(Message::Queue(QueueMessage::ToggleShuffle)),
            CliCommand::Repeat => send(Message::Queue(QueueMessage::CycleRepeat)),
            CliCommand::Remove(index) => send(Message::Queue(QueueMessage::RemoveFromQueue(index))),
            CliCommand::Rate(rating) => {
                let track = match current_track.lock() {
                    Ok(slot) => slot.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                match track {
                    Some(track) => send(Message::Library(LibraryMessage::RateTrack {
                        rating_key: rating_key_of(&track),
                        rating,
                    })),
                    None => println!("nothing is queued"),
                }
            }
            CliCommand::TopRated(min_rating) => {
                send(Message::Library(LibraryMessage::RequestTopRated {
                    min_rating,
                    limit: 50,
                }))
            }
            CliCommand::NewPlaylist(title) => {
                send(Message::Library(LibraryMessage::CreatePlaylist { title }))
            }
            CliCommand::SetToken(token) => {
                let client_identifier = context.config().server.client_identifier.clone();
                match integration_keyring::set_auth_token(&client_identifier, &token) {
                    Ok(()) => println!("token stored; restart to reconnect"),
                    Err(err) => println!("error: {err}"),
                }
            }
            CliCommand::Logout => {
                let client_identifier = context.config().server.client_identifier.clone();
                if let Err(err) = integration_keyring::delete_auth_token(&client_identifier) {
                    warn!("Failed to delete stored token: {}", err);
                }
                context.reset_session();
                println!("session cleared");
            }
            CliCommand::Quit => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_commands() {
        assert_eq!(parse_command("next"), Some(CliCommand::Next));
        assert_eq!(parse_command("n"), Some(CliCommand::Next));
        assert_eq!(parse_command("prev"), Some(CliCommand::Previous));
        assert_eq!(parse_command("play"), Some(CliCommand::PlayPause));
        assert_eq!(parse_command("pause"), Some(CliCommand::PlayPause));
    }

    #[test]
    fn test_parse_open_with_optional_start() {
        assert_eq!(
            parse_command("open 2"),
            Some(CliCommand::OpenPlaylist { index: 2, start: 0 })
        );
        assert_eq!(
            parse_command("open 2 14"),
            Some(CliCommand::OpenPlaylist {
                index: 2,
                start: 14
            })
        );
        assert_eq!(parse_command("open"), None);
        assert_eq!(parse_command("open x"), None);
    }

    #[test]
    fn test_parse_new_playlist_joins_title_words() {
        assert_eq!(
            parse_command("newpl Morning Coffee Mix"),
            Some(CliCommand::NewPlaylist("Morning Coffee Mix".to_string()))
        );
        assert_eq!(parse_command("newpl"), None);
    }

    #[test]
    fn test_parse_top_defaults_minimum_rating() {
        assert_eq!(parse_command("top"), Some(CliCommand::TopRated(7.0)));
        assert_eq!(parse_command("top 9"), Some(CliCommand::TopRated(9.0)));
    }

    #[test]
    fn test_unknown_input_is_rejected() {
        assert_eq!(parse_command("frobnicate"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_rating_key_is_last_key_segment() {
        let track = QueuedTrack {
            key: "/library/metadata/1234".to_string(),
            title: "T".to_string(),
            artist: None,
            album: None,
            thumb: None,
            duration_ms: None,
            playback_url: None,
            media: Vec::new(),
        };
        assert_eq!(rating_key_of(&track), "1234");
    }
}
