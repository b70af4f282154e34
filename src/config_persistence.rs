//! Config file loading and comment-preserving persistence.

use std::path::Path;

use log::warn;
use toml_edit::{value, Array, DocumentMut, Item, Table};

use crate::config::Config;

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn ensure_section_table(document: &mut DocumentMut, key: &str) {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
}

fn string_list_item(values: &[String]) -> Item {
    let mut array = Array::new();
    for entry in values {
        array.push(entry.as_str());
    }
    value(array)
}

fn write_config_to_document(document: &mut DocumentMut, config: &Config) {
    ensure_section_table(document, "server");
    ensure_section_table(document, "playback");
    ensure_section_table(document, "queue");

    {
        let server = document["server"]
            .as_table_mut()
            .expect("server should be a table");
        set_table_value_preserving_decor(
            server,
            "discovery_url",
            value(config.server.discovery_url.clone()),
        );
        set_table_value_preserving_decor(
            server,
            "auth_token",
            value(config.server.auth_token.clone()),
        );
        set_table_value_preserving_decor(
            server,
            "client_identifier",
            value(config.server.client_identifier.clone()),
        );
        set_table_value_preserving_decor(
            server,
            "preferred_server",
            value(config.server.preferred_server.clone()),
        );
        set_table_value_preserving_decor(
            server,
            "local_network",
            value(config.server.local_network),
        );
    }

    {
        let playback = document["playback"]
            .as_table_mut()
            .expect("playback should be a table");
        set_table_value_preserving_decor(
            playback,
            "force_transcode",
            value(config.playback.force_transcode),
        );
        set_table_value_preserving_decor(
            playback,
            "transcode_codec",
            value(config.playback.transcode_codec.clone()),
        );
        set_table_value_preserving_decor(
            playback,
            "transcode_bitrate_kbps",
            value(i64::from(config.playback.transcode_bitrate_kbps)),
        );
        set_table_value_preserving_decor(
            playback,
            "max_audio_channels",
            value(i64::from(config.playback.max_audio_channels)),
        );
        set_table_value_preserving_decor(
            playback,
            "header_auth_transport",
            value(config.playback.header_auth_transport),
        );
        set_table_value_preserving_decor(
            playback,
            "problematic_containers",
            string_list_item(&config.playback.problematic_containers),
        );
        set_table_value_preserving_decor(
            playback,
            "transcode_containers",
            string_list_item(&config.playback.transcode_containers),
        );
        set_table_value_preserving_decor(
            playback,
            "volume",
            value(f64::from(config.playback.volume)),
        );
    }

    {
        let queue = document["queue"]
            .as_table_mut()
            .expect("queue should be a table");
        set_table_value_preserving_decor(
            queue,
            "persist_threshold",
            value(config.queue.persist_threshold as i64),
        );
        set_table_value_preserving_decor(
            queue,
            "persist_window",
            value(config.queue.persist_window as i64),
        );
    }
}

/// Renders the config into the existing file text, keeping user comments.
pub fn serialize_config_with_preserved_comments(existing_text: &str, config: &Config) -> String {
    let mut document = existing_text.parse::<DocumentMut>().unwrap_or_else(|err| {
        warn!("Config file is not valid TOML, rewriting it: {}", err);
        DocumentMut::new()
    });
    write_config_to_document(&mut document, config);
    document.to_string()
}

/// Persists the config to `path`, preserving comments in an existing file.
pub fn persist_config_file(config: &Config, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!("Failed to create config directory {:?}: {}", parent, err);
            return;
        }
    }
    let existing_text = std::fs::read_to_string(path).unwrap_or_default();
    let next_text = serialize_config_with_preserved_comments(&existing_text, config);
    if let Err(err) = std::fs::write(path, next_text) {
        warn!("Failed to write config file {:?}: {}", path, err);
    }
}

/// Loads the config from `path`, falling back to defaults when the file is
/// missing or unparseable.
pub fn load_config_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return Config::default(),
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!("Failed to parse config file {:?}: {}", path, err);
            Config::default()
        }
    }
}
