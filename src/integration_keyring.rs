//! Keyring helpers for the media server API token.

use keyring::Entry;

const PLEX_SERVICE_NAME: &str = "plextune.backend.plex";

fn token_entry(client_identifier: &str) -> Result<Entry, String> {
    Entry::new(PLEX_SERVICE_NAME, client_identifier)
        .map_err(|err| format!("failed to create keyring entry: {err}"))
}

/// Saves the API token for this client into the OS keyring.
pub fn set_auth_token(client_identifier: &str, token: &str) -> Result<(), String> {
    let entry = token_entry(client_identifier)?;
    entry
        .set_password(token)
        .map_err(|err| format!("failed to set keyring token: {err}"))
}

/// Loads the API token for this client from the OS keyring.
pub fn get_auth_token(client_identifier: &str) -> Result<Option<String>, String> {
    let entry = token_entry(client_identifier)?;
    match entry.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(format!("failed to get keyring token: {err}")),
    }
}

/// Deletes the API token for this client from the OS keyring.
pub fn delete_auth_token(client_identifier: &str) -> Result<(), String> {
    let entry = token_entry(client_identifier)?;
    match entry.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => Err(format!("failed to delete keyring token: {err}")),
    }
}
