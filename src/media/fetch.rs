//! Header-authenticated blob fetches.
//!
//! Used for streams whose URL must stay token-free: the bytes are fetched
//! with identification headers and materialized as a temp blob file the media
//! element can play.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

/// Shared HTTP agent configuration for media fetches.
pub fn build_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(30))
        .timeout_write(Duration::from_secs(30))
        .build()
}

/// Downloads `url` with identification headers into a fresh temp blob file.
pub fn fetch_to_blob(
    agent: &ureq::Agent,
    url: &str,
    token: &str,
    client_identifier: &str,
) -> Result<PathBuf, String> {
    let response = agent
        .get(url)
        .set("X-Plex-Token", token)
        .set("X-Plex-Client-Identifier", client_identifier)
        .set("Accept", "*/*")
        .call()
        .map_err(|err| format!("blob fetch failed: {err}"))?;

    let path = std::env::temp_dir().join(format!("plextune-blob-{}.bin", uuid::Uuid::new_v4()));
    let mut file = std::fs::File::create(&path)
        .map_err(|err| format!("failed to create blob file {:?}: {err}", path))?;
    let mut reader = response.into_reader();
    match io::copy(&mut reader, &mut file) {
        Ok(bytes) => {
            debug!("Fetched {} bytes into blob {:?}", bytes, path);
            Ok(path)
        }
        Err(err) => {
            let _ = std::fs::remove_file(&path);
            Err(format!("blob download failed: {err}"))
        }
    }
}

/// Deletes a blob file created by [`fetch_to_blob`]; missing files are fine.
pub fn remove_blob(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed blob {:?}", path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!("Failed to remove blob {:?}: {}", path, err),
    }
}
