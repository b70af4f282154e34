//! Per-track playback URL resolution.
//!
//! Decides, for one queued track and one selected server connection, whether
//! playback uses the track's direct file stream or the server's universal
//! transcoder, and whether the fetch needs identification headers. Resolution
//! never fails: anything unplayable comes back as an empty URL, which callers
//! must treat as "skip this track, do not retry".

use std::collections::HashSet;

use crate::config::PlaybackConfig;
use crate::protocol::QueuedTrack;

/// Resolved playback source for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSource {
    /// Playable URL; empty when the track cannot be played at all.
    pub url: String,
    /// The fetch must carry identification headers and the URL carries no token.
    pub requires_auth_headers: bool,
}

impl StreamSource {
    /// Sentinel for "cannot play, skip".
    pub fn unplayable() -> Self {
        Self {
            url: String::new(),
            requires_auth_headers: false,
        }
    }

    pub fn is_unplayable(&self) -> bool {
        self.url.is_empty()
    }
}

/// Resolution policy derived from configuration plus per-call overrides.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Request a transcoded stream even for direct-playable containers.
    pub force_transcode: bool,
    /// Keep the token out of the URL and authenticate via headers instead.
    pub header_auth_transport: bool,
    pub transcode_codec: String,
    pub transcode_bitrate_kbps: u32,
    pub max_audio_channels: u16,
    problematic_containers: HashSet<String>,
    transcode_containers: HashSet<String>,
}

impl ResolveOptions {
    /// Builds options from the playback config; `force_transcode` is OR-ed
    /// with the config-wide flag so error recovery can force it per call.
    pub fn from_config(config: &PlaybackConfig, force_transcode: bool) -> Self {
        Self {
            force_transcode: force_transcode || config.force_transcode,
            header_auth_transport: config.header_auth_transport,
            transcode_codec: config.transcode_codec.clone(),
            transcode_bitrate_kbps: config.transcode_bitrate_kbps,
            max_audio_channels: config.max_audio_channels,
            problematic_containers: to_lowercase_set(&config.problematic_containers),
            transcode_containers: to_lowercase_set(&config.transcode_containers),
        }
    }

    fn is_problematic(&self, container: &str) -> bool {
        self.problematic_containers
            .contains(&container.to_ascii_lowercase())
    }

    fn needs_transcode(&self, container: &str) -> bool {
        self.transcode_containers
            .contains(&container.to_ascii_lowercase())
    }
}

fn to_lowercase_set(values: &[String]) -> HashSet<String> {
    values
        .iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .collect()
}

/// Container hint for a track: the first media part's container, falling back
/// to the part key's file extension.
fn container_hint(track: &QueuedTrack) -> Option<String> {
    let part = track.media.first()?;
    if !part.container.trim().is_empty() {
        return Some(part.container.trim().to_ascii_lowercase());
    }
    part.part_key
        .rsplit('.')
        .next()
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
        .map(|ext| ext.to_ascii_lowercase())
}

/// Source path for the universal transcoder, derived from the track key.
fn transcode_source_path(track: &QueuedTrack) -> String {
    if track.key.starts_with('/') {
        track.key.clone()
    } else {
        format!("/library/metadata/{}", track.key)
    }
}

fn build_transcode_url(
    track: &QueuedTrack,
    server_uri: &str,
    token: &str,
    opts: &ResolveOptions,
) -> StreamSource {
    let mut url = format!(
        "{}/music/:/transcode/universal/start.{}?path={}&mediaIndex=0&partIndex=0&protocol=http&audioCodec={}&maxAudioBitrate={}&audioChannels={}",
        server_uri.trim_end_matches('/'),
        opts.transcode_codec,
        urlencoding::encode(&transcode_source_path(track)),
        opts.transcode_codec,
        opts.transcode_bitrate_kbps,
        opts.max_audio_channels,
    );
    if opts.header_auth_transport {
        // The token travels in headers only; it must not leak into the URL.
        StreamSource {
            url,
            requires_auth_headers: true,
        }
    } else {
        url.push_str(&format!("&X-Plex-Token={}", urlencoding::encode(token)));
        StreamSource {
            url,
            requires_auth_headers: false,
        }
    }
}

fn build_direct_url(part_key: &str, server_uri: &str, token: &str) -> StreamSource {
    StreamSource {
        url: format!(
            "{}{}?X-Plex-Token={}",
            server_uri.trim_end_matches('/'),
            part_key,
            urlencoding::encode(token)
        ),
        requires_auth_headers: false,
    }
}

/// Resolves the playback source for one track against one server connection.
pub fn resolve_track_playback(
    track: &QueuedTrack,
    server_uri: Option<&str>,
    token: Option<&str>,
    opts: &ResolveOptions,
) -> StreamSource {
    let server_uri = match server_uri {
        Some(uri) if !uri.trim().is_empty() => uri,
        _ => return StreamSource::unplayable(),
    };
    let token = match token {
        Some(token) if !token.trim().is_empty() => token,
        _ => return StreamSource::unplayable(),
    };

    if !opts.force_transcode {
        if let Some(url) = track.playback_url.as_deref() {
            if url.starts_with("http://") || url.starts_with("https://") {
                return StreamSource {
                    url: url.to_string(),
                    requires_auth_headers: false,
                };
            }
        }
    }

    let container = container_hint(track);

    if let Some(container) = container.as_deref() {
        // Unplayable both directly and through the transcoder. Skip.
        if opts.is_problematic(container) {
            return StreamSource::unplayable();
        }
        if opts.force_transcode || opts.needs_transcode(container) {
            return build_transcode_url(track, server_uri, token, opts);
        }
    } else if opts.force_transcode {
        return build_transcode_url(track, server_uri, token, opts);
    }

    match track.media.first() {
        Some(part) if !part.part_key.trim().is_empty() => {
            build_direct_url(&part.part_key, server_uri, token)
        }
        _ => StreamSource::unplayable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MediaPartRef;

    fn track_with_container(container: &str) -> QueuedTrack {
        QueuedTrack {
            key: "1001".to_string(),
            title: "Test Track".to_string(),
            artist: None,
            album: None,
            thumb: None,
            duration_ms: Some(180_000),
            playback_url: None,
            media: vec![MediaPartRef {
                part_key: format!("/library/parts/55/file.{container}"),
                container: container.to_string(),
                size_bytes: 1_000_000,
            }],
        }
    }

    fn options() -> ResolveOptions {
        ResolveOptions::from_config(&crate::config::PlaybackConfig::default(), false)
    }

    #[test]
    fn test_missing_server_or_token_is_unplayable() {
        let track = track_with_container("flac");
        let opts = options();
        assert!(resolve_track_playback(&track, None, Some("tok"), &opts).is_unplayable());
        assert!(resolve_track_playback(&track, Some("http://s:32400"), None, &opts).is_unplayable());
        assert!(resolve_track_playback(&track, Some("  "), Some("tok"), &opts).is_unplayable());
    }

    #[test]
    fn test_known_absolute_url_is_returned_unchanged() {
        let mut track = track_with_container("mp3");
        track.playback_url = Some("https://cdn.example/already.mp3".to_string());
        let source = resolve_track_playback(
            &track,
            Some("http://server:32400"),
            Some("tok"),
            &options(),
        );
        assert_eq!(source.url, "https://cdn.example/already.mp3");
        assert!(!source.requires_auth_headers);
    }

    #[test]
    fn test_forced_transcode_ignores_known_url() {
        let mut track = track_with_container("mp3");
        track.playback_url = Some("https://cdn.example/already.mp3".to_string());
        let opts = ResolveOptions::from_config(&crate::config::PlaybackConfig::default(), true);
        let source =
            resolve_track_playback(&track, Some("http://server:32400"), Some("tok"), &opts);
        assert!(source.url.contains("/music/:/transcode/universal/start.mp3"));
    }

    #[test]
    fn test_problematic_container_is_unplayable_even_with_forced_transcode() {
        let track = track_with_container("wma");
        let opts = ResolveOptions::from_config(&crate::config::PlaybackConfig::default(), true);
        let source =
            resolve_track_playback(&track, Some("http://server:32400"), Some("tok"), &opts);
        assert!(source.is_unplayable());
    }

    #[test]
    fn test_transcode_container_builds_universal_transcode_url() {
        let track = track_with_container("ape");
        let source = resolve_track_playback(
            &track,
            Some("http://server:32400"),
            Some("se cret"),
            &options(),
        );
        assert!(source
            .url
            .starts_with("http://server:32400/music/:/transcode/universal/start.mp3?"));
        assert!(source.url.contains("path=%2Flibrary%2Fmetadata%2F1001"));
        assert!(source.url.contains("mediaIndex=0"));
        assert!(source.url.contains("partIndex=0"));
        assert!(source.url.contains("protocol=http"));
        assert!(source.url.contains("audioCodec=mp3"));
        assert!(source.url.contains("maxAudioBitrate=320"));
        assert!(source.url.contains("audioChannels=2"));
        assert!(source.url.contains("X-Plex-Token=se%20cret"));
        assert!(!source.requires_auth_headers);
    }

    #[test]
    fn test_header_transport_keeps_token_out_of_url() {
        let mut config = crate::config::PlaybackConfig::default();
        config.header_auth_transport = true;
        let opts = ResolveOptions::from_config(&config, true);
        let track = track_with_container("flac");
        let source =
            resolve_track_playback(&track, Some("http://server:32400"), Some("tok"), &opts);
        assert!(source.requires_auth_headers);
        assert!(!source.url.contains("tok"));
        assert!(!source.url.contains("X-Plex-Token"));
    }

    #[test]
    fn test_direct_playable_container_streams_the_part_key() {
        let track = track_with_container("flac");
        let source = resolve_track_playback(
            &track,
            Some("http://server:32400/"),
            Some("tok"),
            &options(),
        );
        assert_eq!(
            source.url,
            "http://server:32400/library/parts/55/file.flac?X-Plex-Token=tok"
        );
        assert!(!source.requires_auth_headers);
    }

    #[test]
    fn test_track_without_media_parts_is_unplayable() {
        let mut track = track_with_container("flac");
        track.media.clear();
        let source = resolve_track_playback(
            &track,
            Some("http://server:32400"),
            Some("tok"),
            &options(),
        );
        assert!(source.is_unplayable());
    }

    #[test]
    fn test_container_falls_back_to_part_key_extension() {
        let mut track = track_with_container("wma");
        track.media[0].container = String::new();
        let source = resolve_track_playback(
            &track,
            Some("http://server:32400"),
            Some("tok"),
            &options(),
        );
        assert!(source.is_unplayable());
    }
}
