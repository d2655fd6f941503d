//! External song search against the iTunes Search API.
//!
//! One call per lookup: the term is built from cleaned artist/track text, the JSON payload is
//! parsed into [`SearchCandidate`]s and thumbnail artwork URLs are upgraded to the larger
//! rendition. Retries are the caller's business; this client never retries.

use std::io::Read;

use serde::Deserialize;

use crate::config::LookupConfig;
use crate::protocol::{ImageReference, SearchCandidate};

const THUMBNAIL_SIZE_SEGMENT: &str = "100x100";
const FULL_SIZE_SEGMENT: &str = "600x600";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("request timed out")]
    Timeout,
}

/// Blocking search boundary. Implementations must be cheap to share across tasks.
pub trait ArtworkSearch: Send + Sync {
    fn search(&self, artist: &str, track: &str) -> Result<Vec<SearchCandidate>, LookupError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesSearchResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<ItunesResult>,
}

#[derive(Debug, Deserialize)]
struct ItunesResult {
    #[serde(rename = "artistName", default)]
    artist_name: Option<String>,
    #[serde(rename = "trackName", default)]
    track_name: Option<String>,
    #[serde(rename = "artworkUrl100", default)]
    artwork_url100: Option<String>,
    #[serde(rename = "artworkUrl60", default)]
    artwork_url60: Option<String>,
}

/// Swaps the thumbnail size segment for the full-size one; other URLs pass through.
pub fn upgrade_artwork_url(url: &str) -> String {
    if url.contains(THUMBNAIL_SIZE_SEGMENT) {
        url.replace(THUMBNAIL_SIZE_SEGMENT, FULL_SIZE_SEGMENT)
    } else {
        url.to_string()
    }
}

fn strip_bracketed(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    for ch in value.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn strip_featured_credit(value: &str) -> &str {
    let lowered = value.to_ascii_lowercase();
    [" feat.", " feat ", " ft.", " ft ", " featuring "]
        .iter()
        .filter_map(|marker| lowered.find(marker))
        .min()
        .map(|index| &value[..index])
        .unwrap_or(value)
}

/// Removes bracketed qualifiers and featured-artist credits that hurt search recall.
pub fn clean_search_text(value: &str) -> String {
    let without_brackets = strip_bracketed(value);
    let cleaned = strip_featured_credit(&without_brackets)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        value.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        cleaned
    }
}

pub fn search_term(artist: &str, track: &str) -> String {
    let artist = clean_search_text(artist);
    let track = clean_search_text(track);
    match (artist.is_empty(), track.is_empty()) {
        (true, _) => track,
        (_, true) => artist,
        _ => format!("{artist} {track}"),
    }
}

pub fn search_request_url(config: &LookupConfig, term: &str) -> String {
    let limit = config.effective_result_limit().to_string();
    let mut params: Vec<(&str, &str)> = vec![
        ("term", term),
        ("media", "music"),
        ("entity", "song"),
        ("limit", limit.as_str()),
    ];
    if !config.country.trim().is_empty() {
        params.push(("country", config.country.trim()));
    }

    let mut url = config.search_base_url.clone();
    url.push('?');
    for (index, (key, value)) in params.iter().enumerate() {
        if index > 0 {
            url.push('&');
        }
        url.push_str(key);
        url.push('=');
        url.push_str(urlencoding::encode(value).as_ref());
    }
    url
}

/// Parses a search payload. Anything that is not the expected JSON object is an error.
pub fn parse_search_response(body: &str) -> Result<Vec<SearchCandidate>, LookupError> {
    let parsed: ItunesSearchResponse = serde_json::from_str(body)
        .map_err(|error| LookupError::MalformedResponse(error.to_string()))?;
    if parsed.result_count as usize != parsed.results.len() {
        log::debug!(
            "iTunes resultCount {} disagrees with {} results",
            parsed.result_count,
            parsed.results.len()
        );
    }
    Ok(parsed
        .results
        .into_iter()
        .map(|result| SearchCandidate {
            artist: result.artist_name.unwrap_or_default(),
            track: result.track_name.unwrap_or_default(),
            artwork: result
                .artwork_url100
                .or(result.artwork_url60)
                .filter(|url| !url.trim().is_empty())
                .map(|url| ImageReference::new(upgrade_artwork_url(&url))),
        })
        .collect())
}

fn is_timeout_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("timed out") || lowered.contains("timeout")
}

fn classify_ureq_failure(error: &ureq::Error) -> LookupError {
    match error {
        ureq::Error::Status(code, _) => LookupError::Network(format!("HTTP status {code}")),
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            if is_timeout_message(&message) {
                LookupError::Timeout
            } else {
                LookupError::Network(message)
            }
        }
    }
}

fn classify_io_failure(error: &std::io::Error) -> LookupError {
    if matches!(
        error.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || is_timeout_message(&error.to_string())
    {
        LookupError::Timeout
    } else {
        LookupError::Network(format!("Failed to read response: {error}"))
    }
}

/// Live client backed by a shared `ureq` agent.
pub struct ItunesSearchClient {
    config: LookupConfig,
    http_client: ureq::Agent,
}

impl ItunesSearchClient {
    pub fn new(config: LookupConfig) -> Self {
        let timeout = config.request_timeout();
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            config,
            http_client,
        }
    }
}

impl ArtworkSearch for ItunesSearchClient {
    fn search(&self, artist: &str, track: &str) -> Result<Vec<SearchCandidate>, LookupError> {
        let url = search_request_url(&self.config, &search_term(artist, track));
        let response = self
            .http_client
            .get(&url)
            .set("User-Agent", &self.config.user_agent)
            .set("Accept", "application/json")
            .call()
            .map_err(|error| classify_ureq_failure(&error))?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| classify_io_failure(&error))?;
        parse_search_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        clean_search_text, classify_io_failure, classify_ureq_failure, parse_search_response, search_request_url,
        search_term, upgrade_artwork_url, LookupError,
    };
    use crate::config::LookupConfig;

    #[test]
    fn test_upgrade_artwork_url_swaps_thumbnail_segment() {
        assert_eq!(
            upgrade_artwork_url("https://is1.mzstatic.com/image/thumb/a/100x100bb.jpg"),
            "https://is1.mzstatic.com/image/thumb/a/600x600bb.jpg"
        );
        assert_eq!(
            upgrade_artwork_url("https://img.example/cover.png"),
            "https://img.example/cover.png"
        );
    }

    #[test]
    fn test_clean_search_text_drops_qualifiers_and_features() {
        assert_eq!(clean_search_text("Anti-Hero (Live) [2023]"), "Anti-Hero");
        assert_eq!(clean_search_text("Sample Artist feat. Guest"), "Sample Artist");
        assert_eq!(clean_search_text("Artist FT. Guest"), "Artist");
        assert_eq!(clean_search_text("(Intro)"), "(Intro)");
    }

    #[test]
    fn test_search_term_joins_cleaned_fields() {
        assert_eq!(
            search_term("Taylor Swift", "Anti-Hero (Acoustic)"),
            "Taylor Swift Anti-Hero"
        );
        assert_eq!(search_term("", "Song"), "Song");
    }

    #[test]
    fn test_search_request_url_encodes_term_and_fixed_params() {
        let mut config = LookupConfig::default();
        config.country = "US".to_string();
        let url = search_request_url(&config, "AC/DC Back in Black");
        assert_eq!(
            url,
            "https://itunes.apple.com/search?term=AC%2FDC%20Back%20in%20Black&media=music&entity=song&limit=5&country=US"
        );
    }

    #[test]
    fn test_parse_search_response_reads_candidates() {
        let body = r#"{
            "resultCount": 2,
            "results": [
                {"artistName": "Taylor Swift", "trackName": "Anti-Hero",
                 "artworkUrl100": "https://is1.mzstatic.com/x/100x100bb.jpg"},
                {"artistName": "Other", "trackName": "Song"}
            ]
        }"#;
        let candidates = parse_search_response(body).expect("valid payload");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].artist, "Taylor Swift");
        assert_eq!(
            candidates[0].artwork.as_ref().map(|image| image.as_str()),
            Some("https://is1.mzstatic.com/x/600x600bb.jpg")
        );
        assert!(candidates[1].artwork.is_none());
    }

    #[test]
    fn test_parse_search_response_rejects_non_json() {
        assert!(matches!(
            parse_search_response("<html>oops</html>"),
            Err(LookupError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_search_response("42"),
            Err(LookupError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_result_list_is_not_an_error() {
        let candidates =
            parse_search_response(r#"{"resultCount": 0, "results": []}"#).expect("valid payload");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_classify_io_failure_detects_timeouts() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(classify_io_failure(&timed_out), LookupError::Timeout);
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            classify_io_failure(&reset),
            LookupError::Network(_)
        ));
    }

    #[test]
    fn test_classify_ureq_status_is_network_failure() {
        let response =
            ureq::Response::new(503, "Service Unavailable", "").expect("synthetic response");
        let failure = ureq::Error::Status(503, response);
        assert_eq!(
            classify_ureq_failure(&failure),
            LookupError::Network("HTTP status 503".to_string())
        );
    }

    #[test]
    fn test_classify_ureq_refused_connection_is_network_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind local port");
        let address = listener.local_addr().expect("local address");
        drop(listener);

        let failure = ureq::get(&format!("http://{address}/search"))
            .call()
            .expect_err("nothing listens on the port");
        assert!(matches!(
            classify_ureq_failure(&failure),
            LookupError::Network(_)
        ));
    }
}
