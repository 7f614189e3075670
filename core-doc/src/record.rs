//! Song record data model.
//!
//! A [`SongRecord`] is the unit stored in all three replicated sequences. It
//! is immutable once inserted except for the status/title rewrites the
//! download orchestrator performs, which are modeled as whole-record
//! replacement (delete then reinsert) rather than field mutation.

use bridge_traits::{AvailableSong, FetchedAsset};
use serde::{Deserialize, Serialize};

use crate::error::DocError;

/// Download lifecycle status carried by DownloadRequests entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Submitted, not yet claimed by the orchestrator
    Pending,
    /// Claimed by the orchestrator, fetch in flight
    Downloading,
    /// Fetch failed; entry stays until cleared or resubmitted
    Error,
}

impl DownloadStatus {
    /// Wire string representation, as stored in record payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Error => "error",
        }
    }

    /// Check if status is terminal (the orchestrator will not touch it again).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "error" => Ok(Self::Error),
            _ => Err(DocError::MalformedUpdate(format!(
                "unknown download status: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One song as stored in the replicated sequences.
///
/// The JSON wire shape (`downloadStatus` field name, optional fields omitted)
/// matches what all replicas exchange, so two implementations reading the same
/// document agree on the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    /// Stable external identifier, e.g. a media id.
    pub key: String,
    /// Human-readable title. Replaced with a failure message on download error.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Duration in whole seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Present only while the record lives in DownloadRequests.
    #[serde(
        rename = "downloadStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub download_status: Option<DownloadStatus>,
}

impl SongRecord {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            artist: None,
            duration: None,
            download_status: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// The record as it enters DownloadRequests.
    pub fn pending_download(mut self) -> Self {
        self.download_status = Some(DownloadStatus::Pending);
        self
    }

    /// The record as rewritten when the orchestrator claims it.
    pub fn into_downloading(mut self) -> Self {
        self.download_status = Some(DownloadStatus::Downloading);
        self
    }

    /// The record as rewritten when a fetch fails. The title carries the
    /// failure message so every replica can render it without extra state.
    pub fn into_error(mut self, message: &str) -> Self {
        self.title = format!("Error: {message}");
        self.download_status = Some(DownloadStatus::Error);
        self
    }

    /// The record as appended to the catalog: status stripped, metadata taken
    /// from the fetched asset.
    pub fn into_catalogued(mut self, asset: &FetchedAsset) -> Self {
        self.title = asset.title.clone();
        if asset.artist.is_some() {
            self.artist = asset.artist.clone();
        }
        if asset.duration.is_some() {
            self.duration = asset.duration;
        }
        self.download_status = None;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.download_status == Some(DownloadStatus::Pending)
    }

    pub fn is_downloading(&self) -> bool {
        self.download_status == Some(DownloadStatus::Downloading)
    }

    pub fn is_error(&self) -> bool {
        self.download_status == Some(DownloadStatus::Error)
    }

    /// Title plus artist, the form used for notifications and lists.
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} ({artist})", self.title),
            None => self.title.clone(),
        }
    }
}

impl From<AvailableSong> for SongRecord {
    fn from(song: AvailableSong) -> Self {
        Self {
            key: song.key,
            title: song.title,
            artist: song.artist,
            duration: song.duration,
            download_status: None,
        }
    }
}

impl From<FetchedAsset> for SongRecord {
    fn from(asset: FetchedAsset) -> Self {
        Self {
            key: asset.key,
            title: asset.title,
            artist: asset.artist,
            duration: asset.duration,
            download_status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(DownloadStatus::Pending.as_str(), "pending");
        assert_eq!(
            "downloading".parse::<DownloadStatus>().unwrap(),
            DownloadStatus::Downloading
        );
        assert!("finished".parse::<DownloadStatus>().is_err());
        assert!(DownloadStatus::Error.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
    }

    #[test]
    fn test_wire_shape_uses_camel_case_status() {
        let record = SongRecord::new("abc", "Song").pending_download();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"downloadStatus\":\"pending\""));
        // Optional fields are omitted entirely, matching the original payloads.
        assert!(!json.contains("artist"));
        assert!(!json.contains("duration"));
    }

    #[test]
    fn test_wire_shape_tolerates_minimal_payload() {
        let record: SongRecord = serde_json::from_str(r#"{"key":"k","title":"t"}"#).unwrap();
        assert_eq!(record.key, "k");
        assert!(record.download_status.is_none());
    }

    #[test]
    fn test_error_transition_rewrites_title() {
        let record = SongRecord::new("abc", "Song")
            .pending_download()
            .into_downloading()
            .into_error("network unreachable");
        assert_eq!(record.title, "Error: network unreachable");
        assert!(record.is_error());
    }

    #[test]
    fn test_catalogued_record_takes_asset_metadata() {
        let asset = FetchedAsset::new("abc", "Real Title").with_duration(200);
        let record = SongRecord::new("abc", "???")
            .pending_download()
            .into_downloading()
            .into_catalogued(&asset);
        assert_eq!(record.title, "Real Title");
        assert_eq!(record.duration, Some(200));
        assert!(record.download_status.is_none());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(SongRecord::new("k", "Title").display_name(), "Title");
        assert_eq!(
            SongRecord::new("k", "Title")
                .with_artist("Artist")
                .display_name(),
            "Title (Artist)"
        );
    }
}
