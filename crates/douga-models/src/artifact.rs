//! Derived-artifact cache keys and servable file names.
//!
//! Identifiers arriving from the request path end up in temporary directory
//! names, so everything here is validated before any filesystem access.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Manifest file written by the HLS segmenter.
pub const PLAYLIST_FILE: &str = "playlist.m3u8";

/// Single-frame preview image.
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";

/// Segment file name prefix (`segment0.ts`, `segment1.ts`, ...).
pub const SEGMENT_PREFIX: &str = "segment";

/// Segment file name extension.
pub const SEGMENT_EXTENSION: &str = ".ts";

const MAX_DID_LEN: usize = 2048;
const MAX_CID_LEN: usize = 128;

/// Subject characters kept in a slot directory name. With the kind, the
/// content id and the random suffix this stays well under `NAME_MAX`.
const DIR_SUBJECT_LEN: usize = 64;

/// Rejected request identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("did is missing")]
    MissingSubject,

    #[error("invalid did: {0}")]
    InvalidSubject(String),

    #[error("cid is missing")]
    MissingContentId,

    #[error("invalid cid: {0}")]
    InvalidContentId(String),

    #[error("invalid file request: {0}")]
    InvalidFileName(String),
}

/// What a cache slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// HLS manifest plus numbered segments
    PlaylistBundle,
    /// One JPEG frame
    Thumbnail,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::PlaylistBundle => "playlist",
            ArtifactKind::Thumbnail => "thumbnail",
        }
    }

    /// File whose presence marks a finished derivation.
    pub fn primary_file(&self) -> &'static str {
        match self {
            ArtifactKind::PlaylistBundle => PLAYLIST_FILE,
            ArtifactKind::Thumbnail => THUMBNAIL_FILE,
        }
    }

    /// Prefix for the slot's temporary directory.
    pub fn dir_prefix(&self) -> &'static str {
        match self {
            ArtifactKind::PlaylistBundle => "hls",
            ArtifactKind::Thumbnail => "thumb",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one derived-artifact cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    subject: String,
    content_id: String,
    kind: ArtifactKind,
}

impl ArtifactKey {
    /// Build a key from untrusted path parameters.
    pub fn new(
        subject: impl Into<String>,
        content_id: impl Into<String>,
        kind: ArtifactKind,
    ) -> Result<Self, ValidationError> {
        let subject = subject.into();
        let content_id = content_id.into();
        validate_subject(&subject)?;
        validate_content_id(&content_id)?;
        Ok(Self {
            subject,
            content_id,
            kind,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Filesystem-safe prefix for this slot's temporary directory.
    ///
    /// Long subjects are truncated; the random suffix added on allocation
    /// keeps directories distinct.
    pub fn dir_prefix(&self) -> String {
        let subject: String = self
            .subject
            .chars()
            .take(DIR_SUBJECT_LEN)
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}_{}_{}_", self.kind.dir_prefix(), subject, self.content_id)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subject, self.content_id, self.kind)
    }
}

/// A servable file inside an artifact slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFile {
    Playlist,
    Segment(u32),
    Thumbnail,
}

impl ArtifactFile {
    /// Parse the last path component of a watch request.
    ///
    /// Only `playlist.m3u8`, `thumbnail.jpg` and `segment<N>.ts` are accepted.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFileName(name.to_string());

        match name {
            PLAYLIST_FILE => return Ok(ArtifactFile::Playlist),
            THUMBNAIL_FILE => return Ok(ArtifactFile::Thumbnail),
            _ => {}
        }

        let index = name
            .strip_prefix(SEGMENT_PREFIX)
            .and_then(|rest| rest.strip_suffix(SEGMENT_EXTENSION))
            .ok_or_else(invalid)?;

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        index.parse().map(ArtifactFile::Segment).map_err(|_| invalid())
    }

    /// Cache slot kind that holds this file.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactFile::Playlist | ArtifactFile::Segment(_) => ArtifactKind::PlaylistBundle,
            ArtifactFile::Thumbnail => ArtifactKind::Thumbnail,
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            ArtifactFile::Playlist => PLAYLIST_FILE.to_string(),
            ArtifactFile::Segment(n) => format!("{}{}{}", SEGMENT_PREFIX, n, SEGMENT_EXTENSION),
            ArtifactFile::Thumbnail => THUMBNAIL_FILE.to_string(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactFile::Playlist => "application/vnd.apple.mpegurl",
            ArtifactFile::Segment(_) => "video/mp2t",
            ArtifactFile::Thumbnail => "image/jpeg",
        }
    }
}

fn validate_subject(subject: &str) -> Result<(), ValidationError> {
    if subject.is_empty() {
        return Err(ValidationError::MissingSubject);
    }

    let well_formed = subject.len() <= MAX_DID_LEN
        && subject.starts_with("did:")
        && subject
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'.' | b'_' | b'-' | b'%'))
        && !subject.contains("..");

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidSubject(subject.to_string()))
    }
}

fn validate_content_id(cid: &str) -> Result<(), ValidationError> {
    if cid.is_empty() {
        return Err(ValidationError::MissingContentId);
    }

    if cid.len() <= MAX_CID_LEN && cid.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidContentId(cid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allowed_files() {
        assert_eq!(ArtifactFile::parse("playlist.m3u8"), Ok(ArtifactFile::Playlist));
        assert_eq!(ArtifactFile::parse("thumbnail.jpg"), Ok(ArtifactFile::Thumbnail));
        assert_eq!(ArtifactFile::parse("segment0.ts"), Ok(ArtifactFile::Segment(0)));
        assert_eq!(ArtifactFile::parse("segment17.ts"), Ok(ArtifactFile::Segment(17)));
    }

    #[test]
    fn test_parse_rejects_traversal_and_unknown_files() {
        for name in [
            "../secret",
            "../playlist.m3u8",
            "segment.ts",
            "segment-1.ts",
            "segment1.ts/..",
            "segmentx.ts",
            "other.ts",
            "video.mp4",
            "playlist.m3u",
            "",
        ] {
            assert!(
                matches!(ArtifactFile::parse(name), Err(ValidationError::InvalidFileName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_kinds_and_types() {
        assert_eq!(ArtifactFile::Segment(3).kind(), ArtifactKind::PlaylistBundle);
        assert_eq!(ArtifactFile::Segment(3).file_name(), "segment3.ts");
        assert_eq!(ArtifactFile::Segment(3).content_type(), "video/mp2t");
        assert_eq!(ArtifactFile::Thumbnail.kind(), ArtifactKind::Thumbnail);
        assert_eq!(ArtifactFile::Playlist.content_type(), "application/vnd.apple.mpegurl");
    }

    #[test]
    fn test_key_validation() {
        let key = ArtifactKey::new("did:plc:abc123", "bafyrei123", ArtifactKind::Thumbnail).unwrap();
        assert_eq!(key.subject(), "did:plc:abc123");
        assert_eq!(key.dir_prefix(), "thumb_did_plc_abc123_bafyrei123_");

        assert_eq!(
            ArtifactKey::new("", "bafy", ArtifactKind::Thumbnail),
            Err(ValidationError::MissingSubject)
        );
        assert_eq!(
            ArtifactKey::new("did:plc:abc", "", ArtifactKind::Thumbnail),
            Err(ValidationError::MissingContentId)
        );
        assert!(ArtifactKey::new("plc:abc", "bafy", ArtifactKind::Thumbnail).is_err());
        assert!(ArtifactKey::new("did:web:../../etc", "bafy", ArtifactKind::Thumbnail).is_err());
        assert!(ArtifactKey::new("did:plc:abc", "bafy/../x", ArtifactKind::Thumbnail).is_err());
    }

    #[test]
    fn test_long_subject_is_truncated_in_dir_prefix() {
        let subject = format!("did:web:{}.example", "a".repeat(300));
        let cid = "b".repeat(MAX_CID_LEN);
        let key = ArtifactKey::new(subject.as_str(), cid.as_str(), ArtifactKind::PlaylistBundle).unwrap();

        let prefix = key.dir_prefix();
        assert!(prefix.starts_with("hls_did_web_aaaa"));
        assert!(prefix.len() <= 200, "prefix is {} bytes", prefix.len());
        assert_eq!(key.subject(), subject);
    }

    #[test]
    fn test_keys_differ_by_kind() {
        let playlist = ArtifactKey::new("did:plc:a", "bafy", ArtifactKind::PlaylistBundle).unwrap();
        let thumb = ArtifactKey::new("did:plc:a", "bafy", ArtifactKind::Thumbnail).unwrap();
        assert_ne!(playlist, thumb);
    }
}
