//! Media descriptions handed to the player.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A playable unit: a URI plus an optional caller-defined payload.
///
/// The payload is type-erased so applications can associate arbitrary data
/// (database rows, UI handles, ...) with a media without the player becoming
/// generic over it. Retrieve it with [`Media::payload`] and downcast:
///
/// ```
/// use segue::Media;
/// use std::sync::Arc;
///
/// let media = Media::with_payload("file:///tmp/a.flac", Arc::new(42u32));
/// let value = media.payload().unwrap().downcast_ref::<u32>().copied();
/// assert_eq!(value, Some(42));
/// ```
///
/// A media with an empty URI is invalid and is rejected by
/// [`Player::play_media`](crate::Player::play_media).
#[derive(Clone)]
pub struct Media {
    uri: String,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Media {
    /// Creates a media with the given URI and no payload.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            payload: None,
        }
    }

    /// Creates a media with the given URI and payload.
    pub fn with_payload(uri: impl Into<String>, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            uri: uri.into(),
            payload: Some(payload),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn payload(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.payload.as_ref()
    }

    /// A media is valid iff its URI is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.uri.is_empty()
    }
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Media")
            .field("uri", &self.uri)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_uri_is_invalid() {
        assert!(!Media::new("").is_valid());
        assert!(Media::new("file:///x.ogg").is_valid());
    }

    #[test]
    fn payload_roundtrip() {
        let media = Media::with_payload("u", Arc::new(String::from("tag")));
        let payload = media.payload().unwrap();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "tag");
    }
}
