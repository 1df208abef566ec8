use thiserror::Error;

use crate::TileKey;

/// Errors raised by the quadtree primitive.
#[derive(Debug, Error)]
pub enum QuadtreeError {
    #[error("a tile provider is required to construct a quadtree primitive")]
    MissingTileProvider,

    #[error("the tiling scheme has no level-zero tiles")]
    EmptyTilingScheme,

    #[error("tile provider failed on tile {tile}: {source}")]
    Provider {
        tile: TileKey,
        #[source]
        source: TileProviderError,
    },
}

/// Failure reported by a [`TileProvider`](crate::TileProvider) while computing
/// visibility or distance.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TileProviderError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TileProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_provider_error_display_names_tile() {
        let err = QuadtreeError::Provider {
            tile: TileKey::new(3, 1, 2),
            source: TileProviderError::new("bounding volume missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("L2X3Y1"), "got: {msg}");
        assert!(msg.contains("bounding volume missing"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_provider_error_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = TileProviderError::with_source("read failed", io);
        assert_eq!(err.message(), "read failed");
        assert_eq!(err.source().map(ToString::to_string), Some("disk gone".into()));
    }
}
