//! Quadtree level-of-detail tile selection and load scheduling for globe rendering.
//!
//! Every frame a [`QuadtreePrimitive`] walks the tile quadtree, picks the tiles
//! to render near to far, substitutes renderable ancestors for visible tiles
//! that are not loaded yet, and queues loads at High, Medium or Low priority.
//! Geometry, culling math and drawing belong to a [`TileProvider`].

mod error;
mod events;
mod geographic;
mod height_query;
mod load_queue;
mod primitive;
mod provider;
mod selector;
mod tile;
mod tiling_scheme;

pub use error::{QuadtreeError, TileProviderError};
pub use events::{ListenerHandle, ProgressListener, TileLoadProgressEvent};
pub use geographic::{Cartographic, Rectangle};
pub use height_query::{HeightCallback, HeightQueryCache, HeightQueryHandle, HeightQueryId};
pub use load_queue::{LoadPriority, QueueCheckpoint, QueuedTile, TileLoadQueues};
pub use nebula_config::QuadtreeConfig;
pub use primitive::{QuadtreePrimitive, QuadtreePrimitiveOptions};
pub use provider::{FogState, FrameState, TileAvailability, TileData, TileProvider, Visibility};
pub use selector::{
    RenderEntry, SelectionStats, TileSelector, TraversalDetails, near_to_far_order,
    screen_space_error,
};
pub use tile::{
    Quadrant, QuadtreeTile, TileKey, TileLoadState, TileSelectionResult, find_tile, find_tile_mut,
};
pub use tiling_scheme::{TilingScheme, estimated_level_zero_geometric_error};
