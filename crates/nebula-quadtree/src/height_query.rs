//! Height queries answered from loaded tile data.
//!
//! Every registered position is anchored to the deepest loaded tile that
//! covers it. The anchor tile is the cache key: however many queries share an
//! anchor, its data is picked once per frame and every callback gets the same
//! answer.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::tile::{find_tile, find_tile_mut};
use crate::{Cartographic, QuadtreeTile, TileData, TileKey, TileLoadState};

/// Identity of a registered height query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeightQueryId(u64);

/// Proof of registration, consumed to unregister.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle makes the height query impossible to remove"]
pub struct HeightQueryHandle {
    id: HeightQueryId,
}

impl HeightQueryHandle {
    pub fn id(&self) -> HeightQueryId {
        self.id
    }
}

/// Receives the clamped position each frame the query is answered.
pub type HeightCallback = Box<dyn FnMut(&Cartographic)>;

struct HeightQuery {
    position: Cartographic,
    callback: HeightCallback,
    anchor: Option<TileKey>,
}

/// Registry of outstanding height queries and the per-frame pick cache.
#[derive(Default)]
pub struct HeightQueryCache {
    queries: BTreeMap<HeightQueryId, HeightQuery>,
    next_id: u64,
    picks: FxHashMap<TileKey, Option<Cartographic>>,
}

impl HeightQueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, position: Cartographic, callback: HeightCallback) -> HeightQueryHandle {
        let id = HeightQueryId(self.next_id);
        self.next_id += 1;
        self.queries.insert(
            id,
            HeightQuery {
                position,
                callback,
                anchor: None,
            },
        );
        HeightQueryHandle { id }
    }

    /// Unregister a query and detach it from its anchor tile.
    /// Returns false if it was already gone.
    pub fn remove<D>(&mut self, handle: HeightQueryHandle, roots: &mut [QuadtreeTile<D>]) -> bool {
        let Some(query) = self.queries.remove(&handle.id) else {
            return false;
        };
        if let Some(key) = query.anchor
            && let Some(tile) = find_tile_mut(roots, &key)
        {
            tile.custom_data.retain(|id| *id != handle.id);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Tile the query is currently anchored to.
    pub fn anchor(&self, id: HeightQueryId) -> Option<TileKey> {
        self.queries.get(&id).and_then(|query| query.anchor)
    }

    /// Forget every anchor. Used when the tree is rebuilt.
    pub fn detach_all(&mut self) {
        for query in self.queries.values_mut() {
            query.anchor = None;
        }
        self.picks.clear();
    }

    /// Re-anchor every query and answer it, picking each anchor tile once.
    /// Returns the number of picks performed.
    pub fn update<D: TileData>(&mut self, roots: &mut [QuadtreeTile<D>]) -> usize {
        self.picks.clear();

        for (id, query) in &mut self.queries {
            let anchor = find_anchor(roots, &query.position);
            if anchor == query.anchor {
                continue;
            }
            if let Some(key) = query.anchor
                && let Some(old) = find_tile_mut(roots, &key)
            {
                old.custom_data.retain(|other| other != id);
            }
            if let Some(key) = anchor
                && let Some(new) = find_tile_mut(roots, &key)
            {
                new.custom_data.push(*id);
            }
            tracing::trace!(
                "height query {:?} anchored to {}",
                id,
                anchor.map_or_else(|| "nothing".to_string(), |key| key.to_string())
            );
            query.anchor = anchor;
        }

        let mut picks = 0;
        for query in self.queries.values_mut() {
            let Some(anchor) = query.anchor else {
                continue;
            };
            let result = *self.picks.entry(anchor).or_insert_with(|| {
                picks += 1;
                find_tile(roots, &anchor)
                    .and_then(|tile| tile.data.as_ref())
                    .and_then(|data| data.pick(&query.position))
            });
            if let Some(position) = result {
                (query.callback)(&position);
            }
        }
        picks
    }
}

fn is_anchor_candidate<D: TileData>(tile: &QuadtreeTile<D>) -> bool {
    tile.state != TileLoadState::Start
        && !tile.upsampled_from_parent
        && tile.data.as_ref().is_some_and(TileData::has_geometry)
}

/// Deepest loaded, non-upsampled tile with geometry containing `position`.
fn find_anchor<D: TileData>(roots: &[QuadtreeTile<D>], position: &Cartographic) -> Option<TileKey> {
    let mut tile = roots.iter().find(|root| root.rectangle().contains(position))?;
    let mut anchor = None;
    loop {
        if is_anchor_candidate(tile) {
            anchor = Some(tile.key());
        }
        match tile.child_containing(position) {
            Some(child) => tile = child,
            None => return anchor,
        }
    }
}
