//! Quadtree tile nodes: identity, lazily created children, load state and
//! per-frame selection scratch.

use std::fmt;

use crate::height_query::HeightQueryId;
use crate::{Cartographic, Rectangle, TilingScheme};

/// Grid identity of a tile: `(x, y)` at `level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub x: u32,
    pub y: u32,
    pub level: u32,
}

impl TileKey {
    #[must_use]
    pub const fn new(x: u32, y: u32, level: u32) -> Self {
        Self { x, y, level }
    }

    /// Key of the parent tile, `None` at level zero.
    #[must_use]
    pub fn parent(&self) -> Option<TileKey> {
        (self.level > 0).then(|| TileKey::new(self.x >> 1, self.y >> 1, self.level - 1))
    }

    /// Child keys in `[southwest, southeast, northwest, northeast]` order.
    #[must_use]
    pub fn children(&self) -> [TileKey; 4] {
        let (x, y, level) = (self.x * 2, self.y * 2, self.level + 1);
        [
            TileKey::new(x, y + 1, level),
            TileKey::new(x + 1, y + 1, level),
            TileKey::new(x, y, level),
            TileKey::new(x + 1, y, level),
        ]
    }

    /// Which quadrant of its parent this tile occupies.
    #[must_use]
    pub fn quadrant(&self) -> Option<Quadrant> {
        if self.level == 0 {
            return None;
        }
        Some(match (self.x & 1, self.y & 1) {
            (0, 1) => Quadrant::Southwest,
            (1, 1) => Quadrant::Southeast,
            (0, _) => Quadrant::Northwest,
            _ => Quadrant::Northeast,
        })
    }

    /// The ancestor of this key at `level`, or the key itself at its own level.
    #[must_use]
    pub fn ancestor_at(&self, level: u32) -> Option<TileKey> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(TileKey::new(self.x >> shift, self.y >> shift, level))
    }

    /// True when `other` lies strictly below this tile.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &TileKey) -> bool {
        other.level > self.level && other.ancestor_at(self.level) == Some(*self)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}X{}Y{}", self.level, self.x, self.y)
    }
}

/// Position of a child within its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    Southwest,
    Southeast,
    Northwest,
    Northeast,
}

impl Quadrant {
    /// All quadrants in child-array order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::Southwest,
        Quadrant::Southeast,
        Quadrant::Northwest,
        Quadrant::Northeast,
    ];

    /// Index into a tile's child array.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Quadrant::Southwest => 0,
            Quadrant::Southeast => 1,
            Quadrant::Northwest => 2,
            Quadrant::Northeast => 3,
        }
    }
}

/// Load lifecycle of a tile. Ordered: `Start < Loading < Done < Failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileLoadState {
    /// Nothing requested yet.
    #[default]
    Start,
    /// Requested; the provider is still working on it.
    Loading,
    /// Loading concluded. The tile is never queued again unless invalidated.
    Done,
    /// Loading failed. Treated as a permanently non-renderable leaf.
    Failed,
}

impl TileLoadState {
    /// Whether a tile in this state belongs in a load queue.
    #[must_use]
    pub fn needs_loading(self) -> bool {
        matches!(self, TileLoadState::Start | TileLoadState::Loading)
    }
}

/// What the selector did with a tile on the frame it was last visited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileSelectionResult {
    /// Not visited.
    #[default]
    None,
    /// Outside the view.
    Culled,
    /// Added to the render list.
    Rendered,
    /// Refined into its children.
    Refined,
    /// Rendered, then removed again because an ancestor rendered instead.
    RenderedAndKicked,
    /// Refined, then an ancestor rendered in its place.
    RefinedAndKicked,
    /// Outside the view but contains the camera, so it is still loaded.
    CulledButNeeded,
}

impl TileSelectionResult {
    /// Mark as kicked by an ancestor, keeping the original outcome recoverable.
    #[must_use]
    pub fn kick(self) -> Self {
        match self {
            TileSelectionResult::Rendered => TileSelectionResult::RenderedAndKicked,
            TileSelectionResult::Refined => TileSelectionResult::RefinedAndKicked,
            other => other,
        }
    }

    /// The result before any kick.
    #[must_use]
    pub fn original(self) -> Self {
        match self {
            TileSelectionResult::RenderedAndKicked => TileSelectionResult::Rendered,
            TileSelectionResult::RefinedAndKicked => TileSelectionResult::Refined,
            other => other,
        }
    }
}

/// A node of the quadtree.
///
/// A tile owns its four children exclusively; the parent is referenced by key
/// only. Children are created together, on first refinement, and live as long
/// as the tree.
pub struct QuadtreeTile<D> {
    key: TileKey,
    rectangle: Rectangle,
    parent: Option<TileKey>,
    children: Option<Box<[QuadtreeTile<D>; 4]>>,

    /// Load lifecycle, advanced by the tile provider.
    pub state: TileLoadState,
    /// Set by the provider once the tile has enough data to draw.
    pub renderable: bool,
    /// Set by the provider when the renderable content was synthesized from an ancestor.
    pub upsampled_from_parent: bool,
    /// Provider-owned payload.
    pub data: Option<D>,

    pub(crate) custom_data: Vec<HeightQueryId>,

    pub(crate) distance: f64,
    pub(crate) last_selection_result: TileSelectionResult,
    pub(crate) last_selection_result_pass: Option<u64>,
    pub(crate) queued_pass: Option<u64>,
}

impl<D> QuadtreeTile<D> {
    fn new(key: TileKey, parent: Option<TileKey>, tiling_scheme: &TilingScheme) -> Self {
        Self {
            key,
            rectangle: tiling_scheme.tile_xy_to_rectangle(key.x, key.y, key.level),
            parent,
            children: None,
            state: TileLoadState::Start,
            renderable: false,
            upsampled_from_parent: false,
            data: None,
            custom_data: Vec::new(),
            distance: 0.0,
            last_selection_result: TileSelectionResult::None,
            last_selection_result_pass: None,
            queued_pass: None,
        }
    }

    /// Create the root tiles of `tiling_scheme`, row by row from the north.
    #[must_use]
    pub fn create_level_zero_tiles(tiling_scheme: &TilingScheme) -> Vec<Self> {
        let x_tiles = tiling_scheme.number_of_x_tiles_at_level(0);
        let y_tiles = tiling_scheme.number_of_y_tiles_at_level(0);
        let mut tiles = Vec::with_capacity(tiling_scheme.root_tile_count());
        for y in 0..y_tiles {
            for x in 0..x_tiles {
                tiles.push(QuadtreeTile::new(TileKey::new(x, y, 0), None, tiling_scheme));
            }
        }
        tiles
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn x(&self) -> u32 {
        self.key.x
    }

    pub fn y(&self) -> u32 {
        self.key.y
    }

    pub fn level(&self) -> u32 {
        self.key.level
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    /// Key of the parent tile. The parent is never owned by its child.
    pub fn parent(&self) -> Option<TileKey> {
        self.parent
    }

    /// Children in `[southwest, southeast, northwest, northeast]` order, if created.
    pub fn children(&self) -> Option<&[QuadtreeTile<D>; 4]> {
        self.children.as_deref()
    }

    pub fn children_mut(&mut self) -> Option<&mut [QuadtreeTile<D>; 4]> {
        self.children.as_deref_mut()
    }

    pub fn child(&self, quadrant: Quadrant) -> Option<&QuadtreeTile<D>> {
        self.children().map(|children| &children[quadrant.index()])
    }

    pub fn southwest_child(&self) -> Option<&QuadtreeTile<D>> {
        self.child(Quadrant::Southwest)
    }

    pub fn southeast_child(&self) -> Option<&QuadtreeTile<D>> {
        self.child(Quadrant::Southeast)
    }

    pub fn northwest_child(&self) -> Option<&QuadtreeTile<D>> {
        self.child(Quadrant::Northwest)
    }

    pub fn northeast_child(&self) -> Option<&QuadtreeTile<D>> {
        self.child(Quadrant::Northeast)
    }

    /// Children, creating all four at once if they do not exist yet.
    pub fn ensure_children(&mut self, tiling_scheme: &TilingScheme) -> &mut [QuadtreeTile<D>; 4] {
        let key = self.key;
        self.children.get_or_insert_with(|| {
            Box::new(
                key.children()
                    .map(|child| QuadtreeTile::new(child, Some(key), tiling_scheme)),
            )
        })
    }

    /// True when all four children exist and were upsampled from this tile.
    pub fn children_upsampled(&self) -> bool {
        self.children()
            .is_some_and(|children| children.iter().all(|child| child.upsampled_from_parent))
    }

    pub fn needs_loading(&self) -> bool {
        self.state.needs_loading()
    }

    /// Height-query registrations currently anchored to this tile.
    pub fn custom_data(&self) -> &[HeightQueryId] {
        &self.custom_data
    }

    /// Distance to the camera computed during the most recent selection pass.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Selection outcome recorded on pass `pass`, or `None` if the tile was not visited then.
    pub fn selection_result_on(&self, pass: Option<u64>) -> TileSelectionResult {
        match pass {
            Some(pass) if self.last_selection_result_pass == Some(pass) => {
                self.last_selection_result
            }
            _ => TileSelectionResult::None,
        }
    }

    pub(crate) fn set_selection_result(&mut self, result: TileSelectionResult, pass: u64) {
        self.last_selection_result = result;
        self.last_selection_result_pass = Some(pass);
    }

    /// The child lying on the path towards `key`, if created.
    fn child_towards(&self, key: &TileKey) -> Option<&QuadtreeTile<D>> {
        let step = key.ancestor_at(self.key.level + 1)?;
        let quadrant = step.quadrant()?;
        self.child(quadrant).filter(|child| child.key == step)
    }

    fn child_towards_mut(&mut self, key: &TileKey) -> Option<&mut QuadtreeTile<D>> {
        let step = key.ancestor_at(self.key.level + 1)?;
        let quadrant = step.quadrant()?;
        self.children_mut()
            .map(|children| &mut children[quadrant.index()])
            .filter(|child| child.key == step)
    }

    /// This tile or one of its created descendants.
    pub fn descendant(&self, key: &TileKey) -> Option<&QuadtreeTile<D>> {
        if *key == self.key {
            return Some(self);
        }
        if !self.key.is_ancestor_of(key) {
            return None;
        }
        self.child_towards(key)?.descendant(key)
    }

    pub fn descendant_mut(&mut self, key: &TileKey) -> Option<&mut QuadtreeTile<D>> {
        if *key == self.key {
            return Some(self);
        }
        if !self.key.is_ancestor_of(key) {
            return None;
        }
        self.child_towards_mut(key)?.descendant_mut(key)
    }

    /// Apply `f` to every tile strictly below this one on the path down to `key` (inclusive).
    pub(crate) fn for_each_on_path_mut(
        &mut self,
        key: &TileKey,
        f: &mut impl FnMut(&mut QuadtreeTile<D>),
    ) {
        if !self.key.is_ancestor_of(key) {
            return;
        }
        if let Some(child) = self.child_towards_mut(key) {
            f(child);
            child.for_each_on_path_mut(key, f);
        }
    }

    /// The created child whose rectangle contains `position`.
    pub fn child_containing(&self, position: &Cartographic) -> Option<&QuadtreeTile<D>> {
        let children = self.children()?;
        let center = children[Quadrant::Southwest.index()].rectangle;
        let east = position.longitude > center.east;
        let north = position.latitude > center.north;
        let quadrant = match (east, north) {
            (false, false) => Quadrant::Southwest,
            (true, false) => Quadrant::Southeast,
            (false, true) => Quadrant::Northwest,
            (true, true) => Quadrant::Northeast,
        };
        Some(&children[quadrant.index()])
    }

    /// Pre-order walk over this tile and every created descendant.
    pub fn for_each_tile(&self, f: &mut impl FnMut(&QuadtreeTile<D>)) {
        f(self);
        if let Some(children) = self.children() {
            for child in children {
                child.for_each_tile(f);
            }
        }
    }
}

impl<D> fmt::Debug for QuadtreeTile<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadtreeTile")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("renderable", &self.renderable)
            .field("upsampled_from_parent", &self.upsampled_from_parent)
            .field("has_data", &self.data.is_some())
            .field("has_children", &self.children.is_some())
            .finish()
    }
}

/// Find a tile by key among a set of level-zero tiles.
pub fn find_tile<'a, D>(roots: &'a [QuadtreeTile<D>], key: &TileKey) -> Option<&'a QuadtreeTile<D>> {
    let root_key = key.ancestor_at(0)?;
    roots
        .iter()
        .find(|root| root.key == root_key)?
        .descendant(key)
}

/// Mutable variant of [`find_tile`].
pub fn find_tile_mut<'a, D>(
    roots: &'a mut [QuadtreeTile<D>],
    key: &TileKey,
) -> Option<&'a mut QuadtreeTile<D>> {
    let root_key = key.ancestor_at(0)?;
    roots
        .iter_mut()
        .find(|root| root.key == root_key)?
        .descendant_mut(key)
}
