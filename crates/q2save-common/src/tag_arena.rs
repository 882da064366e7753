// tag_arena.rs — scope-tagged allocation accounting
//
// Everything a load allocates is charged to one of two scopes. Reading a
// game document releases the game scope; reading a level releases the
// level scope. Storage itself lives in the owning tables (`TagString`,
// `TagVec`), which are replaced in bulk when a scope is released.

use std::fmt;
use std::marker::PhantomData;

use crate::save_error::SaveError;

pub const TAG_GAME: i32 = 765; // clear when unloading the game module
pub const TAG_LEVEL: i32 = 766; // clear when loading a new level

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTag {
    Game,
    Level,
}

impl MemoryTag {
    pub const fn id(self) -> i32 {
        match self {
            MemoryTag::Game => TAG_GAME,
            MemoryTag::Level => TAG_LEVEL,
        }
    }

    const fn slot(self) -> usize {
        match self {
            MemoryTag::Game => 0,
            MemoryTag::Level => 1,
        }
    }
}

/// Type-level scope marker for scoped containers.
pub trait MemoryScope: 'static + Send + Sync {
    const TAG: MemoryTag;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GameTag;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LevelTag;

impl MemoryScope for GameTag {
    const TAG: MemoryTag = MemoryTag::Game;
}

impl MemoryScope for LevelTag {
    const TAG: MemoryTag = MemoryTag::Level;
}

// ============================================================
// Scoped containers
// ============================================================

/// Growable text owned by a memory scope. `None` is the null string.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct TagString<S: MemoryScope> {
    bytes: Option<Box<[u8]>>,
    _scope: PhantomData<S>,
}

pub type GameString = TagString<GameTag>;
pub type LevelString = TagString<LevelTag>;

impl<S: MemoryScope> TagString<S> {
    pub fn null() -> Self {
        TagString { bytes: None, _scope: PhantomData }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        TagString { bytes: Some(bytes.into()), _scope: PhantomData }
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.bytes.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// True when the string is non-null and equal to `s`.
    pub fn eq_str(&self, s: &str) -> bool {
        self.as_bytes() == Some(s.as_bytes())
    }

    pub fn set(&mut self, bytes: Option<&[u8]>) {
        self.bytes = bytes.map(Into::into);
    }
}

impl<S: MemoryScope> From<&str> for TagString<S> {
    fn from(s: &str) -> Self {
        TagString::from_bytes(s.as_bytes())
    }
}

impl<S: MemoryScope> fmt::Debug for TagString<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bytes {
            Some(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            None => f.write_str("null"),
        }
    }
}

/// Growable array owned by a memory scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagVec<T, S: MemoryScope> {
    items: Vec<T>,
    _scope: PhantomData<S>,
}

impl<T, S: MemoryScope> TagVec<T, S> {
    pub fn new() -> Self {
        TagVec { items: Vec::new(), _scope: PhantomData }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Default, S: MemoryScope> TagVec<T, S> {
    /// Discards the contents and holds `count` default elements.
    pub fn reset(&mut self, count: usize) {
        self.items.clear();
        self.items.resize_with(count, T::default);
    }
}

// ============================================================
// Arena ledger
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    pub allocations: usize,
    pub bytes: usize,
}

/// Per-scope accounting of load-time allocations.
#[derive(Debug, Clone, Default)]
pub struct TagArena {
    scopes: [ScopeStats; 2],
    limit: Option<usize>,
}

impl TagArena {
    pub fn new() -> Self {
        TagArena::default()
    }

    /// Arena refusing allocations that would take a scope past `bytes`.
    pub fn with_limit(bytes: usize) -> Self {
        TagArena { scopes: Default::default(), limit: Some(bytes) }
    }

    pub fn alloc(&mut self, size: usize, tag: MemoryTag) -> Result<(), SaveError> {
        let stats = &mut self.scopes[tag.slot()];
        let total = stats.bytes.saturating_add(size);
        if let Some(limit) = self.limit {
            if total > limit {
                return Err(SaveError::Capacity(format!(
                    "allocation of {size} bytes exceeds the {limit} byte limit of tag {}",
                    tag.id()
                )));
            }
        }
        stats.bytes = total;
        stats.allocations += 1;
        Ok(())
    }

    /// Releases everything charged to `tag`, returning what was released.
    pub fn free_tags(&mut self, tag: MemoryTag) -> ScopeStats {
        std::mem::take(&mut self.scopes[tag.slot()])
    }

    /// Moves the `tag` scope of a staging arena into this one.
    pub fn absorb(&mut self, staging: &mut TagArena, tag: MemoryTag) {
        let moved = staging.free_tags(tag);
        let stats = &mut self.scopes[tag.slot()];
        stats.bytes += moved.bytes;
        stats.allocations += moved.allocations;
    }

    pub fn stats(&self, tag: MemoryTag) -> ScopeStats {
        self.scopes[tag.slot()]
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tags_releases_only_that_scope() {
        let mut arena = TagArena::new();
        arena.alloc(16, MemoryTag::Game).unwrap();
        arena.alloc(32, MemoryTag::Level).unwrap();
        arena.alloc(8, MemoryTag::Level).unwrap();

        let released = arena.free_tags(MemoryTag::Level);
        assert_eq!(released, ScopeStats { allocations: 2, bytes: 40 });
        assert_eq!(arena.stats(MemoryTag::Level), ScopeStats::default());
        assert_eq!(arena.stats(MemoryTag::Game).bytes, 16);
    }

    #[test]
    fn test_limit_is_capacity_error() {
        let mut arena = TagArena::with_limit(10);
        arena.alloc(6, MemoryTag::Level).unwrap();
        let err = arena.alloc(6, MemoryTag::Level).unwrap_err();
        assert!(matches!(err, SaveError::Capacity(_)));
        // other scope is unaffected
        arena.alloc(10, MemoryTag::Game).unwrap();
    }

    #[test]
    fn test_absorb_staging() {
        let mut arena = TagArena::new();
        let mut staging = TagArena::new();
        staging.alloc(12, MemoryTag::Level).unwrap();
        arena.absorb(&mut staging, MemoryTag::Level);
        assert_eq!(arena.stats(MemoryTag::Level).bytes, 12);
        assert_eq!(staging.stats(MemoryTag::Level).bytes, 0);
    }

    #[test]
    fn test_tag_string_null_and_eq() {
        let mut s = LevelString::null();
        assert!(s.is_null());
        assert!(!s.eq_str(""));
        s.set(Some(b"info_player_start"));
        assert!(s.eq_str("info_player_start"));
        assert_eq!(s.as_str(), Some("info_player_start"));
    }
}
