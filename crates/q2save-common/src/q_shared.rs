// q_shared.rs — foundational types shared by the save system and the game module

use std::fmt;
use std::ops::{Add, Sub};

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub const MAX_QPATH: usize = 64;
pub const MAX_CLIENTS: usize = 256;
pub const MAX_EDICTS: usize = 1024;
pub const MAX_ITEMS: usize = 256;
pub const MAX_STATS: usize = 32;
pub const MAX_NETNAME: usize = 32;
pub const MAX_LEVEL_ENTRIES: usize = 64;
pub const MAX_REINFORCEMENTS: usize = 5;

// ============================================================
// Game time
// ============================================================

/// Elapsed game time, stored as whole milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameTime(i64);

impl GameTime {
    pub const ZERO: GameTime = GameTime(0);

    pub const fn from_ms(ms: i64) -> Self {
        GameTime(ms)
    }

    pub fn from_sec(sec: f32) -> Self {
        GameTime((sec as f64 * 1000.0).round() as i64)
    }

    pub const fn milliseconds(self) -> i64 {
        self.0
    }

    pub fn seconds(self) -> f32 {
        self.0 as f32 / 1000.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for GameTime {
    type Output = GameTime;
    fn add(self, rhs: GameTime) -> GameTime {
        GameTime(self.0 + rhs.0)
    }
}

impl Sub for GameTime {
    type Output = GameTime;
    fn sub(self, rhs: GameTime) -> GameTime {
        GameTime(self.0 - rhs.0)
    }
}

// ============================================================
// Entity and item handles
// ============================================================

/// Handle to an entity slot. The generation changes whenever the slot is
/// released, so a handle kept across a free no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

impl EntityId {
    pub const fn new(index: u32, generation: u32) -> Self {
        EntityId { index, generation }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }
}

/// Optional reference to another entity.
pub type EntityRef = Option<EntityId>;

/// Index into the item list. Index 0 is never a valid item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u16);

impl ItemId {
    pub const NULL: ItemId = ItemId(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

// ============================================================
// Fixed character buffer
// ============================================================

/// NUL-terminated character buffer of `N` bytes; holds at most `N - 1`
/// bytes of text. Bytes above 127 are kept as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedString<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> FixedString<N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        FixedString { buf: [0; N] }
    }

    pub fn from_text(s: &str) -> Option<Self> {
        let mut out = Self::new();
        out.set_bytes(s.as_bytes()).then_some(out)
    }

    pub fn len(&self) -> usize {
        self.buf.iter().position(|&b| b == 0).unwrap_or(N)
    }

    pub fn is_empty(&self) -> bool {
        N == 0 || self.buf[0] == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    /// Lossy text view; only meaningful for ASCII contents.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Replaces the contents. Returns false and leaves the buffer untouched
    /// when `bytes` would not leave room for the terminator or contains NUL.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() >= N || bytes.contains(&0) {
            return false;
        }
        self.buf = [0; N];
        self.buf[..bytes.len()].copy_from_slice(bytes);
        true
    }

    pub fn clear(&mut self) {
        self.buf = [0; N];
    }
}

impl<const N: usize> Default for FixedString<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

// ============================================================
// Bit set
// ============================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitSet<const N: usize> {
    bits: [bool; N],
}

impl<const N: usize> BitSet<N> {
    pub fn new() -> Self {
        BitSet { bits: [false; N] }
    }

    pub fn get(&self, bit: usize) -> bool {
        self.bits.get(bit).copied().unwrap_or(false)
    }

    /// Out-of-range bits are ignored.
    pub fn set(&mut self, bit: usize, value: bool) {
        if let Some(b) = self.bits.get_mut(bit) {
            *b = value;
        }
    }

    pub fn clear(&mut self) {
        self.bits = [false; N];
    }

    pub fn none(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    pub fn highest_set(&self) -> Option<usize> {
        self.bits.iter().rposition(|&b| b)
    }
}

impl<const N: usize> Default for BitSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for BitSet<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
        write!(f, "BitSet({s})")
    }
}

// ============================================================
// Inventory
// ============================================================

/// Item counts indexed by item id. Serialized sparsely by class name.
#[derive(Clone, PartialEq, Eq)]
pub struct Inventory {
    counts: [i32; MAX_ITEMS],
}

impl Inventory {
    pub fn new() -> Self {
        Inventory { counts: [0; MAX_ITEMS] }
    }

    pub fn get(&self, item: ItemId) -> i32 {
        self.counts.get(item.index()).copied().unwrap_or(0)
    }

    pub fn set(&mut self, item: ItemId, count: i32) {
        if let Some(slot) = self.counts.get_mut(item.index()) {
            *slot = count;
        }
    }

    pub fn add(&mut self, item: ItemId, count: i32) {
        let current = self.get(item);
        self.set(item, current + count);
    }

    /// Non-zero entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, i32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != 0)
            .map(|(i, &c)| (ItemId(i as u16), c))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    pub fn clear(&mut self) {
        self.counts = [0; MAX_ITEMS];
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter().map(|(id, c)| (id.0, c))).finish()
    }
}

// ============================================================
// Reinforcements
// ============================================================

/// A monster type a commander can call in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reinforcement {
    pub classname: String,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub strength: i32,
    /// How many of this type have been spawned so far.
    pub count: u32,
}

/// Reinforcement table plus the round-robin cursor used to pick the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReinforcementList {
    pub entries: Vec<Reinforcement>,
    pub next: u32,
}

impl ReinforcementList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the entry under the cursor and advances it.
    pub fn advance(&mut self) -> Option<&mut Reinforcement> {
        if self.entries.is_empty() {
            return None;
        }
        let current = self.next as usize % self.entries.len();
        self.next = ((current + 1) % self.entries.len()) as u32;
        let entry = &mut self.entries[current];
        entry.count += 1;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_string_keeps_room_for_terminator() {
        let mut s = FixedString::<4>::new();
        assert!(s.set_bytes(b"abc"));
        assert_eq!(s.as_bytes(), b"abc");
        assert!(!s.set_bytes(b"abcd"));
        assert_eq!(s.as_bytes(), b"abc");
    }

    #[test]
    fn test_fixed_string_high_bytes() {
        let mut s = FixedString::<8>::new();
        assert!(s.set_bytes(&[0x41, 0xC8, 0x80]));
        assert_eq!(s.len(), 3);
        assert_eq!(s.as_bytes()[1], 0xC8);
    }

    #[test]
    fn test_bitset_highest() {
        let mut b = BitSet::<8>::new();
        assert!(b.none());
        b.set(1, true);
        b.set(4, true);
        b.set(20, true);
        assert_eq!(b.highest_set(), Some(4));
        assert!(b.get(1));
        assert!(!b.get(2));
    }

    #[test]
    fn test_inventory_sparse_iter() {
        let mut inv = Inventory::new();
        inv.set(ItemId(7), 3);
        inv.add(ItemId(2), 10);
        let entries: Vec<_> = inv.iter().collect();
        assert_eq!(entries, vec![(ItemId(2), 10), (ItemId(7), 3)]);
    }

    #[test]
    fn test_game_time_seconds() {
        let t = GameTime::from_sec(1.5);
        assert_eq!(t.milliseconds(), 1500);
        assert_eq!((t + GameTime::from_ms(500)).seconds(), 2.0);
    }

    #[test]
    fn test_reinforcement_round_robin() {
        let mut list = ReinforcementList {
            entries: vec![
                Reinforcement { classname: "monster_soldier".into(), strength: 1, ..Default::default() },
                Reinforcement { classname: "monster_gunner".into(), strength: 2, ..Default::default() },
            ],
            next: 1,
        };
        assert_eq!(list.advance().map(|r| r.classname.clone()).as_deref(), Some("monster_gunner"));
        assert_eq!(list.advance().map(|r| r.classname.clone()).as_deref(), Some("monster_soldier"));
        assert_eq!(list.entries[1].count, 1);
    }
}
