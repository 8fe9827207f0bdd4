//! Arena storage for MIR entities.
//!
//! Every definition, use edge, block and resume point of a compilation lives
//! in an [`Arena`] owned by the [`Graph`](super::graph::Graph). The arena
//! provides:
//! - **Bump allocation**: items are never freed individually
//! - **Generational ids**: an [`Id`] minted before [`Arena::clear`] is
//!   detected as stale instead of aliasing a new item
//! - **Two allocation modes**: infallible [`Arena::alloc`] and fallible
//!   [`Arena::try_alloc`], the latter honouring an optional ballast limit
//!
//! The whole arena is reclaimed at once when the compilation ends, whether
//! it succeeded or aborted.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use crate::error::{MirError, MirResult};

// =============================================================================
// Typed ID
// =============================================================================

/// A type-safe, generational identifier for arena-allocated items.
///
/// The generic parameter `T` ensures ids from different arenas can't be mixed.
/// Traits are implemented manually so `Id<T>` is always `Copy`/`Eq`/`Hash`
/// regardless of `T`.
pub struct Id<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.generation, self.index).cmp(&(other.generation, other.index))
    }
}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Id<T> {
    /// Create an id from a raw index in generation zero.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self::with_generation(index, 0)
    }

    #[inline]
    pub(crate) const fn with_generation(index: u32, generation: u32) -> Self {
        Id {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Get the raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Get the arena generation this id was minted in.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Get the index as usize.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }

    /// Invalid/null ID.
    pub const INVALID: Self = Id {
        index: u32::MAX,
        generation: 0,
        _marker: PhantomData,
    };

    /// Check if this ID is valid.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#INVALID")
        }
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

// =============================================================================
// Arena
// =============================================================================

/// A bump arena for homogeneous items.
///
/// Items are stored contiguously and addressed by [`Id`]. The arena never
/// frees individual items; [`Arena::clear`] drops everything at once and
/// starts a new generation.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
    generation: u32,
    limit: Option<usize>,
}

impl<T> Arena<T> {
    /// Create a new empty arena.
    #[inline]
    pub fn new() -> Self {
        Arena {
            items: Vec::new(),
            generation: 0,
            limit: None,
        }
    }

    /// Create a new arena with the given initial capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
            generation: 0,
            limit: None,
        }
    }

    /// Cap the number of items fallible allocation may hand out.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Allocate a new item and return its ID.
    ///
    /// Infallible: running out of memory aborts the process, the same way
    /// `Vec::push` does. The ballast limit is not consulted.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let index = self.items.len() as u32;
        self.items.push(item);
        Id::with_generation(index, self.generation)
    }

    /// Allocate a new item, reporting exhaustion instead of aborting.
    pub fn try_alloc(&mut self, item: T) -> MirResult<Id<T>> {
        self.try_reserve(1)?;
        Ok(self.alloc(item))
    }

    /// Make room for `additional` items, reporting exhaustion instead of
    /// aborting.
    pub fn try_reserve(&mut self, additional: usize) -> MirResult<()> {
        let wanted = self.items.len() + additional;
        if self.limit.is_some_and(|limit| wanted > limit) || wanted > u32::MAX as usize {
            return Err(MirError::OutOfMemory { requested: wanted });
        }
        self.items
            .try_reserve(additional)
            .map_err(|_| MirError::OutOfMemory { requested: wanted })
    }

    /// Check that `id` belongs to the current generation and is in bounds.
    #[inline]
    pub fn check(&self, id: Id<T>) -> MirResult<()> {
        if id.generation != self.generation || id.as_usize() >= self.items.len() {
            return Err(MirError::StaleId {
                index: id.index,
                generation: id.generation,
            });
        }
        Ok(())
    }

    /// Get a reference to an item by ID.
    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        if id.generation != self.generation {
            return None;
        }
        self.items.get(id.as_usize())
    }

    /// Get a mutable reference to an item by ID.
    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        if id.generation != self.generation {
            return None;
        }
        self.items.get_mut(id.as_usize())
    }

    /// Get the number of items in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the arena is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current generation.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Iterate over all items with their IDs.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        let generation = self.generation;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (Id::with_generation(i as u32, generation), item))
    }

    /// Iterate over all IDs.
    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = Id<T>> {
        let generation = self.generation;
        (0..self.items.len() as u32).map(move |i| Id::with_generation(i, generation))
    }

    /// Drop every item and start a new generation.
    pub fn clear(&mut self) {
        self.items.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Get the next ID that will be allocated.
    #[inline]
    pub fn next_id(&self) -> Id<T> {
        Id::with_generation(self.items.len() as u32, self.generation)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        debug_assert_eq!(id.generation, self.generation, "stale id {:?}", id);
        &self.items[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        debug_assert_eq!(id.generation, self.generation, "stale id {:?}", id);
        &mut self.items[id.as_usize()]
    }
}

// =============================================================================
// Bit Set
// =============================================================================

/// A compact bit set for tracking node properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    bits: Vec<u64>,
}

impl BitSet {
    /// Create a new empty bit set.
    pub fn new() -> Self {
        BitSet { bits: Vec::new() }
    }

    /// Create a new bit set with capacity for `n` bits.
    pub fn with_capacity(n: usize) -> Self {
        BitSet {
            bits: vec![0; n.div_ceil(64)],
        }
    }

    /// Set a bit. Returns `true` if the bit was previously clear.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let word = index / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let mask = 1u64 << (index % 64);
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }

    /// Clear a bit.
    #[inline]
    pub fn remove(&mut self, index: usize) {
        if let Some(word) = self.bits.get_mut(index / 64) {
            *word &= !(1u64 << (index % 64));
        }
    }

    /// Check if a bit is set.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.bits
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    /// Count the number of set bits.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over set bit indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64).filter_map(move |bit| {
                if word & (1u64 << bit) != 0 {
                    Some(word_idx * 64 + bit)
                } else {
                    None
                }
            })
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
