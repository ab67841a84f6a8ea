//! Core identifiers, capacities, and access-declaration types.
//!
//! This module defines the **fundamental types and bit layouts** shared by the
//! pool allocator, the shared-buffer registry, and the stage scheduler.
//!
//! ## Design philosophy
//!
//! The crate is designed around:
//!
//! - **Dense storage** — buffers are fixed-length typed columns addressed by
//!   compact numeric ids,
//! - **Bitset-based intent** — the set of buffers a stage touches is a
//!   fixed-size bit array, cheap to copy and to intersect,
//! - **Explicit access declaration** — every stage states up front which
//!   buffers it reads and which it writes; the scheduler derives all ordering
//!   from these declarations.
//!
//! ## Identifiers
//!
//! All ids are small copyable integers. An [`EntityId`] indexes the virtual
//! population, a [`SlotId`] indexes the real resource pool, a [`BufferId`]
//! indexes the registry, and a [`StageId`] is the registration index of a
//! stage within one pipeline.
//!
//! ## Access control
//!
//! [`Signature`] is a bitset over buffer ids. [`AccessSets`] pairs a read
//! signature with a write signature and supports fast conflict detection
//! between two stages, which the scheduler uses to validate the resolved
//! dependency graph in debug builds.

/// Index of a virtual entity within the population array.
pub type EntityId = u32;
/// Index of a real slot within the resource pool.
pub type SlotId = u32;
/// Identifier for a registered shared buffer.
pub type BufferId = u16;
/// Registration index of a stage within a pipeline.
pub type StageId = u16;
/// Simulation tick counter.
pub type Tick = u64;

/// Maximum number of buffers a registry may hold.
pub const BUFFER_CAP: usize = 128;
/// Number of `u64` words required to represent a full buffer signature.
pub const SIGNATURE_SIZE: usize = (BUFFER_CAP + 63) / 64;

/// Number of elements processed per parallel chunk in data-parallel stage
/// bodies. Chunks are independent; no cross-chunk synchronization exists.
pub const PAR_CHUNK: usize = 2048;

/// Bitset representing a set of buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Packed buffer-id bitset.
    pub words: [u64; SIGNATURE_SIZE],
}

impl Default for Signature {
    fn default() -> Self {
        Self { words: [0u64; SIGNATURE_SIZE] }
    }
}

impl Signature {
    /// Sets the bit corresponding to `buffer_id`.
    #[inline]
    pub fn set(&mut self, buffer_id: BufferId) {
        let index = (buffer_id as usize) / 64;
        let bits = (buffer_id as usize) % 64;
        self.words[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `buffer_id`.
    #[inline]
    pub fn clear(&mut self, buffer_id: BufferId) {
        let index = (buffer_id as usize) / 64;
        let bits = (buffer_id as usize) % 64;
        self.words[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `buffer_id` is present in this signature.
    #[inline]
    pub fn has(&self, buffer_id: BufferId) -> bool {
        let index = (buffer_id as usize) / 64;
        let bits = (buffer_id as usize) % 64;
        (self.words[index] >> bits) & 1 == 1
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Returns `true` if this signature shares at least one bit with `other`.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Iterates over all buffer ids set in this signature.
    pub fn iter(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((base + tz) as BufferId)
            })
        })
    }
}

/// Builds a buffer signature from a list of buffer ids.
pub fn build_signature(buffer_ids: &[BufferId]) -> Signature {
    let mut signature = Signature::default();
    for &buffer_id in buffer_ids {
        signature.set(buffer_id);
    }
    signature
}

/// Access mode for a shared buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared read-only access.
    Read,
    /// Exclusive write access. A declared writer may also read the buffer
    /// within its own body (read-modify-write).
    Write,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
        }
    }
}

/// Declares the buffer access set of a stage.
///
/// Built once at stage construction and consulted by the scheduler every
/// tick. Declaring a buffer in both `read` and `write` is rejected at
/// registration: exclusive write access already covers reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessSets {
    /// Buffers read by the stage.
    pub read: Signature,
    /// Buffers written by the stage.
    pub write: Signature,
}

impl AccessSets {
    /// Builds an access set from explicit read and write id lists.
    pub fn new(reads: &[BufferId], writes: &[BufferId]) -> Self {
        Self {
            read: build_signature(reads),
            write: build_signature(writes),
        }
    }

    /// Returns `true` if this access set conflicts with another.
    ///
    /// Two stages conflict when one writes a buffer the other reads or
    /// writes. Non-conflicting stages may run concurrently.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        self.write.intersects(&other.write)
            || self.write.intersects(&other.read)
            || self.read.intersects(&other.write)
    }

    /// Returns `true` if the set declares no buffer at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }
}
