//! Shared-buffer registry with per-buffer dependency handles.
//!
//! This module is the **struct-of-handles** core of the pipeline: every
//! shared buffer — a named, fixed-length, typed column of per-entity or
//! per-slot values — lives in one [`BufferRegistry`] together with its
//! dependency bookkeeping, instead of as hand-maintained buffer/handle field
//! pairs scattered across the codebase.
//!
//! ## Registry API
//!
//! * **Declare intent** — [`BufferRegistry::declare`] resolves one stage's
//!   access set into its wait-set and commits the stage into each touched
//!   buffer's handles, in a single pass.
//! * **Resolve** — views ([`ReadView`] / [`WriteView`]) hand stage bodies
//!   typed slices of the underlying storage.
//! * **Commit** — [`BufferRegistry::reset_handles`] is the barrier-side
//!   reset that returns every buffer to idle.
//!
//! ## Handle discipline
//!
//! Each buffer tracks one outstanding *writer* and a set of outstanding
//! *readers*, re-derived every tick:
//!
//! * a new **reader** waits for the prior writer only, and joins the reader
//!   set;
//! * a new **writer** waits for the prior writer *and* all prior readers,
//!   then replaces the writer handle and resets the reader set to itself.
//!
//! This is a single-writer/multi-reader lock per buffer, resolved statically
//! from declared intent rather than taken at runtime — the scheduler's
//! ordering **is** the synchronization mechanism.
//!
//! ## Concurrency model
//!
//! The registry is internally mutable (`UnsafeCell`) so concurrently running
//! stage bodies can hold disjoint views through a shared reference. Safety is
//! enforced by *API discipline*, not the borrow checker:
//!
//! * handle mutation (`declare`, `reset_handles`) requires `&mut self` and
//!   happens only on the driver thread, never during stage execution;
//! * concurrent slice access is safe because the scheduler never runs two
//!   stages with conflicting declared access at the same time;
//! * a stage touching a buffer it did not declare is a contract violation:
//!   debug builds assert (see [`DebugBorrow`]), release builds proceed with
//!   undefined ordering.

use std::any::{type_name, Any, TypeId};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use crate::engine::error::{PipelineError, TypeMismatchError};
use crate::engine::types::{AccessSets, BufferId, StageId, BUFFER_CAP};

/// Type-erased interface over a typed buffer column.
pub trait TypeErasedBuffer: Send {
    /// `TypeId` of the element type.
    fn element_type(&self) -> TypeId;
    /// Human-readable element type name, for diagnostics.
    fn element_type_name(&self) -> &'static str;
    /// Number of elements.
    fn len(&self) -> usize;
    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;
    /// Mutable downcasting hook.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Fixed-length typed storage for one buffer.
pub struct Buffer<T> {
    values: Box<[T]>,
}

impl<T: Send + Sync + 'static> Buffer<T> {
    /// Wraps `values` as buffer storage. Length is fixed for the run.
    pub fn new(values: Vec<T>) -> Self {
        Self { values: values.into_boxed_slice() }
    }
}

impl<T: Send + Sync + 'static> TypeErasedBuffer for Buffer<T> {
    fn element_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Outstanding dependency handles of one buffer, re-derived every tick.
#[derive(Debug, Default)]
struct HandleState {
    /// The last committed writer, if any.
    writer: Option<StageId>,
    /// Stages committed as readers since the last write (the writer itself
    /// rejoins this set when it commits).
    readers: Vec<StageId>,
}

impl HandleState {
    fn is_idle(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    fn reset(&mut self) {
        self.writer = None;
        self.readers.clear();
    }
}

/// Debug-build borrow flag catching contract violations at view granularity.
///
/// State encoding follows the runtime borrow tracker pattern:
/// `0` unlocked, `1` write-locked, `n >= 2` read-locked by `n - 1` readers.
/// Unlike a lock, a conflict here never waits — it panics naming the buffer,
/// because a conflicting view means either an undeclared access or two live
/// overlapping views inside one stage body.
#[cfg(debug_assertions)]
#[derive(Debug)]
struct DebugBorrow {
    state: std::sync::atomic::AtomicUsize,
}

#[cfg(debug_assertions)]
impl DebugBorrow {
    fn new() -> Self {
        Self { state: std::sync::atomic::AtomicUsize::new(0) }
    }

    fn acquire_read(&self, name: &'static str) {
        use std::sync::atomic::Ordering;
        loop {
            let current = self.state.load(Ordering::Acquire);
            assert!(
                current != 1,
                "buffer `{name}` viewed for read while a write view is live; \
                 undeclared access or overlapping views in one stage body"
            );
            let next = if current == 0 { 2 } else { current + 1 };
            if self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn release_read(&self) {
        use std::sync::atomic::Ordering;
        loop {
            let current = self.state.load(Ordering::Acquire);
            debug_assert!(current >= 2);
            let next = if current == 2 { 0 } else { current - 1 };
            if self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn acquire_write(&self, name: &'static str) {
        use std::sync::atomic::Ordering;
        let previous = self.state.swap(1, Ordering::AcqRel);
        assert!(
            previous == 0,
            "buffer `{name}` viewed for write while another view is live; \
             undeclared access or overlapping views in one stage body"
        );
    }

    fn release_write(&self) {
        use std::sync::atomic::Ordering;
        let previous = self.state.swap(0, Ordering::AcqRel);
        debug_assert!(previous == 1);
    }
}

/// One registered buffer: name, storage, handles, debug borrow flag.
struct BufferSlot {
    name: &'static str,
    data: UnsafeCell<Box<dyn TypeErasedBuffer>>,
    handle: HandleState,
    #[cfg(debug_assertions)]
    borrow: DebugBorrow,
}

/// Registry of all shared buffers and their dependency handles.
///
/// Buffers are registered once at startup and live until shutdown; the
/// registry is torn down only after the final barrier has drained every
/// outstanding handle.
pub struct BufferRegistry {
    slots: Vec<BufferSlot>,
}

/// The registry is shared by concurrently running stage bodies.
///
/// ## Safety
/// All interior mutation goes through `UnsafeCell`; the scheduler guarantees
/// that stages with conflicting declared access never run concurrently, and
/// handle bookkeeping is only touched through `&mut self` on the driver
/// thread.
unsafe impl Sync for BufferRegistry {}

impl BufferRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Registers a named buffer, returning its id.
    ///
    /// Names must be unique; the registry holds at most
    /// [`BUFFER_CAP`] buffers.
    pub fn register<T: Send + Sync + 'static>(
        &mut self,
        name: &'static str,
        values: Vec<T>,
    ) -> Result<BufferId, PipelineError> {
        if self.slots.iter().any(|slot| slot.name == name) {
            return Err(PipelineError::DuplicateBuffer { name });
        }
        if self.slots.len() >= BUFFER_CAP {
            return Err(PipelineError::BufferLimit { cap: BUFFER_CAP });
        }

        let id = self.slots.len() as BufferId;
        self.slots.push(BufferSlot {
            name,
            data: UnsafeCell::new(Box::new(Buffer::new(values))),
            handle: HandleState::default(),
            #[cfg(debug_assertions)]
            borrow: DebugBorrow::new(),
        });
        Ok(id)
    }

    /// Returns the id registered under `name`, if any.
    pub fn id_of(&self, name: &str) -> Option<BufferId> {
        self.slots
            .iter()
            .position(|slot| slot.name == name)
            .map(|index| index as BufferId)
    }

    /// Returns the name of buffer `id`.
    pub fn name(&self, id: BufferId) -> &'static str {
        self.slots[id as usize].name
    }

    /// Returns the element count of buffer `id`.
    pub fn len(&self, id: BufferId) -> usize {
        // Handles are not involved; reading the length through the cell is
        // benign even mid-tick because lengths are fixed for the run.
        unsafe { (*self.slots[id as usize].data.get()).len() }
    }

    /// Returns the number of registered buffers.
    pub fn buffer_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the registry holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Resolves one stage's access set into its wait-set and commits the
    /// stage into each touched buffer's handles.
    ///
    /// Called once per stage per tick, in registration order, on the driver
    /// thread. The returned wait-set is sorted, deduplicated, and excludes
    /// the stage itself; every entry is an earlier-registered stage.
    pub(crate) fn declare(&mut self, stage: StageId, access: &AccessSets) -> Vec<StageId> {
        let mut waits = Vec::new();

        for id in access.read.iter() {
            let handle = &mut self.slots[id as usize].handle;
            if let Some(writer) = handle.writer {
                waits.push(writer);
            }
            handle.readers.push(stage);
        }

        for id in access.write.iter() {
            let handle = &mut self.slots[id as usize].handle;
            if let Some(writer) = handle.writer {
                waits.push(writer);
            }
            waits.extend_from_slice(&handle.readers);
            handle.writer = Some(stage);
            handle.readers.clear();
            handle.readers.push(stage);
        }

        waits.sort_unstable();
        waits.dedup();
        waits.retain(|&wait| wait != stage);
        waits
    }

    /// Barrier-side reset: returns every buffer to the idle state.
    pub(crate) fn reset_handles(&mut self) {
        for slot in &mut self.slots {
            slot.handle.reset();
        }
    }

    /// Returns `true` if no buffer carries an outstanding handle.
    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(|slot| slot.handle.is_idle())
    }

    /// Creates a shared view of buffer `id`.
    ///
    /// ## Safety
    /// The caller must guarantee, via the scheduler's dependency resolution,
    /// that no stage with conflicting write access to this buffer runs
    /// concurrently with the view's lifetime.
    pub(crate) unsafe fn view<T: Send + Sync + 'static>(
        &self,
        id: BufferId,
    ) -> Result<ReadView<'_, T>, TypeMismatchError> {
        let slot = &self.slots[id as usize];
        let erased = unsafe { &*slot.data.get() };
        let buffer = erased
            .as_any()
            .downcast_ref::<Buffer<T>>()
            .ok_or(TypeMismatchError {
                buffer: slot.name,
                expected: erased.element_type_name(),
                requested: type_name::<T>(),
            })?;

        #[cfg(debug_assertions)]
        slot.borrow.acquire_read(slot.name);

        Ok(ReadView {
            values: &buffer.values,
            #[cfg(debug_assertions)]
            borrow: &slot.borrow,
        })
    }

    /// Creates an exclusive view of buffer `id`.
    ///
    /// ## Safety
    /// The caller must guarantee, via the scheduler's dependency resolution,
    /// that no other stage touching this buffer runs concurrently with the
    /// view's lifetime, and that at most one exclusive view of the buffer is
    /// live within the calling stage body.
    pub(crate) unsafe fn view_mut<T: Send + Sync + 'static>(
        &self,
        id: BufferId,
    ) -> Result<WriteView<'_, T>, TypeMismatchError> {
        let slot = &self.slots[id as usize];
        let erased = unsafe { &mut *slot.data.get() };
        let expected = erased.element_type_name();
        let buffer = erased
            .as_any_mut()
            .downcast_mut::<Buffer<T>>()
            .ok_or(TypeMismatchError {
                buffer: slot.name,
                expected,
                requested: type_name::<T>(),
            })?;

        #[cfg(debug_assertions)]
        slot.borrow.acquire_write(slot.name);

        Ok(WriteView {
            values: &mut buffer.values,
            #[cfg(debug_assertions)]
            borrow: &slot.borrow,
        })
    }

    /// Reads a buffer outside any tick, e.g. for frame consumption after the
    /// barrier.
    ///
    /// Must only be called while the pipeline is idle; debug builds assert
    /// this.
    pub fn read_idle<T: Send + Sync + 'static>(
        &self,
        id: BufferId,
    ) -> Result<&[T], TypeMismatchError> {
        debug_assert!(
            self.slots[id as usize].handle.is_idle(),
            "buffer `{}` read while its tick handles are outstanding",
            self.slots[id as usize].name
        );
        let slot = &self.slots[id as usize];
        // No stage body is executing while the handles are idle, so the
        // shared reference cannot alias a live mutable view.
        let erased = unsafe { &*slot.data.get() };
        let buffer = erased
            .as_any()
            .downcast_ref::<Buffer<T>>()
            .ok_or(TypeMismatchError {
                buffer: slot.name,
                expected: erased.element_type_name(),
                requested: type_name::<T>(),
            })?;
        Ok(&buffer.values)
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared view of one buffer, released on drop.
pub struct ReadView<'a, T> {
    values: &'a [T],
    #[cfg(debug_assertions)]
    borrow: &'a DebugBorrow,
}

impl<T> Deref for ReadView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.values
    }
}

impl<T> Drop for ReadView<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.borrow.release_read();
    }
}

/// Exclusive view of one buffer, released on drop.
pub struct WriteView<'a, T> {
    values: &'a mut [T],
    #[cfg(debug_assertions)]
    borrow: &'a DebugBorrow,
}

impl<T> Deref for WriteView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.values
    }
}

impl<T> DerefMut for WriteView<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.values
    }
}

impl<T> Drop for WriteView<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.borrow.release_write();
    }
}
