//! Fixed-capacity slot tables.
//!
//! A slot is the small integer the guest uses to name a host resource. Each
//! resource kind has its own [`SlotTable`], so file slot 0 and texture slot 0
//! are unrelated.

use std::fmt;

use crate::error::{Error, Result};

/// The kinds of host resource a guest can hold a slot for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    File,
    Pipeline,
    Framebuffer,
    Texture,
    Buffer,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Buffer => "buffer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guest-visible handle: an index into one slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Interpret a raw guest argument as a slot of the given kind.
    ///
    /// Negative values can never name a slot.
    pub fn from_guest(kind: ResourceKind, raw: i32) -> Result<Self> {
        u32::try_from(raw)
            .map(Slot)
            .map_err(|_| Error::invalid_handle(kind, raw))
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Slot> for i64 {
    fn from(slot: Slot) -> Self {
        slot.0 as i64
    }
}

/// Where a new resource goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The lowest-index empty slot.
    Lowest,
    /// Exactly this slot, which must be in range and empty.
    At(Slot),
}

/// A registry of live resources of one kind, addressed by [`Slot`].
#[derive(Debug)]
pub struct SlotTable<R> {
    kind: ResourceKind,
    slots: Vec<Option<R>>,
}

impl<R> SlotTable<R> {
    /// Create an empty table with `capacity` slots.
    pub fn new(kind: ResourceKind, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { kind, slots }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// Store `resource` in the lowest-index empty slot.
    pub fn allocate(&mut self, resource: R) -> Result<Slot> {
        self.insert(Placement::Lowest, resource)
    }

    /// Store `resource` in exactly `slot`.
    pub fn insert_at(&mut self, slot: Slot, resource: R) -> Result<()> {
        self.insert(Placement::At(slot), resource).map(|_| ())
    }

    /// Store `resource` according to `placement`.
    pub fn insert(&mut self, placement: Placement, resource: R) -> Result<Slot> {
        let slot = self.reserve(placement)?;
        self.slots[slot.index()] = Some(resource);
        Ok(slot)
    }

    /// Resolve `placement` to a free slot without filling it.
    ///
    /// Lets callers validate and create a backend object before committing
    /// the slot; nothing changes if they bail out.
    pub fn reserve(&self, placement: Placement) -> Result<Slot> {
        match placement {
            Placement::Lowest => self
                .slots
                .iter()
                .position(Option::is_none)
                .map(|index| Slot(index as u32))
                .ok_or(Error::Full { kind: self.kind }),
            Placement::At(slot) => match self.slots.get(slot.index()) {
                None => Err(Error::invalid_handle(self.kind, slot)),
                Some(Some(_)) => Err(Error::SlotInUse {
                    kind: self.kind,
                    slot,
                }),
                Some(None) => Ok(slot),
            },
        }
    }

    pub fn get(&self, slot: Slot) -> Result<&R> {
        self.slots
            .get(slot.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::invalid_handle(self.kind, slot))
    }

    pub fn get_mut(&mut self, slot: Slot) -> Result<&mut R> {
        let kind = self.kind;
        self.slots
            .get_mut(slot.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::invalid_handle(kind, slot))
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.get(slot).is_ok()
    }

    /// Empty `slot`, handing back the resource it held.
    pub fn release(&mut self, slot: Slot) -> Result<R> {
        let kind = self.kind;
        self.slots
            .get_mut(slot.index())
            .and_then(Option::take)
            .ok_or_else(|| Error::invalid_handle(kind, slot))
    }

    /// Empty every slot, yielding the live resources in slot order.
    pub fn drain(&mut self) -> impl Iterator<Item = (Slot, R)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|r| (Slot(index as u32), r)))
    }

    /// Iterate over live resources in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &R)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|r| (Slot(index as u32), r)))
    }
}
