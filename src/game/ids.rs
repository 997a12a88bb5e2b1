//! Entity ID registry
//!
//! IDs are dense slot indices handed out in order and never reused. A slot can
//! be reserved before its object exists, because network messages reference
//! entities the receiver has not constructed yet.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, dense, monotonic entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("entity id {id} is out of range (registry holds {len} slots)")]
    OutOfRange { id: EntityId, len: usize },

    #[error("entity id {0} is reserved but not bound")]
    Unbound(EntityId),

    #[error("entity id {0} was retired")]
    Retired(EntityId),
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Reserved,
    Bound(T),
    Retired,
}

#[derive(Debug, Clone)]
pub struct IdManager<T> {
    slots: Vec<Slot<T>>,
}

impl<T> IdManager<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Reserve the next ID with an empty placeholder
    pub fn generate_new_id(&mut self) -> EntityId {
        let id = EntityId(self.slots.len() as u32);
        self.slots.push(Slot::Reserved);
        id
    }

    /// Reserve placeholders up to and including `id` so a peer's IDs can be mirrored
    pub fn reserve_through(&mut self, id: EntityId) {
        while self.slots.len() <= id.0 as usize {
            self.slots.push(Slot::Reserved);
        }
    }

    /// Bind an object to a previously reserved ID
    pub fn set_id_reference(&mut self, id: EntityId, value: T) -> Result<(), IdError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(IdError::OutOfRange { id, len })?;
        if matches!(slot, Slot::Retired) {
            return Err(IdError::Retired(id));
        }
        *slot = Slot::Bound(value);
        Ok(())
    }

    pub fn get_id_reference(&self, id: EntityId) -> Result<&T, IdError> {
        match self.slot(id)? {
            Slot::Bound(value) => Ok(value),
            Slot::Reserved => Err(IdError::Unbound(id)),
            Slot::Retired => Err(IdError::Retired(id)),
        }
    }

    pub fn get_id_reference_mut(&mut self, id: EntityId) -> Result<&mut T, IdError> {
        let len = self.slots.len();
        match self.slots.get_mut(id.0 as usize) {
            Some(Slot::Bound(value)) => Ok(value),
            Some(Slot::Reserved) => Err(IdError::Unbound(id)),
            Some(Slot::Retired) => Err(IdError::Retired(id)),
            None => Err(IdError::OutOfRange { id, len }),
        }
    }

    /// Remove the object bound to `id`; the slot stays allocated forever
    pub fn retire(&mut self, id: EntityId) -> Result<T, IdError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(IdError::OutOfRange { id, len })?;
        match std::mem::replace(slot, Slot::Retired) {
            Slot::Bound(value) => Ok(value),
            Slot::Reserved => {
                *slot = Slot::Reserved;
                Err(IdError::Unbound(id))
            }
            Slot::Retired => Err(IdError::Retired(id)),
        }
    }

    pub fn is_bound(&self, id: EntityId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Slot::Bound(_)))
    }

    /// Number of slots ever handed out
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bound entries in ID order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Bound(value) => Some((EntityId(index as u32), value)),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Bound(value) => Some((EntityId(index as u32), value)),
                _ => None,
            })
    }

    fn slot(&self, id: EntityId) -> Result<&Slot<T>, IdError> {
        self.slots.get(id.0 as usize).ok_or(IdError::OutOfRange {
            id,
            len: self.slots.len(),
        })
    }
}

impl<T> Default for IdManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
