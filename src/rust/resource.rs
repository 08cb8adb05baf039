// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::queue::{
    ChanendId,
    ThreadId,
    TimerId,
};

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Architectural resource types, as encoded in the low byte of a resource
/// identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ResourceType {
    Port = 0,
    Timer = 1,
    Chanend = 2,
    Sync = 3,
    Thread = 4,
    Lock = 5,
    ClkBlk = 6,
    Config = 12,
}

/// Outcome of a resource operation invoked by a thread. `Illegal` is
/// translated by the caller into a guest exception.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResOpResult<T = ()> {
    Continue(T),
    Deschedule,
    Illegal,
}

/// Resources that can raise events on their owner thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventableId {
    Chanend(ChanendId),
    Timer(TimerId),
}

/// Wait conditions configurable on timers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Condition {
    Full,
    After,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// 32-bit architectural resource identifier: type in bits [7:0], resource
/// number in bits [15:8], owning tile in bits [31:16].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId(pub u32);

/// State shared by every resource that can raise events or interrupts on
/// its owner thread: the owner, the event vector, the environment data
/// handed to the owner on completion, and the enable bits.
#[derive(Clone, Debug)]
pub struct EventableState {
    pub in_use: bool,
    pub owner: ThreadId,
    pub vector: u32,
    pub ev_data: u32,
    pub events_enabled: bool,
    pub interrupt_mode: bool,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl ResourceId {
    pub fn new(tile: u32, resource_type: ResourceType, num: u32) -> Self {
        Self((tile << 16) | ((num & 0xff) << 8) | resource_type as u32)
    }

    pub fn chanend(tile: u32, num: u32) -> Self {
        Self::new(tile, ResourceType::Chanend, num)
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        match self.0 & 0xff {
            0 => Some(ResourceType::Port),
            1 => Some(ResourceType::Timer),
            2 => Some(ResourceType::Chanend),
            3 => Some(ResourceType::Sync),
            4 => Some(ResourceType::Thread),
            5 => Some(ResourceType::Lock),
            6 => Some(ResourceType::ClkBlk),
            12 => Some(ResourceType::Config),
            _ => None,
        }
    }

    pub fn num(&self) -> u32 {
        (self.0 >> 8) & 0xff
    }

    /// Identifier of the tile this resource lives on.
    pub fn tile(&self) -> u32 {
        self.0 >> 16
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl EventableState {
    pub fn new() -> Self {
        Self {
            in_use: false,
            owner: ThreadId(0),
            vector: 0,
            ev_data: 0,
            events_enabled: false,
            interrupt_mode: false,
        }
    }

    pub fn set_in_use_on(&mut self, owner: ThreadId) {
        self.in_use = true;
        self.owner = owner;
        self.vector = 0;
        self.ev_data = 0;
        self.events_enabled = false;
        self.interrupt_mode = false;
    }

    pub fn set_in_use_off(&mut self) {
        self.in_use = false;
        self.events_enabled = false;
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T> ResOpResult<T> {
    pub fn is_continue(&self) -> bool {
        matches!(self, ResOpResult::Continue(_))
    }
}

impl Default for EventableState {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        ResourceId,
        ResourceType,
    };

    #[test]
    fn resource_id_round_trips_its_fields() {
        let id: ResourceId = ResourceId::chanend(5, 17);
        assert_eq!(id.resource_type(), Some(ResourceType::Chanend));
        assert_eq!(id.num(), 17);
        assert_eq!(id.tile(), 5);
    }

    #[test]
    fn unknown_resource_type_is_rejected() {
        let id: ResourceId = ResourceId(0x00000007);
        assert_eq!(id.resource_type(), None);
    }
}
