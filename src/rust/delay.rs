// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        queue::{
            ChanendId,
            DelayKey,
        },
        timebase::Ticks,
    },
    system::SystemState,
};
use ::arrayvec::ArrayVec;
use ::slab::Slab;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Tokens travelling towards a destination chanend.
#[derive(Clone, Debug)]
pub enum DelayPayload {
    /// One control token.
    Ctrl(u8),
    /// One data token.
    Data(u8),
    /// A group of data tokens (a word is four).
    DataTokens(ArrayVec<u8, 4>),
}

/// A scheduled delivery of token(s) into a destination chanend. Records
/// live in a pool from enqueue until the scheduler fires them.
#[derive(Clone, Debug)]
pub struct TokenDelay {
    pub dest: ChanendId,
    pub payload: DelayPayload,
}

/// Pool of in-flight token deliveries. Slots are reused across the run so
/// sends do not allocate.
pub struct DelayPool {
    slab: Slab<TokenDelay>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TokenDelay {
    pub fn ctrl(dest: ChanendId, token: u8) -> Self {
        Self {
            dest,
            payload: DelayPayload::Ctrl(token),
        }
    }

    pub fn data(dest: ChanendId, token: u8) -> Self {
        Self {
            dest,
            payload: DelayPayload::Data(token),
        }
    }

    pub fn data_tokens(dest: ChanendId, tokens: &[u8]) -> Self {
        let mut values: ArrayVec<u8, 4> = ArrayVec::new();
        values.try_extend_from_slice(tokens).expect("token group larger than a word");
        Self {
            dest,
            payload: DelayPayload::DataTokens(values),
        }
    }
}

impl DelayPool {
    pub fn new() -> Self {
        Self { slab: Slab::new() }
    }

    pub fn insert(&mut self, delay: TokenDelay) -> DelayKey {
        self.slab.insert(delay)
    }

    pub fn remove(&mut self, key: DelayKey) -> TokenDelay {
        self.slab.remove(key)
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }
}

impl SystemState {
    /// Fires a token delivery: places the tokens into the destination
    /// chanend, which may wake a paused thread or raise an event.
    pub(crate) fn run_delay(&mut self, key: DelayKey, time: Ticks) {
        let delay: TokenDelay = self.delays.remove(key);
        trace!("delivering {:?} at {}", delay, time);
        match delay.payload {
            DelayPayload::Ctrl(token) => self.chanend_receive_ctrl_token(delay.dest, time, token),
            DelayPayload::Data(token) => self.chanend_receive_data_token(delay.dest, time, token),
            DelayPayload::DataTokens(tokens) => self.chanend_receive_data_tokens(delay.dest, time, &tokens),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for DelayPool {
    fn default() -> Self {
        Self::new()
    }
}
