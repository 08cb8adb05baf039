// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::ring::RingBuffer,
    config::CHANEND_BUFFER_SIZE,
    delay::TokenDelay,
    resource::{
        EventableId,
        EventableState,
        ResOpResult,
        ResourceId,
        ResourceType,
    },
    runtime::{
        queue::{
            ChanendId,
            DelayKey,
            Runnable,
            ThreadId,
        },
        timebase::{
            Ticks,
            CYCLES_PER_TICK,
        },
    },
    system::SystemState,
    thread::ThreadState,
    token::{
        ControlToken,
        Token,
    },
};
use ::std::collections::VecDeque;

//======================================================================================================================
// Constants
//======================================================================================================================

const CT_END: u8 = ControlToken::End as u8;
const CT_PAUSE: u8 = ControlToken::Pause as u8;
const CT_READ4: u8 = ControlToken::Read4 as u8;
const CT_WRITE4: u8 = ControlToken::Write4 as u8;

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Kind of remote memory access being served by an endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemAccessType {
    Read4,
    Write4,
}

/// Outcome of claiming a destination endpoint for a packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ClaimOutcome {
    /// Route opened; the destination adopted this source.
    Opened,
    /// Destination discards incoming tokens; send into the void.
    Junk,
    /// Another source holds the route; caller was queued.
    Busy,
}

/// Outcome of opening (or re-using) a route for an outgoing token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RouteOutcome {
    Open(ChanendId),
    Junk,
    Busy,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Sub-state of a remote memory access packet in flight: the reply route,
/// the address, and (for writes) the value, populated one word at a time.
#[derive(Clone, Copy, Debug)]
pub struct MemAccess {
    pub access_type: MemAccessType,
    pub step: u8,
    pub cri: u32,
    pub address: u32,
    pub value: u32,
}

/// One endpoint of an asynchronous bytestream channel: an 8-token input
/// buffer, the packet protocol state machine, and the parking spots for
/// threads blocked on input or output.
pub struct Chanend {
    pub eventable: EventableState,
    /// Flat arena index of this endpoint.
    pub id: ChanendId,
    /// Endpoint number on its tile.
    pub num: usize,
    /// Flat index of the owning tile.
    pub core: usize,
    /// Architectural identifier, routable from any tile.
    pub resource_id: ResourceId,
    /// Destination endpoint of the open (or next) packet.
    pub dest: Option<ChanendId>,
    /// Source endpoint currently holding a route to us.
    pub source: Option<ChanendId>,
    /// Sources queued behind the current route holder.
    pub waiters: VecDeque<ChanendId>,
    /// Incoming claims are junked while the endpoint is not in use.
    pub junk_incoming: bool,
    /// Input buffer.
    pub buf: RingBuffer<Token, CHANEND_BUFFER_SIZE>,
    /// Buffer slots promised to tokens still in flight.
    pub reserved: usize,
    /// Thread parked on an output instruction.
    pub paused_out: Option<ThreadId>,
    /// Thread parked on an input instruction.
    pub paused_in: Option<ThreadId>,
    /// Whether the paused input is waiting for a whole word.
    pub wait_for_word: bool,
    /// A packet is open from this endpoint.
    pub in_packet: bool,
    /// The open packet has no destination; observe the protocol, drop the
    /// tokens.
    pub junk_packet: bool,
    /// Remote memory access packet in progress, if any.
    pub mem_access: Option<MemAccess>,
    /// Timestamp of the previous send, for the anti-overtake clamp.
    pub last_time: Ticks,
    /// Latency of the previous send, for the anti-overtake clamp.
    pub last_latency: Ticks,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Chanend {
    pub fn new(id: ChanendId, num: usize, core: usize, resource_id: ResourceId) -> Self {
        Self {
            eventable: EventableState::new(),
            id,
            num,
            core,
            resource_id,
            dest: None,
            source: None,
            waiters: VecDeque::new(),
            junk_incoming: true,
            buf: RingBuffer::new(),
            reserved: 0,
            paused_out: None,
            paused_in: None,
            wait_for_word: false,
            in_packet: false,
            junk_packet: false,
            mem_access: None,
            last_time: 0,
            last_latency: 0,
        }
    }

    pub fn alloc(&mut self, owner: ThreadId) {
        assert!(!self.eventable.in_use, "allocating in-use chanend");
        self.dest = None;
        self.reserved = 0;
        self.paused_out = None;
        self.paused_in = None;
        self.in_packet = false;
        self.junk_packet = false;
        self.mem_access = None;
        self.eventable.set_in_use_on(owner);
        // ED delivered on an event defaults to the resource id.
        self.eventable.ev_data = self.resource_id.raw();
        self.junk_incoming = false;
    }

    /// Frees the endpoint. Fails while tokens are buffered, a source holds
    /// a route to us, or a packet is open.
    pub fn free(&mut self) -> bool {
        if !self.buf.is_empty() || self.source.is_some() || self.in_packet {
            return false;
        }
        self.eventable.set_in_use_off();
        self.junk_incoming = true;
        true
    }

    pub fn can_accept_token(&self) -> bool {
        self.can_accept_tokens(1)
    }

    /// Back-pressure signal: free buffer slots net of tokens already in
    /// flight towards us.
    pub fn can_accept_tokens(&self, tokens: usize) -> bool {
        self.buf.remaining().saturating_sub(self.reserved) >= tokens
    }

    /// Attempts to bind `source` as the route holder. A busy endpoint
    /// queues the claimant for `release` to adopt later.
    fn claim(&mut self, source: ChanendId) -> ClaimOutcome {
        if self.junk_incoming {
            return ClaimOutcome::Junk;
        }
        if self.source == Some(source) {
            return ClaimOutcome::Opened;
        }
        if self.source.is_none() {
            self.source = Some(source);
            return ClaimOutcome::Opened;
        }
        self.waiters.push_back(source);
        ClaimOutcome::Busy
    }

    /// Unbinds the route holder and adopts the next queued claimant, who
    /// must then be notified.
    fn release(&mut self) -> Option<ChanendId> {
        match self.waiters.pop_front() {
            Some(next) => {
                self.source = Some(next);
                Some(next)
            },
            None => {
                self.source = None;
                None
            },
        }
    }
}

//======================================================================================================================
// Channel-end operations (invoked by threads)
//======================================================================================================================

impl SystemState {
    /// Resolves the destination endpoint of subsequent packets. Fails when
    /// a packet is open or the identifier does not name a chanend or a
    /// configuration resource.
    pub fn chanend_set_data(&mut self, tid: ThreadId, cid: ChanendId, value: u32) -> bool {
        self.chanends[cid.0].eventable.owner = tid;
        if self.chanends[cid.0].in_packet {
            return false;
        }
        let dest_id: ResourceId = ResourceId(value);
        match dest_id.resource_type() {
            Some(ResourceType::Chanend) => {
                let dest: Option<ChanendId> = self.chanend_dest_index.get(&value).copied();
                if dest.is_none() {
                    debug!("setd: no endpoint matches {:#010x}, packets will be junked", value);
                }
                self.chanends[cid.0].dest = dest;
                true
            },
            // Switch configuration endpoints are not modelled; route into
            // the void but observe the protocol.
            Some(ResourceType::Config) => {
                self.chanends[cid.0].dest = None;
                true
            },
            _ => false,
        }
    }

    /// Emits one data token on the open packet.
    pub fn chanend_outt(&mut self, tid: ThreadId, cid: ChanendId, value: u8) -> ResOpResult {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_prepare_out(tid, cid, 1) {
            None => ResOpResult::Deschedule,
            Some(None) => ResOpResult::Continue(()),
            Some(Some((dest, latency))) => {
                self.schedule_delay(TokenDelay::data(dest, value), time + latency);
                trace!("chanend {:?}: data token {:#04x} -> {:?} at {}", cid, value, dest, time + latency);
                ResOpResult::Continue(())
            },
        }
    }

    /// Emits a 32-bit word as four data tokens, big-endian.
    pub fn chanend_out(&mut self, tid: ThreadId, cid: ChanendId, value: u32) -> ResOpResult {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_prepare_out(tid, cid, 4) {
            None => ResOpResult::Deschedule,
            Some(None) => ResOpResult::Continue(()),
            Some(Some((dest, latency))) => {
                // Channels are big endian.
                let tokens: [u8; 4] = value.to_be_bytes();
                self.schedule_delay(TokenDelay::data_tokens(dest, &tokens), time + latency);
                trace!("chanend {:?}: word {:#010x} -> {:?} at {}", cid, value, dest, time + latency);
                ResOpResult::Continue(())
            },
        }
    }

    /// Emits one control token. END and PAUSE close the packet on the
    /// sender immediately; the token itself is still in flight.
    pub fn chanend_outct(&mut self, tid: ThreadId, cid: ChanendId, value: u8) -> ResOpResult {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_prepare_out(tid, cid, 1) {
            None => ResOpResult::Deschedule,
            Some(None) => {
                if value == CT_END || value == CT_PAUSE {
                    let c: &mut Chanend = &mut self.chanends[cid.0];
                    c.in_packet = false;
                    c.junk_packet = false;
                }
                ResOpResult::Continue(())
            },
            Some(Some((dest, latency))) => {
                self.schedule_delay(TokenDelay::ctrl(dest, value), time + latency);
                trace!("chanend {:?}: ctrl token {:#04x} -> {:?} at {}", cid, value, dest, time + latency);
                if value == CT_END || value == CT_PAUSE {
                    self.chanends[cid.0].in_packet = false;
                }
                ResOpResult::Continue(())
            },
        }
    }

    /// Checks the head of the buffer. Parks the thread when no token is
    /// available.
    pub fn chanend_testct(&mut self, tid: ThreadId, cid: ChanendId) -> ResOpResult<bool> {
        self.chanends[cid.0].eventable.owner = tid;
        if self.chanends[cid.0].buf.is_empty() {
            self.chanend_park_in(tid, cid, false);
            return ResOpResult::Deschedule;
        }
        ResOpResult::Continue(self.chanends[cid.0].buf.front().is_control())
    }

    /// 1-based index of the first control token among the first four, or 0
    /// if the first word is all data. Parks the thread until a full word
    /// (or an early control token) is present.
    pub fn chanend_testwct(&mut self, tid: ThreadId, cid: ChanendId) -> ResOpResult<u32> {
        self.chanends[cid.0].eventable.owner = tid;
        let c: &Chanend = &self.chanends[cid.0];
        let num_tokens: usize = ::std::cmp::min(c.buf.len(), 4);
        for i in 0..num_tokens {
            if c.buf[i].is_control() {
                return ResOpResult::Continue(i as u32 + 1);
            }
        }
        if c.buf.len() < 4 {
            self.chanend_park_in(tid, cid, true);
            return ResOpResult::Deschedule;
        }
        ResOpResult::Continue(0)
    }

    /// Pops one data token. Illegal if the head is a control token.
    pub fn chanend_intoken(&mut self, tid: ThreadId, cid: ChanendId) -> ResOpResult<u32> {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_testct(tid, cid) {
            ResOpResult::Deschedule => ResOpResult::Deschedule,
            ResOpResult::Continue(true) => ResOpResult::Illegal,
            ResOpResult::Continue(false) => ResOpResult::Continue(self.chanend_pop_token(cid, time) as u32),
            ResOpResult::Illegal => unreachable!("testct cannot be illegal"),
        }
    }

    /// Pops one control token. Illegal if the head is a data token.
    pub fn chanend_inct(&mut self, tid: ThreadId, cid: ChanendId) -> ResOpResult<u32> {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_testct(tid, cid) {
            ResOpResult::Deschedule => ResOpResult::Deschedule,
            ResOpResult::Continue(false) => ResOpResult::Illegal,
            ResOpResult::Continue(true) => ResOpResult::Continue(self.chanend_pop_token(cid, time) as u32),
            ResOpResult::Illegal => unreachable!("testct cannot be illegal"),
        }
    }

    /// Pops the head token provided it is a control token with the
    /// expected value.
    pub fn chanend_chkct(&mut self, tid: ThreadId, cid: ChanendId, value: u8) -> ResOpResult {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_testct(tid, cid) {
            ResOpResult::Deschedule => ResOpResult::Deschedule,
            ResOpResult::Continue(is_ct) => {
                if !is_ct || self.chanends[cid.0].buf.front().value() != value {
                    return ResOpResult::Illegal;
                }
                let _: u8 = self.chanend_pop_token(cid, time);
                ResOpResult::Continue(())
            },
            ResOpResult::Illegal => unreachable!("testct cannot be illegal"),
        }
    }

    /// Pops four data tokens as a big-endian word. Illegal if a control
    /// token sits among the first four.
    pub fn chanend_in(&mut self, tid: ThreadId, cid: ChanendId) -> ResOpResult<u32> {
        let time: Ticks = self.threads[tid.0].time;
        match self.chanend_testwct(tid, cid) {
            ResOpResult::Deschedule => ResOpResult::Deschedule,
            ResOpResult::Continue(0) => {
                let c: &mut Chanend = &mut self.chanends[cid.0];
                let value: u32 = (c.buf[0].value() as u32) << 24
                    | (c.buf[1].value() as u32) << 16
                    | (c.buf[2].value() as u32) << 8
                    | c.buf[3].value() as u32;
                c.buf.pop_front_n(4);
                let source: Option<ChanendId> = c.source;
                if let Some(src) = source {
                    self.chanend_notify_dest_can_accept_tokens(src, time);
                }
                ResOpResult::Continue(value)
            },
            ResOpResult::Continue(_) => ResOpResult::Illegal,
            ResOpResult::Illegal => unreachable!("testwct cannot be illegal"),
        }
    }

    /// Frees the endpoint; see `Chanend::free` for the preconditions.
    pub fn chanend_free(&mut self, tid: ThreadId, cid: ChanendId) -> bool {
        if !self.chanends[cid.0].free() {
            return false;
        }
        let resource: EventableId = EventableId::Chanend(cid);
        self.threads[tid.0].event_resources.retain(|&r| r != resource);
        true
    }

    //==================================================================================================================
    // Output path internals
    //==================================================================================================================

    /// Common prologue of every outgoing operation: open (or re-use) the
    /// route, apply back-pressure, compute the delivery latency and
    /// reserve buffer space at the destination.
    ///
    /// Returns `None` when the thread parked, `Some(None)` for a junked
    /// packet, and `Some(Some((dest, latency)))` when tokens may be sent.
    #[allow(clippy::option_option)]
    fn chanend_prepare_out(
        &mut self,
        tid: ThreadId,
        cid: ChanendId,
        num_tokens: usize,
    ) -> Option<Option<(ChanendId, Ticks)>> {
        let time: Ticks = self.threads[tid.0].time;
        self.chanends[cid.0].eventable.owner = tid;
        let route_was_open: bool = self.chanends[cid.0].in_packet;
        match self.chanend_open_route(cid) {
            RouteOutcome::Busy => {
                self.chanend_park_out(tid, cid);
                None
            },
            RouteOutcome::Junk => Some(None),
            RouteOutcome::Open(dest) => {
                if !self.chanends[dest.0].can_accept_tokens(num_tokens) {
                    self.chanend_park_out(tid, cid);
                    return None;
                }
                let latency: Ticks = self.chanend_route_latency(cid, dest, num_tokens, route_was_open, time);
                self.chanends[dest.0].reserved += num_tokens;
                Some(Some((dest, latency)))
            },
        }
    }

    /// Opens a route for a packet. With no destination set the packet is
    /// junked; a busy destination queues us and the caller must park.
    fn chanend_open_route(&mut self, cid: ChanendId) -> RouteOutcome {
        if self.chanends[cid.0].in_packet {
            return match self.chanends[cid.0].dest {
                Some(dest) if !self.chanends[cid.0].junk_packet => RouteOutcome::Open(dest),
                _ => RouteOutcome::Junk,
            };
        }
        match self.chanends[cid.0].dest {
            None => {
                // TODO a link error exception would be architecturally
                // more faithful here than junking the packet.
                let c: &mut Chanend = &mut self.chanends[cid.0];
                c.in_packet = true;
                c.junk_packet = true;
                RouteOutcome::Junk
            },
            Some(dest) => match self.chanends[dest.0].claim(cid) {
                ClaimOutcome::Busy => RouteOutcome::Busy,
                ClaimOutcome::Junk => {
                    let c: &mut Chanend = &mut self.chanends[cid.0];
                    c.in_packet = true;
                    c.junk_packet = true;
                    RouteOutcome::Junk
                },
                ClaimOutcome::Opened => {
                    self.chanends[cid.0].in_packet = true;
                    RouteOutcome::Open(dest)
                },
            },
        }
    }

    /// Delivery latency for this send, clamped so deliveries on the route
    /// never arrive out of order even when the raw model is non-monotonic.
    fn chanend_route_latency(
        &mut self,
        cid: ChanendId,
        dest: ChanendId,
        num_tokens: usize,
        route_open: bool,
        time: Ticks,
    ) -> Ticks {
        let s_tile: u32 = self.cores[self.chanends[cid.0].core].core_id;
        let t_tile: u32 = self.cores[self.chanends[dest.0].core].core_id;
        let raw: Ticks = self.latency_model.calc(s_tile, t_tile, num_tokens as u32, route_open);
        let c: &mut Chanend = &mut self.chanends[cid.0];
        let mut latency: Ticks = raw;
        if time + latency < c.last_time + c.last_latency {
            latency = c.last_latency + (time - c.last_time);
        }
        c.last_time = time;
        c.last_latency = latency;
        latency
    }

    fn schedule_delay(&mut self, delay: TokenDelay, wake_up_time: Ticks) {
        let key: DelayKey = self.delays.insert(delay);
        self.queue.push(Runnable::Delay(key), wake_up_time);
    }

    //==================================================================================================================
    // Input path internals
    //==================================================================================================================

    /// Pops the head token and lets the route holder know buffer space
    /// opened up.
    fn chanend_pop_token(&mut self, cid: ChanendId, time: Ticks) -> u8 {
        let c: &mut Chanend = &mut self.chanends[cid.0];
        let value: u8 = c.buf.pop_front().value();
        let source: Option<ChanendId> = c.source;
        if let Some(src) = source {
            self.chanend_notify_dest_can_accept_tokens(src, time);
        }
        value
    }

    fn chanend_park_in(&mut self, tid: ThreadId, cid: ChanendId, wait_for_word: bool) {
        let c: &mut Chanend = &mut self.chanends[cid.0];
        assert!(c.paused_in.is_none(), "chanend already has a paused input");
        c.paused_in = Some(tid);
        c.wait_for_word = wait_for_word;
        let resource_id: ResourceId = c.resource_id;
        self.park_thread(tid, resource_id);
    }

    fn chanend_park_out(&mut self, tid: ThreadId, cid: ChanendId) {
        let c: &mut Chanend = &mut self.chanends[cid.0];
        assert!(c.paused_out.is_none(), "chanend already has a paused output");
        c.paused_out = Some(tid);
        let resource_id: ResourceId = c.resource_id;
        self.park_thread(tid, resource_id);
    }

    /// The route we were waiting on has been opened for us.
    pub(crate) fn chanend_notify_dest_claimed(&mut self, cid: ChanendId, time: Ticks) {
        if let Some(tid) = self.chanends[cid.0].paused_out.take() {
            self.wake_thread(tid, time);
        }
    }

    /// The destination can accept more tokens. Identical in effect to
    /// `chanend_notify_dest_claimed`; kept separate because the two are
    /// distinct protocol signals.
    pub(crate) fn chanend_notify_dest_can_accept_tokens(&mut self, cid: ChanendId, time: Ticks) {
        if let Some(tid) = self.chanends[cid.0].paused_out.take() {
            self.wake_thread(tid, time);
        }
    }

    //==================================================================================================================
    // Receive path (called when a TokenDelay fires)
    //==================================================================================================================

    pub(crate) fn chanend_receive_data_token(&mut self, cid: ChanendId, time: Ticks, value: u8) {
        let c: &mut Chanend = &mut self.chanends[cid.0];
        c.reserved = c.reserved.saturating_sub(1);
        if c.mem_access.is_some() {
            // Memory access packets carry whole words only.
            self.chanend_illegal_mem_access_packet(cid);
            return;
        }
        c.buf.push_back(Token::data(value));
        self.chanend_update(cid, time);
    }

    pub(crate) fn chanend_receive_data_tokens(&mut self, cid: ChanendId, time: Ticks, values: &[u8]) {
        let c: &mut Chanend = &mut self.chanends[cid.0];
        c.reserved = c.reserved.saturating_sub(values.len());
        if let Some(access) = c.mem_access.as_mut() {
            if values.len() != 4 {
                self.chanend_illegal_mem_access_packet(cid);
                return;
            }
            let word: u32 = u32::from_be_bytes([values[0], values[1], values[2], values[3]]);
            match (access.step, access.access_type) {
                (0, _) => access.cri = word,
                (1, _) => access.address = word,
                (2, MemAccessType::Write4) => access.value = word,
                _ => {
                    self.chanend_illegal_mem_access_packet(cid);
                    return;
                },
            }
            access.step += 1;
            return;
        }
        for &value in values {
            c.buf.push_back(Token::data(value));
        }
        self.chanend_update(cid, time);
    }

    pub(crate) fn chanend_receive_ctrl_token(&mut self, cid: ChanendId, time: Ticks, value: u8) {
        {
            let c: &mut Chanend = &mut self.chanends[cid.0];
            c.reserved = c.reserved.saturating_sub(1);
        }
        if self.chanends[cid.0].mem_access.is_some() {
            if value == CT_END {
                self.chanend_mem_access_complete(cid, time);
            } else {
                self.chanend_illegal_mem_access_packet(cid);
            }
            return;
        }
        match value {
            CT_READ4 => {
                self.chanends[cid.0].mem_access = Some(MemAccess {
                    access_type: MemAccessType::Read4,
                    step: 0,
                    cri: 0,
                    address: 0,
                    value: 0,
                });
            },
            CT_WRITE4 => {
                self.chanends[cid.0].mem_access = Some(MemAccess {
                    access_type: MemAccessType::Write4,
                    step: 0,
                    cri: 0,
                    address: 0,
                    value: 0,
                });
            },
            CT_END => {
                self.chanends[cid.0].buf.push_back(Token::control(value));
                self.chanend_release(cid, time);
                self.chanend_update(cid, time);
            },
            CT_PAUSE => {
                self.chanend_release(cid, time);
                self.chanend_update(cid, time);
            },
            _ => {
                self.chanends[cid.0].buf.push_back(Token::control(value));
                self.chanend_update(cid, time);
            },
        }
    }

    /// Unbinds the route holder, freeing the route. The next queued
    /// claimant is adopted and notified so its thread may retry the send.
    fn chanend_release(&mut self, cid: ChanendId, time: Ticks) {
        if let Some(adopted) = self.chanends[cid.0].release() {
            self.chanend_notify_dest_claimed(adopted, time);
        }
    }

    /// Reacts to freshly arrived tokens: raise an event on the owner when
    /// armed, otherwise wake a paused input whose wait is satisfied.
    pub(crate) fn chanend_update(&mut self, cid: ChanendId, time: Ticks) {
        if self.chanends[cid.0].buf.is_empty() {
            return;
        }
        let (in_use, enabled, interrupt, owner) = {
            let e: &EventableState = &self.chanends[cid.0].eventable;
            (e.in_use, e.events_enabled, e.interrupt_mode, e.owner)
        };
        if in_use && enabled {
            let permitted: bool = {
                let t: &ThreadState = &self.threads[owner.0];
                if interrupt { t.ieble() } else { t.eeble() }
            };
            if permitted {
                self.complete_event(owner, EventableId::Chanend(cid), interrupt, time);
                return;
            }
        }
        let c: &mut Chanend = &mut self.chanends[cid.0];
        let tid: ThreadId = match c.paused_in {
            Some(tid) => tid,
            None => return,
        };
        if c.wait_for_word && c.buf.len() < 4 {
            return;
        }
        c.paused_in = None;
        self.wake_thread(tid, time);
    }

    /// Invoked when the owner thread re-enables events: fire immediately
    /// if a token is already buffered.
    pub(crate) fn chanend_see_event_enable(&mut self, cid: ChanendId, time: Ticks) -> bool {
        if self.chanends[cid.0].buf.is_empty() {
            return false;
        }
        let (owner, interrupt) = {
            let e: &EventableState = &self.chanends[cid.0].eventable;
            (e.owner, e.interrupt_mode)
        };
        self.complete_event(owner, EventableId::Chanend(cid), interrupt, time);
        true
    }

    //==================================================================================================================
    // Remote memory access packets
    //==================================================================================================================

    /// CT_END arrived on a memory access packet: perform the access and
    /// emit the response along the reverse route.
    fn chanend_mem_access_complete(&mut self, cid: ChanendId, time: Ticks) {
        let access: MemAccess = self.chanends[cid.0].mem_access.take().expect("no memory access in progress");
        let expected_steps: u8 = match access.access_type {
            MemAccessType::Read4 => 2,
            MemAccessType::Write4 => 3,
        };
        if access.step != expected_steps {
            warn!("Illegal memory access packet.");
            return;
        }
        let core: usize = self.chanends[cid.0].core;
        let address: u32 = access.address.wrapping_sub(self.cores[core].ram_base);
        if !self.cores[core].is_valid_address(address) {
            warn!("Illegal memory address {:#010x}.", access.address);
            return;
        }
        let service_time: Ticks = time + self.config.latency_global_memory + 2 * CYCLES_PER_TICK;
        match access.access_type {
            MemAccessType::Read4 => {
                let value: u32 = self.cores[core].load_word(address);
                debug!("memory access: read {:#010x} -> {:#010x}", access.address, value);
                self.chanend_mem_reply(cid, access.cri, Some(value), service_time);
            },
            MemAccessType::Write4 => {
                debug!("memory access: write {:#010x} <- {:#010x}", access.address, access.value);
                self.cores[core].store_word(address, access.value);
                self.chanend_mem_reply(cid, access.cri, None, service_time);
            },
        }
        // The access charges the serving thread as well.
        let e: EventableState = self.chanends[cid.0].eventable.clone();
        if e.in_use {
            self.threads[e.owner.0].time += self.config.latency_global_memory + 2 * CYCLES_PER_TICK;
        }
    }

    /// Sends the response of a memory access back to the originator: the
    /// value (for reads) followed by CT_END, from this same endpoint.
    fn chanend_mem_reply(&mut self, cid: ChanendId, cri: u32, value: Option<u32>, time: Ticks) {
        let reply: ChanendId = match self.chanend_dest_index.get(&cri).copied() {
            Some(reply) => reply,
            None => {
                warn!("Illegal memory access packet.");
                return;
            },
        };
        self.chanends[cid.0].dest = Some(reply);
        match self.chanend_open_route(cid) {
            RouteOutcome::Busy => {
                // No thread to park; the response is lost. Misbehaving
                // guests only.
                warn!("memory access response dropped: route busy");
                return;
            },
            RouteOutcome::Junk => {
                let c: &mut Chanend = &mut self.chanends[cid.0];
                c.in_packet = false;
                c.junk_packet = false;
                return;
            },
            RouteOutcome::Open(dest) => {
                let total: usize = if value.is_some() { 5 } else { 1 };
                if !self.chanends[dest.0].can_accept_tokens(total) {
                    warn!("memory access response dropped: no buffer space");
                } else {
                    if let Some(value) = value {
                        let latency: Ticks = self.chanend_route_latency(cid, dest, 4, false, time);
                        self.chanends[dest.0].reserved += 4;
                        self.schedule_delay(TokenDelay::data_tokens(dest, &value.to_be_bytes()), time + latency);
                    }
                    let latency: Ticks = self.chanend_route_latency(cid, dest, 1, value.is_some(), time);
                    self.chanends[dest.0].reserved += 1;
                    self.schedule_delay(TokenDelay::ctrl(dest, CT_END), time + latency);
                }
                self.chanends[cid.0].in_packet = false;
            },
        }
    }

    fn chanend_illegal_mem_access_packet(&mut self, cid: ChanendId) {
        warn!("Illegal memory access packet.");
        self.chanends[cid.0].mem_access = None;
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
