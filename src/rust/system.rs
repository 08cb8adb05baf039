// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    chanend::Chanend,
    config::{
        Config,
        NUM_CHANENDS,
        NUM_THREADS,
        NUM_TIMERS,
    },
    core::Core,
    delay::DelayPool,
    latency::LatencyModel,
    node::Node,
    program::{
        Program,
        StepResult,
    },
    resource::{
        EventableId,
        EventableState,
        ResOpResult,
        ResourceId,
        ResourceType,
    },
    runtime::{
        fail::Fail,
        queue::{
            ChanendId,
            Runnable,
            RunnableQueue,
            ThreadId,
            TimerId,
        },
        timebase::{
            Ticks,
            CYCLES_PER_SEC,
            INSTRUCTION_CYCLES,
        },
    },
    stats::Stats,
    thread::{
        ExceptionType,
        Register,
        StatusReg,
        ThreadState,
    },
    timer::Timer,
};
use ::std::collections::HashMap;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Builds a [SystemState] from a configuration and a node/tile layout.
/// The whole object graph is constructed here and never reshaped.
pub struct SystemBuilder {
    config: Config,
    nodes: Vec<usize>,
}

/// The top of the simulated machine: the nodes and their tiles, the
/// system-wide resource arenas, the runnable queue driving time forward,
/// and the interconnect latency model.
pub struct SystemState {
    pub(crate) config: Config,
    pub(crate) latency_model: LatencyModel,
    pub(crate) queue: RunnableQueue,
    pub(crate) delays: DelayPool,
    pub(crate) nodes: Vec<Node>,
    pub(crate) cores: Vec<Core>,
    pub(crate) threads: Vec<ThreadState>,
    pub(crate) chanends: Vec<Chanend>,
    pub(crate) timers: Vec<Timer>,
    /// Guest code driving each thread; the decoded-instruction seam.
    pub(crate) programs: Vec<Option<Box<dyn Program>>>,
    /// Architectural chanend id -> arena index, built once at startup so
    /// destination lookups never walk the node/core tree.
    pub(crate) chanend_dest_index: HashMap<u32, ChanendId>,
    pub(crate) stats: Stats,
    /// Runnable currently being dispatched.
    current: Option<Runnable>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl SystemBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            nodes: Vec::new(),
        }
    }

    /// Appends a node with `num_cores` tiles.
    pub fn add_node(mut self, num_cores: usize) -> Self {
        self.nodes.push(num_cores);
        self
    }

    pub fn build(self) -> Result<SystemState, Fail> {
        if self.nodes.is_empty() {
            return Err(Fail::new(libc::EINVAL, "system has no nodes"));
        }
        let total_cores: usize = self.nodes.iter().sum();
        if total_cores == 0 {
            return Err(Fail::new(libc::EINVAL, "system has no tiles"));
        }
        let latency_model: LatencyModel = LatencyModel::new(&self.config, total_cores)?;

        let mut nodes: Vec<Node> = Vec::with_capacity(self.nodes.len());
        let mut cores: Vec<Core> = Vec::with_capacity(total_cores);
        let mut threads: Vec<ThreadState> = Vec::with_capacity(total_cores * NUM_THREADS);
        let mut chanends: Vec<Chanend> = Vec::with_capacity(total_cores * NUM_CHANENDS);
        let mut timers: Vec<Timer> = Vec::with_capacity(total_cores * NUM_TIMERS);
        let mut chanend_dest_index: HashMap<u32, ChanendId> = HashMap::new();

        for (node_index, &num_cores) in self.nodes.iter().enumerate() {
            let mut node: Node = Node::new(node_index as u32, node_index);
            for core_number in 0..num_cores {
                let core_index: usize = cores.len();
                let core_id: u32 = core_index as u32;
                let thread_base: usize = threads.len();
                let chanend_base: usize = chanends.len();
                let timer_base: usize = timers.len();
                for num in 0..NUM_THREADS {
                    threads.push(ThreadState::new(ThreadId(thread_base + num), num, core_index));
                }
                for num in 0..NUM_CHANENDS {
                    let id: ChanendId = ChanendId(chanend_base + num);
                    let resource_id: ResourceId = ResourceId::chanend(core_id, num as u32);
                    chanend_dest_index.insert(resource_id.raw(), id);
                    chanends.push(Chanend::new(id, num, core_index, resource_id));
                }
                for num in 0..NUM_TIMERS {
                    let resource_id: ResourceId = ResourceId::new(core_id, ResourceType::Timer, num as u32);
                    timers.push(Timer::new(TimerId(timer_base + num), num, core_index, resource_id));
                }
                cores.push(Core::new(
                    node_index,
                    core_number,
                    core_id,
                    self.config.ram_size,
                    self.config.ram_base,
                    thread_base,
                    chanend_base,
                    timer_base,
                ));
                node.cores.push(core_index);
                // Thread 0 comes up allocated, ready for an image.
                threads[thread_base].alloc();
            }
            nodes.push(node);
        }

        let num_threads: usize = threads.len();
        let mut programs: Vec<Option<Box<dyn Program>>> = Vec::with_capacity(num_threads);
        programs.resize_with(num_threads, || None);

        Ok(SystemState {
            config: self.config,
            latency_model,
            queue: RunnableQueue::new(),
            delays: DelayPool::new(),
            nodes,
            cores,
            threads,
            chanends,
            timers,
            programs,
            chanend_dest_index,
            stats: Stats::new(total_cores),
            current: None,
        })
    }
}

impl SystemState {
    //==================================================================================================================
    // Scheduler loop
    //==================================================================================================================

    /// Runs the machine until the guest exits or no runnable remains.
    /// Returns the guest's exit status, or 1 when the queue drains.
    pub fn run(&mut self) -> i32 {
        while let Some((runnable, wake_up_time)) = self.queue.pop() {
            self.current = Some(runnable);
            match runnable {
                Runnable::Thread(tid) => {
                    if let Some(status) = self.run_thread(tid, wake_up_time) {
                        debug!("guest exit with status {}", status);
                        self.current = None;
                        return status;
                    }
                },
                Runnable::Delay(key) => self.run_delay(key, wake_up_time),
                Runnable::Timer(timer) => self.run_timer(timer, wake_up_time),
            }
            self.current = None;
        }
        info!("no runnable threads");
        1
    }

    /// Dispatches guest instructions for one thread until it parks, yields
    /// or exits. Each attempted instruction charges INSTRUCTION_CYCLES to
    /// the thread's local time.
    fn run_thread(&mut self, tid: ThreadId, wake_up_time: Ticks) -> Option<i32> {
        {
            let t: &mut ThreadState = &mut self.threads[tid.0];
            t.time = ::std::cmp::max(t.time, wake_up_time);
            t.sr.remove(StatusReg::WAITING);
        }
        let mut program: Box<dyn Program> = match self.programs[tid.0].take() {
            Some(program) => program,
            None => return None,
        };
        let mut exit_status: Option<i32> = None;
        let mut halted: bool = false;
        loop {
            {
                let t: &mut ThreadState = &mut self.threads[tid.0];
                t.time += INSTRUCTION_CYCLES;
                t.count += 1;
            }
            match program.step(self, tid) {
                StepResult::Continue => {
                    // Yield as soon as another runnable is due earlier
                    // than our local time; fair round-robin at equal
                    // ticks, exact delivery interleaving otherwise.
                    let time: Ticks = self.threads[tid.0].time;
                    if let Some(front) = self.queue.front_wake_up_time() {
                        if front < time {
                            self.schedule_thread(tid);
                            break;
                        }
                    }
                },
                StepResult::Deschedule => break,
                StepResult::Done => {
                    self.threads[tid.0].free();
                    halted = true;
                    break;
                },
                StepResult::Exit(status) => {
                    exit_status = Some(status);
                    break;
                },
            }
        }
        if !halted {
            self.programs[tid.0] = Some(program);
        }
        exit_status
    }

    //==================================================================================================================
    // Scheduling
    //==================================================================================================================

    /// Enqueues a thread at its own local time.
    pub fn schedule_thread(&mut self, tid: ThreadId) {
        let time: Ticks = self.threads[tid.0].time;
        self.threads[tid.0].sr.remove(StatusReg::WAITING);
        self.queue.push(Runnable::Thread(tid), time);
    }

    /// Unparks a thread at `time` (or its own later local time). A thread
    /// already queued (say, woken by an event on another resource) is
    /// left where it is.
    pub(crate) fn wake_thread(&mut self, tid: ThreadId, time: Ticks) {
        let wake_up_time: Ticks = {
            let t: &mut ThreadState = &mut self.threads[tid.0];
            t.time = ::std::cmp::max(t.time, time);
            t.sr.remove(StatusReg::WAITING);
            t.paused_on = None;
            t.time
        };
        if self.current != Some(Runnable::Thread(tid)) && !self.queue.contains(Runnable::Thread(tid)) {
            self.queue.push(Runnable::Thread(tid), wake_up_time);
        }
    }

    /// Marks a thread parked on a resource. The resource re-adds it on
    /// wake; the scheduler forgets it until then.
    pub(crate) fn park_thread(&mut self, tid: ThreadId, resource: ResourceId) {
        let t: &mut ThreadState = &mut self.threads[tid.0];
        t.sr.insert(StatusReg::WAITING);
        t.paused_on = Some(resource);
    }

    //==================================================================================================================
    // Events and interrupts
    //==================================================================================================================

    /// Transfers control of `owner` to the resource's event vector. An
    /// interrupt additionally saves SR/PC/ED into SSR/SPC/SED and enters
    /// kernel mode; a plain event only clears INENB.
    pub(crate) fn complete_event(&mut self, owner: ThreadId, resource: EventableId, interrupt: bool, time: Ticks) {
        let (vector, ev_data) = {
            let e: &EventableState = self.eventable_state(resource);
            (e.vector, e.ev_data)
        };
        trace!(
            "thread {:?}: {} on {:?}, vector {:#x}",
            owner,
            if interrupt { "interrupt" } else { "event" },
            resource,
            vector
        );
        {
            let t: &mut ThreadState = &mut self.threads[owner.0];
            if interrupt {
                t.set_reg(Register::Ssr, t.sr.bits());
                t.set_reg(Register::Spc, t.pc);
                let ed: u32 = t.reg(Register::Ed);
                t.set_reg(Register::Sed, ed);
                t.sr.remove(StatusReg::IEBLE);
                t.sr.insert(StatusReg::ININT | StatusReg::INK);
            } else {
                t.sr.remove(StatusReg::INENB);
            }
            t.sr.remove(StatusReg::EEBLE | StatusReg::WAITING);
            t.set_reg(Register::Ed, ev_data);
            t.pc = vector;
            t.took_event = true;
            t.paused_on = None;
            t.time = ::std::cmp::max(t.time, time);
        }
        // The owner may be the runnable being dispatched right now, or
        // already queued; in either case it will observe the redirect.
        if self.current != Some(Runnable::Thread(owner)) && !self.queue.contains(Runnable::Thread(owner)) {
            let wake_up_time: Ticks = self.threads[owner.0].time;
            self.queue.push(Runnable::Thread(owner), wake_up_time);
        }
    }

    /// A resource owned by this thread asks whether it would fire now that
    /// the owner re-enabled events.
    pub(crate) fn see_owner_event_enable(&mut self, resource: EventableId, time: Ticks) -> bool {
        let (in_use, enabled, interrupt, owner) = {
            let e: &EventableState = self.eventable_state(resource);
            (e.in_use, e.events_enabled, e.interrupt_mode, e.owner)
        };
        if !in_use || !enabled {
            return false;
        }
        let permitted: bool = {
            let t: &ThreadState = &self.threads[owner.0];
            if interrupt { t.ieble() } else { t.eeble() }
        };
        if !permitted {
            return false;
        }
        match resource {
            EventableId::Chanend(cid) => self.chanend_see_event_enable(cid, time),
            EventableId::Timer(timer) => self.timer_see_event_enable(timer, time),
        }
    }

    pub fn eventable_setv(&mut self, tid: ThreadId, resource: EventableId, vector: u32) {
        let e: &mut EventableState = self.eventable_state_mut(resource);
        e.owner = tid;
        e.vector = vector;
    }

    pub fn eventable_setev(&mut self, tid: ThreadId, resource: EventableId, data: u32) {
        let e: &mut EventableState = self.eventable_state_mut(resource);
        e.owner = tid;
        e.ev_data = data;
    }

    /// Arms or disarms events on a resource, keeping the owner's list of
    /// armed resources in step. Arming may fire immediately.
    pub fn eventable_set_event_enable(&mut self, tid: ThreadId, resource: EventableId, enabled: bool) {
        let time: Ticks = self.threads[tid.0].time;
        {
            let e: &mut EventableState = self.eventable_state_mut(resource);
            e.owner = tid;
            e.events_enabled = enabled;
        }
        let list: &mut Vec<EventableId> = &mut self.threads[tid.0].event_resources;
        if enabled {
            if !list.contains(&resource) {
                list.push(resource);
            }
            self.see_owner_event_enable(resource, time);
        } else {
            list.retain(|&r| r != resource);
        }
    }

    pub fn eventable_set_interrupt_mode(&mut self, tid: ThreadId, resource: EventableId, interrupt: bool) {
        let e: &mut EventableState = self.eventable_state_mut(resource);
        e.owner = tid;
        e.interrupt_mode = interrupt;
    }

    fn eventable_state(&self, resource: EventableId) -> &EventableState {
        match resource {
            EventableId::Chanend(cid) => &self.chanends[cid.0].eventable,
            EventableId::Timer(timer) => &self.timers[timer.0].eventable,
        }
    }

    fn eventable_state_mut(&mut self, resource: EventableId) -> &mut EventableState {
        match resource {
            EventableId::Chanend(cid) => &mut self.chanends[cid.0].eventable,
            EventableId::Timer(timer) => &mut self.timers[timer.0].eventable,
        }
    }

    //==================================================================================================================
    // Thread operations
    //==================================================================================================================

    /// Updates the status register. Enabling EEBLE/IEBLE re-checks armed
    /// resources; returns whether an event fired.
    pub fn thread_set_sr(&mut self, tid: ThreadId, bits: StatusReg) -> bool {
        let time: Ticks = self.threads[tid.0].time;
        let newly: StatusReg = {
            let t: &mut ThreadState = &mut self.threads[tid.0];
            let newly: StatusReg = bits.difference(t.sr);
            t.sr.insert(bits);
            newly
        };
        if newly.intersects(StatusReg::EEBLE | StatusReg::IEBLE) {
            let resources: Vec<EventableId> = self.threads[tid.0].event_resources.clone();
            for resource in resources {
                if self.see_owner_event_enable(resource, time) {
                    return true;
                }
            }
        }
        false
    }

    pub fn thread_clear_sr(&mut self, tid: ThreadId, bits: StatusReg) {
        self.threads[tid.0].sr.remove(bits);
    }

    /// Raises a guest exception on a thread.
    pub fn thread_exception(&mut self, tid: ThreadId, et: ExceptionType, ed: u32) {
        self.threads[tid.0].exception(et, ed);
    }

    /// Wait for an event: enables events, fires a pending one, or parks
    /// the thread until a resource completes an event on it.
    pub fn thread_waiteu(&mut self, tid: ThreadId) -> ResOpResult {
        if self.threads[tid.0].took_event {
            self.threads[tid.0].took_event = false;
            return ResOpResult::Continue(());
        }
        let time: Ticks = self.threads[tid.0].time;
        {
            let t: &mut ThreadState = &mut self.threads[tid.0];
            t.sr.insert(StatusReg::EEBLE | StatusReg::WAITING);
            t.paused_on = None;
        }
        let resources: Vec<EventableId> = self.threads[tid.0].event_resources.clone();
        for resource in resources {
            if self.see_owner_event_enable(resource, time) {
                break;
            }
        }
        ResOpResult::Deschedule
    }

    /// Allocates a resource of the given type on the invoking thread's
    /// tile. Ports are allocated with [Self::alloc_port].
    pub fn alloc_resource(&mut self, tid: ThreadId, resource_type: ResourceType) -> Option<ResourceId> {
        let core: usize = self.threads[tid.0].core;
        let core_id: u32 = self.cores[core].core_id;
        match resource_type {
            ResourceType::Chanend => {
                let base: usize = self.cores[core].chanend_base;
                for i in base..base + NUM_CHANENDS {
                    if !self.chanends[i].eventable.in_use {
                        self.chanends[i].alloc(tid);
                        return Some(self.chanends[i].resource_id);
                    }
                }
                None
            },
            ResourceType::Timer => {
                let base: usize = self.cores[core].timer_base;
                for i in base..base + NUM_TIMERS {
                    if !self.timers[i].eventable.in_use {
                        self.timers[i].alloc(tid);
                        return Some(self.timers[i].resource_id);
                    }
                }
                None
            },
            ResourceType::Thread => {
                let base: usize = self.cores[core].thread_base;
                for i in base..base + NUM_THREADS {
                    if !self.threads[i].in_use {
                        self.threads[i].alloc();
                        let num: usize = self.threads[i].num;
                        return Some(ResourceId::new(core_id, ResourceType::Thread, num as u32));
                    }
                }
                None
            },
            ResourceType::Sync => {
                let num: usize = self.cores[core].alloc_sync()?;
                self.cores[core].syncs[num].master = Some(tid);
                Some(ResourceId::new(core_id, ResourceType::Sync, num as u32))
            },
            ResourceType::Lock => {
                let num: usize = self.cores[core].alloc_lock()?;
                Some(ResourceId::new(core_id, ResourceType::Lock, num as u32))
            },
            ResourceType::ClkBlk => {
                let num: usize = self.cores[core].alloc_clock_block()?;
                Some(ResourceId::new(core_id, ResourceType::ClkBlk, num as u32))
            },
            ResourceType::Port | ResourceType::Config => None,
        }
    }

    pub fn alloc_port(&mut self, tid: ThreadId, width: usize) -> Option<ResourceId> {
        let core: usize = self.threads[tid.0].core;
        let core_id: u32 = self.cores[core].core_id;
        let num: usize = self.cores[core].alloc_port(width)?;
        Some(ResourceId::new(core_id, ResourceType::Port, num as u32))
    }

    /// Forks a slave thread bound to a synchroniser on the same tile.
    pub fn thread_getst(&mut self, tid: ThreadId, sync_id: ResourceId) -> Option<ThreadId> {
        let core: usize = self.threads[tid.0].core;
        let num: usize = sync_id.num() as usize;
        if sync_id.resource_type() != Some(ResourceType::Sync) || !self.cores[core].syncs[num].in_use {
            return None;
        }
        let base: usize = self.cores[core].thread_base;
        for i in base..base + NUM_THREADS {
            if !self.threads[i].in_use {
                self.threads[i].alloc();
                self.threads[i].sync = Some((core, num));
                let slave: ThreadId = ThreadId(i);
                self.cores[core].syncs[num].slaves.push(slave);
                return Some(slave);
            }
        }
        None
    }

    //==================================================================================================================
    // Lookups and accessors
    //==================================================================================================================

    /// Resolves an architectural chanend identifier to its endpoint.
    pub fn get_chanend_dest(&self, id: ResourceId) -> Option<ChanendId> {
        self.chanend_dest_index.get(&id.raw()).copied()
    }

    pub fn install_program(&mut self, tid: ThreadId, program: Box<dyn Program>) {
        self.threads[tid.0].in_use = true;
        self.programs[tid.0] = Some(program);
    }

    pub fn record_instruction(&mut self, tid: ThreadId, name: &str) {
        if self.stats.enabled() {
            let core: usize = self.threads[tid.0].core;
            self.stats.update(core, name);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    pub fn thread(&self, tid: ThreadId) -> &ThreadState {
        &self.threads[tid.0]
    }

    /// Mutable thread access for the instruction-dispatch layer, which
    /// owns the register file semantics.
    pub fn thread_mut(&mut self, tid: ThreadId) -> &mut ThreadState {
        &mut self.threads[tid.0]
    }

    pub fn thread_on_core(&self, core: usize, num: usize) -> ThreadId {
        ThreadId(self.cores[core].thread_base + num)
    }

    pub fn chanend(&self, cid: ChanendId) -> &Chanend {
        &self.chanends[cid.0]
    }

    pub fn core(&self, index: usize) -> &Core {
        &self.cores[index]
    }

    pub fn core_mut(&mut self, index: usize) -> &mut Core {
        &mut self.cores[index]
    }

    pub fn timer(&self, timer: TimerId) -> &Timer {
        &self.timers[timer.0]
    }

    pub fn runnable_queue_len(&self) -> usize {
        self.queue.len()
    }

    //==================================================================================================================
    // Reports
    //==================================================================================================================

    /// Per-thread time and instruction counts, one block per tile.
    pub fn thread_stats(&self) {
        for node in self.nodes.iter() {
            println!("Node {} =========================================", node.node_id);
            for &core_index in node.cores.iter() {
                let core: &Core = &self.cores[core_index];
                println!("Core {} -----------------------------------------", core.core_number);
                println!("{:>8} {:>12} {:>12} {:>12}", "Thread", "Time", "Insts", "Insts/cycle");
                for num in 0..NUM_THREADS {
                    let t: &ThreadState = &self.threads[core.thread_base + num];
                    let ratio: f64 = if t.time > 0 { t.count as f64 / t.time as f64 } else { 0.0 };
                    println!("{:>8} {:>12} {:>12} {:>12.2}", num, t.time, t.count, ratio);
                }
            }
        }
    }

    /// Simulated-performance summary.
    pub fn system_stats(&self) {
        let mut total_count: u64 = 0;
        let mut max_time: Ticks = 0;
        let mut max_core0_time: Ticks = 0;
        for core in self.cores.iter() {
            for num in 0..NUM_THREADS {
                let t: &ThreadState = &self.threads[core.thread_base + num];
                total_count += t.count;
                max_time = ::std::cmp::max(max_time, t.time);
                if core.core_id == 0 {
                    max_core0_time = ::std::cmp::max(max_core0_time, t.time);
                }
            }
        }
        let num_cores: usize = self.cores.len();
        let seconds: f64 = max_time as f64 / CYCLES_PER_SEC as f64;
        let ops_per_sec: f64 = if seconds > 0.0 { total_count as f64 / seconds } else { 0.0 };
        let gops_per_sec: f64 = ops_per_sec / 1e9;
        let percent_peak: f64 = (100.0 / CYCLES_PER_SEC as f64) * ops_per_sec;
        let ram_size_kb: f64 = self.config.ram_size as f64 / 1000.0;
        let aggregate_ram_mb: f64 = (num_cores as f64 * ram_size_kb) / 1000.0;
        println!("Simulated performance ==========================");
        println!("Num cores:                    {}", num_cores);
        println!("Aggregate memory:             {:.4}MB", aggregate_ram_mb);
        println!("Total instructions executed:  {}", total_count);
        println!("Max thread cycles:            {}", max_time);
        println!("Max core 0 thread cycles:     {}", max_core0_time);
        println!("Elapsed time:                 {:.3}s", seconds);
        println!("Instructions per second:      {:.3e} ({:.2} GIPS)", ops_per_sec, gops_per_sec);
        println!("Of peak:                      {:.2}%", percent_peak);
    }
}
