//! Register-level fakes for host-side tests.
//!
//! Every fake is a cheap handle to shared state, so a test can hand one clone to the driver and
//! keep another one to inspect and manipulate the "hardware".

use {
    crate::{
        config::Config,
        hal::{InterruptMask, LedState, Peripherals, PowerMode, PowerRegs, RadioClock, WakeSources},
        osal::{EventMask, Osal, TaskId},
        phy::{fifo, Command, EndCause, Fifo, FifoOp, PhyReg, PhyRegs, TaskStatus},
        sleep_timer::{LoadStatus, SleepTimerReg, SleepTimerRegs, SLEEP_TIMER_MASK},
        time::{SysTime, TIMER_MASK},
        timer2::{EventChannel, Timer2Irq, Timer2Reg, Timer2Regs},
    },
    rand_core::{impls, RngCore},
    std::{
        cell::RefCell,
        collections::{HashMap, VecDeque},
        rc::Rc,
    },
};

fn set_byte(word: &mut u32, i: u8, value: u8) {
    let shift = u32::from(i) * 8;
    *word = (*word & !(0xFF << shift)) | (u32::from(value) << shift);
}

fn get_byte(word: u32, i: u8) -> u8 {
    (word >> (u32::from(i) * 8)) as u8
}

fn channel_index(ch: EventChannel) -> usize {
    match ch {
        EventChannel::One => 0,
        EventChannel::Two => 1,
    }
}

#[derive(Default)]
struct Timer2State {
    ctrl: u8,
    fine: u32,
    coarse: u32,
    capture_fine: u32,
    capture_coarse: u32,
    count_latch: Option<(u32, u32)>,
    capture_latch: Option<(u32, u32)>,
    compare_fine: [Option<u32>; 2],
    compare_coarse: [u32; 2],
    mask: u8,
    flags: u8,
    reads: Vec<Timer2Reg>,
    writes: Vec<(Timer2Reg, u8)>,
}

/// Timer2 with latching counter reads. The counter only moves when a test sets it.
#[derive(Clone, Default)]
pub struct FakeTimer2(Rc<RefCell<Timer2State>>);

impl FakeTimer2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&self, t: SysTime) {
        let mut s = self.0.borrow_mut();
        s.fine = u32::from(t.fine());
        s.coarse = t.coarse();
    }

    /// Current counter value, read without going through the latch.
    pub fn now(&self) -> SysTime {
        let s = self.0.borrow();
        SysTime::new(s.coarse, s.fine as u16)
    }

    pub fn set_capture(&self, t: SysTime) {
        let mut s = self.0.borrow_mut();
        s.capture_fine = u32::from(t.fine());
        s.capture_coarse = t.coarse();
    }

    /// Sets the compare flag of `ch`, as if the timer had reached the compare value.
    pub fn fire(&self, ch: EventChannel) {
        let irq = match ch {
            EventChannel::One => Timer2Irq::EVENT1,
            EventChannel::Two => Timer2Irq::EVENT2,
        };
        self.0.borrow_mut().flags |= irq.bits();
    }

    /// Full-resolution compare value of `ch`, if one was ever written.
    pub fn compare(&self, ch: EventChannel) -> Option<SysTime> {
        let s = self.0.borrow();
        let i = channel_index(ch);
        s.compare_fine[i].map(|fine| SysTime::new(s.compare_coarse[i], fine as u16))
    }

    pub fn overflow_compare(&self, ch: EventChannel) -> u32 {
        self.0.borrow().compare_coarse[channel_index(ch)]
    }

    pub fn mask(&self) -> Timer2Irq {
        Timer2Irq::from_bits_truncate(self.0.borrow().mask)
    }

    pub fn reads(&self) -> Vec<Timer2Reg> {
        self.0.borrow().reads.clone()
    }

    pub fn writes(&self) -> Vec<(Timer2Reg, u8)> {
        self.0.borrow().writes.clone()
    }

    /// Number of register writes so far.
    pub fn write_count(&self) -> usize {
        self.0.borrow().writes.len()
    }

    pub fn last_write(&self, reg: Timer2Reg) -> Option<u8> {
        self.0
            .borrow()
            .writes
            .iter()
            .rev()
            .find(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
    }
}

impl Timer2Regs for FakeTimer2 {
    fn read(&mut self, reg: Timer2Reg) -> u8 {
        let mut s = self.0.borrow_mut();
        s.reads.push(reg);
        match reg {
            Timer2Reg::Ctrl => s.ctrl,
            Timer2Reg::Count(0) => {
                s.count_latch = Some((s.fine, s.coarse));
                get_byte(s.fine, 0)
            }
            Timer2Reg::Count(i) => {
                let (fine, _) = s.count_latch.expect("fine counter read before latching");
                get_byte(fine, i)
            }
            Timer2Reg::Overflow(i) => {
                let (_, coarse) = s.count_latch.expect("overflow counter read before latching");
                if i == 2 {
                    s.count_latch = None;
                }
                get_byte(coarse, i)
            }
            Timer2Reg::Capture(0) => {
                s.capture_latch = Some((s.capture_fine, s.capture_coarse));
                get_byte(s.capture_fine, 0)
            }
            Timer2Reg::Capture(i) => {
                let (fine, _) = s.capture_latch.expect("capture read before latching");
                get_byte(fine, i)
            }
            Timer2Reg::CaptureOverflow(i) => {
                let (_, coarse) = s.capture_latch.expect("capture read before latching");
                if i == 2 {
                    s.capture_latch = None;
                }
                get_byte(coarse, i)
            }
            Timer2Reg::Compare(ch, i) => {
                get_byte(s.compare_fine[channel_index(ch)].unwrap_or(0), i)
            }
            Timer2Reg::OverflowCompare(ch, i) => get_byte(s.compare_coarse[channel_index(ch)], i),
            Timer2Reg::IrqMask => s.mask,
            Timer2Reg::IrqFlags => s.flags,
        }
    }

    fn write(&mut self, reg: Timer2Reg, value: u8) {
        let mut s = self.0.borrow_mut();
        s.writes.push((reg, value));
        match reg {
            Timer2Reg::Ctrl => s.ctrl = value,
            Timer2Reg::Count(i) => set_byte(&mut s.fine, i, value),
            Timer2Reg::Overflow(i) => set_byte(&mut s.coarse, i, value),
            Timer2Reg::Capture(_) | Timer2Reg::CaptureOverflow(_) => {
                panic!("capture registers are read-only")
            }
            Timer2Reg::Compare(ch, i) => {
                let idx = channel_index(ch);
                let mut fine = s.compare_fine[idx].unwrap_or(0);
                set_byte(&mut fine, i, value);
                s.compare_fine[idx] = Some(fine);
            }
            Timer2Reg::OverflowCompare(ch, i) => {
                let idx = channel_index(ch);
                set_byte(&mut s.compare_coarse[idx], i, value);
                s.compare_coarse[idx] &= TIMER_MASK;
            }
            Timer2Reg::IrqMask => s.mask = value,
            Timer2Reg::IrqFlags => s.flags &= value,
        }
    }
}

#[derive(Default)]
struct SleepTimerState {
    count: u32,
    latch: Option<u32>,
    staged: [Option<u8>; 2],
    compare: Option<u32>,
    load_busy: u32,
    load_polls: u32,
    irq_enable: u8,
    irq_flag: u8,
    reads: Vec<SleepTimerReg>,
    writes: Vec<(SleepTimerReg, u8)>,
}

/// Sleep timer with latching reads and staged compare writes.
#[derive(Clone, Default)]
pub struct FakeSleepTimer(Rc<RefCell<SleepTimerState>>);

impl FakeSleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self, count: u32) {
        self.0.borrow_mut().count = count & SLEEP_TIMER_MASK;
    }

    /// Lets `ticks` sleep timer ticks pass.
    pub fn advance(&self, ticks: u32) {
        let mut s = self.0.borrow_mut();
        s.count = s.count.wrapping_add(ticks) & SLEEP_TIMER_MASK;
    }

    /// The last committed compare value.
    pub fn compare(&self) -> Option<u32> {
        self.0.borrow().compare
    }

    pub fn irq_enabled(&self) -> bool {
        self.0.borrow().irq_enable & 1 != 0
    }

    /// Makes the next `polls` reads of the load status report "not ready".
    pub fn set_load_busy_polls(&self, polls: u32) {
        self.0.borrow_mut().load_busy = polls;
    }

    pub fn load_polls(&self) -> u32 {
        self.0.borrow().load_polls
    }

    pub fn reads(&self) -> Vec<SleepTimerReg> {
        self.0.borrow().reads.clone()
    }

    pub fn writes(&self) -> Vec<(SleepTimerReg, u8)> {
        self.0.borrow().writes.clone()
    }
}

impl SleepTimerRegs for FakeSleepTimer {
    fn read(&mut self, reg: SleepTimerReg) -> u8 {
        let mut s = self.0.borrow_mut();
        s.reads.push(reg);
        match reg {
            SleepTimerReg::Count(0) => {
                s.latch = Some(s.count);
                get_byte(s.count, 0)
            }
            SleepTimerReg::Count(i) => {
                let count = s.latch.expect("sleep timer read before latching");
                if i == 2 {
                    s.latch = None;
                }
                get_byte(count, i)
            }
            SleepTimerReg::LoadStatus => {
                s.load_polls += 1;
                if s.load_busy > 0 {
                    s.load_busy -= 1;
                    0
                } else {
                    LoadStatus::LDRDY.bits()
                }
            }
            SleepTimerReg::IrqEnable => s.irq_enable,
            SleepTimerReg::IrqFlag => s.irq_flag,
        }
    }

    fn write(&mut self, reg: SleepTimerReg, value: u8) {
        let mut s = self.0.borrow_mut();
        s.writes.push((reg, value));
        match reg {
            SleepTimerReg::Count(0) => {
                assert_eq!(s.load_busy, 0, "compare written before load-ready");
                let (b1, b2) = match s.staged {
                    [Some(b1), Some(b2)] => (b1, b2),
                    _ => panic!("compare committed without staging the high bytes"),
                };
                s.compare = Some(u32::from_le_bytes([value, b1, b2, 0]));
                s.staged = [None, None];
            }
            SleepTimerReg::Count(i) => s.staged[usize::from(i) - 1] = Some(value),
            SleepTimerReg::LoadStatus => panic!("load status is read-only"),
            SleepTimerReg::IrqEnable => s.irq_enable = value,
            SleepTimerReg::IrqFlag => s.irq_flag &= value,
        }
    }
}

#[derive(Default)]
struct PhyState {
    regs: HashMap<PhyReg, u8>,
    latency: u32,
    pending: u32,
    last_command: u8,
    locked: bool,
    busy_polls: u32,
    running: bool,
    commands: Vec<u8>,
    fifo_ops: Vec<(Fifo, FifoOp)>,
    tx: Vec<u8>,
    tx_committed: usize,
    rx: VecDeque<u8>,
}

/// Behavioural model of the radio coprocessor's register interface.
///
/// Commands are accepted after a configurable number of polls. Tasks run until a test ends them
/// with `end_task` or they are shut down.
#[derive(Clone, Default)]
pub struct SimPhy(Rc<RefCell<PhyState>>);

impl SimPhy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every command read back as busy for `polls` reads.
    pub fn set_latency(&self, polls: u32) {
        self.0.borrow_mut().latency = polls;
    }

    /// Stops accepting commands for good.
    pub fn lock_up(&self) {
        self.0.borrow_mut().locked = true;
    }

    /// Ends the running task with `cause`.
    pub fn end_task(&self, cause: EndCause) {
        let mut s = self.0.borrow_mut();
        s.running = false;
        s.regs.insert(PhyReg::EndCause, cause.raw());
        s.regs.insert(PhyReg::Status, TaskStatus::DONE.bits());
    }

    /// Puts `data` into the RX FIFO.
    pub fn receive(&self, data: &[u8]) {
        self.0.borrow_mut().rx.extend(data.iter().copied());
    }

    pub fn reg(&self, reg: PhyReg) -> u8 {
        self.0.borrow().regs.get(&reg).copied().unwrap_or(0)
    }

    pub fn set_reg(&self, reg: PhyReg, value: u8) {
        self.0.borrow_mut().regs.insert(reg, value);
    }

    /// Command bytes written, excluding FIFO operations.
    pub fn commands(&self) -> Vec<u8> {
        self.0.borrow().commands.clone()
    }

    pub fn fifo_ops(&self) -> Vec<(Fifo, FifoOp)> {
        self.0.borrow().fifo_ops.clone()
    }

    /// Number of command register reads that returned "busy".
    pub fn busy_polls(&self) -> u32 {
        self.0.borrow().busy_polls
    }

    /// Everything in the TX FIFO, committed or not.
    pub fn tx_fifo(&self) -> Vec<u8> {
        self.0.borrow().tx.clone()
    }

    pub fn tx_committed(&self) -> Vec<u8> {
        let s = self.0.borrow();
        s.tx[..s.tx_committed].to_vec()
    }
}

impl PhyState {
    fn fifo_op(&mut self, target: Fifo, op: FifoOp) {
        self.fifo_ops.push((target, op));
        if target != Fifo::Rx {
            match op {
                FifoOp::Reset => {
                    self.tx.clear();
                    self.tx_committed = 0;
                }
                FifoOp::Deallocate => {
                    self.tx.drain(..self.tx_committed);
                    self.tx_committed = 0;
                }
                FifoOp::Retry => {}
                FifoOp::Discard => self.tx.truncate(self.tx_committed),
                FifoOp::Commit => self.tx_committed = self.tx.len(),
            }
        }
        if target != Fifo::Tx && op == FifoOp::Reset {
            self.rx.clear();
        }
    }

    fn command(&mut self, raw: u8) {
        self.commands.push(raw);
        let cmd = Command::from(raw);
        if cmd.starts_task() {
            assert!(!self.running, "{:?} while a task is running", cmd);
            self.running = true;
            self.regs.insert(PhyReg::Status, 0);
        } else if (cmd == Command::Shutdown || cmd == Command::Abort) && self.running {
            self.running = false;
            self.regs.insert(PhyReg::EndCause, EndCause::Abort.raw());
            self.regs.insert(PhyReg::Status, TaskStatus::DONE.bits());
        }
    }
}

impl PhyRegs for SimPhy {
    fn read(&mut self, reg: PhyReg) -> u8 {
        let mut s = self.0.borrow_mut();
        match reg {
            PhyReg::Command => {
                if s.locked {
                    s.busy_polls += 1;
                    0xFF
                } else if s.pending > 0 {
                    s.pending -= 1;
                    s.busy_polls += 1;
                    s.last_command
                } else {
                    0
                }
            }
            PhyReg::TxFifoCount => s.tx.len() as u8,
            PhyReg::RxFifoCount => s.rx.len() as u8,
            PhyReg::RxFifoData => s.rx.pop_front().expect("RX FIFO read while empty"),
            reg => s.regs.get(&reg).copied().unwrap_or(0),
        }
    }

    fn write(&mut self, reg: PhyReg, value: u8) {
        let mut s = self.0.borrow_mut();
        match reg {
            PhyReg::Command => {
                assert!(
                    !s.locked && s.pending == 0,
                    "command {:#04x} written before the previous one was accepted",
                    value
                );
                s.last_command = value;
                s.pending = s.latency;
                match fifo::decode(value) {
                    Some((target, op)) => s.fifo_op(target, op),
                    None => s.command(value),
                }
            }
            PhyReg::Counter(_) => {
                s.regs.insert(reg, 0);
            }
            PhyReg::TxFifoData => {
                assert!(s.tx.len() < crate::phy::FIFO_SIZE, "TX FIFO overflow");
                s.tx.push(value);
            }
            PhyReg::EndCause
            | PhyReg::TxFifoCount
            | PhyReg::RxFifoCount
            | PhyReg::RxFifoData => panic!("{:?} is read-only", reg),
            reg => {
                s.regs.insert(reg, value);
            }
        }
    }
}

#[derive(Default)]
struct ClockState {
    running: bool,
    settling: u32,
    polls: u32,
    stops: u32,
}

/// 32 MHz oscillator that takes 3 polls to stabilize after being started.
#[derive(Clone)]
pub struct FakeClock(Rc<RefCell<ClockState>>);

impl FakeClock {
    const SETTLE_POLLS: u32 = 3;

    /// Creates a running, stable oscillator.
    pub fn new() -> Self {
        FakeClock(Rc::new(RefCell::new(ClockState {
            running: true,
            ..ClockState::default()
        })))
    }

    pub fn is_running(&self) -> bool {
        self.0.borrow().running
    }

    /// Total number of stability polls.
    pub fn stable_polls(&self) -> u32 {
        self.0.borrow().polls
    }

    pub fn stop_count(&self) -> u32 {
        self.0.borrow().stops
    }
}

impl RadioClock for FakeClock {
    fn start_xosc(&mut self) {
        let mut s = self.0.borrow_mut();
        if !s.running {
            s.running = true;
            s.settling = Self::SETTLE_POLLS;
        }
    }

    fn is_xosc_stable(&mut self) -> bool {
        let mut s = self.0.borrow_mut();
        s.polls += 1;
        if s.settling > 0 {
            s.settling -= 1;
            false
        } else {
            s.running
        }
    }

    fn stop_xosc(&mut self) {
        let mut s = self.0.borrow_mut();
        s.running = false;
        s.stops += 1;
    }
}

/// A call made through `PowerRegs`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerCall {
    Mask(WakeSources),
    Restore(InterruptMask),
    Mode(PowerMode),
    Sleep,
}

type Hook = Box<dyn FnMut()>;

#[derive(Default)]
struct PowerState {
    calls: Vec<PowerCall>,
    on_mask: Option<Hook>,
    on_sleep: Option<Hook>,
}

/// Records power register accesses. Hooks stand in for interrupts arriving at a given step.
#[derive(Clone, Default)]
pub struct FakePower(Rc<RefCell<PowerState>>);

impl FakePower {
    /// Interrupt enable state returned by `mask_interrupts`.
    pub const ALL_ENABLED: u32 = 0xFFFF_FFFF;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PowerCall> {
        self.0.borrow().calls.clone()
    }

    /// Runs `hook` right after interrupts are masked for sleep.
    pub fn on_mask(&self, hook: impl FnMut() + 'static) {
        self.0.borrow_mut().on_mask = Some(Box::new(hook));
    }

    /// Runs `hook` while "asleep", before `enter_sleep` returns.
    pub fn on_sleep(&self, hook: impl FnMut() + 'static) {
        self.0.borrow_mut().on_sleep = Some(Box::new(hook));
    }

    fn run(&self, select: fn(&mut PowerState) -> &mut Option<Hook>) {
        // the hook may touch other fakes, so it runs without the borrow held
        let hook = select(&mut self.0.borrow_mut()).take();
        if let Some(mut hook) = hook {
            hook();
            *select(&mut self.0.borrow_mut()) = Some(hook);
        }
    }
}

impl PowerRegs for FakePower {
    fn mask_interrupts(&mut self, keep: WakeSources) -> InterruptMask {
        self.0.borrow_mut().calls.push(PowerCall::Mask(keep));
        self.run(|s| &mut s.on_mask);
        InterruptMask(Self::ALL_ENABLED)
    }

    fn restore_interrupts(&mut self, saved: InterruptMask) {
        self.0.borrow_mut().calls.push(PowerCall::Restore(saved));
    }

    fn set_power_mode(&mut self, mode: PowerMode) {
        self.0.borrow_mut().calls.push(PowerCall::Mode(mode));
    }

    fn enter_sleep(&mut self) {
        self.0.borrow_mut().calls.push(PowerCall::Sleep);
        self.run(|s| &mut s.on_sleep);
    }
}

/// Records peripheral hook calls by name.
#[derive(Clone, Default)]
pub struct FakePeripherals(Rc<RefCell<Vec<&'static str>>>);

impl FakePeripherals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.borrow().clone()
    }
}

impl Peripherals for FakePeripherals {
    fn suspend(&mut self) {
        self.0.borrow_mut().push("suspend");
    }

    fn resume(&mut self) {
        self.0.borrow_mut().push("resume");
    }

    fn leds_off(&mut self) -> LedState {
        self.0.borrow_mut().push("leds_off");
        LedState(0b101)
    }

    fn leds_restore(&mut self, state: LedState) {
        assert_eq!(state, LedState(0b101));
        self.0.borrow_mut().push("leds_restore");
    }
}

/// Scheduler that only records what it is asked to do.
#[derive(Default)]
pub struct FakeOsal {
    pub timers: Vec<(TaskId, EventMask, u32)>,
    pub posted: Vec<(TaskId, EventMask)>,
    /// Returned by `next_timer_deadline`.
    pub deadline: Option<u32>,
}

impl Osal for FakeOsal {
    fn schedule_timer(&mut self, task: TaskId, events: EventMask, timeout_ms: u32) {
        self.timers.push((task, events, timeout_ms));
    }

    fn next_timer_deadline(&self) -> Option<u32> {
        self.deadline
    }

    fn post_event(&mut self, task: TaskId, events: EventMask) {
        self.posted.push((task, events));
    }
}

/// Deterministic xorshift generator.
pub struct TestRng(u32);

impl TestRng {
    pub fn new(seed: u32) -> Self {
        TestRng(if seed == 0 { 0x9E37_79B9 } else { seed })
    }
}

impl RngCore for TestRng {
    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Stack configuration wiring all fakes together, with the default timing constants.
pub enum TestConfig {}

impl Config for TestConfig {
    type Timer2 = FakeTimer2;
    type SleepTimer = FakeSleepTimer;
    type Phy = SimPhy;
    type Clock = FakeClock;
    type Power = FakePower;
    type Peripherals = FakePeripherals;
    type Osal = FakeOsal;
    type Rng = TestRng;
}
