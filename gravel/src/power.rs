//! Sleep/wake sequencing.
//!
//! The [`PowerSequencer`] runs once per idle pass of the task scheduler, when no task has pending
//! work. It works out how long the device may sleep, asks the Link-Layer for permission, and then
//! walks through this state machine:
//!
//! ```notrust
//! Awake -> PreparingSleep -> Asleep -> Waking -> Awake
//!               |
//!               +-> Denied -> Awake
//! ```
//!
//! Sleep ends on any enabled wake source (sleep timer compare, GPIO edge). Interrupt handlers of
//! wake sources call [`wake_from_isr`], which clears the [`SleepIntent`] *first*. The sequencer
//! only executes the sleep instruction if the intent is still set, with interrupts disabled, so a
//! wake-up racing with sleep entry can never be lost.
//!
//! [`PowerSequencer`]: struct.PowerSequencer.html
//! [`wake_from_isr`]: fn.wake_from_isr.html
//! [`SleepIntent`]: struct.SleepIntent.html

use {
    crate::{
        config::Config,
        hal::{Peripherals, PowerMode, PowerRegs, WakeSources},
        osal::Osal,
        sleep_timer::{ms_to_ticks, SleepPlan, SleepTimer, SleepTimerRegs},
        Fatal,
    },
    core::sync::atomic::{AtomicBool, Ordering},
    heapless::spsc::{Consumer, Producer, Queue},
};

/// Capacity of the wake source queue, plus one.
pub const WAKE_QUEUE_LEN: usize = 8;

/// Queue carrying wake sources from interrupt handlers to the sequencer.
pub type WakeQueue = Queue<WakeSource, WAKE_QUEUE_LEN>;

/// Answer of the Link-Layer to a power-off request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerOffResult {
    Allowed,
    /// A radio task is running or imminent. This is a normal outcome, not an error.
    Denied,
}

/// Power sequencer states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerState {
    Awake,
    PreparingSleep,
    Asleep,
    Waking,
    Denied,
}

/// Something that ended a sleep period.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WakeSource {
    SleepTimer,
    Gpio,
    Radio,
}

impl WakeSource {
    fn bit(&self) -> WakeSources {
        match self {
            WakeSource::SleepTimer => WakeSources::SLEEP_TIMER,
            WakeSource::Gpio => WakeSources::GPIO,
            WakeSource::Radio => WakeSources::RADIO,
        }
    }
}

/// Result of one idle pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The Link-Layer denied sleep. No hardware was touched.
    Denied,

    /// The deadline was too close for a timed sleep; the CPU was idled with clocks running.
    Idle,

    /// The device slept and woke up again.
    Slept {
        mode: PowerMode,
        /// Programmed sleep duration in sleep timer ticks, 0 if no wake-up timer was armed.
        timeout: u32,
        /// Whether the wake-up was for a radio event rather than a scheduler timer.
        wake_for_rf: bool,
        /// Wake sources reported by interrupt handlers.
        sources: WakeSources,
    },
}

/// The power management side of the Link-Layer.
pub trait RadioPower<S: SleepTimerRegs> {
    /// Asks whether the device may enter `mode`.
    ///
    /// When allowing a mode other than `PowerMode::Idle`, the implementation stops the radio
    /// timer and the 32 MHz clock.
    fn power_off_request(&mut self, mode: PowerMode, sleep_timer: &mut SleepTimer<S>)
        -> PowerOffResult;

    /// Restarts the radio after an allowed power-off.
    ///
    /// Blocks until the 32 MHz clock is stable.
    fn power_on_request(
        &mut self,
        was_deep_sleep: bool,
        expect_radio_event: bool,
        sleep_timer: &mut SleepTimer<S>,
    ) -> Result<(), Fatal>;

    /// Returns a sleep timer snapshot and the number of sleep timer ticks after it at which the
    /// device has to be awake for the next radio event, or 0 if none is scheduled.
    fn time_to_next_radio_event(&mut self, sleep_timer: &mut SleepTimer<S>) -> (u32, u32);
}

/// Shared "about to sleep" flag.
///
/// Set by the sequencer before it prepares for sleep, cleared by every interrupt handler that
/// can end a sleep period.
pub struct SleepIntent(AtomicBool);

impl SleepIntent {
    pub const fn new() -> Self {
        SleepIntent(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reports a wake-up. Call this at the start of every interrupt handler that can end a sleep
/// period.
pub fn wake_from_isr(
    intent: &SleepIntent,
    queue: &mut Producer<'_, WakeSource, WAKE_QUEUE_LEN>,
    source: WakeSource,
) {
    intent.clear();
    if queue.enqueue(source).is_err() {
        // The sources are informational; the wake-up itself already happened.
        trace!("wake queue full, dropping {:?}", source);
    }
}

/// Puts the device to sleep between tasks.
pub struct PowerSequencer<'a, C: Config> {
    sleep_timer: SleepTimer<C::SleepTimer>,
    power: C::Power,
    peripherals: C::Peripherals,
    intent: &'a SleepIntent,
    wake_queue: Consumer<'a, WakeSource, WAKE_QUEUE_LEN>,
    state: PowerState,
}

impl<'a, C: Config> PowerSequencer<'a, C> {
    pub fn new(
        sleep_timer: C::SleepTimer,
        power: C::Power,
        peripherals: C::Peripherals,
        intent: &'a SleepIntent,
        wake_queue: Consumer<'a, WakeSource, WAKE_QUEUE_LEN>,
    ) -> Self {
        Self {
            sleep_timer: SleepTimer::new(sleep_timer, C::SLEEP_ADJ_TICKS),
            power,
            peripherals,
            intent,
            wake_queue,
            state: PowerState::Awake,
        }
    }

    /// Returns the sleep timer, which this sequencer owns.
    pub fn sleep_timer(&mut self) -> &mut SleepTimer<C::SleepTimer> {
        &mut self.sleep_timer
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Runs one idle pass: sleeps until the next scheduler timer or radio event if possible.
    ///
    /// Returns once the device is awake again. A denial returns immediately without touching any
    /// hardware, so this can be called on every pass of the scheduler loop.
    pub fn idle_pass<L>(&mut self, ll: &mut L, osal: &C::Osal) -> Result<SleepOutcome, Fatal>
    where
        L: RadioPower<C::SleepTimer>,
    {
        debug_assert_eq!(self.state, PowerState::Awake);

        let (snapshot, radio_ticks) = ll.time_to_next_radio_event(&mut self.sleep_timer);
        // An expired scheduler timer still counts as a deadline, the closest possible one.
        let osal_ticks = osal
            .next_timer_deadline()
            .map(|ms| ms_to_ticks(ms).max(1))
            .unwrap_or(0);
        let (timeout, wake_for_rf) = select_timeout(osal_ticks, radio_ticks);

        // Anything the latency adjustment would swallow is too short to sleep, whatever the
        // configured minimum.
        let min_ticks = C::MIN_SLEEP_TICKS.max(self.sleep_timer.min_timeout());
        let mode = match SleepPlan::for_timeout(timeout, min_ticks) {
            SleepPlan::Idle => {
                self.idle();
                return Ok(SleepOutcome::Idle);
            }
            SleepPlan::Deep => PowerMode::Deep,
            SleepPlan::Timed(_) => PowerMode::Timer,
        };

        self.state = PowerState::PreparingSleep;
        if ll.power_off_request(mode, &mut self.sleep_timer) == PowerOffResult::Denied {
            self.state = PowerState::Denied;
            trace!("power: {:?} in {:?}", self.state, mode);
            self.state = PowerState::Awake;
            return Ok(SleepOutcome::Denied);
        }

        self.intent.set();
        self.peripherals.suspend();
        let leds = self.peripherals.leds_off();
        if timeout != 0 {
            self.sleep_timer.arm_wake(snapshot, timeout);
        }
        let saved = self
            .power
            .mask_interrupts(WakeSources::SLEEP_TIMER | WakeSources::GPIO);
        self.power.set_power_mode(mode);

        self.state = PowerState::Asleep;
        debug!(
            "power: sleeping in {:?}, timeout={} wake_for_rf={}",
            mode, timeout, wake_for_rf
        );
        let power = &mut self.power;
        let intent = self.intent;
        critical_section::with(|_| {
            // A wake interrupt may have fired since the intent was set.
            if intent.is_set() {
                power.enter_sleep();
            }
        });

        self.state = PowerState::Waking;
        self.intent.clear();
        self.power.restore_interrupts(saved);
        self.sleep_timer.disarm();
        let mut sources = WakeSources::empty();
        while let Some(source) = self.wake_queue.dequeue() {
            sources |= source.bit();
        }
        let was_deep = mode == PowerMode::Deep;
        let result = ll.power_on_request(was_deep, wake_for_rf, &mut self.sleep_timer);
        self.peripherals.resume();
        self.peripherals.leds_restore(leds);
        self.state = PowerState::Awake;
        result?;

        debug!("power: awake, sources={:?}", sources);
        Ok(SleepOutcome::Slept {
            mode,
            timeout,
            wake_for_rf,
            sources,
        })
    }

    /// Halts the CPU with all clocks running, until the next interrupt.
    fn idle(&mut self) {
        self.intent.set();
        let power = &mut self.power;
        let intent = self.intent;
        critical_section::with(|_| {
            if intent.is_set() {
                power.set_power_mode(PowerMode::Idle);
                power.enter_sleep();
            }
        });
        self.intent.clear();
    }
}

/// Picks the nearer of two deadlines, where 0 means "none".
///
/// Returns the timeout and whether it is the radio event's.
fn select_timeout(osal_ticks: u32, radio_ticks: u32) -> (u32, bool) {
    match (osal_ticks, radio_ticks) {
        (_, 0) => (osal_ticks, false),
        (0, _) => (radio_ticks, true),
        (o, r) if r <= o => (r, true),
        (o, _) => (o, false),
    }
}
