//! Stack configuration trait.

use {
    crate::{
        hal::{Peripherals, PowerRegs, RadioClock},
        osal::{EventMask, Osal, TaskId},
        phy::PhyRegs,
        sleep_timer::SleepTimerRegs,
        timer2::Timer2Regs,
    },
    rand_core::RngCore,
};

/// Trait for controller configurations.
///
/// This trait binds the hardware interface types used by the [`LinkLayer`] and the
/// [`PowerSequencer`], and carries the timing constants of the sleep/wake path.
///
/// Every application must define a type implementing this trait and supply it to the stack.
///
/// The default constants were measured on one silicon revision. Ports to different hardware need
/// to measure them again.
///
/// [`LinkLayer`]: ../link/struct.LinkLayer.html
/// [`PowerSequencer`]: ../power/struct.PowerSequencer.html
pub trait Config {
    /// The radio timer.
    type Timer2: Timer2Regs;

    /// The 32 kHz sleep timer.
    type SleepTimer: SleepTimerRegs;

    /// The radio coprocessor's registers.
    type Phy: PhyRegs;

    /// The 32 MHz oscillator.
    type Clock: RadioClock;

    /// Power mode and interrupt control.
    type Power: PowerRegs;

    /// Peripheral drivers suspended during sleep.
    type Peripherals: Peripherals;

    /// The task scheduler.
    type Osal: Osal;

    /// Random number source for the advertising delay.
    type Rng: RngCore;

    /// Software latency of the sleep/wake path, in sleep timer ticks. Wake-ups are programmed
    /// this much earlier than requested.
    const SLEEP_ADJ_TICKS: u32 = 35;

    /// Shortest timed sleep worth the transition overhead, in sleep timer ticks (about 2 ms).
    const MIN_SLEEP_TICKS: u32 = 66;

    /// Time needed to restart the 32 MHz clock before a radio event, in sleep timer ticks
    /// (about 1 ms).
    const RADIO_WAKEUP_TICKS: u32 = 33;

    /// Sleep is denied when the next radio event is closer than this many coarse ticks.
    const RADIO_GUARD_COARSE: u32 = 4;

    /// The scheduler task that receives Link-Layer events.
    const LL_TASK_ID: TaskId = 0;

    /// Event posted to `LL_TASK_ID` when a radio task ends.
    const LL_EVT_TASK_DONE: EventMask = 1 << 0;

    /// Event posted to `LL_TASK_ID` when an advertising timeout expires.
    const LL_EVT_ADV_TIMEOUT: EventMask = 1 << 1;
}
