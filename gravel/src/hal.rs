//! Chip-level collaborators consumed by the power sequencer and the Link-Layer.
//!
//! Peripheral drivers (UART, ADC, AES, DMA) live outside of this crate. The only things needed
//! from them are the hooks implemented here: switching the power mode, masking interrupts around
//! sleep, controlling the 32 MHz radio clock, and suspending peripherals that cannot tolerate
//! losing their clock.

use bitflags::bitflags;

/// CPU power modes, from lightest to deepest.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerMode {
    /// CPU halted, all clocks keep running.
    Idle,
    /// 32 MHz clock stopped, 32 kHz clock and sleep timer kept running (PM2).
    Timer,
    /// Everything stopped except external wake sources (PM3).
    Deep,
}

bitflags! {
    /// Interrupt sources that may end a sleep period.
    pub struct WakeSources: u32 {
        const SLEEP_TIMER = 1 << 0;
        const GPIO = 1 << 1;
        const RADIO = 1 << 2;
    }
}

/// An opaque saved interrupt enable state, returned by [`PowerRegs::mask_interrupts`].
///
/// [`PowerRegs::mask_interrupts`]: trait.PowerRegs.html#tymethod.mask_interrupts
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterruptMask(pub u32);

/// Power mode and interrupt control registers.
pub trait PowerRegs {
    /// Disables all interrupts except `keep` and returns the previous enable state.
    fn mask_interrupts(&mut self, keep: WakeSources) -> InterruptMask;

    /// Restores an interrupt enable state saved by `mask_interrupts`.
    fn restore_interrupts(&mut self, saved: InterruptMask);

    /// Selects the power mode entered by the next `enter_sleep` call.
    fn set_power_mode(&mut self, mode: PowerMode);

    /// Executes the sleep entry instruction.
    ///
    /// This is called with interrupts globally disabled; the hardware still wakes on an enabled
    /// interrupt and returns from this function before the interrupt handler runs.
    fn enter_sleep(&mut self);
}

/// The 32 MHz crystal oscillator driving the radio and Timer2.
pub trait RadioClock {
    /// Powers up the oscillator. Returns immediately.
    fn start_xosc(&mut self);

    /// Returns whether the oscillator has stabilized.
    fn is_xosc_stable(&mut self) -> bool;

    /// Powers down the oscillator. The CPU keeps running off the RC oscillator.
    fn stop_xosc(&mut self);
}

/// Saved LED state, so the LEDs can be blanked during sleep.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LedState(pub u8);

/// Peripheral drivers that need to know about sleep.
pub trait Peripherals {
    /// Prepares drivers that cannot tolerate clock loss (notably the UART) for sleep.
    fn suspend(&mut self);

    /// Undoes `suspend`.
    fn resume(&mut self);

    /// Switches off all indicator LEDs, returning their previous state.
    fn leds_off(&mut self) -> LedState;

    /// Restores the LED state saved by `leds_off`.
    fn leds_restore(&mut self, state: LedState);
}
