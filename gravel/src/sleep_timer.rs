//! The 32.768 kHz sleep timer.
//!
//! The sleep timer keeps running in the low-power modes where the radio timer is stopped. It is a
//! 24-bit counter with a single compare register that can wake the CPU. Its domain is distinct
//! from the radio timer's: one sleep timer tick is 1/32768 s, about 30.5 µs, while a coarse radio
//! timer tick is 625 µs. Conversions between the two are approximate, so callers have to tolerate a
//! small skew.
//!
//! # Register access
//!
//! The counter and the compare value share three byte registers (`Count(0..=2)`, least
//! significant first). Reading byte 0 latches bytes 1 and 2, so byte 0 is always read first.
//! Writes go the other way around: bytes 2 and 1 are staged and the write to byte 0 commits the
//! whole compare value. A new compare value may only be written once the load-ready flag is set.

use {
    crate::time::{Duration, FINE_PER_COARSE},
    bitflags::bitflags,
    byteorder::{ByteOrder, LittleEndian},
};

/// Sleep timer frequency in Hz.
pub const SLEEP_TIMER_HZ: u32 = 32_768;

/// Mask selecting the valid bits of a sleep timer value.
pub const SLEEP_TIMER_MASK: u32 = 0x00FF_FFFF;

/// The longest timeout that can be programmed in one go (the full 24-bit range, 511.99997 s).
pub const MAX_SLEEP_TICKS: u32 = SLEEP_TIMER_MASK;

/// Converts milliseconds to sleep timer ticks, rounding up.
///
/// This is used for wake-up deadlines, which must never end up later than requested.
pub fn ms_to_ticks(ms: u32) -> u32 {
    // ticks = ms * 32768 / 1000 = ms * 4096 / 125
    let ticks = (u64::from(ms) * 4096 + 124) / 125;
    if ticks > u64::from(u32::max_value()) {
        u32::max_value()
    } else {
        ticks as u32
    }
}

/// Converts sleep timer ticks to milliseconds, rounding down.
pub fn ticks_to_ms(ticks: u32) -> u32 {
    (u64::from(ticks) * 125 / 4096) as u32
}

/// Converts a number of coarse radio timer ticks to sleep timer ticks, rounding down.
///
/// Rounding down makes a wake-up scheduled with the result happen early rather than late.
pub fn coarse_to_sleep_ticks(coarse: u32) -> u32 {
    // 625 µs * 32768 Hz = 20.48 = 512 / 25
    (u64::from(coarse) * 512 / 25) as u32
}

/// Converts a number of sleep timer ticks to a radio timer [`Duration`], rounding down to the
/// nearest fine tick.
pub fn sleep_ticks_to_duration(ticks: u32) -> Duration {
    // 1 / 32768 s = 976.5625 fine ticks = 15625 / 16
    let fine = u64::from(ticks) * 15_625 / 16;
    let per_coarse = u64::from(FINE_PER_COARSE);
    Duration::new((fine / per_coarse) as u32, (fine % per_coarse) as u32)
}

/// What kind of sleep a timeout permits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SleepPlan {
    /// No deadline at all. Sleep as deeply as possible, without arming the sleep timer.
    Deep,

    /// The deadline is too close to make a timed sleep worthwhile. Idle the CPU with all clocks
    /// running and without arming the sleep timer.
    Idle,

    /// Sleep with the sleep timer armed to fire after this many ticks.
    Timed(u32),
}

impl SleepPlan {
    /// Decides how to sleep for `timeout` sleep timer ticks (0 meaning "no deadline").
    ///
    /// Timeouts shorter than `min_ticks` aren't worth the overhead of a sleep/wake transition.
    pub fn for_timeout(timeout: u32, min_ticks: u32) -> Self {
        match timeout {
            0 => SleepPlan::Deep,
            t if t < min_ticks => SleepPlan::Idle,
            t => SleepPlan::Timed(t),
        }
    }
}

bitflags! {
    /// Bits of the sleep timer load status register.
    pub struct LoadStatus: u8 {
        /// A new compare value may be written.
        const LDRDY = 1 << 0;
    }
}

/// Sleep timer registers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SleepTimerReg {
    /// Counter (read) and compare value (write), bytes 0..=2.
    Count(u8),
    /// Load status (see [`LoadStatus`]).
    LoadStatus,
    /// Compare interrupt enable (bit 0).
    IrqEnable,
    /// Compare interrupt flag (bit 0). Writing 0 clears it.
    IrqFlag,
}

/// Byte-level access to the sleep timer registers.
pub trait SleepTimerRegs {
    fn read(&mut self, reg: SleepTimerReg) -> u8;
    fn write(&mut self, reg: SleepTimerReg, value: u8);
}

/// Owner of the sleep timer.
pub struct SleepTimer<R: SleepTimerRegs> {
    regs: R,
    adj_ticks: u32,
}

impl<R: SleepTimerRegs> SleepTimer<R> {
    /// Creates a sleep timer driver.
    ///
    /// `adj_ticks` is the measured latency of the software wake-up path; wake-ups are programmed
    /// that many ticks early.
    pub fn new(regs: R, adj_ticks: u32) -> Self {
        Self { regs, adj_ticks }
    }

    /// Provides access to the raw registers. Use with caution.
    pub fn regs(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Reads the current value of the 24-bit counter.
    pub fn snapshot(&mut self) -> u32 {
        critical_section::with(|_| {
            let mut raw = [0; 3];
            // byte 0 first, latching the others
            for (i, b) in raw.iter_mut().enumerate() {
                *b = self.regs.read(SleepTimerReg::Count(i as u8));
            }
            LittleEndian::read_u24(&raw)
        })
    }

    /// Returns the number of ticks elapsed since the counter read `base`.
    pub fn elapsed_since(&mut self, base: u32) -> u32 {
        self.snapshot().wrapping_sub(base) & SLEEP_TIMER_MASK
    }

    /// Arms the compare interrupt to fire `timeout` ticks after the counter read `base`.
    ///
    /// The timeout is clipped to [`MAX_SLEEP_TICKS`] and shortened by the wake-up latency, but
    /// never below one tick. Returns the programmed compare value.
    pub fn arm_wake(&mut self, base: u32, timeout: u32) -> u32 {
        let timeout = timeout.min(MAX_SLEEP_TICKS);
        let ticks = timeout.saturating_sub(self.adj_ticks).max(1);
        let compare = base.wrapping_add(ticks) & SLEEP_TIMER_MASK;

        let mut raw = [0; 3];
        LittleEndian::write_u24(&mut raw, compare);

        while !LoadStatus::from_bits_truncate(self.regs.read(SleepTimerReg::LoadStatus))
            .contains(LoadStatus::LDRDY)
        {
            core::hint::spin_loop();
        }

        critical_section::with(|_| {
            self.regs.write(SleepTimerReg::Count(2), raw[2]);
            self.regs.write(SleepTimerReg::Count(1), raw[1]);
            self.regs.write(SleepTimerReg::Count(0), raw[0]);
            self.regs.write(SleepTimerReg::IrqFlag, 0);
            self.regs.write(SleepTimerReg::IrqEnable, 1);
        });

        trace!(
            "sleep timer: base={} timeout={} compare={}",
            base,
            timeout,
            compare
        );
        compare
    }

    /// Disables the compare interrupt and clears a pending one. Does nothing if not armed.
    pub fn disarm(&mut self) {
        self.regs.write(SleepTimerReg::IrqEnable, 0);
        self.regs.write(SleepTimerReg::IrqFlag, 0);
    }

    /// Returns the shortest timeout that can be armed without the latency adjustment moving the
    /// compare value to or behind `base`.
    pub fn min_timeout(&self) -> u32 {
        self.adj_ticks + 1
    }

    /// Returns whether the compare interrupt is enabled.
    pub fn is_armed(&mut self) -> bool {
        self.regs.read(SleepTimerReg::IrqEnable) & 1 != 0
    }
}
