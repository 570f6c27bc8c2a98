//! The radio timer ("Timer2").
//!
//! Timer2 is a 16-bit fine counter with a period of [`FINE_PER_COARSE`] ticks, cascaded into a
//! 24-bit overflow counter. It provides two event channels, each of which can compare against
//! the full `coarse + fine` value or against the overflow counter alone, and a capture unit that
//! the radio latches when it detects a packet's sync word.
//!
//! The counter registers are byte-wide. Reading the low byte of the fine counter latches the high
//! byte and the three overflow bytes, so a snapshot is consistent as long as the low byte is read
//! first and nothing else reads the registers in between. [`Timebase`] does all accesses inside a
//! critical section to guarantee the latter.
//!
//! Writes go the other way around. The counter and compare registers stage their upper bytes, and
//! the write to byte 0 commits the whole value.
//!
//! [`FINE_PER_COARSE`]: ../time/constant.FINE_PER_COARSE.html

use {
    crate::{
        time::{SysTime, TIMER_MASK},
        utils::Hex,
    },
    bitflags::bitflags,
    byteorder::{ByteOrder, LittleEndian},
};

bitflags! {
    /// Bits of the Timer2 control register.
    pub struct Timer2Ctrl: u8 {
        /// Timer is counting.
        const RUN = 1 << 0;
        /// Start synchronously with the next sleep timer tick.
        const SYNC = 1 << 1;
    }
}

bitflags! {
    /// Timer2 interrupt sources, used in both the mask and the flag register.
    pub struct Timer2Irq: u8 {
        /// Full-resolution compare on event channel 1.
        const EVENT1 = 1 << 0;
        /// Full-resolution compare on event channel 2.
        const EVENT2 = 1 << 1;
        /// Overflow-counter compare on event channel 1.
        const OVF_EVENT1 = 1 << 2;
        /// Overflow-counter compare on event channel 2.
        const OVF_EVENT2 = 1 << 3;
    }
}

/// One of the two Timer2 event channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventChannel {
    One,
    Two,
}

impl EventChannel {
    fn compare_irq(&self) -> Timer2Irq {
        match self {
            EventChannel::One => Timer2Irq::EVENT1,
            EventChannel::Two => Timer2Irq::EVENT2,
        }
    }

    fn overflow_irq(&self) -> Timer2Irq {
        match self {
            EventChannel::One => Timer2Irq::OVF_EVENT1,
            EventChannel::Two => Timer2Irq::OVF_EVENT2,
        }
    }

    /// Both interrupt sources belonging to this channel.
    fn irqs(&self) -> Timer2Irq {
        self.compare_irq() | self.overflow_irq()
    }
}

/// Timer2 registers.
///
/// Multi-byte values are split into byte registers, indexed from the least significant byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timer2Reg {
    /// Control register (see [`Timer2Ctrl`]).
    Ctrl,
    /// Fine counter, bytes 0..=1. Reading byte 0 latches byte 1 and the overflow counter.
    Count(u8),
    /// Overflow (coarse) counter, bytes 0..=2.
    Overflow(u8),
    /// Fine counter value latched at sync word detection, bytes 0..=1. Reading byte 0 latches
    /// byte 1 and the captured overflow counter.
    Capture(u8),
    /// Overflow counter value latched at sync word detection, bytes 0..=2.
    CaptureOverflow(u8),
    /// Fine compare value of an event channel, bytes 0..=1.
    Compare(EventChannel, u8),
    /// Overflow compare value of an event channel, bytes 0..=2.
    OverflowCompare(EventChannel, u8),
    /// Interrupt mask (see [`Timer2Irq`]).
    IrqMask,
    /// Interrupt flags (see [`Timer2Irq`]). Writing a 0 bit clears the flag.
    IrqFlags,
}

/// Byte-level access to the Timer2 registers.
///
/// Reads take `&mut self` since some of them have side effects in hardware (latching).
pub trait Timer2Regs {
    fn read(&mut self, reg: Timer2Reg) -> u8;
    fn write(&mut self, reg: Timer2Reg, value: u8);
}

/// The hardware timebase of the Link-Layer.
///
/// This is the only code that may touch the Timer2 registers; all reads and writes of
/// multi-byte values happen inside a critical section so they appear atomic to interrupt handlers.
pub struct Timebase<R: Timer2Regs> {
    regs: R,
}

impl<R: Timer2Regs> Timebase<R> {
    /// Creates a timebase from the Timer2 registers. The timer is left untouched.
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Provides access to the raw registers. Use with caution.
    pub fn regs(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Starts the timer.
    ///
    /// If `sync` is set, the timer is started on the next positive edge of the sleep timer clock,
    /// which keeps the two timebases aligned after waking up.
    pub fn start(&mut self, sync: bool) {
        let mut ctrl = Timer2Ctrl::RUN;
        ctrl.set(Timer2Ctrl::SYNC, sync);
        self.regs.write(Timer2Reg::Ctrl, ctrl.bits());
    }

    /// Stops the timer. The counter values are retained.
    pub fn stop(&mut self) {
        self.regs.write(Timer2Reg::Ctrl, Timer2Ctrl::empty().bits());
    }

    /// Returns whether the timer is counting.
    pub fn is_running(&mut self) -> bool {
        Timer2Ctrl::from_bits_truncate(self.regs.read(Timer2Reg::Ctrl)).contains(Timer2Ctrl::RUN)
    }

    /// Reads the current time.
    pub fn now(&mut self) -> SysTime {
        critical_section::with(|_| {
            read_latched(&mut self.regs, Timer2Reg::Count, Timer2Reg::Overflow)
        })
    }

    /// Reads the anchor point captured by the radio at the last sync word detection.
    pub fn capture_anchor(&mut self) -> SysTime {
        critical_section::with(|_| {
            read_latched(&mut self.regs, Timer2Reg::Capture, Timer2Reg::CaptureOverflow)
        })
    }

    /// Loads a new value into the counters.
    ///
    /// The timer should be stopped while doing this, otherwise it may tick between the writes.
    pub fn load(&mut self, time: SysTime) {
        let mut coarse = [0; 3];
        LittleEndian::write_u24(&mut coarse, time.coarse());
        let fine = time.fine().to_le_bytes();
        critical_section::with(|_| {
            // High bytes first: the write to byte 0 of each counter commits the value.
            self.regs.write(Timer2Reg::Overflow(2), coarse[2]);
            self.regs.write(Timer2Reg::Overflow(1), coarse[1]);
            self.regs.write(Timer2Reg::Overflow(0), coarse[0]);
            self.regs.write(Timer2Reg::Count(1), fine[1]);
            self.regs.write(Timer2Reg::Count(0), fine[0]);
        });
        trace!("timer2: load {:?}", time);
    }

    /// Programs an event channel to fire at the full-resolution time `at`.
    ///
    /// Any event pending on the channel is discarded.
    pub fn program_event(&mut self, channel: EventChannel, at: SysTime) {
        let mut coarse = [0; 3];
        LittleEndian::write_u24(&mut coarse, at.coarse());
        let fine = at.fine().to_le_bytes();
        critical_section::with(|_| {
            self.disable_irqs(channel.irqs());
            for (i, b) in coarse.iter().enumerate().rev() {
                self.regs.write(Timer2Reg::OverflowCompare(channel, i as u8), *b);
            }
            for (i, b) in fine.iter().enumerate().rev() {
                self.regs.write(Timer2Reg::Compare(channel, i as u8), *b);
            }
            self.enable_irqs(channel.compare_irq());
        });
        trace!("timer2: {:?} at {:?}", channel, at);
    }

    /// Programs an event channel to fire when the overflow counter reaches `timeout`.
    ///
    /// Only the lower 24 bits of `timeout` are used, so callers may pass an unmasked 32-bit
    /// coarse tick count.
    pub fn program_overflow_event(&mut self, channel: EventChannel, timeout: u32) {
        let mut coarse = [0; 3];
        LittleEndian::write_u24(&mut coarse, timeout & TIMER_MASK);
        critical_section::with(|_| {
            self.disable_irqs(channel.irqs());
            for (i, b) in coarse.iter().enumerate().rev() {
                self.regs.write(Timer2Reg::OverflowCompare(channel, i as u8), *b);
            }
            self.enable_irqs(channel.overflow_irq());
        });
        trace!("timer2: {:?} at overflow {:?}", channel, Hex(timeout & TIMER_MASK));
    }

    /// Disables an event channel and discards a pending event on it.
    ///
    /// This is safe to call when the channel is not enabled.
    pub fn disable_event(&mut self, channel: EventChannel) {
        critical_section::with(|_| self.disable_irqs(channel.irqs()));
    }

    /// Returns whether an event on `channel` has fired and not yet been acknowledged.
    pub fn is_event_pending(&mut self, channel: EventChannel) -> bool {
        let flags = Timer2Irq::from_bits_truncate(self.regs.read(Timer2Reg::IrqFlags));
        flags.intersects(channel.irqs())
    }

    /// Acknowledges a fired event on `channel`. The channel stays disabled until programmed again.
    pub fn acknowledge_event(&mut self, channel: EventChannel) {
        self.disable_event(channel);
    }

    fn enable_irqs(&mut self, irqs: Timer2Irq) {
        let mask = Timer2Irq::from_bits_truncate(self.regs.read(Timer2Reg::IrqMask));
        self.regs.write(Timer2Reg::IrqMask, (mask | irqs).bits());
    }

    fn disable_irqs(&mut self, irqs: Timer2Irq) {
        let mask = Timer2Irq::from_bits_truncate(self.regs.read(Timer2Reg::IrqMask));
        self.regs.write(Timer2Reg::IrqMask, (mask - irqs).bits());
        self.regs.write(Timer2Reg::IrqFlags, (!irqs).bits());
    }
}

/// Reads a latched `fine + coarse` register group. The low fine byte must come first.
fn read_latched<R: Timer2Regs>(
    regs: &mut R,
    fine: fn(u8) -> Timer2Reg,
    coarse: fn(u8) -> Timer2Reg,
) -> SysTime {
    let fine_lo = regs.read(fine(0));
    let fine_hi = regs.read(fine(1));
    let mut raw = [0; 3];
    for (i, b) in raw.iter_mut().enumerate() {
        *b = regs.read(coarse(i as u8));
    }
    SysTime::new(
        LittleEndian::read_u24(&raw),
        u16::from_le_bytes([fine_lo, fine_hi]),
    )
}
