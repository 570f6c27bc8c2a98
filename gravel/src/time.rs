//! Radio timebase values: anchor points, durations, and 24-bit timer arithmetic.
//!
//! The radio timer counts in two stages. A 16-bit *fine* counter runs at 32 MHz (31.25 ns per
//! tick) and wraps every 625 µs, which increments a 24-bit *coarse* (overflow) counter. The coarse
//! counter wraps silently after 2^24 × 625 µs, a little less than 3 hours, so every comparison
//! between two coarse values has to be done modulo 2^24.

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of fine ticks (31.25 ns) in one coarse tick (625 µs).
pub const FINE_PER_COARSE: u16 = 20_000;

/// Number of fine ticks per microsecond.
pub const FINE_PER_MICRO: u32 = 32;

/// Duration of one coarse tick in microseconds.
pub const COARSE_MICROS: u32 = 625;

/// Mask selecting the valid bits of a 24-bit timer value.
pub const TIMER_MASK: u32 = 0x00FF_FFFF;

/// Number of distinct 24-bit timer values.
pub const TIMER_MODULUS: u32 = 1 << 24;

const HALF_RANGE: u32 = 1 << 23;

/// Adds `d` to the 24-bit timer value `t`, wrapping around at 2^24.
pub fn add_modulo(t: u32, d: u32) -> u32 {
    t.wrapping_add(d) & TIMER_MASK
}

/// Returns the forward distance from `t1` to `t2` on the 24-bit timer.
///
/// The result is always in range `0..2^24`: a `t2` that lies "before" `t1` is treated as lying
/// after the next wraparound. Use [`signed_delta`] when the order of the two values is not known.
pub fn delta(t1: u32, t2: u32) -> i32 {
    (t2.wrapping_sub(t1) & TIMER_MASK) as i32
}

/// Returns the distance from `t1` to `t2` on the 24-bit timer, as a signed value.
///
/// The result is in range `-2^23..2^23`. It is negative when `t2` lies in the past relative to
/// `t1`, which only gives correct results if both values are less than half the timer range
/// apart.
pub fn signed_delta(t1: u32, t2: u32) -> i32 {
    let forward = t2.wrapping_sub(t1) & TIMER_MASK;
    if forward >= HALF_RANGE {
        forward as i32 - TIMER_MODULUS as i32
    } else {
        forward as i32
    }
}

/// Returns the unsigned distance between `t1` and `t2` on the 24-bit timer, regardless of which
/// one comes first.
pub fn absolute_delta(t1: u32, t2: u32) -> u32 {
    let forward = t2.wrapping_sub(t1) & TIMER_MASK;
    forward.min(TIMER_MODULUS - forward)
}

/// A duration expressed in coarse (625 µs) and fine (31.25 ns) radio timer ticks.
///
/// The fine part is always less than [`FINE_PER_COARSE`]; constructors carry any excess into the
/// coarse part.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Duration {
    coarse: u32,
    fine: u16,
}

impl Duration {
    /// The empty duration.
    pub const ZERO: Self = Duration { coarse: 0, fine: 0 };

    /// Creates a duration from coarse and fine ticks, normalizing the fine part.
    pub fn new(coarse: u32, fine: u32) -> Self {
        let carry = fine / u32::from(FINE_PER_COARSE);
        Duration {
            coarse: coarse
                .checked_add(carry)
                .expect("duration overflow"),
            fine: (fine % u32::from(FINE_PER_COARSE)) as u16,
        }
    }

    /// Creates a duration of a whole number of coarse ticks.
    pub fn from_coarse(coarse: u32) -> Self {
        Duration { coarse, fine: 0 }
    }

    /// Creates a [`Duration`] from a number of microseconds.
    pub fn from_micros(micros: u32) -> Self {
        Duration {
            coarse: micros / COARSE_MICROS,
            fine: ((micros % COARSE_MICROS) * FINE_PER_MICRO) as u16,
        }
    }

    /// Creates a [`Duration`] representing the given number of milliseconds.
    pub fn from_millis(millis: u16) -> Self {
        Self::from_micros(u32::from(millis) * 1_000)
    }

    /// Returns the number of whole coarse ticks in `self`.
    pub fn coarse(&self) -> u32 {
        self.coarse
    }

    /// Returns the fine ticks in `self` that don't make up a whole coarse tick.
    pub fn fine(&self) -> u16 {
        self.fine
    }

    /// Returns the number of whole microseconds that fit in `self`.
    pub fn as_micros(&self) -> u64 {
        u64::from(self.coarse) * u64::from(COARSE_MICROS)
            + u64::from(self.fine) / u64::from(FINE_PER_MICRO)
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let coarse = self
            .coarse
            .checked_add(rhs.coarse)
            .expect("duration overflow");
        Duration::new(coarse, u32::from(self.fine) + u32::from(rhs.fine))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let (fine, borrow) = if self.fine >= rhs.fine {
            (self.fine - rhs.fine, 0)
        } else {
            (self.fine + FINE_PER_COARSE - rhs.fine, 1)
        };
        let coarse = self
            .coarse
            .checked_sub(rhs.coarse + borrow)
            .expect("duration underflow");
        Duration { coarse, fine }
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.as_micros();
        if micros >= 1_000_000 {
            let (secs, subsec_micros) = (micros / 1_000_000, micros % 1_000_000);
            if subsec_micros == 0 {
                write!(f, "{}s", secs)
            } else {
                write!(f, "{}.{:06}s", secs, subsec_micros)
            }
        } else if micros >= 1000 {
            let (millis, submilli_micros) = (micros / 1000, micros % 1000);
            if submilli_micros == 0 {
                write!(f, "{}ms", millis)
            } else {
                write!(f, "{}.{:03}ms", millis, submilli_micros)
            }
        } else {
            write!(f, "{}µs", micros)
        }
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// A point in time on the radio timer (an *anchor point*).
///
/// Anchor points are captured by the hardware at the moment a packet's sync word is detected and
/// are the reference for all relative scheduling: the next connection event happens a fixed
/// number of coarse and fine ticks after the last anchor.
///
/// The coarse part wraps around at 2^24. Apart from that wraparound, `SysTime`s are monotonic.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct SysTime {
    coarse: u32,
    fine: u16,
}

impl SysTime {
    /// Creates a `SysTime` from raw timer values.
    ///
    /// Only the lower 24 bits of `coarse` are used. `fine` must be less than
    /// [`FINE_PER_COARSE`].
    pub fn new(coarse: u32, fine: u16) -> Self {
        debug_assert!(
            fine < FINE_PER_COARSE,
            "fine tick {} out of range",
            fine
        );
        SysTime {
            coarse: coarse & TIMER_MASK,
            fine,
        }
    }

    /// Returns the coarse (overflow counter) part.
    pub fn coarse(&self) -> u32 {
        self.coarse
    }

    /// Returns the fine (sub-tick) part.
    pub fn fine(&self) -> u16 {
        self.fine
    }

    /// Moves `self` forwards in time by `d`, wrapping the coarse part at 2^24.
    pub fn adjust_forward(self, d: Duration) -> Self {
        let fine = u32::from(self.fine) + u32::from(d.fine);
        let carry = fine / u32::from(FINE_PER_COARSE);
        SysTime {
            coarse: add_modulo(self.coarse, d.coarse.wrapping_add(carry)),
            fine: (fine % u32::from(FINE_PER_COARSE)) as u16,
        }
    }

    /// Moves `self` backwards in time by `d`, borrowing a coarse tick when the fine part would
    /// underflow.
    pub fn adjust_backward(self, d: Duration) -> Self {
        let (fine, borrow) = if self.fine >= d.fine {
            (self.fine - d.fine, 0)
        } else {
            (self.fine + FINE_PER_COARSE - d.fine, 1)
        };
        SysTime {
            coarse: self.coarse.wrapping_sub(d.coarse.wrapping_add(borrow)) & TIMER_MASK,
            fine,
        }
    }

    /// Calculates the forward distance from `earlier` to `self`.
    ///
    /// If `earlier` is actually later than `self`, the result is the distance across the next
    /// wraparound of the coarse counter.
    pub fn duration_since(&self, earlier: SysTime) -> Duration {
        let (fine, borrow) = if self.fine >= earlier.fine {
            (self.fine - earlier.fine, 0)
        } else {
            (self.fine + FINE_PER_COARSE - earlier.fine, 1)
        };
        Duration {
            coarse: self.coarse.wrapping_sub(earlier.coarse).wrapping_sub(borrow) & TIMER_MASK,
            fine,
        }
    }

    /// Returns whether `self` lies before `other`, assuming the two are less than half the timer
    /// range (about 87 minutes) apart.
    pub fn is_before(&self, other: SysTime) -> bool {
        match signed_delta(self.coarse, other.coarse) {
            d if d > 0 => true,
            0 => self.fine < other.fine,
            _ => false,
        }
    }
}

/// A [`Duration`] can be added to a [`SysTime`], moving it forwards in time.
impl Add<Duration> for SysTime {
    type Output = Self;

    fn add(self, d: Duration) -> Self {
        self.adjust_forward(d)
    }
}

impl AddAssign<Duration> for SysTime {
    fn add_assign(&mut self, d: Duration) {
        *self = *self + d;
    }
}

/// A [`Duration`] can be subtracted from a [`SysTime`], moving it backwards in time.
impl Sub<Duration> for SysTime {
    type Output = Self;

    fn sub(self, d: Duration) -> Self {
        self.adjust_backward(d)
    }
}

impl SubAssign<Duration> for SysTime {
    fn sub_assign(&mut self, d: Duration) {
        *self = *self - d;
    }
}

/// [`SysTime`]s can be subtracted, which computes the forward [`Duration`] from the rhs to the
/// lhs using [`SysTime::duration_since`].
impl Sub<SysTime> for SysTime {
    type Output = Duration;

    fn sub(self, rhs: SysTime) -> Duration {
        self.duration_since(rhs)
    }
}

impl fmt::Display for SysTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.coarse, self.fine)
    }
}

impl fmt::Debug for SysTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SysTime({}+{})", self.coarse, self.fine)
    }
}
