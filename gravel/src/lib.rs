//! Link-Layer timing and radio control core for BLE SoCs with a PHY coprocessor.
//!
//! This crate covers the real-time part of a BLE controller that sits below the Link-Layer
//! protocol logic: keeping time with the 24-bit radio timer, sleeping between radio events on a
//! 32 kHz sleep timer, and driving the radio coprocessor through its command and FIFO registers.
//!
//! # Using the crate
//!
//! Like the rest of the stack, everything here is runtime and hardware-agnostic. Every hardware
//! resource is accessed through a small register trait that has to be implemented once per chip:
//! * [`Timer2Regs`] for the radio timer (coarse 625 µs ticks plus 31.25 ns fine ticks).
//! * [`SleepTimerRegs`] for the always-on 32.768 kHz sleep timer.
//! * [`PhyRegs`] for the coprocessor's command, status, and configuration registers.
//! * The collaborators in [`hal`] (radio clock, power-mode registers, suspendable peripherals)
//!   and the task scheduler interface in [`osal`].
//!
//! These types are bundled by an application-defined [`Config`]. The [`LinkLayer`] owns the radio
//! timer and the coprocessor, and the [`PowerSequencer`] owns the sleep timer and runs once per
//! idle pass of the scheduler.
//!
//! [`Timer2Regs`]: timer2/trait.Timer2Regs.html
//! [`SleepTimerRegs`]: sleep_timer/trait.SleepTimerRegs.html
//! [`PhyRegs`]: phy/trait.PhyRegs.html
//! [`hal`]: hal/index.html
//! [`osal`]: osal/index.html
//! [`Config`]: config/trait.Config.html
//! [`LinkLayer`]: link/struct.LinkLayer.html
//! [`PowerSequencer`]: power/struct.PowerSequencer.html

// We're `#[no_std]`, except when we're testing
#![cfg_attr(not(test), no_std)]
// Deny a few warnings in doctests, since rustdoc `allow`s many warnings by default
#![doc(test(attr(deny(unused_imports, unused_must_use))))]
#![warn(rust_2018_idioms)]
// The claims of this lint are dubious, disable it
#![allow(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
mod log;
#[macro_use]
mod utils;
pub mod config;
mod error;
pub mod hal;
pub mod link;
pub mod osal;
pub mod phy;
pub mod power;
pub mod sleep_timer;
pub mod time;
pub mod timer2;

#[cfg(test)]
mod testing;

pub use self::error::{Error, Fatal};
