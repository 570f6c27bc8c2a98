//! FIFO operations.
//!
//! The TX and RX FIFOs are 128-byte ring buffers in coprocessor RAM. Firmware and coprocessor
//! hand their contents back and forth with five operations, which are issued through the command
//! register like any other command:
//!
//! * **Reset** empties the FIFO.
//! * **Deallocate** frees the oldest committed packet.
//! * **Retry** rewinds the read pointer to the start of the oldest committed packet, so it is
//!   sent (or read) again.
//! * **Discard** drops everything written since the last commit.
//! * **Commit** hands everything written since the last commit to the other side.

use {
    super::{Phy, PhyReg, PhyRegs},
    crate::utils::Hex,
};

/// Size of each FIFO in bytes.
pub const FIFO_SIZE: usize = 128;

/// Which FIFO(s) an operation targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fifo {
    Rx,
    Tx,
    Both,
}

impl Fifo {
    fn raw(&self) -> u8 {
        match self {
            Fifo::Rx => 0x8,
            Fifo::Tx => 0x9,
            Fifo::Both => 0xF,
        }
    }
}

/// A FIFO operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FifoOp {
    Reset,
    Deallocate,
    Retry,
    Discard,
    Commit,
}

impl FifoOp {
    fn raw(&self) -> u8 {
        match self {
            FifoOp::Reset => 1,
            FifoOp::Deallocate => 2,
            FifoOp::Retry => 3,
            FifoOp::Discard => 4,
            FifoOp::Commit => 5,
        }
    }
}

/// Encodes a FIFO operation as the command register value (`target << 4 | op`).
pub fn encode(fifo: Fifo, op: FifoOp) -> u8 {
    fifo.raw() << 4 | op.raw()
}

/// Decodes a command register value written by [`encode`].
///
/// [`encode`]: fn.encode.html
pub fn decode(raw: u8) -> Option<(Fifo, FifoOp)> {
    let fifo = match raw >> 4 {
        0x8 => Fifo::Rx,
        0x9 => Fifo::Tx,
        0xF => Fifo::Both,
        _ => return None,
    };
    let op = match raw & 0xF {
        1 => FifoOp::Reset,
        2 => FifoOp::Deallocate,
        3 => FifoOp::Retry,
        4 => FifoOp::Discard,
        5 => FifoOp::Commit,
        _ => return None,
    };
    Some((fifo, op))
}

impl<R: PhyRegs> Phy<R> {
    /// Issues a FIFO operation.
    ///
    /// Unlike [`command`], this does not wait for the previous command or FIFO operation to be
    /// accepted. The caller has to make sure of that (eg. with [`wait_idle`]); two conflicting
    /// operations in flight corrupt the FIFO.
    ///
    /// [`command`]: struct.Phy.html#method.command
    /// [`wait_idle`]: struct.Phy.html#method.wait_idle
    pub fn fifo(&mut self, fifo: Fifo, op: FifoOp) {
        debug_assert!(
            !self.is_busy(),
            "FIFO operation {:?} {:?} issued before the previous command was accepted",
            fifo,
            op
        );
        let raw = encode(fifo, op);
        trace!("phy: {:?} FIFO {:?} ({:?})", fifo, op, Hex(raw));
        self.regs.write(PhyReg::Command, raw);
    }
}
