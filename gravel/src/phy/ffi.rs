//! C-callable function table over a [`Phy`].
//!
//! Parts of the controller that are still written in C (host interface, test commands) reach the
//! coprocessor through this table instead of touching its registers. All functions take the
//! table's `ctx` pointer as their first argument and return one of the `STATUS_*` codes.
//!
//! [`Phy`]: ../struct.Phy.html

use {
    super::{fifo, AddressKind, DeviceAddress, Phy, PhyRegs, WhiteListError},
    crate::phy::Command,
    core::ffi::c_void,
};

pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_WHITE_LIST_FULL: u8 = 0x01;
pub const STATUS_WHITE_LIST_EMPTY: u8 = 0x02;
pub const STATUS_WHITE_LIST_NOT_FOUND: u8 = 0x03;
/// The coprocessor stopped accepting commands, or a task ended with an internal error.
pub const STATUS_FATAL: u8 = 0xFE;
/// A parameter was out of range (eg. an unknown FIFO command).
pub const STATUS_INVALID: u8 = 0xFF;

/// The PHY command surface as a table of `extern "C"` functions.
#[repr(C)]
pub struct PhyFnTable {
    /// Opaque pointer to the `Phy` instance, passed to every function.
    pub ctx: *mut c_void,
    /// Issues a command (see [`Command`]), waiting for the previous one to be accepted.
    ///
    /// [`Command`]: ../enum.Command.html
    pub command: unsafe extern "C" fn(ctx: *mut c_void, cmd: u8) -> u8,
    /// Issues a raw FIFO command (`target << 4 | op`).
    pub fifo: unsafe extern "C" fn(ctx: *mut c_void, raw: u8) -> u8,
    /// Returns the raw end-cause of the finished task, writing it to `cause`.
    pub read_end_cause: unsafe extern "C" fn(ctx: *mut c_void, cause: *mut u8) -> u8,
    /// Adds a 6-byte address (LSB first); `random` is 0 for a public address.
    pub white_list_add: unsafe extern "C" fn(ctx: *mut c_void, addr: *const u8, random: u8) -> u8,
    /// Removes a 6-byte address (LSB first); `random` is 0 for a public address.
    pub white_list_remove:
        unsafe extern "C" fn(ctx: *mut c_void, addr: *const u8, random: u8) -> u8,
    /// Removes all white list entries.
    pub white_list_clear: unsafe extern "C" fn(ctx: *mut c_void) -> u8,
}

impl PhyFnTable {
    /// Creates a table operating on `phy`.
    ///
    /// The `Phy` must not be used through any other path while C code may call the table.
    pub fn new<R: PhyRegs>(phy: &'static mut Phy<R>) -> Self {
        Self {
            ctx: phy as *mut Phy<R> as *mut c_void,
            command: command::<R>,
            fifo: fifo_op::<R>,
            read_end_cause: read_end_cause::<R>,
            white_list_add: white_list_add::<R>,
            white_list_remove: white_list_remove::<R>,
            white_list_clear: white_list_clear::<R>,
        }
    }
}

fn white_list_status(result: Result<(), WhiteListError>) -> u8 {
    match result {
        Ok(()) => STATUS_SUCCESS,
        Err(WhiteListError::Full) => STATUS_WHITE_LIST_FULL,
        Err(WhiteListError::Empty) => STATUS_WHITE_LIST_EMPTY,
        Err(WhiteListError::NotFound) => STATUS_WHITE_LIST_NOT_FOUND,
    }
}

unsafe fn address(addr: *const u8, random: u8) -> Option<DeviceAddress> {
    if addr.is_null() {
        return None;
    }
    let mut bytes = [0; 6];
    core::ptr::copy_nonoverlapping(addr, bytes.as_mut_ptr(), 6);
    let kind = if random == 0 {
        AddressKind::Public
    } else {
        AddressKind::Random
    };
    Some(DeviceAddress::new(bytes, kind))
}

unsafe fn phy<'a, R: PhyRegs>(ctx: *mut c_void) -> &'a mut Phy<R> {
    &mut *(ctx as *mut Phy<R>)
}

unsafe extern "C" fn command<R: PhyRegs>(ctx: *mut c_void, cmd: u8) -> u8 {
    match Command::from(cmd) {
        Command::Unknown(_) => STATUS_INVALID,
        cmd => match phy::<R>(ctx).command(cmd) {
            Ok(()) => STATUS_SUCCESS,
            Err(_) => STATUS_FATAL,
        },
    }
}

unsafe extern "C" fn fifo_op<R: PhyRegs>(ctx: *mut c_void, raw: u8) -> u8 {
    match fifo::decode(raw) {
        Some((target, op)) => {
            let phy = phy::<R>(ctx);
            if phy.wait_idle().is_err() {
                return STATUS_FATAL;
            }
            phy.fifo(target, op);
            STATUS_SUCCESS
        }
        None => STATUS_INVALID,
    }
}

unsafe extern "C" fn read_end_cause<R: PhyRegs>(ctx: *mut c_void, cause: *mut u8) -> u8 {
    if cause.is_null() {
        return STATUS_INVALID;
    }
    let end = phy::<R>(ctx).read_end_cause();
    *cause = end.raw();
    if end.is_fatal() {
        STATUS_FATAL
    } else {
        STATUS_SUCCESS
    }
}

unsafe extern "C" fn white_list_add<R: PhyRegs>(
    ctx: *mut c_void,
    addr: *const u8,
    random: u8,
) -> u8 {
    match address(addr, random) {
        Some(addr) => white_list_status(phy::<R>(ctx).white_list_add(addr)),
        None => STATUS_INVALID,
    }
}

unsafe extern "C" fn white_list_remove<R: PhyRegs>(
    ctx: *mut c_void,
    addr: *const u8,
    random: u8,
) -> u8 {
    match address(addr, random) {
        Some(addr) => white_list_status(phy::<R>(ctx).white_list_remove(addr)),
        None => STATUS_INVALID,
    }
}

unsafe extern "C" fn white_list_clear<R: PhyRegs>(ctx: *mut c_void) -> u8 {
    phy::<R>(ctx).white_list_clear();
    STATUS_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::{EndCause, Fifo, FifoOp, PhyReg};
    use crate::testing::SimPhy;

    fn table(sim: &SimPhy) -> PhyFnTable {
        let phy: &'static mut Phy<SimPhy> = Box::leak(Box::new(Phy::new(sim.clone())));
        PhyFnTable::new(phy)
    }

    #[test]
    fn commands_through_table() {
        let sim = SimPhy::new();
        let t = table(&sim);
        unsafe {
            assert_eq!((t.command)(t.ctx, 0x12), STATUS_SUCCESS);
            assert_eq!((t.command)(t.ctx, 0x42), STATUS_INVALID);
            sim.end_task(EndCause::NoSync);
            let mut cause = 0xAA;
            assert_eq!((t.read_end_cause)(t.ctx, &mut cause), STATUS_SUCCESS);
            assert_eq!(cause, 0x02);

            assert_eq!((t.fifo)(t.ctx, 0xF1), STATUS_SUCCESS);
            assert_eq!((t.fifo)(t.ctx, 0x70), STATUS_INVALID);
        }
        assert_eq!(sim.commands(), vec![0x12]);
        assert_eq!(sim.fifo_ops(), vec![(Fifo::Both, FifoOp::Reset)]);
    }

    #[test]
    fn white_list_status_codes() {
        let sim = SimPhy::new();
        let t = table(&sim);
        let addr = [1, 2, 3, 4, 5, 6];
        unsafe {
            assert_eq!(
                (t.white_list_remove)(t.ctx, addr.as_ptr(), 0),
                STATUS_WHITE_LIST_EMPTY
            );
            assert_eq!((t.white_list_add)(t.ctx, addr.as_ptr(), 1), STATUS_SUCCESS);
            assert_eq!(
                (t.white_list_remove)(t.ctx, addr.as_ptr(), 0),
                STATUS_WHITE_LIST_NOT_FOUND
            );
            for n in 0..7u8 {
                let other = [n, 0, 0, 0, 0, 0];
                assert_eq!((t.white_list_add)(t.ctx, other.as_ptr(), 0), STATUS_SUCCESS);
            }
            let extra = [9; 6];
            assert_eq!(
                (t.white_list_add)(t.ctx, extra.as_ptr(), 0),
                STATUS_WHITE_LIST_FULL
            );
            assert_eq!(
                (t.white_list_add)(t.ctx, core::ptr::null(), 0),
                STATUS_INVALID
            );
            assert_eq!((t.white_list_clear)(t.ctx), STATUS_SUCCESS);
        }
        assert_eq!(sim.reg(PhyReg::WhiteListValid), 0);
    }
}
