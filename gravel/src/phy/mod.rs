//! Command and status interface of the radio coprocessor.
//!
//! The radio is driven by a small coprocessor that runs one *radio task* at a time (advertising
//! event, scan window, connection event, raw TX/RX, test modes). Firmware starts a task by
//! writing a [`Command`] into the command register, which reads back as 0 once the coprocessor
//! has accepted it. When the task ends, the coprocessor sets the task-done flag and leaves an
//! [`EndCause`] in the end-cause register.
//!
//! The protocol has a few rules that the hardware does not enforce:
//!
//! * A command may only be written once the previous one was accepted. [`Phy::command`] waits for
//!   that; [`Phy::fifo`] doesn't and asserts it instead.
//! * The end-cause is read exactly once per task, after the task-done flag is set.
//! * Channels, sync word, CRC init, and the white list must not be changed while a task runs.
//!
//! Violations are caught by debug assertions.
//!
//! [`Command`]: enum.Command.html
//! [`EndCause`]: enum.EndCause.html
//! [`Phy::command`]: struct.Phy.html#method.command
//! [`Phy::fifo`]: struct.Phy.html#method.fifo

mod address;
mod channel;
pub mod ffi;
pub mod fifo;
mod white_list;

pub use {
    self::address::{AddressKind, DeviceAddress},
    self::channel::{AdvChannelMap, ChannelHopper, ChannelMap, DataChannel},
    self::fifo::{Fifo, FifoOp, FIFO_SIZE},
    self::white_list::{FilterPolicy, WhiteListError, WHITE_LIST_SLOTS},
};

use {
    crate::{utils::Hex, Error, Fatal},
    bitflags::bitflags,
    byteorder::{ByteOrder, LittleEndian},
};

/// Value of the command register once the coprocessor has accepted the last command.
pub const COMMAND_IDLE: u8 = 0x00;

enum_with_unknown! {
    /// Commands accepted by the coprocessor.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Command(u8) {
        /// Ends the running task. The task ends with [`EndCause::Abort`].
        ///
        /// [`EndCause::Abort`]: enum.EndCause.html#variant.Abort
        Shutdown = 0x01,
        DemodTest = 0x02,
        RxTest = 0x03,
        TxTest = 0x04,
        TxFifoTest = 0x05,
        /// Raw reception.
        Rx = 0x08,
        /// Raw transmission.
        Tx = 0x09,
        /// Like `Shutdown`, but lets the current packet finish.
        Abort = 0x0B,
        Slave = 0x10,
        Master = 0x11,
        Advertiser = 0x12,
        Scanner = 0x13,
        Initiator = 0x14,
        /// Triggers timer event 1 from software.
        SendEvent1 = 0x21,
        /// Triggers timer event 2 from software.
        SendEvent2 = 0x22,
        /// Placeholder for "no command". Never written to the hardware.
        Invalid = 0xFF,
    }
}

impl Command {
    /// Returns whether this command starts a radio task.
    pub fn starts_task(&self) -> bool {
        match self {
            Command::DemodTest
            | Command::RxTest
            | Command::TxTest
            | Command::TxFifoTest
            | Command::Rx
            | Command::Tx
            | Command::Slave
            | Command::Master
            | Command::Advertiser
            | Command::Scanner
            | Command::Initiator => true,
            _ => false,
        }
    }
}

enum_with_unknown! {
    /// Reason a radio task ended.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum EndCause(u8) {
        /// The task ended normally.
        Success = 0x00,
        /// Nothing was received before the RX timeout.
        RxTimeout = 0x01,
        /// No sync word was detected.
        NoSync = 0x02,
        /// A packet was received with a CRC error.
        RxError = 0x03,
        /// A connection request was received (advertiser) or sent (initiator).
        Connect = 0x04,
        /// The maximum number of unacknowledged retransmissions was reached.
        MaxNack = 0x05,
        /// The task was ended by `Shutdown` or `Abort`.
        Abort = 0x06,
        TaskErrInternal = 0xFF,
        TaskErrCommand = 0xFE,
        TaskErrSemaphore = 0xFD,
        TaskErrParameter = 0xFC,
    }
}

impl EndCause {
    /// Returns whether this end-cause signals an internal coprocessor error.
    ///
    /// The coprocessor's state is unknown after one of these, so the only way forward is a reset.
    pub fn is_fatal(&self) -> bool {
        match self {
            EndCause::TaskErrInternal
            | EndCause::TaskErrCommand
            | EndCause::TaskErrSemaphore
            | EndCause::TaskErrParameter => true,
            _ => false,
        }
    }
}

bitflags! {
    /// Bits of the task status register.
    pub struct TaskStatus: u8 {
        /// The last task has ended and its end-cause is available. Writing 0 clears it.
        const DONE = 1 << 0;
    }
}

/// Packet counters maintained by the coprocessor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Packets received with a valid CRC.
    RxOk,
    /// Packets received with a CRC error.
    RxCrcError,
    /// Packets received but discarded (filtered or no space in the RX FIFO).
    RxIgnored,
    /// Packets transmitted.
    Tx,
}

/// Coprocessor registers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PhyReg {
    /// Command register (see [`Command`] and [`Fifo`]).
    ///
    /// [`Command`]: enum.Command.html
    /// [`Fifo`]: enum.Fifo.html
    Command,
    /// Task status (see [`TaskStatus`]).
    ///
    /// [`TaskStatus`]: struct.TaskStatus.html
    Status,
    /// End-cause of the last task.
    EndCause,
    /// Advertising channels (see [`AdvChannelMap`]).
    ///
    /// [`AdvChannelMap`]: struct.AdvChannelMap.html
    AdvChannelMap,
    /// Data channel index for the next connection event or raw task.
    DataChannel,
    /// Access address, bytes 0..=3.
    SyncWord(u8),
    /// CRC initialization value, bytes 0..=2.
    CrcInit(u8),
    /// Number of unacknowledged retransmissions after which a task ends with `MaxNack`.
    MaxNack,
    /// White list usage per role (see [`FilterPolicy`]).
    ///
    /// [`FilterPolicy`]: struct.FilterPolicy.html
    WhiteListPolicy,
    /// One bit per white list slot, set if the slot is in use.
    WhiteListValid,
    /// One bit per white list slot, set if the slot holds a random address.
    WhiteListRandom,
    /// Address bytes 0..=5 of a white list slot.
    WhiteListEntry { slot: u8, byte: u8 },
    /// A packet counter. Writing any value resets it.
    Counter(Counter),
    /// TX FIFO data port. Writes append one byte.
    TxFifoData,
    /// RX FIFO data port. Reads remove one byte.
    RxFifoData,
    /// Number of bytes in the TX FIFO.
    TxFifoCount,
    /// Number of bytes in the RX FIFO.
    RxFifoCount,
}

/// Byte-level access to the coprocessor registers.
pub trait PhyRegs {
    fn read(&mut self, reg: PhyReg) -> u8;
    fn write(&mut self, reg: PhyReg, value: u8);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TaskState {
    Idle,
    Running,
}

/// Driver for the radio coprocessor.
///
/// This is the only code that may write the coprocessor's registers.
pub struct Phy<R: PhyRegs> {
    regs: R,
    task: TaskState,
    poll_limit: Option<u32>,
    white_list: [Option<DeviceAddress>; WHITE_LIST_SLOTS],
}

impl<R: PhyRegs> Phy<R> {
    /// Creates a driver. The coprocessor must be idle, with no task running.
    pub fn new(regs: R) -> Self {
        Self {
            regs,
            task: TaskState::Idle,
            poll_limit: None,
            white_list: [None; WHITE_LIST_SLOTS],
        }
    }

    /// Provides access to the raw registers. Use with caution.
    pub fn regs(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Bounds the number of polls of the command register.
    ///
    /// By default (`None`), [`command`] and [`wait_idle`] spin forever: a coprocessor that stops
    /// accepting commands is broken and there is nothing to recover. Host-side simulations set a
    /// limit so that a lockup ends in `Fatal::CoprocessorLockup` instead of a hang.
    ///
    /// [`command`]: #method.command
    /// [`wait_idle`]: #method.wait_idle
    pub fn set_poll_limit(&mut self, limit: Option<u32>) {
        self.poll_limit = limit;
    }

    /// Returns whether the coprocessor has not yet accepted the last command.
    pub fn is_busy(&mut self) -> bool {
        self.regs.read(PhyReg::Command) != COMMAND_IDLE
    }

    /// Waits until the coprocessor has accepted the last command.
    pub fn wait_idle(&mut self) -> Result<(), Fatal> {
        let mut polls = 0u32;
        while self.is_busy() {
            polls += 1;
            if let Some(limit) = self.poll_limit {
                if polls >= limit {
                    error!("phy: command not accepted after {} polls", polls);
                    return Err(Fatal::CoprocessorLockup);
                }
            }
        }
        Ok(())
    }

    /// Issues a command, waiting for the previous one to be accepted first.
    ///
    /// `Command::Invalid` only waits and writes nothing.
    pub fn command(&mut self, cmd: Command) -> Result<(), Fatal> {
        self.wait_idle()?;
        if cmd == Command::Invalid {
            return Ok(());
        }

        if cmd.starts_task() {
            debug_assert_eq!(
                self.task,
                TaskState::Idle,
                "{:?} issued while a task is running",
                cmd
            );
            self.task = TaskState::Running;
            debug!("phy: start {:?}", cmd);
        } else {
            trace!("phy: {:?}", cmd);
        }
        self.regs.write(PhyReg::Command, cmd.raw());
        Ok(())
    }

    /// Returns whether a task was started and its end-cause has not been read yet.
    pub fn is_task_running(&self) -> bool {
        self.task == TaskState::Running
    }

    /// Returns whether the coprocessor has flagged the end of the current task.
    pub fn is_task_done(&mut self) -> bool {
        TaskStatus::from_bits_truncate(self.regs.read(PhyReg::Status)).contains(TaskStatus::DONE)
    }

    /// Reads the end-cause of the task that just ended and clears the task-done flag.
    ///
    /// Must be called exactly once per task, after the task-done flag is set.
    pub fn read_end_cause(&mut self) -> EndCause {
        debug_assert_eq!(
            self.task,
            TaskState::Running,
            "end-cause read without a running task"
        );
        debug_assert!(self.is_task_done(), "end-cause read before task-done");

        let cause = EndCause::from(self.regs.read(PhyReg::EndCause));
        self.regs.write(PhyReg::Status, 0);
        self.task = TaskState::Idle;

        if cause.is_fatal() {
            error!("phy: task failed with {:?}", cause);
        } else if cause.is_unknown() {
            warn!("phy: unknown end-cause {:?}", Hex(cause.raw()));
        } else {
            debug!("phy: task ended: {:?}", cause);
        }
        cause
    }

    /// Reads the end-cause like [`read_end_cause`], turning internal errors into `Fatal`.
    ///
    /// [`read_end_cause`]: #method.read_end_cause
    pub fn finish_task(&mut self) -> Result<EndCause, Fatal> {
        let cause = self.read_end_cause();
        if cause.is_fatal() {
            Err(Fatal::Task(cause))
        } else {
            Ok(cause)
        }
    }

    /// Selects the advertising channels used by the advertiser, scanner, and initiator.
    pub fn set_adv_channels(&mut self, map: AdvChannelMap) {
        self.assert_reconfigurable();
        self.regs.write(PhyReg::AdvChannelMap, map.bits());
    }

    /// Selects the data channel for the next task.
    pub fn set_data_channel(&mut self, channel: DataChannel) {
        self.assert_reconfigurable();
        self.regs.write(PhyReg::DataChannel, channel.index());
    }

    /// Sets the access address used as the sync word.
    pub fn set_sync_word(&mut self, access_address: u32) {
        self.assert_reconfigurable();
        let mut raw = [0; 4];
        LittleEndian::write_u32(&mut raw, access_address);
        for (i, b) in raw.iter().enumerate() {
            self.regs.write(PhyReg::SyncWord(i as u8), *b);
        }
    }

    /// Sets the 24-bit CRC initialization value.
    pub fn set_crc_init(&mut self, crc_init: u32) {
        self.assert_reconfigurable();
        let mut raw = [0; 3];
        LittleEndian::write_u24(&mut raw, crc_init & 0xFF_FFFF);
        for (i, b) in raw.iter().enumerate() {
            self.regs.write(PhyReg::CrcInit(i as u8), *b);
        }
    }

    /// Sets the number of unacknowledged retransmissions that ends a task.
    pub fn set_max_nack(&mut self, max_nack: u8) {
        self.assert_reconfigurable();
        self.regs.write(PhyReg::MaxNack, max_nack);
    }

    /// Selects which roles filter peers through the white list.
    pub fn set_filter_policy(&mut self, policy: FilterPolicy) {
        self.assert_reconfigurable();
        self.regs.write(PhyReg::WhiteListPolicy, policy.bits());
    }

    /// Reads a packet counter.
    pub fn counter(&mut self, counter: Counter) -> u8 {
        self.regs.read(PhyReg::Counter(counter))
    }

    /// Resets all packet counters to 0.
    pub fn reset_counters(&mut self) {
        for &c in &[Counter::RxOk, Counter::RxCrcError, Counter::RxIgnored, Counter::Tx] {
            self.regs.write(PhyReg::Counter(c), 0);
        }
    }

    /// Appends `data` to the TX FIFO.
    ///
    /// The data is owned by the firmware until committed with `FifoOp::Commit`.
    pub fn push_tx(&mut self, data: &[u8]) -> Result<(), Error> {
        let used = usize::from(self.regs.read(PhyReg::TxFifoCount));
        if used + data.len() > FIFO_SIZE {
            return Err(Error::FifoFull);
        }
        for b in data {
            self.regs.write(PhyReg::TxFifoData, *b);
        }
        Ok(())
    }

    /// Returns the number of bytes waiting in the RX FIFO.
    pub fn rx_len(&mut self) -> usize {
        usize::from(self.regs.read(PhyReg::RxFifoCount))
    }

    /// Reads up to `buf.len()` bytes from the RX FIFO and returns the number of bytes read.
    pub fn pop_rx(&mut self, buf: &mut [u8]) -> usize {
        let n = self.rx_len().min(buf.len());
        for b in &mut buf[..n] {
            *b = self.regs.read(PhyReg::RxFifoData);
        }
        n
    }

    fn assert_reconfigurable(&self) {
        debug_assert_eq!(
            self.task,
            TaskState::Idle,
            "coprocessor reconfigured while a task is running"
        );
    }
}
