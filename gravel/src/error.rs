use crate::phy::EndCause;
use core::fmt;

/// Errors returned by fallible configuration and scheduling operations.
///
/// Expected outcomes of normal operation (a denied power-off request, a full white list) are not
/// errors and are reported through their own enums instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid value supplied for a parameter (eg. an empty advertising channel map or a data
    /// channel index above 36).
    InvalidValue,

    /// The operation is not possible in the current Link-Layer state.
    ///
    /// This is returned when trying to start a radio role while another one is still active.
    InvalidState,

    /// The TX FIFO has no room for the data.
    FifoFull,

    /// A radio event was requested at a time that has already passed.
    EventInPast,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidValue => "invalid value for parameter",
            Error::InvalidState => "operation not allowed in current state",
            Error::FifoFull => "TX FIFO full",
            Error::EventInPast => "radio event scheduled in the past",
        })
    }
}

/// Unrecoverable conditions.
///
/// There is nothing the controller can do to recover from these, so they must be routed to the
/// application's reset path (eg. by letting the watchdog expire or by panicking into a resetting
/// panic handler).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Fatal {
    /// The coprocessor never accepted a command.
    CoprocessorLockup,

    /// A radio task ended with one of the internal error end-causes.
    Task(EndCause),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::CoprocessorLockup => f.write_str("radio coprocessor stopped accepting commands"),
            Fatal::Task(cause) => write!(f, "radio task failed: {:?}", cause),
        }
    }
}
