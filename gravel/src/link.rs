//! Link-Layer radio event scheduling.
//!
//! The Link-Layer decides *when* the coprocessor runs which task. Every role has a periodic
//! radio event:
//!
//! * Advertising events happen every `advInterval`, plus a pseudo-random `advDelay` of 0 to
//!   10 ms so that advertisers sharing an interval don't keep colliding.
//! * Scan windows are opened every scan interval.
//! * Connection events happen every `connInterval` after the *anchor point*, the time at which
//!   the radio last synchronized to the peer's packet. The anchor is captured by Timer2 in
//!   hardware, so drift between the two clocks is corrected on every event.
//!
//! The next event is programmed on Timer2 event channel 1. When it fires, the application calls
//! [`LinkLayer::on_timer_event`] from the timer interrupt, which starts the role's radio task.
//! When the coprocessor signals the end of the task, the application calls
//! [`LinkLayer::on_task_done`] from the radio interrupt, which reads the end-cause, reschedules,
//! and notifies the Link-Layer task through the scheduler.
//!
//! The `LinkLayer` also answers the power sequencer's questions (see [`RadioPower`]): whether
//! sleep is possible, how long until the radio needs to be awake again, and restarting the radio
//! clock after waking up.
//!
//! [`LinkLayer::on_timer_event`]: struct.LinkLayer.html#method.on_timer_event
//! [`LinkLayer::on_task_done`]: struct.LinkLayer.html#method.on_task_done
//! [`RadioPower`]: ../power/trait.RadioPower.html

use {
    crate::{
        config::Config,
        hal::{PowerMode, RadioClock},
        osal::Osal,
        phy::{AdvChannelMap, ChannelHopper, ChannelMap, Command, EndCause, Fifo, FifoOp, Phy},
        power::{PowerOffResult, RadioPower},
        sleep_timer::{coarse_to_sleep_ticks, sleep_ticks_to_duration, SleepTimer},
        time::{Duration, SysTime},
        timer2::{EventChannel, Timebase},
        Error, Fatal,
    },
    rand_core::RngCore,
};

/// Timer2 channel used for radio events.
const RADIO_EVENT: EventChannel = EventChannel::One;

/// Lead time between starting a role and its first radio event, in coarse ticks.
const FIRST_EVENT_DELAY: u32 = 2;

/// Upper bound of the random advertising delay.
const MAX_ADV_DELAY_MICROS: u32 = 10_000;

/// Role of the local device in a connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    fn command(&self) -> Command {
        match self {
            Role::Master => Command::Master,
            Role::Slave => Command::Slave,
        }
    }
}

/// Parameters of an established connection.
#[derive(Copy, Clone, Debug)]
pub struct ConnectionParams {
    pub role: Role,
    /// Access address, used as the sync word.
    pub access_address: u32,
    /// 24-bit CRC initialization value.
    pub crc_init: u32,
    /// Used data channels.
    pub channel_map: ChannelMap,
    /// Channel hop increment (5..=16).
    pub hop: u8,
    /// Connection interval (7.5 ms to 4 s).
    pub interval: Duration,
    /// Time of the first connection event.
    pub first_event: SysTime,
}

/// Link-Layer state machine.
enum State {
    /// Radio silence.
    Standby,

    Advertising {
        interval: Duration,
    },

    Scanning {
        interval: Duration,
    },

    Connection {
        role: Role,
        interval: Duration,
        hopper: ChannelHopper,
        /// Last anchor point (or the planned event time if the radio didn't sync).
        anchor: SysTime,
    },
}

/// Timer readings taken right before the radio timer was stopped for sleep.
struct SleepRecord {
    sleep_snapshot: u32,
    radio_time: SysTime,
}

/// The real-time part of the Link-Layer.
///
/// The `LinkLayer` owns the radio timer, the coprocessor, and the 32 MHz clock.
pub struct LinkLayer<C: Config> {
    timebase: Timebase<C::Timer2>,
    phy: Phy<C::Phy>,
    clock: C::Clock,
    rng: C::Rng,
    state: State,
    /// Scheduled, not yet started radio event.
    next_event: Option<SysTime>,
    /// Planned start of the event whose task is running.
    current_event: Option<SysTime>,
    sleep_record: Option<SleepRecord>,
}

impl<C: Config> LinkLayer<C> {
    /// Creates a Link-Layer in standby and starts the radio timer.
    ///
    /// The 32 MHz clock must be running and stable.
    pub fn new(timer2: C::Timer2, phy: C::Phy, clock: C::Clock, rng: C::Rng) -> Self {
        let mut timebase = Timebase::new(timer2);
        timebase.start(false);
        trace!("new LinkLayer");
        Self {
            timebase,
            phy: Phy::new(phy),
            clock,
            rng,
            state: State::Standby,
            next_event: None,
            current_event: None,
            sleep_record: None,
        }
    }

    /// Returns the radio timebase.
    pub fn timebase(&mut self) -> &mut Timebase<C::Timer2> {
        &mut self.timebase
    }

    /// Returns the coprocessor driver, eg. for FIFO access or white list configuration.
    pub fn phy(&mut self) -> &mut Phy<C::Phy> {
        &mut self.phy
    }

    /// Returns the time of the next scheduled radio event.
    pub fn next_event(&self) -> Option<SysTime> {
        self.next_event
    }

    /// Returns the last anchor point of the current connection.
    pub fn connection_anchor(&self) -> Option<SysTime> {
        match self.state {
            State::Connection { anchor, .. } => Some(anchor),
            _ => None,
        }
    }

    pub fn is_standby(&self) -> bool {
        match self.state {
            State::Standby => true,
            _ => false,
        }
    }

    /// Starts advertising.
    ///
    /// If `timeout_ms` is given, `C::LL_EVT_ADV_TIMEOUT` is scheduled for the Link-Layer task after
    /// that many milliseconds; the task is expected to call `stop` when it arrives.
    pub fn start_advertising(
        &mut self,
        interval: Duration,
        channels: AdvChannelMap,
        timeout_ms: Option<u32>,
        osal: &mut C::Osal,
    ) -> Result<(), Error> {
        self.check_standby()?;
        if interval < Duration::from_millis(20)
            || interval > Duration::from_micros(10_240_000)
            || channels.is_empty()
        {
            return Err(Error::InvalidValue);
        }

        self.phy.set_adv_channels(channels);
        self.state = State::Advertising { interval };
        let first = self.timebase.now() + Duration::from_coarse(FIRST_EVENT_DELAY);
        self.schedule(first);
        if let Some(ms) = timeout_ms {
            osal.schedule_timer(C::LL_TASK_ID, C::LL_EVT_ADV_TIMEOUT, ms);
        }
        debug!("advertising every {}, first at {}", interval, first);
        Ok(())
    }

    /// Starts scanning, opening a scan window every `interval`.
    pub fn start_scanning(
        &mut self,
        interval: Duration,
        channels: AdvChannelMap,
    ) -> Result<(), Error> {
        self.check_standby()?;
        if interval < Duration::from_micros(2_500)
            || interval > Duration::from_micros(10_240_000)
            || channels.is_empty()
        {
            return Err(Error::InvalidValue);
        }

        self.phy.set_adv_channels(channels);
        self.state = State::Scanning { interval };
        let first = self.timebase.now() + Duration::from_coarse(FIRST_EVENT_DELAY);
        self.schedule(first);
        debug!("scanning every {}, first at {}", interval, first);
        Ok(())
    }

    /// Enters a connection, with the first connection event at `params.first_event`.
    pub fn start_connection(&mut self, params: ConnectionParams) -> Result<(), Error> {
        self.check_standby()?;
        if params.interval < Duration::from_micros(7_500)
            || params.interval > Duration::from_millis(4_000)
            || params.channel_map.num_used_channels() < 2
        {
            return Err(Error::InvalidValue);
        }
        let hopper = ChannelHopper::new(params.channel_map, params.hop)?;
        if !self.timebase.now().is_before(params.first_event) {
            return Err(Error::EventInPast);
        }

        self.phy.set_sync_word(params.access_address);
        self.phy.set_crc_init(params.crc_init);
        self.state = State::Connection {
            role: params.role,
            interval: params.interval,
            hopper,
            anchor: params.first_event,
        };
        self.schedule(params.first_event);
        info!(
            "{:?} connection every {}, first at {}",
            params.role, params.interval, params.first_event
        );
        Ok(())
    }

    /// Stops all radio activity and enters standby.
    ///
    /// A running task is shut down; it ends with `EndCause::Abort`, which still has to be
    /// collected through `on_task_done`.
    pub fn stop(&mut self) -> Result<(), Fatal> {
        self.timebase.disable_event(RADIO_EVENT);
        self.next_event = None;
        self.state = State::Standby;
        if self.phy.is_task_running() {
            self.phy.command(Command::Shutdown)?;
        }
        debug!("standby");
        Ok(())
    }

    /// Handles the radio event timer. Call this from the Timer2 interrupt.
    ///
    /// Starts the radio task of the current role.
    pub fn on_timer_event(&mut self) -> Result<(), Fatal> {
        if !self.timebase.is_event_pending(RADIO_EVENT) {
            return Ok(());
        }
        self.timebase.acknowledge_event(RADIO_EVENT);

        if self.phy.is_task_running() {
            // The previous task overran into this event. `on_task_done` reschedules.
            warn!("radio event at {:?} overrun", self.next_event);
            self.next_event = None;
            return Ok(());
        }

        let cmd = match &mut self.state {
            State::Standby => return Ok(()),
            State::Advertising { .. } => Command::Advertiser,
            State::Scanning { .. } => Command::Scanner,
            State::Connection { role, hopper, .. } => {
                let channel = hopper.next();
                self.phy.set_data_channel(channel);
                role.command()
            }
        };
        self.current_event = self.next_event.take();
        self.phy.command(cmd)
    }

    /// Handles the end of a radio task. Call this from the radio interrupt once the coprocessor
    /// flags task-done.
    ///
    /// The radio interrupt can end an idle period, so it has to report itself through
    /// `power::wake_from_isr` with `WakeSource::Radio` before calling this.
    ///
    /// Reads the end-cause, schedules the next radio event, and posts `C::LL_EVT_TASK_DONE` to the
    /// Link-Layer task. Internal coprocessor errors are returned as `Fatal`.
    pub fn on_task_done(&mut self, osal: &mut C::Osal) -> Result<EndCause, Fatal> {
        let cause = self.phy.finish_task()?;
        let started = self.current_event.take();
        let synced = match cause {
            EndCause::NoSync | EndCause::RxTimeout | EndCause::Abort => false,
            _ => true,
        };

        if let State::Advertising { .. } = self.state {
            if cause == EndCause::Connect {
                debug!("advertiser received connection request");
                self.state = State::Standby;
            }
        }

        let base = match started {
            None => None,
            Some(start) => match &mut self.state {
                State::Standby => None,
                State::Connection { anchor, .. } => {
                    *anchor = if synced {
                        self.timebase.capture_anchor()
                    } else {
                        start
                    };
                    Some(*anchor)
                }
                _ => Some(start),
            },
        };
        if let Some(base) = base {
            self.reschedule(base);
        }

        osal.post_event(C::LL_TASK_ID, C::LL_EVT_TASK_DONE);
        Ok(cause)
    }

    fn check_standby(&self) -> Result<(), Error> {
        if self.is_standby() && !self.phy.is_task_running() {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    fn interval(&self) -> Option<Duration> {
        match self.state {
            State::Standby => None,
            State::Advertising { interval }
            | State::Scanning { interval }
            | State::Connection { interval, .. } => Some(interval),
        }
    }

    /// Schedules the event following the one that started at `last`.
    fn reschedule(&mut self, last: SysTime) {
        let interval = match self.interval() {
            Some(interval) => interval,
            None => return,
        };
        let delay = match self.state {
            State::Advertising { .. } => {
                Duration::from_micros(self.rng.next_u32() % (MAX_ADV_DELAY_MICROS + 1))
            }
            _ => Duration::ZERO,
        };
        self.schedule_at_or_after(last + interval + delay);
    }

    /// Schedules the event at `at`, skipping whole intervals until it lies in the future.
    fn schedule_at_or_after(&mut self, mut at: SysTime) {
        let interval = match self.interval() {
            Some(interval) => interval,
            None => return,
        };
        let now = self.timebase.now();
        let mut skipped = 0u32;
        while !now.is_before(at) {
            at += interval;
            if let State::Connection { hopper, .. } = &mut self.state {
                // missed connection events still consume their channel
                hopper.next();
            }
            skipped += 1;
        }
        if skipped != 0 {
            warn!("skipped {} radio events", skipped);
        }
        self.schedule(at);
    }

    fn schedule(&mut self, at: SysTime) {
        self.next_event = Some(at);
        self.timebase.program_event(RADIO_EVENT, at);
    }
}

impl<C: Config> RadioPower<C::SleepTimer> for LinkLayer<C> {
    fn power_off_request(
        &mut self,
        mode: PowerMode,
        sleep_timer: &mut SleepTimer<C::SleepTimer>,
    ) -> PowerOffResult {
        if mode == PowerMode::Idle {
            // clocks keep running
            return PowerOffResult::Allowed;
        }
        if self.phy.is_task_running() {
            debug!("sleep denied: radio task running");
            return PowerOffResult::Denied;
        }
        if let Some(next) = self.next_event {
            if mode == PowerMode::Deep {
                debug!("deep sleep denied: radio event pending");
                return PowerOffResult::Denied;
            }
            let now = self.timebase.now();
            if !now.is_before(next)
                || next.duration_since(now) < Duration::from_coarse(C::RADIO_GUARD_COARSE)
            {
                debug!("sleep denied: radio event at {} imminent", next);
                return PowerOffResult::Denied;
            }
        }

        self.sleep_record = Some(SleepRecord {
            sleep_snapshot: sleep_timer.snapshot(),
            radio_time: self.timebase.now(),
        });
        self.timebase.stop();
        self.clock.stop_xosc();
        PowerOffResult::Allowed
    }

    fn power_on_request(
        &mut self,
        was_deep_sleep: bool,
        expect_radio_event: bool,
        sleep_timer: &mut SleepTimer<C::SleepTimer>,
    ) -> Result<(), Fatal> {
        self.clock.start_xosc();
        while !self.clock.is_xosc_stable() {
            core::hint::spin_loop();
        }

        if let Some(record) = self.sleep_record.take() {
            // The sleep timer stops in deep sleep, but deep sleep is only allowed without a
            // scheduled radio event, so the radio time may simply resume where it stopped.
            let slept = if was_deep_sleep {
                Duration::ZERO
            } else {
                sleep_ticks_to_duration(sleep_timer.elapsed_since(record.sleep_snapshot))
            };
            self.timebase.load(record.radio_time + slept);
            self.timebase.start(true);
            debug!("radio timer resumed after {}", slept);
        }

        if was_deep_sleep {
            self.phy.wait_idle()?;
            self.phy.fifo(Fifo::Both, FifoOp::Reset);
        }

        match self.next_event {
            Some(next) => self.schedule_at_or_after(next),
            None if expect_radio_event => warn!("woke up for a radio event, but none is scheduled"),
            None => {}
        }
        Ok(())
    }

    fn time_to_next_radio_event(
        &mut self,
        sleep_timer: &mut SleepTimer<C::SleepTimer>,
    ) -> (u32, u32) {
        let snapshot = sleep_timer.snapshot();
        let ticks = match self.next_event {
            None => 0,
            Some(next) => {
                let now = self.timebase.now();
                if now.is_before(next) {
                    coarse_to_sleep_ticks(next.duration_since(now).coarse())
                        .saturating_sub(C::RADIO_WAKEUP_TICKS)
                        .max(1)
                } else {
                    1
                }
            }
        };
        (snapshot, ticks)
    }
}
