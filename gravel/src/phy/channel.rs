//! RF channel indices and channel maps.
//!
//! BLE data is transmitted on 40 different RF channels numbered from 0 to 39 with ascending
//! frequencies. Channels 0, 12 and 39 are reserved for advertising, all others are used for data
//! transmission. BLE internally uses so-called "Channel Indices" which reorder the RF channels so
//! that indices 0..=36 refer to data channels and 37..=39 refer to the advertising channels. The
//! coprocessor is programmed with channel indices, so only those are implemented here.

use {crate::Error, bitflags::bitflags, core::fmt};

/// One of 37 data channels on which data channel PDUs are sent between connected devices.
///
/// (channel indices 0..=36)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataChannel(u8);

impl DataChannel {
    /// Creates a `DataChannel` from a raw index.
    ///
    /// # Panics
    ///
    /// This will panic if `index` is not a valid data channel index. Valid indices are 0..=36.
    pub fn new(index: u8) -> Self {
        assert!(index <= 36);
        DataChannel(index)
    }

    /// Returns the data channel index.
    ///
    /// The returned value is always in range 0..=36.
    pub fn index(&self) -> u8 {
        self.0
    }
}

bitflags! {
    /// Advertising channels used by the advertiser, scanner and initiator roles.
    ///
    /// This is the raw value of the coprocessor's advertising channel register.
    pub struct AdvChannelMap: u8 {
        const CH37 = 1 << 0;
        const CH38 = 1 << 1;
        const CH39 = 1 << 2;
    }
}

/// A map marking data channels as used or unused.
///
/// A channel map must mark at least 2 channels as used.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    raw: [u8; 5],
    num_used_channels: u8,
}

impl ChannelMap {
    /// Create a new channel map from its raw format (`ChM`).
    ///
    /// The first byte (LSB) contains flags for data channels 0 to 7, where the least significant
    /// bit is the flag for channel 0, and so on.
    ///
    /// Since there are only 37 data channels, but 40 bits in the 5 Bytes, the 3 most significant
    /// bits in the last Byte of `raw` are considered reserved for future use (RFU) and are ignored
    /// by this function.
    pub fn from_raw(mut raw: [u8; 5]) -> Self {
        raw[4] &= 0b11111; // clear RFU bits
        Self {
            raw,
            num_used_channels: raw.iter().map(|b| b.count_ones() as u8).sum(),
        }
    }

    /// Creates a new channel map that marks all data channels as used.
    pub fn with_all_channels() -> Self {
        Self {
            raw: [0xff, 0xff, 0xff, 0xff, 0b11111],
            num_used_channels: 37,
        }
    }

    /// Returns the number of data channels marked as used by this map.
    pub fn num_used_channels(&self) -> u8 {
        self.num_used_channels
    }

    /// Returns whether the given data channel is marked as used.
    pub fn is_used(&self, channel: DataChannel) -> bool {
        let byte = self.raw[channel.index() as usize / 8];
        byte & (1 << (channel.index() % 8)) != 0
    }

    /// Returns an iterator over all data channels marked as used in this map.
    pub fn iter_used<'a>(&'a self) -> impl Iterator<Item = DataChannel> + 'a {
        self.raw
            .iter()
            .enumerate()
            .flat_map(move |(byteindex, byte)| {
                (0..8).filter_map(move |bitindex| {
                    if byte & (1 << bitindex) != 0 {
                        Some(DataChannel::new(byteindex as u8 * 8 + bitindex))
                    } else {
                        None
                    }
                })
            })
    }

    /// Returns the `n`th channel marked as used.
    ///
    /// # Panics
    ///
    /// This will panic when `n >= self.num_used_channels()`.
    pub fn by_index(&self, n: u8) -> DataChannel {
        self.iter_used()
            .nth(n.into())
            .expect("by_index: index out of bounds")
    }
}

impl fmt::Debug for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMap({} used, {:?})", self.num_used_channels, self.raw)
    }
}

/// Data channel hopping (Channel Selection Algorithm #1).
#[derive(Copy, Clone, Debug)]
pub struct ChannelHopper {
    map: ChannelMap,
    hop: u8,
    unmapped: DataChannel,
}

impl ChannelHopper {
    /// Creates a hopper starting before channel 0, so the first `next` call returns channel
    /// `hop` (remapped if unused).
    ///
    /// `hop` must be in range 5..=16 and `map` must have at least one used channel.
    pub fn new(map: ChannelMap, hop: u8) -> Result<Self, Error> {
        if hop < 5 || hop > 16 || map.num_used_channels() == 0 {
            return Err(Error::InvalidValue);
        }
        Ok(Self {
            map,
            hop,
            unmapped: DataChannel::new(0),
        })
    }

    /// Advances to the channel of the next connection event and returns it.
    pub fn next(&mut self) -> DataChannel {
        let unmapped = DataChannel::new((self.unmapped.index() + self.hop) % 37);
        self.unmapped = unmapped;
        if self.map.is_used(unmapped) {
            unmapped
        } else {
            // This channel isn't used, remap channel according to map
            let remapping_index = unmapped.index() % self.map.num_used_channels();
            self.map.by_index(remapping_index)
        }
    }
}
