//! Hardware white list.
//!
//! The coprocessor filters peers against up to 8 device addresses. Each slot has a valid bit and
//! an address-type bit in two mask registers. The driver keeps a shadow copy of the slots, so
//! lookups never have to read back the address registers.

use {
    super::{DeviceAddress, Phy, PhyReg, PhyRegs},
    bitflags::bitflags,
    core::fmt,
};

/// Number of white list slots.
pub const WHITE_LIST_SLOTS: usize = 8;

/// Reasons a white list update failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WhiteListError {
    /// All slots are in use.
    Full,
    /// The list has no entries to remove.
    Empty,
    /// The address is not in the list.
    NotFound,
}

impl fmt::Display for WhiteListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WhiteListError::Full => "white list full",
            WhiteListError::Empty => "white list empty",
            WhiteListError::NotFound => "address not in white list",
        })
    }
}

bitflags! {
    /// Roles that only accept peers on the white list.
    pub struct FilterPolicy: u8 {
        /// Advertiser only answers scan requests from listed devices.
        const ADV_SCAN = 1 << 0;
        /// Advertiser only accepts connection requests from listed devices.
        const ADV_CONNECT = 1 << 1;
        /// Scanner only reports advertisements from listed devices.
        const SCANNER = 1 << 2;
        /// Initiator connects to any listed device instead of a single peer.
        const INITIATOR = 1 << 3;
    }
}

impl<R: PhyRegs> Phy<R> {
    /// Adds `address` to the white list.
    ///
    /// Adding an address that is already listed succeeds without using another slot.
    pub fn white_list_add(&mut self, address: DeviceAddress) -> Result<(), WhiteListError> {
        self.assert_reconfigurable();
        if self.white_list.contains(&Some(address)) {
            return Ok(());
        }
        let slot = self
            .white_list
            .iter()
            .position(Option::is_none)
            .ok_or(WhiteListError::Full)?;

        for (i, b) in address.raw().iter().enumerate() {
            self.regs.write(
                PhyReg::WhiteListEntry {
                    slot: slot as u8,
                    byte: i as u8,
                },
                *b,
            );
        }
        self.white_list[slot] = Some(address);
        self.write_white_list_masks();
        trace!("white list: {:?} -> slot {}", address, slot);
        Ok(())
    }

    /// Removes `address` from the white list.
    pub fn white_list_remove(&mut self, address: DeviceAddress) -> Result<(), WhiteListError> {
        self.assert_reconfigurable();
        if self.white_list_len() == 0 {
            return Err(WhiteListError::Empty);
        }
        let slot = self
            .white_list
            .iter()
            .position(|entry| *entry == Some(address))
            .ok_or(WhiteListError::NotFound)?;
        self.white_list[slot] = None;
        self.write_white_list_masks();
        trace!("white list: {:?} removed from slot {}", address, slot);
        Ok(())
    }

    /// Removes all entries from the white list.
    pub fn white_list_clear(&mut self) {
        self.assert_reconfigurable();
        self.white_list = [None; WHITE_LIST_SLOTS];
        self.write_white_list_masks();
    }

    /// Returns the number of addresses on the white list.
    pub fn white_list_len(&self) -> usize {
        self.white_list.iter().filter(|entry| entry.is_some()).count()
    }

    fn write_white_list_masks(&mut self) {
        let mut valid = 0u8;
        let mut random = 0u8;
        for (i, entry) in self.white_list.iter().enumerate() {
            if let Some(address) = entry {
                valid |= 1 << i;
                if address.is_random() {
                    random |= 1 << i;
                }
            }
        }
        self.regs.write(PhyReg::WhiteListValid, valid);
        self.regs.write(PhyReg::WhiteListRandom, random);
    }
}
