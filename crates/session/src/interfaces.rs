//! Per-link interface bookkeeping

use protocol::UsbError;
use std::fmt;

/// Interface numbers a link can track: `0..MAX_INTERFACES`
pub const MAX_INTERFACES: u8 = 32;

/// Validate an interface number
pub fn check_interface(iface: u8) -> Result<u8, UsbError> {
    if iface < MAX_INTERFACES {
        Ok(iface)
    } else {
        Err(UsbError::InvalidArgument)
    }
}

/// Fixed-size set of interface numbers in `[0, 31]`
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InterfaceSet(u32);

impl InterfaceSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// `iface` must be below [`MAX_INTERFACES`]; callers validate first.
    pub fn contains(&self, iface: u8) -> bool {
        iface < MAX_INTERFACES && self.0 & (1 << iface) != 0
    }

    /// Add `iface`. Numbers outside `[0, 31]` are ignored and return `false`.
    pub fn insert(&mut self, iface: u8) -> bool {
        if iface >= MAX_INTERFACES {
            return false;
        }
        self.0 |= 1 << iface;
        true
    }

    /// Remove `iface`. Numbers outside `[0, 31]` are never members.
    pub fn remove(&mut self, iface: u8) {
        if iface < MAX_INTERFACES {
            self.0 &= !(1 << iface);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn union(self, other: InterfaceSet) -> InterfaceSet {
        InterfaceSet(self.0 | other.0)
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_INTERFACES).filter(move |i| self.contains(*i))
    }
}

impl fmt::Debug for InterfaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u8> for InterfaceSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = InterfaceSet::empty();
        for iface in iter {
            set.insert(iface);
        }
        set
    }
}
