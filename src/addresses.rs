//! Maps a frame's up-to-four address fields to semantic roles according to
//! its DS-addressing mode, then drops addresses that can never identify a
//! device (broadcast, null, reserved multicast ranges, configured denylist).

use crate::frame::Frame;
use crate::models::Mac;
use std::collections::{BTreeSet, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressRole {
    Source,
    Destination,
    Bssid,
    Transmitter,
    Receiver,
}

/// The resolved role → MAC mapping for one frame. Roles whose address field
/// was absent or filtered out are simply not present.
#[derive(Debug, Default)]
pub struct ResolvedAddresses {
    entries: Vec<(AddressRole, Mac)>,
}

impl ResolvedAddresses {
    pub fn get(&self, role: AddressRole) -> Option<Mac> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, mac)| *mac)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AddressRole, Mac)> + '_ {
        self.entries.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The distinct device MACs this frame touches, in canonical order.
    pub fn macs(&self) -> BTreeSet<Mac> {
        self.entries.iter().map(|(_, mac)| *mac).collect()
    }
}

/// Decides which MACs may become stations or connection endpoints. Pure and
/// total: broadcast, all-zero, reserved multicast prefixes, and explicitly
/// denylisted addresses are all rejected.
#[derive(Debug, Default)]
pub struct AddressFilter {
    denied: HashSet<Mac>,
}

// IPv4 multicast, IPv6 multicast, 802.1D/802.1Q reserved.
const RESERVED_PREFIXES: &[&[u8]] = &[&[0x01, 0x00, 0x5e], &[0x33, 0x33], &[0x01, 0x80, 0xc2]];

impl AddressFilter {
    pub fn new(denied: impl IntoIterator<Item = Mac>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }

    pub fn is_device(&self, mac: Mac) -> bool {
        if mac == Mac::BROADCAST || mac == Mac::NULL {
            return false;
        }
        if RESERVED_PREFIXES
            .iter()
            .any(|prefix| mac.0.starts_with(prefix))
        {
            return false;
        }
        !self.denied.contains(&mac)
    }
}

/// Applies the DS-mode resolution table:
///
/// | to_ds | from_ds | addr1       | addr2       | addr3       | addr4  |
/// |-------|---------|-------------|-------------|-------------|--------|
/// | 1     | 1       | receiver    | transmitter | destination | source |
/// | 1     | 0       | BSSID       | source      | destination | —      |
/// | 0     | 1       | destination | BSSID       | source      | —      |
/// | 0     | 0       | destination | source      | BSSID       | —      |
pub fn resolve(frame: &Frame<'_>, filter: &AddressFilter) -> ResolvedAddresses {
    use AddressRole::*;

    let roles: [(AddressRole, Option<Mac>); 4] = match (frame.to_ds, frame.from_ds) {
        (true, true) => [
            (Receiver, frame.addr1),
            (Transmitter, frame.addr2),
            (Destination, frame.addr3),
            (Source, frame.addr4),
        ],
        (true, false) => [
            (Bssid, frame.addr1),
            (Source, frame.addr2),
            (Destination, frame.addr3),
            (Source, None),
        ],
        (false, true) => [
            (Destination, frame.addr1),
            (Bssid, frame.addr2),
            (Source, frame.addr3),
            (Source, None),
        ],
        (false, false) => [
            (Destination, frame.addr1),
            (Source, frame.addr2),
            (Bssid, frame.addr3),
            (Source, None),
        ],
    };

    let mut resolved = ResolvedAddresses::default();
    for (role, mac) in roles {
        if let Some(mac) = mac {
            if filter.is_device(mac) && !resolved.entries.iter().any(|(r, _)| *r == role) {
                resolved.entries.push((role, mac));
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::build;
    use crate::models::parse_mac;

    fn mac(s: &str) -> Mac {
        parse_mac(s).unwrap()
    }

    fn resolve_data(to_ds: bool, from_ds: bool, a1: &str, a2: &str, a3: &str) -> ResolvedAddresses {
        let bytes = build::data_frame(to_ds, from_ds, mac(a1), mac(a2), mac(a3));
        let frame = Frame::parse(&bytes).unwrap();
        resolve(&frame, &AddressFilter::default())
    }

    #[test]
    fn infrastructure_to_ds() {
        let r = resolve_data(
            true,
            false,
            "aa:aa:aa:aa:aa:aa",
            "bb:bb:bb:bb:bb:bb",
            "cc:cc:cc:cc:cc:cc",
        );
        assert_eq!(r.get(AddressRole::Bssid), Some(mac("aa:aa:aa:aa:aa:aa")));
        assert_eq!(r.get(AddressRole::Source), Some(mac("bb:bb:bb:bb:bb:bb")));
        assert_eq!(
            r.get(AddressRole::Destination),
            Some(mac("cc:cc:cc:cc:cc:cc"))
        );
    }

    #[test]
    fn infrastructure_from_ds() {
        let r = resolve_data(
            false,
            true,
            "aa:aa:aa:aa:aa:aa",
            "bb:bb:bb:bb:bb:bb",
            "cc:cc:cc:cc:cc:cc",
        );
        assert_eq!(
            r.get(AddressRole::Destination),
            Some(mac("aa:aa:aa:aa:aa:aa"))
        );
        assert_eq!(r.get(AddressRole::Bssid), Some(mac("bb:bb:bb:bb:bb:bb")));
        assert_eq!(r.get(AddressRole::Source), Some(mac("cc:cc:cc:cc:cc:cc")));
    }

    #[test]
    fn ad_hoc_mode() {
        let r = resolve_data(
            false,
            false,
            "aa:aa:aa:aa:aa:aa",
            "bb:bb:bb:bb:bb:bb",
            "cc:cc:cc:cc:cc:cc",
        );
        assert_eq!(
            r.get(AddressRole::Destination),
            Some(mac("aa:aa:aa:aa:aa:aa"))
        );
        assert_eq!(r.get(AddressRole::Source), Some(mac("bb:bb:bb:bb:bb:bb")));
        assert_eq!(r.get(AddressRole::Bssid), Some(mac("cc:cc:cc:cc:cc:cc")));
    }

    #[test]
    fn wds_four_address_mode() {
        // Fixture MACs must stay clear of the reserved multicast prefixes
        // (a 33:33-prefixed destination would be filtered, not resolved).
        let bytes = build::wds_frame(
            mac("11:11:11:11:11:11"),
            mac("22:22:22:22:22:22"),
            mac("35:35:35:35:35:35"),
            mac("44:44:44:44:44:44"),
        );
        let frame = Frame::parse(&bytes).unwrap();
        let r = resolve(&frame, &AddressFilter::default());
        assert_eq!(r.get(AddressRole::Receiver), Some(mac("11:11:11:11:11:11")));
        assert_eq!(
            r.get(AddressRole::Transmitter),
            Some(mac("22:22:22:22:22:22"))
        );
        assert_eq!(
            r.get(AddressRole::Destination),
            Some(mac("35:35:35:35:35:35"))
        );
        assert_eq!(r.get(AddressRole::Source), Some(mac("44:44:44:44:44:44")));
        assert_eq!(r.get(AddressRole::Bssid), None);
    }

    #[test]
    fn broadcast_and_null_are_filtered() {
        let r = resolve_data(
            true,
            false,
            "aa:aa:aa:aa:aa:aa",
            "00:00:00:00:00:00",
            "ff:ff:ff:ff:ff:ff",
        );
        assert_eq!(r.get(AddressRole::Source), None);
        assert_eq!(r.get(AddressRole::Destination), None);
        assert_eq!(r.get(AddressRole::Bssid), Some(mac("aa:aa:aa:aa:aa:aa")));
    }

    #[test]
    fn reserved_multicast_prefixes_are_filtered() {
        let filter = AddressFilter::default();
        assert!(!filter.is_device(mac("01:00:5e:00:00:01")));
        assert!(!filter.is_device(mac("33:33:00:00:00:02")));
        assert!(!filter.is_device(mac("01:80:c2:00:00:00")));
        assert!(filter.is_device(mac("aa:bb:cc:dd:ee:ff")));
    }

    #[test]
    fn denylisted_mac_is_filtered() {
        let filter = AddressFilter::new([mac("de:ad:be:ef:00:01")]);
        assert!(!filter.is_device(mac("de:ad:be:ef:00:01")));
        assert!(filter.is_device(mac("de:ad:be:ef:00:02")));
    }
}
