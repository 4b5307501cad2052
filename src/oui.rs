use crate::models::Mac;

/// Best-effort manufacturer lookup from the MAC OUI prefix. The table covers
/// a handful of common vendors; anything else resolves to `None` and the
/// station row simply carries no manufacturer.
static OUI_TABLE: &[([u8; 3], &str)] = &[
    ([0x00, 0x03, 0x93], "Apple"),
    ([0x00, 0x17, 0xf2], "Apple"),
    ([0xf0, 0x18, 0x98], "Apple"),
    ([0x00, 0x1a, 0x11], "Google"),
    ([0xf4, 0xf5, 0xd8], "Google"),
    ([0x00, 0x15, 0x99], "Samsung"),
    ([0x8c, 0x77, 0x12], "Samsung"),
    ([0x00, 0x1d, 0x7e], "Cisco-Linksys"),
    ([0x00, 0x40, 0x96], "Cisco"),
    ([0x00, 0x14, 0x6c], "Netgear"),
    ([0xa0, 0x40, 0xa0], "Netgear"),
    ([0x00, 0x1d, 0x0f], "TP-Link"),
    ([0x50, 0xc7, 0xbf], "TP-Link"),
    ([0x00, 0x18, 0xe7], "D-Link"),
    ([0x24, 0x05, 0x0f], "Ubiquiti"),
    ([0xfc, 0xec, 0xda], "Ubiquiti"),
    ([0x00, 0x1e, 0x10], "Huawei"),
    ([0x00, 0x26, 0x5a], "Intel"),
    ([0x8c, 0x70, 0x5a], "Intel"),
    ([0xb8, 0x27, 0xeb], "Raspberry Pi"),
    ([0xdc, 0xa6, 0x32], "Raspberry Pi"),
];

pub fn lookup(mac: Mac) -> Option<&'static str> {
    let oui = mac.oui();
    OUI_TABLE
        .iter()
        .find(|(prefix, _)| *prefix == oui)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prefix_resolves() {
        let mac = Mac([0xb8, 0x27, 0xeb, 0x01, 0x02, 0x03]);
        assert_eq!(lookup(mac), Some("Raspberry Pi"));
    }

    #[test]
    fn unknown_prefix_is_none() {
        let mac = Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(lookup(mac), None);
    }
}
