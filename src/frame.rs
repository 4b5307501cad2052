//! Raw 802.11 MAC header and information-element decoding. Everything here
//! is pure: a byte slice goes in, a typed view (or `None` for malformed
//! input) comes out.

use crate::models::Mac;

pub const FRAME_TYPE_MGMT: u8 = 0;
pub const FRAME_TYPE_CTRL: u8 = 1;
pub const FRAME_TYPE_DATA: u8 = 2;

pub const SUBTYPE_REASSOC_REQ: u8 = 2;
pub const SUBTYPE_REASSOC_RESP: u8 = 3;
pub const SUBTYPE_PROBE_RESP: u8 = 5;
pub const SUBTYPE_BEACON: u8 = 8;
pub const SUBTYPE_DISASSOC: u8 = 10;
pub const SUBTYPE_AUTH: u8 = 11;
pub const SUBTYPE_DEAUTH: u8 = 12;

const IE_SSID: u8 = 0;
const IE_DS_PARAMS: u8 = 3;
const IE_RSN: u8 = 48;

/// Decoded 802.11 MAC header plus a view of the frame body.
#[derive(Debug)]
pub struct Frame<'a> {
    pub frame_type: u8,
    pub subtype: u8,
    pub to_ds: bool,
    pub from_ds: bool,
    pub addr1: Option<Mac>,
    pub addr2: Option<Mac>,
    pub addr3: Option<Mac>,
    pub addr4: Option<Mac>,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Decodes a frame starting at the MAC header (any radiotap or other
    /// link preamble must already be stripped). Returns `None` when the
    /// buffer is too short for the header its frame-control field implies.
    pub fn parse(bytes: &'a [u8]) -> Option<Frame<'a>> {
        if bytes.len() < 10 {
            return None;
        }
        let fc = u16::from_le_bytes([bytes[0], bytes[1]]);
        let frame_type = ((fc >> 2) & 0x3) as u8;
        let subtype = ((fc >> 4) & 0xF) as u8;
        let to_ds = fc & 0x0100 != 0;
        let from_ds = fc & 0x0200 != 0;

        // Control frames carry one or two addresses and no body; they are
        // never inspected past classification, so a short header is fine.
        if frame_type == FRAME_TYPE_CTRL {
            return Some(Frame {
                frame_type,
                subtype,
                to_ds,
                from_ds,
                addr1: bytes.get(4..10).map(to_mac),
                addr2: bytes.get(10..16).map(to_mac),
                addr3: None,
                addr4: None,
                body: &[],
            });
        }

        let has_addr4 = frame_type == FRAME_TYPE_DATA && to_ds && from_ds;
        let has_qos = frame_type == FRAME_TYPE_DATA && subtype & 0x08 != 0;
        let mut header_len = 24;
        if has_addr4 {
            header_len += 6;
        }
        if has_qos {
            header_len += 2;
        }
        if bytes.len() < header_len {
            return None;
        }

        let addr4 = if has_addr4 {
            bytes.get(24..30).map(to_mac)
        } else {
            None
        };

        Some(Frame {
            frame_type,
            subtype,
            to_ds,
            from_ds,
            addr1: bytes.get(4..10).map(to_mac),
            addr2: bytes.get(10..16).map(to_mac),
            addr3: bytes.get(16..22).map(to_mac),
            addr4,
            body: &bytes[header_len..],
        })
    }

    /// The transmitter of a management frame (the AP, for beacons and probe
    /// responses).
    pub fn transmitter(&self) -> Option<Mac> {
        self.addr2
    }
}

fn to_mac(slice: &[u8]) -> Mac {
    let mut arr = [0u8; 6];
    arr.copy_from_slice(&slice[..6]);
    Mac(arr)
}

/// Fields opportunistically decoded from a beacon / probe-response body.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BeaconFields {
    pub ssid: Option<String>,
    pub channel: Option<u16>,
    pub privacy: bool,
    pub rsn: bool,
}

/// Walks the tagged information elements of a beacon or probe-response body.
/// Only the SSID and DS-parameter-set (channel) elements are decoded, plus
/// RSN presence and the capability privacy bit; everything else is skipped
/// for cost reasons. A malformed or non-UTF-8 SSID leaves `ssid` unset.
pub fn parse_beacon_fields(body: &[u8]) -> Option<BeaconFields> {
    // 8 bytes timestamp + 2 beacon interval + 2 capability, then IEs.
    if body.len() < 12 {
        return None;
    }
    let capability = u16::from_le_bytes([body[10], body[11]]);
    let mut fields = BeaconFields {
        privacy: capability & 0x0010 != 0,
        ..BeaconFields::default()
    };

    let mut idx = 12;
    while idx + 2 <= body.len() {
        let id = body[idx];
        let len = body[idx + 1] as usize;
        idx += 2;
        if idx + len > body.len() {
            break;
        }
        let data = &body[idx..idx + len];
        match id {
            IE_SSID => {
                if !data.is_empty() {
                    if let Ok(name) = std::str::from_utf8(data) {
                        fields.ssid = Some(name.to_string());
                    }
                }
            }
            IE_DS_PARAMS => {
                if let Some(ch) = data.first() {
                    fields.channel = Some(u16::from(*ch));
                }
            }
            IE_RSN => fields.rsn = true,
            _ => {}
        }
        idx += len;
    }
    Some(fields)
}

/// Strips a radiotap preamble, returning the 802.11 frame that follows it.
pub fn strip_radiotap(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 4 {
        return None;
    }
    let rt_len = u16::from_le_bytes([data[2], data[3]]) as usize;
    if rt_len < 8 || data.len() <= rt_len {
        return None;
    }
    Some(&data[rt_len..])
}

#[cfg(test)]
pub(crate) mod build {
    //! Frame builders shared by the unit tests in this crate.

    use super::*;

    fn fc(frame_type: u8, subtype: u8, to_ds: bool, from_ds: bool) -> [u8; 2] {
        let mut fc: u16 = (u16::from(frame_type) << 2) | (u16::from(subtype) << 4);
        if to_ds {
            fc |= 0x0100;
        }
        if from_ds {
            fc |= 0x0200;
        }
        fc.to_le_bytes()
    }

    pub fn data_frame(to_ds: bool, from_ds: bool, a1: Mac, a2: Mac, a3: Mac) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&fc(FRAME_TYPE_DATA, 0, to_ds, from_ds));
        out.extend_from_slice(&[0, 0]); // duration
        out.extend_from_slice(&a1.0);
        out.extend_from_slice(&a2.0);
        out.extend_from_slice(&a3.0);
        out.extend_from_slice(&[0, 0]); // sequence control
        out
    }

    pub fn wds_frame(a1: Mac, a2: Mac, a3: Mac, a4: Mac) -> Vec<u8> {
        let mut out = data_frame(true, true, a1, a2, a3);
        out.extend_from_slice(&a4.0);
        out
    }

    pub fn mgmt_frame(subtype: u8, a1: Mac, a2: Mac, a3: Mac, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&fc(FRAME_TYPE_MGMT, subtype, false, false));
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&a1.0);
        out.extend_from_slice(&a2.0);
        out.extend_from_slice(&a3.0);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(body);
        out
    }

    pub fn beacon_body(ssid: Option<&str>, channel: Option<u8>, capability: u16) -> Vec<u8> {
        let mut body = vec![0u8; 8]; // timestamp
        body.extend_from_slice(&[0x64, 0x00]); // beacon interval
        body.extend_from_slice(&capability.to_le_bytes());
        if let Some(name) = ssid {
            body.push(IE_SSID);
            body.push(name.len() as u8);
            body.extend_from_slice(name.as_bytes());
        }
        if let Some(ch) = channel {
            body.push(IE_DS_PARAMS);
            body.push(1);
            body.push(ch);
        }
        body
    }

    pub fn beacon(src: Mac, bssid: Mac, ssid: &str, channel: u8) -> Vec<u8> {
        let body = beacon_body(Some(ssid), Some(channel), 0x0401);
        mgmt_frame(SUBTYPE_BEACON, Mac::BROADCAST, src, bssid, &body)
    }

    pub fn deauth(dest: Mac, src: Mac, bssid: Mac) -> Vec<u8> {
        // Body is a two-byte reason code.
        mgmt_frame(SUBTYPE_DEAUTH, dest, src, bssid, &[0x07, 0x00])
    }
}
