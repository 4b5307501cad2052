//! Pure `(frame type, subtype)` dispatch. No state, no side effects: the
//! classifier only names which handler a frame belongs to.

use crate::frame::{
    FRAME_TYPE_CTRL, FRAME_TYPE_DATA, FRAME_TYPE_MGMT, SUBTYPE_AUTH, SUBTYPE_BEACON,
    SUBTYPE_DEAUTH, SUBTYPE_DISASSOC, SUBTYPE_PROBE_RESP, SUBTYPE_REASSOC_REQ,
    SUBTYPE_REASSOC_RESP,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameClass {
    /// Any data subtype; station/connection inference only depends on the
    /// addresses, not the data subtype.
    Data,
    /// Beacons and probe responses share one handler.
    Beacon,
    Reassociation,
    Authentication,
    /// Disassociation and deauthentication share one handler.
    Disconnect,
    /// Recognized but uninteresting (control frames, remaining management
    /// subtypes).
    Ignore,
}

/// A frame type outside the three defined 802.11 types. Fatal for the frame,
/// never for the worker.
#[derive(Debug, PartialEq, Eq)]
pub struct UnknownFrameType(pub u8);

impl fmt::Display for UnknownFrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown 802.11 frame type {}", self.0)
    }
}

impl std::error::Error for UnknownFrameType {}

pub fn classify(frame_type: u8, subtype: u8) -> Result<FrameClass, UnknownFrameType> {
    match frame_type {
        FRAME_TYPE_MGMT => Ok(classify_mgmt(subtype)),
        FRAME_TYPE_CTRL => Ok(FrameClass::Ignore),
        FRAME_TYPE_DATA => Ok(FrameClass::Data),
        other => Err(UnknownFrameType(other)),
    }
}

fn classify_mgmt(subtype: u8) -> FrameClass {
    match subtype {
        SUBTYPE_BEACON | SUBTYPE_PROBE_RESP => FrameClass::Beacon,
        SUBTYPE_REASSOC_REQ | SUBTYPE_REASSOC_RESP => FrameClass::Reassociation,
        SUBTYPE_AUTH => FrameClass::Authentication,
        SUBTYPE_DISASSOC | SUBTYPE_DEAUTH => FrameClass::Disconnect,
        _ => FrameClass::Ignore,
    }
}
