//! The topology state engine: turns one classified frame into store
//! mutations and an ordered list of state changes. All read-then-write
//! sequences happen inside a single critical section per entity kind, and
//! every multi-row write is batched so those sections stay short under
//! concurrent workers.

use crate::addresses::{self, AddressFilter, AddressRole, ResolvedAddresses};
use crate::classify::FrameClass;
use crate::frame::{self, Frame};
use crate::models::{
    canonical_pair, Connection, Mac, Millis, Network, StateChange, Station,
};
use crate::store::TopologyStore;
use std::collections::HashMap;

pub fn handle_frame(
    class: FrameClass,
    frame: &Frame<'_>,
    rcvd: Millis,
    store: &TopologyStore,
    filter: &AddressFilter,
) -> Vec<StateChange> {
    match class {
        FrameClass::Data => data_frame(frame, rcvd, store, filter),
        FrameClass::Beacon => beacon_frame(frame, rcvd, store, filter),
        FrameClass::Disconnect => disconnect_frame(frame, rcvd, store, filter),
        // Classified so the wiring exists, but these produce no changes:
        // the data model learns nothing new from them that the data and
        // beacon paths don't already cover.
        FrameClass::Reassociation | FrameClass::Authentication | FrameClass::Ignore => Vec::new(),
    }
}

fn data_frame(
    frame: &Frame<'_>,
    rcvd: Millis,
    store: &TopologyStore,
    filter: &AddressFilter,
) -> Vec<StateChange> {
    let resolved = addresses::resolve(frame, filter);
    if resolved.is_empty() {
        return Vec::new();
    }

    let mut changes = upsert_stations(&resolved, rcvd, store);
    let candidates = connection_candidates(&resolved);
    changes.extend(upsert_connections(&resolved, candidates, rcvd, store));
    changes
}

fn upsert_stations(
    resolved: &ResolvedAddresses,
    rcvd: Millis,
    store: &TopologyStore,
) -> Vec<StateChange> {
    let mut changes = Vec::new();
    let mut stations = store.stations();
    let existing: HashMap<Mac, bool> = stations
        .find_in(&resolved.macs())
        .into_iter()
        .map(|s| (s.mac, s.is_ap))
        .collect();

    let mut staged: Vec<Station> = Vec::new();
    let mut promoted: Vec<Mac> = Vec::new();
    let mut seen: Vec<Mac> = Vec::new();
    for (role, mac) in resolved.iter() {
        let is_bssid = role == AddressRole::Bssid;
        match existing.get(&mac) {
            Some(&is_ap) => {
                if !seen.contains(&mac) {
                    seen.push(mac);
                }
                if is_bssid && !is_ap && !promoted.contains(&mac) {
                    promoted.push(mac);
                }
            }
            None => {
                if !staged.iter().any(|s| s.mac == mac) {
                    let station = Station::new(mac, is_bssid, rcvd);
                    changes.push(StateChange::created(station.clone()));
                    staged.push(station);
                }
            }
        }
    }

    stations.insert_batch(staged);
    // Every re-observation bumps the timestamp; only promotions are events.
    for station in stations.update_where_in(&seen, |s| {
        s.last_update = rcvd;
        if promoted.contains(&s.mac) {
            s.is_ap = true;
        }
    }) {
        if promoted.contains(&station.mac) {
            changes.push(StateChange::updated(station, vec!["is_ap"]));
        }
    }
    changes
}

/// Derives the undirected pairs a frame implies, already canonicalized.
/// Infrastructure frames pair every other resolved address with the BSSID;
/// ad-hoc frames pair source with destination. Four-address (WDS) frames
/// have no specified inference rule and produce nothing.
fn connection_candidates(resolved: &ResolvedAddresses) -> Vec<(Mac, Mac)> {
    let mut candidates: Vec<(Mac, Mac)> = Vec::new();

    if let Some(bssid) = resolved.get(AddressRole::Bssid) {
        for (_, mac) in resolved.iter() {
            if mac != bssid {
                let pair = canonical_pair(mac, bssid);
                if !candidates.contains(&pair) {
                    candidates.push(pair);
                }
            }
        }
    } else if resolved.get(AddressRole::Transmitter).is_none() {
        if let (Some(src), Some(dst)) = (
            resolved.get(AddressRole::Source),
            resolved.get(AddressRole::Destination),
        ) {
            if src != dst {
                candidates.push(canonical_pair(src, dst));
            }
        }
    }
    candidates
}

fn upsert_connections(
    resolved: &ResolvedAddresses,
    candidates: Vec<(Mac, Mac)>,
    rcvd: Millis,
    store: &TopologyStore,
) -> Vec<StateChange> {
    let mut changes = Vec::new();
    let macs = resolved.macs();

    // Touched rows refresh even when the frame implies no new pair (for
    // example when one endpoint was filtered out); only the staging of new
    // rows depends on the candidate list.
    let mut connections = store.connections();
    let touched = connections.keys_touching(&macs);

    let mut staged: Vec<Connection> = Vec::new();
    for (a, b) in candidates {
        if connections.get(&(a, b)).is_none() && !staged.iter().any(|c| c.key() == (a, b)) {
            let conn = Connection::new(a, b, rcvd);
            changes.push(StateChange::created(conn.clone()));
            staged.push(conn);
        }
    }

    // A refresh proves continued activity: any touched row that was marked
    // disconnected flips back, and that flip is worth an event.
    let reconnect_keys: Vec<(Mac, Mac)> = touched
        .iter()
        .filter(|key| {
            connections
                .get(key)
                .is_some_and(|c| !c.connected && c.last_update < rcvd)
        })
        .copied()
        .collect();

    connections.insert_batch(staged);
    let refreshed = connections.update_where_in(&touched, |c| {
        c.connected = true;
        c.last_update = rcvd;
    });
    for conn in refreshed {
        if reconnect_keys.contains(&conn.key()) {
            changes.push(StateChange::updated(conn, vec!["connected"]));
        }
    }
    changes
}

fn beacon_frame(
    frame: &Frame<'_>,
    rcvd: Millis,
    store: &TopologyStore,
    filter: &AddressFilter,
) -> Vec<StateChange> {
    let Some(fields) = frame::parse_beacon_fields(frame.body) else {
        return Vec::new();
    };
    // A hidden or malformed SSID tells us nothing worth storing.
    let Some(ssid) = fields.ssid.clone() else {
        return Vec::new();
    };

    let (auth, enc, cipher) = security_fields(&fields);
    let mut changes = Vec::new();

    {
        let mut networks = store.networks();
        match networks.get(&ssid) {
            None => {
                let network = Network {
                    ssid: ssid.clone(),
                    channel: fields.channel,
                    auth,
                    enc,
                    cipher,
                    last_update: rcvd,
                };
                networks.insert(network.clone());
                changes.push(StateChange::created(network));
            }
            Some(existing) => {
                let mut updated_fields: Vec<&'static str> = Vec::new();
                if fields.channel.is_some() && existing.channel != fields.channel {
                    updated_fields.push("channel");
                }
                if auth.is_some() && existing.auth != auth {
                    updated_fields.push("auth");
                }
                if enc.is_some() && existing.enc != enc {
                    updated_fields.push("enc");
                }
                if cipher.is_some() && existing.cipher != cipher {
                    updated_fields.push("cipher");
                }
                if !updated_fields.is_empty() {
                    let updated = networks.update(&ssid, |n| {
                        if fields.channel.is_some() {
                            n.channel = fields.channel;
                        }
                        if auth.is_some() {
                            n.auth = auth.clone();
                        }
                        if enc.is_some() {
                            n.enc = enc.clone();
                        }
                        if cipher.is_some() {
                            n.cipher = cipher.clone();
                        }
                        n.last_update = rcvd;
                    });
                    if let Some(network) = updated {
                        changes.push(StateChange::updated(network, updated_fields));
                    }
                }
            }
        }
    }

    if let Some(ap) = frame.transmitter().filter(|mac| filter.is_device(*mac)) {
        let mut stations = store.stations();
        match stations.get(&ap) {
            None => {
                let mut station = Station::new(ap, true, rcvd);
                station.ssid = Some(ssid);
                stations.insert_batch(vec![station.clone()]);
                changes.push(StateChange::created(station));
            }
            Some(existing) => {
                let mut updated_fields: Vec<&'static str> = Vec::new();
                if !existing.is_ap {
                    updated_fields.push("is_ap");
                }
                if existing.ssid.as_deref() != Some(ssid.as_str()) {
                    updated_fields.push("ssid");
                }
                if !updated_fields.is_empty() {
                    let updated = stations.update_where_in(&[ap], |s| {
                        s.is_ap = true;
                        s.ssid = Some(ssid.clone());
                        s.last_update = rcvd;
                    });
                    if let Some(station) = updated.into_iter().next() {
                        changes.push(StateChange::updated(station, updated_fields));
                    }
                }
            }
        }
    }

    changes
}

fn security_fields(
    fields: &frame::BeaconFields,
) -> (Option<String>, Option<String>, Option<String>) {
    if fields.rsn {
        (
            Some("wpa2".to_string()),
            Some("aes".to_string()),
            Some("ccmp".to_string()),
        )
    } else if fields.privacy {
        (Some("wep".to_string()), Some("wep".to_string()), None)
    } else {
        (Some("open".to_string()), None, None)
    }
}

/// Disassociation / deauthentication: if the pair already has a connection,
/// mark it disconnected. The frame proves the relationship is ending, not
/// that it ever existed, so an unknown pair creates nothing.
fn disconnect_frame(
    frame: &Frame<'_>,
    rcvd: Millis,
    store: &TopologyStore,
    filter: &AddressFilter,
) -> Vec<StateChange> {
    let resolved = addresses::resolve(frame, filter);
    let (Some(a), Some(b)) = (
        resolved.get(AddressRole::Destination),
        resolved.get(AddressRole::Source),
    ) else {
        return Vec::new();
    };
    if a == b {
        return Vec::new();
    }

    let key = canonical_pair(a, b);
    let mut connections = store.connections();
    if connections.get(&key).is_none() {
        return Vec::new();
    }
    connections
        .update_where_in(&[key], |c| {
            c.connected = false;
            c.last_update = rcvd;
        })
        .into_iter()
        .map(|conn| StateChange::updated(conn, vec!["connected"]))
        .collect()
}
