use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch; every entity's `last_update` and every
/// queued frame's receipt time use this scale.
pub type Millis = u64;

pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// A 48-bit MAC address. Ordering is lexicographic over the raw bytes, which
/// matches lexicographic ordering of the canonical colon-hex rendering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; 6]);
    pub const NULL: Mac = Mac([0x00; 6]);

    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Mac {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub fn parse_mac(input: &str) -> Option<Mac> {
    let cleaned: String = input.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if cleaned.len() != 12 {
        return None;
    }
    let mut bytes = [0u8; 6];
    for (i, chunk) in bytes.iter_mut().enumerate() {
        let idx = i * 2;
        *chunk = u8::from_str_radix(&cleaned[idx..idx + 2], 16).ok()?;
    }
    Some(Mac(bytes))
}

/// Orders an undirected station pair so the same edge is never stored both
/// ways: `station1 < station2` lexicographically.
pub fn canonical_pair(a: Mac, b: Mac) -> (Mac, Mac) {
    if a <= b { (a, b) } else { (b, a) }
}

/// A radio-capable device, keyed by MAC.
#[derive(Clone, Debug, Serialize)]
pub struct Station {
    pub mac: Mac,
    /// Sticky: once an address has been seen in the BSSID role this never
    /// reverts to false.
    pub is_ap: bool,
    pub ssid: Option<String>,
    pub manufacturer: Option<String>,
    pub last_update: Millis,
}

impl Station {
    pub fn new(mac: Mac, is_ap: bool, last_update: Millis) -> Self {
        Self {
            mac,
            is_ap,
            ssid: None,
            manufacturer: crate::oui::lookup(mac).map(str::to_owned),
            last_update,
        }
    }
}

/// An extended service set, keyed by SSID. Multiple physical networks can
/// legally share an SSID; treating it as unique is a deliberate
/// simplification.
#[derive(Clone, Debug, Serialize)]
pub struct Network {
    pub ssid: String,
    pub channel: Option<u16>,
    pub auth: Option<String>,
    pub enc: Option<String>,
    pub cipher: Option<String>,
    pub last_update: Millis,
}

/// An undirected association/authentication edge between two stations.
#[derive(Clone, Debug, Serialize)]
pub struct Connection {
    pub station1: Mac,
    pub station2: Mac,
    pub connected: bool,
    pub last_update: Millis,
}

impl Connection {
    pub fn new(a: Mac, b: Mac, last_update: Millis) -> Self {
        let (station1, station2) = canonical_pair(a, b);
        Self {
            station1,
            station2,
            connected: true,
            last_update,
        }
    }

    pub fn key(&self) -> (Mac, Mac) {
        (self.station1, self.station2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Station,
    Network,
    Connection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Station(Station),
    Network(Network),
    Connection(Connection),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Station(_) => EntityKind::Station,
            Entity::Network(_) => EntityKind::Network,
            Entity::Connection(_) => EntityKind::Connection,
        }
    }
}

impl From<Station> for Entity {
    fn from(s: Station) -> Self {
        Entity::Station(s)
    }
}

impl From<Network> for Entity {
    fn from(n: Network) -> Self {
        Entity::Network(n)
    }
}

impl From<Connection> for Entity {
    fn from(c: Connection) -> Self {
        Entity::Connection(c)
    }
}

/// One entity mutation, produced by the state engine and consumed by the
/// changelog sink. Never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct StateChange {
    pub action: Action,
    pub kind: EntityKind,
    pub entity: Entity,
    /// Names of the fields that changed; empty (and omitted on the wire) for
    /// `create` actions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<&'static str>,
}

impl StateChange {
    pub fn created(entity: impl Into<Entity>) -> Self {
        let entity = entity.into();
        Self {
            action: Action::Create,
            kind: entity.kind(),
            entity,
            updates: Vec::new(),
        }
    }

    pub fn updated(entity: impl Into<Entity>, updates: Vec<&'static str>) -> Self {
        let entity = entity.into();
        Self {
            action: Action::Update,
            kind: entity.kind(),
            entity,
            updates,
        }
    }
}

/// A per-frame grouping of state changes, keyed by entity kind. This is the
/// unit the sink publishes and the visualization layer consumes.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChangeBatch(pub BTreeMap<EntityKind, Vec<StateChange>>);

impl ChangeBatch {
    pub fn from_changes(changes: Vec<StateChange>) -> Self {
        let mut batch = ChangeBatch::default();
        for change in changes {
            batch.0.entry(change.kind).or_default().push(change);
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}
