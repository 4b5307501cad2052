//! The shared topology store: the single source of truth for stations,
//! networks, and connections. Each entity kind sits behind its own mutex,
//! constructed once here and shared through `Arc<TopologyStore>` — a worker
//! that needs to read-then-write a table does both inside one critical
//! section, which is what makes the dedup logic race-free.

use crate::models::{Connection, Mac, Network, Station};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct TopologyStore {
    stations: Mutex<HashMap<Mac, Station>>,
    networks: Mutex<HashMap<String, Network>>,
    connections: Mutex<HashMap<(Mac, Mac), Connection>>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the station lock for the duration of the returned table view.
    pub fn stations(&self) -> StationTable<'_> {
        StationTable(self.stations.lock().expect("station table poisoned"))
    }

    /// Acquires the network lock for the duration of the returned table view.
    pub fn networks(&self) -> NetworkTable<'_> {
        NetworkTable(self.networks.lock().expect("network table poisoned"))
    }

    /// Acquires the connection lock for the duration of the returned table
    /// view.
    pub fn connections(&self) -> ConnectionTable<'_> {
        ConnectionTable(self.connections.lock().expect("connection table poisoned"))
    }

    /// Clones the full current topology, each table locked only briefly.
    /// Output is sorted by key so snapshots are deterministic.
    pub fn snapshot(&self) -> (Vec<Station>, Vec<Network>, Vec<Connection>) {
        let mut stations: Vec<Station> = self.stations().0.values().cloned().collect();
        let mut networks: Vec<Network> = self.networks().0.values().cloned().collect();
        let mut connections: Vec<Connection> = self.connections().0.values().cloned().collect();
        stations.sort_by_key(|s| s.mac);
        networks.sort_by(|a, b| a.ssid.cmp(&b.ssid));
        connections.sort_by_key(Connection::key);
        (stations, networks, connections)
    }
}

pub struct StationTable<'a>(MutexGuard<'a, HashMap<Mac, Station>>);

impl StationTable<'_> {
    pub fn get(&self, mac: &Mac) -> Option<&Station> {
        self.0.get(mac)
    }

    pub fn find_in(&self, macs: &BTreeSet<Mac>) -> Vec<&Station> {
        macs.iter().filter_map(|mac| self.0.get(mac)).collect()
    }

    pub fn insert_batch(&mut self, rows: Vec<Station>) {
        for row in rows {
            self.0.insert(row.mac, row);
        }
    }

    /// Applies `apply` to every existing row whose MAC is in `keys` and
    /// returns clones of the rows as updated.
    pub fn update_where_in<F>(&mut self, keys: &[Mac], mut apply: F) -> Vec<Station>
    where
        F: FnMut(&mut Station),
    {
        let mut updated = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = self.0.get_mut(key) {
                apply(row);
                updated.push(row.clone());
            }
        }
        updated
    }
}

pub struct NetworkTable<'a>(MutexGuard<'a, HashMap<String, Network>>);

impl NetworkTable<'_> {
    pub fn get(&self, ssid: &str) -> Option<&Network> {
        self.0.get(ssid)
    }

    pub fn insert(&mut self, row: Network) {
        self.0.insert(row.ssid.clone(), row);
    }

    pub fn update<F>(&mut self, ssid: &str, apply: F) -> Option<Network>
    where
        F: FnOnce(&mut Network),
    {
        let row = self.0.get_mut(ssid)?;
        apply(row);
        Some(row.clone())
    }
}

pub struct ConnectionTable<'a>(MutexGuard<'a, HashMap<(Mac, Mac), Connection>>);

impl ConnectionTable<'_> {
    pub fn get(&self, key: &(Mac, Mac)) -> Option<&Connection> {
        self.0.get(key)
    }

    /// Keys of every stored connection with at least one endpoint in `macs`.
    pub fn keys_touching(&self, macs: &BTreeSet<Mac>) -> Vec<(Mac, Mac)> {
        self.0
            .keys()
            .filter(|(a, b)| macs.contains(a) || macs.contains(b))
            .copied()
            .collect()
    }

    pub fn insert_batch(&mut self, rows: Vec<Connection>) {
        for row in rows {
            self.0.insert(row.key(), row);
        }
    }

    pub fn update_where_in<F>(&mut self, keys: &[(Mac, Mac)], mut apply: F) -> Vec<Connection>
    where
        F: FnMut(&mut Connection),
    {
        let mut updated = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = self.0.get_mut(key) {
                apply(row);
                updated.push(row.clone());
            }
        }
        updated
    }
}
