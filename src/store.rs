//! Process-wide console state.
//!
//! The store is injected into whoever needs it; there is no global. Every
//! change is expressed as a `StoreAction` and applied by `reduce`, a pure
//! function from one snapshot to the next. `Store` publishes snapshots over a
//! `tokio::sync::watch` channel: `send_modify` always reduces against the
//! latest snapshot, so rapid back-to-back updates cannot lose each other.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::watch;

use crate::eligibility::VmAction;
use crate::ledger::{Ledger, NewNotification};
use crate::network::{Network, NetworkKey};
use crate::vm_state::{Connection, Vm, VmKey, VmState};

/// A busy-indicator action in flight for one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyMark {
    pub action: VmAction,
    /// State observed immediately before the remote call was issued.
    pub state_before: VmState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Backend-confirmed VMs.
    pub vms: Vec<Vm>,
    /// Local placeholders not yet superseded by a confirmed VM.
    pub placeholders: Vec<Vm>,
    pub networks: Vec<Network>,
    pub ledger: Ledger,
    pub busy: BTreeMap<VmKey, BusyMark>,
    pub networks_busy: BTreeSet<NetworkKey>,
}

impl Snapshot {
    /// Confirmed VMs followed by placeholders that have no confirmed twin.
    pub fn combined_vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.iter().chain(self.placeholders.iter())
    }

    pub fn find_vm(&self, key: &VmKey) -> Option<&Vm> {
        self.combined_vms().find(|vm| vm.name == key.name && vm.connection == key.connection)
    }

    pub fn find_network(&self, key: &NetworkKey) -> Option<&Network> {
        self.networks
            .iter()
            .find(|n| n.name == key.name && n.connection == key.connection)
    }

    pub fn is_busy(&self, key: &VmKey) -> bool {
        self.busy.contains_key(key)
    }
}

#[derive(Debug, Clone)]
pub enum StoreAction {
    /// Full VM list for one connection, replacing what was there.
    VmsRefreshed { connection: Connection, vms: Vec<Vm> },
    PlaceholderAdded(Vm),
    NetworksRefreshed { connection: Connection, networks: Vec<Network> },
    BusyStarted { key: VmKey, mark: BusyMark },
    BusySettled(VmKey),
    NetworkBusyStarted(NetworkKey),
    NetworkBusySettled(NetworkKey),
    NotificationAdded(NewNotification),
    NotificationDismissed(u64),
}

/// Pure transition from one snapshot to the next.
pub fn reduce(state: &Snapshot, action: StoreAction) -> Snapshot {
    let mut next = state.clone();
    match action {
        StoreAction::VmsRefreshed { connection, vms } => {
            next.vms.retain(|vm| vm.connection != connection);
            next.vms.extend(vms);
            let confirmed: BTreeSet<VmKey> = next.vms.iter().map(Vm::key).collect();
            next.placeholders.retain(|p| !confirmed.contains(&p.key()));
            settle_observed_changes(&mut next);
        }
        StoreAction::PlaceholderAdded(vm) => {
            let key = vm.key();
            if next.find_vm(&key).is_none() {
                next.placeholders.push(vm);
            }
        }
        StoreAction::NetworksRefreshed {
            connection,
            networks,
        } => {
            next.networks.retain(|n| n.connection != connection);
            next.networks.extend(networks);
        }
        StoreAction::BusyStarted { key, mark } => {
            next.busy.insert(key, mark);
        }
        StoreAction::BusySettled(key) => {
            next.busy.remove(&key);
        }
        StoreAction::NetworkBusyStarted(key) => {
            next.networks_busy.insert(key);
        }
        StoreAction::NetworkBusySettled(key) => {
            next.networks_busy.remove(&key);
        }
        StoreAction::NotificationAdded(n) => {
            next.ledger.add(n);
        }
        StoreAction::NotificationDismissed(index) => {
            next.ledger.dismiss(index);
        }
    }
    next
}

/// Clear busy marks whose VM now reports a different state than the one
/// seen before dispatch, or has vanished.
fn settle_observed_changes(next: &mut Snapshot) {
    let vms = &next.vms;
    let placeholders = &next.placeholders;
    next.busy.retain(|key, mark| {
        let current = vms
            .iter()
            .chain(placeholders.iter())
            .find(|vm| vm.name == key.name && vm.connection == key.connection);
        match current {
            Some(vm) if vm.state == mark.state_before => true,
            Some(vm) => {
                tracing::debug!(vm = %key, from = %mark.state_before, to = %vm.state, "state change observed, clearing busy");
                false
            }
            None => false,
        }
    });
}

// ── Store handle ────────────────────────────────────────────────────

/// Cheaply clonable handle to the shared state.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Snapshot::default())
    }
}

impl Store {
    pub fn new(initial: Snapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot (owned copy).
    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Run `f` against the current snapshot without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        f(&self.tx.borrow())
    }

    /// Receive a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn apply(&self, action: StoreAction) {
        self.tx.send_modify(|state| *state = reduce(state, action));
    }

    /// Append a notification and return the index it was given.
    pub fn notify(&self, notification: NewNotification) -> u64 {
        let mut index = 0;
        self.tx.send_modify(|state| {
            index = state.ledger.next_index();
            *state = reduce(state, StoreAction::NotificationAdded(notification));
        });
        index
    }

    pub fn dismiss(&self, index: u64) {
        self.apply(StoreAction::NotificationDismissed(index));
    }
}
