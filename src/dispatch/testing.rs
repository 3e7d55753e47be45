//! In-memory remote used by the dispatcher tests.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::backend::{CloneOptions, DeleteOptions, MigrateOptions, NetworkRemote, VmRemote};
use crate::error::RemoteError;
use crate::network::Network;
use crate::vm_state::{Connection, Vm, VmHandle};

#[derive(Default)]
pub struct FakeRemote {
    pub calls: Mutex<Vec<String>>,
    /// Operation names (as recorded in `calls`, before the colon) that fail.
    pub failing: HashSet<&'static str>,
    /// Snapshot names whose deletion fails.
    pub failing_snapshots: HashSet<String>,
    pub vms: Mutex<Vec<Vm>>,
    pub networks: Vec<Network>,
    pub last_delete: Mutex<Option<DeleteOptions>>,
}

impl FakeRemote {
    pub fn failing(ops: &[&'static str]) -> Self {
        Self {
            failing: ops.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str, target: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(format!("{op}:{target}"));
        if self.failing.contains(op) {
            Err(RemoteError::new(format!("{op} refused by hypervisor")))
        } else {
            Ok(())
        }
    }
}

impl VmRemote for FakeRemote {
    async fn list_vms(&self, connection: Connection) -> Result<Vec<Vm>, RemoteError> {
        self.record("list", connection.as_str())?;
        Ok(self
            .vms
            .lock()
            .unwrap()
            .iter()
            .filter(|vm| vm.connection == connection)
            .cloned()
            .collect())
    }

    async fn start(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("start", &vm.name)
    }

    async fn install(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("install", &vm.name)
    }

    async fn shutdown(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("shutdown", &vm.name)
    }

    async fn force_shutdown(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("force_shutdown", &vm.name)
    }

    async fn reboot(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("reboot", &vm.name)
    }

    async fn force_reboot(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("force_reboot", &vm.name)
    }

    async fn pause(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("pause", &vm.name)
    }

    async fn resume(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("resume", &vm.name)
    }

    async fn send_nmi(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        self.record("send_nmi", &vm.name)
    }

    async fn delete_snapshot(&self, vm: &VmHandle, snapshot: &str) -> Result<(), RemoteError> {
        self.record("delete_snapshot", &format!("{}/{snapshot}", vm.name))?;
        if self.failing_snapshots.contains(snapshot) {
            return Err(RemoteError::new(format!("snapshot {snapshot} is locked")));
        }
        Ok(())
    }

    async fn delete(&self, vm: &VmHandle, options: &DeleteOptions) -> Result<(), RemoteError> {
        *self.last_delete.lock().unwrap() = Some(options.clone());
        self.record("delete", &vm.name)
    }

    async fn migrate(&self, vm: &VmHandle, options: &MigrateOptions) -> Result<(), RemoteError> {
        self.record("migrate", &format!("{}->{}", vm.name, options.destination))
    }

    async fn clone_vm(&self, vm: &VmHandle, options: &CloneOptions) -> Result<(), RemoteError> {
        self.record("clone", &format!("{}->{}", vm.name, options.new_name))
    }
}

impl NetworkRemote for FakeRemote {
    async fn list_networks(&self, connection: Connection) -> Result<Vec<Network>, RemoteError> {
        self.record("list_networks", connection.as_str())?;
        Ok(self
            .networks
            .iter()
            .filter(|n| n.connection == connection)
            .cloned()
            .collect())
    }

    async fn activate_network(&self, network: &Network) -> Result<(), RemoteError> {
        self.record("activate_network", &network.name)
    }

    async fn deactivate_network(&self, network: &Network) -> Result<(), RemoteError> {
        self.record("deactivate_network", &network.name)
    }

    async fn undefine_network(&self, network: &Network) -> Result<(), RemoteError> {
        self.record("undefine_network", &network.name)
    }
}
