//! Remote management interface.
//!
//! The console treats the hypervisor as an opaque command/query service:
//! every call either succeeds or fails with a message. `libvirt` is the
//! concrete implementation; tests substitute their own.

pub mod libvirt;

use crate::error::RemoteError;
use crate::network::Network;
use crate::vm_state::{Connection, Disk, Vm, VmHandle};

/// Parameters of the delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Force the VM off before undefining it.
    pub destroy: bool,
    /// Backing storage to remove along with the definition.
    pub storage: Vec<Disk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Destination libvirt URI, e.g. `qemu+ssh://host/system`.
    pub destination: String,
    /// Keep the VM defined only on the destination while it runs.
    pub temporary: bool,
}

#[allow(async_fn_in_trait)] // implementations are crate-internal or test fakes
pub trait VmRemote {
    async fn list_vms(&self, connection: Connection) -> Result<Vec<Vm>, RemoteError>;

    async fn start(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn install(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn shutdown(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn force_shutdown(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn reboot(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn force_reboot(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn pause(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn resume(&self, vm: &VmHandle) -> Result<(), RemoteError>;
    async fn send_nmi(&self, vm: &VmHandle) -> Result<(), RemoteError>;

    async fn delete_snapshot(&self, vm: &VmHandle, snapshot: &str) -> Result<(), RemoteError>;
    async fn delete(&self, vm: &VmHandle, options: &DeleteOptions) -> Result<(), RemoteError>;
    async fn migrate(&self, vm: &VmHandle, options: &MigrateOptions) -> Result<(), RemoteError>;
    async fn clone_vm(&self, vm: &VmHandle, options: &CloneOptions) -> Result<(), RemoteError>;
}

#[allow(async_fn_in_trait)]
pub trait NetworkRemote {
    async fn list_networks(&self, connection: Connection) -> Result<Vec<Network>, RemoteError>;
    async fn activate_network(&self, network: &Network) -> Result<(), RemoteError>;
    async fn deactivate_network(&self, network: &Network) -> Result<(), RemoteError>;
    async fn undefine_network(&self, network: &Network) -> Result<(), RemoteError>;
}

pub fn create_backend(config: &crate::config::Config) -> libvirt::LibvirtBackend {
    libvirt::LibvirtBackend::new(config)
}
