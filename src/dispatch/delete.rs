//! Compound delete: snapshots first, then the domain and chosen storage.

use futures_util::future::join_all;

use crate::backend::{DeleteOptions, VmRemote};
use crate::eligibility::delete_forces_off;
use crate::error::RemoteError;
use crate::vm_state::{Disk, DiskKind, Vm};

/// One row of the "delete associated storage" list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChoice {
    pub disk: Disk,
    pub checked: bool,
}

/// Storage offered for removal: file disks with a source and pool volumes,
/// sorted by target. Read-only disks start unchecked.
pub fn default_storage(vm: &Vm) -> Vec<StorageChoice> {
    let mut disks: Vec<&Disk> = vm
        .disks
        .iter()
        .filter(|d| match d.kind {
            DiskKind::File => d.file.as_deref().is_some_and(|f| !f.is_empty()),
            DiskKind::Volume => true,
            DiskKind::Block | DiskKind::Network => false,
        })
        .collect();
    disks.sort_by(|a, b| a.target.cmp(&b.target));
    disks
        .into_iter()
        .map(|d| StorageChoice {
            disk: d.clone(),
            checked: !d.readonly,
        })
        .collect()
}

/// The disks that will actually be removed.
pub fn checked_storage(choices: &[StorageChoice]) -> Vec<Disk> {
    choices
        .iter()
        .filter(|c| c.checked)
        .map(|c| c.disk.clone())
        .collect()
}

/// Delete every snapshot, then the VM.
///
/// All snapshot deletions are issued together and all are awaited, even once
/// one has failed. Any failure aborts before the domain is touched and comes
/// back as a single error for the whole operation.
pub(super) async fn delete_vm<R: VmRemote>(
    remote: &R,
    vm: &Vm,
    storage: &[Disk],
) -> Result<(), RemoteError> {
    let handle = vm.handle();

    let results = join_all(
        vm.snapshots
            .iter()
            .map(|s| remote.delete_snapshot(&handle, &s.name)),
    )
    .await;

    let failures: Vec<RemoteError> = results.into_iter().filter_map(Result::err).collect();
    if let Some(first) = failures.first() {
        tracing::warn!(
            vm = %vm.name,
            failed = failures.len(),
            total = vm.snapshots.len(),
            "snapshot deletion failed, leaving domain in place"
        );
        return Err(first.clone());
    }

    let options = DeleteOptions {
        destroy: delete_forces_off(vm),
        storage: storage.to_vec(),
    };
    tracing::info!(vm = %vm.name, destroy = options.destroy, storage = options.storage.len(), "deleting VM");
    remote.delete(&handle, &options).await
}
