//! Action dispatch.
//!
//! One user request becomes exactly one remote command (delete is the one
//! compound exception). The dispatcher re-checks the request against the
//! eligibility table, keeps the busy mark for run/shutdown, turns failures
//! into ledger entries and navigates away from VMs that are about to vanish.

pub mod delete;
pub mod network;
#[cfg(test)]
mod testing;

use std::time::Duration;

use crate::backend::{CloneOptions, MigrateOptions, VmRemote};
use crate::config::BusyPolicy;
use crate::eligibility::{Offer, VmAction, offer_for};
use crate::error::{DeckError, RemoteError};
use crate::helpers::HostHelpers;
use crate::ledger::NewNotification;
use crate::nav::{Navigator, Route};
use crate::store::{BusyMark, Store, StoreAction};
use crate::vm_state::{Connection, Disk, Vm, VmKey};

/// A user-initiated action with whatever parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Pause,
    Resume,
    Shutdown,
    ForceShutdown,
    SendNmi,
    Reboot,
    ForceReboot,
    Run,
    Install,
    Clone(CloneOptions),
    Migrate(MigrateOptions),
    /// Storage to remove alongside the domain.
    Delete { storage: Vec<Disk> },
}

impl ActionRequest {
    pub fn action(&self) -> VmAction {
        match self {
            ActionRequest::Pause => VmAction::Pause,
            ActionRequest::Resume => VmAction::Resume,
            ActionRequest::Shutdown => VmAction::Shutdown,
            ActionRequest::ForceShutdown => VmAction::ForceShutdown,
            ActionRequest::SendNmi => VmAction::SendNmi,
            ActionRequest::Reboot => VmAction::Reboot,
            ActionRequest::ForceReboot => VmAction::ForceReboot,
            ActionRequest::Run => VmAction::Run,
            ActionRequest::Install => VmAction::Install,
            ActionRequest::Clone(_) => VmAction::Clone,
            ActionRequest::Migrate(_) => VmAction::Migrate,
            ActionRequest::Delete { .. } => VmAction::Delete,
        }
    }
}

/// How a dispatched action ended. Remote failures are outcomes, not errors:
/// they have already been recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed {
        index: u64,
        text: String,
        detail: String,
    },
}

pub struct Dispatcher<R, N> {
    remote: R,
    navigator: N,
    store: Store,
    helpers: HostHelpers,
    busy_policy: BusyPolicy,
}

impl<R, N> Dispatcher<R, N> {
    pub fn new(remote: R, navigator: N, store: Store, helpers: HostHelpers) -> Self {
        Self {
            remote,
            navigator,
            store,
            helpers,
            busy_policy: BusyPolicy::default(),
        }
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn helpers(&self) -> &HostHelpers {
        &self.helpers
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Record a remote failure in the ledger.
    fn record_failure(&self, resource: &Vm, text: String, error: RemoteError) -> Outcome {
        let detail = error.message;
        let index = self.store.notify(NewNotification {
            resource_id: resource.resource_id(),
            text: text.clone(),
            detail: detail.clone(),
        });
        Outcome::Failed {
            index,
            text,
            detail,
        }
    }
}

/// Shutting down a transient VM or deleting any VM removes it from the
/// inventory, so its detail view has to be left.
fn leaves_inventory(action: VmAction, vm: &Vm) -> bool {
    match action {
        VmAction::Shutdown | VmAction::ForceShutdown => !vm.persistent,
        VmAction::Delete => true,
        _ => false,
    }
}

impl<R: VmRemote, N: Navigator> Dispatcher<R, N> {
    /// Replace the store's VM list for `connection` with the backend's view.
    pub async fn refresh(&self, connection: Connection) -> Result<(), DeckError> {
        let vms = self
            .remote
            .list_vms(connection)
            .await
            .map_err(|e| DeckError::Libvirt {
                message: format!("failed to list VMs: {e}"),
                hint: format!("check that libvirtd is running and the {connection} connection is reachable"),
            })?;
        tracing::debug!(%connection, count = vms.len(), "VM list refreshed");
        self.store
            .apply(StoreAction::VmsRefreshed { connection, vms });
        Ok(())
    }

    /// Look a VM up in the current snapshot.
    pub fn find(&self, key: &VmKey) -> Result<Vm, DeckError> {
        self.store
            .read(|s| s.find_vm(key).cloned())
            .ok_or_else(|| DeckError::VmNotFound {
                name: key.name.clone(),
                connection: key.connection.to_string(),
            })
    }

    /// Issue `request` against the VM identified by `key`.
    ///
    /// A VM that is no longer known sends the user back to the VM list and
    /// fails with `VmNotFound`; it never becomes a ledger entry.
    pub async fn dispatch(&self, key: &VmKey, request: ActionRequest) -> Result<Outcome, DeckError> {
        let vm = match self.find(key) {
            Ok(vm) => vm,
            Err(e) => {
                self.navigator.go_to(Route::VmList);
                return Err(e);
            }
        };
        let action = request.action();

        match offer_for(&vm, action, &self.helpers) {
            Some(Offer::Enabled) => {}
            Some(Offer::Disabled { reason }) => {
                return Err(DeckError::ActionNotPermitted {
                    action: action.to_string(),
                    name: vm.name.clone(),
                    reason: reason.into(),
                });
            }
            None => {
                return Err(DeckError::ActionNotPermitted {
                    action: action.to_string(),
                    name: vm.name.clone(),
                    reason: format!("not offered while the VM is {}", vm.state),
                });
            }
        }

        if action.shows_busy() {
            self.store.apply(StoreAction::BusyStarted {
                key: key.clone(),
                mark: BusyMark {
                    action,
                    state_before: vm.state,
                },
            });
        }

        tracing::info!(vm = %key, %action, state = %vm.state, "dispatching action");
        let handle = vm.handle();
        let result = match &request {
            ActionRequest::Pause => self.remote.pause(&handle).await,
            ActionRequest::Resume => self.remote.resume(&handle).await,
            ActionRequest::Shutdown => self.remote.shutdown(&handle).await,
            ActionRequest::ForceShutdown => self.remote.force_shutdown(&handle).await,
            ActionRequest::SendNmi => self.remote.send_nmi(&handle).await,
            ActionRequest::Reboot => self.remote.reboot(&handle).await,
            ActionRequest::ForceReboot => self.remote.force_reboot(&handle).await,
            ActionRequest::Run => self.remote.start(&handle).await,
            ActionRequest::Install => self.remote.install(&handle).await,
            ActionRequest::Clone(options) => self.remote.clone_vm(&handle, options).await,
            ActionRequest::Migrate(options) => self.remote.migrate(&handle, options).await,
            ActionRequest::Delete { storage } => delete::delete_vm(&self.remote, &vm, storage).await,
        };

        match result {
            Ok(()) => {
                if action.shows_busy() && self.busy_policy == BusyPolicy::Settle {
                    self.store.apply(StoreAction::BusySettled(key.clone()));
                }
                tracing::info!(vm = %key, %action, "action succeeded");
                if leaves_inventory(action, &vm) {
                    self.navigator.go_to(Route::VmList);
                }
                Ok(Outcome::Completed)
            }
            Err(e) => {
                if action.shows_busy() {
                    self.store.apply(StoreAction::BusySettled(key.clone()));
                }
                tracing::warn!(vm = %key, %action, "action failed: {e}");
                Ok(self.record_failure(&vm, action.failure_text(&vm.name), e))
            }
        }
    }

    /// Refresh until the busy mark for `key` is gone or `timeout` passes.
    ///
    /// Only meaningful under `BusyPolicy::StateChange`; returns `true` when a
    /// state change cleared the mark. On timeout the mark is dropped anyway so
    /// the trigger does not stay disabled forever.
    pub async fn await_state_change(&self, key: &VmKey, timeout: Duration) -> Result<bool, DeckError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.store.read(|s| s.is_busy(key)) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(vm = %key, "no state change observed before timeout");
                self.store.apply(StoreAction::BusySettled(key.clone()));
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.refresh(key.connection).await?;
        }
    }
}
