//! Network actions: activate, deactivate, delete.

use crate::backend::NetworkRemote;
use crate::eligibility::Offer;
use crate::error::{DeckError, RemoteError};
use crate::ledger::NewNotification;
use crate::nav::{Navigator, Route};
use crate::network::{Network, NetworkAction, NetworkKey, network_offer};
use crate::store::StoreAction;
use crate::vm_state::Connection;

use super::{Dispatcher, Outcome};

impl<R: NetworkRemote, N: Navigator> Dispatcher<R, N> {
    pub async fn refresh_networks(&self, connection: Connection) -> Result<(), DeckError> {
        let networks = self
            .remote
            .list_networks(connection)
            .await
            .map_err(|e| DeckError::Libvirt {
                message: format!("failed to list networks: {e}"),
                hint: format!("check that libvirtd is running and the {connection} connection is reachable"),
            })?;
        self.store.apply(StoreAction::NetworksRefreshed {
            connection,
            networks,
        });
        Ok(())
    }

    pub fn find_network(&self, key: &NetworkKey) -> Result<Network, DeckError> {
        self.store
            .read(|s| s.find_network(key).cloned())
            .ok_or_else(|| DeckError::NetworkNotFound {
                name: key.name.clone(),
                connection: key.connection.to_string(),
            })
    }

    pub async fn dispatch_network(
        &self,
        key: &NetworkKey,
        action: NetworkAction,
    ) -> Result<Outcome, DeckError> {
        let network = self.find_network(key)?;
        match network_offer(&network, action) {
            Some(Offer::Enabled) => {}
            Some(Offer::Disabled { reason }) => {
                return Err(DeckError::ActionNotPermitted {
                    action: action.to_string(),
                    name: network.name.clone(),
                    reason: reason.into(),
                });
            }
            None => {
                let now = if network.active { "active" } else { "inactive" };
                return Err(DeckError::ActionNotPermitted {
                    action: action.to_string(),
                    name: network.name.clone(),
                    reason: format!("network is already {now}"),
                });
            }
        }

        if action.shows_busy() {
            self.store.apply(StoreAction::NetworkBusyStarted(key.clone()));
        }

        tracing::info!(network = %key, %action, "dispatching network action");
        let result = match action {
            NetworkAction::Activate => self.remote.activate_network(&network).await,
            NetworkAction::Deactivate => self.remote.deactivate_network(&network).await,
            NetworkAction::Delete => self.delete_network(&network).await,
        };

        if action.shows_busy() {
            self.store.apply(StoreAction::NetworkBusySettled(key.clone()));
        }

        match result {
            Ok(()) => {
                if action == NetworkAction::Delete {
                    self.navigator.go_to(Route::Networks);
                }
                Ok(Outcome::Completed)
            }
            Err(e) => {
                tracing::warn!(network = %key, %action, "network action failed: {e}");
                let text = action.failure_text(&network.name);
                let detail = e.message;
                let index = self.store.notify(NewNotification {
                    resource_id: network.resource_id(),
                    text: text.clone(),
                    detail: detail.clone(),
                });
                Ok(Outcome::Failed {
                    index,
                    text,
                    detail,
                })
            }
        }
    }

    /// An active network is stopped before its definition is removed.
    async fn delete_network(&self, network: &Network) -> Result<(), RemoteError> {
        if network.active {
            self.remote.deactivate_network(network).await?;
        }
        self.remote.undefine_network(network).await
    }
}
