//! Virtual networks and the actions offered on them.

use std::fmt;

use crate::eligibility::Offer;
use crate::vm_state::{Connection, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub connection: Connection,
    pub id: Option<String>,
    pub active: bool,
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkKey {
    pub connection: Connection,
    pub name: String,
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.connection)
    }
}

impl Network {
    pub fn key(&self) -> NetworkKey {
        NetworkKey {
            connection: self.connection,
            name: self.name.clone(),
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        match &self.id {
            Some(id) => ResourceId(id.clone()),
            None => ResourceId(format!("network:{}", self.key())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkAction {
    Activate,
    Deactivate,
    Delete,
}

impl NetworkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkAction::Activate => "activate",
            NetworkAction::Deactivate => "deactivate",
            NetworkAction::Delete => "delete",
        }
    }

    /// Activate and deactivate show a busy indicator; delete goes through a
    /// confirmation instead.
    pub fn shows_busy(self) -> bool {
        !matches!(self, NetworkAction::Delete)
    }

    pub fn failure_text(self, network_name: &str) -> String {
        let what = match self {
            NetworkAction::Activate => "failed to get activated",
            NetworkAction::Deactivate => "failed to get deactivated",
            NetworkAction::Delete => "failed to get deleted",
        };
        format!("Network {network_name} {what}")
    }
}

impl fmt::Display for NetworkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const TRANSIENT_NETWORK_DELETE_REASON: &str =
    "Non-persistent network cannot be deleted. It ceases to exists when it's deactivated.";

/// Offer for `action` on `network`; `None` means hidden.
pub fn network_offer(network: &Network, action: NetworkAction) -> Option<Offer> {
    match action {
        NetworkAction::Activate => (!network.active).then_some(Offer::Enabled),
        NetworkAction::Deactivate => network.active.then_some(Offer::Enabled),
        NetworkAction::Delete if network.persistent => Some(Offer::Enabled),
        NetworkAction::Delete => Some(Offer::Disabled {
            reason: TRANSIENT_NETWORK_DELETE_REASON,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(active: bool, persistent: bool) -> Network {
        Network {
            name: "default".into(),
            connection: Connection::System,
            id: Some("net-uuid".into()),
            active,
            persistent,
        }
    }

    #[test]
    fn active_network_offers_deactivate_only() {
        let n = net(true, true);
        assert_eq!(network_offer(&n, NetworkAction::Deactivate), Some(Offer::Enabled));
        assert_eq!(network_offer(&n, NetworkAction::Activate), None);
    }

    #[test]
    fn inactive_network_offers_activate_only() {
        let n = net(false, true);
        assert_eq!(network_offer(&n, NetworkAction::Activate), Some(Offer::Enabled));
        assert_eq!(network_offer(&n, NetworkAction::Deactivate), None);
    }

    #[test]
    fn transient_network_delete_is_disabled() {
        let n = net(true, false);
        assert_eq!(
            network_offer(&n, NetworkAction::Delete),
            Some(Offer::Disabled {
                reason: TRANSIENT_NETWORK_DELETE_REASON
            })
        );
    }

    #[test]
    fn resource_id_falls_back_to_key() {
        let mut n = net(true, true);
        n.id = None;
        assert_eq!(n.resource_id(), ResourceId("network:default@system".into()));
    }
}
