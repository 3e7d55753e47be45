//! Shared vocabulary for managed VMs.
//!
//! `VmState` is what the hypervisor reports for a domain. `Vm` is the record
//! the store holds; it is replaced wholesale on every refresh and never
//! patched field by field.

use std::fmt;

/// Lifecycle state as reported by libvirt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VmState {
    Running,
    /// Running but blocked on a resource (libvirt "idle").
    Blocked,
    /// Suspended but resident in memory.
    Paused,
    /// Guest acknowledged a shutdown request and is going down.
    ShuttingDown,
    ShutOff,
    Crashed,
    /// Suspended by guest power management.
    PmSuspended,
    /// Anything this build does not recognize.
    Unknown,
}

impl VmState {
    pub const ALL: [VmState; 8] = [
        VmState::Running,
        VmState::Blocked,
        VmState::Paused,
        VmState::ShuttingDown,
        VmState::ShutOff,
        VmState::Crashed,
        VmState::PmSuspended,
        VmState::Unknown,
    ];

    /// Parse libvirt's textual state name. Unrecognized names map to
    /// `Unknown` so that version skew never turns into an error.
    pub fn from_libvirt_name(name: &str) -> Self {
        match name.trim() {
            "running" => VmState::Running,
            "idle" | "blocked" => VmState::Blocked,
            "paused" => VmState::Paused,
            "shutdown" | "in shutdown" => VmState::ShuttingDown,
            "shut off" | "shutoff" => VmState::ShutOff,
            "crashed" => VmState::Crashed,
            "pmsuspended" => VmState::PmSuspended,
            _ => VmState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VmState::Running => "running",
            VmState::Blocked => "idle",
            VmState::Paused => "paused",
            VmState::ShuttingDown => "shutdown",
            VmState::ShutOff => "shut off",
            VmState::Crashed => "crashed",
            VmState::PmSuspended => "pmsuspended",
            VmState::Unknown => "unknown",
        }
    }

    pub fn is_shut_off(self) -> bool {
        matches!(self, VmState::ShutOff)
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hypervisor connection scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Connection {
    System,
    Session,
}

impl Connection {
    pub fn as_str(self) -> &'static str {
        match self {
            Connection::System => "system",
            Connection::Session => "session",
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a VM within the console: name + connection scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmKey {
    pub connection: Connection,
    pub name: String,
}

impl VmKey {
    pub fn new(connection: Connection, name: impl Into<String>) -> Self {
        Self {
            connection,
            name: name.into(),
        }
    }
}

impl fmt::Display for VmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.connection)
    }
}

/// Key used by the notification ledger to tag which entity an error is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub String);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a remote call needs to address a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmHandle {
    pub name: String,
    /// Domain UUID; `None` until the backend has confirmed the domain.
    pub id: Option<String>,
    pub connection: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskKind {
    File,
    Volume,
    Block,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    /// Guest device name, e.g. `vda`.
    pub target: String,
    pub kind: DiskKind,
    pub file: Option<String>,
    pub pool: Option<String>,
    pub volume: Option<String>,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    pub name: String,
    pub connection: Connection,
    pub id: Option<String>,
    pub state: VmState,
    pub persistent: bool,
    pub has_install_phase: bool,
    /// Locally created entry the backend has not confirmed yet.
    pub placeholder: bool,
    pub snapshots: Vec<Snapshot>,
    pub disks: Vec<Disk>,
}

impl Vm {
    /// A minimal confirmed VM; the backend fills in the rest.
    pub fn new(name: impl Into<String>, connection: Connection, state: VmState) -> Self {
        Self {
            name: name.into(),
            connection,
            id: None,
            state,
            persistent: true,
            has_install_phase: false,
            placeholder: false,
            snapshots: Vec::new(),
            disks: Vec::new(),
        }
    }

    /// An entry created locally (e.g. right after a create request) before
    /// libvirt reports the domain.
    pub fn placeholder(name: impl Into<String>, connection: Connection) -> Self {
        Self {
            placeholder: true,
            ..Self::new(name, connection, VmState::ShutOff)
        }
    }

    pub fn key(&self) -> VmKey {
        VmKey::new(self.connection, self.name.clone())
    }

    pub fn handle(&self) -> VmHandle {
        VmHandle {
            name: self.name.clone(),
            id: self.id.clone(),
            connection: self.connection,
        }
    }

    /// Ledger tag: the domain UUID when known, otherwise the identity key.
    pub fn resource_id(&self) -> ResourceId {
        match &self.id {
            Some(id) => ResourceId(id.clone()),
            None => ResourceId(self.key().to_string()),
        }
    }

    /// A placeholder without a backend identity exposes no actions.
    pub fn is_unconfirmed(&self) -> bool {
        self.placeholder && self.id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_libvirt_state_names() {
        assert_eq!(VmState::from_libvirt_name("running"), VmState::Running);
        assert_eq!(VmState::from_libvirt_name("idle"), VmState::Blocked);
        assert_eq!(VmState::from_libvirt_name("paused"), VmState::Paused);
        assert_eq!(VmState::from_libvirt_name("shutdown"), VmState::ShuttingDown);
        assert_eq!(VmState::from_libvirt_name("shut off"), VmState::ShutOff);
        assert_eq!(VmState::from_libvirt_name("crashed"), VmState::Crashed);
        assert_eq!(VmState::from_libvirt_name("pmsuspended"), VmState::PmSuspended);
    }

    #[test]
    fn unrecognized_state_is_unknown() {
        assert_eq!(VmState::from_libvirt_name("frobnicated"), VmState::Unknown);
        assert_eq!(VmState::from_libvirt_name(""), VmState::Unknown);
    }

    #[test]
    fn state_names_round_trip_for_known_states() {
        for state in VmState::ALL {
            if state == VmState::Unknown {
                continue;
            }
            assert_eq!(VmState::from_libvirt_name(state.as_str()), state);
        }
    }

    #[test]
    fn resource_id_prefers_uuid() {
        let mut vm = Vm::new("web", Connection::System, VmState::Running);
        assert_eq!(vm.resource_id(), ResourceId("web@system".into()));
        vm.id = Some("4b2f".into());
        assert_eq!(vm.resource_id(), ResourceId("4b2f".into()));
    }

    #[test]
    fn placeholder_is_unconfirmed_until_it_has_an_id() {
        let mut vm = Vm::placeholder("new", Connection::Session);
        assert!(vm.is_unconfirmed());
        vm.id = Some("abc".into());
        assert!(!vm.is_unconfirmed());
    }
}
