//! Which lifecycle actions a VM offers right now.
//!
//! All gating lives in `ACTION_TABLE`: one row per action, naming the states
//! it is offered in and the extra requirement that can hide or disable it.
//! The CLI uses the table to list actions and the dispatcher uses the same
//! table to refuse requests, so the two never drift apart.

use std::collections::BTreeMap;
use std::fmt;

use crate::helpers::HostHelpers;
use crate::vm_state::{Vm, VmState};

// ── Actions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VmAction {
    Pause,
    Resume,
    Shutdown,
    ForceShutdown,
    SendNmi,
    Reboot,
    ForceReboot,
    Run,
    Install,
    Clone,
    Migrate,
    Delete,
}

impl VmAction {
    pub const ALL: [VmAction; 12] = [
        VmAction::Pause,
        VmAction::Resume,
        VmAction::Shutdown,
        VmAction::ForceShutdown,
        VmAction::SendNmi,
        VmAction::Reboot,
        VmAction::ForceReboot,
        VmAction::Run,
        VmAction::Install,
        VmAction::Clone,
        VmAction::Migrate,
        VmAction::Delete,
    ];

    /// Command-line spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            VmAction::Pause => "pause",
            VmAction::Resume => "resume",
            VmAction::Shutdown => "shutdown",
            VmAction::ForceShutdown => "force-shutdown",
            VmAction::SendNmi => "send-nmi",
            VmAction::Reboot => "reboot",
            VmAction::ForceReboot => "force-reboot",
            VmAction::Run => "run",
            VmAction::Install => "install",
            VmAction::Clone => "clone",
            VmAction::Migrate => "migrate",
            VmAction::Delete => "delete",
        }
    }

    /// Actions whose trigger shows a busy indicator while in flight.
    pub fn shows_busy(self) -> bool {
        matches!(self, VmAction::Run | VmAction::Shutdown)
    }

    /// Summary line of the notification raised when the remote call fails.
    pub fn failure_text(self, vm_name: &str) -> String {
        let what = match self {
            VmAction::Pause => "failed to pause",
            VmAction::Resume => "failed to resume",
            VmAction::Shutdown => "failed to shutdown",
            VmAction::ForceShutdown => "failed to force shutdown",
            VmAction::SendNmi => "failed to send NMI",
            VmAction::Reboot => "failed to reboot",
            VmAction::ForceReboot => "failed to force reboot",
            VmAction::Run => "failed to start",
            VmAction::Install => "failed to get installed",
            VmAction::Clone => "failed to get cloned",
            VmAction::Migrate => "failed to get migrated",
            VmAction::Delete => "failed to get deleted",
        };
        format!("VM {vm_name} {what}")
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Offers ──────────────────────────────────────────────────────────

/// How an action is presented. Actions that are not offered at all are
/// simply absent from the `ActionSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    Enabled,
    /// Shown, but cannot be triggered; the reason explains why.
    Disabled { reason: &'static str },
}

impl Offer {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Offer::Enabled)
    }
}

pub const TRANSIENT_DELETE_REASON: &str =
    "This VM is transient. Shut it down if you wish to delete it.";
pub const CLONE_HELPER_REASON: &str =
    "virt-install package needs to be installed on the system in order to clone VMs";
pub const CPU_EDIT_HELPER_REASON: &str =
    "virt-install package needs to be installed on the system in order to edit this attribute";
pub const CPU_EDIT_TRANSIENT_REASON: &str =
    "This VM is transient. Only persistent VMs can have their CPU type edited.";

// ── Table ───────────────────────────────────────────────────────────

/// States in which a row applies. `Unknown` is never admitted.
#[derive(Debug, Clone, Copy)]
pub enum StateGate {
    Only(&'static [VmState]),
    NotShutOff,
    Any,
}

impl StateGate {
    pub fn admits(self, state: VmState) -> bool {
        if state == VmState::Unknown {
            return false;
        }
        match self {
            StateGate::Only(states) => states.contains(&state),
            StateGate::NotShutOff => state != VmState::ShutOff,
            StateGate::Any => true,
        }
    }
}

/// Extra condition checked after the state gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    /// Hidden while the VM still needs its install step.
    NoInstallPhase,
    /// Hidden unless the VM needs its install step.
    InstallPhase,
    /// Disabled for transient VMs.
    Persistent,
    /// Disabled when the clone helper is missing on the host.
    CloneHelper,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionRule {
    pub action: VmAction,
    pub states: StateGate,
    pub requires: Requirement,
}

const RUNNING_OR_PAUSED: &[VmState] = &[VmState::Running, VmState::Paused];

pub const ACTION_TABLE: &[ActionRule] = &[
    ActionRule {
        action: VmAction::Pause,
        states: StateGate::Only(&[VmState::Running]),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::Resume,
        states: StateGate::Only(&[VmState::Paused]),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::Shutdown,
        states: StateGate::Only(RUNNING_OR_PAUSED),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::ForceShutdown,
        states: StateGate::Only(RUNNING_OR_PAUSED),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::SendNmi,
        states: StateGate::Only(RUNNING_OR_PAUSED),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::Reboot,
        states: StateGate::Only(RUNNING_OR_PAUSED),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::ForceReboot,
        states: StateGate::Only(RUNNING_OR_PAUSED),
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::Run,
        states: StateGate::Only(&[VmState::ShutOff]),
        requires: Requirement::NoInstallPhase,
    },
    ActionRule {
        action: VmAction::Install,
        states: StateGate::Only(&[VmState::ShutOff]),
        requires: Requirement::InstallPhase,
    },
    ActionRule {
        action: VmAction::Clone,
        states: StateGate::Only(&[VmState::ShutOff]),
        requires: Requirement::CloneHelper,
    },
    ActionRule {
        action: VmAction::Migrate,
        states: StateGate::NotShutOff,
        requires: Requirement::None,
    },
    ActionRule {
        action: VmAction::Delete,
        states: StateGate::Any,
        requires: Requirement::Persistent,
    },
];

/// The rule row for an action.
pub fn rule_for(action: VmAction) -> &'static ActionRule {
    ACTION_TABLE
        .iter()
        .find(|r| r.action == action)
        .unwrap_or_else(|| unreachable!("every VmAction has a table row"))
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Offered actions, ordered as `VmAction` is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet {
    offers: BTreeMap<VmAction, Offer>,
}

impl ActionSet {
    pub fn offer(&self, action: VmAction) -> Option<&Offer> {
        self.offers.get(&action)
    }

    pub fn is_enabled(&self, action: VmAction) -> bool {
        self.offer(action).is_some_and(Offer::is_enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VmAction, &Offer)> {
        self.offers.iter().map(|(a, o)| (*a, o))
    }

    pub fn enabled(&self) -> impl Iterator<Item = VmAction> + '_ {
        self.iter().filter(|(_, o)| o.is_enabled()).map(|(a, _)| a)
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

/// Evaluate one table row against a VM. `None` means hidden.
fn evaluate(rule: &ActionRule, vm: &Vm, helpers: &HostHelpers) -> Option<Offer> {
    if !rule.states.admits(vm.state) {
        return None;
    }
    match rule.requires {
        Requirement::None => Some(Offer::Enabled),
        Requirement::NoInstallPhase => (!vm.has_install_phase).then_some(Offer::Enabled),
        Requirement::InstallPhase => vm.has_install_phase.then_some(Offer::Enabled),
        Requirement::Persistent if vm.persistent => Some(Offer::Enabled),
        Requirement::Persistent => Some(Offer::Disabled {
            reason: TRANSIENT_DELETE_REASON,
        }),
        Requirement::CloneHelper if helpers.clone => Some(Offer::Enabled),
        Requirement::CloneHelper => Some(Offer::Disabled {
            reason: CLONE_HELPER_REASON,
        }),
    }
}

/// Compute every offered action for `vm`. Pure; evaluate fresh on each use.
pub fn eligible_actions(vm: &Vm, helpers: &HostHelpers) -> ActionSet {
    if vm.is_unconfirmed() {
        return ActionSet::default();
    }
    let offers = ACTION_TABLE
        .iter()
        .filter_map(|rule| evaluate(rule, vm, helpers).map(|o| (rule.action, o)))
        .collect();
    ActionSet { offers }
}

/// Offer for a single action, using the same table.
pub fn offer_for(vm: &Vm, action: VmAction, helpers: &HostHelpers) -> Option<Offer> {
    if vm.is_unconfirmed() {
        return None;
    }
    evaluate(rule_for(action), vm, helpers)
}

/// CPU-type editing needs the CPU-edit helper and a persistent definition.
/// A missing helper is reported first.
pub fn cpu_type_edit_offer(vm: &Vm, helpers: &HostHelpers) -> Option<Offer> {
    if vm.is_unconfirmed() || vm.state == VmState::Unknown {
        return None;
    }
    let offer = if !helpers.cpu_edit {
        Offer::Disabled {
            reason: CPU_EDIT_HELPER_REASON,
        }
    } else if !vm.persistent {
        Offer::Disabled {
            reason: CPU_EDIT_TRANSIENT_REASON,
        }
    } else {
        Offer::Enabled
    };
    Some(offer)
}

/// Whether deleting this VM also forces it off first.
pub fn delete_forces_off(vm: &Vm) -> bool {
    !vm.state.is_shut_off()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm_state::Connection;
    use std::collections::BTreeSet;

    fn vm(state: VmState, persistent: bool, install: bool) -> Vm {
        let mut vm = Vm::new("guest", Connection::System, state);
        vm.id = Some("uuid-guest".into());
        vm.persistent = persistent;
        vm.has_install_phase = install;
        vm
    }

    fn all_helpers() -> HostHelpers {
        HostHelpers {
            clone: true,
            cpu_edit: true,
        }
    }

    fn enabled(vm: &Vm, helpers: &HostHelpers) -> BTreeSet<VmAction> {
        eligible_actions(vm, helpers).enabled().collect()
    }

    // ── Reference table ──

    /// Independent statement of the policy, checked against the table.
    fn expected(state: VmState, persistent: bool, install: bool) -> BTreeSet<VmAction> {
        use VmAction::*;
        let mut out = BTreeSet::new();
        match state {
            VmState::Running => {
                out.extend([Pause, Shutdown, ForceShutdown, SendNmi, Reboot, ForceReboot, Migrate]);
            }
            VmState::Paused => {
                out.extend([Resume, Shutdown, ForceShutdown, SendNmi, Reboot, ForceReboot, Migrate]);
            }
            VmState::ShutOff => {
                out.insert(if install { Install } else { Run });
                out.insert(Clone);
            }
            VmState::Unknown => return out,
            _ => {
                out.insert(Migrate);
            }
        }
        if persistent {
            out.insert(Delete);
        }
        out
    }

    #[test]
    fn table_matches_policy_for_every_combination() {
        let helpers = all_helpers();
        for state in VmState::ALL {
            for persistent in [true, false] {
                for install in [true, false] {
                    let vm = vm(state, persistent, install);
                    assert_eq!(
                        enabled(&vm, &helpers),
                        expected(state, persistent, install),
                        "state={state:?} persistent={persistent} install={install}"
                    );
                }
            }
        }
    }

    #[test]
    fn every_action_has_exactly_one_row() {
        for action in VmAction::ALL {
            assert_eq!(ACTION_TABLE.iter().filter(|r| r.action == action).count(), 1);
        }
    }

    // ── Scenarios ──

    #[test]
    fn shut_off_with_install_phase_offers_install_not_run() {
        let vm = vm(VmState::ShutOff, true, true);
        let set = eligible_actions(&vm, &HostHelpers::default());
        assert!(set.is_enabled(VmAction::Install));
        assert!(set.offer(VmAction::Run).is_none());
    }

    #[test]
    fn running_persistent_offers_lifecycle_and_delete() {
        let vm = vm(VmState::Running, true, false);
        let set = enabled(&vm, &HostHelpers::default());
        for action in [
            VmAction::Pause,
            VmAction::Shutdown,
            VmAction::ForceShutdown,
            VmAction::SendNmi,
            VmAction::Reboot,
            VmAction::ForceReboot,
            VmAction::Migrate,
            VmAction::Delete,
        ] {
            assert!(set.contains(&action), "{action} missing");
        }
        assert!(!set.contains(&VmAction::Run));
        assert!(!set.contains(&VmAction::Install));
    }

    #[test]
    fn transient_delete_is_never_enabled() {
        for state in VmState::ALL {
            let vm = vm(state, false, false);
            let set = eligible_actions(&vm, &all_helpers());
            assert!(!set.is_enabled(VmAction::Delete), "state={state:?}");
            if state != VmState::Unknown {
                assert_eq!(
                    set.offer(VmAction::Delete),
                    Some(&Offer::Disabled {
                        reason: TRANSIENT_DELETE_REASON
                    })
                );
            }
        }
    }

    #[test]
    fn unknown_state_offers_nothing() {
        let vm = vm(VmState::Unknown, true, false);
        assert!(eligible_actions(&vm, &all_helpers()).is_empty());
        assert!(cpu_type_edit_offer(&vm, &all_helpers()).is_none());
    }

    #[test]
    fn unconfirmed_placeholder_offers_nothing() {
        let vm = Vm::placeholder("fresh", Connection::System);
        assert!(eligible_actions(&vm, &all_helpers()).is_empty());
        assert!(offer_for(&vm, VmAction::Run, &all_helpers()).is_none());
    }

    #[test]
    fn clone_disabled_without_helper() {
        let vm = vm(VmState::ShutOff, true, false);
        let set = eligible_actions(&vm, &HostHelpers::default());
        assert_eq!(
            set.offer(VmAction::Clone),
            Some(&Offer::Disabled {
                reason: CLONE_HELPER_REASON
            })
        );
    }

    #[test]
    fn clone_hidden_when_running() {
        let vm = vm(VmState::Running, true, false);
        assert!(offer_for(&vm, VmAction::Clone, &all_helpers()).is_none());
    }

    #[test]
    fn cpu_edit_follows_helper() {
        let vm = vm(VmState::ShutOff, true, false);
        assert_eq!(cpu_type_edit_offer(&vm, &all_helpers()), Some(Offer::Enabled));
        assert!(matches!(
            cpu_type_edit_offer(&vm, &HostHelpers::default()),
            Some(Offer::Disabled { .. })
        ));
    }

    #[test]
    fn cpu_edit_disabled_for_transient_vm_with_helper() {
        let vm = vm(VmState::Running, false, false);
        assert_eq!(
            cpu_type_edit_offer(&vm, &all_helpers()),
            Some(Offer::Disabled {
                reason: CPU_EDIT_TRANSIENT_REASON
            })
        );
        assert_eq!(
            cpu_type_edit_offer(&vm, &HostHelpers::default()),
            Some(Offer::Disabled {
                reason: CPU_EDIT_HELPER_REASON
            })
        );
    }

    #[test]
    fn delete_forces_off_unless_shut_off() {
        assert!(delete_forces_off(&vm(VmState::Running, true, false)));
        assert!(delete_forces_off(&vm(VmState::Paused, true, false)));
        assert!(!delete_forces_off(&vm(VmState::ShutOff, true, false)));
    }

    #[test]
    fn busy_indicator_only_for_run_and_shutdown() {
        let busy: Vec<_> = VmAction::ALL.into_iter().filter(|a| a.shows_busy()).collect();
        assert_eq!(busy, vec![VmAction::Shutdown, VmAction::Run]);
    }

    #[test]
    fn failure_text_names_the_vm() {
        assert_eq!(VmAction::Run.failure_text("web"), "VM web failed to start");
        assert_eq!(VmAction::Delete.failure_text("db"), "VM db failed to get deleted");
    }
}
