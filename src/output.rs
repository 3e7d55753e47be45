//! Plain and JSON rendering of store contents.

use std::fmt::Write as _;

use crate::cli::OutputFormat;
use crate::dispatch::Outcome;
use crate::eligibility::{Offer, cpu_type_edit_offer, eligible_actions};
use crate::helpers::HostHelpers;
use crate::store::Snapshot;
use crate::vm_state::Vm;

// ── JSON shapes ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, facet::Facet)]
pub struct VmRow {
    pub name: String,
    pub connection: String,
    pub state: String,
    pub persistent: bool,
    pub busy: bool,
    pub notifications: usize,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, facet::Facet)]
pub struct ActionRow {
    pub action: String,
    pub enabled: bool,
    pub reason: Option<String>,
}

#[derive(facet::Facet)]
struct ActionsJson {
    name: String,
    state: String,
    actions: Vec<ActionRow>,
    cpu_type_edit: Option<ActionRow>,
}

#[derive(Debug, Clone, PartialEq, facet::Facet)]
pub struct NetworkRow {
    pub name: String,
    pub connection: String,
    pub active: bool,
    pub persistent: bool,
}

#[derive(facet::Facet)]
struct OutcomeJson {
    name: String,
    action: String,
    result: String,
    text: Option<String>,
    detail: Option<String>,
}

// ── Rows ────────────────────────────────────────────────────────────

/// One row per listed VM; `actions` holds only the enabled ones.
pub fn vm_rows(snapshot: &Snapshot, helpers: &HostHelpers) -> Vec<VmRow> {
    snapshot
        .combined_vms()
        .map(|vm| VmRow {
            name: vm.name.clone(),
            connection: vm.connection.to_string(),
            state: if vm.is_unconfirmed() {
                "creating".into()
            } else {
                vm.state.to_string()
            },
            persistent: vm.persistent,
            busy: snapshot.is_busy(&vm.key()),
            notifications: snapshot.ledger.count(&vm.resource_id()),
            actions: eligible_actions(vm, helpers)
                .enabled()
                .map(|a| a.to_string())
                .collect(),
        })
        .collect()
}

fn action_row(action: String, offer: &Offer) -> ActionRow {
    match offer {
        Offer::Enabled => ActionRow {
            action,
            enabled: true,
            reason: None,
        },
        Offer::Disabled { reason } => ActionRow {
            action,
            enabled: false,
            reason: Some((*reason).to_string()),
        },
    }
}

pub fn action_rows(vm: &Vm, helpers: &HostHelpers) -> Vec<ActionRow> {
    eligible_actions(vm, helpers)
        .iter()
        .map(|(action, offer)| action_row(action.to_string(), offer))
        .collect()
}

pub fn network_rows(snapshot: &Snapshot) -> Vec<NetworkRow> {
    snapshot
        .networks
        .iter()
        .map(|n| NetworkRow {
            name: n.name.clone(),
            connection: n.connection.to_string(),
            active: n.active,
            persistent: n.persistent,
        })
        .collect()
}

// ── Rendering ───────────────────────────────────────────────────────

pub fn render_vm_list(rows: &[VmRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => facet_json::to_string(&rows.to_vec()).expect("JSON serialization"),
        OutputFormat::Plain => {
            if rows.is_empty() {
                return "No VMs defined on this connection.\n".into();
            }
            let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
            let mut out = format!("{:<width$}  {:<11}  ACTIONS\n", "NAME", "STATE");
            for row in rows {
                let mut state = row.state.clone();
                if row.busy {
                    state.push('*');
                }
                let _ = write!(out, "{:<width$}  {:<11}  {}", row.name, state, row.actions.join(", "));
                if row.notifications > 0 {
                    let _ = write!(out, "  ({} error(s))", row.notifications);
                }
                if !row.persistent {
                    out.push_str("  [transient]");
                }
                out.push('\n');
            }
            out
        }
    }
}

pub fn render_actions(vm: &Vm, helpers: &HostHelpers, format: OutputFormat) -> String {
    let rows = action_rows(vm, helpers);
    let cpu = cpu_type_edit_offer(vm, helpers).map(|o| action_row("edit-cpu-type".into(), &o));
    match format {
        OutputFormat::Json => facet_json::to_string(&ActionsJson {
            name: vm.name.clone(),
            state: vm.state.to_string(),
            actions: rows,
            cpu_type_edit: cpu,
        })
        .expect("JSON serialization"),
        OutputFormat::Plain => {
            let mut out = format!("VM '{}' ({})\n", vm.name, vm.state);
            if rows.is_empty() {
                out.push_str("  no actions available\n");
            }
            for row in rows.iter().chain(cpu.iter()) {
                match &row.reason {
                    None => {
                        let _ = writeln!(out, "  {}", row.action);
                    }
                    Some(reason) => {
                        let _ = writeln!(out, "  {} (disabled: {reason})", row.action);
                    }
                }
            }
            out
        }
    }
}

pub fn render_network_list(rows: &[NetworkRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => facet_json::to_string(&rows.to_vec()).expect("JSON serialization"),
        OutputFormat::Plain => {
            if rows.is_empty() {
                return "No networks defined on this connection.\n".into();
            }
            let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
            let mut out = format!("{:<width$}  {:<8}  PERSISTENT\n", "NAME", "STATE");
            for row in rows {
                let state = if row.active { "active" } else { "inactive" };
                let persistent = if row.persistent { "yes" } else { "no" };
                let _ = writeln!(out, "{:<width$}  {state:<8}  {persistent}", row.name);
            }
            out
        }
    }
}

/// Result line for one dispatched action. Failures in plain mode are left to
/// the error report.
pub fn render_outcome(name: &str, action: &str, outcome: &Outcome, format: OutputFormat) -> Option<String> {
    match (format, outcome) {
        (OutputFormat::Json, Outcome::Completed) => Some(
            facet_json::to_string(&OutcomeJson {
                name: name.into(),
                action: action.into(),
                result: "completed".into(),
                text: None,
                detail: None,
            })
            .expect("JSON serialization"),
        ),
        (OutputFormat::Json, Outcome::Failed { text, detail, .. }) => Some(
            facet_json::to_string(&OutcomeJson {
                name: name.into(),
                action: action.into(),
                result: "failed".into(),
                text: Some(text.clone()),
                detail: Some(detail.clone()),
            })
            .expect("JSON serialization"),
        ),
        (OutputFormat::Plain, Outcome::Completed) => Some(format!("{action}: {name} done")),
        (OutputFormat::Plain, Outcome::Failed { .. }) => None,
    }
}
