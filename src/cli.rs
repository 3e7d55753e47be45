use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::backend::{CloneOptions, MigrateOptions};
use crate::dispatch::ActionRequest;
use crate::vm_state::Connection;

#[derive(Parser, Debug)]
#[command(name = "vmdeck", about = "Manage libvirt virtual machines from the terminal")]
pub struct Cli {
    /// Path to config file (default: ~/.config/vmdeck/vmdeck.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "plain")]
    pub output: OutputFormat,

    /// libvirt connection scope
    #[arg(long, value_enum, default_value = "system")]
    pub connection: ConnectionArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConnectionArg {
    System,
    Session,
}

impl From<ConnectionArg> for Connection {
    fn from(arg: ConnectionArg) -> Self {
        match arg {
            ConnectionArg::System => Connection::System,
            ConnectionArg::Session => Connection::Session,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List VMs with their state and available actions
    List,

    /// Show every action offered for a VM, and why disabled ones are
    Actions { name: String },

    /// Start a shut-off VM
    Run { name: String },

    /// Continue the installation of a VM created with an install phase
    Install { name: String },

    /// Ask the guest to shut down
    Shutdown { name: String },

    /// Turn the VM off immediately
    ForceShutdown { name: String },

    /// Ask the guest to reboot
    Reboot { name: String },

    /// Reset the VM immediately
    ForceReboot { name: String },

    /// Suspend a running VM
    Pause { name: String },

    /// Resume a paused VM
    Resume { name: String },

    /// Send a non-maskable interrupt to the guest
    SendNmi { name: String },

    /// Delete a VM, its snapshots and (by default) its writable storage
    Delete {
        name: String,

        /// Keep all storage
        #[arg(long)]
        keep_storage: bool,

        /// Keep the disk with this target (repeatable)
        #[arg(long = "keep", value_name = "TARGET")]
        keep: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Clone a shut-off VM
    Clone {
        name: String,

        /// Name of the new VM
        #[arg(long)]
        new_name: String,
    },

    /// Live-migrate a VM to another host
    Migrate {
        name: String,

        /// Destination libvirt URI, e.g. qemu+ssh://host/system
        destination: String,

        /// Keep the VM defined on this host; it stays on the destination
        /// only while it runs
        #[arg(long)]
        temporary: bool,
    },

    /// Manage virtual networks
    Network {
        #[command(subcommand)]
        action: NetworkCommand,
    },
}

impl Command {
    /// Target VM and request of a single lifecycle command. Commands with a
    /// flow of their own yield `None`.
    pub fn into_vm_request(self) -> Option<(String, ActionRequest)> {
        let pair = match self {
            Command::List
            | Command::Actions { .. }
            | Command::Delete { .. }
            | Command::Network { .. } => return None,
            Command::Run { name } => (name, ActionRequest::Run),
            Command::Install { name } => (name, ActionRequest::Install),
            Command::Shutdown { name } => (name, ActionRequest::Shutdown),
            Command::ForceShutdown { name } => (name, ActionRequest::ForceShutdown),
            Command::Reboot { name } => (name, ActionRequest::Reboot),
            Command::ForceReboot { name } => (name, ActionRequest::ForceReboot),
            Command::Pause { name } => (name, ActionRequest::Pause),
            Command::Resume { name } => (name, ActionRequest::Resume),
            Command::SendNmi { name } => (name, ActionRequest::SendNmi),
            Command::Clone { name, new_name } => (name, ActionRequest::Clone(CloneOptions { new_name })),
            Command::Migrate {
                name,
                destination,
                temporary,
            } => (
                name,
                ActionRequest::Migrate(MigrateOptions {
                    destination,
                    temporary,
                }),
            ),
        };
        Some(pair)
    }
}

#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// List virtual networks
    List,
    /// Start an inactive network
    Activate { name: String },
    /// Stop an active network
    Deactivate { name: String },
    /// Remove a persistent network definition
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
