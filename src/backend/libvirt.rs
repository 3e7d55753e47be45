use std::process::Stdio;

use virt::connect::Connect;
use virt::domain::Domain;
use virt::error as virt_error;
use virt::network::Network as VirtNetwork;
use virt::storage_pool::StoragePool;
use virt::storage_vol::StorageVol;
use virt::sys;

use super::{CloneOptions, DeleteOptions, MigrateOptions, NetworkRemote, VmRemote};
use crate::config::{Config, ConnectionsConfig, HelpersConfig};
use crate::error::RemoteError;
use crate::network::Network;
use crate::vm_state::{Connection, Disk, DiskKind, Snapshot, Vm, VmHandle, VmState};

/// Also drops managed-save images, snapshot metadata and UEFI NVRAM, any of
/// which makes a plain undefine fail.
const UNDEFINE_FLAGS: sys::virDomainUndefineFlagsValues = sys::VIR_DOMAIN_UNDEFINE_MANAGED_SAVE
    | sys::VIR_DOMAIN_UNDEFINE_SNAPSHOTS_METADATA
    | sys::VIR_DOMAIN_UNDEFINE_NVRAM;

struct ConnGuard(Connect);

impl std::ops::Deref for ConnGuard {
    type Target = Connect;
    fn deref(&self) -> &Connect {
        &self.0
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.close().ok();
    }
}

/// Talks to libvirtd through the C API, falling back to `virsh` and the
/// virt-install tools for what the bindings do not cover.
pub struct LibvirtBackend {
    connections: ConnectionsConfig,
    helpers: HelpersConfig,
}

impl LibvirtBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            connections: config.connections.clone(),
            helpers: config.helpers.clone(),
        }
    }

    fn uri(&self, connection: Connection) -> &str {
        match connection {
            Connection::System => &self.connections.system,
            Connection::Session => &self.connections.session,
        }
    }

    fn connect(&self, connection: Connection) -> Result<ConnGuard, RemoteError> {
        // Without this libvirt prints every error to stderr on its own.
        virt_error::clear_error_callback();

        let uri = self.uri(connection);
        Connect::open(Some(uri))
            .map(ConnGuard)
            .map_err(|e| RemoteError::new(format!("failed to connect to {uri}: {e}")))
    }

    async fn virsh(&self, connection: Connection, args: &[&str]) -> Result<String, RemoteError> {
        let mut full = vec!["-c", self.uri(connection)];
        full.extend_from_slice(args);
        run_tool("virsh", &full).await
    }

    /// Fill in everything `list_vms` reports for one domain.
    async fn describe(&self, connection: Connection, dom: &Domain) -> Result<Vm, RemoteError> {
        let name = dom.get_name()?;
        let (code, _) = dom.get_state()?;
        let mut vm = Vm::new(name, connection, state_from_code(code));
        vm.id = dom.get_uuid_string().ok();
        vm.persistent = dom.is_persistent().unwrap_or(true);
        vm.has_install_phase = dom
            .get_xml_desc(0)
            .map(|xml| install_phase_from_xml(&xml))
            .unwrap_or(false);

        // Snapshots and disks are best effort; a VM without them still lists.
        match self
            .virsh(connection, &["snapshot-list", "--name", &vm.name])
            .await
        {
            Ok(out) => vm.snapshots = parse_snapshot_names(&out),
            Err(e) => tracing::debug!(vm = %vm.name, "snapshot listing failed: {e}"),
        }
        match self
            .virsh(connection, &["domblklist", "--details", &vm.name])
            .await
        {
            Ok(out) => vm.disks = parse_domblklist(&out),
            Err(e) => tracing::debug!(vm = %vm.name, "disk listing failed: {e}"),
        }
        Ok(vm)
    }
}

/// Delete one disk's backing storage through the connection's storage
/// pools. Files that libvirt does not know as a volume are left alone:
/// the connection may point at another host.
fn remove_storage(conn: &Connect, disk: &Disk) -> Result<(), RemoteError> {
    let vol = match disk.kind {
        DiskKind::Volume => {
            let (Some(pool), Some(volume)) = (&disk.pool, &disk.volume) else {
                return Ok(());
            };
            let pool = StoragePool::lookup_by_name(conn, pool)?;
            StorageVol::lookup_by_name(&pool, volume)?
        }
        DiskKind::File => {
            let Some(path) = disk.file.as_deref() else {
                return Ok(());
            };
            StorageVol::lookup_by_path(conn, path).map_err(|e| {
                RemoteError::new(format!(
                    "{path} ({}) is not a storage volume on this connection, left in place: {e}",
                    disk.target
                ))
            })?
        }
        DiskKind::Block | DiskKind::Network => return Ok(()),
    };
    vol.delete(0)?;
    tracing::info!(disk = %disk.target, "removed disk storage");
    Ok(())
}

fn lookup(conn: &Connect, vm: &VmHandle) -> Result<Domain, RemoteError> {
    let found = match &vm.id {
        Some(id) => Domain::lookup_by_uuid_string(conn, id),
        None => Domain::lookup_by_name(conn, &vm.name),
    };
    found.map_err(|e| RemoteError::new(format!("domain {} not found: {e}", vm.name)))
}

fn lookup_network(conn: &Connect, network: &Network) -> Result<VirtNetwork, RemoteError> {
    VirtNetwork::lookup_by_name(conn, &network.name)
        .map_err(|e| RemoteError::new(format!("network {} not found: {e}", network.name)))
}

impl VmRemote for LibvirtBackend {
    async fn list_vms(&self, connection: Connection) -> Result<Vec<Vm>, RemoteError> {
        let conn = self.connect(connection)?;
        let flags = sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;
        let domains = conn.list_all_domains(flags)?;

        let mut described = Vec::with_capacity(domains.len());
        for dom in &domains {
            described.push(self.describe(connection, dom).await);
        }
        let vms = keep_described(connection, described);
        tracing::debug!(%connection, count = vms.len(), "listed domains");
        Ok(vms)
    }

    async fn start(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.create()?;
        Ok(())
    }

    async fn install(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let uri = self.uri(vm.connection);
        run_tool(
            &self.helpers.install,
            &["--connect", uri, "--reinstall", &vm.name, "--noautoconsole"],
        )
        .await?;
        Ok(())
    }

    async fn shutdown(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.shutdown()?;
        Ok(())
    }

    async fn force_shutdown(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.destroy()?;
        Ok(())
    }

    async fn reboot(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.reboot(sys::VIR_DOMAIN_REBOOT_DEFAULT)?;
        Ok(())
    }

    async fn force_reboot(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.reset()?;
        Ok(())
    }

    async fn pause(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.suspend()?;
        Ok(())
    }

    async fn resume(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.resume()?;
        Ok(())
    }

    async fn send_nmi(&self, vm: &VmHandle) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        lookup(&conn, vm)?.inject_nmi(0)?;
        Ok(())
    }

    async fn delete_snapshot(&self, vm: &VmHandle, snapshot: &str) -> Result<(), RemoteError> {
        self.virsh(vm.connection, &["snapshot-delete", &vm.name, snapshot])
            .await?;
        Ok(())
    }

    async fn delete(&self, vm: &VmHandle, options: &DeleteOptions) -> Result<(), RemoteError> {
        let conn = self.connect(vm.connection)?;
        let dom = lookup(&conn, vm)?;

        if options.destroy && dom.is_active().unwrap_or(false) {
            tracing::info!(vm = %vm.name, "forcing VM off before delete");
            dom.destroy()?;
        }
        // Undefine before touching storage so a failed undefine leaves the
        // disks intact.
        dom.undefine_flags(UNDEFINE_FLAGS)?;
        tracing::info!(vm = %vm.name, "domain undefined");

        let failures: Vec<String> = options
            .storage
            .iter()
            .filter_map(|disk| remove_storage(&conn, disk).err())
            .map(|e| e.message)
            .collect();
        if !failures.is_empty() {
            return Err(RemoteError::new(format!(
                "VM was undefined but some storage was not removed: {}",
                failures.join("; ")
            )));
        }
        Ok(())
    }

    async fn migrate(&self, vm: &VmHandle, options: &MigrateOptions) -> Result<(), RemoteError> {
        let mut args = vec!["migrate", "--live"];
        if !options.temporary {
            args.extend(["--persistent", "--undefinesource"]);
        }
        args.extend([vm.name.as_str(), options.destination.as_str()]);
        self.virsh(vm.connection, &args).await?;
        Ok(())
    }

    async fn clone_vm(&self, vm: &VmHandle, options: &CloneOptions) -> Result<(), RemoteError> {
        let uri = self.uri(vm.connection);
        run_tool(
            &self.helpers.clone,
            &[
                "--connect",
                uri,
                "--original",
                &vm.name,
                "--name",
                &options.new_name,
                "--auto-clone",
            ],
        )
        .await?;
        Ok(())
    }
}

impl NetworkRemote for LibvirtBackend {
    async fn list_networks(&self, connection: Connection) -> Result<Vec<Network>, RemoteError> {
        let conn = self.connect(connection)?;
        let flags = sys::VIR_CONNECT_LIST_NETWORKS_ACTIVE | sys::VIR_CONNECT_LIST_NETWORKS_INACTIVE;
        let mut networks = conn
            .list_all_networks(flags)?
            .iter()
            .map(|net| -> Result<Network, RemoteError> {
                Ok(Network {
                    name: net.get_name()?,
                    connection,
                    id: net.get_uuid_string().ok(),
                    active: net.is_active().unwrap_or(false),
                    persistent: net.is_persistent().unwrap_or(true),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    async fn activate_network(&self, network: &Network) -> Result<(), RemoteError> {
        let conn = self.connect(network.connection)?;
        lookup_network(&conn, network)?.create()?;
        Ok(())
    }

    async fn deactivate_network(&self, network: &Network) -> Result<(), RemoteError> {
        let conn = self.connect(network.connection)?;
        lookup_network(&conn, network)?.destroy()?;
        Ok(())
    }

    async fn undefine_network(&self, network: &Network) -> Result<(), RemoteError> {
        let conn = self.connect(network.connection)?;
        lookup_network(&conn, network)?.undefine()?;
        Ok(())
    }
}

/// Run a helper binary and return its stdout. A non-zero exit becomes an
/// error carrying the tool's stderr.
async fn run_tool(program: &str, args: &[&str]) -> Result<String, RemoteError> {
    tracing::debug!(program, ?args, "running helper");
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| RemoteError::new(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("{program} exited with {}", output.status),
            msg => msg.to_string(),
        };
        return Err(RemoteError::new(message));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Sorted VMs that could be described. A domain can vanish between listing
/// and describing it; it is skipped rather than failing the whole list.
fn keep_described(connection: Connection, described: Vec<Result<Vm, RemoteError>>) -> Vec<Vm> {
    let mut vms: Vec<Vm> = described
        .into_iter()
        .filter_map(|r| match r {
            Ok(vm) => Some(vm),
            Err(e) => {
                tracing::warn!(%connection, "skipping domain: {e}");
                None
            }
        })
        .collect();
    vms.sort_by(|a, b| a.name.cmp(&b.name));
    vms
}

fn state_from_code(code: sys::virDomainState) -> VmState {
    match code {
        sys::VIR_DOMAIN_RUNNING => VmState::Running,
        sys::VIR_DOMAIN_BLOCKED => VmState::Blocked,
        sys::VIR_DOMAIN_PAUSED => VmState::Paused,
        sys::VIR_DOMAIN_SHUTDOWN => VmState::ShuttingDown,
        sys::VIR_DOMAIN_SHUTOFF => VmState::ShutOff,
        sys::VIR_DOMAIN_CRASHED => VmState::Crashed,
        sys::VIR_DOMAIN_PMSUSPENDED => VmState::PmSuspended,
        _ => VmState::Unknown,
    }
}

/// The install phase is recorded in the domain metadata by whatever created
/// the VM: `<...:has_install_phase>true</...:has_install_phase>`.
fn install_phase_from_xml(xml: &str) -> bool {
    let Some(start) = xml.find("has_install_phase>") else {
        return false;
    };
    let value = &xml[start + "has_install_phase>".len()..];
    value.trim_start().starts_with("true")
}

/// `virsh snapshot-list --name`: one name per line, blank lines ignored.
fn parse_snapshot_names(out: &str) -> Vec<Snapshot> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|name| Snapshot { name: name.into() })
        .collect()
}

/// `virsh domblklist --details`:
///
/// ```text
///  Type     Device   Target   Source
/// -----------------------------------------------------------
///  file     disk     vda      /var/lib/libvirt/images/a.qcow2
///  file     cdrom    sda      -
///  volume   disk     vdb      default/b.qcow2
/// ```
///
/// CD-ROMs are read-only. Volume sources are `pool/volume`.
fn parse_domblklist(out: &str) -> Vec<Disk> {
    out.lines()
        .skip_while(|l| !l.trim_start().starts_with('-'))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let kind = cols.next()?;
            let device = cols.next()?;
            let target = cols.next()?;
            let source = cols.collect::<Vec<_>>().join(" ");
            let source = (!source.is_empty() && source != "-").then_some(source);

            let kind = match kind {
                "file" => DiskKind::File,
                "volume" => DiskKind::Volume,
                "block" => DiskKind::Block,
                _ => DiskKind::Network,
            };
            let (file, pool, volume) = match (kind, source) {
                (DiskKind::Volume, Some(src)) => match src.split_once('/') {
                    Some((pool, vol)) => (None, Some(pool.to_string()), Some(vol.to_string())),
                    None => (None, None, Some(src)),
                },
                (_, src) => (src, None, None),
            };
            Some(Disk {
                target: target.into(),
                kind,
                file,
                pool,
                volume,
                readonly: device == "cdrom",
            })
        })
        .collect()
}
