//! High-level VM lifecycle operations.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::HypervisorConfig;
use crate::devices::{DeviceConfigurator, DiskDeviceBuilder, NetworkDeviceBuilder};
use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{
    CloneRequest, DeployRequest, DesiredPower, DeviceOperation, DeviceRequest, DeviceTarget,
    ManagedObjectRef, ObjectKind, PowerState, VmConfigSpec, VmSnapshot,
};
use crate::placement::{random_hostname, select_datastore, GuestCustomization};
use crate::session::{with_session, HypervisorConnector, HypervisorSession};
use crate::task::TaskWaiter;
use crate::vim::VimJsonConnector;

/// VM operations. Each public call opens and closes its own session.
#[derive(Clone)]
pub struct HypervisorClient {
    connector: Arc<dyn HypervisorConnector>,
    config: Arc<HypervisorConfig>,
    cancel: CancellationToken,
}

impl HypervisorClient {
    /// Client over the VI/JSON endpoint named in `config`.
    pub fn connect(config: HypervisorConfig) -> HypervisorResult<Self> {
        let connector = VimJsonConnector::new(&config)?;
        Ok(Self::with_connector(Arc::new(connector), config))
    }

    pub fn with_connector(connector: Arc<dyn HypervisorConnector>, config: HypervisorConfig) -> Self {
        Self {
            connector,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &HypervisorConfig {
        &self.config
    }

    /// Abort every in-flight task wait. Called once at service stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn waiter(&self) -> TaskWaiter {
        TaskWaiter {
            timeout: self.config.task_timeout,
            poll_interval: self.config.task_poll_interval,
            cancel: self.cancel.clone(),
        }
    }

    fn configurator(&self) -> DeviceConfigurator {
        DeviceConfigurator::new(NetworkDeviceBuilder::new(self.waiter()), DiskDeviceBuilder)
    }

    // -----------------------------------------------------------------------
    // Lookup helpers (run inside a caller's session)
    // -----------------------------------------------------------------------

    /// Linear scan of `kind`; the first object named `name` wins.
    pub async fn resolve_by_name(
        session: &dyn HypervisorSession,
        kind: ObjectKind,
        name: &str,
    ) -> HypervisorResult<Option<ManagedObjectRef>> {
        tracing::debug!(kind = kind.as_str(), name, "Resolving object by name");
        Ok(session
            .list_objects(kind)
            .await?
            .into_iter()
            .find(|o| o.name == name)
            .map(|o| o.moref))
    }

    pub async fn resolve_by_uuid(
        session: &dyn HypervisorSession,
        instance_uuid: Uuid,
    ) -> HypervisorResult<Option<ManagedObjectRef>> {
        session.find_vm_by_uuid(instance_uuid).await
    }

    async fn require_vm(
        session: &dyn HypervisorSession,
        instance_uuid: Uuid,
    ) -> HypervisorResult<ManagedObjectRef> {
        Self::resolve_by_uuid(session, instance_uuid)
            .await?
            .ok_or_else(|| HypervisorError::not_found("VirtualMachine", instance_uuid.to_string()))
    }

    async fn require_named(
        session: &dyn HypervisorSession,
        kind: ObjectKind,
        name: &str,
    ) -> HypervisorResult<ManagedObjectRef> {
        Self::resolve_by_name(session, kind, name)
            .await?
            .ok_or_else(|| HypervisorError::not_found(kind.as_str(), name))
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Current state of one VM.
    pub async fn vm_snapshot(&self, instance_uuid: Uuid) -> HypervisorResult<VmSnapshot> {
        with_session(self.connector.as_ref(), |session| async move {
            let vm = Self::require_vm(session.as_ref(), instance_uuid).await?;
            session.vm_snapshot(&vm).await
        })
        .await
    }

    /// Clone `request.template` into a new VM and return its snapshot.
    ///
    /// The name is checked before anything else; a collision fails without
    /// submitting a clone.
    #[instrument(skip(self, request), fields(name = %request.name, template = %request.template))]
    pub async fn deploy_vm(&self, request: &DeployRequest) -> HypervisorResult<VmSnapshot> {
        with_session(self.connector.as_ref(), |session| async move {
            let session = session.as_ref();
            if Self::resolve_by_name(session, ObjectKind::VirtualMachine, &request.name)
                .await?
                .is_some()
            {
                return Err(HypervisorError::NameCollision(request.name.clone()));
            }

            let template =
                Self::require_named(session, ObjectKind::VirtualMachine, &request.template).await?;
            let template_snapshot = session.vm_snapshot(&template).await?;

            let device_change = self
                .configurator()
                .build(
                    session,
                    &template_snapshot,
                    &[
                        DeviceRequest {
                            operation: DeviceOperation::Edit,
                            target: DeviceTarget::Network {
                                portgroup: Some(request.network.clone()),
                                number: None,
                            },
                        },
                        DeviceRequest {
                            operation: DeviceOperation::Add,
                            target: DeviceTarget::Disk {
                                size_gb: Some(request.disk_gb),
                                number: None,
                            },
                        },
                    ],
                )
                .await?;
            let config = VmConfigSpec {
                num_cpus: Some(request.cpu_count),
                num_cores_per_socket: Some(1),
                memory_mb: Some(request.memory_gb * 1024),
                annotation: Some(request.annotation.clone()),
                device_change,
            };

            let cluster =
                Self::require_named(session, ObjectKind::ClusterComputeResource, &request.cluster)
                    .await?;
            let placement = session.cluster_placement(&cluster).await?;
            let datastore = select_datastore(
                &placement.datastores,
                u64::try_from(request.disk_gb).unwrap_or(0),
                &self.config.datastore_tag,
            )
            .ok_or_else(|| {
                tracing::warn!(cluster = %request.cluster, "No datastore with enough free space");
                HypervisorError::NoCapacity(format!(
                    "no '{}' datastore in cluster '{}' can hold {} GB",
                    self.config.datastore_tag, request.cluster, request.disk_gb
                ))
            })?;
            info!(datastore = %datastore.name, "Datastore selected");

            let mut customization = session
                .customization_spec(&request.customization_spec)
                .await?
                .ok_or_else(|| {
                    HypervisorError::not_found("CustomizationSpec", &request.customization_spec)
                })?;
            GuestCustomization {
                hostname: request
                    .hostname
                    .clone()
                    .unwrap_or_else(|| random_hostname(&self.config.hostname_prefix)),
                ip: request.ip,
                dns_servers: self.config.dns_servers.clone(),
            }
            .apply(&mut customization)?;

            let clone = CloneRequest {
                name: request.name.clone(),
                folder: placement.vm_folder.clone(),
                resource_pool: placement.resource_pool.clone(),
                datastore: datastore.moref.clone(),
                config,
                customization,
                power_on: request.power_on.unwrap_or(self.config.power_on),
            };
            let task = session.clone_vm(&template, &clone).await?;
            let info = self.waiter().wait(session, &task, "Deploy VM").await?;

            let vm = match info.result {
                Some(vm) => vm,
                None => Self::require_named(session, ObjectKind::VirtualMachine, &request.name)
                    .await?,
            };
            let snapshot = session.vm_snapshot(&vm).await?;
            info!(instance_uuid = %snapshot.instance_uuid, "VM deployed");
            Ok(snapshot)
        })
        .await
    }

    /// Power a VM on or off. Asking for the current state fails with
    /// [`HypervisorError::AlreadyInState`].
    #[instrument(skip(self))]
    pub async fn change_power_state(
        &self,
        instance_uuid: Uuid,
        desired: DesiredPower,
    ) -> HypervisorResult<VmSnapshot> {
        with_session(self.connector.as_ref(), |session| async move {
            let session = session.as_ref();
            let vm = Self::require_vm(session, instance_uuid).await?;
            let current = session.vm_snapshot(&vm).await?;
            if desired.is_satisfied_by(current.power_state) {
                return Err(HypervisorError::AlreadyInState(desired.to_string()));
            }
            let (task, description) = match desired {
                DesiredPower::On => (session.power_on(&vm).await?, "Power on"),
                DesiredPower::Off => (session.power_off(&vm).await?, "Power off"),
            };
            self.waiter().wait(session, &task, description).await?;
            session.vm_snapshot(&vm).await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn reset(&self, instance_uuid: Uuid) -> HypervisorResult<()> {
        with_session(self.connector.as_ref(), |session| async move {
            let session = session.as_ref();
            let vm = Self::require_vm(session, instance_uuid).await?;
            let task = session.reset(&vm).await?;
            self.waiter().wait(session, &task, "Reset VM").await?;
            Ok(())
        })
        .await
    }

    /// Add, edit or remove adapters and disks, then return the new state.
    #[instrument(skip(self, requests))]
    pub async fn reconfigure_devices(
        &self,
        instance_uuid: Uuid,
        requests: &[DeviceRequest],
    ) -> HypervisorResult<VmSnapshot> {
        if requests.is_empty() {
            return Err(HypervisorError::InvalidRequest("no device changes requested".into()));
        }
        with_session(self.connector.as_ref(), |session| async move {
            let session = session.as_ref();
            let vm = Self::require_vm(session, instance_uuid).await?;
            let snapshot = session.vm_snapshot(&vm).await?;
            let device_change = self.configurator().build(session, &snapshot, requests).await?;
            let spec = VmConfigSpec {
                device_change,
                ..Default::default()
            };
            let task = session.reconfigure(&vm, &spec).await?;
            self.waiter().wait(session, &task, "Reconfigure VM").await?;
            session.vm_snapshot(&vm).await
        })
        .await
    }

    /// Destroy a VM, powering it off first when it is running.
    #[instrument(skip(self))]
    pub async fn destroy(&self, instance_uuid: Uuid) -> HypervisorResult<()> {
        with_session(self.connector.as_ref(), |session| async move {
            let session = session.as_ref();
            let vm = Self::require_vm(session, instance_uuid).await?;
            let current = session.vm_snapshot(&vm).await?;
            if current.power_state == PowerState::PoweredOn {
                let task = session.power_off(&vm).await?;
                self.waiter().wait(session, &task, "Power off").await?;
            }
            let task = session.destroy(&vm).await?;
            self.waiter().wait(session, &task, "Destroy VM").await?;
            info!(%instance_uuid, name = %current.name, "VM destroyed");
            Ok(())
        })
        .await
    }
}
