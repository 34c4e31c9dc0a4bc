//! The protocol seam between [`HypervisorClient`](crate::HypervisorClient)
//! and a management endpoint, plus scoped session acquisition.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::HypervisorResult;
use crate::model::{
    CloneRequest, ClusterPlacement, CustomizationSpec, DvPort, ManagedObjectRef, NamedObject,
    NetworkInfo, ObjectKind, TaskInfo, VmConfigSpec, VmSnapshot,
};

/// One authenticated session. Every call is attempted exactly once.
///
/// Mutating calls return the handle of the task the endpoint started; use
/// [`wait_for_task`](crate::task::wait_for_task) to reach a terminal state.
#[async_trait]
pub trait HypervisorSession: Send + Sync {
    /// Every object of `kind` below the root folder, in inventory order.
    async fn list_objects(&self, kind: ObjectKind) -> HypervisorResult<Vec<NamedObject>>;

    async fn find_vm_by_uuid(&self, instance_uuid: Uuid)
        -> HypervisorResult<Option<ManagedObjectRef>>;

    async fn vm_snapshot(&self, vm: &ManagedObjectRef) -> HypervisorResult<VmSnapshot>;

    async fn cluster_placement(&self, cluster: &ManagedObjectRef)
        -> HypervisorResult<ClusterPlacement>;

    async fn network_info(&self, network: &ManagedObjectRef) -> HypervisorResult<NetworkInfo>;

    /// Unconnected ports inside `portgroup_key` on `switch`.
    async fn free_dv_ports(
        &self,
        switch: &ManagedObjectRef,
        portgroup_key: &str,
    ) -> HypervisorResult<Vec<DvPort>>;

    /// Set a distributed portgroup's port count.
    async fn resize_portgroup(
        &self,
        portgroup: &ManagedObjectRef,
        config_version: &str,
        num_ports: i32,
    ) -> HypervisorResult<ManagedObjectRef>;

    async fn customization_spec(&self, name: &str) -> HypervisorResult<Option<CustomizationSpec>>;

    async fn clone_vm(
        &self,
        template: &ManagedObjectRef,
        request: &CloneRequest,
    ) -> HypervisorResult<ManagedObjectRef>;

    async fn power_on(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef>;

    async fn power_off(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef>;

    async fn reset(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef>;

    async fn reconfigure(
        &self,
        vm: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> HypervisorResult<ManagedObjectRef>;

    async fn destroy(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef>;

    async fn task_info(&self, task: &ManagedObjectRef) -> HypervisorResult<TaskInfo>;

    async fn logout(&self) -> HypervisorResult<()>;
}

/// Opens sessions. Each outer operation gets its own.
#[async_trait]
pub trait HypervisorConnector: Send + Sync {
    async fn connect(&self) -> HypervisorResult<Arc<dyn HypervisorSession>>;
}

/// Logs the session out when dropped before [`SessionGuard::release`] ran,
/// which happens when the caller's future is cancelled mid-operation.
struct SessionGuard {
    session: Option<Arc<dyn HypervisorSession>>,
}

impl SessionGuard {
    async fn release(mut self) {
        if let Some(session) = self.session.take() {
            logout(session.as_ref()).await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Operation dropped; logging out in the background");
                handle.spawn(async move { logout(session.as_ref()).await });
            }
            Err(_) => tracing::warn!("Operation dropped outside a runtime; session not logged out"),
        }
    }
}

async fn logout(session: &dyn HypervisorSession) {
    if let Err(e) = session.logout().await {
        tracing::warn!(error = %e, "Hypervisor logout failed");
    }
}

/// Open a session, run `op` with it, and log out.
///
/// Logout runs on every exit path of `op`, including the future being
/// dropped. A logout failure is logged and does not replace the
/// operation's own result.
pub async fn with_session<T, F, Fut>(
    connector: &dyn HypervisorConnector,
    op: F,
) -> HypervisorResult<T>
where
    F: FnOnce(Arc<dyn HypervisorSession>) -> Fut,
    Fut: Future<Output = HypervisorResult<T>>,
{
    let session = connector.connect().await?;
    let guard = SessionGuard {
        session: Some(session.clone()),
    };
    let result = op(session).await;
    guard.release().await;
    result
}
