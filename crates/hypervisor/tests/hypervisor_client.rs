//! Integration tests for `HypervisorClient` against the in-memory inventory.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{deploy_request, test_client, test_config, PORTGROUP};
use galilee_hypervisor::memory::{FailOp, MemoryHypervisor, TaskOutcome};
use galilee_hypervisor::model::{DeviceKind, NicBacking, ObjectKind};
use galilee_hypervisor::{
    DesiredPower, DeviceOperation, DeviceRequest, DeviceTarget, HypervisorClient,
    HypervisorConnector, HypervisorError, HypervisorSession, PowerState,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_clones_template_with_requested_shape() {
    let (client, hv, _) = test_client();

    let vm = client.deploy_vm(&deploy_request("web01")).await.unwrap();

    assert_eq!(vm.name, "web01");
    assert_eq!(vm.cpu_count, 4);
    assert_eq!(vm.memory_mb, 8 * 1024);
    assert_eq!(vm.disk_gb(), 40 + 50);
    assert_eq!(vm.power_state, PowerState::PoweredOff);
    assert_eq!(vm.ip_address.as_deref(), Some("10.64.60.21"));

    let hostname = vm.hostname.clone().unwrap();
    assert!(hostname.starts_with("vm-"));
    assert_eq!(hostname.len(), "vm-".len() + 7);

    let nic = vm.devices_of(DeviceKind::EthernetCard).next().unwrap();
    assert_matches!(nic.backing, Some(NicBacking::DistributedPort { .. }));
    assert_eq!(hv.portgroup_ports(PORTGROUP), Some((16, 5)));

    assert_eq!(hv.sessions_opened(), 1);
    assert_eq!(hv.logouts(), 1);
}

#[tokio::test]
async fn deploy_places_on_tagged_datastore_with_guest_network() {
    let (client, hv, _) = test_client();

    client.deploy_vm(&deploy_request("web02")).await.unwrap();

    let clone = hv.last_clone().unwrap();
    let session = hv.connect().await.unwrap();
    let datastores = session.list_objects(ObjectKind::Datastore).await.unwrap();
    let chosen = datastores
        .iter()
        .find(|d| d.moref == clone.datastore)
        .unwrap();
    assert_eq!(chosen.name, "vsan-prod-01");

    let spec = &clone.customization.0;
    assert_eq!(spec["nicSettingMap"][0]["adapter"]["subnetMask"], "255.255.255.0");
    assert_eq!(spec["nicSettingMap"][0]["adapter"]["gateway"][0], "10.64.60.1");
    assert_eq!(spec["globalIPSettings"]["dnsServerList"][0], "10.0.0.53");
    assert_eq!(clone.config.num_cores_per_socket, Some(1));
    assert_eq!(clone.config.annotation.as_deref(), Some("owner: jdoe"));
}

#[tokio::test]
async fn deploy_name_collision_submits_no_clone() {
    let (client, hv, _) = test_client();
    hv.add_vm("web01", PowerState::PoweredOn);

    let err = client.deploy_vm(&deploy_request("web01")).await.unwrap_err();

    assert_matches!(err, HypervisorError::NameCollision(name) if name == "web01");
    assert!(hv.operations().is_empty());
    assert_eq!(hv.logouts(), 1);
}

#[tokio::test]
async fn deploy_without_roomy_datastore_is_no_capacity() {
    let (client, hv, _) = test_client();
    hv.add_cluster("cluster-small", &[("vsan-small", 200), ("local-big", 9000)]);
    let mut request = deploy_request("web03");
    request.cluster = "cluster-small".into();

    let err = client.deploy_vm(&request).await.unwrap_err();

    assert_matches!(err, HypervisorError::NoCapacity(_));
    assert!(hv.operations().is_empty());
}

#[tokio::test]
async fn deploy_extends_full_portgroup_once() {
    let (client, hv, _) = test_client();
    hv.add_portgroup("dv-full", 8, 8);
    let mut request = deploy_request("web04");
    request.network = "dv-full".into();

    client.deploy_vm(&request).await.unwrap();

    assert_eq!(hv.portgroup_ports("dv-full"), Some((16, 9)));
    let ops = hv.operations();
    assert_eq!(ops.len(), 2);
    assert!(ops[0].starts_with("resize_portgroup") && ops[0].ends_with(" 16"));
    assert_eq!(ops[1], "clone web04");
}

#[tokio::test]
async fn deploy_with_missing_customization_spec_is_not_found() {
    let (client, hv, _) = test_client();
    let mut request = deploy_request("web05");
    request.customization_spec = "windows-2022".into();

    let err = client.deploy_vm(&request).await.unwrap_err();

    assert_matches!(err, HypervisorError::NotFound { kind: "CustomizationSpec", .. });
    assert!(hv.operations().is_empty());
}

// ---------------------------------------------------------------------------
// Task waiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stalled_task_times_out_and_still_logs_out() {
    let (client, hv, template) = test_client();
    hv.set_task_outcome(TaskOutcome::Stall);

    let err = client
        .change_power_state(template, DesiredPower::On)
        .await
        .unwrap_err();

    assert_matches!(err, HypervisorError::Timeout { .. });
    assert_eq!(hv.sessions_opened(), 1);
    assert_eq!(hv.logouts(), 1);
}

#[tokio::test]
async fn failed_task_reports_its_message() {
    let (client, hv, template) = test_client();
    hv.set_task_outcome(TaskOutcome::Fail("Insufficient resources".into()));

    let err = client
        .change_power_state(template, DesiredPower::On)
        .await
        .unwrap_err();

    assert_matches!(err, HypervisorError::TaskFailed { message, .. } if message == "Insufficient resources");
}

#[tokio::test]
async fn shutdown_cancels_task_waits() {
    let (client, hv, template) = test_client();
    hv.set_task_outcome(TaskOutcome::Stall);
    client.shutdown();

    let err = client
        .change_power_state(template, DesiredPower::On)
        .await
        .unwrap_err();

    assert_matches!(err, HypervisorError::Cancelled(_));
    assert_eq!(hv.logouts(), 1);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_operation_still_logs_out() {
    let (client, hv, template) = test_client();
    hv.fail(FailOp::PowerOn);

    let err = client
        .change_power_state(template, DesiredPower::On)
        .await
        .unwrap_err();

    assert_matches!(err, HypervisorError::Api { status: 500, .. });
    assert_eq!(hv.sessions_opened(), 1);
    assert_eq!(hv.logouts(), 1);
}

#[tokio::test]
async fn dropped_operation_still_logs_out() {
    let (client, hv, template) = test_client();
    hv.set_task_outcome(TaskOutcome::Stall);

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        client.change_power_state(template, DesiredPower::On),
    )
    .await;
    assert!(result.is_err());

    // The logout is spawned when the operation future is dropped.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hv.sessions_opened(), 1);
    assert_eq!(hv.logouts(), 1);
}

#[tokio::test]
async fn logout_failure_keeps_operation_result() {
    let (client, hv, template) = test_client();
    hv.fail(FailOp::Logout);

    let vm = client.vm_snapshot(template).await.unwrap();

    assert_eq!(vm.instance_uuid, template);
    assert_eq!(hv.logouts(), 1);
}

#[tokio::test]
async fn offline_endpoint_is_a_connectivity_error() {
    let hv = MemoryHypervisor::new();
    hv.set_offline(true);
    let client = HypervisorClient::with_connector(Arc::new(hv.clone()), test_config());

    let err = client.vm_snapshot(Uuid::new_v4()).await.unwrap_err();

    assert!(err.is_connectivity());
    assert_eq!(hv.logouts(), 0);
}

#[tokio::test]
async fn unknown_uuid_is_not_found() {
    let (client, _hv, _) = test_client();

    let err = client.vm_snapshot(Uuid::new_v4()).await.unwrap_err();

    assert_matches!(err, HypervisorError::NotFound { kind: "VirtualMachine", .. });
}

// ---------------------------------------------------------------------------
// Power and destroy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn power_on_when_already_on_fails_without_task() {
    let (client, hv, _) = test_client();
    let vm = hv.add_vm("db01", PowerState::PoweredOn);

    let err = client
        .change_power_state(vm, DesiredPower::On)
        .await
        .unwrap_err();

    assert_matches!(err, HypervisorError::AlreadyInState(_));
    assert!(hv.operations().is_empty());
}

#[tokio::test]
async fn power_off_returns_new_state() {
    let (client, hv, _) = test_client();
    let vm = hv.add_vm("db01", PowerState::PoweredOn);

    let snapshot = client.change_power_state(vm, DesiredPower::Off).await.unwrap();

    assert_eq!(snapshot.power_state, PowerState::PoweredOff);
    assert_eq!(hv.vm(vm).unwrap().power_state, PowerState::PoweredOff);
}

#[tokio::test]
async fn destroy_powers_off_running_vm_first() {
    let (client, hv, _) = test_client();
    let vm = hv.add_vm("db01", PowerState::PoweredOn);
    let moref = hv.vm(vm).unwrap().moref.value;

    client.destroy(vm).await.unwrap();

    assert!(hv.vm(vm).is_none());
    assert_eq!(
        hv.operations(),
        vec![format!("power_off {moref}"), format!("destroy {moref}")]
    );
}

#[tokio::test]
async fn reset_submits_reset_task() {
    let (client, hv, _) = test_client();
    let vm = hv.add_vm("db01", PowerState::PoweredOn);
    let moref = hv.vm(vm).unwrap().moref.value;

    client.reset(vm).await.unwrap();

    assert_eq!(hv.operations(), vec![format!("reset {moref}")]);
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconfigure_adds_adapter_and_removes_disk() {
    let (client, _hv, template) = test_client();

    let vm = client
        .reconfigure_devices(
            template,
            &[
                DeviceRequest {
                    operation: DeviceOperation::Add,
                    target: DeviceTarget::Network {
                        portgroup: Some(PORTGROUP.into()),
                        number: None,
                    },
                },
                DeviceRequest {
                    operation: DeviceOperation::Remove,
                    target: DeviceTarget::Disk {
                        size_gb: None,
                        number: Some(1),
                    },
                },
            ],
        )
        .await
        .unwrap();

    let labels: Vec<_> = vm
        .devices_of(DeviceKind::EthernetCard)
        .map(|d| d.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Network adapter 1", "Network adapter 2"]);
    assert_eq!(vm.devices_of(DeviceKind::Disk).count(), 0);
}

#[tokio::test]
async fn removing_missing_adapter_is_device_not_found() {
    let (client, hv, template) = test_client();

    let err = client
        .reconfigure_devices(
            template,
            &[DeviceRequest {
                operation: DeviceOperation::Remove,
                target: DeviceTarget::Network {
                    portgroup: None,
                    number: Some(3),
                },
            }],
        )
        .await
        .unwrap_err();

    assert_matches!(err, HypervisorError::DeviceNotFound(_));
    assert!(hv.operations().is_empty());
}

#[tokio::test]
async fn empty_device_request_is_rejected_without_session() {
    let (client, hv, template) = test_client();

    let err = client.reconfigure_devices(template, &[]).await.unwrap_err();

    assert_matches!(err, HypervisorError::InvalidRequest(_));
    assert_eq!(hv.sessions_opened(), 0);
}

#[tokio::test]
async fn batched_adds_claim_distinct_units_and_ports() {
    let (client, hv, template) = test_client();
    let disk = || DeviceRequest {
        operation: DeviceOperation::Add,
        target: DeviceTarget::Disk {
            size_gb: Some(10),
            number: None,
        },
    };
    let nic = || DeviceRequest {
        operation: DeviceOperation::Add,
        target: DeviceTarget::Network {
            portgroup: Some(PORTGROUP.into()),
            number: None,
        },
    };

    let vm = client
        .reconfigure_devices(template, &[disk(), disk(), nic(), nic()])
        .await
        .unwrap();

    let mut units: Vec<_> = vm
        .devices_of(DeviceKind::Disk)
        .filter_map(|d| d.unit_number)
        .collect();
    units.sort_unstable();
    assert_eq!(units, vec![0, 1, 2]);

    let ports: Vec<_> = vm
        .devices_of(DeviceKind::EthernetCard)
        .filter_map(|d| match &d.backing {
            Some(NicBacking::DistributedPort { port_key, .. }) => Some(port_key.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ports, vec!["4", "5"]);
    assert_eq!(hv.portgroup_ports(PORTGROUP), Some((16, 6)));
}

#[tokio::test]
async fn batched_adds_extend_portgroup_when_last_port_is_claimed() {
    let (client, hv, template) = test_client();
    hv.add_portgroup("dv-lab-61", 5, 4);
    let nic = || DeviceRequest {
        operation: DeviceOperation::Add,
        target: DeviceTarget::Network {
            portgroup: Some("dv-lab-61".into()),
            number: None,
        },
    };

    let vm = client
        .reconfigure_devices(template, &[nic(), nic()])
        .await
        .unwrap();

    let ports: Vec<_> = vm
        .devices_of(DeviceKind::EthernetCard)
        .filter_map(|d| match &d.backing {
            Some(NicBacking::DistributedPort { port_key, .. }) => Some(port_key.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ports, vec!["4".to_string(), "5".to_string()]);
    assert_eq!(
        hv.operations()
            .iter()
            .filter(|op| op.starts_with("resize_portgroup"))
            .count(),
        1
    );
}
