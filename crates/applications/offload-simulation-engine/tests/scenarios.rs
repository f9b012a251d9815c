//! Single-task placement scenarios on a fixed three-tier setup

use offload_core::{Site, Task, TaskType};
use offload_simulation_engine::{
    battery::BatteryAccount,
    energy::{mw_seconds_to_wh, PowerProfile},
    network::NetworkLink,
    station::{ResourceStation, Stations},
    BatteryThresholdPolicy, Dispatcher,
};

const TEN_MIB: u64 = 10 * 1024 * 1024;

fn stations() -> Stations {
    Stations {
        local: ResourceStation::new(Site::Local, 1e6, 1).unwrap(),
        edge: ResourceStation::new(Site::Edge, 5e6, 1).unwrap(),
        cloud: ResourceStation::new(Site::Cloud, 5e6, 1).unwrap(),
    }
}

fn link() -> NetworkLink {
    NetworkLink::new(20.0, 50.0, 20.0, 0.0).unwrap()
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(
        Box::new(BatteryThresholdPolicy::new()),
        link(),
        link(),
        PowerProfile::default(),
        0.1,
    )
    .unwrap()
}

fn generic_with_affinity() -> Task {
    Task::new(1, TaskType::Generic, TEN_MIB, 1e9, 0.0)
        .unwrap()
        .with_edge_affinity(true)
        .unwrap()
}

fn expected_remote_energy() -> f64 {
    let up = link().uplink_time(TEN_MIB).total;
    let down = link().downlink_time(TEN_MIB / 10).total;
    mw_seconds_to_wh(800.0, up) + mw_seconds_to_wh(400.0, down)
}

#[test]
fn test_high_soc_generic_with_affinity_goes_to_edge() {
    let mut battery = BatteryAccount::new(100.0, 80.0).unwrap();
    let mut stations = stations();

    let record = dispatcher()
        .execute(generic_with_affinity(), 0.0, &mut battery, &mut stations)
        .unwrap();

    assert_eq!(record.execution_site, Site::Edge);
    assert_eq!(record.soc_before, 80.0);
    assert!(record.soc_after < record.soc_before);

    // Robot pays for the radio only
    assert!((record.energy_wh_delta - expected_remote_energy()).abs() < 1e-12);
    assert!((record.network_up_ms - 4204.304).abs() < 1.0);
    assert!((record.compute_time_ms - 200_000.0).abs() < 1e-6);
    assert!(
        (record.latency_ms
            - (record.network_up_ms + record.compute_time_ms + record.network_down_ms))
            .abs()
            < 1e-6
    );
    assert_eq!(battery.history()[0].purpose, "task_1_edge");
}

#[test]
fn test_low_soc_generic_goes_to_cloud() {
    let mut battery = BatteryAccount::new(100.0, 25.0).unwrap();
    let mut stations = stations();

    let record = dispatcher()
        .execute(generic_with_affinity(), 0.0, &mut battery, &mut stations)
        .unwrap();

    assert_eq!(record.execution_site, Site::Cloud);
    assert!((record.energy_wh_delta - expected_remote_energy()).abs() < 1e-12);
    assert!(record.soc_after < 25.0);
    assert_eq!(battery.history()[0].purpose, "task_1_cloud");
}

#[test]
fn test_nav_at_critical_soc_stays_local() {
    let mut battery = BatteryAccount::new(100.0, 5.0).unwrap();
    let mut stations = stations();

    let nav = Task::new(1, TaskType::Nav, TEN_MIB, 1e9, 0.0).unwrap();
    let record = dispatcher().execute(nav, 0.0, &mut battery, &mut stations).unwrap();

    assert_eq!(record.execution_site, Site::Local);
    assert_eq!(record.network_up_ms, 0.0);
    assert_eq!(record.network_down_ms, 0.0);
    // 1000 s at 2 W, no communication share
    assert!((record.energy_wh_delta - mw_seconds_to_wh(2000.0, 1000.0)).abs() < 1e-12);
    assert!(record.soc_after < record.soc_before);
}

#[test]
fn test_threshold_boundary_goes_to_cloud() {
    let mut battery = BatteryAccount::new(100.0, 30.0).unwrap();
    let mut stations = stations();

    let record = dispatcher()
        .execute(generic_with_affinity(), 0.0, &mut battery, &mut stations)
        .unwrap();
    assert_eq!(record.execution_site, Site::Cloud);
}

#[test]
fn test_generic_without_affinity_runs_local_at_high_soc() {
    let mut battery = BatteryAccount::new(100.0, 90.0).unwrap();
    let mut stations = stations();

    let task = Task::new(3, TaskType::Generic, 4096, 2e6, 0.0).unwrap();
    let record = dispatcher().execute(task, 0.0, &mut battery, &mut stations).unwrap();

    assert_eq!(record.execution_site, Site::Local);
    assert!((record.latency_ms - 2000.0).abs() < 1e-9);
    assert_eq!(record.network_up_ms + record.network_down_ms, 0.0);
}
