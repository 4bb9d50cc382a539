//! End-to-end: YAML configuration file -> engine run -> report JSON.

use fanetsim_config::SimulationConfig;
use fanetsim_engine::Simulator;
use fanetsim_runner::report;

#[test]
fn test_yaml_config_drives_a_run() {
    let dir = std::env::temp_dir().join("fanetsim-config-test");
    std::fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("sim.yaml");
    std::fs::write(
        &config_path,
        "sim_time: 500000\nnumber_of_drones: 4\npacket_generation_rate: 2\nseed: 17\n",
    )
    .unwrap();

    let config = SimulationConfig::load(&config_path).unwrap();
    assert_eq!(config.number_of_drones, 4);

    let mut sim = Simulator::new(config.clone()).unwrap();
    sim.run().unwrap();
    assert_eq!(sim.now().as_micros(), 500_000);

    let json_path = dir.join("report.json");
    report::write_json(&config, sim.metrics(), &json_path).unwrap();
    let text = std::fs::read_to_string(&json_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["timestamp"].is_string());
    assert_eq!(value["config"]["number_of_drones"], 4);
    assert!(value["metrics"]["data_generated"].is_u64());
}

#[test]
fn test_invalid_yaml_is_fatal() {
    let dir = std::env::temp_dir().join("fanetsim-config-test");
    std::fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("bad.yaml");
    std::fs::write(&config_path, "data_loss_probability: 2.0\n").unwrap();
    assert!(SimulationConfig::load(&config_path).is_err());
}
