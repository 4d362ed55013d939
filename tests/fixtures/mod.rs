//! Scenario fixtures shared by the integration tests.

use std::path::{Path, PathBuf};

use batchdel::config::EffectiveConfig;
use batchdel::{Scenario, ScenarioReport};

/// Directory holding the scenario files.
pub fn scenarios_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenarios")
}

/// Path to one scenario file by stem.
pub fn scenario_path(name: &str) -> PathBuf {
    scenarios_dir().join(format!("{}.toml", name))
}

/// Load a scenario and run it with its own config overlay.
pub fn run_fixture(name: &str) -> ScenarioReport {
    let scenario = Scenario::load(&scenario_path(name)).unwrap();
    let overlay = scenario.config_overlay().unwrap();
    let config = EffectiveConfig::build(None, overlay, None).unwrap();
    batchdel::run_scenario(&scenario, config.settings).unwrap()
}
