use ecowatch::{RuleSet, SettingsLoader};

#[test]
fn bundled_settings_load() {
    let loader = SettingsLoader::new(".");
    let settings = loader
        .load("config/ecowatch.yaml")
        .expect("bundled settings should load");

    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.generator.api_key_env, "API_KEY");
    assert_eq!(settings.generator.timeout_secs, 30);
    assert_eq!(settings.simulation.entry_rule_set, RuleSet::Primary);
    assert_eq!(settings.simulation.map_rule_set, RuleSet::MapClick);
    assert!(settings.simulation.seed.is_none());
    assert_eq!(settings.report.number_format().integer(1_234_567), "1.234.567");
}

#[test]
fn malformed_settings_report_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("broken.yaml"), "server: [1, 2").expect("write");

    let err = SettingsLoader::new(dir.path())
        .load("broken.yaml")
        .expect_err("should not parse");
    assert!(format!("{err:#}").contains("broken.yaml"));
}
