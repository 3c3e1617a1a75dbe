use std::fs;

use todolist::config::{Config, CONFIG_FILE};

#[test]
fn config_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::load_from_dir(dir.path());

    assert!(config.storage.data_dir.is_none());
    assert_eq!(config.storage.file_name, "TodoList.json");
    assert!(config.reminders.enabled);
    assert_eq!(config.reminders.title, "Reminder");
    assert_eq!(config.display.date_format, "%B %d, %Y at %H:%M");
}

#[test]
fn config_overrides_from_toml() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let toml = r#"
[storage]
file_name = "tasks.json"

[reminders]
title = "Heads up"
"#;
    fs::write(dir.path().join(CONFIG_FILE), toml)?;

    let config = Config::load_from_dir(dir.path());
    assert_eq!(config.storage.file_name, "tasks.json");
    assert_eq!(config.reminders.title, "Heads up");
    assert_eq!(config.reminders.journal_file, "reminders.json");
    assert_eq!(config.tasks_path(dir.path()), dir.path().join("tasks.json"));
    Ok(())
}

#[test]
fn invalid_config_falls_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(CONFIG_FILE), "[reminders]\ntitle = \"  \"\n")?;

    assert!(Config::load(&dir.path().join(CONFIG_FILE)).is_err());
    let config = Config::load_from_dir(dir.path());
    assert_eq!(config.reminders.title, "Reminder");
    Ok(())
}
