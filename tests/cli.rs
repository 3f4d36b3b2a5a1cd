use anyhow::Result;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

/// Runs the launcher with an isolated config file and no inherited keys.
fn run_thinkshell(config: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_thinkshell"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env("THINKSHELL_USE_MOCK", "1")
        .output()?;
    Ok(output)
}

#[test]
fn test_show_config_reports_defaults() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("config.toml");

    let output = run_thinkshell(&config, &["--show-config"])?;

    assert!(output.status.success(), "--show-config should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Not found (using defaults)"));
    assert!(stdout.contains("Mock mode: true"));
    assert!(stdout.contains("Trigger prefix: \",\""));
    Ok(())
}

#[test]
fn test_saved_key_is_persisted_and_hidden() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("config.toml");

    let output = run_thinkshell(&config, &["--anthropic-key", "sk-ant-cli-test"])?;
    assert!(output.status.success(), "saving a key should succeed");
    assert!(std::fs::read_to_string(&config)?.contains("sk-ant-cli-test"));

    let output = run_thinkshell(&config, &["--show-config"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Anthropic Claude (key set)"));
    assert!(!stdout.contains("sk-ant-cli-test"));
    Ok(())
}

#[test]
fn test_provider_flag_reorders_and_saves() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("config.toml");

    let output = run_thinkshell(&config, &["--provider", "gemini", "--show-config"])?;
    assert!(output.status.success());

    let saved = std::fs::read_to_string(&config)?;
    let gemini = saved.find("gemini").unwrap();
    let openai = saved.find("openai").unwrap();
    assert!(gemini < openai, "gemini should be first in {saved}");
    Ok(())
}

#[test]
fn test_environment_key_is_not_saved() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("config.toml");

    let output = Command::new(env!("CARGO_BIN_EXE_thinkshell"))
        .arg("--config")
        .arg(&config)
        .args(["--provider", "anthropic", "--show-config"])
        .env("OPENAI_API_KEY", "sk-from-environment")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env("THINKSHELL_USE_MOCK", "1")
        .output()?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("OpenAI (key set)"));

    let saved = std::fs::read_to_string(&config)?;
    assert!(!saved.contains("sk-from-environment"), "leaked into {saved}");
    assert!(!saved.contains("use_mock = true"));
    Ok(())
}

#[test]
fn test_unknown_provider_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let output = run_thinkshell(&dir.path().join("config.toml"), &["--provider", "nobody"])?;
    assert!(!output.status.success());
    Ok(())
}
