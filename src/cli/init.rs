use super::context::{start_logging, Paths};
use quorate::config::{default_data_dir, GateConfig};
use quorate::persistence::StateSnapshot;

/// Write a commented default config (if absent) and an empty state file.
pub fn execute(paths: &Paths, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = paths.config_path();
    let data_dir = paths
        .data_dir()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(default_data_dir);

    if !config_path.exists() || force {
        GateConfig::create_default(&config_path, &data_dir)?;
        println!("✅ Wrote config: {}", config_path.display());
    } else {
        println!("Config already exists: {}", config_path.display());
    }

    let config = paths.load_config()?;
    start_logging(&config);

    let state_path = &config.storage.state_path;
    if state_path.exists() && !force {
        return Err(format!(
            "state already initialised at '{}' (use --force to reset)",
            state_path.display()
        )
        .into());
    }
    StateSnapshot::empty(config.governance.admin_cap).save(state_path)?;
    println!("✅ Initialised state: {}", state_path.display());
    println!("   Audit log: {}", config.storage.audit_log.display());
    println!();
    println!("Next: add founders with `quorate founder add <id> --name <name> --email <email>`");
    Ok(())
}
