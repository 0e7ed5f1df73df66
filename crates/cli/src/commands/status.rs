//! `toolrelay status` — Show effective configuration.

use toolrelay_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("toolrelay Status");
    println!("================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Gateway:       {}", config.bind_addr());
    println!("  Upstream:      {}", config.upstream.endpoint);
    println!("  Default model: {}", config.upstream.default_model);
    println!("  Probe model:   {}", config.upstream.probe_model);
    println!("  Timeout:       {}s", config.upstream.timeout_secs);
    println!("  Context:       {} chars", config.context.max_chars);
    println!("  Driver rules:  {}", config.upstream.drivers.len());
    println!(
        "  Credentials:   {} ({})",
        config.credentials.backend,
        config.credentials.resolved_db_path()
    );
    println!("  Models:        {}", config.models.len());

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file — run `toolrelay onboard` first");
    }

    Ok(())
}
