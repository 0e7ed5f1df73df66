//! `toolrelay serve` — Start the HTTP gateway.

use toolrelay_config::AppConfig;
use toolrelay_core::Error;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| Error::config(e.to_string()))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("toolrelay gateway");
    println!("   Listening:    http://{}", config.bind_addr());
    println!("   Messages:     POST /v1/messages");
    println!("   Chat:         POST /v1/chat/completions");
    println!("   Credentials:  {}", config.credentials.backend);

    toolrelay_gateway::start(config).await?;

    Ok(())
}
