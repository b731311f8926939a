//! `backchannel tools`: list the background tools, including any served by
//! configured MCP servers.

use backchannel_config::AppConfig;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = backchannel_tools::default_registry(config);
    let servers = backchannel_tools::register_mcp_tools(&mut registry, &config.mcp).await;

    println!("Background tools");
    println!("================");
    println!();
    for def in registry.definitions() {
        println!("  {:<20} {}", def.name, def.description);
    }
    println!();

    if !config.mcp.is_empty() {
        println!(
            "  MCP servers connected: {} of {}",
            servers.len(),
            config.mcp.servers.len()
        );
    }
    if config.asana.access_token.is_none() {
        println!("  Asana tools need ASANA_API_KEY and ASANA_PROJECT_ID.");
    }

    Ok(())
}
