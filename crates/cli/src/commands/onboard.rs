//! `backchannel onboard`: first-time setup.

use backchannel_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_path();

    println!("Backchannel First-Time Setup");
    println!("============================\n");

    if AppConfig::write_default_to(&config_path)? {
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("   2. Optionally add Asana credentials under [asana]");
        println!("      and MCP servers under [mcp.servers.<name>]");
        println!("   3. Run: backchannel chat\n");
    } else {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    Ok(())
}
