use anyhow::Result;

use super::runtime::LoadedConfig;

pub fn cmd_info(loaded: &LoadedConfig) -> Result<()> {
    let config = &loaded.config;

    println!("TrafficMeter System Information");
    println!("===============================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {}", env!("GIT_HASH"));
    println!("Git Branch: {}", env!("GIT_BRANCH"));
    println!();

    println!("Configuration:");
    println!("- Source: {}", loaded.path.display());
    println!("- Bind Address: {}", config.server.bind);
    println!("- Application Label: {}", config.metrics.app);
    if config.metrics.restoration_enabled() {
        println!("- Counter Restoration: {}", config.metrics.prometheus_host);
    } else {
        println!("- Counter Restoration: disabled (no backend host)");
    }
    if config.geo.enabled {
        println!(
            "- Geolocation: {} (cache {} entries, ttl {}s)",
            config.geo.endpoint, config.geo.cache_capacity, config.geo.cache_ttl_secs
        );
    } else {
        println!("- Geolocation: disabled");
    }
    println!("- Client IP Header: {}", config.metrics.client_ip_header);

    Ok(())
}
