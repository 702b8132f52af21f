use std::env;

use resideo_t10::config::Config;

/// Run with: cargo test --test integration -- --ignored
/// Requires an authorized token file and RESIDEO_CLIENT_ID / RESIDEO_CLIENT_SECRET,
/// e.g. after `resideo authorize-url` and `resideo exchange <callback-url>`.
#[tokio::test]
#[ignore]
async fn discover_live_account() {
    let path = env::var("RESIDEO_CONFIG").ok().map(std::path::PathBuf::from);
    let config = Config::load(path.as_deref()).expect("config should load");
    let client = config
        .client_builder()
        .expect("credentials required")
        .post_command_refresh(None)
        .build()
        .expect("client should build");

    assert!(client.is_authorized().await, "no stored token; run the exchange first");

    let thermostats = client.discover().await.expect("discovery failed");
    assert!(!thermostats.is_empty(), "account should have at least one thermostat");

    for t in &thermostats {
        assert!(!t.location_id.is_empty());
        let status = client
            .thermostat_status(&t.device_id)
            .await
            .unwrap_or_else(|e| panic!("status for {} failed: {e}", t.device_id));
        assert_eq!(status.device_id, t.device_id);
        println!("{} [{}] mode {:?} indoor {:?}", t.display_name, t.device_id, t.mode(), t.indoor());
    }
}
