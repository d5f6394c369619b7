//! Test configuration helpers for building clients against a mock backend

use tempfile::TempDir;
use vsync_client::config::DownloadConfig;
use vsync_client::{Config, FileCollisionAction, ProfileStoreConfig, VsyncClient};
use wiremock::MockServer;

/// API key the mock profile store expects
pub const TEST_API_KEY: &str = "anon-test-key";

/// Build a config pointing every endpoint at `server`
///
/// The profile store lives under `/rest/v1` on the same server. Converted files land
/// in a `downloads` directory inside `temp_dir`.
pub fn test_config(server: &MockServer, temp_dir: &TempDir) -> Config {
    Config {
        api_base_url: server.uri(),
        download: DownloadConfig {
            download_dir: temp_dir.path().join("downloads"),
            file_collision: FileCollisionAction::Rename,
        },
        profile_store: Some(ProfileStoreConfig {
            base_url: format!("{}/rest/v1", server.uri()),
            api_key: TEST_API_KEY.to_string(),
        }),
        ..Default::default()
    }
}

/// Create a client backed by `server`
///
/// Returns the client and temp directory (keep temp_dir alive for test duration)
pub fn create_test_client(server: &MockServer) -> (VsyncClient, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let client =
        VsyncClient::new(test_config(server, &temp_dir)).expect("Failed to create client");
    (client, temp_dir)
}
