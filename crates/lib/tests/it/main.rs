/*! Integration tests for Authchain.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - flows: End-to-end chain construction and validation round trips
 * - contract_wallet: ERC-1271 validation against a mocked provider,
 *   including the historical-block retry path
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("authchain=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod contract_wallet;
mod helpers;
