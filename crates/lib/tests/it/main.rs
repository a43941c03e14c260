/*! Integration tests for Switchboard.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - pool: Connection provider, allow-list and transaction behavior
 * - registry: Master registry lookups and administrative registration
 * - tenant: Typed tenant queries against real tenant databases
 * - session: Login, authorization, routing and introspection end to end
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("switchboard=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod pool;
mod session;
