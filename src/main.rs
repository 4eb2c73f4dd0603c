//! # Chaos Controller
//!
//! Controller binary: initializes the runtime and runs one watch stream per
//! experiment kind until a shutdown signal arrives.
//!
//! Configuration comes from environment variables; see
//! [`chaos_controller::config`].

use anyhow::Result;
use chaos_controller::runtime::initialization::initialize;
use chaos_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
