//! Logging setup
//!
//! Console output only; JSON when `LOG_FORMAT=json`. Level comes from
//! `RUST_LOG`, falling back to `storefront=info,tower_http=info`.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target for oversell-risk alerts, so they can be routed separately
pub const ALERT_TARGET: &str = "storefront::alert";

const DEFAULT_FILTER: &str = "storefront=info,tower_http=info";

pub fn init_logger(json_format: bool) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    if json_format {
        let console_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        subscriber.with(console_layer).try_init()?;
    } else {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true);
        subscriber.with(console_layer).try_init()?;
    }

    Ok(())
}
