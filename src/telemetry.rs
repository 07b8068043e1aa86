use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::workflow::action::Action;
use crate::workflow::types::{PrincipalId, RequestId};

/// Initialize structured logging.
///
/// `RUST_LOG` wins over `level` when set. Logs go to stderr so that command
/// output on stdout stays machine readable.
pub fn init_telemetry(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", level, e))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    tracing::debug!("Maintenance workflow telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one engine call. `request_id` is empty for creations.
pub fn transition_span(
    action: Action,
    principal: PrincipalId,
    request_id: Option<RequestId>,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "request_transition",
        action = %action,
        principal.id = principal.0,
        request.id = request_id.map(|id| id.0),
        correlation.id = correlation_id,
    )
}
