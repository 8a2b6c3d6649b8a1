use axum::{http::StatusCode, response::IntoResponse};
#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")]
use once_cell::sync::OnceCell;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder. Safe to call more than once.
#[cfg(feature = "metrics")]
pub fn install_recorder() -> crate::error::Result<()> {
    PROMETHEUS.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            crate::error::AppError::internal(format!("failed to install metrics recorder: {e}"))
        })?;
        info!("Prometheus metrics recorder installed");
        Ok::<_, crate::error::AppError>(handle)
    })?;
    Ok(())
}

#[cfg(not(feature = "metrics"))]
pub fn install_recorder() -> crate::error::Result<()> {
    info!("Metrics feature disabled, recorder not installed");
    Ok(())
}

/// Renders the Prometheus exposition text.
pub async fn metrics_handler() -> impl IntoResponse {
    debug!("Metrics handler called");

    #[cfg(feature = "metrics")]
    {
        match PROMETHEUS.get() {
            Some(handle) => (StatusCode::OK, handle.render()),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                "metrics recorder not installed\n".to_string(),
            ),
        }
    }

    #[cfg(not(feature = "metrics"))]
    {
        (StatusCode::NOT_FOUND, "metrics feature disabled\n".to_string())
    }
}
