pub mod drafts;
pub mod events;
pub mod lessons;
pub mod modes;
pub mod projects;
pub mod states;

use crate::error::AppError;

/// Run a blocking database closure off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> ignite_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let out = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(out)
}

/// Reject request bodies that are not JSON objects.
pub(crate) fn object(body: serde_json::Value) -> Result<ignite_core::draft::Fields, AppError> {
    match body {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(AppError::bad_request("request body must be a JSON object")),
    }
}
