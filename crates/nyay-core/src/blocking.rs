//! Offloading CPU-bound work (similarity scans, HTML parsing) to Tokio's
//! blocking threadpool so one run cannot stall another.

use crate::Error;

/// Execute a CPU-intensive closure on Tokio's blocking threadpool.
///
/// # Example
///
/// ```ignore
/// let hits = run_blocking(move || index.search_vector(&query, k)).await?;
/// ```
pub async fn run_blocking<F, T>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Unknown(format!("Blocking task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        let sum = run_blocking(|| (1..=10).sum::<u32>()).await.unwrap();
        assert_eq!(sum, 55);
    }

    #[tokio::test]
    async fn test_run_blocking_reports_panics() {
        let err = run_blocking(|| -> u32 { panic!("boom") }).await.unwrap_err();
        assert!(err.to_string().contains("Blocking task failed"));
    }
}
