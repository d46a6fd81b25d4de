use crate::core::retry::RetryPolicy;
use crate::domain::model::{CoverageRequest, FetchOutcome};
use crate::domain::ports::{CoverageService, Storage};
use crate::utils::error::HarvestError;
use std::path::Path;

/// 單一 (layer, identifier) 的下載：請求 → 重試 → 寫檔
pub struct LayerFetcher<C: CoverageService, S: Storage> {
    service: C,
    storage: S,
    retry: RetryPolicy,
    span: tracing::Span,
}

impl<C: CoverageService, S: Storage> LayerFetcher<C, S> {
    pub fn new(service: C, storage: S, retry: RetryPolicy, span: tracing::Span) -> Self {
        Self {
            service,
            storage,
            retry,
            span,
        }
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetches one coverage and writes it to `destination`.
    ///
    /// Never returns an error: every failure is logged and reported as
    /// [`FetchOutcome::Failed`].
    pub async fn fetch(&self, request: &CoverageRequest, destination: &Path) -> FetchOutcome {
        let filename = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| destination.display().to_string());

        let payload = self
            .retry
            .run(&self.span, || self.service.get_coverage(request))
            .await;

        let bytes = match payload {
            Ok(bytes) => bytes,
            Err(e) => {
                self.log_failure(&e, request, &filename);
                return FetchOutcome::Failed(e.to_string());
            }
        };

        if bytes.is_empty() {
            tracing::warn!(
                parent: &self.span,
                "⚠️ Empty coverage returned for {} (coverage {}), nothing written",
                filename,
                request.identifier
            );
            return FetchOutcome::SkippedNoData;
        }

        match self.storage.write_file(destination, &bytes).await {
            Ok(()) => {
                tracing::info!(
                    parent: &self.span,
                    "✅ WCS data downloaded and saved as {} ({} bytes)",
                    filename,
                    bytes.len()
                );
                FetchOutcome::Success(destination.to_path_buf())
            }
            Err(e) => {
                tracing::error!(parent: &self.span, "❌ Failed to write {}: {}", filename, e);
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    fn log_failure(&self, err: &HarvestError, request: &CoverageRequest, filename: &str) {
        match err {
            HarvestError::RetryExhausted {
                attempts,
                last_status,
            } => tracing::error!(
                parent: &self.span,
                "❌ HTTP {} persisted after {} attempts when accessing {}; {} not downloaded",
                last_status,
                attempts,
                request.url,
                filename
            ),
            HarvestError::HttpStatus {
                url,
                status,
                reason,
            } => tracing::error!(
                parent: &self.span,
                "❌ HTTP {}: {} when accessing {}",
                status,
                reason,
                url
            ),
            HarvestError::ServiceException { message, .. } => tracing::error!(
                parent: &self.span,
                "❌ WCS server returned exception while trying to download {}: {}",
                filename,
                message
            ),
            other => tracing::error!(
                parent: &self.span,
                "❌ Failed to download {}: {}",
                filename,
                other
            ),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::domain::model::{BoundingBox, GridSpec};
    use std::path::PathBuf;

    fn request() -> CoverageRequest {
        CoverageRequest::geotiff(
            "http://wcs.test/WCSServer",
            "1",
            "EPSG:4326",
            BoundingBox::new(149.0, -35.0, 149.1, -34.9),
            GridSpec::Resolution {
                resx: 0.000833,
                resy: 0.000833,
            },
        )
    }

    fn fetcher(service: ScriptedService, storage: MemoryStorage) -> LayerFetcher<ScriptedService, MemoryStorage> {
        LayerFetcher::new(service, storage, RetryPolicy::default(), tracing::Span::none())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_then_written() {
        let service = ScriptedService::with(vec![Err(status(503)), Err(status(502))]);
        let storage = MemoryStorage::default();
        let dest = PathBuf::from("/out/SLGA_Clay_0-5cm_site.tiff");

        let outcome = fetcher(service.clone(), storage.clone())
            .fetch(&request(), &dest)
            .await;

        assert_eq!(outcome, FetchOutcome::Success(dest.clone()));
        assert_eq!(service.calls(), 3);
        assert_eq!(storage.get(&dest).unwrap(), b"II*\x00payload");
    }

    #[tokio::test]
    async fn test_permanent_http_error_fails_without_retry_or_file() {
        let service = ScriptedService::with(vec![Err(status(404))]);
        let storage = MemoryStorage::default();
        let dest = PathBuf::from("/out/missing.tiff");

        let outcome = fetcher(service.clone(), storage.clone())
            .fetch(&request(), &dest)
            .await;

        assert!(matches!(outcome, FetchOutcome::Failed(ref r) if r.contains("404")));
        assert_eq!(service.calls(), 1);
        assert!(storage.get(&dest).is_none());
    }

    #[tokio::test]
    async fn test_service_exception_fails() {
        let service = ScriptedService::with(vec![Err(HarvestError::ServiceException {
            url: "http://wcs.test".to_string(),
            message: "Invalid bbox".to_string(),
        })]);
        let storage = MemoryStorage::default();

        let outcome = fetcher(service.clone(), storage.clone())
            .fetch(&request(), &PathBuf::from("/out/x.tiff"))
            .await;

        assert!(matches!(outcome, FetchOutcome::Failed(ref r) if r.contains("Invalid bbox")));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_reported_as_failure() {
        let service = ScriptedService::with(vec![
            Err(status(503)),
            Err(status(503)),
            Err(status(503)),
        ]);
        let storage = MemoryStorage::default();
        let dest = PathBuf::from("/out/x.tiff");

        let outcome = fetcher(service.clone(), storage.clone()).fetch(&request(), &dest).await;

        assert!(matches!(outcome, FetchOutcome::Failed(ref r) if r.contains("Giving up")));
        assert_eq!(service.calls(), 3);
        assert!(storage.get(&dest).is_none());
    }

    #[tokio::test]
    async fn test_empty_payload_is_skipped() {
        let service = ScriptedService::with(vec![Ok(Vec::new())]);
        let storage = MemoryStorage::default();

        let outcome = fetcher(service, storage.clone())
            .fetch(&request(), &PathBuf::from("/out/x.tiff"))
            .await;

        assert_eq!(outcome, FetchOutcome::SkippedNoData);
        assert!(storage.files.lock().unwrap().is_empty());
    }
}
