use crate::domain::model::CoverageRequest;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn write_file(
        &self,
        path: &Path,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 遠端 coverage 服務（WCS GetCoverage）
#[async_trait]
pub trait CoverageService: Send + Sync {
    async fn get_coverage(&self, request: &CoverageRequest) -> Result<Vec<u8>>;
}

/// coverage 的時間維度查詢（WCS DescribeCoverage）
#[async_trait]
pub trait CoverageCatalog: Send + Sync {
    async fn time_positions(
        &self,
        url: &str,
        coverage: &str,
        year: Option<i32>,
    ) -> Result<Vec<String>>;
}
