//! 举报仓储接口

use async_trait::async_trait;

use crate::entities::report::Report;
use crate::errors::RepositoryResult;

/// 举报仓储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: Report) -> RepositoryResult<Report>;

    async fn list(&self) -> RepositoryResult<Vec<Report>>;
}
