use crate::error::Result;
use async_trait::async_trait;
use debuglog_api::HttpTransport;
use debuglog_api::PipelineClient;
use debuglog_api::PipelineDocument;

/// Read-modify-write access to the pipeline whose filter the registry owns.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn fetch_pipeline(&self) -> Result<PipelineDocument>;

    /// Replaces the filter query on `pipeline` and sends the whole document
    /// back.
    async fn write_filter(&self, pipeline: PipelineDocument, query: &str) -> Result<()>;
}

#[async_trait]
impl<T: HttpTransport> PipelineStore for PipelineClient<T> {
    async fn fetch_pipeline(&self) -> Result<PipelineDocument> {
        Ok(PipelineClient::fetch_pipeline(self).await?)
    }

    async fn write_filter(&self, pipeline: PipelineDocument, query: &str) -> Result<()> {
        Ok(PipelineClient::write_filter(self, pipeline, query).await?)
    }
}
