//! Pipeline stages
//!
//! A stage takes the context by value and hands back the enriched context.

use async_trait::async_trait;
use join_types::{JoinContext, ProvisionError};

/// One ordered unit of provisioning work
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: JoinContext) -> Result<JoinContext, ProvisionError>;
}
