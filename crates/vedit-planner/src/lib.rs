//! Client for the analysis and planning service.
//!
//! Content analysis (transcription, scene detection) and edit planning are
//! owned by an external HTTP service. The pipeline only sees the two traits
//! below, so tests and alternative backends can stand in for it.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use vedit_models::{ContentAnalysis, EditPlan};

pub use client::{PlannerClient, PlannerClientConfig};
pub use error::{PlannerError, PlannerResult};
pub use types::{AnalyzeRequest, HealthResponse, PlanRequest};

/// Builds planning context from a downloaded source.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalyzeRequest) -> PlannerResult<ContentAnalysis>;
}

/// Turns analysis context into an `EditPlan`.
#[async_trait]
pub trait EditPlanner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> PlannerResult<EditPlan>;
}
