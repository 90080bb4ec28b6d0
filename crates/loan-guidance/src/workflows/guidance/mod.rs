//! Loan risk scoring and repayment guidance.
//!
//! Requests flow through [`features::FeaturePipeline`] into the two tree-ensemble scorers
//! held by a [`ModelArtifact`], then through the [`GuidanceComposer`]. Everything after
//! artifact load is read-only.

pub mod artifact;
pub mod composer;
pub mod domain;
pub mod error;
pub mod features;
pub mod models;
pub mod router;
pub mod service;

#[cfg(test)]
pub(crate) mod tests;

pub use artifact::{
    load_artifact, save_artifact, ArtifactError, ArtifactStore, FileSystemArtifactStore,
    FittedEncoder, InMemoryArtifactStore, ModelArtifact, ARTIFACT_FORMAT_VERSION,
};
pub use composer::{
    categorize_risk, identify_risk_factors, GuidanceComposer, GuidancePackage, Impact,
    RiskAssessment, RiskFactor, RiskLevel,
};
pub use domain::{
    AttributeValue, BorrowerRecord, BorrowerType, BusinessProfile, FarmingProfile, LoanStatus,
    PaymentRecord, SectorData, SectorKind, StudentProfile,
};
pub use error::GuidanceError;
pub use features::{EnrichedRecord, FeatureMatrix, FeaturePipeline, FEATURE_COUNT, FEATURE_NAMES};
pub use models::{BoostingParams, ModelError, PaymentPredictor, RiskScorer};
pub use router::{guidance_router, GuidanceResponse, RequestSummary};
pub use service::{Clock, FixedClock, LoanGuidanceService, ModelAssessment, SystemClock};
