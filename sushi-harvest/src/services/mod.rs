//! Service modules for the SUSHI harvest pipeline
//!
//! Client → normalizer → orchestrator; the matcher consumes normalized or
//! legacy tabular records independently.

pub mod counter_exceptions;
pub mod counter_json;
pub mod dedup_matcher;
pub mod harvest_orchestrator;
pub mod report_normalizer;
pub mod sushi_client;

pub use counter_exceptions::{CounterException, ExceptionScan};
pub use dedup_matcher::{
    DedupMatcher, InexactNameReview, MatchCandidate, MatchPair, MatchResult, NoPendingConfirmation,
    PendingConfirmationPolicy, PendingMatch, ResourceMetadata,
};
pub use harvest_orchestrator::{HarvestOrchestrator, HarvestResult, MessageScope};
pub use report_normalizer::{normalize, populated_fields, NormalizeError};
pub use sushi_client::{SushiClient, SushiError, SushiResponse};
