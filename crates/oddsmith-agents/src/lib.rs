pub mod consensus;
pub mod dependency;
pub mod error;
pub mod gateway;
pub mod parser;
pub mod prompts;
pub mod providers;

pub mod test_support;

pub use consensus::{simple_average, weighted_average, ConsensusEngine};
pub use dependency::DependencyDetector;
pub use error::{AgentError, ConsensusError};
pub use gateway::{settle_judge, EstimatorAgent};
