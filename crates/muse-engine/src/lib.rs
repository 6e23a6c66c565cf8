pub mod config;
pub mod error;
pub mod export;
pub mod gateway;
pub mod host;
pub mod image;
pub mod orchestrator;
pub mod session;
pub mod text;
pub mod transport;

pub use config::EngineConfig;
pub use error::{BackendError, ImageError, OrchestratorError, TextGenerationError};
pub use gateway::ImageGateway;
pub use orchestrator::{ContentOrchestrator, DispatchHandle};
pub use session::{Campaign, CampaignSession, ImageEdits, PatchOutcome, SessionUpdate};
