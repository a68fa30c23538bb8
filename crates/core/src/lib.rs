pub mod catalog;
pub mod config;
pub mod grading;
pub mod inference;
pub mod metrics;
pub mod queue;
pub mod testing;
pub mod ticket;

pub use catalog::{ProblemCatalog, ProblemContext, ProblemDefinition, StaticProblemCatalog};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    LogFormat, SanitizedConfig, ServerConfig,
};
pub use grading::{
    Aggregator, Dispatcher, FinalizeOutcome, GradingConfig, GradingError, GradingWorker,
    RubricAdvisor, RubricSuggestionRequest, SubmitRequest, TicketUpdateCallback,
};
pub use inference::{create_inference_client, InferenceClient, InferenceConfig};
pub use queue::{InMemoryTaskQueue, QueueConfig, QueueStatus, SubtaskHandler, TaskQueue};
pub use ticket::{
    SqliteTicketStore, SubtaskKind, SubtaskStatus, Ticket, TicketFilter, TicketStatus,
    TicketStore,
};
