pub mod dsl;
pub mod feedback;
pub mod service;

pub use dsl::{
    ChatRequest, ChatResponse, FeedbackRequest, FeedbackResponse, RequestValidationError,
    SourceInfo, TokenUsageInfo,
};
pub use feedback::FeedbackService;
pub use service::{ChatComponents, ChatService};
