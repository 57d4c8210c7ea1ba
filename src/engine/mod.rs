//! Response selection and funnel pipeline.

pub mod cascade;
pub mod context;
pub mod emotion;
pub mod funnel;
pub mod learning;
pub mod responder;
pub mod service;
pub mod templates;

pub use emotion::EmotionLabel;
pub use service::{ConversationService, EngineMode, ServiceStats, TurnReply};
