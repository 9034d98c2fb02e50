//! Persistent feedback storage.

pub mod feedback;

pub use feedback::FeedbackStore;
