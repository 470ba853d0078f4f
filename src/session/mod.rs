//! Run orchestration: producer/encoder threading, codec fallback and post-processing.

/// Render session and sink factories.
pub mod render_session;
