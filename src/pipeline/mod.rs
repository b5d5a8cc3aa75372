//! Triage pipeline.
//!
//! Every message in a batch flows through:
//! 1. `parse_message()` — MIME decoding into a `Message`
//! 2. `OverrideRules::apply()` — ordered keyword and domain rules
//! 3. `PriorityEngine::classify()` — statistical fallback with a confidence floor
//! 4. `rank()` — most recent first
//! 5. `select_escalations()` / `render_summary()` — the High-priority digest

pub mod batch;
pub mod escalation;
pub mod normalize;
pub mod processor;
pub mod ranking;
pub mod rules;
pub mod types;
