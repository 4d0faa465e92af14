//! Extraction stages for a pay-stub scan.
//!
//! Each submodule implements exactly one step, so each can be tested
//! without the others and without a live model.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ encode ──▶ extract ──▶ clean + parse
//! (sniff)    (base64)   (VLM)       (JSON → ExtractedStub)
//! ```
//!
//! 1. [`upload`]  — size ceiling and JPEG/PNG sniffing; rejects before any
//!    quota is spent
//! 2. [`encode`]  — base64-wrap the accepted bytes as multimodal `ImageData`
//! 3. [`extract`] — drive the VLM call and turn its reply into a stub; the
//!    only stage with network I/O
//! 4. [`clean`]   — strip markdown fences and stray prose around the JSON

pub mod clean;
pub mod encode;
pub mod extract;
pub mod upload;
