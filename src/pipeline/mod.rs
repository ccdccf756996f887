//! Pipeline stages for contract drafting.
//!
//! Each submodule implements one step and can be called on its own.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ extract ──▶ matcher ──▶ fill
//! (base64)     (LLM)       (exact+LLM)  (template)
//! ```
//!
//! 1. [`document`] load sources from data URIs, paths or URLs into one
//!    base64 representation
//! 2. [`extract`] one model call turns the documents into an entity map
//!    plus a schema describing each field
//! 3. [`matcher`] pair template placeholders with entity keys: exact
//!    canonical matches first, then one model call for the rest
//! 4. [`fill`] literal substitution; unmatched blanks stay visible
//!
//! [`keys`] holds the canonical key form shared by every stage, [`llm`] the
//! model-client seam, and [`response`] the JSON recovery used on every model
//! reply.

pub mod document;
pub mod extract;
pub mod fill;
pub mod keys;
pub mod llm;
pub mod matcher;
pub mod response;
