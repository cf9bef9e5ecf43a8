//! The incident reporting engine.
//!
//! `lifecycle` is the entry point used by the HTTP layer. It delegates access
//! decisions to `access`, numbering to `reference` and photo uploads to
//! `attachments`.

pub mod access;
pub mod attachments;
pub mod lifecycle;
pub mod reference;
