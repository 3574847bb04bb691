//! Core data models for the media functions service.
//!
//! Object references and metadata rows for the store, derivation requests and
//! outcomes for the image pipeline, and the payloads the trigger runtime
//! delivers.

pub mod bucket;
pub mod derivation;
pub mod event;
pub mod notification;
pub mod object;
