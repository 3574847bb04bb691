//! Image derivation and storage housekeeping functions.
//!
//! Handlers react to uploads in an object store (thumbnail generation), sweep
//! whole buckets (compress + thumbnail), remove folders whose owner document
//! is gone, archive deleted activity documents and send push notifications.
//! Collaborators sit behind the [`ObjectStore`](services::object_store::ObjectStore),
//! [`DocumentStore`](services::document_store::DocumentStore) and
//! [`Messenger`](services::messenger::Messenger) traits and are wired once
//! into an [`AppContext`](context::AppContext).

pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
