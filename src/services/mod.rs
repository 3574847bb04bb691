//! Collaborator interfaces, their implementations, and the handler logic built on them.

pub mod archive;
pub mod cleanup;
pub mod document_store;
pub mod imaging;
pub mod memory;
pub mod messenger;
pub mod notify;
pub mod object_store;
pub mod pipeline;
pub mod scratch;
pub mod storage_service;
pub mod sweep;
