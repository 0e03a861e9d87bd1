#![forbid(unsafe_code)]

//! histex: recover AI chat history from Cursor and Continue local storage.
//!
//! Conversations are stored in several layouts that changed across editor
//! versions. Each container is classified by [`shape::detect`], its bubbles
//! are gathered by [`assemble::assemble`] and normalized one at a time by
//! [`normalize::normalize`] into the single [`model::Conversation`] shape,
//! which [`pipeline::Extractor`] streams out as JSONL.

pub mod assemble;
pub mod backends;
pub mod discovery;
pub mod error;
pub mod fields;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod shape;
pub mod source;
