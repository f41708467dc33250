// src/deepresearch/mod.rs

pub mod agent;
pub mod capabilities;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod controller;
pub mod event;
pub mod llm_session;
pub mod research;
pub mod search;
pub mod session_store;

// Explicitly export the session so callers reach it as deepresearch::LLMSession
// instead of deepresearch::llm_session::LLMSession.
pub use llm_session::LLMSession;
