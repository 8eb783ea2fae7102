//! Convodesk Engine Library
//!
//! This library provides the conversation controller and everything the
//! `convodesk` binary builds around it. It is used by both the main binary
//! and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Completion provider abstraction layer
pub mod llm;

/// Local conversation engine
pub mod conversation;

/// Conversation controller
pub mod controller;

/// Task reveal-delay policy
pub mod visibility;

/// Busy flag and status indicator derivation
pub mod status;

/// Todo list service
pub mod todos;

/// Terminal rendering helpers
pub mod presenter;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
