//! Agent Sandbox library - session orchestration for sandboxed AI coding agents

pub mod agents;
pub mod cli;
pub mod collab;
pub mod containers;
pub mod engine;
pub mod git;
pub mod provider;
pub mod session;
pub mod tui;
