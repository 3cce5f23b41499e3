// ABOUTME: Library crate for gitvfs exposing the virtual file system, git plumbing and branch workflow

#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod events;
pub mod git;
pub mod models;
pub mod monitor;
pub mod plugins;
pub mod vfs;
pub mod workflow;
