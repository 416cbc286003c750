//! pkgref - add, remove, and query package references in MSBuild-style project files

pub mod cli;
pub mod commands;
pub mod config;
pub mod details_uri;
pub mod manifest;
pub mod models;
pub mod mutator;
pub mod validation;
pub mod version;
