pub mod app;
pub mod archive;
pub mod config;
pub mod description;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod manifest;
pub mod output;
pub mod workspace;
