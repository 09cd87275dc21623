#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod presentation;
pub mod session;
