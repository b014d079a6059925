pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod types;

pub use db::{Backend, BackendAdapter, BackendKind};
pub use error::ProvisionError;
pub use service::reconciler::Reconciler;
