pub mod arguments;
pub mod dag;
pub mod delegation;
pub mod error;
pub mod message;
pub mod operator;
pub mod orchestrator;
pub mod project;
pub mod store;
pub mod tool;
