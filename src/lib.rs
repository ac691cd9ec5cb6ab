pub mod batch;
pub mod config;
pub mod llm;
pub mod markdown;
pub mod model;
pub mod orchestrator;
pub mod ports;
pub mod prompts;
pub mod publisher;
pub mod qc;
pub mod site;
pub mod store;
