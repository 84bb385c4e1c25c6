pub mod backend;
pub mod config;
pub mod pool {
    pub mod manager;
    pub mod worker;
}
pub mod service;
pub mod settings;
pub mod streaming {
    pub mod aggregator;
    pub mod deadline;
    pub mod processor;
    pub mod request;
}
pub mod telemetry;
