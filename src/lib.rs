// Library for tests to access modules

pub mod analytics;
pub mod cluster;
pub mod collector;
pub mod config;
pub mod distributor;
pub mod error;
pub mod models;
pub mod scenario;
pub mod sink;
pub mod version;
pub mod waiter;
