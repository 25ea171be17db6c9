pub mod answer;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod gateway;
pub mod guard;
pub mod masking;
pub mod normalize;
pub mod output;
pub mod pool;
pub mod server;
pub mod translate;
pub mod verbose;
