pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod publish;
pub mod reading;
pub mod store;
pub mod transform;
pub mod validate;
