pub mod config;
pub mod nutrition;
pub mod pipeline;
pub mod routes;
