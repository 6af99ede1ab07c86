//! Types shared by the registry core and the gateway: roles and the
//! in-process diagnostics pipeline.
pub mod auth;
pub mod observability;
