pub mod auth;
pub mod mcp;
pub mod tools;
