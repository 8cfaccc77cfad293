// src/domain/mod.rs
pub mod catalog;
pub mod permission;
pub mod role_model;
pub mod session_model;
pub mod wire;
