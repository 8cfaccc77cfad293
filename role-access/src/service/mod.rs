// src/service/mod.rs
pub mod authorization;
pub mod deletion_guard;
pub mod permission_codec;
pub mod permission_notifier;
pub mod role_hierarchy;
pub mod role_service;
pub mod session_registry;
