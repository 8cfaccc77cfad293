// src/repository/mod.rs
pub mod role_repository;
