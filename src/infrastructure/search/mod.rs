//! Semantic search service

pub mod service;
