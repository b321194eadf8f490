//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - Provider sign-in verification (Google, GitHub, Apple)
//! - Session cookie and bearer token resolution
//! - The session middleware gating protected routes
//! - SessionUser extractor for protected handlers

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod routes;


pub use routes::auth_routes;
