//! # Clinic Assistant
//!
//! A Telegram bot for a plastic surgery clinic. It answers questions through
//! a language model with canned fallbacks, books consultations through a
//! multi-step dialogue, and exposes the collected requests through a small
//! admin API.

pub mod admin;
pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod fallback;
pub mod llm;
pub mod localization;
pub mod logging;
pub mod prompt;
pub mod responder;
pub mod site_content;
pub mod site_parser;
pub mod transport;
