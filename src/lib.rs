//! # Interview Harness
//!
//! A retrieval-augmented interview practice engine. Upload a resume and a
//! job description, generate interview questions grounded in both, answer
//! them, and get a structured score that is kept for later review.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ extract ─▶ chunk ─▶ embed ─▶ ┌──────────────┐
//!                                         │ vector index │ (SQLite)
//!  question/answer ─▶ embed ─▶ retrieve ◀─┴──────────────┘
//!                                  │
//!                                  ▼
//!                        context assembly (char budget)
//!                                  │
//!                                  ▼
//!               prompt ─▶ LLM (JSON mode) ─▶ parse/recover ─▶ normalize
//!                                                               │
//!                                   questions ◀─────────────────┤
//!                                   score ─▶ attempts (SQLite) ◀┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors with stable kinds |
//! | [`config`] | TOML configuration parsing |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Durable and in-memory vector indexes |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`ingest`] | Ingestion pipeline and upload entry point |
//! | [`retrieval`] | Top-k retrieval and context assembly |
//! | [`generation`] | LLM provider abstraction |
//! | [`orchestrator`] | Prompt rendering and structured-output recovery |
//! | [`prompts`] | Prompt templates |
//! | [`questions`] | Question synthesis |
//! | [`scoring`] | Answer scoring |
//! | [`attempts`] | Attempt store |
//! | [`service`] | Wired entry points |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod attempts;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod questions;
pub mod retrieval;
pub mod scoring;
pub mod server;
pub mod service;
pub mod vector_index;

pub use error::{Error, Result};
