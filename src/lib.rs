//! # Notebook RAG
//!
//! Document search, grounded generation and notebook management on top of
//! Discovery Engine and Gemini, exposed as a CLI (`nbrag`) and as an MCP
//! tool server over stdio.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────┐
//!  CLI / MCP ──▶ │ generate_search_ │──▶ query, filter, order_by
//!                │ params (Gemini)  │
//!                └──────────────────┘
//!                         │
//!                         ▼
//!                ┌──────────────────┐    ┌──────────────┐
//!                │  SearchGateway   │──▶ │   response   │──▶ documents
//!                │ (Discovery Eng.) │    │    parser    │
//!                └──────────────────┘    └──────────────┘
//!                                                │
//!                                                ▼
//!                                     ┌──────────────────┐
//!                                     │ ContentGenerator │──▶ answer / slides / diagram
//!                                     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GCP_PROJECT_ID=my-project ENGINE_ID=my-search-app
//! export GCP_SERVICE_ACCOUNT_KEY_PATH=./secrets/sa.json
//! nbrag ask "2026年1月の議事録の要点"
//! nbrag slides "新規提案の概要" -o slides.md
//! nbrag metadata --bucket my-docs
//! nbrag serve mcp
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration plus environment overrides |
//! | [`credentials`] | Service-account keys and OAuth2 access tokens |
//! | [`http`] | Authorized JSON calls and Google error envelopes |
//! | [`error`] | Library error type |
//! | [`models`] | Search result types |
//! | [`response`] | Search response parsing |
//! | [`search`] | Search gateway with filter fallback |
//! | [`generate`] | Prompt templates over Gemini |
//! | [`domain`] | Notebook value objects and repository trait |
//! | [`notebook_service`] | Notebook use cases and DTOs |
//! | [`notebook_client`] | Discovery Engine notebook repository |
//! | [`tools`] | MCP tools and registry |
//! | [`mcp`] | MCP protocol bridge |
//! | [`server`] | stdio MCP server |
//! | [`connector_gcs`] | Cloud Storage listing |
//! | [`metadata`] | JSONL import metadata export |

pub mod config;
pub mod connector_gcs;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod generate;
pub mod http;
pub mod mcp;
pub mod metadata;
pub mod models;
pub mod notebook_client;
pub mod notebook_service;
pub mod response;
pub mod search;
pub mod server;
pub mod tools;
