//! # docshelf
//!
//! A small document corpus server. One directory of Markdown and PDF files is
//! listed and served over HTTP, and can be replaced wholesale by uploading a
//! zip archive.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌─────────────┐
//! │  Router  │──▶│ sources / get /  │──▶│ CorpusStore │──▶ ./reading
//! │ (server) │   │ ingest + extract │   │  (store)    │
//! └────┬─────┘   └──────────────────┘   └─────────────┘
//!      │ /ask
//!      ▼
//!   upstream question-answering service (proxy)
//! ```
//!
//! Uploads are spooled and extracted into a hidden workspace inside the
//! corpus root and moved into place under an exclusive lock, so readers
//! always see one complete generation of the corpus.
//!
//! ## Quick Start
//!
//! ```bash
//! docshelf serve                     # listen on 127.0.0.1:3000
//! docshelf ingest ./docs.zip         # replace the corpus from a local archive
//! docshelf sources                   # list the corpus
//! docshelf get intro.md -o intro.md  # fetch one document
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error taxonomy and HTTP error mapping |
//! | [`extract`] | Zip extraction with entry confinement and limits |
//! | [`get`] | Single-file retrieval |
//! | [`ingest`] | Bulk corpus replacement |
//! | [`models`] | Response and metadata types |
//! | [`proxy`] | `/ask` pass-through |
//! | [`server`] | HTTP routes |
//! | [`sources`] | Corpus listing |
//! | [`store`] | Corpus directory, generations and path confinement |

pub mod config;
pub mod error;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod models;
pub mod proxy;
pub mod server;
pub mod sources;
pub mod store;
