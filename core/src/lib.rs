//! Typed async client for the clinic booking API.
//!
//! # Overview
//! Three layers, each usable on its own:
//!
//! - `ApiClient` builds `HttpRequest` values, hands them to a `Transport`
//!   and parses `HttpResponse` values into typed data or an `ApiError`.
//! - `api::{admin, doctor, patient}` map every endpoint of a role to one
//!   method returning the server's `{data, message?, success}` envelope.
//! - `QueryCache` and `hooks` add keyed caching, in-flight request sharing
//!   and stale-while-revalidate on top of the resource methods.
//!
//! `AuthService` and `NotesService` cover sign-in and the blog notes, which
//! speak their own response shapes and report Spanish user-facing errors.
//!
//! # Design
//! - Requests and responses are plain data. Only `ReqwestTransport` does
//!   I/O, so everything above it is tested against a canned transport.
//! - Clients are explicit instances; there is no global base URL or header
//!   state.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod dates;
pub mod error;
pub mod hooks;
pub mod http;
pub mod notes;
pub mod query;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use api::{AdminApi, DoctorApi, PatientApi};
pub use auth::{AuthError, AuthService};
pub use cache::{Mutation, Query, QueryCache, QueryState};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use hooks::{AdminHooks, DoctorHooks, PatientHooks};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use notes::{NotesError, NotesService};
pub use query::{CacheKey, QueryParams};
pub use transport::{ReqwestTransport, Transport};
