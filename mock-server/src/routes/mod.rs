//! Request handlers, one module per API area. Handlers only extract, call
//! the store and wrap the result.

pub mod admin;
pub mod auth;
pub mod doctor;
pub mod notes;
pub mod patient;
