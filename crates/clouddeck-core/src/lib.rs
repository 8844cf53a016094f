//! Core types and utilities for clouddeck.
//!
//! This crate provides the pieces shared by the authentication and machine
//! control crates:
//!
//! - **Outcomes**: the closed set of application-level results ([`Outcome`])
//! - **Error normalization**: probing heterogeneous provider error bodies for a
//!   code and message, stripping namespace prefixes, and classifying the code
//! - **Failures**: the data-carrying failure reported by every operation
//! - **Replies**: buffering an HTTP response and interpreting its body
//! - **Single-flight**: at-most-one-outstanding-call markers
//!
//! # Example
//!
//! ```
//! use clouddeck_core::{normalize, Failure, Outcome};
//!
//! let body = serde_json::json!({
//!     "__type": "com.amazonaws#NotAuthorizedException",
//!     "message": "Incorrect username or password."
//! });
//! let body = body.as_object().unwrap();
//!
//! let code = normalize::normalize_code(&normalize::extract_code(body));
//! assert_eq!(code, "NotAuthorizedException");
//! assert_eq!(normalize::classify(&code), Outcome::NotAuthorized);
//!
//! let failure = Failure::new(code, normalize::extract_message(body));
//! assert_eq!(failure.outcome, Outcome::NotAuthorized);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod failure;
pub mod flight;
pub mod normalize;
pub mod outcome;
pub mod reply;

pub use failure::{codes, Failure, Result};
pub use flight::{Flight, FlightGuard};
pub use outcome::Outcome;
pub use reply::{HttpReply, JsonObject};
