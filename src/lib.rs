#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod endpoint;
pub mod error;
pub mod ws;

use crate::error::Error;

pub use endpoint::{DEFAULT_ENDPOINT, ENDPOINT_VAR, Endpoint};

pub type Result<T> = std::result::Result<T, Error>;
