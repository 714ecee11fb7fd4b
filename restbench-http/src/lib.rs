#![forbid(unsafe_code)]

mod client;
mod error;
mod factory;
mod types;
mod util;

pub use client::{DEFAULT_CONNECT_TIMEOUT, HttpClient};
pub use error::{Error, Result};
pub use factory::HttpWorkFactory;
pub use types::{HttpRequest, HttpResponse, parse_header_spec};
