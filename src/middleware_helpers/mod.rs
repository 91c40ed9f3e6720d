pub mod request_id;
pub mod sanitize;
pub mod security_headers;

pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
pub use sanitize::{sanitize_address, sanitize_middleware, sanitize_string};
pub use security_headers::security_headers_middleware;
