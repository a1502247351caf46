//! Protocol data units: function code plus data, independent of framing.

pub mod exception;
pub mod function_code;
pub mod request;
pub mod response;

pub use exception::{ExceptionCode, ExceptionResponse};
pub use function_code::{FunctionCode, ResponseLength};
pub use request::{DecodedRequest, Request};
pub use response::{BitData, RegisterData, Response, WriteEcho};
