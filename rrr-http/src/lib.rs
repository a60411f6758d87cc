//! HTTP/1.1 request/response/multipart part parser (§4.6): a pure
//! byte-range state machine invoked iteratively by the caller, plus the
//! chunked-body decoder, multipart sub-part recursion, and query-string
//! extractor it builds on.

pub mod chunked;
pub mod err;
pub mod header;
pub mod method;
pub mod multipart;
pub mod parser;
pub mod part;
pub mod query;

pub use chunked::ChunkedDecoder;
pub use err::{HttpParseError, HttpParseErrorKind, ParseStatus};
pub use header::{definition_for, parse_header_line, HeaderDefinition, HeaderField, HeaderSubvalue};
pub use method::{Method, RequestBodyContentKind};
pub use multipart::{parse_multipart_body, MultipartPart, DEFAULT_MAX_PARTS};
pub use parser::{parse, ParseResult, ParseType, ParserConfig};
pub use part::{FirstLine, HttpPart};
pub use query::{decode_component, extract_fields, split_uri, Field};
