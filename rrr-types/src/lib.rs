//! Typed-array record format and its wire codec (§4.1, §3).

pub mod codec;
pub mod err;
pub mod message;
pub mod topic;
pub mod value;

pub use codec::{decode_array, decode_with_template, encode_array, parse_definition, DecodeOptions, TemplateField};
pub use message::{Message, MessageClass};
pub use topic::{topic_match, TopicFilter};
pub use value::{Array, TypeKind, TypeValue};
