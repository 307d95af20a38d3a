//! BER encoding rules: tags, lengths, elements, paths, and codecs

pub mod decoder;
pub mod element;
pub mod encoder;
pub mod framer;
pub mod path;
pub mod types;

pub use decoder::{ParseHandler, PduDecoder};
pub use element::Element;
pub use encoder::BerEncoder;
pub use framer::PduFramer;
pub use path::{DerPath, PathStep, StepKind};
pub use types::{Tag, TagClass};
