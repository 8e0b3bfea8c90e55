pub mod item;
pub mod label;

pub use item::{ItemFields, MessageContent, NodeId, RenderState};
pub use label::{Classification, Label, SuggestedAction};
