//! Shared data contracts for the retint pipeline.
//!
//! The crate holds the detection wire shapes and their reduction into
//! [`detect::Region`] lists, the supported output-size catalog, the
//! inpainting request contract, and the append-only pipeline event writer.

pub mod detect;
pub mod dimensions;
pub mod events;
pub mod request;
