//! Foundation types for carton.
//!
//! This crate provides the identity and addressing types used throughout the
//! carton bundle store. Every other carton crate depends on `carton-types`.
//!
//! # Key Types
//!
//! - [`NodeId`] — content-addressed identity of a node (domain-separated BLAKE3)
//! - [`BundleId`] — content-addressed identity of a bundle blob (also its backend key)
//! - [`Locator`] — stable address of a node: bundle identity plus export index
//! - [`ContentHasher`] — domain-separated BLAKE3 hasher
//! - [`varint`] — LEB128 encoding shared by the node codec and the bundle format

pub mod error;
pub mod hasher;
pub mod id;
pub mod locator;
pub mod varint;

pub use error::TypeError;
pub use hasher::ContentHasher;
pub use id::{BundleId, NodeId};
pub use locator::Locator;
pub use varint::{decode_varint, encode_varint};
