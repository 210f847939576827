//! # Snapsync Serde
//! Fixed-width, little-endian byte serialization shared by every snapsync
//! crate. Records written with this crate have a size that can be computed
//! ahead of time, which the snapshot engine relies on to size its buffers.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod byte_reader;
mod byte_writer;
mod error;
mod impls;
mod serde;

pub use byte_reader::ByteReader;
pub use byte_writer::ByteWriter;
pub use error::SerdeErr;
pub use serde::{ConstByteLength, Serde};
