//! VMA archive extraction — parses a Proxmox VE backup container into
//! per-device sparse raw disk images and plain configuration files.
//!
//! [`extractor::extract`] is the library's single public entry point.
//! Everything else is organized leaf-first the way the archive is decoded:
//! [`source`] reads bytes, [`header`] and [`extent`] parse the two record
//! kinds, [`sparse`] and [`pool`] write the decoded clusters, [`md5`]
//! verifies the embedded digests, and [`progress`] reports on all of it
//! while [`extractor`] drives the whole pipeline.

pub mod cli;
pub mod config;
pub mod error;
pub mod extent;
pub mod extractor;
pub mod header;
pub mod md5;
pub mod pool;
pub mod progress;
pub mod source;
pub mod sparse;
pub mod timefn;

pub use error::{VmaError, VmaResult};
pub use extractor::{extract, Options, Summary};
