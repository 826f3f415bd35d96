//! # MirrorKit Protocol
//!
//! Wire-level data model for MirrorKit content replication.
//!
//! This crate provides:
//! - Remote item and relationship model (`<entity-type>--<bundle>` typed
//!   resource objects with attributes and references)
//! - Collection document decoding (single-object and array shapes,
//!   pagination links, total count)
//! - Remote metadata decoding (channels, field mapping table)
//! - Page-window arithmetic and collection URL construction
//!
//! No I/O happens here; the engine crate owns fetching and storage.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod item;
mod paging;
mod remote;

pub use document::CollectionDocument;
pub use error::{ProtocolError, ProtocolResult};
pub use item::{EntityTypeId, ItemRef, Relationship, RemoteItem};
pub use paging::{page_windows, uuid_filter_url, window_url, PageWindow};
pub use remote::{ChannelInfo, FieldMappings, RemoteInfo};
