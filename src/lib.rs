#![no_std]

extern crate alloc;

mod chainfs_error;
mod disk;
mod sector_serializable;
mod utils;

pub use chainfs_error::{ChainFSError, ChainFSErrorConvertible};
pub use disk::*;
pub use sector_serializable::SectorSerializable;
