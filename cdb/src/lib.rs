// see DESIGN.md in the workspace root for how each module maps onto the cdb format.

extern crate bytes;
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate memmap;

// dev dependencies
#[cfg(test)] extern crate proptest;
#[cfg(test)] extern crate rand;
#[cfg(test)] extern crate tempfile;

pub mod codec;
pub mod error;
pub mod io;

mod builder;
mod reader;

pub use builder::Builder;
pub use codec::{hash, pack_u32, unpack_u32, STARTING_HASH};
pub use error::CdbError;
pub use io::OpenMode;
pub use reader::Reader;

pub type Result<T> = ::std::result::Result<T, CdbError>;

pub const HEADER_SIZE: usize = 2048;
pub const MAIN_TABLE_SIZE: usize = 256;
pub const MAIN_TABLE_ENTRY_SIZE: usize = 8;
pub const SLOT_SIZE: usize = 8;

pub fn open<P: AsRef<::std::path::Path>>(path: P, mode: OpenMode) -> Result<Reader> {
    Reader::open(path, mode)
}

pub fn builder<P: AsRef<::std::path::Path>>(final_path: P, temp_path: P) -> Result<Builder> {
    Builder::create(final_path, temp_path)
}
