// no NotFound variant: an absent key is Ok(None) at every public boundary.

use std::io;

#[derive(Debug, Fail)]
pub enum CdbError {
    #[fail(display = "unexpected end of file: wanted {} bytes at {}, only {} available", wanted, pos, available)]
    UnexpectedEof {
        pos: u32,
        wanted: usize,
        available: usize,
    },

    #[fail(display = "malformed cdb file: {}", reason)]
    MalformedFile { reason: String },

    #[fail(display = "I/O error: {}", _0)]
    IoFailed(#[cause] io::Error),

    #[fail(display = "short write: wrote {} of {} bytes", wrote, wanted)]
    WriteFailed { wanted: usize, wrote: usize },

    #[fail(display = "overflow: {}", reason)]
    Overflow { reason: String },
}

impl CdbError {
    pub fn malformed<S: Into<String>>(reason: S) -> CdbError {
        CdbError::MalformedFile {
            reason: reason.into(),
        }
    }

    pub fn overflow<S: Into<String>>(reason: S) -> CdbError {
        CdbError::Overflow {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for CdbError {
    fn from(e: io::Error) -> CdbError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CdbError::UnexpectedEof {
                pos: 0,
                wanted: 0,
                available: 0,
            }
        } else {
            CdbError::IoFailed(e)
        }
    }
}
