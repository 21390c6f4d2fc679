use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use memmap::Mmap;

use error::CdbError;
use Result;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenMode {
    Mmap,
    Heap,
    Unbuffered,
}

enum Region {
    Heap(Box<[u8]>),
    Mmap(Mmap),
}

impl AsRef<[u8]> for Region {
    fn as_ref(&self) -> &[u8] {
        match *self {
            Region::Heap(ref b) => &b[..],
            Region::Mmap(ref m) => &m[..],
        }
    }
}

pub(crate) enum Backing {
    InMemory { region: Region, size: u64 },
    Unbuffered { file: File, size: u64 },
}

impl Backing {
    pub(crate) fn open(path: &Path, mode: OpenMode) -> Result<Backing> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        match mode {
            OpenMode::Mmap => {
                let mmap = unsafe { Mmap::map(&file) }?;
                Ok(Backing::InMemory {
                    region: Region::Mmap(mmap),
                    size,
                })
            }
            OpenMode::Heap => {
                use std::io::Read;
                let mut f = file;
                let mut buf = Vec::with_capacity(size as usize);
                f.read_to_end(&mut buf)?;
                Ok(Backing::InMemory {
                    region: Region::Heap(buf.into_boxed_slice()),
                    size,
                })
            }
            OpenMode::Unbuffered => Ok(Backing::Unbuffered { file, size }),
        }
    }

    pub(crate) fn size(&self) -> u64 {
        match *self {
            Backing::InMemory { size, .. } => size,
            Backing::Unbuffered { size, .. } => size,
        }
    }

    pub(crate) fn read(&self, buf: &mut [u8], pos: u32) -> Result<()> {
        let want = buf.len() as u64;
        let end = (pos as u64)
            .checked_add(want)
            .ok_or_else(|| CdbError::malformed("read position overflowed u64"))?;

        // checked against file size for every backing mode, not just mmap/heap.
        if end > self.size() {
            return Err(CdbError::malformed(format!(
                "read of {} bytes at {} exceeds file size {}",
                want, pos, self.size()
            )));
        }

        match *self {
            Backing::InMemory { ref region, .. } => {
                let data = region.as_ref();
                let start = pos as usize;
                let stop = end as usize;
                buf.copy_from_slice(&data[start..stop]);
                Ok(())
            }
            // Within bounds, but the underlying file may still be truncated
            // out from under us (or the read interrupted); `pread_exact`
            // retries transparently and turns a genuine short read into
            // `MalformedFile`.
            Backing::Unbuffered { ref file, .. } => pread_exact(file, buf, pos as u64),
        }
    }
}

#[cfg(unix)]
fn pread_exact(file: &File, mut buf: &mut [u8], mut pos: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;

    while !buf.is_empty() {
        match file.read_at(buf, pos) {
            Ok(0) => {
                return Err(CdbError::malformed(format!(
                    "short read: wanted {} more bytes at {}, got 0",
                    buf.len(),
                    pos
                )));
            }
            Ok(n) => {
                let tmp = buf;
                buf = &mut tmp[n..];
                pos += n as u64;
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn pread_exact(file: &File, mut buf: &mut [u8], mut pos: u64) -> Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, pos) {
            Ok(0) => {
                return Err(CdbError::malformed(format!(
                    "short read: wanted {} more bytes at {}, got 0",
                    buf.len(),
                    pos
                )));
            }
            Ok(n) => {
                let tmp = buf;
                buf = &mut tmp[n..];
                pos += n as u64;
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
