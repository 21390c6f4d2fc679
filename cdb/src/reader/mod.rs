mod iter;

use std::path::Path;

use codec;
use error::CdbError;
use io::{Backing, OpenMode};
use Result;
use {HEADER_SIZE, MAIN_TABLE_ENTRY_SIZE, MAIN_TABLE_SIZE, SLOT_SIZE};

pub use self::iter::Iter;

#[derive(Debug)]
struct Probe {
    hpos: u32,
    hslots: u32,
    khash: u32,
    kpos: u32,
    steps: u32,
}

// end == 0 means no iteration in progress; shared with fetch's cursor fast path.
#[derive(Debug, Default)]
struct Cursor {
    end: u32,
    curpos: u32,
    curkey: Vec<u8>,
    fetch_advance: bool,
}

pub struct Reader {
    backing: Backing,
    cursor: Cursor,
}

impl Reader {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Reader> {
        let backing = Backing::open(path.as_ref(), mode)?;
        if backing.size() < HEADER_SIZE as u64 {
            return Err(CdbError::malformed(format!(
                "file too small to hold a {}-byte header",
                HEADER_SIZE
            )));
        }
        Ok(Reader {
            backing,
            cursor: Cursor::default(),
        })
    }

    fn header_entry(&self, bucket: usize) -> Result<(u32, u32)> {
        debug_assert!(bucket < MAIN_TABLE_SIZE);
        let mut buf = [0u8; MAIN_TABLE_ENTRY_SIZE];
        self.backing.read(&mut buf, (bucket * MAIN_TABLE_ENTRY_SIZE) as u32)?;
        let pos = codec::unpack_u32(&buf[0..4]);
        let slots = codec::unpack_u32(&buf[4..8]);
        Ok((pos, slots))
    }

    fn slot_at(&self, pos: u32) -> Result<(u32, u32)> {
        let mut buf = [0u8; SLOT_SIZE];
        self.backing.read(&mut buf, pos)?;
        let stored_hash = codec::unpack_u32(&buf[0..4]);
        let record_pos = codec::unpack_u32(&buf[4..8]);
        Ok((stored_hash, record_pos))
    }

    fn record_header(&self, pos: u32) -> Result<(u32, u32)> {
        if pos < HEADER_SIZE as u32 {
            return Err(CdbError::malformed(format!(
                "record position {} falls inside the header",
                pos
            )));
        }
        let mut buf = [0u8; SLOT_SIZE];
        self.backing.read(&mut buf, pos)?;
        let klen = codec::unpack_u32(&buf[0..4]);
        let dlen = codec::unpack_u32(&buf[4..8]);
        Ok((klen, dlen))
    }

    // 32-byte chunked compare so a collision reject never has to materialize the whole key.
    fn key_matches(&self, record_pos: u32, klen: u32, key: &[u8]) -> Result<bool> {
        if klen as usize != key.len() {
            return Ok(false);
        }

        const CHUNK: usize = 32;
        let base = record_pos
            .checked_add(SLOT_SIZE as u32)
            .ok_or_else(|| CdbError::malformed("record key offset overflowed u32"))?;

        let mut offset = 0usize;
        let mut chunk = [0u8; CHUNK];
        while offset < key.len() {
            let n = ::std::cmp::min(CHUNK, key.len() - offset);
            let pos = base
                .checked_add(offset as u32)
                .ok_or_else(|| CdbError::malformed("key compare offset overflowed u32"))?;
            self.backing.read(&mut chunk[..n], pos)?;
            if &chunk[..n] != &key[offset..offset + n] {
                return Ok(false);
            }
            offset += n;
        }
        Ok(true)
    }

    fn read_value(&self, record_pos: u32, klen: u32, dlen: u32) -> Result<Vec<u8>> {
        let data_pos = record_pos
            .checked_add(SLOT_SIZE as u32)
            .and_then(|p| p.checked_add(klen))
            .ok_or_else(|| CdbError::malformed("value offset overflowed u32"))?;
        let mut buf = vec![0u8; dlen as usize];
        self.backing.read(&mut buf, data_pos)?;
        Ok(buf)
    }

    fn find_start(&self, key: &[u8]) -> Result<Option<Probe>> {
        let h = codec::hash(key);
        let (hpos, hslots) = self.header_entry(codec::bucket_of(h))?;
        if hslots == 0 {
            return Ok(None);
        }
        let slot = codec::initial_slot(h, hslots);
        Ok(Some(Probe {
            hpos,
            hslots,
            khash: h,
            kpos: hpos + slot * SLOT_SIZE as u32,
            steps: 0,
        }))
    }

    fn find_next(&self, probe: &mut Probe, key: &[u8]) -> Result<Option<Vec<u8>>> {
        while probe.steps < probe.hslots {
            let (stored_hash, record_pos) = self.slot_at(probe.kpos)?;

            if record_pos == 0 {
                probe.steps = probe.hslots;
                return Ok(None);
            }

            probe.steps += 1;
            probe.kpos += SLOT_SIZE as u32;
            if probe.kpos >= probe.hpos + probe.hslots * SLOT_SIZE as u32 {
                probe.kpos = probe.hpos;
            }

            if stored_hash == probe.khash {
                let (klen, dlen) = self.record_header(record_pos)?;
                if self.key_matches(record_pos, klen, key)? {
                    return Ok(Some(self.read_value(record_pos, klen, dlen)?));
                }
            }
        }
        Ok(None)
    }

    pub fn find(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        trace!("find: key={:?}", key);
        match self.find_start(key)? {
            None => Ok(None),
            Some(mut probe) => self.find_next(&mut probe, key),
        }
    }

    pub fn multi_find(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        let mut probe = match self.find_start(key)? {
            None => return Ok(out),
            Some(p) => p,
        };
        while let Some(v) = self.find_next(&mut probe, key)? {
            out.push(v);
        }
        Ok(out)
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }
}
