use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use codec;
use error::CdbError;
use Result;
use {HEADER_SIZE, MAIN_TABLE_SIZE, SLOT_SIZE};

// number of (hash, record_pos) pairs held per hplist block before chaining a new one.
const BLOCK_CAP: usize = 1000;

#[derive(Copy, Clone, Default)]
struct HpEntry {
    hash: u32,
    pos: u32,
}

// append-only chain of fixed-capacity blocks, preserving insertion order.
struct HpList {
    blocks: Vec<Vec<HpEntry>>,
}

impl HpList {
    fn new() -> HpList {
        HpList {
            blocks: vec![Vec::with_capacity(BLOCK_CAP)],
        }
    }

    fn push(&mut self, entry: HpEntry) {
        if self.blocks.last().map(|b| b.len()) == Some(BLOCK_CAP) {
            self.blocks.push(Vec::with_capacity(BLOCK_CAP));
        }
        self.blocks.last_mut().unwrap().push(entry);
    }

    fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }
}

// single write() call; a short write is Err, never silently retried.
fn write_checked<W: Write>(w: &mut W, buf: &[u8]) -> Result<()> {
    let wrote = w.write(buf)?;
    if wrote != buf.len() {
        return Err(CdbError::WriteFailed {
            wanted: buf.len(),
            wrote,
        });
    }
    Ok(())
}

pub struct Builder {
    file: File,
    final_path: PathBuf,
    temp_path: PathBuf,
    pos: u32,
    hplist: HpList,
}

impl Builder {
    pub fn create<P: AsRef<Path>>(final_path: P, temp_path: P) -> Result<Builder> {
        let mut file = File::create(temp_path.as_ref())?;
        write_checked(&mut file, &[0u8; HEADER_SIZE])?;

        Ok(Builder {
            file,
            final_path: final_path.as_ref().to_path_buf(),
            temp_path: temp_path.as_ref().to_path_buf(),
            pos: HEADER_SIZE as u32,
            hplist: HpList::new(),
        })
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let klen = u32_len(key.len())?;
        let vlen = u32_len(value.len())?;

        let mut header = [0u8; SLOT_SIZE];
        codec::pack_u32(&mut header[0..4], klen);
        codec::pack_u32(&mut header[4..8], vlen);

        write_checked(&mut self.file, &header)?;
        write_checked(&mut self.file, key)?;
        write_checked(&mut self.file, value)?;

        let hash = codec::hash(key);
        trace!("insert: hash={:08x} pos={} klen={} vlen={}", hash, self.pos, klen, vlen);
        self.hplist.push(HpEntry {
            hash,
            pos: self.pos,
        });

        let record_len = (SLOT_SIZE as u32)
            .checked_add(klen)
            .and_then(|v| v.checked_add(vlen))
            .ok_or_else(|| CdbError::overflow("record length overflowed u32"))?;
        self.pos = self
            .pos
            .checked_add(record_len)
            .ok_or_else(|| CdbError::overflow("write position overflowed u32"))?;

        Ok(())
    }

    // consumes self: a Builder can only be finished once.
    pub fn finish(mut self) -> Result<()> {
        let numentries = self.hplist.len();

        // 1. Bucketize.
        let mut count = [0u32; MAIN_TABLE_SIZE];
        for block in &self.hplist.blocks {
            for e in block {
                count[codec::bucket_of(e.hash)] += 1;
            }
        }

        // 2. Size the scratch partition array.
        let max_slots = count
            .iter()
            .cloned()
            .try_fold(0u32, |acc, c| {
                c.checked_mul(2).map(|s| ::std::cmp::max(acc, s))
            })
            .ok_or_else(|| CdbError::overflow("bucket slot count overflowed u32"))?;
        let memsize = ::std::cmp::max(1, max_slots)
            .checked_add(numentries as u32)
            .ok_or_else(|| CdbError::overflow("scratch partition size overflowed u32"))?;
        if (memsize as u64) * (SLOT_SIZE as u64) > u32::max_value() as u64 {
            return Err(CdbError::overflow(
                "scratch partition would exceed the 32-bit offset space",
            ));
        }

        // 3. Partition into `split`, grouped by bucket, insertion order
        // preserved within each bucket. Walking each block in reverse while
        // pre-decrementing `start[bucket]` is a stable counting-sort: it
        // reconstructs forward insertion order without a second buffer pass.
        let mut start = [0u32; MAIN_TABLE_SIZE];
        {
            let mut acc = 0u32;
            for i in 0..MAIN_TABLE_SIZE {
                acc = acc
                    .checked_add(count[i])
                    .ok_or_else(|| CdbError::overflow("bucket offset overflowed u32"))?;
                start[i] = acc;
            }
        }

        let mut split = vec![HpEntry::default(); numentries];
        for block in &self.hplist.blocks {
            for e in block.iter().rev() {
                let b = codec::bucket_of(e.hash);
                start[b] -= 1;
                split[start[b] as usize] = *e;
            }
        }
        // `start[i]` has returned to the begin-offset of bucket `i`.

        // 4. Emit the 256 tables.
        let mut header_buf = [0u8; HEADER_SIZE];
        for i in 0..MAIN_TABLE_SIZE {
            let bucket_count = count[i];
            let slots = bucket_count
                .checked_mul(2)
                .ok_or_else(|| CdbError::overflow("table slot count overflowed u32"))?;

            codec::pack_u32(&mut header_buf[i * SLOT_SIZE..i * SLOT_SIZE + 4], self.pos);
            codec::pack_u32(&mut header_buf[i * SLOT_SIZE + 4..i * SLOT_SIZE + 8], slots);

            if slots == 0 {
                continue;
            }

            let mut table = vec![(0u32, 0u32); slots as usize];
            let begin = start[i] as usize;
            for k in 0..(bucket_count as usize) {
                let e = split[begin + k];
                let mut slot = codec::initial_slot(e.hash, slots) as usize;
                while table[slot].1 != 0 {
                    slot = (slot + 1) % slots as usize;
                }
                table[slot] = (e.hash, e.pos);
            }

            let mut buf = vec![0u8; slots as usize * SLOT_SIZE];
            for (idx, &(h, p)) in table.iter().enumerate() {
                codec::pack_u32(&mut buf[idx * SLOT_SIZE..idx * SLOT_SIZE + 4], h);
                codec::pack_u32(&mut buf[idx * SLOT_SIZE + 4..idx * SLOT_SIZE + 8], p);
            }
            trace!("finish: bucket {} slots={} pos={}", i, slots, self.pos);
            write_checked(&mut self.file, &buf)?;

            let advance = slots
                .checked_mul(SLOT_SIZE as u32)
                .ok_or_else(|| CdbError::overflow("table byte length overflowed u32"))?;
            self.pos = self
                .pos
                .checked_add(advance)
                .ok_or_else(|| CdbError::overflow("write position overflowed u32"))?;
        }

        // 5. Publish: patch the header, fsync, rename.
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        write_checked(&mut self.file, &header_buf)?;
        self.file.flush()?;
        self.file.sync_all()?;
        drop(self.file);

        fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }
}

fn u32_len(n: usize) -> Result<u32> {
    if n as u64 > u32::max_value() as u64 {
        Err(CdbError::overflow("key or value length exceeds u32::MAX"))
    } else {
        Ok(n as u32)
    }
}
