// cursor phases, tracked implicitly by (end, fetch_advance):
// idle (end == 0), walking (fetch_advance == false, next_key advances),
// draining (fetch_advance == true, fetch advances).

use super::Reader;
use {CdbError, Result, HEADER_SIZE, SLOT_SIZE};

impl Reader {
    fn load_curkey(&mut self) -> Result<()> {
        let (klen, _dlen) = self.record_header(self.cursor.curpos)?;
        let key_pos = self
            .cursor
            .curpos
            .checked_add(SLOT_SIZE as u32)
            .ok_or_else(|| CdbError::malformed("key offset overflowed u32"))?;
        let key_end = key_pos
            .checked_add(klen)
            .ok_or_else(|| CdbError::malformed("key end offset overflowed u32"))?;
        if key_end > self.cursor.end {
            return Err(CdbError::malformed(
                "record at iterator cursor extends beyond the record region",
            ));
        }
        self.cursor.curkey.resize(klen as usize, 0);
        self.backing.read(&mut self.cursor.curkey, key_pos)?;
        Ok(())
    }

    fn iter_end(&mut self) {
        self.cursor.end = 0;
        self.cursor.curpos = 0;
        self.cursor.curkey.clear();
        self.cursor.fetch_advance = false;
    }

    fn advance_cursor(&mut self) -> Result<()> {
        let (klen, dlen) = self.record_header(self.cursor.curpos)?;
        let record_len = (SLOT_SIZE as u32)
            .checked_add(klen)
            .and_then(|v| v.checked_add(dlen))
            .ok_or_else(|| CdbError::malformed("record length overflowed u32"))?;
        self.cursor.curpos = self
            .cursor
            .curpos
            .checked_add(record_len)
            .ok_or_else(|| CdbError::malformed("cursor position overflowed u32"))?;
        if self.cursor.curpos > self.cursor.end {
            return Err(CdbError::malformed(
                "record at iterator cursor extends beyond the record region",
            ));
        }
        Ok(())
    }

    fn value_at_cursor(&self) -> Result<Vec<u8>> {
        let (klen, dlen) = self.record_header(self.cursor.curpos)?;
        let record_len = (SLOT_SIZE as u32)
            .checked_add(klen)
            .and_then(|v| v.checked_add(dlen))
            .ok_or_else(|| CdbError::malformed("record length overflowed u32"))?;
        let record_end = self
            .cursor
            .curpos
            .checked_add(record_len)
            .ok_or_else(|| CdbError::malformed("record end offset overflowed u32"))?;
        if record_end > self.cursor.end {
            return Err(CdbError::malformed(
                "record at iterator cursor extends beyond the record region",
            ));
        }
        self.read_value(self.cursor.curpos, klen, dlen)
    }

    pub fn first_key(&mut self) -> Result<Option<Vec<u8>>> {
        let (end, _slots) = self.header_entry(0)?;
        self.cursor.end = end;
        self.cursor.curpos = HEADER_SIZE as u32;
        self.cursor.fetch_advance = false;
        self.cursor.curkey.clear();

        if self.cursor.curpos < self.cursor.end {
            self.load_curkey()?;
            Ok(Some(self.cursor.curkey.clone()))
        } else {
            self.iter_end();
            Ok(None)
        }
    }

    // prev must equal the key most recently returned by first_key/next_key.
    pub fn next_key(&mut self, prev: &[u8]) -> Result<Option<Vec<u8>>> {
        assert!(
            self.cursor.end != 0 && self.cursor.curkey == prev,
            "next_key called without a matching prior first_key/next_key"
        );

        self.advance_cursor()?;

        if self.cursor.curpos < self.cursor.end {
            self.load_curkey()?;
            return Ok(Some(self.cursor.curkey.clone()));
        }

        // Keys exhausted: rewind and switch to the draining phase so a
        // subsequent key-then-value pass answers `fetch` from the cursor.
        self.cursor.curpos = HEADER_SIZE as u32;
        self.cursor.fetch_advance = true;
        if self.cursor.curpos < self.cursor.end {
            self.load_curkey()?;
        } else {
            self.cursor.curkey.clear();
        }
        Ok(None)
    }

    pub fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.cursor.end != 0 && self.cursor.curkey[..] == *key {
            trace!("fetch: answering {:?} from iterator cursor", key);
            let value = self.value_at_cursor()?;

            if self.cursor.fetch_advance {
                self.advance_cursor()?;
                if self.cursor.curpos < self.cursor.end {
                    self.load_curkey()?;
                } else {
                    self.iter_end();
                }
            }

            return Ok(Some(value));
        }

        self.find(key)
    }

    pub fn iter(&mut self) -> Iter {
        Iter {
            reader: self,
            started: false,
            prev_key: Vec::new(),
            done: false,
        }
    }
}

pub struct Iter<'a> {
    reader: &'a mut Reader,
    started: bool,
    prev_key: Vec<u8>,
    done: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let key = if !self.started {
            self.started = true;
            self.reader.first_key()
        } else {
            let prev = ::std::mem::replace(&mut self.prev_key, Vec::new());
            self.reader.next_key(&prev)
        };

        let key = match key {
            Ok(k) => k,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        match key {
            None => {
                self.done = true;
                None
            }
            Some(key) => match self.reader.value_at_cursor() {
                Ok(value) => {
                    self.prev_key = key.clone();
                    Some(Ok((key, value)))
                }
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            },
        }
    }
}
