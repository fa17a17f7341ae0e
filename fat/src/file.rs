// File handles over a cluster chain. Reads stop at the directory
// entry's file size regardless of cluster slack; writes extend the chain
// on demand and zero-fill holes left by seeks past the end. The
// directory entry (size, write time, start cluster) is rewritten on
// flush and close.

use std::io::{self, Read, Seek, SeekFrom, Write};

use log::trace;

use ffs_core::{BlockDevice, FfsError};

use crate::chain::ClusterChain;
use crate::dir_cluster::{DirLocation, DirSlot, DirectoryCluster, ShortDirEntry};
use crate::filesystem::FileSystem;
use crate::timestamps;

const ZERO_FILL_CHUNK: usize = 4096;

pub struct File<'fs, B: BlockDevice> {
    fs: &'fs FileSystem<B>,
    chain: ClusterChain,
    dir_location: DirLocation,
    slot_index: usize,
    size: u32,
    pos: u64,
    entry_dirty: bool,
    closed: bool,
}

impl<'fs, B: BlockDevice> File<'fs, B> {
    pub(crate) fn new(
        fs: &'fs FileSystem<B>,
        dir_location: DirLocation,
        slot_index: usize,
        entry: ShortDirEntry,
    ) -> File<'fs, B> {
        File {
            fs,
            chain: ClusterChain::new(entry.first_cluster()),
            dir_location,
            slot_index,
            size: entry.file_size,
            pos: 0,
            entry_dirty: false,
            closed: false,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    fn check_open(&self) -> Result<(), FfsError> {
        if self.closed {
            return Err(FfsError::Io(io::Error::other("file handle is closed")));
        }
        Ok(())
    }

    /// Read at the current position, bounded by the file size.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FfsError> {
        self.check_open()?;
        if self.pos >= self.size as u64 || buf.is_empty() {
            return Ok(0);
        }
        let wanted = (buf.len() as u64).min(self.size as u64 - self.pos) as usize;

        let chain = &mut self.chain;
        let pos = self.pos;
        let layout = self.fs.layout();
        let n = self.fs.with_state(|state| {
            chain.read_at(&mut state.device, &state.fat, layout, pos, &mut buf[..wanted])
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Write at the current position, extending the chain and the file
    /// size as needed. The FAT is flushed before returning; the directory
    /// entry follows on the next `flush` or `close`.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FfsError> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let end = self
            .pos
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= u32::MAX as u64)
            .ok_or(FfsError::NoSpace)?;

        let chain = &mut self.chain;
        let pos = self.pos;
        let size = self.size as u64;
        let layout = self.fs.layout();
        self.fs.with_state(|state| {
            // A file created elsewhere may own no clusters yet
            if chain.start() < 2 {
                let head = state.fat.alloc_chain()?;
                chain.set_start(head);
            }

            let result = (|| {
                // Zero-fill the gap a seek past the end left behind
                if pos > size {
                    let zeros = [0u8; ZERO_FILL_CHUNK];
                    let mut fill_at = size;
                    while fill_at < pos {
                        let n = ((pos - fill_at) as usize).min(ZERO_FILL_CHUNK);
                        chain.write_at(
                            &mut state.device,
                            &mut state.fat,
                            layout,
                            fill_at,
                            &zeros[..n],
                        )?;
                        fill_at += n as u64;
                    }
                }
                chain.write_at(&mut state.device, &mut state.fat, layout, pos, buf)
            })();

            // Flush allocations even on a partial failure: a leaked
            // cluster is tolerable, a stale FAT mirror is not
            if state.fat.is_dirty() {
                state.fat.write_to_device(&mut state.device, layout)?;
            }
            result
        })?;

        self.pos = end;
        if end > self.size as u64 {
            self.size = end as u32;
            self.entry_dirty = true;
        }
        trace!("wrote {} bytes, size now {}", buf.len(), self.size);
        Ok(buf.len())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FfsError> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.size as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(FfsError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the file",
            ))),
        }
    }

    /// Resize the file. Shrinking frees suffix clusters (the head cluster
    /// is retained); growing zero-fills. Both the FAT and the directory
    /// entry are persisted before returning.
    pub fn truncate(&mut self, size: u64) -> Result<(), FfsError> {
        self.check_open()?;
        if size > u32::MAX as u64 {
            return Err(FfsError::NoSpace);
        }

        if size < self.size as u64 {
            let layout = self.fs.layout();
            let chain = &mut self.chain;
            let keep = (size.div_ceil(layout.cluster_bytes as u64) as u32).max(1);
            self.fs.with_state(|state| {
                chain.truncate(&mut state.fat, keep)?;
                state.fat.write_to_device(&mut state.device, layout)?;
                Ok(())
            })?;
            self.size = size as u32;
            self.entry_dirty = true;
            self.write_entry()?;
        } else if size > self.size as u64 {
            // Writing the last byte zero-fills everything before it
            let saved = self.pos;
            self.pos = size - 1;
            self.write(&[0u8])?;
            self.pos = saved;
            self.write_entry()?;
        }
        Ok(())
    }

    /// Rewrite this file's directory entry if size or times changed.
    pub fn flush(&mut self) -> Result<(), FfsError> {
        self.check_open()?;
        if self.entry_dirty {
            self.write_entry()?;
        }
        Ok(())
    }

    /// Flush and invalidate the handle. Idempotent.
    pub fn close(&mut self) -> Result<(), FfsError> {
        if self.closed {
            return Ok(());
        }
        if self.entry_dirty {
            self.write_entry()?;
        }
        self.closed = true;
        Ok(())
    }

    fn write_entry(&mut self) -> Result<(), FfsError> {
        let layout = self.fs.layout();
        let dir_location = self.dir_location;
        let slot_index = self.slot_index;
        let size = self.size;
        let start = self.chain.start();
        self.fs.with_state(|state| {
            let mut cluster =
                DirectoryCluster::read(&mut state.device, &state.fat, layout, dir_location)?;
            let slot = cluster.slots.get_mut(slot_index).ok_or_else(|| {
                FfsError::MalformedImage("directory slot vanished".to_string())
            })?;
            let DirSlot::Short(entry) = slot else {
                return Err(FfsError::MalformedImage(
                    "directory slot changed type".to_string(),
                ));
            };
            entry.file_size = size;
            entry.set_first_cluster(start);
            entry.touch_write(timestamps::now());
            cluster.write(&mut state.device, &mut state.fat, layout)
        })?;
        self.entry_dirty = false;
        Ok(())
    }
}

impl<B: BlockDevice> Drop for File<'_, B> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl<B: BlockDevice> Read for File<'_, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(io::Error::from)
    }
}

impl<B: BlockDevice> Write for File<'_, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        File::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        File::flush(self).map_err(io::Error::from)
    }
}

impl<B: BlockDevice> Seek for File<'_, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        File::seek(self, pos).map_err(io::Error::from)
    }
}
