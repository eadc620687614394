use super::block_device::BlockDevice;
use super::chain_table::ChainTable;
use super::disk_blocks::InodeRecord;
use crate::utils::units_for_length;
use crate::{ChainFSError, ChainFSErrorConvertible, SectorSerializable};
use alloc::{vec, vec::Vec};

macro_rules! unwrap_error_chainfs_convertible {
    ($v:expr) => {
        match $v {
            Ok(val) => val,
            Err(e) => return Err(e.into_chainfs_error()),
        }
    };
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// An opaque handle to an open in-memory inode, keyed by the inode's root
/// sector. Every open of the same root sector yields handles that compare
/// equal.
pub struct InodeHandle {
    sector: u64,
}

impl InodeHandle {
    /// The root sector number identifying this inode.
    #[inline]
    pub fn inumber(&self) -> u64 {
        return self.sector;
    }
}

/// A live in-memory inode. One instance exists per open root sector no matter
/// how many handles point at it.
struct Inode {
    /// Sector holding this inode's record. Distinct from the data chain head.
    sector: u64,
    /// Number of live handles.
    open_count: u64,
    /// While above zero, every write returns zero bytes transferred.
    deny_write_count: u64,
    /// Set once by `remove`; the inode is deleted at its last close.
    removed: bool,
    /// Cached copy of the on-device record.
    record: InodeRecord,
}

/// The registry of open inodes, bound to a block device and the chain table
/// that allocates file extents. The surrounding filesystem is expected to
/// serialize all calls.
pub struct InodeTable<'a, 'b, E: ChainFSErrorConvertible> {
    device: &'a mut dyn BlockDevice<E>,
    chains: &'b mut dyn ChainTable,

    sector_size: u64,

    // Open inodes, unique by root sector.
    open_inodes: Vec<Inode>,
}

impl<'a, 'b, E: ChainFSErrorConvertible> InodeTable<'a, 'b, E> {
    /// Binds a table to a device and a chain table. Refuses a device whose
    /// sector size a record would not fill exactly.
    pub fn new(
        device: &'a mut dyn BlockDevice<E>,
        chains: &'b mut dyn ChainTable,
    ) -> Result<Self, ChainFSError<E>> {
        let sector_size = device.sector_size();

        if sector_size != InodeRecord::size() {
            return Err(ChainFSError::InvalidSectorSize);
        }

        return Ok(Self {
            device,
            chains,
            sector_size,
            open_inodes: Vec::new(),
        });
    }

    /// Initializes a file of `length` bytes and writes its record to `sector`.
    /// The data chain always holds at least one unit, so a zero-length file
    /// still owns storage. A copy of the record is returned but the authoritative
    /// copy lives on the device. On allocation failure nothing is left behind.
    pub fn create(&mut self, sector: u64, length: i64) -> Result<InodeRecord, ChainFSError<E>> {
        assert!(length >= 0);

        let unit_bytes = self.unit_bytes();
        let units = units_for_length(length, unit_bytes);

        let first = match self.chains.allocate_chain() {
            Some(unit) => unit,
            None => return Err(ChainFSError::NotEnoughFreeUnits),
        };
        self.zero_fill_unit(first)?;

        let mut tail = first;
        for allocated in 1..units {
            match self.chains.extend_chain(tail) {
                Some(unit) => {
                    self.zero_fill_unit(unit)?;
                    tail = unit;
                }
                None => {
                    self.chains.free_chain(first, allocated as u64);
                    return Err(ChainFSError::NotEnoughFreeUnits);
                }
            }
        }

        let record = InodeRecord::new(self.chains.unit_to_sector(first), length);
        unwrap_error_chainfs_convertible!(self
            .device
            .write_sector(sector, &record.to_bytes().to_vec()));

        return Ok(record);
    }

    /// Opens the inode whose record lives at `sector`. Opening an already open
    /// root sector returns the same in-memory inode with its open count
    /// incremented.
    pub fn open(&mut self, sector: u64) -> Result<InodeHandle, ChainFSError<E>> {
        for inode in self.open_inodes.iter_mut() {
            if inode.sector == sector {
                inode.open_count += 1;
                return Ok(InodeHandle { sector });
            }
        }

        let bytes = self.read_sector_checked(sector)?;
        let record = match InodeRecord::from_bytes(&bytes) {
            Some(record) => record,
            None => return Err(ChainFSError::CorruptedInodeRecord),
        };

        self.open_inodes.push(Inode {
            sector,
            open_count: 1,
            deny_write_count: 0,
            removed: false,
            record,
        });

        return Ok(InodeHandle { sector });
    }

    /// Takes another handle to an open inode. No device access.
    pub fn reopen(&mut self, handle: InodeHandle) -> InodeHandle {
        let index = self.expect_index(handle);
        self.open_inodes[index].open_count += 1;
        return handle;
    }

    /// Drops one handle. The last close flushes the record to the device,
    /// unregisters the inode and, if it was removed, releases the data chain
    /// and then the record's own sector back to the chain table. Closing a
    /// handle that is not open is a no-op.
    pub fn close(&mut self, handle: InodeHandle) -> Result<(), ChainFSError<E>> {
        let index = match self.index_of(handle) {
            Some(index) => index,
            None => return Ok(()),
        };

        self.open_inodes[index].open_count -= 1;

        if self.open_inodes[index].open_count == 0 {
            let inode = self.open_inodes.remove(index);

            unwrap_error_chainfs_convertible!(self
                .device
                .write_sector(inode.sector, &inode.record.to_bytes().to_vec()));

            if inode.removed {
                let data_units = units_for_length(inode.record.length(), self.unit_bytes());
                let data_head = self.chains.sector_to_unit(inode.record.root_block());
                self.chains.free_chain(data_head, data_units as u64);

                let record_unit = self.chains.sector_to_unit(inode.sector);
                self.chains.free_chain(record_unit, 1);
            }
        }

        return Ok(());
    }

    /// Marks the inode to be deleted when the last handle to it is closed.
    /// Until then the file stays readable and writable through every open
    /// handle.
    pub fn remove(&mut self, handle: InodeHandle) {
        let index = self.expect_index(handle);
        self.open_inodes[index].removed = true;
    }

    /// Reads up to `size` bytes starting at byte `offset`. The returned vector
    /// is shorter than `size` when the end of the file is reached first; that
    /// is not an error.
    pub fn read(
        &self,
        handle: InodeHandle,
        size: i64,
        offset: i64,
    ) -> Result<Vec<u8>, ChainFSError<E>> {
        let index = self.expect_index(handle);
        assert!(offset >= 0);

        let sector_size = self.sector_size as i64;
        let mut result = Vec::new();
        let mut size = size;
        let mut offset = offset;

        while size > 0 {
            // Starting byte offset within the sector.
            let sector_ofs = offset % sector_size;

            // The chunk is bounded by the bytes left in the file and the
            // bytes left in the sector.
            let inode_left = self.open_inodes[index].record.length() - offset;
            let sector_left = sector_size - sector_ofs;
            let min_left = if inode_left < sector_left {
                inode_left
            } else {
                sector_left
            };

            let chunk = if size < min_left { size } else { min_left };
            if chunk <= 0 {
                break;
            }

            let sector = match self.sector_for_offset(&self.open_inodes[index].record, offset) {
                Some(sector) => sector,
                None => break,
            };

            let mut content = self.read_sector_checked(sector)?;

            if sector_ofs == 0 && chunk == sector_size {
                // Full aligned sector, handed over without trimming.
                result.append(&mut content);
            } else {
                result.extend_from_slice(
                    &content[sector_ofs as usize..(sector_ofs + chunk) as usize],
                );
            }

            size -= chunk;
            offset += chunk;
        }

        return Ok(result);
    }

    /// Writes `buffer` starting at byte `offset`, growing the file when the
    /// write lands past its end. Returns the number of bytes written, which is
    /// 0 while writes are denied and falls short of the buffer only when the
    /// chain table could not supply the growth.
    pub fn write(
        &mut self,
        handle: InodeHandle,
        buffer: &[u8],
        offset: i64,
    ) -> Result<i64, ChainFSError<E>> {
        let index = self.expect_index(handle);
        assert!(offset >= 0);

        if self.open_inodes[index].deny_write_count > 0 {
            return Ok(0);
        }

        let mut size = buffer.len() as i64;
        let mut offset = offset;

        if offset + size > self.open_inodes[index].record.length() {
            // On a failed growth the length was rolled back to the committed
            // storage and the loop below stops there.
            self.grow(index, offset + size)?;
        }

        let sector_size = self.sector_size as i64;
        let mut bytes_written: i64 = 0;

        while size > 0 {
            let sector_ofs = offset % sector_size;

            let inode_left = self.open_inodes[index].record.length() - offset;
            let sector_left = sector_size - sector_ofs;
            let min_left = if inode_left < sector_left {
                inode_left
            } else {
                sector_left
            };

            let chunk = if size < min_left { size } else { min_left };
            if chunk <= 0 {
                break;
            }

            let sector = match self.sector_for_offset(&self.open_inodes[index].record, offset) {
                Some(sector) => sector,
                None => break,
            };

            if sector_ofs == 0 && chunk == sector_size {
                // Full aligned sector, straight from the caller's buffer.
                unwrap_error_chainfs_convertible!(self.device.write_sector(
                    sector,
                    &buffer[bytes_written as usize..(bytes_written + chunk) as usize].to_vec()
                ));
            } else {
                // The device only moves whole sectors. If the sector holds
                // data outside the chunk, read it in first, otherwise start
                // from zeros.
                let mut bounce = if sector_ofs > 0 || chunk < sector_left {
                    self.read_sector_checked(sector)?
                } else {
                    vec![0u8; sector_size as usize]
                };

                bounce[sector_ofs as usize..(sector_ofs + chunk) as usize].copy_from_slice(
                    &buffer[bytes_written as usize..(bytes_written + chunk) as usize],
                );
                unwrap_error_chainfs_convertible!(self.device.write_sector(sector, &bounce));
            }

            size -= chunk;
            offset += chunk;
            bytes_written += chunk;
        }

        return Ok(bytes_written);
    }

    /// Forbids writes to the inode. May be called at most once per live
    /// handle; a count above the open count is a caller bug.
    pub fn deny_write(&mut self, handle: InodeHandle) {
        let index = self.expect_index(handle);
        let inode = &mut self.open_inodes[index];

        inode.deny_write_count += 1;
        assert!(inode.deny_write_count <= inode.open_count);
    }

    /// Re-permits writes to the inode. Must be called exactly once by each
    /// handle that denied writes, before that handle closes.
    pub fn allow_write(&mut self, handle: InodeHandle) {
        let index = self.expect_index(handle);
        let inode = &mut self.open_inodes[index];

        assert!(inode.deny_write_count > 0);
        assert!(inode.deny_write_count <= inode.open_count);
        inode.deny_write_count -= 1;
    }

    /// The length of the file in bytes.
    pub fn length(&self, handle: InodeHandle) -> i64 {
        let index = self.expect_index(handle);
        return self.open_inodes[index].record.length();
    }

    /// How many inodes are currently registered.
    pub fn open_inode_count(&self) -> usize {
        return self.open_inodes.len();
    }

    /// Extends the file to `new_length` bytes, one unit at a time from the
    /// chain tail, zero-filling every new sector before it becomes reachable.
    /// The length is updated ahead of the allocation; if the chain table runs
    /// dry it is rolled back to cover exactly the units that were committed
    /// and `Ok(false)` is returned. Growth never shrinks a file.
    fn grow(&mut self, index: usize, new_length: i64) -> Result<bool, ChainFSError<E>> {
        let original_length = self.open_inodes[index].record.length();
        assert!(new_length >= original_length);

        let unit_bytes = self.unit_bytes();
        let current_units = units_for_length(original_length, unit_bytes);
        let needed_units = units_for_length(new_length, unit_bytes) - current_units;

        self.open_inodes[index].record.set_length(new_length);

        if needed_units <= 0 {
            // The tail unit's slack is already zero-filled.
            return Ok(true);
        }

        let mut tail = self.tail_unit(self.open_inodes[index].record.root_block());

        let mut grown_units = 0;
        while grown_units < needed_units {
            let unit = match self.chains.extend_chain(tail) {
                Some(unit) => unit,
                None => {
                    let committed = (current_units + grown_units) * unit_bytes;
                    self.open_inodes[index].record.set_length(committed);
                    return Ok(false);
                }
            };

            self.zero_fill_unit(unit)?;
            tail = unit;
            grown_units += 1;
        }

        return Ok(true);
    }

    /// The device sector containing byte `pos` of the file, `None` when the
    /// file holds no data at that offset. Walks the chain from its head, so
    /// the cost is linear in the unit index.
    fn sector_for_offset(&self, record: &InodeRecord, pos: i64) -> Option<u64> {
        if pos > record.length() {
            return None;
        }

        let unit_bytes = self.unit_bytes();
        let nth_unit = pos / unit_bytes;

        let mut unit = self.chains.sector_to_unit(record.root_block());
        for _ in 0..nth_unit {
            unit = match self.chains.next_in_chain(unit) {
                Some(next) => next,
                None => return None,
            };
        }

        // Offset within the unit.
        let unit_ofs = pos - nth_unit * unit_bytes;

        return Some(self.chains.unit_to_sector(unit) + (unit_ofs / self.sector_size as i64) as u64);
    }

    /// The terminal unit of the data chain headed at `root_block`.
    fn tail_unit(&self, root_block: u64) -> u64 {
        let mut unit = self.chains.sector_to_unit(root_block);

        loop {
            match self.chains.next_in_chain(unit) {
                Some(next) => unit = next,
                None => return unit,
            }
        }
    }

    fn zero_fill_unit(&mut self, unit: u64) -> Result<(), ChainFSError<E>> {
        let base = self.chains.unit_to_sector(unit);
        let zeros = vec![0u8; self.sector_size as usize];

        for i in 0..self.chains.sectors_per_unit() {
            unwrap_error_chainfs_convertible!(self.device.write_sector(base + i, &zeros));
        }

        return Ok(());
    }

    fn read_sector_checked(&self, sector: u64) -> Result<Vec<u8>, ChainFSError<E>> {
        let bytes = unwrap_error_chainfs_convertible!(self.device.read_sector(sector));

        if bytes.len() as u64 != self.sector_size {
            return Err(ChainFSError::ShortSectorRead);
        }

        return Ok(bytes);
    }

    fn unit_bytes(&self) -> i64 {
        return (self.sector_size * self.chains.sectors_per_unit()) as i64;
    }

    fn index_of(&self, handle: InodeHandle) -> Option<usize> {
        for (i, inode) in self.open_inodes.iter().enumerate() {
            if inode.sector == handle.sector {
                return Some(i);
            }
        }

        return None;
    }

    fn expect_index(&self, handle: InodeHandle) -> usize {
        return match self.index_of(handle) {
            Some(index) => index,
            None => panic!("inode handle is not open"),
        };
    }
}
