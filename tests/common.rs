extern crate chainfs;
use chainfs::{BlockDevice, ChainFSErrorConvertible, ChainTable, SECTOR_SIZE};

#[derive(Debug)]
pub struct Error {}

impl ChainFSErrorConvertible for Error {}

/// An in-memory sector device.
pub struct Handler {
    pub disk: Vec<u8>,
}

impl Handler {
    pub fn new(num_sectors: usize) -> Self {
        return Self {
            disk: vec![0u8; num_sectors * SECTOR_SIZE as usize],
        };
    }

    pub fn dump_disk(&self) -> Vec<u8> {
        return self.disk.clone();
    }

    pub fn sector(&self, sector: u64) -> Vec<u8> {
        let start = sector as usize * SECTOR_SIZE as usize;
        return self.disk[start..start + SECTOR_SIZE as usize].to_vec();
    }
}

impl BlockDevice<Error> for Handler {
    fn read_sector(&self, sector: u64) -> Result<Vec<u8>, Error> {
        let start = sector as usize * SECTOR_SIZE as usize;
        return Ok(self.disk[start..start + SECTOR_SIZE as usize].to_vec());
    }

    fn write_sector(&mut self, sector: u64, bytes: &Vec<u8>) -> Result<(), Error> {
        let start = sector as usize * SECTOR_SIZE as usize;

        for (i, byte) in bytes.iter().enumerate() {
            self.disk[start + i] = *byte;
        }

        return Ok(());
    }

    fn sector_size(&self) -> u64 {
        return SECTOR_SIZE;
    }
}

/// An in-memory chained-allocation table. The first `reserved_units` units are
/// a metadata region that is never handed out to data chains; inode records
/// live in its sectors.
pub struct Fat {
    next: Vec<Option<u64>>,
    used: Vec<bool>,
    reserved_units: u64,
    sectors_per_unit: u64,
}

impl Fat {
    pub fn new(total_units: u64, reserved_units: u64, sectors_per_unit: u64) -> Self {
        let mut used = vec![false; total_units as usize];

        for i in 0..reserved_units as usize {
            used[i] = true;
        }

        return Self {
            next: vec![None; total_units as usize],
            used,
            reserved_units,
            sectors_per_unit,
        };
    }

    /// Unused units outside the reserved metadata region.
    pub fn free_units(&self) -> usize {
        let mut count = 0;

        for i in self.reserved_units as usize..self.used.len() {
            if !self.used[i] {
                count += 1;
            }
        }

        return count;
    }

    pub fn unit_is_used(&self, unit: u64) -> bool {
        return self.used[unit as usize];
    }

    fn take_free_unit(&mut self) -> Option<u64> {
        for i in self.reserved_units as usize..self.used.len() {
            if !self.used[i] {
                self.used[i] = true;
                self.next[i] = None;
                return Some(i as u64);
            }
        }

        return None;
    }
}

impl ChainTable for Fat {
    fn allocate_chain(&mut self) -> Option<u64> {
        return self.take_free_unit();
    }

    fn extend_chain(&mut self, tail: u64) -> Option<u64> {
        let unit = match self.take_free_unit() {
            Some(unit) => unit,
            None => return None,
        };

        self.next[tail as usize] = Some(unit);
        return Some(unit);
    }

    fn next_in_chain(&self, unit: u64) -> Option<u64> {
        return self.next[unit as usize];
    }

    fn free_chain(&mut self, start: u64, _min_units: u64) {
        let mut current = Some(start);

        while let Some(unit) = current {
            current = self.next[unit as usize];
            self.next[unit as usize] = None;
            self.used[unit as usize] = false;
        }
    }

    fn unit_to_sector(&self, unit: u64) -> u64 {
        return unit * self.sectors_per_unit;
    }

    fn sector_to_unit(&self, sector: u64) -> u64 {
        return sector / self.sectors_per_unit;
    }

    fn sectors_per_unit(&self) -> u64 {
        return self.sectors_per_unit;
    }
}
