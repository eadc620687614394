use crate::ChainFSErrorConvertible;
use alloc::vec::Vec;

/// Size of one device sector in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Implementors can define an error struct if they wish but they must implement
/// methods to read and write whole sectors of a physical disk or image file.
/// Sectors are addressed by sector number, not by byte.
pub trait BlockDevice<E: ChainFSErrorConvertible> {
    /// Read one whole sector. The returned vector must be exactly
    /// `sector_size` bytes long, otherwise the calling function will return an
    /// error.
    fn read_sector(&self, sector: u64) -> Result<Vec<u8>, E>;

    /// Write one whole sector. `bytes` is always exactly `sector_size` bytes.
    fn write_sector(&mut self, sector: u64, bytes: &Vec<u8>) -> Result<(), E>;

    /// This should return the fixed sector size of the device.
    fn sector_size(&self) -> u64;
}
