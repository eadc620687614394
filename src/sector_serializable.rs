use crate::disk::SECTOR_SIZE;

/// Persisted structures occupy exactly one device sector, so their byte
/// representation is a fixed sector-sized array.
pub trait SectorSerializable {
    fn to_bytes(&self) -> [u8; SECTOR_SIZE as usize];
    fn from_bytes(bytes: &[u8]) -> Option<Self>
    where
        Self: core::marker::Sized;
}
