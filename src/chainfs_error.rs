use core::fmt::{Debug, Display};

macro_rules! enum_variant_stringify {
    ($self:expr, [$($var:ident),+]) => {
        match $self {
            $(
               $var => stringify!($var),
            )+
            _ => "",
        }
    }
}

pub trait ChainFSErrorConvertible: Debug {
    /// If this is an internal error this will succeed otherwise by default it will return None.
    fn into_chainfs_error(self) -> ChainFSError<Self>
    where
        Self: Sized,
    {
        return ChainFSError::DiskError(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFSError<E> {
    InvalidSectorSize,
    NotEnoughFreeUnits,
    CorruptedInodeRecord,
    ShortSectorRead,
    DiskError(E),
}

impl<E: Display> core::fmt::Display for ChainFSError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use ChainFSError::*;

        match self {
            DiskError(e) => write!(f, "Disk error: {}", e),
            _ => write!(
                f,
                "{}",
                enum_variant_stringify!(
                    self,
                    [
                        InvalidSectorSize,
                        NotEnoughFreeUnits,
                        CorruptedInodeRecord,
                        ShortSectorRead
                    ]
                )
            ),
        }
    }
}
