mod inode;

pub use inode::InodeRecord;
