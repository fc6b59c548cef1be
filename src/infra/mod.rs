pub mod fs_storage;
pub mod in_memory;
pub mod sqlite_store;
