pub mod block_reader;
#[cfg(all(feature = "std", unix))]
pub mod file_device;
pub mod mem_device;
