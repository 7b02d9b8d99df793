pub mod image_io;
pub mod exr_source;
pub mod exr_sink;

#[cfg(test)]
pub mod memory;
