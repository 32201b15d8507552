pub mod delimiter;
pub mod record;

pub const DEFAULT_IO_READER_BUFSIZE: usize = 1 << 16;
pub const DEFAULT_IO_WRITER_BUFSIZE: usize = 1 << 16;
