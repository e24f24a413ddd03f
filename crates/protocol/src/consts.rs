//! Protocol constants shared by both stream directions.

/// Magic bytes opening every archive stream.
pub const HEADER: &[u8; 12] = b"ParallelPack";

/// Current stream version. Readers reject every other value.
pub const VERSION: u32 = 3;

/// Chunk size used when streaming file payloads.
pub const BUFFER_SIZE: usize = 4096;

/// Default TCP port for both the outbound packer and the listening unpacker.
pub const DEFAULT_PORT: u16 = 10000;

/// Largest payload a single data frame may carry (`i16::MAX`).
pub const MAX_DATA_CHUNK: usize = i16::MAX as usize;

/// Number of remembered prefix slots in the path codec.
pub const PATH_SLOTS: usize = 64;

/// Slot reserved for symlink targets; entry paths use slots `0..=62`.
pub const SYMLINK_TARGET_SLOT: u8 = 63;
