pub use crate::*;
pub use anyhow::{Result as R, anyhow};
pub use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
pub use memmap2::MmapOptions;
pub use std::io::{Cursor, Read, Seek, SeekFrom, Write};
pub use std::path::{Path, PathBuf};
