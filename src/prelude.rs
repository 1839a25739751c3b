pub use crate::*;
pub use anyhow::{Result as R, anyhow};
pub use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
pub use log::{debug, info, warn};
pub use rayon::prelude::*;
pub use std::io::{Cursor, Read, Seek, SeekFrom, Write};
