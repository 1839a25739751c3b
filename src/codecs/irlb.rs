use super::float16::{decode_samples, encode_samples};
use super::{AudioBuffer, Decoded, Header, IndexEntry, IrRecord};
use crate::prelude::*;
use std::io::ErrorKind;

// Chunk Identifiers
const FILE_MAGIC: &[u8; 4] = b"IRLB";
const INDEX_CHUNK_ID: &[u8; 4] = b"INDX";
const IR_CHUNK_ID: &[u8; 4] = b"IR--";
const META_CHUNK_ID: &[u8; 4] = b"META";
const AUDIO_CHUNK_ID: &[u8; 4] = b"AUDI";

// Chunk Structures
const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: u64 = 18; // magic + version + count + index offset
const CHUNK_HEADER_SIZE: usize = 12; // id + u64 size
const SUB_CHUNK_HEADER_SIZE: u64 = 8; // id + u32 size

pub struct IrlbCodec;

impl Codec for IrlbCodec {
    fn file_extension(&self) -> &'static str {
        "irlib"
    }

    fn validate_file_format(&self, data: &[u8]) -> R<()> {
        if data.len() < HEADER_SIZE as usize {
            return Err(anyhow!("File too small to be a valid IR library"));
        }
        if &data[0..4] != FILE_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&data[0..4]);
            return Err(FormatError::BadMagic(found).into());
        }
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> R<Decoded> {
        self.validate_file_format(input)?;
        Ok(self.read_from(&mut Cursor::new(input))?)
    }

    fn encode(&self, records: &[IrRecord]) -> R<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(records, &mut out)?;
        Ok(out)
    }
}

impl IrlbCodec {
    /// Read every record listed in the index, in index order.
    ///
    /// Damaged records are logged and collected in [`Decoded::skipped`];
    /// only structural problems with the header or index fail the read.
    pub fn read_from<Rd: Read + Seek>(&self, reader: &mut Rd) -> Result<Decoded, FormatError> {
        reader.seek(SeekFrom::Start(0))?;
        let header = read_header(reader)?;
        debug!(
            "IRLB version={} record_count={} index_offset={}",
            header.version, header.record_count, header.index_offset
        );

        let entries = read_index(reader, header.index_offset)?;
        if entries.len() != header.record_count as usize {
            debug!(
                "Header announces {} records, index lists {}",
                header.record_count,
                entries.len()
            );
        }

        let mut records = Vec::with_capacity(entries.len());
        let mut skipped = Vec::new();

        for entry in &entries {
            match read_record(reader, entry) {
                Ok(record) => {
                    info!(
                        "Loaded: {:30} {:>6} Hz  {}ch  {} frames",
                        format!("{:?}", record.name),
                        record.sample_rate().round(),
                        record.channels(),
                        record.frames()
                    );
                    records.push(record);
                }
                Err(ChunkError::Record(error)) => {
                    warn!("{}, skipping", error);
                    skipped.push(error);
                }
                Err(ChunkError::Format(error)) => return Err(error),
            }
        }

        Ok(Decoded {
            header,
            entries,
            records,
            skipped,
        })
    }

    /// Write a complete container: header, record chunks, then the index.
    ///
    /// Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, records: &[IrRecord], writer: &mut W) -> Result<u64, FormatError> {
        // Chunk lengths have to be final before any offset is known
        let chunks = records
            .iter()
            .map(encode_ir_chunk)
            .collect::<Result<Vec<_>, _>>()?;

        let mut offsets = Vec::with_capacity(chunks.len());
        let mut pos = HEADER_SIZE;
        for chunk in &chunks {
            offsets.push(pos);
            pos += chunk.len() as u64;
        }

        let index = encode_index(records, &offsets)?;
        let header = Header {
            version: FORMAT_VERSION,
            record_count: fit_u32(records.len(), "record count")?,
            index_offset: pos,
        };

        write_header(writer, &header)?;
        for chunk in &chunks {
            writer.write_all(chunk)?;
        }
        writer.write_all(&index)?;

        let total = pos + index.len() as u64;
        info!("Wrote {} IRs, {} bytes total", records.len(), total);
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

enum ChunkError {
    Record(RecordError),
    Format(FormatError),
}

impl From<RecordError> for ChunkError {
    fn from(error: RecordError) -> Self {
        ChunkError::Record(error)
    }
}

/// Maps an I/O error to the fatal error for the structure being read.
fn format_err(what: &'static str) -> impl Fn(std::io::Error) -> FormatError {
    move |e| match e.kind() {
        ErrorKind::UnexpectedEof => FormatError::Truncated(what),
        ErrorKind::InvalidData => FormatError::InvalidString(what),
        _ => FormatError::Io(e),
    }
}

fn read_str<Rd: Read>(reader: &mut Rd) -> std::io::Result<String> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
fn read_body<Rd: Read>(reader: &mut Rd, len: u64) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut body)?;
    if (body.len() as u64) < len {
        return Err(ErrorKind::UnexpectedEof.into());
    }
    Ok(body)
}

fn read_header<Rd: Read>(reader: &mut Rd) -> Result<Header, FormatError> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(format_err("file header"))?;
    if &magic != FILE_MAGIC {
        return Err(FormatError::BadMagic(magic));
    }

    let version = reader
        .read_u16::<LittleEndian>()
        .map_err(format_err("file header"))?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let record_count = reader
        .read_u32::<LittleEndian>()
        .map_err(format_err("file header"))?;
    let index_offset = reader
        .read_u64::<LittleEndian>()
        .map_err(format_err("file header"))?;

    Ok(Header {
        version,
        record_count,
        index_offset,
    })
}

fn read_index<Rd: Read + Seek>(reader: &mut Rd, index_offset: u64) -> Result<Vec<IndexEntry>, FormatError> {
    reader.seek(SeekFrom::Start(index_offset))?;

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(format_err("index chunk"))?;
    if &magic != INDEX_CHUNK_ID {
        return Err(FormatError::BadChunkMagic {
            expected: "INDX",
            found: magic,
            offset: index_offset,
        });
    }

    let body_len = reader
        .read_u64::<LittleEndian>()
        .map_err(format_err("index chunk"))?;
    let body = read_body(reader, body_len).map_err(format_err("index chunk"))?;

    // Entry count is implicit: parse until the body is used up
    let mut cursor = Cursor::new(body.as_slice());
    let mut entries = Vec::new();
    while cursor.position() < body.len() as u64 {
        entries.push(read_index_entry(&mut cursor).map_err(format_err("index entry"))?);
    }
    debug!("Found {} index entries", entries.len());

    Ok(entries)
}

fn read_index_entry<Rd: Read>(reader: &mut Rd) -> std::io::Result<IndexEntry> {
    Ok(IndexEntry {
        offset: reader.read_u64::<LittleEndian>()?,
        sample_rate: reader.read_f64::<LittleEndian>()?,
        channels: reader.read_u32::<LittleEndian>()?,
        frames: reader.read_u32::<LittleEndian>()?,
        name: read_str(reader)?,
        category: read_str(reader)?,
    })
}

fn read_record<Rd: Read + Seek>(reader: &mut Rd, entry: &IndexEntry) -> Result<IrRecord, ChunkError> {
    // Running out of data is local to this record; anything else is a real I/O failure
    let eof = |e: std::io::Error| match e.kind() {
        ErrorKind::UnexpectedEof => ChunkError::Record(RecordError::Truncated {
            name: entry.name.clone(),
            offset: entry.offset,
        }),
        _ => ChunkError::Format(FormatError::Io(e)),
    };

    reader.seek(SeekFrom::Start(entry.offset)).map_err(eof)?;

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(eof)?;
    if &magic != IR_CHUNK_ID {
        return Err(RecordError::BadMagic {
            name: entry.name.clone(),
            offset: entry.offset,
            found: magic,
        }
        .into());
    }

    let body_len = reader.read_u64::<LittleEndian>().map_err(eof)?;
    let body = read_body(reader, body_len).map_err(eof)?;

    Ok(parse_record_body(&body, entry)?)
}

/// META fields in on-disk order. A short META carries only a prefix of them.
#[derive(Debug, Default)]
struct Meta {
    sample_rate: Option<f64>,
    channels: Option<u32>,
    frames: Option<u32>,
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    tags: Option<Vec<String>>,
}

fn parse_record_body(body: &[u8], entry: &IndexEntry) -> Result<IrRecord, RecordError> {
    let truncated = || RecordError::Truncated {
        name: entry.name.clone(),
        offset: entry.offset,
    };

    let mut cursor = Cursor::new(body);
    let mut meta: Option<Meta> = None;
    let mut samples: Option<Vec<f32>> = None;

    // Sub-chunks may come in any order
    while body.len() as u64 - cursor.position() >= SUB_CHUNK_HEADER_SIZE {
        let mut chunk_id = [0u8; 4];
        cursor.read_exact(&mut chunk_id).map_err(|_| truncated())?;
        let chunk_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated())? as usize;

        let start = cursor.position() as usize;
        let data = start
            .checked_add(chunk_size)
            .and_then(|end| body.get(start..end))
            .ok_or_else(truncated)?;

        match &chunk_id {
            META_CHUNK_ID => {
                meta = Some(parse_meta(data, entry)?);
            }
            AUDIO_CHUNK_ID => {
                // Layout always comes from the index entry, whatever META says
                let decoded = decode_samples(data, entry.channels).ok_or_else(|| {
                    RecordError::AudioLayout {
                        name: entry.name.clone(),
                        channels: entry.channels,
                        bytes: data.len(),
                    }
                })?;
                samples = Some(decoded);
            }
            _ => {
                debug!(
                    "Skipping unknown sub-chunk {:?} ({} bytes) in {:?}",
                    String::from_utf8_lossy(&chunk_id),
                    chunk_size,
                    entry.name
                );
            }
        }

        cursor.set_position((start + chunk_size) as u64);
    }

    let (meta, samples) = match (meta, samples) {
        (Some(meta), Some(samples)) => (meta, samples),
        (meta, samples) => {
            return Err(RecordError::Incomplete {
                name: entry.name.clone(),
                has_meta: meta.is_some(),
                has_audio: samples.is_some(),
            });
        }
    };

    let channels = entry.channels;
    if let Some(meta_channels) = meta.channels {
        if meta_channels != channels {
            warn!(
                "{:?}: META lists {} channel(s), index lists {}; decoding with {}",
                entry.name, meta_channels, channels, channels
            );
        }
    }

    let frames = samples.len() / channels as usize;
    let expected_frames = meta.frames.unwrap_or(entry.frames) as usize;
    if frames != expected_frames {
        warn!(
            "{:?}: expected {} frames, AUDI holds {}",
            entry.name, expected_frames, frames
        );
    }

    Ok(IrRecord {
        name: meta.name.unwrap_or_else(|| entry.name.clone()),
        category: meta.category.unwrap_or_else(|| entry.category.clone()),
        description: meta.description.unwrap_or_default(),
        tags: meta.tags.unwrap_or_default(),
        audio: AudioBuffer {
            sample_rate: meta.sample_rate.unwrap_or(entry.sample_rate),
            channels,
            samples,
        },
    })
}

fn parse_meta(data: &[u8], entry: &IndexEntry) -> Result<Meta, RecordError> {
    let mut meta = Meta::default();
    match read_meta_fields(&mut Cursor::new(data), &mut meta) {
        Ok(()) => Ok(meta),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            debug!(
                "Short META in {:?}; index entry fills the missing fields",
                entry.name
            );
            Ok(meta)
        }
        Err(_) => Err(RecordError::InvalidString {
            name: entry.name.clone(),
        }),
    }
}

fn read_meta_fields<Rd: Read>(reader: &mut Rd, meta: &mut Meta) -> std::io::Result<()> {
    meta.sample_rate = Some(reader.read_f64::<LittleEndian>()?);
    meta.channels = Some(reader.read_u32::<LittleEndian>()?);
    meta.frames = Some(reader.read_u32::<LittleEndian>()?);
    meta.name = Some(read_str(reader)?);
    meta.description = Some(read_str(reader)?);
    meta.category = Some(read_str(reader)?);

    let tag_count = reader.read_u16::<LittleEndian>()?;
    let mut tags = Vec::with_capacity(tag_count as usize);
    for _ in 0..tag_count {
        tags.push(read_str(reader)?);
    }
    meta.tags = Some(tags);

    Ok(())
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

fn fit_u32(value: usize, field: &'static str) -> Result<u32, FormatError> {
    u32::try_from(value).map_err(|_| FormatError::FieldTooLarge {
        field,
        value: value as u64,
        max: u32::MAX as u64,
    })
}

fn fit_u16(value: usize, field: &'static str) -> Result<u16, FormatError> {
    u16::try_from(value).map_err(|_| FormatError::FieldTooLarge {
        field,
        value: value as u64,
        max: u16::MAX as u64,
    })
}

fn write_str<W: Write>(writer: &mut W, value: &str, field: &'static str) -> Result<(), FormatError> {
    let bytes = value.as_bytes();
    writer.write_u16::<LittleEndian>(fit_u16(bytes.len(), field)?)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn write_chunk<W: Write>(writer: &mut W, id: &[u8; 4], data: &[u8]) -> Result<(), FormatError> {
    writer.write_all(id)?;
    writer.write_u32::<LittleEndian>(fit_u32(data.len(), "sub-chunk length")?)?;
    writer.write_all(data)?;
    Ok(())
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), FormatError> {
    writer.write_all(FILE_MAGIC)?;
    writer.write_u16::<LittleEndian>(header.version)?;
    writer.write_u32::<LittleEndian>(header.record_count)?;
    writer.write_u64::<LittleEndian>(header.index_offset)?;
    Ok(())
}

fn encode_meta(record: &IrRecord) -> Result<Vec<u8>, FormatError> {
    let mut meta = Vec::new();
    meta.write_f64::<LittleEndian>(record.sample_rate())?;
    meta.write_u32::<LittleEndian>(record.channels())?;
    meta.write_u32::<LittleEndian>(fit_u32(record.frames(), "frame count")?)?;
    write_str(&mut meta, &record.name, "name")?;
    write_str(&mut meta, &record.description, "description")?;
    write_str(&mut meta, &record.category, "category")?;

    meta.write_u16::<LittleEndian>(fit_u16(record.tags.len(), "tag count")?)?;
    for tag in &record.tags {
        write_str(&mut meta, tag, "tag")?;
    }
    Ok(meta)
}

fn encode_ir_chunk(record: &IrRecord) -> Result<Vec<u8>, FormatError> {
    let meta = encode_meta(record)?;
    let audio = encode_samples(&record.audio.samples);

    let mut body = Vec::with_capacity(meta.len() + audio.len() + 16);
    write_chunk(&mut body, META_CHUNK_ID, &meta)?;
    write_chunk(&mut body, AUDIO_CHUNK_ID, &audio)?;

    let mut chunk = Vec::with_capacity(CHUNK_HEADER_SIZE + body.len());
    chunk.write_all(IR_CHUNK_ID)?;
    chunk.write_u64::<LittleEndian>(body.len() as u64)?;
    chunk.write_all(&body)?;
    Ok(chunk)
}

fn encode_index(records: &[IrRecord], offsets: &[u64]) -> Result<Vec<u8>, FormatError> {
    let mut body = Vec::new();
    for (record, &offset) in records.iter().zip(offsets) {
        body.write_u64::<LittleEndian>(offset)?;
        body.write_f64::<LittleEndian>(record.sample_rate())?;
        body.write_u32::<LittleEndian>(record.channels())?;
        body.write_u32::<LittleEndian>(fit_u32(record.frames(), "frame count")?)?;
        write_str(&mut body, &record.name, "name")?;
        write_str(&mut body, &record.category, "category")?;
    }

    let mut chunk = Vec::with_capacity(CHUNK_HEADER_SIZE + body.len());
    chunk.write_all(INDEX_CHUNK_ID)?;
    chunk.write_u64::<LittleEndian>(body.len() as u64)?;
    chunk.write_all(&body)?;
    Ok(chunk)
}

// ================================== TESTS ==================================
