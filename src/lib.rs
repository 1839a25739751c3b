pub mod codecs;
pub mod config;
pub mod error;
mod prelude;
pub mod resample;
pub mod selection;

use std::path::{Path, PathBuf};

pub use codecs::*;
pub use config::ExtractConfig;
pub use error::*;
pub use selection::{Selection, select};

use crate::prelude::*;

// Files below this size are read into memory instead of mapped
const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;

pub trait Codec: Send + Sync {
    fn validate_file_format(&self, data: &[u8]) -> R<()>;
    fn file_extension(&self) -> &'static str;

    fn encode(&self, records: &[IrRecord]) -> R<Vec<u8>>;

    fn encode_file(&self, records: &[IrRecord], file_path: &str) -> R<()> {
        let encoded_data = self.encode(records)?;
        std::fs::write(file_path, encoded_data)?;
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> R<Decoded>;

    fn decode_file(&self, file_path: &str) -> R<Decoded> {
        use memmap2::Mmap;
        use std::fs::File;

        let mut file = File::open(file_path)?;
        let file_size = file.metadata()?.len();

        // Only use mmap for large files
        if file_size > MMAP_THRESHOLD {
            let mmap = unsafe { Mmap::map(&file)? };
            self.decode(&mmap)
        } else {
            let mut data = vec![0; file_size as usize];
            file.read_exact(&mut data)?;
            self.decode(&data)
        }
    }
}

/// An IR library loaded into memory.
#[derive(Default)]
pub struct Library {
    pub path: PathBuf,
    pub header: Option<Header>,
    pub records: Vec<IrRecord>,
    pub skipped: Vec<RecordError>,
    pub codec: Option<Box<dyn Codec>>,
}

impl Library {
    pub fn new(input_file: impl AsRef<Path>) -> R<Self> {
        let path = input_file.as_ref().to_path_buf();
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Input file does not exist: {}",
                path.display()
            ));
        }

        Ok(Self {
            codec: get_codec(&path.to_string_lossy()).ok(),
            path,
            ..Self::default()
        })
    }

    pub fn decode(mut self) -> R<Self> {
        let codec = self.codec.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "No codec available for decoding IR library: {}",
                self.path.display()
            )
        })?;
        let decoded = codec.decode_file(&self.path.to_string_lossy())?;
        self.absorb(decoded);
        Ok(self)
    }

    /// Load a library that is already in memory, e.g. one embedded in the binary.
    pub fn from_bytes(bytes: &[u8]) -> R<Self> {
        Self::from_reader(&mut Cursor::new(bytes))
    }

    pub fn from_reader<Rd: Read + Seek>(reader: &mut Rd) -> R<Self> {
        let mut library = Self {
            codec: Some(Box::new(IrlbCodec)),
            ..Self::default()
        };
        library.absorb(IrlbCodec.read_from(reader)?);
        Ok(library)
    }

    fn absorb(&mut self, decoded: Decoded) {
        self.header = Some(decoded.header);
        self.records = decoded.records;
        self.skipped = decoded.skipped;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn get(&self, index: usize) -> Option<&IrRecord> {
        self.records.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&IrRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Drop every record not on `allow_list`. Returns the names that were not found.
    pub fn retain_named<S: AsRef<str>>(&mut self, allow_list: &[S]) -> Vec<SelectionWarning> {
        let selection = select(std::mem::take(&mut self.records), allow_list);
        self.records = selection.records;
        selection.missing
    }

    /// Bring every record to `new_rate`. Records already there are left alone.
    pub fn resample(&mut self, new_rate: f64) -> R<()> {
        resample::check_rate(new_rate)?;
        self.records
            .par_iter_mut()
            .try_for_each(|record| resample::resample_record(record, new_rate))?;
        Ok(())
    }

    /// Select then resample, the two steps between reading and writing.
    pub fn curate<S: AsRef<str>>(&mut self, target_rate: f64, allow_list: &[S]) -> R<Vec<SelectionWarning>> {
        let missing = self.retain_named(allow_list);
        info!(
            "Resampling {} IRs to {} Hz...",
            self.records.len(),
            target_rate
        );
        self.resample(target_rate)?;
        Ok(missing)
    }

    pub fn export(&self, output_file: impl AsRef<Path>) -> R<()> {
        let output_file = output_file.as_ref();
        let codec = get_codec(&output_file.to_string_lossy())?;

        let temp_file =
            std::env::temp_dir().join(format!("irpack_{:016x}.tmp", rand::random::<u64>()));
        self.export_via(codec.as_ref(), &temp_file, output_file)
    }

    fn export_via(&self, codec: &dyn Codec, temp_file: &Path, output_file: &Path) -> R<()> {
        if let Err(e) = codec.encode_file(&self.records, &temp_file.to_string_lossy()) {
            let _ = std::fs::remove_file(temp_file); // Don't leave a partial file behind
            return Err(e);
        }

        match std::fs::rename(temp_file, output_file) {
            Ok(_) => Ok(()),
            Err(e) => {
                // As a fallback, try to copy then delete
                let copied = std::fs::copy(temp_file, output_file);
                let _ = std::fs::remove_file(temp_file); // Try to cleanup
                match copied {
                    Ok(_) => Ok(()),
                    Err(_) => Err(e.into()), // Return the original error
                }
            }
        }
    }

    /// JSON description of every record, without audio.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "name": r.name,
                        "category": r.category,
                        "description": r.description,
                        "tags": r.tags,
                        "sample_rate": r.sample_rate(),
                        "channels": r.channels(),
                        "frames": r.frames(),
                        "duration_secs": r.audio.duration_secs(),
                    })
                })
                .collect(),
        )
    }

    fn report(self, missing: Vec<SelectionWarning>, bytes_written: u64) -> ExtractReport {
        ExtractReport {
            written: self.records.into_iter().map(|r| r.name).collect(),
            missing,
            skipped: self.skipped,
            bytes_written,
        }
    }
}

/// What an extraction run wrote and what it had to leave out.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub written: Vec<String>,
    pub missing: Vec<SelectionWarning>,
    pub skipped: Vec<RecordError>,
    pub bytes_written: u64,
}

/// Read `source`, keep `selection`, resample to `target_rate`, write `sink`.
pub fn extract_stream<Rd, W>(
    source: &mut Rd,
    sink: &mut W,
    target_rate: f64,
    selection: &[String],
) -> R<ExtractReport>
where
    Rd: Read + Seek,
    W: Write,
{
    resample::check_rate(target_rate)?;
    let mut library = Library::from_reader(source)?;
    let missing = library.curate(target_rate, selection)?;
    let bytes_written = IrlbCodec.write_to(&library.records, sink)?;
    Ok(library.report(missing, bytes_written))
}

/// File-based [`extract_stream`]. The source is fully read and closed before
/// the destination is written.
pub fn extract(config: &ExtractConfig) -> R<ExtractReport> {
    config.validate()?;
    info!("Reading IRs from: {}", config.source.display());
    let mut library = Library::new(&config.source)?.decode()?;

    let missing = library.curate(config.target_rate, &config.selection)?;

    info!("Writing output to: {}", config.destination.display());
    library.export(&config.destination)?;
    let bytes_written = std::fs::metadata(&config.destination)?.len();
    Ok(library.report(missing, bytes_written))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, rate: f64, channels: u32, frames: usize) -> IrRecord {
        let samples = (0..frames * channels as usize)
            .map(|i| ((i as f32) * 0.05).sin() * 0.5)
            .collect();
        IrRecord {
            name: name.to_string(),
            category: "Rooms".to_string(),
            description: String::new(),
            tags: vec![name.to_lowercase()],
            audio: AudioBuffer::new(rate, channels, samples).unwrap(),
        }
    }

    fn source_library() -> Vec<u8> {
        IrlbCodec
            .encode(&[
                record("A", 44100.0, 2, 441),
                record("B", 48000.0, 1, 480),
                record("C", 96000.0, 2, 960),
            ])
            .unwrap()
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("irpack_test_{tag}_{:08x}.irlib", rand::random::<u32>()))
    }

    #[test]
    fn test_extract_stream_selects_and_resamples() {
        let mut sink = Vec::new();
        let selection = vec!["C".to_string(), "B".to_string(), "D".to_string()];
        let report = extract_stream(
            &mut Cursor::new(source_library()),
            &mut sink,
            48000.0,
            &selection,
        )
        .unwrap();

        assert_eq!(report.written, ["B", "C"]);
        assert_eq!(report.missing, vec![SelectionWarning::Missing("D".to_string())]);
        assert!(report.skipped.is_empty());
        assert_eq!(report.bytes_written, sink.len() as u64);

        let output = Library::from_bytes(&sink).unwrap();
        assert_eq!(output.names(), ["B", "C"]);
        for record in &output.records {
            assert_eq!(record.sample_rate(), 48000.0);
        }
        assert_eq!(output.find("B").unwrap().frames(), 480);
        assert_eq!(output.find("C").unwrap().frames(), 480);
        assert_eq!(output.find("C").unwrap().channels(), 2);
        assert_eq!(output.find("C").unwrap().tags, ["c"]);
    }

    #[test]
    fn test_extract_stream_writes_one_uniform_rate() {
        let source = IrlbCodec
            .encode(&[
                record("Slightly Fast", 48000.3, 1, 48),
                record("Slightly Slow", 47999.8, 2, 48),
                record("Fast", 96000.0, 1, 96),
            ])
            .unwrap();

        let mut sink = Vec::new();
        extract_stream(&mut Cursor::new(source), &mut sink, 48000.0, &[]).unwrap();

        let decoded = IrlbCodec.decode(&sink).unwrap();
        for entry in &decoded.entries {
            assert_eq!(entry.sample_rate, 48000.0, "{}", entry.name);
        }
        for ir in &decoded.records {
            assert_eq!(ir.sample_rate(), 48000.0, "{}", ir.name);
        }
        assert_eq!(decoded.records[0].frames(), 48);
    }

    /// Writes part of a file, then fails.
    struct FailingCodec;

    impl Codec for FailingCodec {
        fn validate_file_format(&self, _data: &[u8]) -> R<()> {
            Ok(())
        }

        fn file_extension(&self) -> &'static str {
            "irlib"
        }

        fn encode(&self, _records: &[IrRecord]) -> R<Vec<u8>> {
            Err(anyhow!("disk full"))
        }

        fn encode_file(&self, _records: &[IrRecord], file_path: &str) -> R<()> {
            std::fs::write(file_path, b"IRLB")?;
            self.encode(&[]).map(|_| ())
        }

        fn decode(&self, _input: &[u8]) -> R<Decoded> {
            Err(anyhow!("not supported"))
        }
    }

    #[test]
    fn test_failed_export_removes_temp_file() {
        let library = Library::from_bytes(&source_library()).unwrap();
        let temp_file = temp_path("partial");
        let destination = temp_path("never_written");

        let err = library
            .export_via(&FailingCodec, &temp_file, &destination)
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(!temp_file.exists());
        assert!(!destination.exists());
    }

    #[test]
    fn test_export_rejects_oversized_fields() {
        let mut library = Library::from_bytes(&source_library()).unwrap();
        library.records[0].name = "x".repeat(70_000);
        let destination = temp_path("oversized");

        let err = library.export(&destination).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::FieldTooLarge { .. })
        ));
        assert!(!destination.exists());
    }

    #[test]
    fn test_extract_stream_survives_a_corrupt_record() {
        let mut bytes = source_library();
        let a_offset = HEADER_SIZE as usize;
        bytes[a_offset..a_offset + 4].copy_from_slice(b"????");

        let mut sink = Vec::new();
        let report = extract_stream(&mut Cursor::new(bytes), &mut sink, 48000.0, &[]).unwrap();
        assert_eq!(report.written, ["B", "C"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name(), "A");
    }

    #[test]
    fn test_extract_stream_rejects_invalid_rate() {
        let err = extract_stream(
            &mut Cursor::new(source_library()),
            &mut Vec::new(),
            0.0,
            &[],
        )
        .unwrap_err();
        assert!(err.downcast_ref::<ResampleError>().is_some());
    }

    #[test]
    fn test_broken_source_rate_is_fatal() {
        let mut broken = record("Broken", 48000.0, 1, 16);
        broken.audio.sample_rate = -1.0;
        let bytes = IrlbCodec.encode(&[broken]).unwrap();

        let err = extract_stream(&mut Cursor::new(bytes), &mut Vec::new(), 48000.0, &[])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResampleError>(),
            Some(ResampleError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_extract_stream_rejects_garbage() {
        let err = extract_stream(
            &mut Cursor::new(b"not an IR library at all".to_vec()),
            &mut Vec::new(),
            48000.0,
            &[],
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::BadMagic(_))
        ));
    }

    #[test]
    fn test_extract_files() {
        let source = temp_path("source");
        let destination = temp_path("destination");
        IrlbCodec
            .encode_file(
                &[record("Brick Wall", 44100.0, 2, 441), record("Vocal Plate", 48000.0, 1, 48)],
                &source.to_string_lossy(),
            )
            .unwrap();

        let config = ExtractConfig::new(&source, &destination).with_selection(["Brick Wall"]);
        let report = extract(&config).unwrap();
        assert_eq!(report.written, ["Brick Wall"]);
        assert_eq!(
            report.bytes_written,
            std::fs::metadata(&destination).unwrap().len()
        );

        let output = Library::new(&destination).unwrap().decode().unwrap();
        assert_eq!(output.len(), 1);
        let ir = output.get(0).unwrap();
        assert_eq!(ir.sample_rate(), 48000.0);
        assert_eq!(ir.frames(), 480);

        let _ = std::fs::remove_file(&source);
        let _ = std::fs::remove_file(&destination);
    }

    #[test]
    fn test_library_new_requires_existing_file() {
        assert!(Library::new(temp_path("missing")).is_err());
    }

    #[test]
    fn test_export_requires_known_extension() {
        let library = Library::from_bytes(&source_library()).unwrap();
        assert!(library.export(std::env::temp_dir().join("irpack_out.wav")).is_err());
    }

    #[test]
    fn test_summary_lists_records() {
        let library = Library::from_bytes(&source_library()).unwrap();
        let summary = library.summary();
        let entries = summary.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["name"], "A");
        assert_eq!(entries[0]["channels"], 2);
        assert_eq!(entries[2]["sample_rate"], 96000.0);
        assert_eq!(entries[1]["frames"], 480);
        assert!(!library.is_empty());
        assert!(library.get(3).is_none());
    }
}
