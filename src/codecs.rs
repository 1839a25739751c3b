use crate::prelude::*;
pub mod float16;
mod irlb;
pub use irlb::{HEADER_SIZE, IrlbCodec};

pub fn get_codec(file_path: &str) -> R<Box<dyn Codec>> {
    let extension = std::path::Path::new(file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file extension"))?;

    match extension.to_lowercase().as_str() {
        "irlib" => Ok(Box::new(IrlbCodec)),
        "irlb" => Ok(Box::new(IrlbCodec)),
        _ => Err(anyhow::anyhow!(
            "No codec found for extension: {}",
            extension
        )),
    }
}

/// Fixed-size file header found at offset 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub version: u16,
    /// Informational only; the index chunk decides how many records exist.
    pub record_count: u32,
    pub index_offset: u64,
}

/// One entry of the trailing index chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub offset: u64,
    pub sample_rate: f64,
    pub channels: u32,
    pub frames: u32,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: f64,
    pub channels: u32,
    pub samples: Vec<f32>, // interleaved, frame-major
}

impl AudioBuffer {
    pub fn new(sample_rate: f64, channels: u32, samples: Vec<f32>) -> R<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(anyhow!("Invalid sample rate: {}", sample_rate));
        }
        if channels == 0 {
            return Err(anyhow!("Audio buffer needs at least one channel"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(anyhow!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    /// Interleave equal-length channel vectors.
    pub fn from_channels(sample_rate: f64, data: Vec<Vec<f32>>) -> R<Self> {
        let frames = data.first().map_or(0, |ch| ch.len());
        if data.iter().any(|ch| ch.len() != frames) {
            return Err(anyhow!("Channels have different lengths"));
        }

        let mut samples = Vec::with_capacity(frames * data.len());
        for i in 0..frames {
            for ch in &data {
                samples.push(ch[i]);
            }
        }
        Self::new(sample_rate, data.len() as u32, samples)
    }

    pub fn frames(&self) -> usize {
        self.samples
            .len()
            .checked_div(self.channels as usize)
            .unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate
    }

    /// Deinterleaved copy of channel `ch`.
    pub fn channel(&self, ch: usize) -> Vec<f32> {
        self.samples
            .iter()
            .skip(ch)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }

    pub fn resample(&mut self, new_rate: f64) -> Result<(), ResampleError> {
        if resample::is_identity(self.sample_rate, new_rate)? {
            self.sample_rate = new_rate;
        } else {
            *self = resample::resample(self, new_rate)?;
        }
        Ok(())
    }
}

/// Everything a read pass produced, including the records it had to drop.
#[derive(Debug)]
pub struct Decoded {
    pub header: Header,
    pub entries: Vec<IndexEntry>,
    pub records: Vec<IrRecord>,
    pub skipped: Vec<RecordError>,
}

/// One impulse response with its descriptive metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IrRecord {
    pub name: String,
    pub category: String,
    pub description: String,
    pub tags: Vec<String>,
    pub audio: AudioBuffer,
}

impl IrRecord {
    pub fn sample_rate(&self) -> f64 {
        self.audio.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.audio.channels
    }

    pub fn frames(&self) -> usize {
        self.audio.frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_codec_by_extension() {
        assert_eq!(get_codec("lib.irlib").unwrap().file_extension(), "irlib");
        assert_eq!(get_codec("LIB.IRLB").unwrap().file_extension(), "irlib");
        assert!(get_codec("lib.wav").is_err());
        assert!(get_codec("noextension").is_err());
    }

    #[test]
    fn test_buffer_rejects_ragged_samples() {
        assert!(AudioBuffer::new(48000.0, 2, vec![0.0; 3]).is_err());
        assert!(AudioBuffer::new(48000.0, 0, vec![]).is_err());
        assert!(AudioBuffer::new(0.0, 1, vec![]).is_err());
        assert!(AudioBuffer::new(f64::NAN, 1, vec![]).is_err());
    }

    #[test]
    fn test_channel_interleaving() {
        let buffer =
            AudioBuffer::from_channels(44100.0, vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]])
                .unwrap();
        assert_eq!(buffer.samples, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(1), vec![-1.0, -2.0, -3.0]);
        assert!((buffer.duration_secs() - 3.0 / 44100.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_channels_rejects_uneven_lengths() {
        assert!(AudioBuffer::from_channels(48000.0, vec![vec![0.0; 2], vec![0.0; 3]]).is_err());
    }
}
