use crate::prelude::*;
use std::f64::consts::PI;
use wide::f32x4;

/// Highest accepted rate. Keeps the prototype filter below ~15M taps.
pub const MAX_SAMPLE_RATE: f64 = 768_000.0;

/// Zero crossings of the prototype sinc on each side, in units of the
/// slower of the two rates.
const HALF_ZERO_CROSSINGS: usize = 10;
const KAISER_BETA: f64 = 5.0;

/// Sinc function: sin(πx) / (πx)
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Zeroth-order modified Bessel function of the first kind (power series).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-16 {
        term *= (half / k) * (half / k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Kaiser window function
fn kaiser_window(n: usize, length: usize, beta: f64) -> f64 {
    if length == 1 {
        return 1.0;
    }
    let ratio = 2.0 * n as f64 / (length - 1) as f64 - 1.0;
    bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / bessel_i0(beta)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn rounded_rate(rate: f64) -> Result<u64, ResampleError> {
    if !rate.is_finite() || rate.round() < 1.0 || rate.round() > MAX_SAMPLE_RATE {
        return Err(ResampleError::InvalidRate(rate));
    }
    Ok(rate.round() as u64)
}

/// Fails unless `rate` is finite and rounds to between 1 Hz and [`MAX_SAMPLE_RATE`].
pub fn check_rate(rate: f64) -> Result<(), ResampleError> {
    rounded_rate(rate).map(|_| ())
}

/// Whether converting `src_rate` to `dst_rate` is a no-op.
///
/// Rates are compared after rounding to whole Hz. Invalid rates are an error
/// even when they would compare equal.
pub fn is_identity(src_rate: f64, dst_rate: f64) -> Result<bool, ResampleError> {
    Ok(rounded_rate(src_rate)? == rounded_rate(dst_rate)?)
}

/// Reduced upsampling and downsampling factors for a rate pair.
pub fn ratio(src_rate: f64, dst_rate: f64) -> Result<(usize, usize), ResampleError> {
    let src = rounded_rate(src_rate)?;
    let dst = rounded_rate(dst_rate)?;
    let g = gcd(src, dst);
    Ok(((dst / g) as usize, (src / g) as usize))
}

/// Number of output frames for `frames` input frames: `ceil(frames * up / down)`.
pub fn output_len(frames: usize, up: usize, down: usize) -> usize {
    (frames * up).div_ceil(down)
}

/// Anti-aliasing FIR for an `up / down` conversion, split into `up` phases.
///
/// The prototype is a Kaiser-windowed (β = 5) sinc with cutoff at the lower of
/// the two Nyquist frequencies, `2 * 10 * max(up, down) + 1` taps long,
/// normalised to unity DC gain and scaled by `up` to make up for the zeros
/// inserted when upsampling.
pub struct PolyphaseFilter {
    up: usize,
    down: usize,
    half_len: usize,
    /// Phase `p` holds taps `p, p + up, p + 2 * up, ...` in reverse order, so
    /// it lines up with ascending input samples.
    phases: Vec<Vec<f32>>,
}

impl PolyphaseFilter {
    pub fn new(up: usize, down: usize) -> Self {
        let max_rate = up.max(down);
        let cutoff = 1.0 / max_rate as f64;
        let half_len = HALF_ZERO_CROSSINGS * max_rate;
        let length = 2 * half_len + 1;

        let mut taps: Vec<f64> = (0..length)
            .map(|n| {
                let t = n as f64 - half_len as f64;
                cutoff * sinc(cutoff * t) * kaiser_window(n, length, KAISER_BETA)
            })
            .collect();

        // Normalize to preserve amplitude
        let sum: f64 = taps.iter().sum();
        for tap in taps.iter_mut() {
            *tap *= up as f64 / sum;
        }

        let phases = (0..up)
            .map(|p| {
                let mut phase: Vec<f32> =
                    taps.iter().skip(p).step_by(up).map(|&t| t as f32).collect();
                phase.reverse();
                phase
            })
            .collect();

        Self {
            up,
            down,
            half_len,
            phases,
        }
    }

    pub fn up(&self) -> usize {
        self.up
    }

    pub fn down(&self) -> usize {
        self.down
    }

    pub fn taps(&self) -> usize {
        2 * self.half_len + 1
    }

    /// Filter one channel.
    ///
    /// Output sample `k` is `Σ h[k * down + half_len - i * up] * x[i]`, i.e. the
    /// filter is centred on output time `k * down` in the upsampled domain and
    /// introduces no delay.
    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        let out_len = output_len(input.len(), self.up, self.down);
        let mut output = Vec::with_capacity(out_len);

        for k in 0..out_len {
            let t = k * self.down + self.half_len;
            let phase = &self.phases[t % self.up];
            let newest = (t / self.up) as isize; // input index hit by tap 0
            let oldest = newest - phase.len() as isize + 1;

            let start = oldest.max(0);
            let end = (newest + 1).min(input.len() as isize);
            if end <= start {
                output.push(0.0);
                continue;
            }
            let offset = (start - oldest) as usize;
            let (start, end) = (start as usize, end as usize);

            output.push(dot(&phase[offset..offset + (end - start)], &input[start..end]));
        }

        output
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = f32x4::ZERO;
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let tail: f32 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| x * y)
        .sum();

    for (x, y) in chunks_a.zip(chunks_b) {
        acc += f32x4::from([x[0], x[1], x[2], x[3]]) * f32x4::from([y[0], y[1], y[2], y[3]]);
    }
    acc.reduce_add() + tail
}

/// Resample a mono f32 buffer from `src_rate` to `dst_rate`.
pub fn resample_channel(input: &[f32], src_rate: f64, dst_rate: f64) -> Result<Vec<f32>, ResampleError> {
    if is_identity(src_rate, dst_rate)? {
        return Ok(input.to_vec());
    }
    let (up, down) = ratio(src_rate, dst_rate)?;
    Ok(PolyphaseFilter::new(up, down).process(input))
}

/// Resample every channel of `buffer` independently to `dst_rate`.
///
/// When the rounded rates already match the samples are copied unchanged
/// and only the rate is set to `dst_rate`.
pub fn resample(buffer: &AudioBuffer, dst_rate: f64) -> Result<AudioBuffer, ResampleError> {
    if is_identity(buffer.sample_rate, dst_rate)? {
        return Ok(AudioBuffer {
            sample_rate: dst_rate,
            ..buffer.clone()
        });
    }

    let (up, down) = ratio(buffer.sample_rate, dst_rate)?;
    let filter = PolyphaseFilter::new(up, down);
    let channels = buffer.channels as usize;
    debug!(
        "Resampling {} -> {} Hz: up={} down={} taps={}",
        buffer.sample_rate,
        dst_rate,
        up,
        down,
        filter.taps()
    );

    let data: Vec<Vec<f32>> = (0..channels)
        .into_par_iter() // Parallelize over channels
        .map(|ch| filter.process(&buffer.channel(ch)))
        .collect();

    let frames = output_len(buffer.frames(), up, down);
    let mut samples = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        for ch in &data {
            samples.push(ch[i]);
        }
    }

    Ok(AudioBuffer {
        sample_rate: dst_rate,
        channels: buffer.channels,
        samples,
    })
}

/// Resample a record's audio in place. Audio already at the target rate is
/// left untouched; the record still takes `dst_rate` exactly.
pub fn resample_record(record: &mut IrRecord, dst_rate: f64) -> Result<(), ResampleError> {
    let src_rate = record.sample_rate();
    let frames = record.frames();
    if is_identity(src_rate, dst_rate)? {
        record.audio.sample_rate = dst_rate;
        info!(
            "  {:?}: already at {} Hz, no resampling needed",
            record.name,
            dst_rate.round()
        );
        return Ok(());
    }

    record.audio.resample(dst_rate)?;
    info!(
        "  {:?}: {} frames @ {} Hz  ->  {} frames @ {} Hz",
        record.name,
        frames,
        src_rate.round(),
        record.frames(),
        dst_rate.round()
    );
    Ok(())
}
