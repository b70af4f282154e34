//! cpal/symphonia-backed media element.
//!
//! Decoding runs on a worker thread that fills a shared sample queue; a
//! single cpal output stream drains it. All observable behavior is published
//! to the bus as `MediaEvent`s tagged with the load generation.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, warn};
use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSourceStream, ReadOnlySource},
    meta::MetadataOptions,
    probe::Hint,
};
use tokio::sync::broadcast::Sender;

use crate::media::{MediaElement, MediaSourceSpec};
use crate::protocol::{MediaEvent, Message};

const TIME_UPDATE_INTERVAL_MS: u64 = 250;
const PROGRESS_UPDATE_INTERVAL_MS: u64 = 1_000;
/// Decoder backpressure: keep at most this much audio buffered ahead.
const MAX_BUFFERED_SECONDS: u64 = 30;
const RESAMPLER_CHUNK_FRAMES: usize = 1024;

struct SharedPlayback {
    samples: Mutex<VecDeque<f32>>,
    playing: AtomicBool,
    volume_bits: AtomicU32,
    muted: AtomicBool,
    consumed_samples: AtomicU64,
    pushed_samples: AtomicU64,
    decode_done: AtomicBool,
    ended_emitted: AtomicBool,
    generation: AtomicU64,
    base_offset_ms: AtomicU64,
    last_time_update_ms: AtomicU64,
}

impl SharedPlayback {
    fn new(volume: f32) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            playing: AtomicBool::new(false),
            volume_bits: AtomicU32::new(volume.to_bits()),
            muted: AtomicBool::new(false),
            consumed_samples: AtomicU64::new(0),
            pushed_samples: AtomicU64::new(0),
            decode_done: AtomicBool::new(false),
            ended_emitted: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            base_offset_ms: AtomicU64::new(0),
            last_time_update_ms: AtomicU64::new(0),
        }
    }

    fn reset_for_load(&self, generation: u64, start_offset_ms: u64) {
        match self.samples.lock() {
            Ok(mut samples) => samples.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        self.consumed_samples.store(0, Ordering::Relaxed);
        self.pushed_samples.store(0, Ordering::Relaxed);
        self.decode_done.store(false, Ordering::Relaxed);
        self.ended_emitted.store(false, Ordering::Relaxed);
        self.generation.store(generation, Ordering::Relaxed);
        self.base_offset_ms.store(start_offset_ms, Ordering::Relaxed);
        self.last_time_update_ms.store(0, Ordering::Relaxed);
    }

    fn position_ms(&self, sample_rate: u32, channels: u16) -> u64 {
        let frames =
            self.consumed_samples.load(Ordering::Relaxed) / u64::from(channels.max(1));
        self.base_offset_ms.load(Ordering::Relaxed)
            + frames * 1_000 / u64::from(sample_rate.max(1))
    }
}

pub struct CpalMediaElement {
    bus_producer: Sender<Message>,
    shared: Arc<SharedPlayback>,
    stream: Option<cpal::Stream>,
    output_sample_rate: u32,
    output_channels: u16,
    decode_cancel: Arc<AtomicBool>,
    current_source: Option<MediaSourceSpec>,
    http_agent: ureq::Agent,
}

impl CpalMediaElement {
    pub fn new(bus_producer: Sender<Message>, initial_volume: f32) -> Self {
        let shared = Arc::new(SharedPlayback::new(initial_volume));
        let mut element = Self {
            bus_producer,
            shared,
            stream: None,
            output_sample_rate: 48_000,
            output_channels: 2,
            decode_cancel: Arc::new(AtomicBool::new(false)),
            current_source: None,
            http_agent: crate::media::fetch::build_agent(),
        };
        element.setup_audio_stream();
        element
    }

    fn setup_audio_stream(&mut self) {
        let host = cpal::default_host();
        let device = match host.default_output_device() {
            Some(device) => device,
            None => {
                error!("CpalMediaElement: no output device available");
                return;
            }
        };

        let preferred_rate = 48_000u32;
        let preferred_channels = 2u16;
        let config = match device.supported_output_configs() {
            Ok(mut configs) => configs
                .find(|config| {
                    config.channels() == preferred_channels
                        && config.min_sample_rate().0 <= preferred_rate
                        && config.max_sample_rate().0 >= preferred_rate
                })
                .map(|config| config.with_sample_rate(cpal::SampleRate(preferred_rate))),
            Err(err) => {
                error!("CpalMediaElement: error getting device configs: {}", err);
                None
            }
        };
        let config = match config.or_else(|| device.default_output_config().ok()) {
            Some(config) => config,
            None => {
                error!("CpalMediaElement: no usable output config found");
                return;
            }
        };

        self.output_sample_rate = config.sample_rate().0;
        self.output_channels = config.channels();
        let stream_config: cpal::StreamConfig = config.into();

        let shared = Arc::clone(&self.shared);
        let bus_producer = self.bus_producer.clone();
        let sample_rate = self.output_sample_rate;
        let channels = self.output_channels;

        let build_result = device.build_output_stream(
            &stream_config,
            move |output_buffer: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !shared.playing.load(Ordering::Relaxed) {
                    output_buffer.fill(0.0);
                    return;
                }

                let volume = if shared.muted.load(Ordering::Relaxed) {
                    0.0
                } else {
                    f32::from_bits(shared.volume_bits.load(Ordering::Relaxed))
                };

                let drained = {
                    let mut samples = match shared.samples.lock() {
                        Ok(samples) => samples,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    let mut drained = 0usize;
                    for slot in output_buffer.iter_mut() {
                        *slot = match samples.pop_front() {
                            Some(sample) => {
                                drained += 1;
                                sample * volume
                            }
                            None => 0.0,
                        };
                    }
                    drained
                };
                shared
                    .consumed_samples
                    .fetch_add(drained as u64, Ordering::Relaxed);

                let generation = shared.generation.load(Ordering::Relaxed);
                let position_ms = shared.position_ms(sample_rate, channels);
                let last = shared.last_time_update_ms.load(Ordering::Relaxed);
                if position_ms >= last + TIME_UPDATE_INTERVAL_MS {
                    shared
                        .last_time_update_ms
                        .store(position_ms, Ordering::Relaxed);
                    let _ = bus_producer.send(Message::Media(MediaEvent::TimeUpdate {
                        generation,
                        position_s: position_ms as f64 / 1_000.0,
                    }));
                }

                // Queue drained and the decoder is finished: the track ended.
                if drained < output_buffer.len()
                    && shared.decode_done.load(Ordering::Relaxed)
                    && shared.pushed_samples.load(Ordering::Relaxed) > 0
                    && !shared.ended_emitted.swap(true, Ordering::Relaxed)
                {
                    shared.playing.store(false, Ordering::Relaxed);
                    let _ = bus_producer.send(Message::Media(MediaEvent::Ended { generation }));
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        );

        match build_result {
            Ok(stream) => {
                if let Err(err) = stream.play() {
                    error!("CpalMediaElement: failed to start output stream: {}", err);
                }
                self.stream = Some(stream);
                debug!(
                    "CpalMediaElement: output stream ready at {} Hz, {} channels",
                    self.output_sample_rate, self.output_channels
                );
            }
            Err(err) => error!("CpalMediaElement: failed to build output stream: {}", err),
        }
    }

    fn emit(&self, event: MediaEvent) {
        let _ = self.bus_producer.send(Message::Media(event));
    }

    fn cancel_decode(&mut self) {
        self.decode_cancel.store(true, Ordering::Relaxed);
        self.decode_cancel = Arc::new(AtomicBool::new(false));
    }

    fn spawn_decode(&self, source: MediaSourceSpec, generation: u64, start_offset_ms: u64) {
        let shared = Arc::clone(&self.shared);
        let bus_producer = self.bus_producer.clone();
        let cancel = Arc::clone(&self.decode_cancel);
        let agent = self.http_agent.clone();
        let output_sample_rate = self.output_sample_rate;
        let output_channels = self.output_channels;

        thread::spawn(move || {
            let worker = DecodeWorker {
                shared,
                bus_producer,
                cancel,
                agent,
                generation,
                output_sample_rate,
                output_channels,
            };
            worker.run(source, start_offset_ms);
        });
    }
}

impl MediaElement for CpalMediaElement {
    fn load(&mut self, source: MediaSourceSpec, generation: u64, start_offset_ms: u64) {
        self.cancel_decode();
        self.shared.reset_for_load(generation, start_offset_ms);
        self.current_source = Some(source.clone());
        self.spawn_decode(source, generation, start_offset_ms);
    }

    fn play(&mut self) {
        let generation = self.shared.generation.load(Ordering::Relaxed);
        if self.stream.is_none() {
            self.emit(MediaEvent::Error {
                generation,
                message: "no audio output device available".to_string(),
            });
            return;
        }
        self.shared.playing.store(true, Ordering::Relaxed);
        self.emit(MediaEvent::Play { generation });
    }

    fn pause(&mut self) {
        let generation = self.shared.generation.load(Ordering::Relaxed);
        self.shared.playing.store(false, Ordering::Relaxed);
        self.emit(MediaEvent::Pause { generation });
    }

    fn stop(&mut self) {
        self.cancel_decode();
        self.shared.playing.store(false, Ordering::Relaxed);
        match self.shared.samples.lock() {
            Ok(mut samples) => samples.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        self.shared.consumed_samples.store(0, Ordering::Relaxed);
        self.shared.base_offset_ms.store(0, Ordering::Relaxed);
        self.current_source = None;
    }

    fn seek_ms(&mut self, position_ms: u64) {
        let source = match self.current_source.clone() {
            Some(source) => source,
            None => return,
        };
        let generation = self.shared.generation.load(Ordering::Relaxed);
        let was_playing = self.shared.playing.load(Ordering::Relaxed);
        self.cancel_decode();
        self.shared.reset_for_load(generation, position_ms);
        self.shared.playing.store(was_playing, Ordering::Relaxed);
        self.emit(MediaEvent::TimeUpdate {
            generation,
            position_s: position_ms as f64 / 1_000.0,
        });
        self.spawn_decode(source, generation, position_ms);
    }

    fn set_volume(&mut self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.shared
            .volume_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
        self.emit(MediaEvent::VolumeChange {
            volume: clamped,
            muted: self.shared.muted.load(Ordering::Relaxed),
        });
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
        self.emit(MediaEvent::VolumeChange {
            volume: f32::from_bits(self.shared.volume_bits.load(Ordering::Relaxed)),
            muted,
        });
    }
}

impl Drop for CpalMediaElement {
    fn drop(&mut self) {
        self.cancel_decode();
        self.shared.playing.store(false, Ordering::Relaxed);
        self.stream = None;
    }
}

struct DecodeWorker {
    shared: Arc<SharedPlayback>,
    bus_producer: Sender<Message>,
    cancel: Arc<AtomicBool>,
    agent: ureq::Agent,
    generation: u64,
    output_sample_rate: u32,
    output_channels: u16,
}

impl DecodeWorker {
    fn emit(&self, event: MediaEvent) {
        let _ = self.bus_producer.send(Message::Media(event));
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn run(&self, source: MediaSourceSpec, start_offset_ms: u64) {
        self.emit(MediaEvent::LoadStart {
            generation: self.generation,
        });
        if let Err(message) = self.decode(source, start_offset_ms) {
            if !self.cancelled() {
                self.emit(MediaEvent::Error {
                    generation: self.generation,
                    message,
                });
            }
        }
    }

    fn open_source(&self, source: &MediaSourceSpec) -> Result<(MediaSourceStream, Hint), String> {
        match source {
            MediaSourceSpec::Blob(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|err| format!("failed to open blob {:?}: {err}", path))?;
                let mut hint = Hint::new();
                if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
                    hint.with_extension(ext);
                }
                Ok((
                    MediaSourceStream::new(Box::new(file), Default::default()),
                    hint,
                ))
            }
            MediaSourceSpec::Url(url) => {
                let response = self
                    .agent
                    .get(url)
                    .set("Accept", "*/*")
                    .call()
                    .map_err(|err| format!("stream request failed: {err}"))?;
                let mut hint = Hint::new();
                if let Some(ext) = url
                    .split('?')
                    .next()
                    .and_then(|path| path.rsplit('.').next())
                    .filter(|ext| ext.len() <= 4)
                {
                    hint.with_extension(ext);
                }
                let reader = ReadOnlySource::new(response.into_reader());
                Ok((
                    MediaSourceStream::new(Box::new(reader), Default::default()),
                    hint,
                ))
            }
        }
    }

    fn decode(&self, source: MediaSourceSpec, start_offset_ms: u64) -> Result<(), String> {
        let (media_source, hint) = self.open_source(&source)?;

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                media_source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| format!("failed to probe media source: {err}"))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .default_track()
            .ok_or_else(|| "no default audio track found".to_string())?;
        let track_id = track.id;
        let source_sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
        let source_channels = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(2) as u16;
        let known_duration_s = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / f64::from(source_sample_rate));

        if let Some(duration_s) = known_duration_s {
            self.emit(MediaEvent::DurationChange {
                generation: self.generation,
                duration_s,
            });
        }

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|err| format!("failed to create decoder: {err}"))?;

        let mut pipeline = SamplePipeline::new(
            source_sample_rate,
            source_channels,
            self.output_sample_rate,
            self.output_channels,
        )?;

        let skip_samples =
            u64::from(source_sample_rate) * start_offset_ms / 1_000 * u64::from(source_channels);
        let mut skipped: u64 = 0;
        let mut loaded_emitted = false;
        let mut last_progress_ms: u64 = 0;
        let max_buffered_samples = u64::from(self.output_sample_rate)
            * u64::from(self.output_channels)
            * MAX_BUFFERED_SECONDS;

        loop {
            if self.cancelled() {
                return Ok(());
            }

            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(err) => return Err(format!("stream read failed: {err}")),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    warn!("CpalMediaElement: skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => return Err(format!("decode failed: {err}")),
            };

            let spec = *decoded.spec();
            let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buffer.copy_interleaved_ref(decoded);
            let mut samples = sample_buffer.samples();

            // Seek support for non-seekable sources: decode and discard.
            if skipped < skip_samples {
                let remaining = (skip_samples - skipped) as usize;
                if samples.len() <= remaining {
                    skipped += samples.len() as u64;
                    continue;
                }
                samples = &samples[remaining..];
                skipped = skip_samples;
            }

            let converted = pipeline.push(samples)?;
            if !converted.is_empty() {
                self.push_to_queue(&converted);
                if !loaded_emitted {
                    loaded_emitted = true;
                    self.emit(MediaEvent::LoadedData {
                        generation: self.generation,
                    });
                }

                let buffered_ms = self.buffered_to_ms(start_offset_ms);
                if buffered_ms >= last_progress_ms + PROGRESS_UPDATE_INTERVAL_MS {
                    last_progress_ms = buffered_ms;
                    self.emit(MediaEvent::Progress {
                        generation: self.generation,
                        buffered_to_s: buffered_ms as f64 / 1_000.0,
                    });
                }
            }

            // Backpressure: do not decode unboundedly ahead of playback.
            loop {
                let queued = {
                    let samples = match self.shared.samples.lock() {
                        Ok(samples) => samples,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    samples.len() as u64
                };
                if queued < max_buffered_samples || self.cancelled() {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }

        if self.cancelled() {
            return Ok(());
        }

        let tail = pipeline.finish()?;
        if !tail.is_empty() {
            self.push_to_queue(&tail);
            // A source shorter than one resampler chunk only surfaces here.
            if !loaded_emitted {
                loaded_emitted = true;
                self.emit(MediaEvent::LoadedData {
                    generation: self.generation,
                });
            }
        }

        if !loaded_emitted {
            return Err("stream contained no decodable audio".to_string());
        }

        if known_duration_s.is_none() {
            let measured_s = self.buffered_to_ms(start_offset_ms) as f64 / 1_000.0;
            self.emit(MediaEvent::DurationChange {
                generation: self.generation,
                duration_s: measured_s,
            });
        }

        self.shared.decode_done.store(true, Ordering::Relaxed);
        debug!(
            "CpalMediaElement: decode complete ({} samples pushed)",
            self.shared.pushed_samples.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn push_to_queue(&self, samples: &[f32]) {
        {
            let mut queue = match self.shared.samples.lock() {
                Ok(queue) => queue,
                Err(poisoned) => poisoned.into_inner(),
            };
            queue.extend(samples.iter().copied());
        }
        self.shared
            .pushed_samples
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
    }

    fn buffered_to_ms(&self, start_offset_ms: u64) -> u64 {
        let frames = self.shared.pushed_samples.load(Ordering::Relaxed)
            / u64::from(self.output_channels.max(1));
        start_offset_ms + frames * 1_000 / u64::from(self.output_sample_rate.max(1))
    }
}

/// Converts decoded interleaved samples to the output channel count and
/// sample rate.
struct SamplePipeline {
    source_channels: u16,
    output_channels: u16,
    resampler: Option<FftFixedIn<f32>>,
    /// Planar accumulation buffers at the output channel count.
    pending: Vec<Vec<f32>>,
}

impl SamplePipeline {
    fn new(
        source_sample_rate: u32,
        source_channels: u16,
        output_sample_rate: u32,
        output_channels: u16,
    ) -> Result<Self, String> {
        let resampler = if source_sample_rate != output_sample_rate {
            Some(
                FftFixedIn::<f32>::new(
                    source_sample_rate as usize,
                    output_sample_rate as usize,
                    RESAMPLER_CHUNK_FRAMES,
                    4,
                    output_channels as usize,
                )
                .map_err(|err| format!("failed to create resampler: {err}"))?,
            )
        } else {
            None
        };
        Ok(Self {
            source_channels: source_channels.max(1),
            output_channels: output_channels.max(1),
            resampler,
            pending: vec![Vec::new(); output_channels.max(1) as usize],
        })
    }

    /// Feeds interleaved source samples; returns interleaved output samples.
    fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>, String> {
        let planar = self.to_output_planar(samples);
        if self.resampler.is_none() {
            return Ok(interleave(&planar));
        }

        for (channel, buffer) in self.pending.iter_mut().zip(planar) {
            channel.extend(buffer);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= RESAMPLER_CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..RESAMPLER_CHUNK_FRAMES).collect())
                .collect();
            let resampler = self.resampler.as_mut().expect("resampler checked above");
            let resampled = resampler
                .process(&chunk, None)
                .map_err(|err| format!("resample failed: {err}"))?;
            output.extend(interleave(&resampled));
        }
        Ok(output)
    }

    /// Flushes the resampler tail by padding the last partial chunk.
    fn finish(&mut self) -> Result<Vec<f32>, String> {
        let resampler = match self.resampler.as_mut() {
            Some(resampler) => resampler,
            None => return Ok(Vec::new()),
        };
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }
        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|channel| {
                let mut chunk: Vec<f32> = channel.drain(..).collect();
                chunk.resize(RESAMPLER_CHUNK_FRAMES, 0.0);
                chunk
            })
            .collect();
        let resampled = resampler
            .process(&chunk, None)
            .map_err(|err| format!("resample failed: {err}"))?;
        Ok(interleave(&resampled))
    }

    /// Maps interleaved source-channel frames to planar output channels.
    /// Mono duplicates; extra source channels fold into the fronts.
    fn to_output_planar(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let src = self.source_channels as usize;
        let out = self.output_channels as usize;
        let frame_count = samples.len() / src;
        let mut planar = vec![Vec::with_capacity(frame_count); out];

        for frame in samples.chunks_exact(src) {
            for (channel, buffer) in planar.iter_mut().enumerate() {
                let sample = if src == 1 {
                    frame[0]
                } else if channel < src {
                    // Fold any channels beyond the output count into the
                    // matching front channel.
                    let mut sum = frame[channel];
                    let mut extra = channel + out;
                    let mut count = 1f32;
                    while extra < src {
                        sum += frame[extra];
                        extra += out;
                        count += 1.0;
                    }
                    sum / count
                } else {
                    frame[channel % src]
                };
                buffer.push(sample);
            }
        }
        planar
    }
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }
    let frames = planar[0].len();
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            interleaved.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_passthrough_when_rates_match() {
        let mut pipeline = SamplePipeline::new(48_000, 2, 48_000, 2).expect("pipeline");
        let frames = vec![0.1, -0.1, 0.2, -0.2];
        let out = pipeline.push(&frames).expect("push");
        assert_eq!(out, frames);
        assert!(pipeline.finish().expect("finish").is_empty());
    }

    #[test]
    fn test_pipeline_duplicates_mono_to_stereo() {
        let mut pipeline = SamplePipeline::new(48_000, 1, 48_000, 2).expect("pipeline");
        let out = pipeline.push(&[0.5, -0.5]).expect("push");
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_pipeline_resamples_to_roughly_rate_ratio() {
        let mut pipeline = SamplePipeline::new(44_100, 2, 88_200, 2).expect("pipeline");
        let input: Vec<f32> = (0..44_100 * 2).map(|i| (i % 7) as f32 / 7.0).collect();
        let mut total = pipeline.push(&input).expect("push").len();
        total += pipeline.finish().expect("finish").len();
        let expected = input.len() * 2;
        let tolerance = expected / 10;
        assert!(
            total + tolerance > expected && total < expected + tolerance,
            "expected about {expected} samples, got {total}"
        );
    }

    #[test]
    fn test_interleave_round_trip() {
        let planar = vec![vec![1.0, 3.0], vec![2.0, 4.0]];
        assert_eq!(interleave(&planar), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
