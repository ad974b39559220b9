//! Local source sub-graphs: one decode worker per playable unit.
//!
//! The worker decodes with symphonia, resamples to the device rate with
//! rubato, and pushes interleaved f32 samples into a bounded queue drained
//! by the render thread. The queue's mutex/condvar pair doubles as the
//! source's shutdown lock and its delivery block: the worker parks on it
//! when the queue is full, when delivery is blocked, or after end of
//! decode, and teardown wakes it unconditionally.

use crate::engine::local::MixPoint;
use crate::engine::{AppEvent, BufferLimits, BusMessage, BusSender, EosHook, ObjectId, SourceNode};
use crate::error::{Result, SegueError};
use crate::tags::{TAG_ALBUM, TAG_ARTIST, TAG_GENRE, TAG_TITLE, TagList};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

const MIN_QUEUE_SAMPLES: usize = 4096;

struct SourceInner {
    samples: VecDeque<f32>,
    capacity_samples: usize,
    blocked: bool,
    shutting_down: bool,
    decode_done: bool,
    seek_to_ns: Option<i64>,
}

/// State shared between the node handle, the decode worker, and the render
/// thread.
pub(crate) struct SourceShared {
    id: ObjectId,
    uri: String,
    out_rate: u32,
    out_channels: u16,
    inner: Mutex<SourceInner>,
    signal: Condvar,
    position_frames: AtomicU64,
    duration_ns: Mutex<Option<i64>>,
    probed: AtomicBool,
    marked: AtomicBool,
    eos_hook: Mutex<Option<EosHook>>,
    eos_fired: AtomicBool,
}

impl SourceShared {
    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn position_ns(&self) -> i64 {
        let frames = self.position_frames.load(Ordering::Relaxed);
        (frames as i128 * 1_000_000_000 / self.out_rate as i128) as i64
    }

    pub(crate) fn duration_ns(&self) -> Option<i64> {
        *self.duration_ns.lock().unwrap()
    }

    /// Pops up to `buf.len()` samples for rendering; returns the count.
    /// Advances the playback position accordingly.
    pub(crate) fn pop_into(&self, buf: &mut [f32]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let count = buf.len().min(inner.samples.len());
        for slot in buf.iter_mut().take(count) {
            *slot = inner.samples.pop_front().unwrap_or(0.0);
        }
        drop(inner);
        if count > 0 {
            self.position_frames
                .fetch_add((count / self.out_channels as usize) as u64, Ordering::Relaxed);
            // Space freed; the worker may continue.
            self.signal.notify_all();
        }
        count
    }

    /// True once decoding finished and every sample has been rendered.
    pub(crate) fn is_drained(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.decode_done && inner.samples.is_empty() && inner.seek_to_ns.is_none()
    }

    /// Invokes the end-of-stream hook exactly once.
    pub(crate) fn fire_eos_once(&self) {
        if self.eos_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let hook = self.eos_hook.lock().unwrap();
        if let Some(hook) = hook.as_ref() {
            hook();
        }
    }

    pub(crate) fn request_seek(&self, position_ns: i64) -> Result<()> {
        if !self.probed.load(Ordering::SeqCst) {
            return Err(SegueError::Seek("source is not ready yet".to_owned()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.seek_to_ns = Some(position_ns);
        inner.samples.clear();
        inner.decode_done = false;
        drop(inner);
        let frames = (position_ns as i128 * self.out_rate as i128 / 1_000_000_000) as u64;
        self.position_frames.store(frames, Ordering::Relaxed);
        self.eos_fired.store(false, Ordering::SeqCst);
        self.signal.notify_all();
        Ok(())
    }

    fn set_blocked(&self, blocked: bool) {
        self.inner.lock().unwrap().blocked = blocked;
        self.signal.notify_all();
    }

    fn set_capacity_bytes(&self, bytes: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.capacity_samples = (bytes as usize / std::mem::size_of::<f32>()).max(MIN_QUEUE_SAMPLES);
        self.signal.notify_all();
    }

    fn shutdown(&self) {
        self.inner.lock().unwrap().shutting_down = true;
        // Always wake a parked worker, whatever it was waiting for.
        self.signal.notify_all();
    }

    fn fill_level_bytes(&self) -> u64 {
        (self.inner.lock().unwrap().samples.len() * std::mem::size_of::<f32>()) as u64
    }
}

enum Cue {
    Decode,
    Seek(i64),
    Shutdown,
}

impl SourceShared {
    /// Parks the worker until there is something to do: space to fill, a
    /// seek to run, or teardown.
    fn next_cue(&self) -> Cue {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.shutting_down {
                return Cue::Shutdown;
            }
            if let Some(target) = inner.seek_to_ns.take() {
                return Cue::Seek(target);
            }
            let full = inner.samples.len() >= inner.capacity_samples;
            if !inner.blocked && !full && !inner.decode_done {
                return Cue::Decode;
            }
            inner = self.signal.wait(inner).unwrap();
        }
    }

    /// Pushes decoded samples, waiting for queue space as needed. Returns
    /// false if the source is shutting down or a seek flushed the queue.
    fn push_samples(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        let mut inner = self.inner.lock().unwrap();
        while offset < samples.len() {
            if inner.shutting_down {
                return false;
            }
            if inner.blocked {
                inner = self.signal.wait(inner).unwrap();
                continue;
            }
            if inner.seek_to_ns.is_some() {
                // The rest of this packet predates the seek target.
                return false;
            }
            let space = inner.capacity_samples.saturating_sub(inner.samples.len());
            if space == 0 {
                inner = self.signal.wait(inner).unwrap();
                continue;
            }
            let count = space.min(samples.len() - offset);
            inner
                .samples
                .extend(samples[offset..offset + count].iter().copied());
            offset += count;
        }
        true
    }

    fn mark_decode_done(&self) {
        self.inner.lock().unwrap().decode_done = true;
        self.signal.notify_all();
    }
}

/// Node handle owned by the player's stream.
pub(crate) struct LocalSourceNode {
    shared: Arc<SourceShared>,
    mix: Arc<MixPoint>,
    worker: Option<thread::JoinHandle<()>>,
}

impl LocalSourceNode {
    pub(crate) fn spawn(
        path: PathBuf,
        uri: String,
        bus: BusSender,
        mix: Arc<MixPoint>,
        out_rate: u32,
        out_channels: u16,
    ) -> Result<(Self, Arc<SourceShared>)> {
        let shared = Arc::new(SourceShared {
            id: ObjectId::new_v4(),
            uri,
            out_rate,
            out_channels,
            inner: Mutex::new(SourceInner {
                samples: VecDeque::new(),
                capacity_samples: crate::properties::BUFFER_SIZE_LIMIT_DEFAULT as usize
                    / std::mem::size_of::<f32>(),
                blocked: false,
                shutting_down: false,
                decode_done: false,
                seek_to_ns: None,
            }),
            signal: Condvar::new(),
            position_frames: AtomicU64::new(0),
            duration_ns: Mutex::new(None),
            probed: AtomicBool::new(false),
            marked: AtomicBool::new(false),
            eos_hook: Mutex::new(None),
            eos_fired: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("segue-decode".to_owned())
            .spawn(move || decode_worker(worker_shared, path, bus))
            .map_err(|err| SegueError::Engine(format!("could not spawn decode worker: {err}")))?;

        let node = Self {
            shared: Arc::clone(&shared),
            mix,
            worker: Some(worker),
        };
        Ok((node, shared))
    }
}

impl SourceNode for LocalSourceNode {
    fn id(&self) -> ObjectId {
        self.shared.id
    }

    fn set_eos_hook(&mut self, hook: EosHook) {
        *self.shared.eos_hook.lock().unwrap() = Some(hook);
    }

    fn query_seekable(&self) -> Option<bool> {
        self.shared
            .probed
            .load(Ordering::SeqCst)
            .then_some(true)
    }

    fn query_live(&self) -> Option<bool> {
        // Files are never live.
        self.shared
            .probed
            .load(Ordering::SeqCst)
            .then_some(false)
    }

    fn buffers(&self) -> bool {
        // Plain files do not stream-buffer; only the sample queue exists.
        false
    }

    fn apply_buffer_limits(&self, limits: &BufferLimits) {
        self.shared.set_capacity_bytes(limits.size_limit_bytes);
    }

    fn fill_level_bytes(&self) -> Option<u64> {
        Some(self.shared.fill_level_bytes())
    }

    fn block_delivery(&self, block: bool) {
        self.shared.set_blocked(block);
    }

    fn mark_shutting_down(&self) {
        self.shared.marked.store(true, Ordering::SeqCst);
    }

    fn lock_level(&self, _locked: bool) {
        // Sub-graph levels are implicit here: the worker runs until it is
        // stopped, so there is nothing a graph-wide change could leak into.
    }

    fn force_stopped(&self) {
        self.shared.shutdown();
    }

    fn detach_mix_point(&self) {
        self.mix.detach(self.shared.id);
    }
}

impl Drop for LocalSourceNode {
    fn drop(&mut self) {
        self.shared.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn decode_worker(shared: Arc<SourceShared>, path: PathBuf, bus: BusSender) {
    log::debug!("decode worker for {} starting", shared.uri);
    if let Err(err) = run_decode(&shared, &path, &bus) {
        log::error!("decode worker for {} failed: {err}", shared.uri);
        if !shared.marked.load(Ordering::SeqCst) {
            let _ = bus.send(BusMessage::Error {
                origin: Some(shared.id),
                message: format!("cannot play {}: {err}", shared.uri),
            });
        }
    }
    // Whatever happened, let the render thread move past this source.
    shared.mark_decode_done();
    log::debug!("decode worker for {} exiting", shared.uri);
}

fn run_decode(shared: &Arc<SourceShared>, path: &Path, bus: &BusSender) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| SegueError::AudioFormat(format!("unsupported format: {err}")))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SegueError::AudioFormat("no decodable track".to_owned()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| SegueError::AudioFormat(format!("no decoder: {err}")))?;

    let in_rate = codec_params
        .sample_rate
        .ok_or_else(|| SegueError::AudioFormat("unknown sample rate".to_owned()))?;

    if let Some(frames) = codec_params.n_frames {
        let duration = (frames as i128 * 1_000_000_000 / in_rate as i128) as i64;
        *shared.duration_ns.lock().unwrap() = Some(duration);
    }

    // The output appeared: seekability and liveness are answerable now.
    shared.probed.store(true, Ordering::SeqCst);
    let _ = bus.send(BusMessage::Application(AppEvent::SourceOutputReady {
        origin: shared.id,
    }));
    let _ = bus.send(BusMessage::DurationChanged {
        origin: Some(shared.id),
    });

    let mut tags = TagList::new();
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            collect_tags(revision, &mut tags);
        }
    }
    {
        let metadata = probed.format.metadata();
        if let Some(revision) = metadata.current() {
            collect_tags(revision, &mut tags);
        }
    }
    if !tags.is_empty() {
        let _ = bus.send(BusMessage::Tags {
            origin: shared.id,
            tags,
        });
    }

    let mut resampler = Resampler::new(in_rate, shared.out_rate, shared.out_channels)?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        match shared.next_cue() {
            Cue::Shutdown => return Ok(()),
            Cue::Seek(target_ns) => {
                let seconds = target_ns.max(0) as f64 / 1e9;
                let result = probed.format.seek(
                    SeekMode::Accurate,
                    SeekTo::Time {
                        time: Time::from(seconds),
                        track_id: Some(track_id),
                    },
                );
                match result {
                    Ok(_) => {
                        decoder.reset();
                        resampler.flush_pending();
                    }
                    Err(err) => log::warn!("seek in {} failed: {err}", shared.uri),
                }
            }
            Cue::Decode => {
                let packet = match probed.format.next_packet() {
                    Ok(packet) => packet,
                    Err(SymphoniaError::IoError(err))
                        if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                    {
                        let tail = resampler.drain()?;
                        if !tail.is_empty() {
                            shared.push_samples(&tail);
                        }
                        log::debug!("end of decode for {}", shared.uri);
                        shared.mark_decode_done();
                        continue;
                    }
                    Err(err) => {
                        return Err(SegueError::Media(format!("demux error: {err}")));
                    }
                };

                if packet.track_id() != track_id {
                    continue;
                }

                let decoded = match decoder.decode(&packet) {
                    Ok(decoded) => decoded,
                    Err(SymphoniaError::DecodeError(err)) => {
                        // Corrupt packets are skippable.
                        log::warn!("decode error in {}: {err}", shared.uri);
                        continue;
                    }
                    Err(err) => {
                        return Err(SegueError::Media(format!("decode error: {err}")));
                    }
                };

                let spec = *decoded.spec();
                let needed_frames = decoded.capacity() as u64;
                let needed_samples = decoded.capacity() * spec.channels.count();
                let buf = match sample_buf.as_mut() {
                    Some(buf) if buf.capacity() >= needed_samples => buf,
                    _ => sample_buf.insert(SampleBuffer::new(needed_frames, spec)),
                };
                buf.copy_interleaved_ref(decoded);

                let mapped = map_channels(
                    buf.samples(),
                    spec.channels.count(),
                    shared.out_channels as usize,
                );
                let resampled = resampler.process(&mapped)?;
                if !resampled.is_empty() && !shared.push_samples(&resampled) {
                    // Teardown or a seek flushed the queue mid-push.
                    continue;
                }
            }
        }
    }
}

fn collect_tags(revision: &MetadataRevision, tags: &mut TagList) {
    for tag in revision.tags() {
        let name = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => TAG_TITLE,
            Some(StandardTagKey::Artist) | Some(StandardTagKey::AlbumArtist) => TAG_ARTIST,
            Some(StandardTagKey::Album) => TAG_ALBUM,
            Some(StandardTagKey::Genre) => TAG_GENRE,
            _ => continue,
        };
        tags.replace(name, vec![tag.value.to_string().into()]);
    }
}

/// Maps interleaved samples from `in_channels` to `out_channels`, padding
/// missing channels with the last available one.
fn map_channels(samples: &[f32], in_channels: usize, out_channels: usize) -> Vec<f32> {
    if in_channels == out_channels {
        return samples.to_vec();
    }
    let frames = samples.len() / in_channels;
    let mut mapped = Vec::with_capacity(frames * out_channels);
    for frame in 0..frames {
        let base = frame * in_channels;
        for channel in 0..out_channels {
            mapped.push(samples[base + channel.min(in_channels - 1)]);
        }
    }
    mapped
}

const RESAMPLE_CHUNK: usize = 1024;

/// Streaming wrapper around rubato, fed with interleaved output-format
/// samples. Passthrough when the rates already match.
struct Resampler {
    inner: Option<rubato::SincFixedIn<f32>>,
    channels: usize,
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    fn new(in_rate: u32, out_rate: u32, channels: u16) -> Result<Self> {
        let channels = channels as usize;
        if in_rate == out_rate {
            return Ok(Self {
                inner: None,
                channels,
                pending: vec![Vec::new(); channels],
            });
        }

        use rubato::{
            SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
        };

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedIn::new(
            out_rate as f64 / in_rate as f64,
            2.0,
            params,
            RESAMPLE_CHUNK,
            channels,
        )
        .map_err(|err| SegueError::AudioFormat(format!("could not create resampler: {err}")))?;

        Ok(Self {
            inner: Some(inner),
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    /// Feeds interleaved samples and returns whatever full chunks produce.
    fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.inner.is_none() {
            return Ok(interleaved.to_vec());
        }

        for (index, sample) in interleaved.iter().enumerate() {
            self.pending[index % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= RESAMPLE_CHUNK {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..RESAMPLE_CHUNK).collect())
                .collect();
            self.resample_chunk(&chunk, &mut output)?;
        }
        Ok(output)
    }

    /// Pads and flushes whatever is still pending at end of decode.
    fn drain(&mut self) -> Result<Vec<f32>> {
        let mut output = Vec::new();
        if self.inner.is_none() || self.pending[0].is_empty() {
            return Ok(output);
        }
        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|channel| {
                let mut padded: Vec<f32> = channel.drain(..).collect();
                padded.resize(RESAMPLE_CHUNK, 0.0);
                padded
            })
            .collect();
        self.resample_chunk(&chunk, &mut output)?;
        Ok(output)
    }

    fn flush_pending(&mut self) {
        for channel in &mut self.pending {
            channel.clear();
        }
    }

    fn resample_chunk(&mut self, chunk: &[Vec<f32>], output: &mut Vec<f32>) -> Result<()> {
        use rubato::Resampler as _;
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        let resampled = inner
            .process(chunk, None)
            .map_err(|err| SegueError::AudioFormat(format!("resampling error: {err}")))?;
        let frames = resampled.first().map(Vec::len).unwrap_or(0);
        for frame in 0..frames {
            for channel in &resampled {
                output.push(channel[frame]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_channels_mono_to_stereo() {
        let mapped = map_channels(&[0.1, 0.2], 1, 2);
        assert_eq!(mapped, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn map_channels_downmix_takes_leading_channels() {
        let mapped = map_channels(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, 2);
        assert_eq!(mapped, vec![0.1, 0.2, 0.4, 0.5]);
    }

    #[test]
    fn passthrough_resampler_returns_input() {
        let mut resampler = Resampler::new(48_000, 48_000, 2).unwrap();
        let samples = vec![0.5f32; 8];
        assert_eq!(resampler.process(&samples).unwrap(), samples);
    }
}
