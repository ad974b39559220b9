//! Render thread and device output.
//!
//! The render thread drains the audible source's sample queue into a ring
//! buffer and performs the gapless handover between sources; the device
//! thread owns the cpal stream (cpal streams cannot move between threads)
//! and its callback consumes the ring, applying the master volume. The
//! callback never blocks: it uses `try_lock` and fills with silence when
//! samples are missing.

use crate::engine::local::{MixPoint, VolumeControl};
use crate::engine::{BusMessage, BusSender};
use crate::error::{Result, SegueError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Sender, bounded, unbounded};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const RENDER_CHUNK_SAMPLES: usize = 2048;
const IDLE_WAIT: Duration = Duration::from_millis(5);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

struct RenderState {
    playing: AtomicBool,
    shutdown: AtomicBool,
    flush: AtomicBool,
}

enum OutputCommand {
    Acquire(Sender<Result<()>>),
    Pause(Sender<Result<()>>),
    Play(Sender<Result<()>>),
    Release(Sender<Result<()>>),
    Shutdown,
}

pub(crate) struct OutputStage {
    cmd_tx: Sender<OutputCommand>,
    state: Arc<RenderState>,
    render: Option<thread::JoinHandle<()>>,
    device: Option<thread::JoinHandle<()>>,
}

impl OutputStage {
    /// Format of the default output device, without acquiring it.
    pub(crate) fn probe_device_format() -> Result<(u32, u16)> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            SegueError::AudioDevice("no default output device available".to_owned())
        })?;
        let config = device
            .default_output_config()
            .map_err(|err| SegueError::AudioDevice(format!("no default config: {err}")))?;
        Ok((config.sample_rate().0, config.channels()))
    }

    pub(crate) fn new(
        mix: Arc<MixPoint>,
        volume: Arc<VolumeControl>,
        bus: BusSender,
        out_rate: u32,
        out_channels: u16,
    ) -> Result<Self> {
        // Roughly 200 ms of device-side buffering.
        let capacity = (out_rate as usize / 5) * out_channels as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(RENDER_CHUNK_SAMPLES)).split();
        let consumer = Arc::new(Mutex::new(consumer));

        let state = Arc::new(RenderState {
            playing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            flush: AtomicBool::new(false),
        });

        let (cmd_tx, cmd_rx) = unbounded();

        let render_state = Arc::clone(&state);
        let render = thread::Builder::new()
            .name("segue-render".to_owned())
            .spawn(move || {
                render_thread(producer, mix, bus, render_state, out_channels as usize)
            })
            .map_err(|err| SegueError::Engine(format!("could not spawn render thread: {err}")))?;

        let device_state = Arc::clone(&state);
        let device = thread::Builder::new()
            .name("segue-output".to_owned())
            .spawn(move || device_thread(cmd_rx, consumer, volume, device_state))
            .map_err(|err| SegueError::Engine(format!("could not spawn output thread: {err}")))?;

        Ok(Self {
            cmd_tx,
            state,
            render: Some(render),
            device: Some(device),
        })
    }

    pub(crate) fn acquire(&self) -> Result<()> {
        self.command(OutputCommand::Acquire)
    }

    pub(crate) fn pause(&self) -> Result<()> {
        self.state.playing.store(false, Ordering::SeqCst);
        self.command(OutputCommand::Pause)
    }

    pub(crate) fn play(&self) -> Result<()> {
        self.command(OutputCommand::Play)?;
        self.state.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn stop(&self) -> Result<()> {
        self.state.playing.store(false, Ordering::SeqCst);
        self.command(OutputCommand::Release)
    }

    /// Discards whatever the device ring still holds; used on seeks.
    pub(crate) fn flush(&self) {
        self.state.flush.store(true, Ordering::SeqCst);
    }

    fn command(&self, build: fn(Sender<Result<()>>) -> OutputCommand) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx
            .send(build(reply_tx))
            .map_err(|_| SegueError::AudioDevice("output thread is gone".to_owned()))?;
        reply_rx
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|_| SegueError::AudioDevice("output thread did not respond".to_owned()))?
    }
}

impl Drop for OutputStage {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        if let Some(render) = self.render.take() {
            let _ = render.join();
        }
        if let Some(device) = self.device.take() {
            let _ = device.join();
        }
    }
}

/// Moves samples from the audible source into the device ring and hands
/// the mix point over when a source runs dry.
fn render_thread(
    mut producer: HeapProd<f32>,
    mix: Arc<MixPoint>,
    bus: BusSender,
    state: Arc<RenderState>,
    channels: usize,
) {
    log::debug!("render thread started");
    let mut chunk = vec![0.0f32; RENDER_CHUNK_SAMPLES];

    while !state.shutdown.load(Ordering::SeqCst) {
        if !state.playing.load(Ordering::SeqCst) {
            thread::sleep(IDLE_WAIT);
            continue;
        }

        let Some(active) = mix.active() else {
            thread::sleep(IDLE_WAIT);
            continue;
        };

        let vacant = producer.vacant_len();
        if vacant < channels {
            thread::sleep(IDLE_WAIT);
            continue;
        }

        let want = vacant.min(chunk.len());
        let want = want - (want % channels);
        let got = active.pop_into(&mut chunk[..want]);
        if got > 0 {
            producer.push_slice(&chunk[..got]);
        }

        if active.is_drained() {
            // The audible unit ran out of data for good: this is the
            // gapless switch point. The hook runs on this thread, so it
            // must only flag and post.
            active.fire_eos_once();
            if mix.advance().is_some() {
                log::debug!("render switched to the next source");
                let _ = bus.send(BusMessage::StreamStart);
            } else {
                log::debug!("render ran out of sources");
                let _ = bus.send(BusMessage::EndOfStream);
            }
            continue;
        }

        if got == 0 {
            thread::sleep(IDLE_WAIT);
        }
    }

    log::debug!("render thread stopped");
}

/// Owns the cpal stream and executes level commands.
fn device_thread(
    cmd_rx: crossbeam_channel::Receiver<OutputCommand>,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    volume: Arc<VolumeControl>,
    state: Arc<RenderState>,
) {
    log::debug!("output thread started");
    let mut stream: Option<cpal::Stream> = None;

    while let Ok(command) = cmd_rx.recv() {
        match command {
            OutputCommand::Acquire(reply) => {
                let result = if stream.is_some() {
                    Ok(())
                } else {
                    match build_output_stream(Arc::clone(&consumer), Arc::clone(&volume), &state) {
                        Ok(built) => {
                            stream = Some(built);
                            Ok(())
                        }
                        Err(err) => Err(err),
                    }
                };
                let _ = reply.send(result);
            }
            OutputCommand::Pause(reply) => {
                let result = match stream.as_ref() {
                    Some(stream) => stream.pause().map_err(|err| {
                        SegueError::AudioDevice(format!("could not pause stream: {err}"))
                    }),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            OutputCommand::Play(reply) => {
                let result = match stream.as_ref() {
                    Some(stream) => stream.play().map_err(|err| {
                        SegueError::AudioDevice(format!("could not start stream: {err}"))
                    }),
                    None => Err(SegueError::AudioDevice(
                        "no output stream acquired".to_owned(),
                    )),
                };
                let _ = reply.send(result);
            }
            OutputCommand::Release(reply) => {
                stream = None;
                let _ = reply.send(Ok(()));
            }
            OutputCommand::Shutdown => break,
        }
    }

    drop(stream);
    log::debug!("output thread stopped");
}

fn build_output_stream(
    consumer: Arc<Mutex<HeapCons<f32>>>,
    volume: Arc<VolumeControl>,
    state: &Arc<RenderState>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SegueError::AudioDevice("no default output device available".to_owned()))?;
    let supported = device
        .default_output_config()
        .map_err(|err| SegueError::AudioDevice(format!("no default config: {err}")))?;
    let config = supported.config();
    let state = Arc::clone(state);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => typed_stream::<f32>(&device, &config, consumer, volume, state)?,
        cpal::SampleFormat::I16 => typed_stream::<i16>(&device, &config, consumer, volume, state)?,
        cpal::SampleFormat::U16 => typed_stream::<u16>(&device, &config, consumer, volume, state)?,
        other => {
            return Err(SegueError::AudioFormat(format!(
                "unsupported sample format {other}"
            )));
        }
    };

    // Freshly built streams may already run on some hosts; a failing pause
    // just means playback starts silently a moment early.
    if let Err(err) = stream.pause() {
        log::warn!("could not pause freshly built stream: {err}");
    }
    Ok(stream)
}

fn typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    volume: Arc<VolumeControl>,
    state: Arc<RenderState>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let gain = volume.current_gain();
                let mut written = 0;

                if let Ok(mut consumer) = consumer.try_lock() {
                    if state.flush.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    } else {
                        for slot in data.iter_mut() {
                            match consumer.try_pop() {
                                Some(sample) => {
                                    *slot = T::from_sample(sample * gain);
                                    written += 1;
                                }
                                None => break,
                            }
                        }
                    }
                }

                for slot in data.iter_mut().skip(written) {
                    *slot = T::from_sample(0.0f32);
                }
            },
            move |err| {
                log::error!("audio stream error: {err}");
            },
            None,
        )
        .map_err(|err| SegueError::AudioDevice(format!("could not build stream: {err}")))?;

    Ok(stream)
}
