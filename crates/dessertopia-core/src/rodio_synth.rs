//! [`AudioSynth`] backed by rodio and the default output device.
//!
//! The output stream is not `Send`, so it lives on a dedicated thread that
//! owns the stream, the drone sink and every noise voice. The synth itself
//! only holds the command channel.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink, Source};
use tracing::{debug, warn};

use crate::audio::{AudioError, AudioSynth, DroneSpec, NoiseBurst, SawtoothWave};

impl Source for SawtoothWave {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SawtoothWave::sample_rate(self)
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

enum OutputCommand {
    Noise(NoiseBurst),
    Stop,
}

struct OutputThread {
    commands: Sender<OutputCommand>,
    handle: JoinHandle<()>,
}

/// Plays the drone and noise bursts through the system's default output.
///
/// `start_drone` fails with [`AudioError::Unavailable`] when no output
/// device can be opened, which sends the driver down its silent path.
#[derive(Default)]
pub struct RodioSynth {
    output: Option<OutputThread>,
}

impl std::fmt::Debug for RodioSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioSynth")
            .field("running", &self.output.is_some())
            .finish()
    }
}

impl RodioSynth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSynth for RodioSynth {
    fn start_drone(&mut self, spec: &DroneSpec) -> Result<(), AudioError> {
        self.stop();

        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let spec = *spec;
        let handle = thread::Builder::new()
            .name("dessertopia-audio".to_string())
            .spawn(move || run_output(spec, &inbox, &ready_tx))
            .map_err(|err| AudioError::Unavailable(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.output = Some(OutputThread { commands, handle });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Unavailable(
                    "audio thread exited before opening the output".to_string(),
                ))
            }
        }
    }

    fn play_noise(&mut self, burst: &NoiseBurst) -> Result<(), AudioError> {
        let Some(output) = self.output.as_ref() else {
            return Err(AudioError::Playback("output is not open".to_string()));
        };
        output
            .commands
            .send(OutputCommand::Noise(burst.clone()))
            .map_err(|_| AudioError::Playback("audio thread stopped".to_string()))
    }

    fn stop(&mut self) {
        if let Some(output) = self.output.take() {
            let _ = output.commands.send(OutputCommand::Stop);
            let _ = output.handle.join();
        }
    }
}

impl Drop for RodioSynth {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_output(
    spec: DroneSpec,
    inbox: &Receiver<OutputCommand>,
    ready: &Sender<Result<(), AudioError>>,
) {
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(err) => {
            let _ = ready.send(Err(AudioError::Unavailable(err.to_string())));
            return;
        }
    };
    let drone = match Sink::try_new(&stream_handle) {
        Ok(sink) => sink,
        Err(err) => {
            let _ = ready.send(Err(AudioError::Unavailable(err.to_string())));
            return;
        }
    };
    drone.append(spec.wave().amplify(spec.gain as f32));
    debug!(frequency_hz = spec.frequency_hz, "Output device opened");
    let _ = ready.send(Ok(()));

    // A dropped sender ends playback the same way as an explicit stop.
    while let Ok(OutputCommand::Noise(burst)) = inbox.recv() {
        let voice = SamplesBuffer::new(1, burst.sample_rate, burst.samples)
            .amplify(burst.gain as f32);
        if let Err(err) = stream_handle.play_raw(voice) {
            warn!(error = %err, "Noise burst dropped");
        }
    }

    drone.stop();
    debug!("Output device released");
}
