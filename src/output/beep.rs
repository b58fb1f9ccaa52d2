//! Audio cue on detection

use anyhow::{Context, Result};
use rodio::source::{SineWave, Source};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::{DetectionResult, Observer};

const TONE_FREQUENCY: f32 = 880.0;
const TONE_DURATION: Duration = Duration::from_millis(150);

/// Plays a short sound for every detected card.
///
/// Playback is queued on a rodio sink and never blocks the detector.
pub struct BeepObserver {
    /// Must outlive the sink
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    sound: Option<Vec<u8>>,
    volume: f32,
}

impl BeepObserver {
    /// Open the default audio output. `sound` is a WAV file, `None` plays a tone.
    pub fn new(sound: Option<&Path>, volume: f32) -> Result<Self> {
        let sound = sound
            .map(|path| {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read beep sound {:?}", path))?;
                Decoder::new(Cursor::new(bytes.clone()))
                    .with_context(|| format!("Unsupported beep sound {:?}", path))?;
                Ok::<_, anyhow::Error>(bytes)
            })
            .transpose()?;

        let (stream, handle) =
            OutputStream::try_default().context("Failed to open audio output")?;
        info!(
            "Beep enabled ({})",
            if sound.is_some() { "custom sound" } else { "tone" }
        );

        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            sound,
            volume: volume.clamp(0.0, 1.0),
        })
    }

    fn play(&mut self) -> Result<()> {
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => Sink::try_new(&self.handle).context("Failed to create audio sink")?,
        };
        sink.set_volume(self.volume);

        match &self.sound {
            Some(bytes) => sink.append(Decoder::new(Cursor::new(bytes.clone()))?),
            None => sink.append(
                SineWave::new(TONE_FREQUENCY)
                    .take_duration(TONE_DURATION)
                    .amplify(0.25),
            ),
        }

        self.sink = Some(sink);
        Ok(())
    }
}

impl Observer for BeepObserver {
    fn name(&self) -> &str {
        "beep"
    }

    fn card_detected(&mut self, _result: &DetectionResult) {
        if let Err(err) = self.play() {
            warn!("Failed to play beep: {:#}", err);
        }
    }
}
