#[cfg(feature = "alarm-audio")]
pub mod siren;

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "alarm-audio")]
pub use engine::AudioEngineHandle;

/// Looping audible cue played during the grace period.
/// Both calls must return without waiting on the audio device.
pub trait AlarmCue: Send + Sync {
    fn start(&self) -> Result<(), String>;
    fn stop(&self) -> Result<(), String>;
    fn is_playing(&self) -> bool;
}

/// Alarm cue for hosts without an audio device: logs and rings the terminal bell.
pub struct LoggedAlarm {
    playing: AtomicBool,
    bell: bool,
}

impl LoggedAlarm {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            bell: false,
        }
    }

    pub fn with_terminal_bell() -> Self {
        Self {
            playing: AtomicBool::new(false),
            bell: true,
        }
    }
}

impl Default for LoggedAlarm {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmCue for LoggedAlarm {
    fn start(&self) -> Result<(), String> {
        if !self.playing.swap(true, Ordering::SeqCst) {
            warn!("CHECK-IN REQUIRED: alarm sounding");
            if self.bell {
                eprint!("\x07");
            }
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        if self.playing.swap(false, Ordering::SeqCst) {
            info!("alarm stopped");
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "alarm-audio")]
mod engine {
    use super::{siren::SirenTone, AlarmCue};

    use rodio::{OutputStream, Sink};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        Arc, Mutex,
    };
    use std::thread;

    enum AudioCommand {
        Start,
        Stop,
    }

    /// Owns a dedicated thread holding the non-Send rodio stream and sink.
    pub struct AudioEngineHandle {
        tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
        is_playing: Arc<AtomicBool>,
        volume: f32,
    }

    impl AudioEngineHandle {
        pub fn new(volume: f32) -> Self {
            Self {
                tx: Arc::new(Mutex::new(None)),
                is_playing: Arc::new(AtomicBool::new(false)),
                volume: volume.clamp(0.0, 1.0),
            }
        }

        fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
            if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
                return Ok(tx.clone());
            }

            let (tx, rx) = mpsc::channel::<AudioCommand>();
            let is_playing = Arc::clone(&self.is_playing);
            let volume = self.volume;

            thread::Builder::new()
                .name("alarm-audio".to_string())
                .spawn(move || {
                    let mut _stream: Option<OutputStream> = None;
                    let mut sink: Option<Sink> = None;

                    while let Ok(cmd) = rx.recv() {
                        match cmd {
                            AudioCommand::Start => {
                                if sink.is_some() {
                                    continue;
                                }
                                match OutputStream::try_default() {
                                    Ok((stream, handle)) => match Sink::try_new(&handle) {
                                        Ok(new_sink) => {
                                            new_sink.set_volume(volume);
                                            new_sink.append(SirenTone::new());
                                            new_sink.play();
                                            _stream = Some(stream);
                                            sink = Some(new_sink);
                                            is_playing.store(true, Ordering::SeqCst);
                                        }
                                        Err(e) => log::error!("Failed to create audio sink: {}", e),
                                    },
                                    Err(e) => {
                                        log::error!("Failed to create audio output stream: {}", e)
                                    }
                                }
                            }
                            AudioCommand::Stop => {
                                if let Some(s_old) = sink.take() {
                                    s_old.stop();
                                }
                                _stream = None;
                                is_playing.store(false, Ordering::SeqCst);
                            }
                        }
                    }
                })
                .map_err(|e| e.to_string())?;

            let tx_clone = tx.clone();
            *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
            Ok(tx_clone)
        }
    }

    impl AlarmCue for AudioEngineHandle {
        fn start(&self) -> Result<(), String> {
            let tx = self.ensure_thread()?;
            tx.send(AudioCommand::Start).map_err(|e| e.to_string())
        }

        fn stop(&self) -> Result<(), String> {
            if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
                let _ = tx.send(AudioCommand::Stop);
            }
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.is_playing.load(Ordering::SeqCst)
        }
    }
}
