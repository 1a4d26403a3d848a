use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};

use crate::alarm::model::AlarmSound;

pub trait SoundPlayer {
    fn play(&mut self, uri: &str) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Plays assets by spawning an external player (`paplay`, `aplay`, ...).
#[derive(Debug)]
pub struct CommandPlayer {
    program: String,
    child: Option<Child>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            child: None,
        }
    }
}

impl SoundPlayer for CommandPlayer {
    fn play(&mut self, uri: &str) -> Result<()> {
        self.stop()?;
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let child = Command::new(&self.program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start sound player '{}'", self.program))?;
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill().context("failed to stop sound player")?;
        }
        let _ = child.wait();
        Ok(())
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Play/stop state behind the dialog's preview button. Player failures are
/// logged and otherwise ignored.
pub struct SoundPreview<P> {
    player: P,
    playing: bool,
}

impl<P: SoundPlayer> SoundPreview<P> {
    pub fn new(player: P) -> Self {
        Self {
            player,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Starts `sound` when idle, stops playback otherwise.
    pub fn toggle(&mut self, sound: AlarmSound) {
        if self.playing {
            self.stop();
            return;
        }
        match self.player.play(sound.uri()) {
            Ok(()) => self.playing = true,
            Err(err) => tracing::warn!(sound = sound.uri(), error = %err, "sound_play_failed"),
        }
    }

    /// Playback is presumed stopped afterwards even if the player failed.
    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        if let Err(err) = self.player.stop() {
            tracing::warn!(error = %err, "sound_stop_failed");
        }
        self.playing = false;
    }
}
