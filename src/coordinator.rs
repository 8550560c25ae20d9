//! Startup coordination between application instances
//!
//! A [`DeepLink`] settles every launch into one of two postures: **primary**
//! (claimed the scheme, owns the listening channel, keeps running) or
//! **secondary** (forwarded its link to the running primary and should exit
//! promptly).

use crate::error::IpcError;
use crate::ipc::channel::{default_channel_dir, Channel, ServerHandle};
use crate::ipc::lock::InstanceLock;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Callback invoked for every received deep link, including the one the
/// primary delivers to itself at startup.
///
/// Channel messages arrive on the listener thread, the startup delivery on
/// the caller's thread; marshalling to a UI thread is the application's
/// job.
pub type OnMessage = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Single-instance coordinator for one URL scheme.
pub struct DeepLink {
    scheme: String,
    channel_dir: PathBuf,
    channel: Channel,
    on_message: Option<OnMessage>,
    lock: Option<InstanceLock>,
    server: Option<ServerHandle>,
}

impl DeepLink {
    /// Coordinator for `scheme`, using the default per-user channel
    /// directory.
    pub fn new(scheme: &str) -> Result<Self, IpcError> {
        let dir = default_channel_dir()?;
        Self::with_channel_dir(scheme, dir)
    }

    /// Coordinator rooted at an explicit channel directory.
    pub fn with_channel_dir(scheme: &str, dir: impl Into<PathBuf>) -> Result<Self, IpcError> {
        let channel_dir = dir.into();
        let channel = Channel::at(channel_dir.clone(), scheme)?;

        Ok(Self {
            scheme: scheme.to_string(),
            channel_dir,
            channel,
            on_message: None,
            lock: None,
            server: None,
        })
    }

    /// Register the single message callback. Must happen before
    /// [`run_or_forward`](Self::run_or_forward); messages received while no
    /// callback is set are dropped.
    pub fn set_on_message<F>(&mut self, on_message: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(on_message));
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Whether this instance became the listening primary.
    pub fn is_primary(&self) -> bool {
        self.server.is_some()
    }

    /// The channel this coordinator rendezvouses on.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Settle this launch into primary or secondary.
    ///
    /// Claims the scheme's instance lock. On success this process is the
    /// primary: the channel starts serving, and when the last argument is a
    /// link for our own scheme it is handed to the callback directly, with
    /// no channel round trip. When the claim is already held elsewhere, the
    /// last argument (if any) is forwarded to the running primary and
    /// `false` comes back — the caller should exit promptly.
    pub fn run_or_forward(&mut self, args: &[String]) -> Result<bool, IpcError> {
        if self.server.is_some() {
            // Already serving; the listener never doubles up.
            return Ok(true);
        }

        let lock = match InstanceLock::try_acquire(&self.channel_dir, &self.scheme)? {
            Some(lock) => lock,
            None => {
                if let Some(last) = args.last() {
                    match self.channel.send(last.as_bytes()) {
                        Ok(()) => {}
                        // The primary vanished between the claim check and
                        // the send; there is nothing left to forward to.
                        Err(err) if err.is_lost_race() => {
                            debug!("forward on {} lost the race: {err}", self.scheme);
                        }
                        Err(err) => return Err(err),
                    }
                }
                return Ok(false);
            }
        };

        let callback = self.on_message.clone();
        let server = self.channel.serve(move |payload| {
            if let Some(on_message) = &callback {
                on_message(&String::from_utf8_lossy(payload));
            }
        })?;

        self.lock = Some(lock);
        self.server = Some(server);

        // The launching link, if any, goes straight to our own callback.
        if let (Some(last), Some(on_message)) = (args.last(), &self.on_message) {
            if last.starts_with(&format!("{}://", self.scheme)) {
                on_message(last);
            }
        }

        Ok(true)
    }

    /// Stop the listener and release the scheme claim.
    ///
    /// Idempotent; a secondary holds no server resources, so this is a
    /// no-op for it. Called automatically on drop.
    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        // Released only after the listener is fully gone, so the next
        // claimant can bind a fresh socket.
        self.lock = None;
    }
}

impl Drop for DeepLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
