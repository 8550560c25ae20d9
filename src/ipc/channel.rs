//! Scheme-named local IPC channel
//!
//! One Unix domain socket per URL scheme, living in a per-user runtime
//! directory. A channel carries exactly one message per connection: the
//! client writes its payload and closes, the server reads until EOF. There
//! is no framing, no acknowledgement, and no retry.

use crate::error::IpcError;
use log::{debug, warn};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Largest payload a channel accepts. Oversized messages are rejected at
/// send and dropped whole at the server; they are never truncated.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Pause before retrying after a failed accept.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Check a scheme against the URL-scheme charset: one ASCII lowercase
/// letter followed by lowercase letters, digits, `+`, `-`, or `.`.
///
/// This also keeps every file name derived from the scheme path-safe.
pub(crate) fn scheme_is_valid(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

/// Default per-user directory for channel sockets and instance locks:
/// `$XDG_RUNTIME_DIR/deeplink`, falling back to `~/.deeplink`.
pub fn default_channel_dir() -> Result<PathBuf, IpcError> {
    if let Some(runtime) = dirs::runtime_dir() {
        return Ok(runtime.join("deeplink"));
    }
    dirs::home_dir()
        .map(|home| home.join(".deeplink"))
        .ok_or(IpcError::NoChannelDir)
}

/// Create the channel directory with owner-only permissions.
pub(crate) fn ensure_channel_dir(dir: &Path) -> Result<(), IpcError> {
    let dir_err = |source| IpcError::ChannelDir {
        path: dir.to_path_buf(),
        source,
    };

    if !dir.exists() {
        fs::create_dir_all(dir).map_err(dir_err)?;

        let mut perms = fs::metadata(dir).map_err(dir_err)?.permissions();
        perms.set_mode(0o700);
        fs::set_permissions(dir, perms).map_err(dir_err)?;
    }

    Ok(())
}

/// A point-to-point rendezvous for one URL scheme.
///
/// The socket path is derived solely from the scheme, so unrelated
/// processes meet on it without prior coordination.
#[derive(Debug, Clone)]
pub struct Channel {
    scheme: String,
    socket_path: PathBuf,
}

impl Channel {
    /// Channel for `scheme` rooted at the default per-user directory.
    pub fn for_scheme(scheme: &str) -> Result<Self, IpcError> {
        let dir = default_channel_dir()?;
        Self::at(dir, scheme)
    }

    /// Channel for `scheme` rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>, scheme: &str) -> Result<Self, IpcError> {
        if !scheme_is_valid(scheme) {
            return Err(IpcError::InvalidScheme(scheme.to_string()));
        }
        let socket_path = dir.into().join(format!("{scheme}.sock"));
        Ok(Self {
            scheme: scheme.to_string(),
            socket_path,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Path of the socket this channel rendezvouses on.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Non-mutating check for a listening server.
    ///
    /// Only an affirmative report of absence (no socket file, or a stale
    /// file nobody listens on) maps to "not occupied"; any other failure
    /// counts as occupied, so a racing launch never concludes the channel
    /// is free by mistake. A successful connect is dropped immediately and
    /// shows up server-side as an ignored zero-byte connection.
    pub fn probe(&self) -> bool {
        match UnixStream::connect(&self.socket_path) {
            Ok(_) => true,
            Err(err) => !matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ),
        }
    }

    /// One-shot, fire-and-forget delivery: connect, write the whole
    /// payload, close. The peer learns the message is complete from EOF.
    /// No acknowledgement is awaited and nothing is retried.
    pub fn send(&self, message: &[u8]) -> Result<(), IpcError> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(IpcError::MessageTooLarge {
                len: message.len(),
                max: MAX_MESSAGE_LEN,
            });
        }

        let mut stream =
            UnixStream::connect(&self.socket_path).map_err(|source| IpcError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        stream.write_all(message).map_err(IpcError::Write)?;
        stream
            .shutdown(std::net::Shutdown::Write)
            .map_err(IpcError::Write)?;

        Ok(())
    }

    /// Bind the channel and start the accept loop on a background thread.
    ///
    /// The callback runs on that thread, one connection at a time, in the
    /// order connections complete. Zero-byte connections (probes, the
    /// shutdown wake-up) never reach it.
    pub fn serve<F>(&self, on_message: F) -> Result<ServerHandle, IpcError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let dir = self.socket_path.parent().ok_or(IpcError::NoChannelDir)?;
        ensure_channel_dir(dir)?;

        let bind_err = |source| IpcError::Bind {
            path: self.socket_path.clone(),
            source,
        };

        // A leftover socket from a crashed server makes bind fail with
        // AddrInUse; the instance lock already guarantees no live peer
        // owns it.
        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(bind_err)?;

        let mut perms = fs::metadata(&self.socket_path)
            .map_err(bind_err)?
            .permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&self.socket_path, perms).map_err(bind_err)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            let socket_path = self.socket_path.clone();
            std::thread::Builder::new()
                .name(format!("deeplink-{}", self.scheme))
                .spawn(move || accept_loop(listener, stop, socket_path, on_message))
                .map_err(IpcError::Spawn)?
        };

        Ok(ServerHandle {
            stop,
            socket_path: self.socket_path.clone(),
            thread: Some(thread),
        })
    }
}

fn accept_loop<F>(
    listener: UnixListener,
    stop: Arc<AtomicBool>,
    socket_path: PathBuf,
    mut on_message: F,
) where
    F: FnMut(&[u8]),
{
    while !stop.load(Ordering::Acquire) {
        let (stream, _addr) = match listener.accept() {
            Ok(conn) => conn,
            Err(err) => {
                warn!("accept on {} failed: {err}", socket_path.display());
                std::thread::sleep(ACCEPT_RETRY_DELAY);
                continue;
            }
        };

        // The shutdown wake-up arrives as a connection too; never run the
        // callback once the stop flag is up.
        if stop.load(Ordering::Acquire) {
            break;
        }

        let mut payload = Vec::new();
        // One byte past the limit, so an over-bound payload is detectable
        // rather than silently clipped.
        if let Err(err) = stream
            .take(MAX_MESSAGE_LEN as u64 + 1)
            .read_to_end(&mut payload)
        {
            debug!("read on {} failed: {err}", socket_path.display());
            continue;
        }

        if payload.is_empty() {
            // Probes and wake-ups.
            continue;
        }
        if payload.len() > MAX_MESSAGE_LEN {
            warn!(
                "dropping message over the {MAX_MESSAGE_LEN}-byte limit on {}",
                socket_path.display()
            );
            continue;
        }

        on_message(&payload);
    }

    if let Err(err) = fs::remove_file(&socket_path) {
        debug!("could not remove socket {}: {err}", socket_path.display());
    }
}

/// Handle to a serving channel, used only to request shutdown.
///
/// Dropping the handle stops the listener.
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
    socket_path: PathBuf,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Request shutdown and wait for the listener thread to exit.
    ///
    /// Idempotent: the first call sets the stop flag and unblocks the
    /// accept with a throwaway self-directed connection; every call
    /// returns only once the loop thread is gone. No callback runs after
    /// this returns.
    pub fn stop(&mut self) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            let _ = UnixStream::connect(&self.socket_path);
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(
                    "channel listener thread for {} panicked",
                    self.socket_path.display()
                );
            }
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
