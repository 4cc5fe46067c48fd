//! Stdout protection.
//!
//! Frames go to fd 1. Anything else that writes there (engine code, child
//! processes inheriting the descriptor, a stray `println!`) would corrupt the
//! protocol for every in-flight request. On unix we move the protocol stream
//! to a private duplicate of fd 1 and point fd 1 at stderr, so stray output
//! ends up in the host's log instead.
//!
//! ## Safety contracts
//!
//! 1. Called once at startup, before any engine code runs.
//! 2. fds 1 and 2 are open at process start.
//! 3. `forget` on the `OwnedFd` wrapping fd 1 keeps it from being closed.

use std::io;

use tokio::io::AsyncWrite;

pub type ProtocolOutput = Box<dyn AsyncWrite + Unpin + Send>;

/// Stream the output sequencer should write frames to.
///
/// With `direct` set, frames go straight to the process stdout.
pub fn protocol_output(direct: bool) -> io::Result<ProtocolOutput> {
    if direct {
        tracing::debug!("Writing protocol directly to stdout");
        return Ok(Box::new(tokio::io::stdout()));
    }
    protected_output()
}

#[cfg(unix)]
fn protected_output() -> io::Result<ProtocolOutput> {
    use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};

    use nix::unistd::{dup, dup2};

    let protocol = dup(io::stdout().as_fd())
        .map_err(|e| io::Error::other(format!("dup(1) failed: {e}")))?;

    // Safety: fd 1 is open (contract 2) and forgotten below, never closed.
    let mut stdout_fd = unsafe { OwnedFd::from_raw_fd(1) };
    let redirected = dup2(io::stderr().as_fd(), &mut stdout_fd);
    std::mem::forget(stdout_fd);
    redirected.map_err(|e| io::Error::other(format!("dup2(2, 1) failed: {e}")))?;

    tracing::debug!(protocol_fd = protocol.as_raw_fd(), "Moved protocol stream off fd 1");
    Ok(Box::new(tokio::fs::File::from_std(std::fs::File::from(protocol))))
}

/// No descriptor juggling off unix; stray stdout writes are not intercepted.
#[cfg(not(unix))]
fn protected_output() -> io::Result<ProtocolOutput> {
    Ok(Box::new(tokio::io::stdout()))
}
