//! PTY-backed `docker exec`, used to implement `ContainerRuntime::attach_pty`
//! (spec §4.3) and, through it, the Attach Plane (spec §4.6).
//!
//! `portable-pty` is synchronous, so each direction gets its own blocking
//! OS thread bridged to an async `tokio::sync::mpsc` channel. Bounded
//! channels are the backpressure mechanism: a slow websocket consumer stalls
//! the stdout-reading thread's `blocking_send` instead of the adapter
//! buffering unboundedly (spec §4.6 "blocking on send (no dropping)").
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use portable_pty::{ChildKiller, CommandBuilder, PtySize as PortablePtySize, native_pty_system};
use tokio::sync::{mpsc, oneshot};

use crate::{error::RuntimeError, trait_def::PtyHandle, types::PtySize};

const CHANNEL_DEPTH: usize = 64;

pub fn spawn_exec_pty(engine_binary: &str, container_id: &str, size: PtySize) -> Result<PtyHandle, RuntimeError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PortablePtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| RuntimeError::Other(format!("failed to open pty: {e}")))?;

    let mut cmd = CommandBuilder::new(engine_binary);
    cmd.args(["exec", "-it", container_id, "/bin/sh"]);

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| RuntimeError::Other(format!("failed to spawn exec: {e}")))?;
    drop(pair.slave);

    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| RuntimeError::Other(format!("failed to take pty writer: {e}")))?;
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| RuntimeError::Other(format!("failed to clone pty reader: {e}")))?;
    let master = Arc::new(Mutex::new(Some(pair.master)));

    // A killer is a separate handle from `child` itself: `child.wait()` runs
    // on its own thread and blocks for the process lifetime, so a `close_fn`
    // that needs `&mut Child` would deadlock against that thread. The killer
    // can signal the process from here without touching `child`.
    let killer = Mutex::new(child.clone_killer());

    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);
    let (stdout_tx, stdout_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);
    let (wait_tx, wait_rx) = oneshot::channel::<i32>();

    // stdin pump: async channel -> blocking writer.
    std::thread::spawn(move || {
        while let Some(chunk) = stdin_rx.blocking_recv() {
            if writer.write_all(&chunk).is_err() {
                break;
            }
            let _ = writer.flush();
        }
    });

    // stdout pump: blocking reader -> async channel. `blocking_send` applies
    // backpressure when the consumer (the websocket) falls behind.
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if stdout_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // wait pump: reports the exit code once, used to emit the final `exit`
    // frame at the Attach Plane boundary.
    std::thread::spawn(move || {
        let status = child.wait();
        let code = status.ok().and_then(|s| s.exit_code().try_into().ok()).unwrap_or(-1);
        let _ = wait_tx.send(code);
    });

    let resize_master = master.clone();
    let resize_fn = move |new_size: PtySize| -> Result<(), RuntimeError> {
        let mut guard = resize_master.lock().unwrap();
        match guard.as_mut() {
            Some(m) => m
                .resize(PortablePtySize {
                    rows: new_size.rows,
                    cols: new_size.cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|e| RuntimeError::Other(format!("resize failed: {e}"))),
            None => Err(RuntimeError::Other("pty already closed".to_string())),
        }
    };

    let close_master = master.clone();
    let close_fn = move || {
        if let Err(e) = killer.lock().unwrap().kill() {
            tracing::warn!(error = %e, "failed to kill exec pty child");
        }
        // Killing the child closes the slave side it held open, which is
        // what actually unblocks the stdout pump's `read()` with EOF. Drop
        // our own master handle too so nothing here outlives the session.
        close_master.lock().unwrap().take();
    };

    Ok(PtyHandle::new(stdin_tx, stdout_rx, wait_rx, resize_fn, close_fn))
}
