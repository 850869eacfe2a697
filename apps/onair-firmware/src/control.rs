//! Control loop thread
//!
//! The core is single-threaded: one dedicated thread owns the controller,
//! drains queued network events and admin requests at the top of each
//! cycle, runs the cycle and publishes a status snapshot.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use onair::{Controller, NetworkEvent, StatusSnapshot, UpdateError, UpdateReport, UpdateRequest};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

/// Request from the administrative surface, answered by the control loop.
pub struct AdminRequest {
    pub request: UpdateRequest,
    pub reply: oneshot::Sender<Result<UpdateReport, UpdateError>>,
}

/// Cloneable handle used by the web surface.
#[derive(Clone)]
pub struct ControlHandle {
    admin: mpsc::UnboundedSender<AdminRequest>,
    status: watch::Receiver<StatusSnapshot>,
}

impl ControlHandle {
    /// Submit one update step and wait for the outcome.
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateReport> {
        let (reply, rx) = oneshot::channel();
        self.admin
            .send(AdminRequest { request, reply })
            .map_err(|_| anyhow!("Control loop is not running"))?;
        let report = rx.await.context("Control loop dropped the request")??;
        Ok(report)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }
}

/// Start the control loop on its own thread.
pub fn spawn(
    controller: Controller,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
    cycle: Duration,
) -> Result<(ControlHandle, JoinHandle<()>)> {
    let (admin_tx, admin_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(controller.snapshot());

    let thread = std::thread::Builder::new()
        .name("onair-control".to_string())
        .spawn(move || run(controller, events, admin_rx, status_tx, cycle))
        .context("Failed to spawn control thread")?;

    let handle = ControlHandle {
        admin: admin_tx,
        status: status_rx,
    };
    Ok((handle, thread))
}

fn run(
    mut controller: Controller,
    mut events: mpsc::UnboundedReceiver<NetworkEvent>,
    mut admin: mpsc::UnboundedReceiver<AdminRequest>,
    status: watch::Sender<StatusSnapshot>,
    cycle: Duration,
) {
    info!("Control loop running every {:?}", cycle);

    loop {
        let started = Instant::now();

        loop {
            match events.try_recv() {
                Ok(event) => {
                    controller.handle_event(&event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Network watcher stopped, control loop exiting");
                    return;
                }
            }
        }

        while let Ok(AdminRequest { request, reply }) = admin.try_recv() {
            let outcome = controller.handle_update(request);
            if reply.send(outcome).is_err() {
                debug!("Admin request abandoned by caller");
            }
        }

        controller.cycle(Instant::now());

        let snapshot = controller.snapshot();
        status.send_if_modified(move |current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        std::thread::sleep(cycle.saturating_sub(started.elapsed()));
    }
}
