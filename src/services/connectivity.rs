use tokio::sync::watch;

/// Process-wide network reachability, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Tracks reachability and fans out `offline -> online` transitions.
///
/// Fed by whatever signal the host has (a device-level callback, or the
/// worker binary's collector health probe). Repeated reports of the same
/// state are swallowed, so subscribers see one event per stable transition
/// rather than one per probe.
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Publish an observation. Only an actual state change reaches
    /// subscribers.
    pub fn report(&self, observed: ConnectivityState) {
        self.tx.send_if_modified(|current| {
            if *current == observed {
                false
            } else {
                tracing::info!(from = ?*current, to = ?observed, "connectivity changed");
                *current = observed;
                true
            }
        });
    }

    /// Subscribe to `offline -> online` transitions.
    ///
    /// An already-online state at subscription counts as one pending
    /// transition: a reconnect that lands between constructing a subscriber
    /// and its first poll would otherwise be missed, leaving queued work
    /// stranded until the link flaps again.
    pub fn watch_online(&self) -> OnlineWatch {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() == ConnectivityState::Online {
            rx.mark_changed();
        }
        OnlineWatch { rx }
    }
}

/// One subscriber's view of reconnect events.
pub struct OnlineWatch {
    rx: watch::Receiver<ConnectivityState>,
}

impl OnlineWatch {
    /// Wait for the next `offline -> online` transition. Going offline is
    /// informational only and never resolves this. Returns `false` once the
    /// monitor is gone.
    pub async fn next_online(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            if *self.rx.borrow_and_update() == ConnectivityState::Online {
                return true;
            }
        }
    }
}
