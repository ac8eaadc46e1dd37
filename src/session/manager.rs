use futures::FutureExt;

use super::*;

impl<S> LiveSession<S> {
    fn new(shell: S, fingerprint: [u8; 32]) -> Self {
        Self {
            shell,
            created_at: Utc::now(),
            fingerprint,
        }
    }
}

impl<T: Transport> SessionManager<T> {
    /// Creates a session manager.
    ///
    /// The registry has no size cap. When `network.session_idle_timeout` is
    /// set, sessions idle for longer are closed and dropped.
    pub fn new(
        transport: T,
        credentials: Arc<dyn CredentialStore>,
        network: NetworkConfig,
    ) -> Result<Self, ConnectError> {
        let liveness = Regex::new(&network.liveness_prompt)?;
        let mut builder = Cache::builder().async_eviction_listener(
            |addr: Arc<String>, session: Arc<Mutex<LiveSession<T::Session>>>, cause| {
                async move {
                    if cause.was_evicted() {
                        info!("Session for {} expired ({:?}), closing", addr, cause);
                        close_quietly(&addr, &session).await;
                    }
                }
                .boxed()
            },
        );
        if let Some(idle) = network.session_idle_timeout() {
            builder = builder.time_to_idle(idle);
        }
        let cache: Cache<String, Arc<Mutex<LiveSession<T::Session>>>> = builder.build();
        let security = ConnectionSecurityOptions::from(network.security);

        Ok(Self {
            transport,
            credentials,
            network,
            security,
            liveness,
            cache,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Overrides the security profile derived from the network config.
    pub fn with_security(mut self, security: ConnectionSecurityOptions) -> Self {
        self.security = security;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Serializes work on one device.
    async fn lock_device(&self, addr: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks.entry(addr.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the lock entry for `addr` once no task holds or awaits it.
    fn release_lock(&self, addr: &str) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if locks.get(addr).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(addr);
        }
    }

    /// Opens a session to `device`, or confirms the existing one.
    ///
    /// Timeouts and transport failures are retried up to
    /// `retry_attempts` times with `retry_delay` between attempts.
    /// Authentication failures stop immediately. The device status is
    /// updated after every attempt.
    pub async fn connect(&self, device: &mut Device) -> Result<ConnectOutcome, ConnectError> {
        let addr = device.ip_address.clone();

        let Some(credential_name) = device.credential_name.clone() else {
            error!("No credentials specified for device {}", addr);
            return Err(ConnectError::NoCredential(addr));
        };
        let Some(credentials) = self.credentials.resolve(&credential_name) else {
            error!("Credentials '{}' not found", credential_name);
            return Err(ConnectError::CredentialNotFound(credential_name));
        };

        let timeout = device
            .connection_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.network.default_timeout());
        let target = ConnectTarget::new(device, &credentials, timeout, self.security.clone());
        let fingerprint = target.fingerprint();

        let _guard = self.lock_device(&addr).await;

        if let Some(existing) = self.cache.get(&addr).await {
            let (reusable, closed) = {
                let live = existing.lock().await;
                (live.fingerprint == fingerprint, live.shell.is_closed())
            };
            if reusable && !closed {
                info!("Connection to {} already exists", addr);
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            if closed {
                debug!("Cached session for {} is closed. Removing.", addr);
            } else {
                debug!("Credentials for {} changed, replacing session", addr);
            }
            self.cache.invalidate(&addr).await;
            close_quietly(&addr, &existing).await;
        }

        let attempts = self.network.retry_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            info!(
                "Connecting to {} (attempt {}/{})...",
                addr, attempt, attempts
            );
            match self.transport.open(&target).await {
                Ok(shell) => {
                    self.cache
                        .insert(
                            addr.clone(),
                            Arc::new(Mutex::new(LiveSession::new(shell, fingerprint))),
                        )
                        .await;
                    device.update_status(DeviceStatus::Connected);
                    info!("Successfully connected to {}", addr);
                    return Ok(ConnectOutcome::Connected);
                }
                Err(err) => match err.kind() {
                    FailureKind::Authentication => {
                        error!("Authentication failed for {}: {}", addr, err);
                        device.update_status(DeviceStatus::Error);
                        return Err(match err {
                            ConnectError::AuthFailed(_) => err,
                            other => ConnectError::AuthFailed(format!("{addr} ({other})")),
                        });
                    }
                    FailureKind::Timeout => {
                        warn!("Connection timeout to {} (attempt {})", addr, attempt);
                        device.update_status(DeviceStatus::Unreachable);
                        last_error = Some(err);
                    }
                    FailureKind::Configuration | FailureKind::Transport => {
                        error!("Connection error to {}: {}", addr, err);
                        device.update_status(DeviceStatus::Error);
                        last_error = Some(err);
                    }
                },
            }

            if attempt < attempts {
                tokio::time::sleep(self.network.retry_delay()).await;
            }
        }

        error!("Failed to connect to {} after {} attempts", addr, attempts);
        Err(last_error.unwrap_or(ConnectError::ConnectTimeout(addr)))
    }

    /// Closes and forgets the session to `device`.
    ///
    /// Returns `false` when no session existed. A failing close is logged;
    /// the session is forgotten either way.
    pub async fn disconnect(&self, device: &mut Device) -> bool {
        let addr = device.ip_address.clone();
        let removed = {
            let _guard = self.lock_device(&addr).await;
            match self.cache.remove(&addr).await {
                Some(session) => {
                    close_quietly(&addr, &session).await;
                    true
                }
                None => false,
            }
        };
        self.release_lock(&addr);

        if !removed {
            warn!("No active connection to {}", addr);
            return false;
        }
        device.update_status(DeviceStatus::Disconnected);
        info!("Disconnected from {}", addr);
        true
    }

    /// Closes every session. Individual close failures are logged and skipped.
    pub async fn disconnect_all(&self) {
        let addrs = self.connected_devices();
        for addr in addrs {
            {
                let _guard = self.lock_device(&addr).await;
                if let Some(session) = self.cache.remove(&addr).await {
                    close_quietly(&addr, &session).await;
                    info!("Disconnected from {}", addr);
                }
            }
            self.release_lock(&addr);
        }
    }

    /// Returns exclusive access to a verified live session.
    ///
    /// The cached session is probed with an empty line first; a session
    /// that fails the probe is evicted and `None` is returned.
    pub async fn get_session(&self, device: &Device) -> Option<SessionLease<T::Session>> {
        let addr = device.ip_address.as_str();
        let guard = self.lock_device(addr).await;
        let session = self.cache.get(addr).await?;

        let alive = {
            let mut live = session.lock().await;
            if live.shell.is_closed() {
                false
            } else {
                match live
                    .shell
                    .probe(&self.liveness, self.network.probe_timeout())
                    .await
                {
                    Ok(()) => true,
                    Err(err) => {
                        debug!("Liveness probe on {} failed: {}", addr, err);
                        false
                    }
                }
            }
        };

        if alive {
            Some(SessionLease {
                _guard: guard,
                session,
            })
        } else {
            debug!("Session for {} is stale. Removing.", addr);
            close_quietly(addr, &session).await;
            self.cache.invalidate(addr).await;
            None
        }
    }

    /// True when a session is registered for `device`. Does not probe.
    pub fn is_connected(&self, device: &Device) -> bool {
        self.cache.contains_key(&device.ip_address)
    }

    /// Number of registered sessions.
    pub async fn active_connection_count(&self) -> usize {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count() as usize
    }

    /// Addresses of every registered session.
    pub fn connected_devices(&self) -> Vec<String> {
        let mut addrs = self
            .cache
            .iter()
            .map(|(addr, _)| addr.as_ref().clone())
            .collect::<Vec<_>>();
        addrs.sort();
        addrs
    }
}

async fn close_quietly<S: ShellSession>(addr: &str, session: &Arc<Mutex<LiveSession<S>>>) {
    let mut live = session.lock().await;
    if live.shell.is_closed() {
        debug!("Connection {} already disconnected, skipping", addr);
        return;
    }
    if let Err(err) = live.shell.close().await {
        error!("Error disconnecting from {}: {}", addr, err);
    }
}
