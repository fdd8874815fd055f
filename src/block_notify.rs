use super::*;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockNotifyOptions {
    pub enabled: bool,
    pub address: IpAddr,
    pub port: u16,
    pub password: String,
}

impl Default for BlockNotifyOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            address: IpAddr::from([127, 0, 0, 1]),
            port: 8117,
            password: String::new(),
        }
    }
}

/// The line a node's `-blocknotify` hook sends.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNotification {
    pub password: String,
    pub block_hash: String,
}

/// Listens for block notifications and requests a template refresh for each
/// one carrying the right password.
pub(crate) async fn spawn_listener(
    options: &BlockNotifyOptions,
    refresh: mpsc::Sender<()>,
    cancel: CancellationToken,
    tasks: &mut JoinSet<()>,
) -> Result<SocketAddr> {
    let listener = TcpListener::bind((options.address, options.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind block notify listener on {}:{}",
                options.address, options.port
            )
        })?;

    let local = listener.local_addr()?;
    let password = options.password.clone();

    info!("Block notify listener on {local}");

    tasks.spawn(async move {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        connections.spawn(handle_connection(
                            stream,
                            remote,
                            password.clone(),
                            refresh.clone(),
                        ));
                    }
                    Err(err) => warn!("Block notify accept failed: {err}"),
                },
            }
        }

        connections.shutdown().await;

        info!("Shutting down block notify listener");
    });

    Ok(local)
}

async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    password: String,
    refresh: mpsc::Sender<()>,
) {
    match timeout(READ_TIMEOUT, read_notification(stream)).await {
        Ok(Ok(notification)) if notification.password == password => {
            info!(
                "Block notification for {} from {remote}",
                notification.block_hash
            );
            refresh.try_send(()).ok();
        }
        Ok(Ok(_)) => warn!("Block notification from {remote} with wrong password"),
        Ok(Err(err)) => warn!("Bad block notification from {remote}: {err}"),
        Err(_) => warn!("Block notification from {remote} timed out"),
    }
}

async fn read_notification(stream: TcpStream) -> Result<BlockNotification> {
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE));

    let line = lines
        .next()
        .await
        .context("connection closed before a notification arrived")??;

    serde_json::from_str(&line).context("failed to parse block notification")
}

/// Sends one notification, as the node's `-blocknotify` hook does.
pub(crate) async fn send_notification(
    host: &str,
    port: u16,
    notification: &BlockNotification,
) -> Result {
    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("failed to connect to block notify listener at {host}:{port}"))?;

    let mut line = serde_json::to_string(notification)?;
    line.push('\n');

    stream.write_all(line.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(())
}
