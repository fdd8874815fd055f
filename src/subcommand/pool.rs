use super::*;

#[derive(Debug, Parser)]
pub(crate) struct PoolCmd {}

impl PoolCmd {
    pub(crate) async fn run(self, settings: Settings, cancel: CancellationToken) -> Result {
        let daemon: Arc<dyn Daemon> = Arc::new(settings.daemon()?);

        let pool = Pool::start(&settings, daemon, cancel.clone()).await?;

        for address in pool.stratum_addresses() {
            info!("Accepting miners on {address}");
        }

        cancel.cancelled().await;

        info!("Shutting down pool");

        pool.wait().await;

        Ok(())
    }
}
