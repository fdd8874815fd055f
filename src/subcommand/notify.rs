use {super::*, block_notify::BlockNotification};

#[derive(Debug, Parser)]
pub(crate) struct Notify {
    #[arg(long, default_value = "127.0.0.1", help = "Connect to the pool at <HOST>.")]
    pub(crate) host: String,
    #[arg(long, help = "Connect to the pool's block notify listener on <PORT>.")]
    pub(crate) port: u16,
    #[arg(long, help = "Authenticate with <PASSWORD>.")]
    pub(crate) password: String,
    #[arg(help = "Hash of the new block.")]
    pub(crate) block_hash: String,
}

impl Notify {
    pub(crate) async fn run(self) -> Result {
        block_notify::send_notification(
            &self.host,
            self.port,
            &BlockNotification {
                password: self.password,
                block_hash: self.block_hash,
            },
        )
        .await
    }
}
