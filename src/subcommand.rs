use {super::*, options::Options, settings::Settings};

mod notify;
mod pool;
mod settings_cmd;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    #[command(about = "Signal a running pool that the node found a new block")]
    Notify(notify::Notify),
    #[command(about = "Run the mining pool")]
    Pool(pool::PoolCmd),
    #[command(about = "Display resolved settings")]
    Settings(settings_cmd::SettingsCmd),
}

impl Subcommand {
    pub(crate) async fn run(self, options: Options, cancel: CancellationToken) -> Result {
        match self {
            Self::Notify(notify) => notify.run().await,
            Self::Pool(pool) => pool.run(Settings::load(options)?, cancel).await,
            Self::Settings(settings) => settings.run(Settings::load(options)?),
        }
    }
}
