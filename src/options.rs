use super::*;

#[derive(Clone, Default, Debug, Parser)]
pub struct Options {
    #[arg(long, help = "Load configuration from <CONFIG>.")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Load configuration from <CONFIG_DIR>/shaft.toml.")]
    pub config_dir: Option<PathBuf>,

    #[arg(long, help = "Pay block rewards to <ADDRESS>.")]
    pub address: Option<String>,

    #[arg(long, help = "Hash block headers with <ALGORITHM>. [default: sha256d]")]
    pub algorithm: Option<Algorithm>,

    #[arg(long, help = "Connect to the node's JSON-RPC interface at <DAEMON_URL>.")]
    pub daemon_url: Option<String>,

    #[arg(long, help = "Authenticate to the node as <DAEMON_USER>.")]
    pub daemon_user: Option<String>,

    #[arg(long, help = "Authenticate to the node with <DAEMON_PASSWORD>.")]
    pub daemon_password: Option<String>,

    #[arg(long, help = "Accept miners on <LISTEN>. [default: 0.0.0.0]")]
    pub listen: Option<IpAddr>,

    #[arg(long, help = "Partition extranonces with <INSTANCE_ID> (0-31).")]
    pub instance_id: Option<u32>,

    #[arg(long, help = "Append share and block events to <EVENTS_FILE>.")]
    pub events_file: Option<PathBuf>,
}
