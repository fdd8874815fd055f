use {
    algorithm::DIFF1,
    anyhow::{Context, Error, anyhow, bail, ensure},
    arguments::Arguments,
    async_trait::async_trait,
    authorizer::{AcceptAll, AddressAuthorizer, Authorizer},
    bitcoin::{
        Address, BlockHash, CompactTarget, PubkeyHash, PublicKey, ScriptBuf, Target, TxMerkleNode,
        VarInt,
        address::NetworkUnchecked,
        base58,
        block::{self, Header},
        consensus,
        hashes::{Hash, sha256d},
    },
    block_submitter::BlockCandidate,
    block_template::{BlockTemplate, CoinbaseConfig, RpcTemplate},
    byteorder::{BigEndian, ByteOrder, LittleEndian},
    clap::{Parser, ValueEnum},
    coinbase_builder::{CoinbaseBuilder, GenerationTransaction, Recipient, RewardKind},
    daemon::{Daemon, RpcDaemon},
    dashmap::DashMap,
    event_sink::{
        BlockFoundEvent, Event, EventSender, ShareEvent, UnknownMethodEvent, build_event_sink,
    },
    extranonces::{ExtranonceCounter, random_instance_id},
    futures::{SinkExt, StreamExt},
    hex::FromHex,
    job_manager::{FoundBlock, Share, ShareSubmission},
    lru::LruCache,
    merkle::MerkleTree,
    metatron::Metatron,
    parking_lot::{Mutex, RwLock},
    primitive_types::U256,
    reqwest::Url,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser::SerializeSeq},
    serde_json::{Value, json},
    serde_with::{DeserializeFromStr, SerializeDisplay},
    settings::PortOptions,
    snafu::Snafu,
    std::{
        collections::{HashSet, VecDeque},
        env,
        fmt::{self, Display, Formatter},
        fs, io,
        net::{IpAddr, SocketAddr},
        num::NonZeroUsize,
        ops::ControlFlow,
        path::{Path, PathBuf},
        process,
        str::FromStr,
        sync::{
            Arc, LazyLock, OnceLock,
            atomic::{AtomicU32, AtomicU64, Ordering},
        },
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratifier::{Bans, Stratifier},
    stratum::{
        Authorize, Id, JobId, Message, Notify, SetDifficulty, StratumError, Submit, Subscribe,
        SubscribeResult,
    },
    tokio::{
        io::{AsyncRead, AsyncWrite, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        runtime::Runtime,
        sync::mpsc,
        task::JoinSet,
        time::{MissedTickBehavior, interval, sleep, timeout},
    },
    tokio_util::{
        codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError},
        sync::CancellationToken,
    },
    tracing::{debug, error, info, warn},
    tracing_appender::{non_blocking, non_blocking::WorkerGuard},
    tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt},
    vardiff::Vardiff,
};

pub use {
    algorithm::{Algorithm, Pow},
    block_notify::BlockNotifyOptions,
    daemon::ValidatedAddress,
    job_manager::JobManager,
    pool::Pool,
    settings::Settings,
    stratifier::BanningOptions,
    vardiff::VardiffOptions,
};

mod algorithm;
mod arguments;
mod authorizer;
mod block_notify;
mod block_submitter;
mod block_template;
mod coinbase_builder;
pub mod daemon;
mod event_sink;
mod extranonces;
mod generator;
mod job_manager;
mod logs;
mod merkle;
mod metatron;
pub mod options;
mod pool;
mod server;
pub mod settings;
mod signal;
mod stratifier;
pub mod stratum;
mod subcommand;
mod util;
mod vardiff;

pub const COIN_VALUE: u64 = 100_000_000;
/// Appended to every coinbase script sig.
pub const POOL_TAG: &str = "/shaft/";
/// Longest line a miner may send before the session is dropped as a flood.
pub const MAX_MESSAGE_SIZE: usize = 1024;
pub const EXTRANONCE1_SIZE: usize = 4;
pub const EXTRANONCE2_SIZE: usize = 8 - EXTRANONCE1_SIZE;
/// Max ntime forward roll in seconds, matching the node's two hour limit.
pub const MAX_NTIME_OFFSET: u64 = 7200;
pub const SUBSCRIPTION_PREFIX: &str = "deadbeefcafebabe";
/// Jobs kept for late submissions.
pub const JOB_RETENTION: usize = 16;

type Result<T = (), E = Error> = std::result::Result<T, E>;

pub fn main() {
    let _guard = logs::init();

    let args = Arguments::parse();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to create tokio runtime: {err}");
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let cancel = signal::setup_signal_handler();
        args.run(cancel).await
    });

    if let Err(err) = result {
        eprintln!("error: {err}");

        for (i, cause) in err.chain().skip(1).enumerate() {
            if i == 0 {
                eprintln!();
                eprintln!("because:");
            }
            eprintln!("- {cause}");
        }

        if env::var_os("RUST_BACKTRACE")
            .map(|val| val == "1")
            .unwrap_or_default()
        {
            eprintln!();
            eprintln!("{}", err.backtrace());
        }

        process::exit(1);
    }
}
