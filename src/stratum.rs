use {super::*, derive_more::Display};

mod authorize;
mod error;
mod job_id;
mod message;
mod notify;
mod set_difficulty;
mod submit;
mod subscribe;

pub use {
    authorize::Authorize,
    error::{JsonRpcError, StratumError},
    job_id::JobId,
    message::{Id, Message},
    notify::Notify,
    set_difficulty::SetDifficulty,
    submit::Submit,
    subscribe::{Subscribe, SubscribeResult},
};
