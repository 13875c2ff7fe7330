//! Command-line entry point
//!
//! Talks to a rendezvous relay: manages sessions through the directory, or
//! joins a session's signaling channel and logs what arrives.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use rendezvous_client::{
    Answer, ClientConfig, DirectoryResponse, IceCandidate, Offer, PeerId, Roster,
    SessionDirectory, SignalingChannel, Teardown, WebSocketConnector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "rendezvous", about = "Client for the rendezvous signaling relay")]
struct Args {
    /// JSON config file
    #[arg(long, env = "RENDEZVOUS_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the relay, overrides the config file
    #[arg(long, env = "RENDEZVOUS_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session
    Create {
        session: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Join a session
    Join {
        session: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Check whether a session exists
    Exists { session: String },
    /// Open the session's signaling channel and log incoming messages
    Listen {
        session: String,
        /// Local peer id; random when omitted
        #[arg(long)]
        peer_id: Option<PeerId>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = args.url {
        config.base_url = url;
    }
    let base_url = config.base_url()?;

    match args.command {
        Command::Create { session, password } => {
            let directory = SessionDirectory::new(&base_url)?;
            print_response(&directory.create(&session, password.as_deref()).await?);
        }
        Command::Join { session, password } => {
            let directory = SessionDirectory::new(&base_url)?;
            print_response(&directory.join(&session, password.as_deref()).await?);
        }
        Command::Exists { session } => {
            let directory = SessionDirectory::new(&base_url)?;
            print_response(&directory.exists(&session).await?);
        }
        Command::Listen { session, peer_id } => {
            let peer_id = peer_id.unwrap_or_else(PeerId::random);
            listen(&config, &base_url, &session, peer_id).await?;
        }
    }
    Ok(())
}

fn print_response(response: &DirectoryResponse) {
    println!("{}", response.status);
    if !response.body.is_empty() {
        println!("{}", response.body);
    }
}

async fn listen(config: &ClientConfig, base_url: &Url, session: &str, peer_id: PeerId) -> Result<()> {
    let teardown = Teardown::new();
    let ctrl_c = teardown.listen_for_ctrl_c();

    let mut options = config.channel_options();
    options.teardown = Some(teardown);
    let (channel, mut errors) = SignalingChannel::open_with(
        Arc::new(WebSocketConnector),
        base_url,
        session,
        peer_id,
        options,
    )?;

    channel.subscribe(|roster: &Roster| info!(peers = ?roster.peer_ids, "roster"));
    channel.subscribe(|offer: &Offer| {
        info!(from = %offer.offerer_id, to = %offer.answerer_id, "offer");
    });
    channel.subscribe(|answer: &Answer| {
        info!(from = %answer.answerer_id, to = %answer.offerer_id, "answer");
    });
    channel.subscribe(|candidate: &IceCandidate| {
        info!(
            from = %candidate.from_peer_id,
            candidate = candidate.candidate.candidate().unwrap_or_default(),
            "ice candidate"
        );
    });
    info!(peer_id = %channel.local_peer_id(), session, "listening");

    loop {
        tokio::select! {
            biased;
            Some(error) = errors.recv() => warn!(%error, "channel error"),
            () = channel.closed() => break,
        }
    }

    ctrl_c.abort();
    Ok(())
}
