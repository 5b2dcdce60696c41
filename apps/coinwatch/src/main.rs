use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    AuthBackend, AuthedUser, Authenticator, CoinApi, FeedbackMessages, HttpCoinApi,
    LocalAuthBackend, MarketController, ProfileController, SignInController, SignUpController,
    WatchlistController,
};
use shared::domain::CoinId;
use storage::Storage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "coinwatch", about = "Crypto market tracker")]
struct Cli {
    /// Config file; defaults to ./coinwatch.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Market overview.
    Coins {
        #[arg(long)]
        limit: Option<u32>,
    },
    Coin {
        id: String,
    },
    Chart {
        id: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    News {
        #[arg(long)]
        limit: Option<u32>,
    },
    #[command(flatten)]
    Account(AccountCommand),
}

/// Commands that use the local account store.
#[derive(Subcommand, Debug)]
enum AccountCommand {
    SignUp(AccountArgs),
    Watchlist(AccountArgs),
    ToggleFavorite {
        coin: String,
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Uploads a PNG, JPEG, GIF or WebP profile picture.
    SetPicture {
        path: PathBuf,
        #[command(flatten)]
        account: AccountArgs,
    },
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut settings, config_warnings) = load_settings(cli.config.as_deref());
    if let Some(api_url) = &cli.api_url {
        settings.api_base_url = api_url.clone();
    }
    if let Some(database_url) = &cli.database_url {
        settings.database_url = database_url.clone();
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    for warning in &config_warnings {
        warn!(%warning, "config: input skipped");
    }

    let api: Arc<dyn CoinApi> = Arc::new(HttpCoinApi::new(
        &settings.api_base_url,
        settings.request_timeout(),
        settings.currency.clone(),
    )?);

    match cli.command {
        Command::Coins { limit } => {
            let market = MarketController::new(api);
            let sub = market.coins().subscribe();
            let dispatch = market.load_coins(limit.unwrap_or(settings.coins_limit));
            render::follow("coins", sub, dispatch, &FeedbackMessages::SILENT, |coins| {
                render::coins(coins)
            })
            .await?;
        }
        Command::Coin { id } => {
            let market = MarketController::new(api);
            let sub = market.coin().subscribe();
            let dispatch = market.load_coin(CoinId::new(id));
            render::follow("coin", sub, dispatch, &FeedbackMessages::SILENT, render::coin).await?;
        }
        Command::Chart { id, days } => {
            let market = MarketController::new(api);
            let sub = market.chart().subscribe();
            let dispatch = market.load_chart(CoinId::new(id), days);
            render::follow("chart", sub, dispatch, &FeedbackMessages::SILENT, |points| {
                render::chart(points)
            })
            .await?;
        }
        Command::News { limit } => {
            let market = MarketController::new(api);
            let sub = market.news().subscribe();
            let dispatch = market.load_news(limit.unwrap_or(settings.news_limit));
            render::follow("news", sub, dispatch, &FeedbackMessages::SILENT, |articles| {
                render::news(articles)
            })
            .await?;
        }
        Command::Account(command) => {
            let storage = open_storage(&settings).await?;
            let auth = authenticator(storage.clone());
            let outcome = run_account_command(command, &auth, api).await;
            storage.close().await;
            outcome?;
        }
    }

    Ok(())
}

async fn open_storage(settings: &Settings) -> Result<Storage> {
    let database_url = normalize_database_url(&settings.database_url);
    Storage::new(&database_url).await.map_err(|error| {
        error!(%database_url, error = %format!("{error:#}"), "failed to open user data store");
        error
    })
}

fn authenticator(storage: Storage) -> Arc<Authenticator> {
    let backend: Arc<dyn AuthBackend> = Arc::new(LocalAuthBackend::new(storage));
    let auth = Arc::new(Authenticator::new(backend));

    let mut transitions = auth.gate().subscribe();
    tokio::spawn(async move {
        while let Some(transition) = transitions.next().await {
            info!(
                epoch = transition.epoch,
                reason = ?transition.reason,
                authed = transition.session.is_authed(),
                "session changed"
            );
        }
    });
    auth
}

async fn run_account_command(
    command: AccountCommand,
    auth: &Arc<Authenticator>,
    api: Arc<dyn CoinApi>,
) -> Result<()> {
    match command {
        AccountCommand::SignUp(account) => {
            let sign_up = SignUpController::new(Arc::clone(auth));
            let sub = sign_up.state().subscribe();
            let dispatch = sign_up.submit(&account.email, &account.password);
            render::follow("sign up", sub, dispatch, &FeedbackMessages::SIGN_UP, |user_id| {
                info!(user_id = user_id.0, "account ready")
            })
            .await?;
        }
        AccountCommand::Watchlist(account) => {
            sign_in(auth, &account).await?;
            let watchlist = WatchlistController::new(auth, api);
            let sub = watchlist.watchlist().subscribe();
            let dispatch = watchlist.refresh();
            render::follow("watchlist", sub, dispatch, &FeedbackMessages::SILENT, |list| {
                render::watchlist(list)
            })
            .await?;
        }
        AccountCommand::ToggleFavorite { coin, account } => {
            sign_in(auth, &account).await?;
            let watchlist = WatchlistController::new(auth, api);
            let sub = watchlist.toggle_state().subscribe();
            let dispatch = watchlist.toggle(CoinId::new(coin));
            render::follow("favorite", sub, dispatch, &FeedbackMessages::SILENT, |toggle| {
                let verb = if toggle.favorite { "added to" } else { "removed from" };
                println!("{} {verb} watchlist", toggle.coin_id);
            })
            .await?;
        }
        AccountCommand::SetPicture { path, account } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read picture '{}'", path.display()))?;
            sign_in(auth, &account).await?;
            let profile = ProfileController::new(Arc::clone(auth));
            let sub = profile.state().subscribe();
            let dispatch = profile.upload_picture(bytes);
            render::follow(
                "profile picture",
                sub,
                dispatch,
                &FeedbackMessages::PROFILE_PICTURE,
                |url| println!("picture url: {url}"),
            )
            .await?;
        }
    }
    Ok(())
}

async fn sign_in(auth: &Arc<Authenticator>, account: &AccountArgs) -> Result<AuthedUser> {
    let controller = SignInController::new(Arc::clone(auth));
    let sub = controller.state().subscribe();
    let dispatch = controller.submit(&account.email, &account.password);
    render::follow("sign in", sub, dispatch, &FeedbackMessages::SIGN_IN, |user| {
        println!("signed in as {}", user.profile.greeting_name())
    })
    .await
}
